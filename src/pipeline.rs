// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! One extraction run over a design: graph, waveform and optional
//! HDL sources in, feature and edge tables out.

use std::path::PathBuf;
use crate::cache::DesignCache;
use crate::config::ExtractConfig;
use crate::dotgraph::Graph;
use crate::error::Result;
use crate::features::{aggregate, build_resolution_table, EdgeTable, FeatureInputs, FeatureTable};
use crate::hdl::read_hdl_files;
use crate::names::{
    resolve_declarations, DeclarationSeeds, FallbackResolver, HdlResolution,
    NoMatch, ResolutionTable, Resolve, ScoredResolver
};
use crate::paths::graph_path_counts;
use crate::waveform::{scan_vcd, WaveformSummary};

/// Inputs of one run.
#[derive(Debug, Clone)]
pub struct ExtractJob {
    /// Design name. Scopes the cache and selects the leakage rule set.
    pub design: String,
    pub dot: PathBuf,
    pub vcd: PathBuf,
    pub hdl: Vec<PathBuf>,
    pub config: ExtractConfig,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct ExtractOutput {
    pub graph: Graph,
    pub roots: Vec<usize>,
    pub waveform: WaveformSummary,
    pub hdl_resolutions: Vec<HdlResolution>,
    pub features: FeatureTable,
    pub edges: EdgeTable,
}

/// Run with the offline resolver only.
pub fn extract(job: &ExtractJob) -> Result<ExtractOutput> {
    extract_with_fallback(job, &NoMatch)
}

/// Run, consulting `fallback` for label references that the
/// declaration seeds and the scored resolver leave unmatched.
pub fn extract_with_fallback(
    job: &ExtractJob, fallback: &(impl Resolve + Sync)
) -> Result<ExtractOutput> {
    let config = &job.config;
    let graph = Graph::from_dot_file(&job.dot, &config.key_register)?;
    clilog::info!("graph {}: {} nodes, {} edges, {} key nodes",
                  job.dot.display(), graph.num_nodes(), graph.edges.len(),
                  graph.key_nodes.len());
    if graph.key_nodes.is_empty() {
        clilog::warn!(NO_KEY_NODES, "no label contains {:?}, all path counts are 0",
                      config.key_register);
    }
    let roots = graph.roots_or_first();
    clilog::info!("{} root nodes", roots.len());

    let cache = DesignCache::new(config.cache_dir.as_deref(), &job.design,
                                 config.cache_policy);
    let waveform = cache.get_or_compute(
        "toggles", |w: &WaveformSummary| w.validate(),
        || scan_vcd(&job.vcd))?;

    let scored = ScoredResolver::new(&waveform, &config.include_scopes,
                                     &config.exclude_scopes);
    let mut hdl_resolutions = vec![];
    if !job.hdl.is_empty() {
        let decls = read_hdl_files(&job.hdl)?;
        hdl_resolutions = resolve_declarations(&decls, &scored);
        clilog::info!("resolved {}/{} HDL declarations",
                      hdl_resolutions.iter().filter(|r| r.resolved.is_some()).count(),
                      hdl_resolutions.len());
    }
    let seeds = DeclarationSeeds::from_resolutions(&hdl_resolutions);
    let resolver = FallbackResolver {
        primary: FallbackResolver { primary: seeds, secondary: &scored },
        secondary: fallback,
    };

    let resolutions = cache.get_or_compute(
        "resolutions",
        |t: &ResolutionTable| (0..graph.num_nodes())
            .map(|i| graph.label(i))
            .all(|l| l.is_empty() || t.get(l).is_some()),
        || Ok(build_resolution_table(&graph, &resolver, &waveform)))?;

    let path_counts = graph_path_counts(&graph);
    let leakage = config.leakage_rule(&job.design);
    let (features, edges) = aggregate(&FeatureInputs {
        graph: &graph,
        path_counts: &path_counts,
        waveform: &waveform,
        resolutions: &resolutions,
        leakage: &leakage,
    });
    Ok(ExtractOutput { graph, roots, waveform, hdl_resolutions, features, edges })
}
