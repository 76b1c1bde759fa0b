// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use itertools::Itertools;
use leakfeat::cache::CachePolicy;
use leakfeat::config::ExtractConfig;
use leakfeat::error::Result;
use leakfeat::hdl::write_resolution_report;
use leakfeat::pipeline::{extract, ExtractJob};

#[derive(clap::Parser, Debug)]
struct LeakFeatArgs {
    /// Structural netlist graph in DOT format.
    ///
    /// Every node should carry a `label` attribute with its gate text.
    dot: PathBuf,
    /// Simulation trace (VCD) of the same design.
    vcd: PathBuf,
    /// Design name.
    ///
    /// Scopes the cache directory and selects the leakage rule set.
    design: String,
    /// Label substring marking the key nodes (case-sensitive).
    ///
    /// Overrides `key_register` of the configuration file.
    key_register: Option<String>,
    /// JSON configuration file.
    #[clap(long)]
    config: Option<PathBuf>,
    /// Verilog sources used to seed name resolution. Repeatable.
    #[clap(long)]
    hdl: Vec<PathBuf>,
    /// Cache directory for toggle tables and resolved references.
    #[clap(long)]
    cache_dir: Option<PathBuf>,
    /// How existing cache artifacts are treated.
    ///
    /// `trust` uses them without checking them against the trace;
    /// use `rebuild` after the trace or the scopes change.
    #[clap(long, value_enum)]
    cache_policy: Option<CachePolicy>,
    /// Waveform path substring preferred by the resolver. Repeatable.
    #[clap(long)]
    include_scope: Vec<String>,
    /// Waveform path substring avoided by the resolver. Repeatable.
    #[clap(long)]
    exclude_scope: Vec<String>,
    /// Leakage rule set to label with (default: the design name).
    #[clap(long)]
    label_rules: Option<String>,
    /// Node feature table output.
    #[clap(long, default_value = "features.csv")]
    features_out: PathBuf,
    /// Edge table output.
    #[clap(long, default_value = "edges.csv")]
    edges_out: PathBuf,
    /// Dump every node label as `@@label@@` to this file.
    #[clap(long)]
    dump_labels: Option<PathBuf>,
    /// Dump every waveform signal path to this file.
    #[clap(long)]
    dump_signals: Option<PathBuf>,
    /// Write the HDL declaration resolution report (CSV) to this file.
    #[clap(long)]
    hdl_report: Option<PathBuf>,
}

fn run(args: LeakFeatArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => ExtractConfig::load(path)?,
        None => ExtractConfig::default(),
    };
    if let Some(key) = args.key_register {
        config.key_register = key;
    }
    if args.cache_dir.is_some() {
        config.cache_dir = args.cache_dir;
    }
    if let Some(policy) = args.cache_policy {
        config.cache_policy = policy;
    }
    config.include_scopes.extend(args.include_scope);
    config.exclude_scopes.extend(args.exclude_scope);
    if args.label_rules.is_some() {
        config.label_rules = args.label_rules;
    }
    if config.key_register.is_empty() {
        clilog::warn!(NO_KEY_REGISTER, "no key register given, no node is a key node");
    }
    clilog::debug!("scopes: include [{}], exclude [{}]",
                   config.include_scopes.iter().format(", "),
                   config.exclude_scopes.iter().format(", "));

    let job = ExtractJob {
        design: args.design,
        dot: args.dot,
        vcd: args.vcd,
        hdl: args.hdl,
        config,
    };
    let out = extract(&job)?;

    if let Some(path) = &args.dump_labels {
        out.graph.write_label_dump(path)?;
        clilog::info!("labels dumped to {}", path.display());
    }
    if let Some(path) = &args.dump_signals {
        out.waveform.write_signal_dump(path)?;
        clilog::info!("signals dumped to {}", path.display());
    }
    if let Some(path) = &args.hdl_report {
        write_resolution_report(path, &out.hdl_resolutions, &out.waveform)?;
        clilog::info!("HDL resolution report written to {}", path.display());
    }
    out.features.write_csv(&args.features_out)?;
    clilog::info!("features written to {}", args.features_out.display());
    out.edges.write_csv(&args.edges_out)?;
    clilog::info!("edges written to {}", args.edges_out.display());
    Ok(())
}

fn main() {
    clilog::init_stderr_color_debug();
    clilog::enable_timer("leakfeat");
    let args = <LeakFeatArgs as clap::Parser>::parse();
    clilog::info!("LeakFeat args:\n{:#?}", args);
    if let Err(e) = run(args) {
        clilog::error!("{}", e);
        std::process::exit(1);
    }
}
