// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Per-node feature rows and the edge table.
//!
//! Every feature is a field of [`FeatureRow`]; the CSV column order
//! is its field order: `node` first, then the feature names sorted.

use compact_str::CompactString;
use indexmap::IndexSet;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use crate::dotgraph::Graph;
use crate::error::{ExtractError, Result};
use crate::leakage::LeakageRule;
use crate::names::{resolve_label, ResolutionTable, Resolve};
use crate::opclass::classify_label;
use crate::waveform::WaveformSummary;

/// Booleans travel as `0`/`1` cells.
mod flag01 {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(*v as u8)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        match u8::deserialize(d)? {
            0 => Ok(false),
            1 => Ok(true),
            v => Err(D::Error::custom(format_args!("expected 0 or 1, got {}", v))),
        }
    }
}

/// One row of the node feature table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Node identifier as given in the graph.
    pub node: CompactString,
    /// In-degree plus out-degree.
    #[serde(rename = "Degree")]
    pub degree: u64,
    /// Toggle total of all resolved label references.
    #[serde(rename = "Hamming distance")]
    pub hamming_distance: u64,
    /// Label text.
    #[serde(rename = "Node")]
    pub text: String,
    #[serde(rename = "Paths")]
    pub paths: u64,
    #[serde(with = "flag01")]
    pub and: bool,
    /// Binary leakage label.
    #[serde(with = "flag01")]
    pub label: bool,
    #[serde(with = "flag01")]
    pub mux: bool,
    pub node_number: u64,
    #[serde(with = "flag01")]
    pub or: bool,
    #[serde(with = "flag01")]
    pub xor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRow {
    pub source: u64,
    pub target: u64,
}

fn write_rows<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let csv_err = |source| ExtractError::Csv { path: path.to_path_buf(), source };
    let file = File::create(path).map_err(|e| ExtractError::io(path, e))?;
    let mut wtr = csv::Writer::from_writer(file);
    for row in rows {
        wtr.serialize(row).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| ExtractError::io(path, e))
}

fn read_rows<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let csv_err = |source| ExtractError::Csv { path: path.to_path_buf(), source };
    let file = File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut rdr = csv::Reader::from_reader(file);
    rdr.deserialize().collect::<Result<Vec<T>, _>>().map_err(csv_err)
}

/// The node feature table, in node sequence order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
}

impl FeatureTable {
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_rows(path, &self.rows)
    }

    pub fn read_csv(path: &Path) -> Result<FeatureTable> {
        Ok(FeatureTable { rows: read_rows(path)? })
    }
}

/// The edge table: node sequence numbers in edge discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EdgeTable {
    pub rows: Vec<EdgeRow>,
}

impl EdgeTable {
    pub fn from_graph(graph: &Graph) -> EdgeTable {
        EdgeTable {
            rows: graph.edges.iter().map(|&(s, t)| EdgeRow {
                source: s as u64, target: t as u64
            }).collect()
        }
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        write_rows(path, &self.rows)
    }

    pub fn read_csv(path: &Path) -> Result<EdgeTable> {
        Ok(EdgeTable { rows: read_rows(path)? })
    }
}

/// Resolve the references of every distinct non-empty label.
pub fn build_resolution_table(
    graph: &Graph, resolver: &(impl Resolve + Sync), waveform: &WaveformSummary
) -> ResolutionTable {
    let timer = clilog::stimer!("label reference resolution");
    let labels = (0..graph.num_nodes())
        .map(|i| graph.label(i))
        .filter(|l| !l.is_empty())
        .collect::<IndexSet<_>>();
    let labels = labels.into_iter().collect::<Vec<_>>();
    let resolved = labels.par_iter()
        .map(|&l| (l.to_string(), resolve_label(l, resolver, waveform)))
        .collect::<Vec<_>>();
    let (mut total, mut matched) = (0usize, 0usize);
    for (_, refs) in &resolved {
        total += refs.len();
        matched += refs.iter().filter(|r| r.signal.is_some()).count();
    }
    clilog::info!("resolved {}/{} label references over {} distinct labels",
                  matched, total, labels.len());
    clilog::finish!(timer);
    ResolutionTable { labels: resolved.into_iter().collect() }
}

/// Everything the aggregator joins.
pub struct FeatureInputs<'a> {
    pub graph: &'a Graph,
    pub path_counts: &'a [u64],
    pub waveform: &'a WaveformSummary,
    pub resolutions: &'a ResolutionTable,
    pub leakage: &'a LeakageRule,
}

/// Build the node feature table and the edge table.
pub fn aggregate(inputs: &FeatureInputs<'_>) -> (FeatureTable, EdgeTable) {
    let FeatureInputs { graph, path_counts, waveform, resolutions, leakage } = *inputs;
    debug_assert_eq!(path_counts.len(), graph.num_nodes());
    let by_path = waveform.signals.iter()
        .map(|s| (s.path.as_str(), &s.record))
        .collect::<HashMap<_, _>>();

    let hamming = |label: &str| -> u64 {
        let Some(refs) = resolutions.get(label) else { return 0 };
        refs.iter()
            .filter_map(|r| {
                let rec = by_path.get(r.signal.as_deref()?)?;
                Some(rec.range_total(r.hi, r.lo))
            })
            .fold(0u64, |a, b| a.saturating_add(b))
    };

    let rows = (0..graph.num_nodes()).into_par_iter().map(|i| {
        let text = graph.label(i);
        let ops = classify_label(text);
        FeatureRow {
            node: graph.node_id(i).into(),
            degree: graph.degree(i) as u64,
            hamming_distance: hamming(text),
            text: text.to_string(),
            paths: path_counts.get(i).copied().unwrap_or(0),
            and: ops.and,
            label: leakage.label(text) == 1,
            mux: ops.mux,
            node_number: i as u64,
            or: ops.or,
            xor: ops.xor,
        }
    }).collect::<Vec<_>>();

    let num_leaky = rows.iter().filter(|r| r.label).count();
    clilog::info!("{} feature rows ({} labelled leaky), {} edges",
                  rows.len(), num_leaky, graph.edges.len());
    (FeatureTable { rows }, EdgeTable::from_graph(graph))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::ScoredResolver;
    use crate::paths::graph_path_counts;
    use crate::toggle::ToggleRecord;
    use crate::waveform::SignalToggles;
    use tempdir::TempDir;

    fn waveform() -> WaveformSummary {
        WaveformSummary {
            signals: vec![
                SignalToggles {
                    path: "top.sbox.din[3:0]".into(),
                    record: ToggleRecord { width: 4, toggles: vec![1, 2, 3, 4] },
                },
                SignalToggles {
                    path: "top.sbox.key_reg".into(),
                    record: ToggleRecord { width: 1, toggles: vec![5] },
                },
                SignalToggles {
                    path: "top.ctrl.en".into(),
                    record: ToggleRecord { width: 1, toggles: vec![9] },
                },
                SignalToggles {
                    path: "top.other.en".into(),
                    record: ToggleRecord { width: 1, toggles: vec![9] },
                },
            ]
        }
    }

    const DOT: &str = r#"digraph G {
        node [shape=box];
        k [label="SBOX.3:\nkey_reg <= din[2:1] ^ din[9:3];"];
        m [label="q = en ? din : 4'h0;"];
        z;
        k -> m; m -> z; k -> z;
    }"#;

    fn run() -> (FeatureTable, EdgeTable) {
        let g = Graph::from_dot_str(DOT, "key_reg", Path::new("g.dot")).unwrap();
        let wf = waveform();
        let resolver = ScoredResolver::new(&wf, &[], &[]);
        let resolutions = build_resolution_table(&g, &resolver, &wf);
        let counts = graph_path_counts(&g);
        let rule = LeakageRule::new(&[vec!["sbox".to_string()]]);
        aggregate(&FeatureInputs {
            graph: &g, path_counts: &counts, waveform: &wf,
            resolutions: &resolutions, leakage: &rule,
        })
    }

    #[test]
    fn test_aggregate_rows() {
        let (features, edges) = run();
        let k = &features.rows[0];
        assert_eq!((k.node.as_str(), k.node_number, k.degree, k.paths), ("k", 0, 2, 1));
        assert!(k.xor && k.mux && !k.and && !k.or);
        assert!(k.label);
        // key_reg: 5; din[2:1]: 2 + 3; din[9:3] clamps to bit 3: 4
        assert_eq!(k.hamming_distance, 5 + 5 + 4);

        let m = &features.rows[1];
        assert_eq!((m.degree, m.paths), (2, 0));
        assert!(m.mux && !m.label);
        // "en" is ambiguous without module context; din resolves uniquely
        assert_eq!(m.hamming_distance, 10);

        let z = &features.rows[2];
        assert_eq!((z.text.as_str(), z.hamming_distance, z.degree), ("", 0, 2));

        assert_eq!(edges.rows, vec![
            EdgeRow { source: 0, target: 1 },
            EdgeRow { source: 1, target: 2 },
            EdgeRow { source: 0, target: 2 },
        ]);
    }

    #[test]
    fn test_csv_round_trip() {
        let (features, edges) = run();
        let dir = TempDir::new("leakfeat_features").unwrap();
        let fp = dir.path().join("features.csv");
        let ep = dir.path().join("edges.csv");
        features.write_csv(&fp).unwrap();
        edges.write_csv(&ep).unwrap();

        let header = std::fs::read_to_string(&fp).unwrap();
        assert_eq!(header.lines().next().unwrap(),
                   "node,Degree,Hamming distance,Node,Paths,and,label,mux,node_number,or,xor");
        assert_eq!(FeatureTable::read_csv(&fp).unwrap(), features);
        assert_eq!(EdgeTable::read_csv(&ep).unwrap(), edges);
        assert!(std::fs::read_to_string(&ep).unwrap().starts_with("source,target\n"));
    }

    #[test]
    fn test_bad_flag_cell_is_rejected() {
        let dir = TempDir::new("leakfeat_features").unwrap();
        let fp = dir.path().join("features.csv");
        std::fs::write(&fp, "node,Degree,Hamming distance,Node,Paths,and,label,mux,node_number,or,xor\n\
                             a,1,0,,0,2,0,0,0,0,0\n").unwrap();
        assert!(matches!(FeatureTable::read_csv(&fp), Err(ExtractError::Csv { .. })));
    }
}
