// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
use std::path::Path;
use leakfeat::cache::CachePolicy;
use leakfeat::config::ExtractConfig;
use leakfeat::dotgraph::Graph;
use leakfeat::error::ExtractError;
use leakfeat::features::{EdgeRow, EdgeTable, FeatureTable};
use leakfeat::pipeline::{extract, ExtractJob};
use tempdir::TempDir;

const DOT: &str = r#"digraph design {
    A [label="DUT.7:\nstate <= state ^ din;"];
    B [label="y = sel ? state[1:0] : 2'b0;"];
    C [label="z = y & key_in;"];
    A -> B -> C;
}
"#;

const VCD: &str = "\
$timescale 1ns $end
$scope module tb $end
$scope module dut $end
$var wire 4 ! state [3:0] $end
$var wire 1 \" sel $end
$var wire 1 % key_in $end
$upscope $end
$upscope $end
$enddefinitions $end
#0
b0000 !
0\"
0%
#1
b0011 !
1\"
1%
#2
b0001 !
0\"
";

const HDL: &str = "
module DUT(input [3:0] state, input sel, input key_in, output z);
  wire din;
endmodule
";

fn job(dir: &Path) -> ExtractJob {
    let mut config = ExtractConfig {
        key_register: "key_in".to_string(),
        cache_dir: Some(dir.join("cache")),
        cache_policy: CachePolicy::Trust,
        label_rules: Some("mine".to_string()),
        ..Default::default()
    };
    config.leakage_rules.insert("mine".to_string(), vec![vec!["state".to_string()]]);
    ExtractJob {
        design: "demo".to_string(),
        dot: dir.join("demo.dot"),
        vcd: dir.join("demo.vcd"),
        hdl: vec![dir.join("demo.v")],
        config,
    }
}

#[test]
fn test_full_pipeline_with_cache_reuse() {
    let dir = TempDir::new("leakfeat_e2e").unwrap();
    std::fs::write(dir.path().join("demo.dot"), DOT).unwrap();
    std::fs::write(dir.path().join("demo.vcd"), VCD).unwrap();
    std::fs::write(dir.path().join("demo.v"), HDL).unwrap();
    let job = job(dir.path());

    let out = extract(&job).unwrap();
    assert_eq!(out.roots, vec![0]);
    let rows = &out.features.rows;
    assert_eq!(rows.iter().map(|r| r.node.as_str()).collect::<Vec<_>>(), vec!["A", "B", "C"]);
    // the key node is reachable from every node of the chain
    assert_eq!(rows.iter().map(|r| r.paths).collect::<Vec<_>>(), vec![1, 1, 1]);
    assert_eq!(rows.iter().map(|r| r.degree).collect::<Vec<_>>(), vec![1, 2, 1]);
    // state toggles [1, 2, 0, 0], sel 2, key_in 1
    assert_eq!(rows.iter().map(|r| r.hamming_distance).collect::<Vec<_>>(), vec![3, 5, 1]);
    assert_eq!(rows.iter().map(|r| r.label).collect::<Vec<_>>(), vec![true, true, false]);
    assert!(rows[0].xor && rows[1].mux && rows[2].and);
    assert_eq!(out.edges.rows, vec![
        EdgeRow { source: 0, target: 1 },
        EdgeRow { source: 1, target: 2 },
    ]);

    let resolved = out.hdl_resolutions.iter()
        .map(|r| (r.signal.key(), r.resolved.map(|i| out.waveform.signals[i].path.to_string())))
        .collect::<Vec<_>>();
    assert_eq!(resolved, vec![
        ("DUT.din".to_string(), None),
        ("DUT.key_in".to_string(), Some("tb.dut.key_in".to_string())),
        ("DUT.sel".to_string(), Some("tb.dut.sel".to_string())),
        ("DUT.state".to_string(), Some("tb.dut.state[3:0]".to_string())),
        ("DUT.z".to_string(), None),
    ]);

    let fp = dir.path().join("features.csv");
    let ep = dir.path().join("edges.csv");
    out.features.write_csv(&fp).unwrap();
    out.edges.write_csv(&ep).unwrap();
    assert_eq!(FeatureTable::read_csv(&fp).unwrap(), out.features);
    assert_eq!(EdgeTable::read_csv(&ep).unwrap(), out.edges);

    // a trusted cache never looks at the trace again
    std::fs::remove_file(dir.path().join("demo.vcd")).unwrap();
    let again = extract(&job).unwrap();
    assert_eq!(again.features, out.features);

    let mut rebuild = job.clone();
    rebuild.config.cache_policy = CachePolicy::Rebuild;
    assert!(matches!(extract(&rebuild), Err(ExtractError::Io { .. })));
}

#[test]
fn test_chain_with_key_at_head() {
    let g = Graph::from_dot_str(
        r#"digraph { A [label="KEY"]; B; C; A -> B -> C; }"#, "KEY", Path::new("chain.dot")
    ).unwrap();
    assert_eq!(leakfeat::paths::graph_path_counts(&g), vec![1, 0, 0]);
}

#[test]
fn test_cyclic_top_level_falls_back_to_first_node() {
    let g = Graph::from_dot_str("digraph { a -> b; b -> a; }", "KEY", Path::new("cyc.dot"))
        .unwrap();
    assert!(matches!(g.roots(), Err(ExtractError::NoRoots)));
    assert_eq!(g.roots_or_first(), vec![0]);
}

#[test]
fn test_malformed_inputs_name_the_file() {
    let dir = TempDir::new("leakfeat_e2e").unwrap();
    std::fs::write(dir.path().join("demo.dot"), "digraph { a -> ; }").unwrap();
    std::fs::write(dir.path().join("demo.vcd"), VCD).unwrap();
    std::fs::write(dir.path().join("demo.v"), HDL).unwrap();
    let err = extract(&job(dir.path())).unwrap_err();
    assert!(matches!(err, ExtractError::DotSyntax { .. }));
    assert!(err.to_string().contains("demo.dot"));
}
