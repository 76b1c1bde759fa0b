// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Binary leakage labels from keyword rules.

use std::collections::BTreeMap;

/// A node is leaky iff some group has all of its keywords contained,
/// case-insensitively, in the node label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeakageRule {
    groups: Vec<Vec<String>>,
}

impl LeakageRule {
    pub fn new(groups: &[Vec<String>]) -> LeakageRule {
        LeakageRule {
            groups: groups.iter()
                .map(|g| g.iter().map(|k| k.to_lowercase()).collect())
                .collect()
        }
    }

    /// The rule that labels nothing.
    pub fn none() -> LeakageRule {
        LeakageRule::default()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn label(&self, text: &str) -> u8 {
        let text = text.to_lowercase();
        self.groups.iter()
            .any(|g| g.iter().all(|kw| text.contains(kw.as_str())))
            as u8
    }
}

/// Keyword groups of the reference designs, keyed by rule-set name.
pub fn builtin_rule_sets() -> BTreeMap<String, Vec<Vec<String>>> {
    const SETS: &[(&str, &[&[&str]])] = &[
        ("train", &[&["subbytes", "s_box"], &["invsubbytes", "is_box"],
                    &["subword", "s_box"], &["MixColumn"]]),
        ("AES_PPRM1", &[&["SBOX"], &["Mixcolumn"], &["MX"], &["sb"]]),
        ("AES_PPRM3", &[&["Sbox"], &["Mixcolumn"], &["MX"]]),
        ("AES_TBL", &[&["SBOX"], &["Mixcolumn"], &["MX"], &["EC", "sb"],
                      &["EC", "di"], &["EC", "ki"], &["EC", "so"]]),
        ("RSA", &[&["MODEXP_SEQ"], &["MULT_BLK"]]),
        ("SABER", &[&["sa"], &[":"]]),
        ("PRESENT", &[&["SBOX"]]),
    ];
    SETS.iter().map(|(name, groups)| {
        (name.to_string(),
         groups.iter().map(|g| g.iter().map(|k| k.to_string()).collect()).collect())
    }).collect()
}
