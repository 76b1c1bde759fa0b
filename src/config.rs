// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Extraction configuration (loaded from JSON).

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use crate::cache::CachePolicy;
use crate::error::{ExtractError, Result};
use crate::leakage::{builtin_rule_sets, LeakageRule};

/// Extraction configuration. Every field is optional in the file;
/// command-line flags override what the file says.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractConfig {
    /// Case-sensitive label substring selecting the key nodes.
    pub key_register: String,
    /// Waveform path substrings that make a candidate more likely.
    pub include_scopes: Vec<String>,
    /// Waveform path substrings that make a candidate less likely.
    pub exclude_scopes: Vec<String>,
    pub cache_dir: Option<PathBuf>,
    pub cache_policy: CachePolicy,
    /// Keyword groups per rule-set name. Merged over the built-in sets.
    pub leakage_rules: BTreeMap<String, Vec<Vec<String>>>,
    /// Rule set to label with. Defaults to the design name.
    pub label_rules: Option<String>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            key_register: String::new(),
            include_scopes: vec![],
            exclude_scopes: vec![],
            cache_dir: None,
            cache_policy: CachePolicy::Trust,
            leakage_rules: builtin_rule_sets(),
            label_rules: None,
        }
    }
}

impl ExtractConfig {
    pub fn from_json_str(src: &str, origin: &Path) -> Result<ExtractConfig> {
        let mut config: ExtractConfig = serde_json::from_str(src)
            .map_err(|e| ExtractError::Config {
                path: origin.to_path_buf(),
                message: e.to_string(),
            })?;
        // rule sets given in the file add to or replace built-in ones.
        let mut rules = builtin_rule_sets();
        rules.append(&mut config.leakage_rules);
        config.leakage_rules = rules;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<ExtractConfig> {
        let src = std::fs::read_to_string(path).map_err(|e| ExtractError::io(path, e))?;
        ExtractConfig::from_json_str(&src, path)
    }

    /// The leakage rule for `design`. An unknown rule-set name labels
    /// every node 0, with a warning.
    pub fn leakage_rule(&self, design: &str) -> LeakageRule {
        let name = self.label_rules.as_deref().unwrap_or(design);
        match self.leakage_rules.get(name) {
            Some(groups) => LeakageRule::new(groups),
            None => {
                clilog::warn!(LABEL_NO_RULES,
                              "no leakage rule set named {:?}, all labels are 0", name);
                LeakageRule::none()
            }
        }
    }
}
