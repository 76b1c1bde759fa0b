// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Gate-label operator classification.
//!
//! A label is free text (often an HDL fragment). Each operator class
//! has a few heuristic patterns; a class flag is set iff any of its
//! patterns occurs at least once.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// The operator classes we report as features.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    And,
    Or,
    Xor,
    Mux,
}

/// Presence flags for the operator classes of one label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OpFlags {
    pub and: bool,
    pub or: bool,
    pub xor: bool,
    pub mux: bool,
}

impl OpFlags {
    fn set(&mut self, class: OpClass) {
        match class {
            OpClass::And => self.and = true,
            OpClass::Or => self.or = true,
            OpClass::Xor => self.xor = true,
            OpClass::Mux => self.mux = true,
        }
    }

    pub fn get(&self, class: OpClass) -> bool {
        match class {
            OpClass::And => self.and,
            OpClass::Or => self.or,
            OpClass::Xor => self.xor,
            OpClass::Mux => self.mux,
        }
    }
}

lazy_static! {
    /// (pattern, class) rules, evaluated independently.
    ///
    /// `(^|[^~])&` is the lookbehind-free form of "an `&` not
    /// immediately preceded by `~`": it matches iff at least one `&`
    /// sits at the start or after a non-`~` character, so `~&` alone
    /// (reduction nand) does not count but `~a & b` does.
    static ref OP_RULES: Vec<(Regex, OpClass)> = [
        (r"(?i)\band\b", OpClass::And),
        (r"(?:^|[^~])&", OpClass::And),
        (r"(?i)\bor\b", OpClass::Or),
        (r"(?:^|[^~])\|", OpClass::Or),
        (r"(?i)\bxor\b", OpClass::Xor),
        (r"\^~|~\^|\^", OpClass::Xor),
        (r"(?i)\bmux\b", OpClass::Mux),
        (r"\?.*?:", OpClass::Mux),
        (r"\[\s*\d+\s*:\s*\d+\s*\]", OpClass::Mux),
        (r"(?is)\bcase\b.*?\bendcase\b", OpClass::Mux),
    ].into_iter().map(|(re, class)| {
        (Regex::new(re).expect("static operator rule"), class)
    }).collect();
}

/// Classify one label. Pure and deterministic.
pub fn classify_label(label: &str) -> OpFlags {
    let mut flags = OpFlags::default();
    for (re, class) in OP_RULES.iter() {
        if !flags.get(*class) && re.is_match(label) {
            flags.set(*class);
        }
    }
    flags
}
