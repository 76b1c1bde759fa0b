// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Cross-namespace signal name resolution.
//!
//! HDL names (`module.variable`) and waveform paths
//! (`top.u_inst0.variable[7:0]`) rarely agree literally: instance
//! names abbreviate or number module names, and underscores and case
//! differ. We index waveform signals by normalized base name and pick
//! the best-scoring candidate per query. Every resolution is either a
//! signal of the [`WaveformSummary`] or no match, never a guess.

use compact_str::CompactString;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use crate::hdl::HdlSignal;
use crate::waveform::WaveformSummary;

/// Normalize a module name or hierarchy segment: lowercase, drop
/// underscores, then strip trailing digits.
///
/// `Inv_MixColumn0` and `invmixcolumn` both become `invmixcolumn`.
/// Stripping after dropping underscores keeps this idempotent.
pub fn normalize_module(name: &str) -> String {
    let mut s = normalize_variable(name);
    let keep = s.trim_end_matches(|c: char| c.is_ascii_digit()).len();
    s.truncate(keep);
    s
}

/// Normalize a variable name: lowercase and drop underscores.
/// Digits are kept, so `a00` and `a33` stay distinct.
pub fn normalize_variable(name: &str) -> String {
    name.chars().filter(|&c| c != '_').flat_map(|c| c.to_lowercase()).collect()
}

/// Split a waveform path into its hierarchy segments and base name
/// (without a trailing `[..]` suffix).
pub fn split_signal_path(path: &str) -> (Vec<&str>, &str) {
    let mut parts = path.split('.').collect::<Vec<_>>();
    let last = parts.pop().unwrap_or("");
    let base = match last.rfind('[') {
        Some(i) if last.ends_with(']') => &last[..i],
        _ => last,
    };
    (parts, base.trim())
}

/// Where a query comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrigin {
    /// A formal HDL declaration.
    Declaration,
    /// A variable mentioned in a node label. Without module context,
    /// only a unique candidate is accepted.
    Label,
}

/// One name to resolve.
#[derive(Debug, Clone, Copy)]
pub struct SignalQuery<'a> {
    /// Module context, possibly a dotted path.
    pub module: Option<&'a str>,
    pub variable: &'a str,
    pub width: Option<u32>,
    pub origin: QueryOrigin,
}

/// The resolution interface: a query maps to a signal index in the
/// waveform summary, or to no match.
///
/// Implementations that can fail (e.g. ones talking to an external
/// service) must turn failures into `None`.
pub trait Resolve {
    fn resolve(&self, query: &SignalQuery<'_>) -> Option<usize>;

    /// Whether the queried name is a known compile-time constant. Label
    /// references to constants are dropped before resolution.
    fn is_constant(&self, _query: &SignalQuery<'_>) -> bool {
        false
    }
}

/// Consults `secondary` only when `primary` finds nothing.
pub struct FallbackResolver<P, S> {
    pub primary: P,
    pub secondary: S,
}

impl<P: Resolve, S: Resolve> Resolve for FallbackResolver<P, S> {
    fn resolve(&self, query: &SignalQuery<'_>) -> Option<usize> {
        self.primary.resolve(query)
            .or_else(|| self.secondary.resolve(query))
    }

    fn is_constant(&self, query: &SignalQuery<'_>) -> bool {
        self.primary.is_constant(query) || self.secondary.is_constant(query)
    }
}

/// A resolver that never matches.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMatch;

impl Resolve for NoMatch {
    fn resolve(&self, _: &SignalQuery<'_>) -> Option<usize> {
        None
    }
}

impl<R: Resolve + ?Sized> Resolve for &R {
    fn resolve(&self, query: &SignalQuery<'_>) -> Option<usize> {
        (**self).resolve(query)
    }

    fn is_constant(&self, query: &SignalQuery<'_>) -> bool {
        (**self).is_constant(query)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    signal: usize,
    full_path: CompactString,
    norm_segments: Vec<String>,
    width: u32,
}

/// Scoring weights are kept in tenths so that all arithmetic is
/// integral and ties are exact.
const SCORE_MODULE: i64 = 100;
const SCORE_WIDTH: i64 = 50;
const SCORE_INCLUDE: i64 = 20;
const SCORE_EXCLUDE: i64 = -40;
const SCORE_PER_SEGMENT: i64 = -1;

/// The deterministic, offline resolver.
pub struct ScoredResolver {
    by_base: HashMap<String, Vec<Candidate>>,
    include_scopes: Vec<String>,
    exclude_scopes: Vec<String>,
}

impl ScoredResolver {
    pub fn new(
        summary: &WaveformSummary,
        include_scopes: &[String],
        exclude_scopes: &[String],
    ) -> ScoredResolver {
        let mut by_base: HashMap<String, Vec<Candidate>> = HashMap::new();
        for (signal, (path, width)) in summary.paths_and_widths().enumerate() {
            let (segments, base) = split_signal_path(path);
            by_base.entry(normalize_variable(base)).or_default().push(Candidate {
                signal,
                full_path: path.into(),
                norm_segments: segments.iter().map(|s| normalize_module(s)).collect(),
                width,
            });
        }
        ScoredResolver {
            by_base,
            include_scopes: include_scopes.to_vec(),
            exclude_scopes: exclude_scopes.to_vec(),
        }
    }

    fn score(&self, cand: &Candidate, modules: &[String], width: Option<u32>) -> i64 {
        let mut score = 0;
        if modules.iter().any(|m| cand.norm_segments.contains(m)) {
            score += SCORE_MODULE;
        }
        if width == Some(cand.width) {
            score += SCORE_WIDTH;
        }
        for scope in &self.include_scopes {
            if cand.full_path.contains(scope.as_str()) {
                score += SCORE_INCLUDE;
            }
        }
        for scope in &self.exclude_scopes {
            if cand.full_path.contains(scope.as_str()) {
                score += SCORE_EXCLUDE;
            }
        }
        score + SCORE_PER_SEGMENT * cand.norm_segments.len() as i64
    }
}

impl Resolve for ScoredResolver {
    fn resolve(&self, query: &SignalQuery<'_>) -> Option<usize> {
        let cands = self.by_base.get(&normalize_variable(query.variable))?;
        let modules = query.module.map(|m| {
            m.split('.').map(normalize_module).filter(|s| !s.is_empty()).collect::<Vec<_>>()
        }).unwrap_or_default();
        if query.origin == QueryOrigin::Label && modules.is_empty() {
            return match cands.as_slice() {
                [only] => Some(only.signal),
                _ => None,
            }
        }
        let mut best: Option<(i64, usize)> = None;
        for cand in cands {
            let score = self.score(cand, &modules, query.width);
            // strictly greater: the first enumerated candidate wins ties.
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, cand.signal));
            }
        }
        best.map(|(_, signal)| signal)
    }
}

/// Declaration-level resolutions used as seeds for label queries
/// that carry module context, plus the declared constants.
#[derive(Debug, Default)]
pub struct DeclarationSeeds {
    seeds: HashMap<(String, String), usize>,
    /// `(module, name)` of every `parameter` and `localparam`.
    constants: HashSet<(String, String)>,
    /// Constant names regardless of module.
    constant_names: HashSet<String>,
}

impl DeclarationSeeds {
    pub fn from_resolutions(resolutions: &[HdlResolution]) -> Self {
        let mut out = DeclarationSeeds::default();
        for r in resolutions {
            let Some(module) = &r.signal.module else { continue };
            let key = (normalize_module(module), normalize_variable(&r.signal.name));
            if r.signal.constant {
                out.constant_names.insert(key.1.clone());
                out.constants.insert(key);
            } else if let Some(signal) = r.resolved {
                out.seeds.entry(key).or_insert(signal);
            }
        }
        out
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }
}

impl Resolve for DeclarationSeeds {
    fn resolve(&self, query: &SignalQuery<'_>) -> Option<usize> {
        let module = query.module?;
        let var = normalize_variable(query.variable);
        // innermost context segment first
        module.rsplit('.').find_map(|m| {
            self.seeds.get(&(normalize_module(m), var.clone())).copied()
        })
    }

    /// With module context, the constant must be declared in one of the
    /// context's modules. Without it, in any module.
    fn is_constant(&self, query: &SignalQuery<'_>) -> bool {
        let var = normalize_variable(query.variable);
        match query.module {
            Some(module) => module.rsplit('.').any(|m| {
                self.constants.contains(&(normalize_module(m), var.clone()))
            }),
            None => self.constant_names.contains(&var),
        }
    }
}

/// An HDL declaration and the waveform signal it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlResolution {
    pub signal: HdlSignal,
    pub resolved: Option<usize>,
}

/// Resolve every HDL declaration against the waveform. Constants
/// never resolve.
pub fn resolve_declarations(
    decls: &[HdlSignal], resolver: &impl Resolve
) -> Vec<HdlResolution> {
    decls.iter().map(|d| HdlResolution {
        signal: d.clone(),
        resolved: if d.constant {
            None
        } else {
            resolver.resolve(&SignalQuery {
                module: d.module.as_deref(),
                variable: &d.name,
                width: d.width,
                origin: QueryOrigin::Declaration,
            })
        },
    }).collect()
}

/// A variable reference found in a node label, with its bit select
/// as `(hi, lo)` when the select is numeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LabelRef {
    pub name: String,
    pub select: Option<(i64, i64)>,
}

/// The module context and variable references of one label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelRefs {
    pub module: Option<String>,
    pub refs: Vec<LabelRef>,
}

lazy_static! {
    static ref LABEL_CONTEXT: Regex = Regex::new(r"^(.+?)\.\d+:").expect("static regex");
    static ref NUMERIC_SELECT: Regex =
        Regex::new(r"^\s*(\d+)\s*(?::\s*(\d+)\s*)?$").expect("static regex");
}

const HDL_KEYWORDS: &[&str] = &[
    "always", "and", "assign", "begin", "case", "casex", "casez", "default",
    "else", "end", "endcase", "endfunction", "endgenerate", "endmodule",
    "endtask", "for", "function", "generate", "genvar", "if", "initial",
    "inout", "input", "integer", "localparam", "logic", "module", "negedge",
    "not", "or", "output", "parameter", "posedge", "reg", "signed", "task",
    "unsigned", "while", "wire", "xor",
];

/// Split a label into module context and HDL code.
///
/// A label whose first line starts with `Module.Path.<line>:` names its
/// module. The code is the remaining lines of a multi-line label, or the
/// text after the prefix of a single-line one. Any other label is all
/// code.
pub fn split_label(label: &str) -> (Option<&str>, &str) {
    let first = label.split_once('\n').map_or(label, |(first, _)| first);
    let Some(caps) = LABEL_CONTEXT.captures(first) else {
        return (None, label)
    };
    let (Some(prefix), Some(module)) = (caps.get(0), caps.get(1)) else {
        return (None, label)
    };
    match label.split_once('\n') {
        Some((_, code)) => (Some(module.as_str()), code),
        None => (Some(module.as_str()), &label[prefix.end()..]),
    }
}

/// Extract the variable references of a label.
pub fn parse_label_refs(label: &str) -> LabelRefs {
    let (module, code) = split_label(label);
    let bytes = code.as_bytes();
    let mut refs: Vec<LabelRef> = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c.is_ascii_digit() {
            // numbers and sized literals like 8'hFF
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || matches!(bytes[i], b'_' | b'\'')) {
                i += 1;
            }
            continue
        }
        if !(c.is_ascii_alphabetic() || c == b'_') {
            i += 1;
            continue
        }
        let start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        let name = &code[start..i];
        let prev = if start > 0 { bytes[start - 1] } else { b' ' };
        if matches!(prev, b'\'' | b'$' | b'`') || HDL_KEYWORDS.contains(&name) {
            continue
        }
        let mut j = i;
        while j < bytes.len() && bytes[j].is_ascii_whitespace() && bytes[j] != b'\n' {
            j += 1;
        }
        let mut select = None;
        if j < bytes.len() && bytes[j] == b'[' {
            if let Some(close) = code[j..].find(']') {
                let inner = &code[j + 1..j + close];
                select = NUMERIC_SELECT.captures(inner).and_then(|c| {
                    let hi = c.get(1)?.as_str().parse::<i64>().ok()?;
                    let lo = match c.get(2) {
                        Some(m) => m.as_str().parse::<i64>().ok()?,
                        None => hi,
                    };
                    Some((hi, lo))
                });
            }
        }
        let r = LabelRef { name: name.to_string(), select };
        if !refs.contains(&r) {
            refs.push(r);
        }
    }
    LabelRefs { module: module.map(|m| m.to_string()), refs }
}

/// A label reference after resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedRef {
    pub variable: String,
    /// Waveform path, or None for no match.
    pub signal: Option<CompactString>,
    pub hi: i64,
    pub lo: i64,
}

/// Resolve the references of one label.
///
/// A reference without a numeric select covers the whole resolved
/// signal; unresolved references keep `(0, 0)` and contribute nothing.
/// References the resolver knows as constants are dropped.
pub fn resolve_label(
    label: &str, resolver: &impl Resolve, summary: &WaveformSummary
) -> Vec<ResolvedRef> {
    let refs = parse_label_refs(label);
    refs.refs.iter().filter_map(|r| {
        let query = SignalQuery {
            module: refs.module.as_deref(),
            variable: &r.name,
            width: None,
            origin: QueryOrigin::Label,
        };
        if resolver.is_constant(&query) {
            return None
        }
        let signal = resolver.resolve(&query).and_then(|i| summary.signals.get(i));
        let (hi, lo) = match (r.select, signal) {
            (Some(sel), _) => sel,
            (None, Some(s)) => (s.record.width as i64 - 1, 0),
            (None, None) => (0, 0),
        };
        Some(ResolvedRef {
            variable: r.name.clone(),
            signal: signal.map(|s| s.path.clone()),
            hi, lo,
        })
    }).collect()
}

/// Resolved references per distinct label text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionTable {
    pub labels: BTreeMap<String, Vec<ResolvedRef>>,
}

impl ResolutionTable {
    pub fn get(&self, label: &str) -> Option<&[ResolvedRef]> {
        self.labels.get(label).map(|v| v.as_slice())
    }
}
