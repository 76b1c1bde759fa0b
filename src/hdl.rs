// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Verilog signal declaration scanning.
//!
//! This is not a Verilog parser. It finds the declarations
//! (`input`, `output`, `inout`, `reg`, `wire`, `logic`, `integer`,
//! `parameter`, `localparam`) inside each `module ... endmodule`
//! block and records the declared names with their widths. Both
//! ANSI port lists and body declarations are recognized.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};
use crate::error::{ExtractError, Result};
use crate::names::HdlResolution;
use crate::waveform::WaveformSummary;

/// One declared HDL signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HdlSignal {
    pub module: Option<String>,
    pub name: String,
    /// None when the declared range is not numeric.
    pub width: Option<u32>,
    /// Declared as `parameter` or `localparam`.
    pub constant: bool,
}

impl HdlSignal {
    /// The `module.variable` key.
    pub fn key(&self) -> String {
        match &self.module {
            Some(m) => format!("{}.{}", m, self.name),
            None => self.name.clone(),
        }
    }
}

lazy_static! {
    static ref COMMENTS: Regex = Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("static regex");
    static ref MODULE: Regex = Regex::new(
        r"(?s)\bmodule\s+([A-Za-z_][A-Za-z0-9_$]*)(.*?)\bendmodule\b"
    ).expect("static regex");
    static ref DECL_KEYWORD: Regex = Regex::new(
        r"\b(input|output|inout|reg|wire|logic|integer|parameter|localparam)\b"
    ).expect("static regex");
    static ref DECL_HEAD: Regex = Regex::new(
        r"^(?:\s+(?:wire|reg|logic|integer|signed|unsigned|var))*\s*(?:\[([^\]]*)\])?"
    ).expect("static regex");
    static ref RANGE: Regex = Regex::new(r"^\s*(-?\d+)\s*:\s*(-?\d+)\s*$").expect("static regex");
    static ref IDENT: Regex = Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_$]*)").expect("static regex");
}

fn is_decl_keyword(word: &str) -> bool {
    matches!(word, "input" | "output" | "inout" | "reg" | "wire" | "logic"
             | "integer" | "parameter" | "localparam")
}

fn range_width(range: Option<&str>, keyword: &str) -> Option<u32> {
    match range {
        None if keyword == "integer" => Some(32),
        None => Some(1),
        Some(r) => {
            let caps = RANGE.captures(r)?;
            let msb = caps[1].parse::<i64>().ok()?;
            let lsb = caps[2].parse::<i64>().ok()?;
            u32::try_from((msb - lsb).abs() + 1).ok()
        }
    }
}

/// Scan one module body, adding `(name -> (width, constant))` entries.
fn scan_module_body(body: &str, out: &mut BTreeMap<String, (Option<u32>, bool)>) {
    let mut resume = 0;
    for kw in DECL_KEYWORD.captures_iter(body) {
        let Some(whole) = kw.get(0) else { continue };
        if whole.start() < resume {
            continue
        }
        let keyword = &kw[1];
        let rest = &body[whole.end()..];
        let Some(head) = DECL_HEAD.captures(rest) else { continue };
        let head_len = head.get(0).map_or(0, |m| m.end());
        let width = range_width(head.get(1).map(|m| m.as_str()), keyword);
        let constant = matches!(keyword, "parameter" | "localparam");
        let names_end = rest[head_len..].find(|c: char| c == ';' || c == ')')
            .map_or(rest.len(), |i| head_len + i);
        let mut consumed = head_len;
        for piece in rest[head_len..names_end].split(',') {
            let Some(ident) = IDENT.captures(piece).and_then(|c| c.get(1)) else {
                consumed += piece.len() + 1;
                continue
            };
            // `input a, output [3:0] b`: the next declaration starts here.
            if is_decl_keyword(ident.as_str()) {
                break
            }
            out.insert(ident.as_str().to_string(), (width, constant));
            consumed += piece.len() + 1;
        }
        resume = whole.end() + consumed.min(names_end);
    }
}

/// Scan Verilog source text. Signals are sorted by key and a later
/// declaration of the same name in a module replaces the earlier one.
pub fn scan_hdl_str(src: &str) -> Vec<HdlSignal> {
    let src = COMMENTS.replace_all(src, " ");
    let mut signals = BTreeMap::new();
    for m in MODULE.captures_iter(&src) {
        let module = m[1].to_string();
        let mut names = BTreeMap::new();
        scan_module_body(&m[2], &mut names);
        for (name, (width, constant)) in names {
            let sig = HdlSignal { module: Some(module.clone()), name, width, constant };
            signals.insert(sig.key(), sig);
        }
    }
    signals.into_values().collect()
}

/// Read and scan several Verilog files.
pub fn read_hdl_files(paths: &[PathBuf]) -> Result<Vec<HdlSignal>> {
    let mut all = BTreeMap::new();
    for path in paths {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::io(path, e))?;
        let src = String::from_utf8(bytes).map_err(|e| ExtractError::Hdl {
            path: path.clone(),
            message: format!("not valid UTF-8 at byte {}", e.utf8_error().valid_up_to()),
        })?;
        let signals = scan_hdl_str(&src);
        if signals.is_empty() {
            clilog::warn!(HDL_NO_DECL, "{}: no module declarations found",
                          path.display());
        }
        clilog::debug!("{}: {} declarations", path.display(), signals.len());
        for s in signals {
            all.insert(s.key(), s);
        }
    }
    Ok(all.into_values().collect())
}

#[derive(Serialize)]
struct ReportRow<'a> {
    hdl_key: String,
    width: Option<u32>,
    waveform_signal: Option<&'a str>,
}

/// Write `(hdl_key, width, waveform_signal)` rows for every
/// declaration, with empty cells for unknown widths and no match.
pub fn write_resolution_report(
    path: &Path, resolutions: &[HdlResolution], summary: &WaveformSummary
) -> Result<()> {
    let csv_err = |source| ExtractError::Csv { path: path.to_path_buf(), source };
    let file = File::create(path).map_err(|e| ExtractError::io(path, e))?;
    let mut wtr = csv::Writer::from_writer(file);
    for r in resolutions {
        wtr.serialize(ReportRow {
            hdl_key: r.signal.key(),
            width: r.signal.width,
            waveform_signal: r.resolved
                .and_then(|i| summary.signals.get(i))
                .map(|s| s.path.as_str()),
        }).map_err(csv_err)?;
    }
    wtr.flush().map_err(|e| ExtractError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widths(signals: &[HdlSignal]) -> Vec<(String, Option<u32>)> {
        signals.iter().map(|s| (s.key(), s.width)).collect()
    }

    #[test]
    fn test_ansi_and_body_declarations() {
        let src = "
// module ignored(); endmodule
module SBox #(parameter N = 8) (
    input clk, input [7:0] din,
    output reg [N-1:0] dout /* trailing */
);
  wire [0:3] nib, other;
  reg flag = 1'b0;
  integer i;
  localparam [2:0] MODE = 3'd4;
endmodule

module Top(input wire rst_n);
  logic [15:8] hi_byte;
endmodule
";
        let sigs = scan_hdl_str(src);
        assert_eq!(widths(&sigs), vec![
            ("SBox.MODE".to_string(), Some(3)),
            ("SBox.N".to_string(), Some(1)),
            ("SBox.clk".to_string(), Some(1)),
            ("SBox.din".to_string(), Some(8)),
            ("SBox.dout".to_string(), None),
            ("SBox.flag".to_string(), Some(1)),
            ("SBox.i".to_string(), Some(32)),
            ("SBox.nib".to_string(), Some(4)),
            ("SBox.other".to_string(), Some(4)),
            ("Top.hi_byte".to_string(), Some(8)),
            ("Top.rst_n".to_string(), Some(1)),
        ]);
        let constants = sigs.iter().filter(|s| s.constant).map(|s| s.key()).collect::<Vec<_>>();
        assert_eq!(constants, vec!["SBox.MODE", "SBox.N"]);
    }

    #[test]
    fn test_later_declaration_wins() {
        let sigs = scan_hdl_str("module m(q); output q; reg [3:0] q; endmodule");
        assert_eq!(widths(&sigs), vec![("m.q".to_string(), Some(4))]);
    }

    #[test]
    fn test_resolution_report() {
        use crate::toggle::ToggleRecord;
        use crate::waveform::SignalToggles;
        let summary = WaveformSummary {
            signals: vec![SignalToggles {
                path: "top.m.q".into(),
                record: ToggleRecord { width: 4, toggles: vec![0; 4] },
            }]
        };
        let sig = |name: &str, width| HdlSignal {
            module: Some("m".into()), name: name.into(), width, constant: false
        };
        let resolutions = vec![
            HdlResolution { signal: sig("q", Some(4)), resolved: Some(0) },
            HdlResolution { signal: sig("z", None), resolved: None },
        ];
        let dir = tempdir::TempDir::new("leakfeat_hdl").unwrap();
        let p = dir.path().join("report.csv");
        write_resolution_report(&p, &resolutions, &summary).unwrap();
        assert_eq!(std::fs::read_to_string(&p).unwrap(),
                   "hdl_key,width,waveform_signal\nm.q,4,top.m.q\nm.z,,\n");
    }

    #[test]
    fn test_no_modules() {
        assert!(scan_hdl_str("wire a; // not in a module").is_empty());
    }
}
