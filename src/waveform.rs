// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! VCD waveform scanning.
//!
//! The header is parsed once to enumerate every variable with its
//! hierarchical path and width. The value-change section is then
//! streamed token by token through one [`ToggleCounter`] per VCD id
//! code, so the trace is never held in memory.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use vcd_ng::{FFValueChange, FastFlow, FastFlowToken, Parser, ScopeItem, Var};
use crate::error::{ExtractError, Result};
use crate::toggle::{ToggleCounter, ToggleRecord};

/// One waveform signal and its toggle record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalToggles {
    /// Dot-separated hierarchy, base name and optional `[..]` suffix.
    pub path: CompactString,
    pub record: ToggleRecord,
}

/// All signals of one trace, in header enumeration order.
///
/// The position of a signal in [`WaveformSummary::signals`] is its
/// identity for name resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveformSummary {
    pub signals: Vec<SignalToggles>,
}

impl WaveformSummary {
    #[inline]
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Iterate `(path, width)` pairs.
    pub fn paths_and_widths(&self) -> impl Iterator<Item = (&str, u32)> + '_ {
        self.signals.iter().map(|s| (s.path.as_str(), s.record.width))
    }

    /// All records satisfy `len(toggles) == width`.
    pub fn validate(&self) -> bool {
        self.signals.iter().all(|s| s.record.validate())
    }

    /// Write every signal path, one per line.
    pub fn write_signal_dump(&self, path: &Path) -> Result<()> {
        let f = File::create(path).map_err(|e| ExtractError::io(path, e))?;
        let mut buf = BufWriter::new(f);
        for s in &self.signals {
            writeln!(buf, "{}", s.path).map_err(|e| ExtractError::io(path, e))?;
        }
        buf.flush().map_err(|e| ExtractError::io(path, e))
    }
}

/// Full path of a VCD variable below `scope`.
fn var_path(scope: &str, var: &Var) -> CompactString {
    use vcd_ng::ReferenceIndex::*;
    let mut path = CompactString::new(scope);
    if !path.is_empty() {
        path.push('.');
    }
    path.push_str(var.reference.as_str());
    match var.index {
        None => {}
        Some(BitSelect(i)) => path.push_str(&format!("[{}]", i)),
        Some(Range(a, b)) => path.push_str(&format!("[{}:{}]", a, b)),
    }
    path
}

fn collect_vars<'i>(
    items: &'i [ScopeItem], scope: &str,
    out: &mut Vec<(CompactString, &'i Var)>
) {
    for item in items {
        match item {
            ScopeItem::Scope(s) => {
                let sub = match scope {
                    "" => s.identifier.to_string(),
                    _ => format!("{}.{}", scope, s.identifier),
                };
                collect_vars(&s.children[..], &sub, out);
            }
            ScopeItem::Var(var) => out.push((var_path(scope, var), var)),
            #[allow(unreachable_patterns)]
            _ => {}
        }
    }
}

/// Scan a VCD file into per-signal toggle records.
pub fn scan_vcd(path: &Path) -> Result<WaveformSummary> {
    let wave_err = |message: String| ExtractError::Waveform {
        path: path.to_path_buf(), message
    };
    let timer = clilog::stimer!("waveform toggle scan");
    let input_vcd = File::open(path).map_err(|e| ExtractError::io(path, e))?;
    let mut bufrd = BufReader::with_capacity(65536, input_vcd);
    let mut vcd_parser = Parser::new(&mut bufrd);
    let header = vcd_parser.parse_header()
        .map_err(|e| wave_err(format!("cannot parse header: {}", e)))?;
    drop(vcd_parser);
    let mut vcd_file = bufrd.into_inner();
    vcd_file.seek(SeekFrom::Start(0)).map_err(|e| ExtractError::io(path, e))?;
    let mut vcdflow = FastFlow::new(vcd_file, 65536);

    let mut vars = Vec::new();
    collect_vars(&header.items[..], "", &mut vars);

    // aliases share an id code and therefore a counter.
    let mut code2counter = HashMap::new();
    let mut counters = Vec::new();
    let mut signal_counter = Vec::with_capacity(vars.len());
    for (_, var) in &vars {
        let width = var.size.max(1) as u32;
        let c = *code2counter.entry(var.code.0).or_insert_with(|| {
            counters.push(ToggleCounter::new(width));
            counters.len() - 1
        });
        if counters[c].width() != width as usize {
            return Err(wave_err(format!(
                "variable {} redeclares id code with width {} (was {})",
                var.reference, width, counters[c].width())))
        }
        signal_counter.push(c);
    }
    clilog::info!("waveform has {} signals ({} distinct id codes)",
                  vars.len(), counters.len());

    let mut num_changes = 0usize;
    let mut num_unknown = 0usize;
    while let Some(tok) = vcdflow.next_token()
        .map_err(|e| wave_err(format!("cannot read value changes: {}", e)))?
    {
        match tok {
            FastFlowToken::Timestamp(_) => {}
            FastFlowToken::Value(FFValueChange { id, bits }) => {
                num_changes += 1;
                match code2counter.get(&id.0) {
                    Some(&c) => counters[c].push(bits),
                    None => num_unknown += 1,
                }
            }
        }
    }
    if num_unknown > 0 {
        clilog::warn!(VCD_UNKNOWN_ID,
                      "{}: {} value changes reference undeclared id codes",
                      path.display(), num_unknown);
    }
    clilog::debug!("streamed {} value changes", num_changes);

    let records = counters.into_iter().map(|c| c.finish()).collect::<Vec<_>>();
    let signals = vars.into_iter().zip(signal_counter)
        .map(|((path, _), c)| SignalToggles {
            path, record: records[c].clone()
        })
        .collect();
    clilog::finish!(timer);
    Ok(WaveformSummary { signals })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempdir::TempDir;

    const SMALL_VCD: &str = "\
$timescale 1ns $end
$scope module top $end
$scope module dut $end
$var wire 4 ! data [3:0] $end
$var wire 1 \" clk $end
$upscope $end
$var wire 1 \" tb_clk $end
$upscope $end
$enddefinitions $end
#0
$dumpvars
b0000 !
0\"
$end
#1
b0101 !
1\"
#2
b0000 !
0\"
#3
bxxxx !
#4
b1111 !
";

    #[test]
    fn test_scan_small_vcd() {
        let dir = TempDir::new("leakfeat_vcd").unwrap();
        let p = dir.path().join("small.vcd");
        std::fs::write(&p, SMALL_VCD).unwrap();
        let summary = scan_vcd(&p).unwrap();
        assert!(summary.validate());
        let paths = summary.paths_and_widths().collect::<Vec<_>>();
        assert_eq!(paths, vec![
            ("top.dut.data[3:0]", 4),
            ("top.dut.clk", 1),
            ("top.tb_clk", 1),
        ]);
        // the unknown sample separates b0000 from b1111
        assert_eq!(summary.signals[0].record.toggles, vec![2, 0, 2, 0]);
        assert_eq!(summary.signals[1].record.toggles, vec![2]);
        // alias of the same id code
        assert_eq!(summary.signals[2].record, summary.signals[1].record);

        let dump = dir.path().join("signals.txt");
        summary.write_signal_dump(&dump).unwrap();
        let text = std::fs::read_to_string(&dump).unwrap();
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn test_missing_file_names_path() {
        let err = scan_vcd(Path::new("/nonexistent/trace.vcd")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/trace.vcd"));
    }
}
