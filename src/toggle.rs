// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Per-bit toggle counting of waveform samples.

use serde::{Deserialize, Serialize};

/// Toggle counts of one signal, LSB first.
///
/// `toggles.len() == width` always holds for records built here or
/// accepted by [`ToggleRecord::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleRecord {
    pub width: u32,
    pub toggles: Vec<u64>,
}

impl ToggleRecord {
    pub fn validate(&self) -> bool {
        self.width >= 1 && self.toggles.len() == self.width as usize
    }

    /// Sum of toggles over bits `lo..=hi`, after swapping a reversed
    /// range and clamping both ends into `[0, width - 1]`.
    pub fn range_total(&self, hi: i64, lo: i64) -> u64 {
        let max = self.toggles.len() as i64 - 1;
        if max < 0 {
            return 0
        }
        let (hi, lo) = if hi < lo { (lo, hi) } else { (hi, lo) };
        let hi = hi.clamp(0, max) as usize;
        let lo = lo.clamp(0, max) as usize;
        self.toggles[lo..=hi].iter().sum()
    }

    pub fn total(&self) -> u64 {
        self.toggles.iter().sum()
    }
}

/// Normalize one raw sample to exactly `width` bits, LSB first.
///
/// A bare `0` or `1` is replicated across the width. Anything else
/// is a binary vector, with an optional `b`/`B` prefix, right-aligned:
/// zero-extended on the MSB side or truncated to its low bits.
/// Returns None for indeterminate values (`x`, `z`, reals, ...).
pub fn normalize_bits(raw: &[u8], width: usize) -> Option<Vec<u8>> {
    if let [c @ (b'0' | b'1')] = raw {
        return Some(vec![*c - b'0'; width])
    }
    let digits = match raw {
        [b'b' | b'B', rest @ ..] => rest,
        _ => raw,
    };
    if digits.is_empty() || !digits.iter().all(|&c| c == b'0' || c == b'1') {
        return None
    }
    let mut bits = vec![0u8; width];
    for (i, &c) in digits.iter().rev().take(width).enumerate() {
        bits[i] = c - b'0';
    }
    Some(bits)
}

/// Streaming toggle counter for one signal.
///
/// Only the previous valid sample is kept. An indeterminate sample
/// forgets it, so the next valid sample is never compared across the
/// gap.
#[derive(Debug, Clone)]
pub struct ToggleCounter {
    prev: Option<Vec<u8>>,
    toggles: Vec<u64>,
}

impl ToggleCounter {
    pub fn new(width: u32) -> Self {
        ToggleCounter {
            prev: None,
            toggles: vec![0; width.max(1) as usize],
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.toggles.len()
    }

    pub fn push(&mut self, raw: &[u8]) {
        let bits = match normalize_bits(raw, self.width()) {
            Some(bits) => bits,
            None => {
                self.prev = None;
                return
            }
        };
        if let Some(prev) = &self.prev {
            for (i, (a, b)) in prev.iter().zip(bits.iter()).enumerate() {
                if a != b {
                    self.toggles[i] += 1;
                }
            }
        }
        self.prev = Some(bits);
    }

    pub fn finish(self) -> ToggleRecord {
        ToggleRecord {
            width: self.toggles.len() as u32,
            toggles: self.toggles,
        }
    }
}

/// Count toggles of a whole (timestamp, value) sequence.
/// Timestamps only fix the order; they are not inspected.
pub fn count_toggles<'a, T>(
    width: u32,
    samples: impl IntoIterator<Item = (T, &'a [u8])>
) -> ToggleRecord {
    let mut counter = ToggleCounter::new(width);
    for (_, v) in samples {
        counter.push(v);
    }
    counter.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(width: u32, values: &[&str]) -> Vec<u64> {
        count_toggles(width, values.iter().enumerate().map(|(t, v)| (t, v.as_bytes())))
            .toggles
    }

    #[test]
    fn test_normalize_bits() {
        assert_eq!(normalize_bits(b"1", 4), Some(vec![1, 1, 1, 1]));
        assert_eq!(normalize_bits(b"0", 3), Some(vec![0, 0, 0]));
        assert_eq!(normalize_bits(b"b10", 4), Some(vec![0, 1, 0, 0]));
        assert_eq!(normalize_bits(b"0110", 4), Some(vec![0, 1, 1, 0]));
        // truncated to the low bits
        assert_eq!(normalize_bits(b"b1101", 2), Some(vec![1, 0]));
        assert_eq!(normalize_bits(b"bx1", 2), None);
        assert_eq!(normalize_bits(b"z", 1), None);
        assert_eq!(normalize_bits(b"b", 1), None);
        assert_eq!(normalize_bits(b"r1.5", 1), None);
    }

    #[test]
    fn test_lsb_first_counts() {
        assert_eq!(run(4, &["b0000", "b0101", "b0000"]), vec![2, 0, 2, 0]);
    }

    #[test]
    fn test_scalar_and_replication() {
        assert_eq!(run(1, &["0", "1", "1", "0"]), vec![2]);
        // a bare digit sets every bit
        assert_eq!(run(3, &["0", "1"]), vec![1, 1, 1]);
    }

    #[test]
    fn test_indeterminate_resets_previous() {
        let with_gap = run(2, &["b00", "b11", "bxx", "b00", "b01"]);
        // the gap is skipped and "b11" is never compared with "b00"
        assert_eq!(with_gap, vec![1 + 1, 1]);
        let leading_x = run(2, &["bxx", "b10", "b00"]);
        assert_eq!(leading_x, vec![0, 1]);
    }

    #[test]
    fn test_short_values_are_zero_extended() {
        assert_eq!(run(4, &["b1", "b1000", "b11"]), vec![2, 1, 0, 2]);
    }

    #[test]
    fn test_range_total() {
        let rec = ToggleRecord { width: 4, toggles: vec![1, 2, 3, 4] };
        assert!(rec.validate());
        assert_eq!(rec.range_total(3, 0), 10);
        assert_eq!(rec.range_total(0, 3), 10);
        assert_eq!(rec.range_total(1, 1), 2);
        assert_eq!(rec.range_total(10, 2), 7);
        assert_eq!(rec.range_total(-1, -5), 1);
        assert_eq!(rec.total(), 10);
        assert!(!ToggleRecord { width: 3, toggles: vec![0; 2] }.validate());
    }
}
