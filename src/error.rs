// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Error type shared by all extraction stages.

use std::path::PathBuf;

/// Everything that can make a feature extraction run fail.
///
/// Every input-related variant names the file it came from.
/// Cache problems are deliberately absent: the cache layer logs
/// and recomputes instead of failing.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("cannot access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}:{line}: malformed graph description: {message}", path.display())]
    DotSyntax {
        path: PathBuf,
        line: usize,
        message: String,
    },
    #[error("{}: malformed waveform trace: {message}", path.display())]
    Waveform { path: PathBuf, message: String },
    #[error("{}: malformed HDL source: {message}", path.display())]
    Hdl { path: PathBuf, message: String },
    #[error("{}: bad configuration: {message}", path.display())]
    Config { path: PathBuf, message: String },
    #[error("{}: csv error: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    /// Every edge source is also an edge destination somewhere.
    #[error("graph has no root nodes (every source node is also a destination)")]
    NoRoots,
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;

impl ExtractError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ExtractError::Io { path: path.into(), source }
    }
}
