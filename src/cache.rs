// SPDX-FileCopyrightText: Copyright (c) 2024 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
// SPDX-License-Identifier: Apache-2.0
//! Design-scoped on-disk artifact cache.
//!
//! Artifacts live at `<cache_dir>/<design>/<design>_<kind>.bare`,
//! serialized with `serde_bare`. Under [`CachePolicy::Trust`] an
//! existing artifact is used as-is: it is NOT checked against the
//! source trace it came from. Rerun with [`CachePolicy::Rebuild`]
//! after the inputs of a design change.
//!
//! Cache failures never fail a run. Unreadable or mismatching
//! artifacts are logged and recomputed from the primary source.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use crate::error::Result;

/// Bumped whenever an artifact payload changes shape.
const CACHE_FORMAT_VERSION: u32 = 1;

/// How existing cache artifacts are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq,
         Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    /// Use existing artifacts without validation against sources.
    #[default]
    Trust,
    /// Ignore existing artifacts and rewrite them.
    Rebuild,
    /// Neither read nor write artifacts.
    Off,
}

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    version: u32,
    design: String,
    payload: T,
}

/// The cache of one design.
#[derive(Debug, Clone)]
pub struct DesignCache {
    dir: Option<PathBuf>,
    design: String,
    policy: CachePolicy,
}

impl DesignCache {
    /// A cache rooted at `cache_dir`. No directory or
    /// [`CachePolicy::Off`] gives a cache that never touches disk.
    pub fn new(cache_dir: Option<&Path>, design: &str, policy: CachePolicy) -> DesignCache {
        let dir = match policy {
            CachePolicy::Off => None,
            _ => cache_dir.map(|d| d.join(design)),
        };
        DesignCache { dir, design: design.to_string(), policy }
    }

    pub fn disabled(design: &str) -> DesignCache {
        DesignCache::new(None, design, CachePolicy::Off)
    }

    pub fn design(&self) -> &str {
        &self.design
    }

    /// Where the artifact `kind` is stored, if caching is enabled.
    pub fn artifact_path(&self, kind: &str) -> Option<PathBuf> {
        self.dir.as_ref()
            .map(|d| d.join(format!("{}_{}.bare", self.design, kind)))
    }

    /// Read an artifact. Any failure yields None after a warning.
    pub fn load<T: DeserializeOwned>(&self, kind: &str) -> Option<T> {
        if self.policy != CachePolicy::Trust {
            return None
        }
        let path = self.artifact_path(kind)?;
        let f = File::open(&path).ok()?;
        let mut buf = BufReader::new(f);
        let env: Envelope<T> = match serde_bare::from_reader(&mut buf) {
            Ok(env) => env,
            Err(e) => {
                clilog::warn!(CACHE_FALLBACK, "cannot decode {}: {}, recomputing",
                              path.display(), e);
                return None
            }
        };
        if env.version != CACHE_FORMAT_VERSION || env.design != self.design {
            clilog::warn!(CACHE_FALLBACK,
                          "{} belongs to design {:?} (format v{}), recomputing",
                          path.display(), env.design, env.version);
            return None
        }
        clilog::info!("loaded cached {} from {}", kind, path.display());
        Some(env.payload)
    }

    /// Write an artifact. Failures are logged and otherwise ignored.
    pub fn store<T: Serialize>(&self, kind: &str, payload: &T) {
        let Some(path) = self.artifact_path(kind) else { return };
        if let Err(e) = self.try_store(&path, payload) {
            clilog::warn!(CACHE_WRITE, "cannot write cache {}: {}",
                          path.display(), e);
            return
        }
        clilog::debug!("cached {} to {}", kind, path.display());
    }

    fn try_store<T: Serialize>(&self, path: &Path, payload: &T) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("bare.tmp");
        let f = File::create(&tmp)?;
        let mut buf = BufWriter::new(f);
        serde_bare::to_writer(&mut buf, &Envelope {
            version: CACHE_FORMAT_VERSION,
            design: self.design.clone(),
            payload,
        }).map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        buf.flush()?;
        drop(buf);
        std::fs::rename(&tmp, path)
    }

    /// Load `kind` if a usable artifact exists, otherwise compute it
    /// from the primary source and store it.
    ///
    /// `is_valid` screens a decoded artifact; a rejected one is
    /// recomputed like an unreadable one.
    pub fn get_or_compute<T, V, F>(&self, kind: &str, is_valid: V, compute: F) -> Result<T>
    where T: Serialize + DeserializeOwned,
          V: FnOnce(&T) -> bool,
          F: FnOnce() -> Result<T>
    {
        if let Some(cached) = self.load::<T>(kind) {
            if is_valid(&cached) {
                return Ok(cached)
            }
            clilog::warn!(CACHE_FALLBACK, "cached {} of design {} is inconsistent, recomputing",
                          kind, self.design);
        }
        let fresh = compute()?;
        self.store(kind, &fresh);
        Ok(fresh)
    }
}
