//! Change detection between build runs.
//!
//! A [`FileChangeDetector`] remembers a fingerprint per path from the last
//! *successful* run and compares it with the fingerprint observed during the
//! current run. Fingerprints are either content hashes (SHA-256, survives
//! `git checkout` resetting mtimes) or modification time plus length.
//!
//! ## Run lifecycle
//!
//! ```text
//! begin_run()   forget this run's observations
//! changed(p)    fingerprint p once per run, compare with committed
//! commit()      promote this run's observations to committed
//! abandon()     or, after a failure, forget what the run saw change
//! ```
//!
//! Within one run every caller sees the same answer for the same path, no
//! matter how many jobs ask or in which order. A failed run is never
//! committed, so everything it saw change is reported changed again next
//! time, including files reverted in the meantime.
//! Nothing is written to disk: a fresh process rebuilds everything.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Answers "did this file change since the last successful build?".
pub trait ChangeDetector: Send + Sync {
    fn changed(&self, path: &Path) -> bool;

    /// Whether any of `paths` changed. Every path is checked, so each one
    /// is part of the baseline recorded by this run.
    fn changed_any(&self, paths: &[PathBuf]) -> bool {
        paths.iter().fold(false, |acc, p| self.changed(p) || acc)
    }
}

/// How file fingerprints are computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FreshnessMode {
    /// SHA-256 of the file contents.
    #[default]
    Hash,
    /// Modification time and size.
    Mtime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fingerprint {
    Missing,
    Hash(String),
    Mtime { modified: SystemTime, len: u64 },
}

impl Fingerprint {
    pub fn of(path: &Path, mode: FreshnessMode) -> Self {
        match mode {
            FreshnessMode::Hash => match hash_file(path) {
                Ok(hash) => Self::Hash(hash),
                Err(_) => Self::Missing,
            },
            FreshnessMode::Mtime => match std::fs::metadata(path) {
                Ok(meta) => Self::Mtime {
                    modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
                    len: meta.len(),
                },
                Err(_) => Self::Missing,
            },
        }
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let digest = Sha256::digest(&bytes);
    Ok(format!("{:x}", digest))
}

pub struct FileChangeDetector {
    mode: FreshnessMode,
    committed: DashMap<PathBuf, Fingerprint>,
    current: DashMap<PathBuf, Fingerprint>,
}

impl FileChangeDetector {
    pub fn new(mode: FreshnessMode) -> Self {
        Self {
            mode,
            committed: DashMap::new(),
            current: DashMap::new(),
        }
    }

    pub fn mode(&self) -> FreshnessMode {
        self.mode
    }

    /// Start a new run. Observations from an uncommitted run are dropped.
    pub fn begin_run(&self) {
        self.current.clear();
    }

    /// Record this run's fingerprints as the new baseline.
    pub fn commit(&self) {
        for entry in self.current.iter() {
            self.committed
                .insert(entry.key().clone(), entry.value().clone());
        }
        self.current.clear();
    }

    /// Close a failed run. Every path this run saw as changed leaves the
    /// baseline, so it reports changed again even if the file is restored
    /// to its committed contents. Work a failed run did is never trusted.
    pub fn abandon(&self) {
        for entry in self.current.iter() {
            let stale = self
                .committed
                .get(entry.key())
                .is_some_and(|before| *before != *entry.value());
            if stale {
                self.committed.remove(entry.key());
            }
        }
        self.current.clear();
    }

    /// Drop the baseline so that every path reports changed.
    pub fn forget_all(&self) {
        self.committed.clear();
        self.current.clear();
    }

    /// Number of paths in the committed baseline.
    pub fn tracked(&self) -> usize {
        self.committed.len()
    }

    fn observe(&self, path: &Path) -> Fingerprint {
        if let Some(fp) = self.current.get(path) {
            return fp.clone();
        }
        // Fingerprint outside the shard lock; first writer wins so that
        // concurrent callers agree for the rest of the run.
        let fp = Fingerprint::of(path, self.mode);
        self.current
            .entry(path.to_path_buf())
            .or_insert(fp)
            .clone()
    }
}

impl Default for FileChangeDetector {
    fn default() -> Self {
        Self::new(FreshnessMode::default())
    }
}

impl ChangeDetector for FileChangeDetector {
    fn changed(&self, path: &Path) -> bool {
        let now = self.observe(path);
        match self.committed.get(path) {
            Some(before) => *before != now,
            None => true,
        }
    }
}
