//! Discovery of external solver binaries.
//!
//! Solver locations live in a `pasim_paths.json` file mapping solver names
//! to executables:
//!
//! ```json
//! { "solvers": { "mcx_like": "/usr/local/bin/mcx" } }
//! ```
//!
//! [`PathConfig::discover`] resolves the file with a fixed priority: an
//! explicitly given path wins, then the user's home directory, then the
//! working directory, then the directory holding the running executable.
//! The first file that exists is used; none existing yields an empty
//! configuration, which only fails later if a stage actually needs an
//! external solver.

use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PATH_FILE_NAME: &str = "pasim_paths.json";

#[derive(Error, Debug)]
pub enum PathConfigError {
    #[error("path configuration {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("path configuration {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathConfig {
    #[serde(default)]
    solvers: BTreeMap<String, PathBuf>,
}

impl PathConfig {
    pub fn empty() -> PathConfig {
        PathConfig::default()
    }

    pub fn from_file(path: &Path) -> Result<PathConfig, PathConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| PathConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| PathConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Resolve the path file by priority. Only an explicitly given path is
    /// an error when unreadable; the searched fallbacks are skipped
    /// silently when absent.
    pub fn discover(explicit: Option<&Path>) -> Result<PathConfig, PathConfigError> {
        if let Some(path) = explicit {
            debug!("loading solver paths from {}", path.display());
            return PathConfig::from_file(path);
        }
        for candidate in search_locations() {
            if candidate.is_file() {
                debug!("found solver paths at {}", candidate.display());
                return PathConfig::from_file(&candidate);
            }
        }
        debug!("no solver path file found, external solvers unavailable");
        Ok(PathConfig::empty())
    }

    pub fn binary_for(&self, solver: &str) -> Option<&Path> {
        self.solvers.get(solver).map(PathBuf::as_path)
    }

    pub fn insert(&mut self, solver: &str, binary: PathBuf) {
        self.solvers.insert(solver.to_string(), binary);
    }
}

fn search_locations() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(home) = std::env::var_os("HOME") {
        candidates.push(PathBuf::from(home).join(PATH_FILE_NAME));
    }
    candidates.push(PathBuf::from(PATH_FILE_NAME));
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join(PATH_FILE_NAME));
        }
    }
    candidates
}
