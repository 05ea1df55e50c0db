//! Run state carried between runs for one resource.
//!
//! The state file is the bincode-encoded [`ResultBundle`] of the previous
//! run. Loading it yields the next iteration number and the best
//! configurations found so far; saving replaces it atomically.

use crate::config::EnsembleParams;
use crate::ensemble::{BestResults, ResultBundle};
use crate::error::{EnsembleError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// State loaded at the start of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub path: PathBuf,
    pub iteration: u64,
    pub best_first: BestResults,
    pub best_second: BestResults,
}

impl SessionState {
    /// Location of the state file for `resource` and the configured model family.
    pub fn state_path(params: &EnsembleParams, resource: &str) -> PathBuf {
        params
            .state_dir
            .join(format!("{}_{}.bin", resource, params.model_type.as_str()))
    }

    /// Read the previous bundle, or start fresh when none exists.
    pub fn load_or_init(params: &EnsembleParams, resource: &str) -> Result<Self> {
        let path = Self::state_path(params, resource);
        if !path.exists() {
            info!(path = %path.display(), "no previous state, starting at iteration 0");
            return Ok(Self {
                path,
                iteration: 0,
                best_first: BestResults::new(),
                best_second: BestResults::new(),
            });
        }

        let bundle = read_bundle(&path)?;
        let iteration = bundle.iteration + 1;
        info!(path = %path.display(), iteration, "loaded previous state");
        Ok(Self {
            path,
            iteration,
            best_first: bundle.wind_power.best_results,
            best_second: bundle.wind_power_variability.best_results,
        })
    }

    /// Overwrite the state file with `bundle`.
    pub fn save(&self, bundle: &ResultBundle) -> Result<()> {
        write_bundle(&self.path, bundle)?;
        info!(path = %self.path.display(), iteration = bundle.iteration, "saved state");
        Ok(())
    }
}

fn io_error(path: &Path, e: impl std::fmt::Display) -> EnsembleError {
    EnsembleError::StateIo {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
}

/// Decode a bundle from disk.
pub fn read_bundle(path: &Path) -> Result<ResultBundle> {
    let bytes = fs::read(path).map_err(|e| io_error(path, e))?;
    bincode::deserialize(&bytes).map_err(|e| EnsembleError::StateCorrupt {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Encode `bundle` to a sibling temporary file, then rename it over `path`.
pub fn write_bundle(path: &Path, bundle: &ResultBundle) -> Result<()> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| io_error(dir, e))?;
    }
    let bytes = bincode::serialize(bundle).map_err(|e| io_error(path, e))?;
    let tmp = path.with_extension("bin.tmp");
    fs::write(&tmp, bytes).map_err(|e| io_error(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
    Ok(())
}
