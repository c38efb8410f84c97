//! Run configuration, with built-in defaults for each program.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::filter::CompressionParameters;
use crate::selection::{DEFAULT_CHUNK_LIMIT, DEFAULT_PREVIEW_LENGTH, DEFAULT_PREVIEW_ROWS, Region};
use crate::sequencer::Sequencer;
use crate::storage::Backend;

const DEFAULT_PAUSE_MS: u64 = 500;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub input: PathBuf,
    #[serde(default)]
    pub output: Option<PathBuf>,
    /// Inferred from the input path when absent.
    #[serde(default)]
    pub backend: Option<Backend>,
    pub datasets: Vec<String>,
    pub preview_rows: u64,
    pub preview_length: u64,
    pub chunk_limit: u64,
    pub filter: CompressionParameters,
    /// Delay between datasets, in milliseconds.
    pub pause_ms: u64,
    /// Reopen the output and read everything back after compressing.
    pub verify: bool,
    #[serde(default)]
    pub environment: Environment,
}

impl RunConfig {
    /// Defaults of the read-only preview program.
    pub fn preview_defaults() -> Self {
        Self {
            input: "data_sz3_l-3.h5".into(),
            output: None,
            backend: None,
            datasets: vec!["simulation_data".into()],
            preview_rows: DEFAULT_PREVIEW_ROWS,
            preview_length: DEFAULT_PREVIEW_LENGTH,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            filter: CompressionParameters::default(),
            pause_ms: DEFAULT_PAUSE_MS,
            verify: false,
            environment: Environment::default(),
        }
    }

    /// Defaults of the copy-and-compress program.
    pub fn compress_defaults() -> Self {
        Self {
            input: "mesh.h5".into(),
            output: Some("mesh_sz3.h5".into()),
            datasets: vec!["vertex/x".into(), "vertex/y".into(), "vertex/z".into()],
            verify: true,
            ..Self::preview_defaults()
        }
    }

    /// Overlay the top-level fields of a JSON document on `defaults`.
    pub fn from_json(json: &str, defaults: Self) -> crate::Result<Self> {
        let overrides: serde_json::Value = serde_json::from_str(json)?;
        let serde_json::Value::Object(overrides) = overrides else {
            return Err(crate::Error::general("configuration must be a JSON object"));
        };
        let serde_json::Value::Object(mut merged) = serde_json::to_value(defaults)? else {
            return Err(crate::Error::general(
                "configuration should serialize to a JSON object",
            ));
        };
        merged.extend(overrides);
        Ok(serde_json::from_value(serde_json::Value::Object(merged))?)
    }

    /// Load `path` over `defaults`, or return `defaults` when there is no path.
    pub fn load(path: Option<&Path>, defaults: Self) -> crate::Result<Self> {
        let Some(path) = path else {
            return Ok(defaults);
        };
        log::info!("loading configuration from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json, defaults)
    }

    pub fn backend(&self) -> Backend {
        self.backend
            .unwrap_or_else(|| Backend::for_path(&self.input))
    }

    pub fn preview_region(&self) -> Region {
        Region::Preview {
            rows: self.preview_rows,
            length: self.preview_length,
        }
    }

    pub fn sequencer(&self) -> Sequencer {
        Sequencer::new()
            .with_region(self.preview_region())
            .with_chunk_limit(self.chunk_limit)
            .with_filter(self.filter)
            .with_pause(Duration::from_millis(self.pause_ms))
    }
}

/// Process-wide settings read by the storage libraries and their plugins.
///
/// Must be applied once, before any container is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Environment {
    /// Directory searched for HDF5 filter plugins.
    pub plugin_path: PathBuf,
    /// Thread cap for plugin and codec thread pools.
    pub worker_threads: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Self {
            plugin_path: ".".into(),
            worker_threads: 1,
        }
    }
}

impl Environment {
    /// Variables set by [`Environment::apply`].
    pub fn variables(&self) -> Vec<(&'static str, String)> {
        let threads = self.worker_threads.max(1).to_string();
        vec![
            (
                "HDF5_PLUGIN_PATH",
                self.plugin_path.to_string_lossy().into_owned(),
            ),
            // SZ3 deadlocks with several OpenMP workers on some platforms
            ("OMP_NUM_THREADS", threads.clone()),
            ("RAYON_NUM_THREADS", threads),
        ]
    }

    /// Export the settings into the process environment.
    ///
    /// # Safety
    ///
    /// No other thread may be reading or writing the environment,
    /// i.e. call this at the start of `main`.
    pub unsafe fn apply(&self) {
        for (key, value) in self.variables() {
            log::debug!("setting {key}={value}");
            // SAFETY: upheld by the caller
            unsafe { std::env::set_var(key, value) };
        }
    }
}
