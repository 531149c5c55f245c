use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options recognized by the clipcrop stages.
///
/// | option                  | default   |
/// |-------------------------|-----------|
/// | `max_diff`              | 2         |
/// | `bp_max_diff`           | 3         |
/// | `min_cluster_size`      | 10        |
/// | `bp_min_cluster_size`   | 3         |
/// | `min_quality`           | 5.0       |
/// | `min_seq_length`        | 10        |
/// | `filter_n`              | false     |
/// | `flank_length`          | 1000      |
/// | `require_nondegenerate` | true      |
/// | `num_threads`           | 8         |
/// | `chunk_size`            | 5000000   |
/// | `temp_dir`              | none      |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Position tolerance when clustering SV candidates.
    pub max_diff: u64,
    /// Position tolerance when clustering raw breakpoints.
    pub bp_max_diff: u64,
    /// Minimum number of fragments supporting an SV call.
    pub min_cluster_size: usize,
    /// Minimum number of reads supporting a breakpoint.
    pub bp_min_cluster_size: usize,
    /// Minimum mean base quality of a clipped sequence. Breakpoints cut from
    /// reads stored without qualities are never filtered on quality.
    pub min_quality: f64,
    /// Shorter clipped sequences are not re-aligned.
    pub min_seq_length: usize,
    /// Drop clipped sequences consisting only of N.
    pub filter_n: bool,
    /// Bases taken on each side of a breakpoint.
    pub flank_length: u64,
    /// Reject DEL/DUP/INV calls of length <= 1.
    pub require_nondegenerate: bool,
    pub num_threads: usize,
    /// Records held in memory per external sort chunk.
    pub chunk_size: usize,
    pub temp_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_diff: 2,
            bp_max_diff: 3,
            min_cluster_size: 10,
            bp_min_cluster_size: 3,
            min_quality: 5.0,
            min_seq_length: 10,
            filter_n: false,
            flank_length: 1000,
            require_nondegenerate: true,
            num_threads: 8,
            chunk_size: 5_000_000,
            temp_dir: None,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::resource(e, path))?;
        let config: Config = serde_json::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_cluster_size == 0 || self.bp_min_cluster_size == 0 {
            return Err(Error::Config("minimum cluster size must be at least 1".into()));
        }
        if !self.min_quality.is_finite() || self.min_quality < 0.0 {
            return Err(Error::Config(format!("invalid minimum quality: {}", self.min_quality)));
        }
        if self.flank_length == 0 {
            return Err(Error::Config("flank length must be positive".into()));
        }
        if self.num_threads == 0 || self.chunk_size == 0 {
            return Err(Error::Config("thread count and chunk size must be positive".into()));
        }
        Ok(())
    }

    pub fn with_max_diff(mut self, max_diff: u64) -> Self {
        self.max_diff = max_diff;
        self
    }

    pub fn with_bp_max_diff(mut self, max_diff: u64) -> Self {
        self.bp_max_diff = max_diff;
        self
    }

    pub fn with_min_cluster_size(mut self, size: usize) -> Self {
        self.min_cluster_size = size;
        self
    }

    pub fn with_bp_min_cluster_size(mut self, size: usize) -> Self {
        self.bp_min_cluster_size = size;
        self
    }

    pub fn with_min_quality(mut self, quality: f64) -> Self {
        self.min_quality = quality;
        self
    }

    pub fn with_min_seq_length(mut self, len: usize) -> Self {
        self.min_seq_length = len;
        self
    }

    pub fn with_filter_n(mut self, filter_n: bool) -> Self {
        self.filter_n = filter_n;
        self
    }

    pub fn with_flank_length(mut self, len: u64) -> Self {
        self.flank_length = len;
        self
    }

    pub fn with_require_nondegenerate(mut self, require: bool) -> Self {
        self.require_nondegenerate = require;
        self
    }

    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = n;
        self
    }

    pub fn with_chunk_size(mut self, n: usize) -> Self {
        self.chunk_size = n;
        self
    }

    pub fn with_temp_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.temp_dir = Some(dir.as_ref().to_path_buf());
        self
    }
}
