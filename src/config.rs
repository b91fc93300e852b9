use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::convert::SbomFormat;
use crate::error::SbomError;
use crate::merge::MergeOptions;
use crate::orchestrate::ProcessOptions;

/// Run configuration
///
/// Every field has a default, so a config file only needs the keys it
/// changes. Command line flags are applied on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Formats written at the end of a run, one file each
    pub output_formats: Vec<SbomFormat>,
    pub merge: MergeOptions,
    /// Concurrent scans and merges
    pub max_concurrent: usize,
    /// Per-image scan timeout in seconds
    pub scan_timeout_secs: u64,
    /// Timeout for format conversion in seconds
    pub convert_timeout_secs: u64,
    /// Timeout for descriptor downloads in seconds
    pub http_timeout_secs: u64,
    pub syft_path: Option<PathBuf>,
    pub cyclonedx_path: Option<PathBuf>,
    /// Base directory for per-run scratch space; system temp dir if unset
    pub staging_dir: Option<PathBuf>,
    pub keep_intermediates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_formats: vec![SbomFormat::default()],
            merge: MergeOptions::default(),
            max_concurrent: 4,
            scan_timeout_secs: 600,
            convert_timeout_secs: 120,
            http_timeout_secs: 30,
            syft_path: None,
            cyclonedx_path: None,
            staging_dir: None,
            keep_intermediates: false,
        }
    }
}

impl Config {
    /// Load a YAML config file
    pub fn from_file(path: &Path) -> Result<Self, SbomError> {
        if !path.exists() {
            return Err(SbomError::InvalidPath(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, SbomError> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SbomError> {
        if self.output_formats.is_empty() {
            return Err(SbomError::Config("output-formats must name at least one format".to_string()));
        }
        if self.max_concurrent == 0 {
            return Err(SbomError::Config("max-concurrent must be at least 1".to_string()));
        }
        for (key, value) in [
            ("scan-timeout-secs", self.scan_timeout_secs),
            ("convert-timeout-secs", self.convert_timeout_secs),
            ("http-timeout-secs", self.http_timeout_secs),
        ] {
            if value == 0 {
                return Err(SbomError::Config(format!("{} must be positive", key)));
            }
        }
        Ok(())
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }

    pub fn convert_timeout(&self) -> Duration {
        Duration::from_secs(self.convert_timeout_secs)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    pub fn process_options(&self) -> ProcessOptions {
        ProcessOptions {
            merge: self.merge.clone(),
            max_concurrent: self.max_concurrent,
        }
    }
}
