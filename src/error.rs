//! Error types for SBOM consolidation

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SbomError {
    #[error("Name and version must be specified for a hierarchical merge")]
    MissingSubjectIdentity,

    #[error("Required metadata (top level) component is missing from BOM (BOM: {serial})")]
    MissingMetadataComponent { serial: String },

    #[error("Failed to fetch descriptor for {component}: {reason}")]
    DescriptorFetchFailed { component: String, reason: String },

    #[error("Failed to generate SBOM for resource {resource}: {reason}")]
    LeafGenerationFailed { resource: String, reason: String },

    #[error("Merge failed for {component}: {reason}")]
    MergeDegraded { component: String, reason: String },

    #[error("Cycle detected in component references: {0}")]
    CycleDetected(String),

    #[error("Invalid descriptor in {path}: {reason}")]
    InvalidDescriptor { path: String, reason: String },

    #[error("Required tool '{0}' not found in PATH")]
    ToolNotFound(String),

    #[error("Command '{tool}' failed: {reason}")]
    ToolFailed { tool: String, reason: String },

    #[error("{what} timed out after {after:?}")]
    Timeout { what: String, after: Duration },

    #[error("No SBOM was produced for {0}")]
    NothingProduced(String),

    #[error("Unsupported SBOM format '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),
}
