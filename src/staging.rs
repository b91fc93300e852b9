use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use ulid::Ulid;

use crate::bom::Bom;
use crate::descriptor::ComponentKey;
use crate::error::SbomError;

/// Scratch area of a single run
///
/// Lives under `<base>/<run ulid>`. Intermediate per-component documents are
/// only written when `keep_intermediates` is set; the directory is created on
/// first use.
#[derive(Debug, Clone)]
pub struct Staging {
    run_dir: PathBuf,
    keep_intermediates: bool,
}

impl Staging {
    pub fn new(base: impl AsRef<Path>, keep_intermediates: bool) -> Self {
        Staging {
            run_dir: base.as_ref().join(Ulid::new().to_string()),
            keep_intermediates,
        }
    }

    /// Staging under the system temporary directory
    pub fn in_temp_dir(keep_intermediates: bool) -> Self {
        Self::new(std::env::temp_dir().join("sbom-consolidate"), keep_intermediates)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn keeps_intermediates(&self) -> bool {
        self.keep_intermediates
    }

    /// Create the run directory if needed and return it
    pub fn ensure_run_dir(&self) -> Result<&Path, SbomError> {
        std::fs::create_dir_all(&self.run_dir)?;
        Ok(&self.run_dir)
    }

    /// Path of a component's intermediate document
    pub fn node_path(&self, key: &ComponentKey) -> PathBuf {
        self.run_dir.join(format!(
            "{}-{}.cdx.json",
            sanitize_filename(&key.name),
            sanitize_filename(&key.version)
        ))
    }

    /// Write a component's merged document if intermediates are kept
    pub fn write_node(&self, key: &ComponentKey, bom: &Bom) -> Result<Option<PathBuf>, SbomError> {
        if !self.keep_intermediates {
            return Ok(None);
        }

        self.ensure_run_dir()?;
        let path = self.node_path(key);
        std::fs::write(&path, bom.to_json_string(true)?)?;
        debug!("Wrote intermediate SBOM {}", path.display());
        Ok(Some(path))
    }

    /// Remove the run directory unless intermediates are kept
    pub fn cleanup(&self) {
        if self.keep_intermediates || !self.run_dir.exists() {
            return;
        }
        if let Err(e) = std::fs::remove_dir_all(&self.run_dir) {
            warn!("Failed to remove {}: {}", self.run_dir.display(), e);
        }
    }
}

/// Replace characters that are not allowed in file names
pub fn sanitize_filename(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '-',
            c => c,
        })
        .collect()
}
