//! Output formats and conversion
//!
//! CycloneDX JSON and YAML are written natively. SPDX output goes through
//! the `cyclonedx` command line tool.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::bom::Bom;
use crate::error::SbomError;
use crate::tool::{locate, run_with_timeout};

/// Supported output formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum SbomFormat {
    #[default]
    #[serde(rename = "cyclonedx-json")]
    #[value(name = "cyclonedx-json")]
    CycloneDxJson,
    #[serde(rename = "cyclonedx-yaml")]
    #[value(name = "cyclonedx-yaml")]
    CycloneDxYaml,
    #[serde(rename = "spdx-json")]
    #[value(name = "spdx-json")]
    SpdxJson,
    #[serde(rename = "spdx-yaml")]
    #[value(name = "spdx-yaml")]
    SpdxYaml,
}

impl SbomFormat {
    pub const ALL: [SbomFormat; 4] = [
        SbomFormat::CycloneDxJson,
        SbomFormat::CycloneDxYaml,
        SbomFormat::SpdxJson,
        SbomFormat::SpdxYaml,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SbomFormat::CycloneDxJson => "cyclonedx-json",
            SbomFormat::CycloneDxYaml => "cyclonedx-yaml",
            SbomFormat::SpdxJson => "spdx-json",
            SbomFormat::SpdxYaml => "spdx-yaml",
        }
    }

    /// File extension, including the standard marker
    pub fn extension(&self) -> &'static str {
        match self {
            SbomFormat::CycloneDxJson => ".cdx.json",
            SbomFormat::CycloneDxYaml => ".cdx.yaml",
            SbomFormat::SpdxJson => ".spdx.json",
            SbomFormat::SpdxYaml => ".spdx.yaml",
        }
    }

    pub fn is_cyclonedx(&self) -> bool {
        matches!(self, SbomFormat::CycloneDxJson | SbomFormat::CycloneDxYaml)
    }

    /// Path for this format next to `base`
    ///
    /// A known SBOM extension on `base` is replaced as a whole; otherwise only
    /// the last extension is.
    pub fn output_path(&self, base: &Path) -> PathBuf {
        let name = base.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let stem = Self::ALL
            .iter()
            .find_map(|format| name.strip_suffix(format.extension()))
            .or_else(|| base.file_stem().and_then(|s| s.to_str()))
            .unwrap_or(name);
        base.with_file_name(format!("{}{}", stem, self.extension()))
    }
}

impl fmt::Display for SbomFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SbomFormat {
    type Err = SbomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|format| format.as_str() == wanted)
            .ok_or_else(|| SbomError::UnsupportedFormat(s.to_string()))
    }
}

/// Renders a CycloneDX document in a target format
pub trait FormatConverter {
    fn convert(&self, bom: &Bom, format: SbomFormat) -> Result<Vec<u8>, SbomError>;
}

/// CycloneDX JSON and YAML without external tools
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeConverter;

impl FormatConverter for NativeConverter {
    fn convert(&self, bom: &Bom, format: SbomFormat) -> Result<Vec<u8>, SbomError> {
        match format {
            SbomFormat::CycloneDxJson => Ok(bom.to_json_string(true)?.into_bytes()),
            SbomFormat::CycloneDxYaml => Ok(serde_yaml::to_string(bom)?.into_bytes()),
            other => Err(SbomError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// SPDX conversion through `cyclonedx convert`
#[derive(Debug, Clone)]
pub struct CycloneDxCli {
    program: PathBuf,
    work_dir: PathBuf,
    timeout: Duration,
}

impl CycloneDxCli {
    pub const PROGRAM: &'static str = "cyclonedx";

    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        CycloneDxCli {
            program: program.into(),
            work_dir: work_dir.into(),
            timeout,
        }
    }

    /// Find `cyclonedx` at `explicit` or on `PATH`
    pub fn locate(
        explicit: Option<&Path>,
        work_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Result<Self, SbomError> {
        Ok(Self::new(locate(Self::PROGRAM, explicit)?, work_dir, timeout))
    }

    fn convert_to_spdx_json(&self, bom: &Bom) -> Result<Vec<u8>, SbomError> {
        std::fs::create_dir_all(&self.work_dir)?;
        let input = self.work_dir.join("final.cdx.json");
        let output = self.work_dir.join("final.spdx.json");
        std::fs::write(&input, bom.to_json_string(false)?)?;

        let mut command = Command::new(&self.program);
        command
            .arg("convert")
            .arg("--input-file")
            .arg(&input)
            .arg("--input-format")
            .arg("json")
            .arg("--output-file")
            .arg(&output)
            .arg("--output-format")
            .arg("spdxjson");

        debug!("Converting {} to SPDX", input.display());
        run_with_timeout(command, self.timeout)?;
        Ok(std::fs::read(&output)?)
    }
}

impl FormatConverter for CycloneDxCli {
    fn convert(&self, bom: &Bom, format: SbomFormat) -> Result<Vec<u8>, SbomError> {
        match format {
            SbomFormat::SpdxJson => self.convert_to_spdx_json(bom),
            SbomFormat::SpdxYaml => {
                let json = self.convert_to_spdx_json(bom)?;
                let value: serde_json::Value = serde_json::from_slice(&json)?;
                Ok(serde_yaml::to_string(&value)?.into_bytes())
            }
            other => NativeConverter.convert(bom, other),
        }
    }
}

/// Native conversion for CycloneDX, the CLI for everything else
#[derive(Debug, Clone, Default)]
pub struct Converter {
    cli: Option<CycloneDxCli>,
}

impl Converter {
    pub fn new(cli: Option<CycloneDxCli>) -> Self {
        Converter { cli }
    }
}

impl FormatConverter for Converter {
    fn convert(&self, bom: &Bom, format: SbomFormat) -> Result<Vec<u8>, SbomError> {
        if format.is_cyclonedx() {
            return NativeConverter.convert(bom, format);
        }
        match &self.cli {
            Some(cli) => cli.convert(bom, format),
            None => Err(SbomError::ToolNotFound(CycloneDxCli::PROGRAM.to_string())),
        }
    }
}
