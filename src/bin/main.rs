//! Hierarchical SBOM CLI
//!
//! Command-line tool for building hierarchical SBOMs from component
//! descriptors and for merging existing CycloneDX documents.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sbom_consolidate::{
    hierarchical_merge, AffectsRewrite, Bom, ComponentKey, Config, Converter, CycloneDxCli,
    FormatConverter, Orchestrator, SbomError, SbomFormat, SourceLocation, Staging, Subject,
    SyftGenerator,
};

#[derive(Parser)]
#[command(name = "sbom-consolidate")]
#[command(about = "Build hierarchical CycloneDX SBOMs from component descriptors")]
#[command(version)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a hierarchical SBOM for a component and its references
    Convert(ConvertArgs),
    /// Merge existing CycloneDX documents under a new top-level component
    Merge(MergeArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// Descriptor directory, .zip archive, or URL template with {name} and {version}
    source: String,

    /// Root component name, or name:version
    component: String,

    /// Root component version
    #[arg(long = "version", value_name = "VERSION")]
    component_version: Option<String>,

    /// Output formats, comma separated
    #[arg(short, long, value_enum, value_delimiter = ',')]
    format: Vec<SbomFormat>,

    /// Output file (default: stdout); with several formats, the base name
    /// for one file per format
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, env = "SBOM_CONSOLIDATE_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum concurrent scans and merges
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Per-image scan timeout in seconds
    #[arg(long, value_name = "SECS")]
    scan_timeout: Option<u64>,

    /// Keep per-component SBOMs in the staging directory
    #[arg(long)]
    keep_intermediates: bool,

    /// Base directory for intermediate files
    #[arg(long, env = "SBOM_CONSOLIDATE_STAGING_DIR")]
    staging_dir: Option<PathBuf>,

    /// Collapse vulnerability affects to the document namespace
    #[arg(long)]
    legacy_affects: bool,

    /// Path to the syft binary
    #[arg(long, env = "SYFT_PATH")]
    syft: Option<PathBuf>,

    /// Path to the cyclonedx binary (SPDX output only)
    #[arg(long, env = "CYCLONEDX_PATH")]
    cyclonedx: Option<PathBuf>,
}

impl ConvertArgs {
    /// Layer command line flags over the loaded configuration
    fn apply(&self, config: &mut Config) {
        if !self.format.is_empty() {
            config.output_formats = self.format.clone();
        }
        if let Some(n) = self.max_concurrent {
            config.max_concurrent = n;
        }
        if let Some(secs) = self.scan_timeout {
            config.scan_timeout_secs = secs;
        }
        if self.keep_intermediates {
            config.keep_intermediates = true;
        }
        if let Some(dir) = &self.staging_dir {
            config.staging_dir = Some(dir.clone());
        }
        if self.legacy_affects {
            config.merge.affects = AffectsRewrite::CollapseToNamespace;
        }
        if let Some(path) = &self.syft {
            config.syft_path = Some(path.clone());
        }
        if let Some(path) = &self.cyclonedx {
            config.cyclonedx_path = Some(path.clone());
        }
    }
}

#[derive(Args)]
struct MergeArgs {
    /// CycloneDX documents (JSON or YAML) to merge, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Name of the new top-level component
    #[arg(long)]
    name: String,

    /// Version of the new top-level component
    #[arg(long = "version", value_name = "VERSION")]
    component_version: String,

    /// Group of the new top-level component
    #[arg(long)]
    group: Option<String>,

    /// Output formats, comma separated
    #[arg(short, long, value_enum, value_delimiter = ',', default_value = "cyclonedx-json")]
    format: Vec<SbomFormat>,

    /// Output file (default: stdout); with several formats, the base name
    /// for one file per format
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Collapse vulnerability affects to the document namespace
    #[arg(long)]
    legacy_affects: bool,
}

/// Split `name:version` unless the version was given separately
fn component_key(component: &str, version: Option<&str>) -> Result<ComponentKey, SbomError> {
    if let Some(version) = version {
        return Ok(ComponentKey::new(component, version));
    }
    match component.rsplit_once(':') {
        Some((name, version)) if !name.is_empty() && !version.is_empty() => {
            Ok(ComponentKey::new(name, version))
        }
        _ => Err(SbomError::Config(format!(
            "No version given for component '{}' (use --version or name:version)",
            component
        ))),
    }
}

fn build_converter(
    formats: &[SbomFormat],
    config: &Config,
    work_dir: &Path,
) -> Result<Converter, SbomError> {
    if formats.iter().all(SbomFormat::is_cyclonedx) {
        return Ok(Converter::default());
    }
    let cli = CycloneDxCli::locate(
        config.cyclonedx_path.as_deref(),
        work_dir,
        config.convert_timeout(),
    )?;
    Ok(Converter::new(Some(cli)))
}

/// Load a CycloneDX document from JSON or YAML
fn load_bom(path: &Path) -> Result<Bom, SbomError> {
    if !path.is_file() {
        return Err(SbomError::InvalidPath(path.to_path_buf()));
    }
    let content = fs::read(path)?;
    let is_yaml = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

    if is_yaml {
        Ok(serde_yaml::from_slice(&content)?)
    } else {
        Bom::from_json_slice(&content)
    }
}

/// Where each format is written
///
/// A single format goes to `output` or stdout. Several formats need a base
/// path and get one file each.
fn output_targets(
    formats: &[SbomFormat],
    output: Option<&Path>,
) -> Result<Vec<(SbomFormat, Option<PathBuf>)>, SbomError> {
    match (formats, output) {
        ([format], output) => Ok(vec![(*format, output.map(Path::to_path_buf))]),
        (formats, Some(base)) => Ok(formats
            .iter()
            .map(|format| (*format, Some(format.output_path(base))))
            .collect()),
        (_, None) => Err(SbomError::Config(
            "Several output formats need --output to derive file names".to_string(),
        )),
    }
}

/// Convert once per target and write the results
fn write_all(
    bom: &Bom,
    targets: &[(SbomFormat, Option<PathBuf>)],
    converter: &dyn FormatConverter,
) -> Result<(), SbomError> {
    for (format, path) in targets {
        info!("Writing {} SBOM", format);
        let content = converter.convert(bom, *format)?;
        write_output(&content, path.as_deref())?;
    }
    Ok(())
}

/// Write output to file or stdout
fn write_output(content: &[u8], output: Option<&Path>) -> Result<(), SbomError> {
    match output {
        Some(path) => {
            fs::write(path, content)?;
            eprintln!("Wrote SBOM to {}", path.display());
        }
        None => {
            use std::io::Write;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(content)?;
            stdout.write_all(b"\n")?;
        }
    }
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<(), SbomError> {
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    let root = component_key(&args.component, args.component_version.as_deref())?;
    let targets = output_targets(&config.output_formats, args.output.as_deref())?;
    let staging = match &config.staging_dir {
        Some(dir) => Staging::new(dir, config.keep_intermediates),
        None => Staging::in_temp_dir(config.keep_intermediates),
    };

    // Resolve tools before any work is done
    let scanner = SyftGenerator::locate(config.syft_path.as_deref(), config.scan_timeout())?;
    let converter = build_converter(&config.output_formats, &config, staging.run_dir())?;
    let source = SourceLocation::parse(&args.source).open(config.http_timeout())?;

    let result = Orchestrator::new(source.as_ref(), &scanner, config.process_options())
        .with_staging(&staging)
        .run(&root)
        .and_then(|result| {
            eprintln!(
                "Processed {} components, {} leaf SBOMs, {} merges ({} degraded, {} descriptors missing)",
                result.stats.components_discovered,
                result.stats.leaves_generated,
                result.stats.merges_performed,
                result.stats.merges_degraded,
                result.stats.descriptors_missing
            );
            let bom = result
                .root
                .ok_or_else(|| SbomError::NothingProduced(root.to_string()))?;
            write_all(&bom, &targets, &converter)
        });

    if staging.keeps_intermediates() {
        info!("Intermediate SBOMs kept in {}", staging.run_dir().display());
    }
    staging.cleanup();
    result
}

fn run_merge(args: MergeArgs) -> Result<(), SbomError> {
    let targets = output_targets(&args.format, args.output.as_deref())?;
    let boms = args
        .files
        .iter()
        .map(|path| load_bom(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut subject = Subject::new(&args.name, &args.component_version);
    if let Some(group) = &args.group {
        subject = subject.with_group(group);
    }

    let mut config = Config::default();
    if args.legacy_affects {
        config.merge.affects = AffectsRewrite::CollapseToNamespace;
    }

    let count = boms.len();
    let merged = hierarchical_merge(boms, &subject, &config.merge)?;
    eprintln!("Merged {} documents under {}", count, subject.namespace());

    let staging = Staging::in_temp_dir(false);
    let result = build_converter(&args.format, &config, staging.run_dir())
        .and_then(|converter| write_all(&merged, &targets, &converter));
    staging.cleanup();
    result
}

fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays clean for the SBOM
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let result = match cli.command {
        Commands::Convert(args) => run_convert(args),
        Commands::Merge(args) => run_merge(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_key_forms() {
        assert_eq!(
            component_key("acme.org/app", Some("1.0")).unwrap(),
            ComponentKey::new("acme.org/app", "1.0")
        );
        assert_eq!(
            component_key("acme.org/app:1.0", None).unwrap(),
            ComponentKey::new("acme.org/app", "1.0")
        );
        assert!(component_key("acme.org/app", None).is_err());
        assert!(component_key("app:", None).is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "sbom-consolidate",
            "convert",
            "descriptors",
            "app",
            "--version",
            "1.0",
            "-f",
            "cyclonedx-yaml",
            "--max-concurrent",
            "2",
            "--legacy-affects",
        ]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };

        let mut config = Config::default();
        args.apply(&mut config);
        assert_eq!(config.output_formats, vec![SbomFormat::CycloneDxYaml]);
        assert_eq!(config.max_concurrent, 2);
        assert_eq!(config.merge.affects, AffectsRewrite::CollapseToNamespace);
        assert_eq!(args.component_version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_format_list_gives_one_file_each() {
        let cli = Cli::parse_from([
            "sbom-consolidate",
            "convert",
            "descriptors",
            "app:1.0",
            "-f",
            "cyclonedx-json,spdx-yaml",
            "-o",
            "out/app.cdx.json",
        ]);
        let Commands::Convert(args) = cli.command else {
            panic!("expected convert");
        };
        assert_eq!(args.format, vec![SbomFormat::CycloneDxJson, SbomFormat::SpdxYaml]);

        let targets = output_targets(&args.format, args.output.as_deref()).unwrap();
        assert_eq!(
            targets,
            vec![
                (SbomFormat::CycloneDxJson, Some(PathBuf::from("out/app.cdx.json"))),
                (SbomFormat::SpdxYaml, Some(PathBuf::from("out/app.spdx.yaml"))),
            ]
        );
    }

    #[test]
    fn test_single_format_keeps_output_as_given() {
        let targets = output_targets(&[SbomFormat::CycloneDxYaml], Some(Path::new("sbom.txt"))).unwrap();
        assert_eq!(targets, vec![(SbomFormat::CycloneDxYaml, Some(PathBuf::from("sbom.txt")))]);

        let targets = output_targets(&[SbomFormat::CycloneDxJson], None).unwrap();
        assert_eq!(targets, vec![(SbomFormat::CycloneDxJson, None)]);

        assert!(matches!(
            output_targets(&[SbomFormat::CycloneDxJson, SbomFormat::SpdxJson], None),
            Err(SbomError::Config(_))
        ));
    }

    const IMAGE_YAML: &str = r#"
bomFormat: CycloneDX
specVersion: "1.6"
metadata:
  component:
    type: container
    name: web
    version: "2.1"
    bom-ref: web
components:
  - type: library
    name: zlib
    version: "1.3"
    bom-ref: pkg:zlib
"#;

    #[test]
    fn test_load_bom_yaml_and_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let yaml = dir.path().join("web.cdx.yaml");
        fs::write(&yaml, IMAGE_YAML).unwrap();

        let bom = load_bom(&yaml).unwrap();
        assert_eq!(bom.subject().unwrap().name, "web");
        assert_eq!(bom.components.as_ref().unwrap().len(), 1);

        let json = dir.path().join("web.cdx.json");
        fs::write(&json, bom.to_json_string(false).unwrap()).unwrap();
        assert_eq!(load_bom(&json).unwrap(), bom);

        assert!(matches!(
            load_bom(&dir.path().join("missing.json")),
            Err(SbomError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_merge_command_writes_each_format() {
        let dir = tempfile::TempDir::new().unwrap();
        let input = dir.path().join("web.yaml");
        fs::write(&input, IMAGE_YAML).unwrap();
        let base = dir.path().join("suite.cdx.json");

        let argv: Vec<std::ffi::OsString> = vec![
            "sbom-consolidate".into(),
            "merge".into(),
            input.into_os_string(),
            "--name".into(),
            "suite".into(),
            "--version".into(),
            "3.0".into(),
            "-f".into(),
            "cyclonedx-json,cyclonedx-yaml".into(),
            "-o".into(),
            base.clone().into_os_string(),
        ];
        let cli = Cli::parse_from(argv);
        let Commands::Merge(args) = cli.command else {
            panic!("expected merge");
        };
        run_merge(args).unwrap();

        let merged = load_bom(&base).unwrap();
        assert_eq!(merged.subject().unwrap().bom_ref.as_deref(), Some("suite@3.0"));
        let top: Vec<_> = merged
            .components
            .as_ref()
            .unwrap()
            .iter()
            .filter_map(|c| c.bom_ref.as_deref())
            .collect();
        assert_eq!(top, vec!["web@2.1:web"]);

        let yaml = load_bom(&dir.path().join("suite.cdx.yaml")).unwrap();
        assert_eq!(yaml, merged);
    }
}
