//! Leaf SBOM generation
//!
//! Every image resource of a component is handed to a [`LeafGenerator`]. The
//! resulting documents are merged under the component, giving one leaf
//! document whose root carries the component's own name and version.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bom::{Bom, Component, APPLICATION_TYPE};
use crate::descriptor::{ComponentDescriptor, Resource};
use crate::error::SbomError;
use crate::merge::{merge_validated, validate_merge_inputs, MergeOptions, Subject};
use crate::tool::{locate, run_with_timeout};

/// Produces a flat SBOM for a single image resource
pub trait LeafGenerator: Sync {
    fn generate(&self, resource: &Resource, image_ref: &str) -> Result<Bom, SbomError>;
}

/// Scans images with the `syft` command line tool
#[derive(Debug, Clone)]
pub struct SyftGenerator {
    program: PathBuf,
    timeout: Duration,
}

impl SyftGenerator {
    pub const PROGRAM: &'static str = "syft";

    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        SyftGenerator {
            program: program.into(),
            timeout,
        }
    }

    /// Find `syft` at `explicit` or on `PATH`
    pub fn locate(explicit: Option<&Path>, timeout: Duration) -> Result<Self, SbomError> {
        Ok(Self::new(locate(Self::PROGRAM, explicit)?, timeout))
    }
}

impl LeafGenerator for SyftGenerator {
    fn generate(&self, resource: &Resource, image_ref: &str) -> Result<Bom, SbomError> {
        debug!("Scanning {} ({})", resource.name, image_ref);

        let mut command = Command::new(&self.program);
        command.args(["scan", image_ref, "-o", "cyclonedx-json", "-q"]);

        let output = run_with_timeout(command, self.timeout)?;
        Bom::from_json_slice(&output.stdout)
    }
}

/// Generate the leaf document of one component
///
/// Returns `None` when the component has no image resources or every scan
/// failed. Failures of single resources are logged and skipped.
pub fn generate_leaf(
    descriptor: &ComponentDescriptor,
    generator: &dyn LeafGenerator,
    options: &MergeOptions,
) -> Option<Bom> {
    let key = descriptor.key();
    let mut documents = Vec::new();

    for (resource, image_ref) in descriptor.image_resources() {
        info!("Generating SBOM for {} resource {}", key, resource.name);
        match generator.generate(resource, image_ref) {
            Ok(bom) if bom.subject().is_some() => documents.push(bom),
            Ok(bom) => {
                let err = SbomError::MissingMetadataComponent {
                    serial: bom.serial_or_unknown(),
                };
                warn!(
                    "{}",
                    SbomError::LeafGenerationFailed {
                        resource: image_ref.to_string(),
                        reason: err.to_string(),
                    }
                );
            }
            Err(e) => warn!(
                "{}",
                SbomError::LeafGenerationFailed {
                    resource: image_ref.to_string(),
                    reason: e.to_string(),
                }
            ),
        }
    }

    if documents.is_empty() {
        return None;
    }

    // Resource documents always nest under the component, so each image keeps
    // its own root
    let subject = Subject::new(&descriptor.name, &descriptor.version);
    if let Err(e) = validate_merge_inputs(&documents, &subject) {
        warn!("Cannot merge resource SBOMs of {}: {}", key, e);
        let mut first = documents.swap_remove(0);
        relabel_root(&mut first, &descriptor.name, &descriptor.version);
        return Some(first);
    }

    Some(merge_validated(documents, &subject, options))
}

/// Set the root component's name and version to the component identity
pub fn relabel_root(bom: &mut Bom, name: &str, version: &str) {
    let root = bom
        .metadata
        .get_or_insert_with(Default::default)
        .component
        .get_or_insert_with(|| Component::new(APPLICATION_TYPE, None, name, version));

    root.name = name.to_string();
    root.version = Some(version.to_string());
}
