//! Hierarchical SBOM Consolidation Library
//!
//! This library builds one CycloneDX SBOM for a component and everything it
//! references, mirroring the component hierarchy instead of flattening it.
//!
//! # Overview
//!
//! Starting from a root component descriptor, the library:
//!
//! 1. Discovers the transitive graph of referenced components
//! 2. Generates a flat SBOM for every image resource of every component
//! 3. Merges results bottom-up, so each component's document nests the
//!    documents of its children
//! 4. Prefixes every reference id with the namespace of the document it came
//!    from (`group.name@version:ref`), so ids from different documents never
//!    collide
//!
//! A component shared by several parents is merged once and its result
//! reused by each parent.
//!
//! # Usage
//!
//! ## Merge documents directly
//!
//! ```ignore
//! use sbom_consolidate::{hierarchical_merge, Bom, MergeOptions, Subject};
//!
//! let boms: Vec<Bom> = // parse your CycloneDX documents
//! let merged = hierarchical_merge(
//!     boms,
//!     &Subject::new("my-app", "1.0.0"),
//!     &MergeOptions::default(),
//! )?;
//!
//! println!("{}", merged.to_json_string(true)?);
//! ```
//!
//! ## Process a component graph
//!
//! ```ignore
//! use sbom_consolidate::{
//!     ComponentKey, DirectorySource, Orchestrator, ProcessOptions, SyftGenerator,
//! };
//!
//! let source = DirectorySource::open("descriptors".as_ref())?;
//! let scanner = SyftGenerator::locate(None, Duration::from_secs(600))?;
//! let orchestrator = Orchestrator::new(&source, &scanner, ProcessOptions::default());
//!
//! if let Some(bom) = orchestrator.process(&ComponentKey::new("acme.org/app", "1.0.0"))? {
//!     println!("{}", bom.to_json_string(true)?);
//! }
//! ```

pub mod bom;
pub mod config;
pub mod convert;
pub mod descriptor;
pub mod error;
pub mod graph;
pub mod merge;
pub mod namespace;
pub mod orchestrate;
pub mod scan;
pub mod source;
pub mod staging;
pub mod tool;

// Re-export main types for convenience
pub use crate::bom::{Bom, Component, Metadata, Tools};
pub use crate::config::Config;
pub use crate::convert::{Converter, CycloneDxCli, FormatConverter, NativeConverter, SbomFormat};
pub use crate::descriptor::{ComponentDescriptor, ComponentKey, Resource};
pub use crate::error::SbomError;
pub use crate::graph::ComponentGraph;
pub use crate::merge::{hierarchical_merge, AffectsRewrite, MergeOptions, Subject};
pub use crate::namespace::{Namespace, Referencing};
pub use crate::orchestrate::{Orchestrator, ProcessOptions, ProcessResult, ProcessStats};
pub use crate::scan::{generate_leaf, LeafGenerator, SyftGenerator};
pub use crate::source::{
    DescriptorSource, DirectorySource, HttpSource, MemorySource, SourceLocation, ZipSource,
};
pub use crate::staging::Staging;
