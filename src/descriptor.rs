//! Component descriptors
//!
//! Minimal model of an OCM-style component descriptor: identity, the
//! resources the component ships and the other components it references.
//! Both the v2 layout (`meta` + `component` with `componentReferences`) and a
//! bare component object with `references` are accepted, as YAML or JSON.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SbomError;

/// Resource types that point at container images
pub const IMAGE_RESOURCE_TYPES: &[&str] = &["ociImage", "ociArtifact"];

/// Access field holding the image reference
pub const IMAGE_REFERENCE_KEY: &str = "imageReference";

/// Identity of a component version in the reference graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentKey {
    pub name: String,
    pub version: String,
}

impl ComponentKey {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        ComponentKey {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl fmt::Display for ComponentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Value>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default, alias = "componentReferences")]
    pub references: Vec<ComponentReference>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub name: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<Value>,
}

impl Resource {
    /// Image reference of an image-typed resource
    pub fn image_reference(&self) -> Option<&str> {
        if !IMAGE_RESOURCE_TYPES.contains(&self.resource_type.as_str()) {
            return None;
        }
        self.access
            .as_ref()?
            .get(IMAGE_REFERENCE_KEY)?
            .as_str()
            .filter(|r| !r.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(alias = "componentName")]
    pub component: String,
    pub version: String,
}

/// v2 envelope around a component
#[derive(Deserialize)]
struct DescriptorEnvelope {
    component: ComponentDescriptor,
}

impl ComponentDescriptor {
    /// Parse a descriptor from YAML or JSON text
    ///
    /// `origin` is only used in error messages.
    pub fn parse(content: &str, origin: &str) -> Result<Self, SbomError> {
        let value: serde_yaml::Value =
            serde_yaml::from_str(content).map_err(|e| SbomError::InvalidDescriptor {
                path: origin.to_string(),
                reason: e.to_string(),
            })?;

        let parsed = if value.get("component").is_some() {
            serde_yaml::from_value::<DescriptorEnvelope>(value).map(|env| env.component)
        } else {
            serde_yaml::from_value::<ComponentDescriptor>(value)
        };

        parsed.map_err(|e| SbomError::InvalidDescriptor {
            path: origin.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn key(&self) -> ComponentKey {
        ComponentKey::new(&self.name, &self.version)
    }

    /// Referenced components, in descriptor order
    pub fn children(&self) -> impl Iterator<Item = ComponentKey> + '_ {
        self.references
            .iter()
            .map(|r| ComponentKey::new(&r.component, &r.version))
    }

    /// Resources that point at container images
    pub fn image_resources(&self) -> impl Iterator<Item = (&Resource, &str)> + '_ {
        self.resources
            .iter()
            .filter_map(|r| r.image_reference().map(|image| (r, image)))
    }
}
