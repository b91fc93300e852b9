//! CycloneDX document model
//!
//! Typed view over the parts of a CycloneDX 1.6 BOM that carry references.
//! Everything the merge does not need to understand is kept in the
//! flattened `extra` map of each record, so licenses, hashes, purls and
//! properties survive a parse/merge/serialize cycle unchanged.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::SbomError;

/// CycloneDX format marker
pub const BOM_FORMAT: &str = "CycloneDX";

/// CycloneDX version stamped on merged documents
pub const SPEC_VERSION: &str = "1.6";

/// Component type used for synthetic subject components
pub const APPLICATION_TYPE: &str = "application";

/// A CycloneDX BOM
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bom {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bom_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spec_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Service>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_references: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<Dependency>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compositions: Option<Vec<Composition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<Vulnerability>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declarations: Option<Declarations>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definitions: Option<Definitions>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Bom {
    /// Parse a BOM from CycloneDX JSON bytes
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, SbomError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Serialize the BOM as CycloneDX JSON
    pub fn to_json_string(&self, pretty: bool) -> Result<String, SbomError> {
        if pretty {
            Ok(serde_json::to_string_pretty(self)?)
        } else {
            Ok(serde_json::to_string(self)?)
        }
    }

    /// The root metadata component, if present
    pub fn subject(&self) -> Option<&Component> {
        self.metadata.as_ref().and_then(|m| m.component.as_ref())
    }

    /// Serial number used to identify the document in error messages
    pub fn serial_or_unknown(&self) -> String {
        match self.serial_number.as_deref() {
            Some(serial) if !serial.is_empty() => serial.to_string(),
            _ => "unknown".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(
        default,
        deserialize_with = "deserialize_tools",
        skip_serializing_if = "Option::is_none"
    )]
    pub tools: Option<Tools>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<Component>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Tools that produced a document (CycloneDX 1.5+ object form)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tools {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Service>>,
}

impl Tools {
    pub fn is_empty(&self) -> bool {
        self.components.as_ref().map_or(true, Vec::is_empty)
            && self.services.as_ref().map_or(true, Vec::is_empty)
    }
}

/// Pre-1.5 tool entry
#[derive(Debug, Deserialize)]
struct LegacyTool {
    vendor: Option<String>,
    name: Option<String>,
    version: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<LegacyTool> for Component {
    fn from(tool: LegacyTool) -> Self {
        Component {
            component_type: Some(APPLICATION_TYPE.to_string()),
            group: tool.vendor,
            name: tool.name.unwrap_or_default(),
            version: tool.version,
            bom_ref: None,
            components: None,
            extra: tool.extra,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ToolsChoice {
    Legacy(Vec<LegacyTool>),
    Object(Tools),
}

/// Accept both the legacy tools array and the 1.5+ object form
fn deserialize_tools<'de, D>(deserializer: D) -> Result<Option<Tools>, D::Error>
where
    D: Deserializer<'de>,
{
    let choice = Option::<ToolsChoice>::deserialize(deserializer)?;
    Ok(choice.map(|choice| match choice {
        ToolsChoice::Object(tools) => tools,
        ToolsChoice::Legacy(legacy) => Tools {
            components: Some(legacy.into_iter().map(Component::from).collect()),
            services: None,
        },
    }))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Component {
    /// Create a bare component with the given identity
    pub fn new(component_type: &str, group: Option<&str>, name: &str, version: &str) -> Self {
        Component {
            component_type: Some(component_type.to_string()),
            group: group.filter(|g| !g.is_empty()).map(String::from),
            name: name.to_string(),
            version: Some(version.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Service>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dependency {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Composition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assemblies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vulnerabilities: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affects: Option<Vec<Affect>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Affect {
    #[serde(rename = "ref")]
    pub reference: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Declarations {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessors: Option<Vec<Assessor>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestations: Option<Vec<Attestation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<Claim>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<DeclarationEvidence>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub targets: Option<Targets>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assessor {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assessor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub map: Option<Vec<AttestationMap>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationMap {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirement: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_claims: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conformance: Option<Conformance>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conformance {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation_strategies: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claim {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter_evidence: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mitigation_strategies: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationEvidence {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Targets {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organizations: Option<Vec<Organization>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<Vec<Component>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub services: Option<Vec<Service>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Definitions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standards: Option<Vec<Standard>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Standard {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<Requirement>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<Vec<Level>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    #[serde(rename = "bom-ref", skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_minimal_bom() {
        let doc = json!({
            "bomFormat": "CycloneDX",
            "specVersion": "1.6",
            "serialNumber": "urn:uuid:1234",
            "metadata": {
                "component": {"type": "container", "name": "nginx", "version": "1.25", "bom-ref": "img"}
            },
            "components": [
                {"type": "library", "name": "zlib", "version": "1.3", "bom-ref": "pkg:zlib",
                 "purl": "pkg:generic/zlib@1.3"}
            ],
            "dependencies": [{"ref": "img", "dependsOn": ["pkg:zlib"]}]
        });

        let bom: Bom = serde_json::from_value(doc).unwrap();
        let subject = bom.subject().unwrap();
        assert_eq!(subject.name, "nginx");
        assert_eq!(subject.bom_ref.as_deref(), Some("img"));

        let components = bom.components.as_ref().unwrap();
        assert_eq!(components[0].extra.get("purl"), Some(&json!("pkg:generic/zlib@1.3")));

        let deps = bom.dependencies.as_ref().unwrap();
        assert_eq!(deps[0].reference, "img");
        assert_eq!(deps[0].depends_on.as_ref().unwrap(), &vec!["pkg:zlib".to_string()]);
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let doc = json!({
            "bomFormat": "CycloneDX",
            "specVersion": "1.5",
            "$schema": "http://cyclonedx.org/schema/bom-1.5.schema.json",
            "metadata": {
                "timestamp": "2025-01-01T00:00:00Z",
                "component": {"type": "application", "name": "app", "version": "1.0",
                              "licenses": [{"license": {"id": "MIT"}}]}
            },
            "vulnerabilities": [
                {"bom-ref": "v1", "id": "CVE-2024-0001",
                 "affects": [{"ref": "lib", "versions": [{"version": "1.0"}]}]}
            ]
        });

        let bom: Bom = serde_json::from_value(doc.clone()).unwrap();
        let back = serde_json::to_value(&bom).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_legacy_tools_array_normalized() {
        let doc = json!({
            "metadata": {
                "tools": [{"vendor": "anchore", "name": "syft", "version": "1.0.0"}],
                "component": {"type": "container", "name": "img"}
            }
        });

        let bom: Bom = serde_json::from_value(doc).unwrap();
        let tools = bom.metadata.unwrap().tools.unwrap();
        let components = tools.components.unwrap();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].group.as_deref(), Some("anchore"));
        assert_eq!(components[0].name, "syft");
        assert_eq!(components[0].component_type.as_deref(), Some(APPLICATION_TYPE));
    }

    #[test]
    fn test_tools_object_form() {
        let doc = json!({
            "metadata": {
                "tools": {
                    "components": [{"type": "application", "name": "syft", "bom-ref": "syft"}],
                    "services": [{"bom-ref": "svc", "name": "scanner-api"}]
                }
            }
        });

        let bom: Bom = serde_json::from_value(doc).unwrap();
        let tools = bom.metadata.unwrap().tools.unwrap();
        assert_eq!(tools.components.unwrap()[0].bom_ref.as_deref(), Some("syft"));
        assert_eq!(tools.services.unwrap()[0].bom_ref.as_deref(), Some("svc"));
    }

    #[test]
    fn test_serial_or_unknown() {
        let mut bom = Bom::default();
        assert_eq!(bom.serial_or_unknown(), "unknown");
        bom.serial_number = Some("urn:uuid:abc".to_string());
        assert_eq!(bom.serial_or_unknown(), "urn:uuid:abc");
    }
}
