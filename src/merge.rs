//! Hierarchical merge of CycloneDX documents
//!
//! Folds N documents under a synthetic subject component. Each document's
//! root component becomes a top-level component of the result, carrying the
//! document's flat component list as its sub-components, and every
//! reference from that document is prefixed with the document namespace.

use serde::{Deserialize, Serialize};

use crate::bom::{
    Assessor, Attestation, Bom, Claim, Component, Composition, DeclarationEvidence,
    Declarations, Definitions, Dependency, Metadata, Organization, Service, Standard, Targets,
    Tools, Vulnerability, APPLICATION_TYPE, BOM_FORMAT, SPEC_VERSION,
};
use crate::error::SbomError;
use crate::namespace::{namespace_tree, Namespace, Referencing};

/// How `vulnerabilities[].affects[].ref` is rewritten
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AffectsRewrite {
    /// Prefix each affected reference with the document namespace
    #[default]
    Prefix,
    /// Replace each affected reference with the bare namespace string
    CollapseToNamespace,
}

/// Options for a hierarchical merge
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MergeOptions {
    pub affects: AffectsRewrite,
}

/// Identity of the synthetic top-level component of a merge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Subject {
    pub group: Option<String>,
    pub name: String,
    pub version: String,
    /// Explicit reference for the subject; defaults to its namespace
    pub bom_ref: Option<String>,
}

impl Subject {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Subject {
            name: name.into(),
            version: version.into(),
            ..Default::default()
        }
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn namespace(&self) -> Namespace {
        Namespace::from_parts(self.group.as_deref(), &self.name, &self.version)
    }

    fn to_component(&self) -> Component {
        let mut component = Component::new(
            APPLICATION_TYPE,
            self.group.as_deref(),
            &self.name,
            &self.version,
        );
        component.bom_ref = Some(
            self.bom_ref
                .clone()
                .filter(|r| !r.is_empty())
                .unwrap_or_else(|| self.namespace().to_string()),
        );
        component
    }
}

/// Collections of the result, filled document by document
#[derive(Default)]
struct Accumulator {
    tool_components: Vec<Component>,
    tool_services: Vec<Service>,
    components: Vec<Component>,
    services: Vec<Service>,
    external_references: Vec<serde_json::Value>,
    dependencies: Vec<Dependency>,
    compositions: Vec<Composition>,
    vulnerabilities: Vec<Vulnerability>,
    assessors: Vec<Assessor>,
    attestations: Vec<Attestation>,
    claims: Vec<Claim>,
    evidence: Vec<DeclarationEvidence>,
    target_organizations: Vec<Organization>,
    target_components: Vec<Component>,
    target_services: Vec<Service>,
    standards: Vec<Standard>,
    /// Root reference of each folded document, in input order
    root_refs: Vec<String>,
}

/// Merge documents hierarchically under `subject`
///
/// Takes ownership of the input documents: their component trees are
/// rewritten in place and moved into the result.
pub fn hierarchical_merge(
    boms: Vec<Bom>,
    subject: &Subject,
    options: &MergeOptions,
) -> Result<Bom, SbomError> {
    validate_merge_inputs(&boms, subject)?;
    Ok(merge_validated(boms, subject, options))
}

/// Merge documents that already passed [`validate_merge_inputs`]
pub(crate) fn merge_validated(boms: Vec<Bom>, subject: &Subject, options: &MergeOptions) -> Bom {
    let mut acc = Accumulator::default();
    for bom in boms {
        fold_document(&mut acc, bom, options);
    }
    finish(acc, subject)
}

/// Check the preconditions of [`hierarchical_merge`] without consuming the
/// documents
pub fn validate_merge_inputs(boms: &[Bom], subject: &Subject) -> Result<(), SbomError> {
    if subject.name.is_empty() || subject.version.is_empty() {
        return Err(SbomError::MissingSubjectIdentity);
    }

    if let Some(bom) = boms.iter().find(|b| b.subject().is_none()) {
        return Err(SbomError::MissingMetadataComponent {
            serial: bom.serial_or_unknown(),
        });
    }

    Ok(())
}

fn fold_document(acc: &mut Accumulator, bom: Bom, options: &MergeOptions) {
    let Bom {
        metadata,
        components,
        services,
        external_references,
        dependencies,
        compositions,
        vulnerabilities,
        declarations,
        definitions,
        ..
    } = bom;

    let Metadata {
        tools, component, ..
    } = metadata.unwrap_or_default();
    // Validated inputs always carry a root
    let Some(mut root) = component else {
        return;
    };
    let namespace = Namespace::of(&root);

    if let Some(tools) = tools {
        union_tools(acc, tools);
    }

    // Absorb the flat component list under the document root
    if let Some(components) = components {
        root.components
            .get_or_insert_with(Vec::new)
            .extend(components);
    }
    namespace_tree(&namespace, &mut root);

    let root_ref = match root.bom_ref.as_deref() {
        Some(r) if !r.is_empty() => r.to_string(),
        _ => namespace.to_string(),
    };
    root.bom_ref = Some(root_ref.clone());
    acc.root_refs.push(root_ref);
    acc.components.push(root);

    if let Some(mut services) = services {
        services.namespace_refs(&namespace);
        acc.services.extend(services);
    }

    if let Some(refs) = external_references {
        acc.external_references.extend(refs);
    }

    if let Some(mut dependencies) = dependencies {
        dependencies.namespace_refs(&namespace);
        acc.dependencies.extend(dependencies);
    }

    if let Some(mut compositions) = compositions {
        compositions.namespace_refs(&namespace);
        acc.compositions.extend(compositions);
    }

    if let Some(mut vulnerabilities) = vulnerabilities {
        match options.affects {
            AffectsRewrite::Prefix => vulnerabilities.namespace_refs(&namespace),
            AffectsRewrite::CollapseToNamespace => {
                for vulnerability in vulnerabilities.iter_mut() {
                    namespace.rewrite_opt(&mut vulnerability.bom_ref);
                    for affect in vulnerability.affects.iter_mut().flatten() {
                        affect.reference = namespace.to_string();
                    }
                }
            }
        }
        acc.vulnerabilities.extend(vulnerabilities);
    }

    if let Some(declarations) = declarations {
        fold_declarations(acc, declarations, &namespace);
    }

    if let Some(Definitions {
        standards: Some(mut standards),
        ..
    }) = definitions
    {
        standards.namespace_refs(&namespace);
        acc.standards.extend(standards);
    }
}

fn fold_declarations(acc: &mut Accumulator, declarations: Declarations, namespace: &Namespace) {
    let Declarations {
        assessors,
        attestations,
        claims,
        evidence,
        targets,
        ..
    } = declarations;

    if let Some(mut assessors) = assessors {
        assessors.namespace_refs(namespace);
        acc.assessors.extend(assessors);
    }
    if let Some(mut attestations) = attestations {
        attestations.namespace_refs(namespace);
        acc.attestations.extend(attestations);
    }
    if let Some(mut claims) = claims {
        claims.namespace_refs(namespace);
        acc.claims.extend(claims);
    }
    if let Some(mut evidence) = evidence {
        evidence.namespace_refs(namespace);
        acc.evidence.extend(evidence);
    }
    if let Some(targets) = targets {
        if let Some(mut organizations) = targets.organizations {
            organizations.namespace_refs(namespace);
            acc.target_organizations.extend(organizations);
        }
        if let Some(mut components) = targets.components {
            components.namespace_refs(namespace);
            acc.target_components.extend(components);
        }
        if let Some(mut services) = targets.services {
            services.namespace_refs(namespace);
            acc.target_services.extend(services);
        }
    }
}

/// Union tools into the result, first seen wins
///
/// Tools are matched by bom-ref; tools without one are matched by identity.
fn union_tools(acc: &mut Accumulator, tools: Tools) {
    for component in tools.components.into_iter().flatten() {
        if !acc
            .tool_components
            .iter()
            .any(|existing| same_tool(existing, &component))
        {
            acc.tool_components.push(component);
        }
    }
    for service in tools.services.into_iter().flatten() {
        if !acc
            .tool_services
            .iter()
            .any(|existing| same_tool_service(existing, &service))
        {
            acc.tool_services.push(service);
        }
    }
}

fn same_tool(a: &Component, b: &Component) -> bool {
    match (a.bom_ref.as_deref(), b.bom_ref.as_deref()) {
        (Some(x), Some(y)) => x == y,
        (None, None) => a.group == b.group && a.name == b.name && a.version == b.version,
        _ => false,
    }
}

fn same_tool_service(a: &Service, b: &Service) -> bool {
    match (a.bom_ref.as_deref(), b.bom_ref.as_deref()) {
        (Some(x), Some(y)) => x == y,
        (None, None) => ["group", "name", "version"]
            .iter()
            .all(|field| a.extra.get(*field) == b.extra.get(*field)),
        _ => false,
    }
}

fn non_empty<T>(items: Vec<T>) -> Option<Vec<T>> {
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

/// Build the final document, dropping empty collections
fn finish(acc: Accumulator, subject: &Subject) -> Bom {
    let subject_component = subject.to_component();
    let subject_ref = subject_component.bom_ref.clone().unwrap_or_default();

    let mut dependencies = acc.dependencies;
    dependencies.push(Dependency {
        reference: subject_ref,
        depends_on: non_empty(acc.root_refs),
        ..Default::default()
    });

    let tools = Tools {
        components: non_empty(acc.tool_components),
        services: non_empty(acc.tool_services),
    };

    let targets = Targets {
        organizations: non_empty(acc.target_organizations),
        components: non_empty(acc.target_components),
        services: non_empty(acc.target_services),
    };
    let has_targets =
        targets.organizations.is_some() || targets.components.is_some() || targets.services.is_some();

    let declarations = Declarations {
        assessors: non_empty(acc.assessors),
        attestations: non_empty(acc.attestations),
        claims: non_empty(acc.claims),
        evidence: non_empty(acc.evidence),
        targets: has_targets.then_some(targets),
        ..Default::default()
    };
    let has_declarations = declarations.assessors.is_some()
        || declarations.attestations.is_some()
        || declarations.claims.is_some()
        || declarations.evidence.is_some()
        || declarations.targets.is_some();

    let definitions = non_empty(acc.standards).map(|standards| Definitions {
        standards: Some(standards),
        ..Default::default()
    });

    Bom {
        bom_format: Some(BOM_FORMAT.to_string()),
        spec_version: Some(SPEC_VERSION.to_string()),
        version: Some(1),
        metadata: Some(Metadata {
            tools: (!tools.is_empty()).then_some(tools),
            component: Some(subject_component),
            ..Default::default()
        }),
        components: non_empty(acc.components),
        services: non_empty(acc.services),
        external_references: non_empty(acc.external_references),
        dependencies: non_empty(dependencies),
        compositions: non_empty(acc.compositions),
        vulnerabilities: non_empty(acc.vulnerabilities),
        declarations: has_declarations.then_some(declarations),
        definitions,
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn leaf(name: &str, version: &str, root_ref: &str) -> Bom {
        serde_json::from_value(json!({
            "bomFormat": "CycloneDX",
            "specVersion": "1.6",
            "metadata": {
                "component": {"type": "container", "name": name, "version": version, "bom-ref": root_ref}
            },
            "components": [
                {"type": "library", "name": "zlib", "version": "1.3", "bom-ref": "pkg:zlib"}
            ],
            "dependencies": [{"ref": root_ref, "dependsOn": ["pkg:zlib"]}]
        }))
        .unwrap()
    }

    fn top_level_refs(bom: &Bom) -> Vec<String> {
        bom.components
            .as_ref()
            .unwrap()
            .iter()
            .map(|c| c.bom_ref.clone().unwrap())
            .collect()
    }

    #[test]
    fn test_missing_subject_identity() {
        let result = hierarchical_merge(vec![], &Subject::new("", "1.0"), &MergeOptions::default());
        assert!(matches!(result, Err(SbomError::MissingSubjectIdentity)));

        let result = hierarchical_merge(vec![], &Subject::new("app", ""), &MergeOptions::default());
        assert!(matches!(result, Err(SbomError::MissingSubjectIdentity)));
    }

    #[test]
    fn test_missing_metadata_component_names_serial() {
        let mut broken = Bom::default();
        broken.serial_number = Some("urn:uuid:broken".to_string());

        let result = hierarchical_merge(
            vec![leaf("lib", "1.0", "root"), broken],
            &Subject::new("app", "1.0"),
            &MergeOptions::default(),
        );

        match result {
            Err(SbomError::MissingMetadataComponent { serial }) => {
                assert_eq!(serial, "urn:uuid:broken")
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_merge_two_versions_of_same_library() {
        let merged = hierarchical_merge(
            vec![leaf("lib", "1.0", "root"), leaf("lib", "2.0", "root")],
            &Subject::new("app", "1.0"),
            &MergeOptions::default(),
        )
        .unwrap();

        assert_eq!(top_level_refs(&merged), vec!["lib@1.0:root", "lib@2.0:root"]);

        let deps = merged.dependencies.as_ref().unwrap();
        let subject_dep = deps.last().unwrap();
        assert_eq!(subject_dep.reference, "app@1.0");
        assert_eq!(
            subject_dep.depends_on.as_ref().unwrap(),
            &vec!["lib@1.0:root".to_string(), "lib@2.0:root".to_string()]
        );

        // Per-document dependencies are rewritten with their own namespace
        assert_eq!(deps[0].reference, "lib@1.0:root");
        assert_eq!(deps[0].depends_on.as_ref().unwrap()[0], "lib@1.0:pkg:zlib");
        assert_eq!(deps[1].depends_on.as_ref().unwrap()[0], "lib@2.0:pkg:zlib");

        let subject = merged.subject().unwrap();
        assert_eq!(subject.name, "app");
        assert_eq!(subject.component_type.as_deref(), Some(APPLICATION_TYPE));
        assert_eq!(merged.spec_version.as_deref(), Some(SPEC_VERSION));
    }

    #[test]
    fn test_flat_components_absorbed_under_root() {
        let merged = hierarchical_merge(
            vec![leaf("img", "1", "root")],
            &Subject::new("app", "1.0"),
            &MergeOptions::default(),
        )
        .unwrap();

        let components = merged.components.as_ref().unwrap();
        assert_eq!(components.len(), 1);
        let children = components[0].components.as_ref().unwrap();
        assert_eq!(children[0].name, "zlib");
        assert_eq!(children[0].bom_ref.as_deref(), Some("img@1:pkg:zlib"));
    }

    #[test]
    fn test_single_document_with_own_identity() {
        let input = leaf("lib", "1.0", "root");
        let original_root = input.subject().unwrap().clone();

        let merged = hierarchical_merge(
            vec![input],
            &Subject::new("lib", "1.0"),
            &MergeOptions::default(),
        )
        .unwrap();

        let root = &merged.components.as_ref().unwrap()[0];
        assert_eq!(root.name, original_root.name);
        assert_eq!(root.version, original_root.version);
        assert_eq!(root.bom_ref.as_deref(), Some("lib@1.0:root"));
        let child = &root.components.as_ref().unwrap()[0];
        assert_eq!(child.bom_ref.as_deref(), Some("lib@1.0:pkg:zlib"));
    }

    #[test]
    fn test_namespaced_refs_unique_across_documents() {
        let docs = vec![
            leaf("a", "1", "root"),
            leaf("b", "1", "root"),
            serde_json::from_value(json!({
                "metadata": {"component": {"type": "container", "group": "acme", "name": "a", "version": "1", "bom-ref": "root"}},
                "components": [{"type": "library", "name": "zlib", "bom-ref": "pkg:zlib"}]
            }))
            .unwrap(),
        ];

        let merged =
            hierarchical_merge(docs, &Subject::new("app", "1"), &MergeOptions::default()).unwrap();

        let mut seen = HashSet::new();
        let mut stack: Vec<&Component> = merged.components.as_ref().unwrap().iter().collect();
        while let Some(c) = stack.pop() {
            assert!(seen.insert(c.bom_ref.clone().unwrap()), "duplicate ref {:?}", c.bom_ref);
            stack.extend(c.components.iter().flatten());
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_root_without_ref_gets_namespace() {
        let doc: Bom = serde_json::from_value(json!({
            "metadata": {"component": {"type": "container", "name": "img", "version": "3"}}
        }))
        .unwrap();

        let merged =
            hierarchical_merge(vec![doc], &Subject::new("app", "1"), &MergeOptions::default())
                .unwrap();
        assert_eq!(top_level_refs(&merged), vec!["img@3"]);
    }

    #[test]
    fn test_empty_collections_absent() {
        let doc: Bom = serde_json::from_value(json!({
            "metadata": {"component": {"type": "container", "name": "img", "version": "3", "bom-ref": "r"}}
        }))
        .unwrap();

        let merged =
            hierarchical_merge(vec![doc], &Subject::new("app", "1"), &MergeOptions::default())
                .unwrap();

        assert!(merged.services.is_none());
        assert!(merged.vulnerabilities.is_none());
        assert!(merged.compositions.is_none());
        assert!(merged.external_references.is_none());
        assert!(merged.declarations.is_none());
        assert!(merged.definitions.is_none());
        assert!(merged.metadata.as_ref().unwrap().tools.is_none());

        let value = serde_json::to_value(&merged).unwrap();
        assert!(value.get("services").is_none());
        assert!(value.get("vulnerabilities").is_none());
    }

    #[test]
    fn test_tools_union_first_seen_wins() {
        let with_tools = |version: &str| -> Bom {
            serde_json::from_value(json!({
                "metadata": {
                    "tools": {"components": [{"type": "application", "name": "syft", "version": version, "bom-ref": "syft"}]},
                    "component": {"type": "container", "name": "img", "version": version}
                }
            }))
            .unwrap()
        };

        let merged = hierarchical_merge(
            vec![with_tools("1"), with_tools("2")],
            &Subject::new("app", "1"),
            &MergeOptions::default(),
        )
        .unwrap();

        let tools = merged.metadata.unwrap().tools.unwrap().components.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].version.as_deref(), Some("1"));
        // Tools keep their original reference
        assert_eq!(tools[0].bom_ref.as_deref(), Some("syft"));
    }

    #[test]
    fn test_tool_services_without_ref_matched_by_identity() {
        let with_service = |version: &str| -> Bom {
            serde_json::from_value(json!({
                "metadata": {
                    "tools": {"services": [{"group": "acme", "name": "scanner-api", "version": version}]},
                    "component": {"type": "container", "name": "img", "version": "1"}
                }
            }))
            .unwrap()
        };

        let merged = hierarchical_merge(
            vec![with_service("2"), with_service("2"), with_service("3")],
            &Subject::new("app", "1"),
            &MergeOptions::default(),
        )
        .unwrap();

        let services = merged.metadata.unwrap().tools.unwrap().services.unwrap();
        let versions: Vec<_> = services.iter().map(|s| s.extra["version"].clone()).collect();
        assert_eq!(versions, vec![json!("2"), json!("3")]);
    }

    #[test]
    fn test_vulnerabilities_affects_modes() {
        let doc = || -> Bom {
            serde_json::from_value(json!({
                "metadata": {"component": {"type": "container", "name": "img", "version": "1"}},
                "vulnerabilities": [{
                    "bom-ref": "v1", "id": "CVE-2024-1",
                    "affects": [{"ref": "pkg:a"}, {"ref": "pkg:b"}]
                }]
            }))
            .unwrap()
        };

        let merged =
            hierarchical_merge(vec![doc()], &Subject::new("app", "1"), &MergeOptions::default())
                .unwrap();
        let vuln = &merged.vulnerabilities.as_ref().unwrap()[0];
        assert_eq!(vuln.bom_ref.as_deref(), Some("img@1:v1"));
        let affects = vuln.affects.as_ref().unwrap();
        assert_eq!(affects[0].reference, "img@1:pkg:a");
        assert_eq!(affects[1].reference, "img@1:pkg:b");
        assert_eq!(vuln.extra.get("id"), Some(&json!("CVE-2024-1")));

        let legacy = MergeOptions {
            affects: AffectsRewrite::CollapseToNamespace,
        };
        let merged = hierarchical_merge(vec![doc()], &Subject::new("app", "1"), &legacy).unwrap();
        let affects = merged.vulnerabilities.as_ref().unwrap()[0].affects.clone().unwrap();
        assert!(affects.iter().all(|a| a.reference == "img@1"));
    }

    #[test]
    fn test_declarations_and_definitions_namespaced() {
        let doc: Bom = serde_json::from_value(json!({
            "metadata": {"component": {"type": "container", "name": "img", "version": "1"}},
            "declarations": {
                "assessors": [{"bom-ref": "assessor-1", "thirdParty": true}],
                "attestations": [{
                    "assessor": "assessor-1",
                    "map": [{
                        "requirement": "req-1",
                        "claims": ["claim-1"],
                        "counterClaims": ["claim-2"],
                        "conformance": {"score": 1.0, "mitigationStrategies": ["ev-1"]}
                    }]
                }],
                "claims": [{
                    "bom-ref": "claim-1", "target": "pkg:a",
                    "evidence": ["ev-1"], "counterEvidence": ["ev-2"]
                }],
                "evidence": [{"bom-ref": "ev-1"}],
                "targets": {
                    "organizations": [{"bom-ref": "org-1", "name": "Acme"}],
                    "components": [{"type": "library", "name": "a", "bom-ref": "pkg:a"}],
                    "services": [{"bom-ref": "svc-1"}]
                },
                "affirmation": {"statement": "dropped"}
            },
            "definitions": {
                "standards": [{
                    "bom-ref": "std-1",
                    "requirements": [{"bom-ref": "req-1"}],
                    "levels": [{"bom-ref": "lvl-1", "requirements": ["req-1"]}]
                }]
            }
        }))
        .unwrap();

        let merged =
            hierarchical_merge(vec![doc], &Subject::new("app", "1"), &MergeOptions::default())
                .unwrap();

        let decl = merged.declarations.as_ref().unwrap();
        assert_eq!(decl.assessors.as_ref().unwrap()[0].bom_ref.as_deref(), Some("img@1:assessor-1"));

        let attestation = &decl.attestations.as_ref().unwrap()[0];
        assert_eq!(attestation.assessor.as_deref(), Some("img@1:assessor-1"));
        let map = &attestation.map.as_ref().unwrap()[0];
        assert_eq!(map.requirement.as_deref(), Some("img@1:req-1"));
        assert_eq!(map.claims.as_ref().unwrap()[0], "img@1:claim-1");
        assert_eq!(map.counter_claims.as_ref().unwrap()[0], "img@1:claim-2");
        let strategies = map.conformance.as_ref().unwrap().mitigation_strategies.as_ref().unwrap();
        assert_eq!(strategies[0], "img@1:ev-1");

        let claim = &decl.claims.as_ref().unwrap()[0];
        assert_eq!(claim.target.as_deref(), Some("img@1:pkg:a"));
        assert_eq!(claim.evidence.as_ref().unwrap()[0], "img@1:ev-1");
        assert_eq!(claim.counter_evidence.as_ref().unwrap()[0], "img@1:ev-2");

        let targets = decl.targets.as_ref().unwrap();
        assert_eq!(
            targets.organizations.as_ref().unwrap()[0].bom_ref.as_deref(),
            Some("img@1:org-1")
        );
        assert_eq!(targets.components.as_ref().unwrap()[0].bom_ref.as_deref(), Some("img@1:pkg:a"));
        assert_eq!(targets.services.as_ref().unwrap()[0].bom_ref.as_deref(), Some("img@1:svc-1"));
        assert!(decl.extra.get("affirmation").is_none());

        let standard = &merged.definitions.as_ref().unwrap().standards.as_ref().unwrap()[0];
        assert_eq!(standard.bom_ref.as_deref(), Some("img@1:std-1"));
        let level = &standard.levels.as_ref().unwrap()[0];
        assert_eq!(level.requirements.as_ref().unwrap()[0], "img@1:req-1");
    }

    #[test]
    fn test_targets_namespaced_once_across_documents() {
        let doc = |name: &str| -> Bom {
            serde_json::from_value(json!({
                "metadata": {"component": {"type": "container", "name": name, "version": "1"}},
                "declarations": {"targets": {"organizations": [{"bom-ref": "org"}]}}
            }))
            .unwrap()
        };

        let merged = hierarchical_merge(
            vec![doc("a"), doc("b")],
            &Subject::new("app", "1"),
            &MergeOptions::default(),
        )
        .unwrap();

        let orgs = merged
            .declarations
            .unwrap()
            .targets
            .unwrap()
            .organizations
            .unwrap();
        let refs: Vec<_> = orgs.iter().map(|o| o.bom_ref.clone().unwrap()).collect();
        assert_eq!(refs, vec!["a@1:org", "b@1:org"]);
    }

    #[test]
    fn test_services_and_compositions() {
        let doc: Bom = serde_json::from_value(json!({
            "metadata": {"component": {"type": "container", "name": "img", "version": "1"}},
            "services": [{"bom-ref": "api", "services": [{"bom-ref": "db"}]}],
            "externalReferences": [{"type": "website", "url": "https://example.org"}],
            "compositions": [{
                "aggregate": "complete",
                "assemblies": ["pkg:a"],
                "dependencies": ["pkg:b"],
                "vulnerabilities": ["v1"]
            }]
        }))
        .unwrap();

        let merged =
            hierarchical_merge(vec![doc], &Subject::new("app", "1"), &MergeOptions::default())
                .unwrap();

        let service = &merged.services.as_ref().unwrap()[0];
        assert_eq!(service.bom_ref.as_deref(), Some("img@1:api"));
        assert_eq!(service.services.as_ref().unwrap()[0].bom_ref.as_deref(), Some("img@1:db"));

        assert_eq!(
            merged.external_references.as_ref().unwrap()[0],
            json!({"type": "website", "url": "https://example.org"})
        );

        let composition = &merged.compositions.as_ref().unwrap()[0];
        assert_eq!(composition.assemblies.as_ref().unwrap()[0], "img@1:pkg:a");
        assert_eq!(composition.dependencies.as_ref().unwrap()[0], "img@1:pkg:b");
        assert_eq!(composition.vulnerabilities.as_ref().unwrap()[0], "img@1:v1");
        assert_eq!(composition.extra.get("aggregate"), Some(&json!("complete")));
    }

    #[test]
    fn test_group_in_subject_namespace() {
        let merged = hierarchical_merge(
            vec![leaf("lib", "1.0", "root")],
            &Subject::new("app", "2.0").with_group("org.acme"),
            &MergeOptions::default(),
        )
        .unwrap();

        let subject = merged.subject().unwrap();
        assert_eq!(subject.bom_ref.as_deref(), Some("org.acme.app@2.0"));
        assert_eq!(subject.group.as_deref(), Some("org.acme"));
    }
}
