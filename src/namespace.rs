//! Reference namespacing for SBOM merging
//!
//! Every reference id in a CycloneDX document is only unique within that
//! document. Before a document is folded into a merged result, each id is
//! prefixed with a namespace derived from the document's root component,
//! so ids from different documents can no longer collide.

use std::fmt;

use crate::bom::{
    Affect, Assessor, Attestation, AttestationMap, Claim, Component, Composition,
    DeclarationEvidence, Dependency, Level, Organization, Requirement, Service, Standard,
    Vulnerability,
};

/// Separator between namespace and original reference
pub const NAMESPACE_SEPARATOR: char = ':';

/// A namespace prefix derived from a component identity
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Namespace(String);

impl Namespace {
    /// Derive the namespace for a component
    ///
    /// "group.name@version", or "name@version" when the group is empty
    pub fn of(component: &Component) -> Self {
        Self::from_parts(
            component.group.as_deref(),
            &component.name,
            component.version.as_deref().unwrap_or_default(),
        )
    }

    pub fn from_parts(group: Option<&str>, name: &str, version: &str) -> Self {
        match group {
            Some(group) if !group.is_empty() => Namespace(format!("{}.{}@{}", group, name, version)),
            _ => Namespace(format!("{}@{}", name, version)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Prefix a reference with this namespace
    ///
    /// Empty references stay empty.
    pub fn apply(&self, reference: &str) -> String {
        if reference.is_empty() {
            return String::new();
        }
        if self.0.is_empty() {
            return reference.to_string();
        }
        format!("{}{}{}", self.0, NAMESPACE_SEPARATOR, reference)
    }

    pub fn rewrite(&self, reference: &mut String) {
        *reference = self.apply(reference);
    }

    pub fn rewrite_opt(&self, reference: &mut Option<String>) {
        if let Some(r) = reference.as_mut() {
            self.rewrite(r);
        }
    }

    pub fn rewrite_all(&self, references: &mut Option<Vec<String>>) {
        if let Some(list) = references.as_mut() {
            for r in list.iter_mut() {
                self.rewrite(r);
            }
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An entity that owns or points at reference ids
pub trait Referencing {
    /// Prefix every reference this entity carries with `namespace`
    fn namespace_refs(&mut self, namespace: &Namespace);
}

impl<T: Referencing> Referencing for [T] {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        for item in self.iter_mut() {
            item.namespace_refs(namespace);
        }
    }
}

impl<T: Referencing> Referencing for Vec<T> {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        self.as_mut_slice().namespace_refs(namespace);
    }
}

impl<T: Referencing> Referencing for Option<T> {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        if let Some(inner) = self.as_mut() {
            inner.namespace_refs(namespace);
        }
    }
}

/// A node of a reference-bearing tree (components, services)
pub trait RefTree: Sized {
    /// Split borrow of the node's own reference and its children
    fn parts(&mut self) -> (&mut Option<String>, Option<&mut Vec<Self>>);
}

impl RefTree for Component {
    fn parts(&mut self) -> (&mut Option<String>, Option<&mut Vec<Self>>) {
        (&mut self.bom_ref, self.components.as_mut())
    }
}

impl RefTree for Service {
    fn parts(&mut self) -> (&mut Option<String>, Option<&mut Vec<Self>>) {
        (&mut self.bom_ref, self.services.as_mut())
    }
}

/// Prefix every reference in a tree with the same namespace
///
/// Walks with an explicit stack so depth is bounded by memory, not by the
/// call stack.
pub fn namespace_tree<T: RefTree>(namespace: &Namespace, root: &mut T) {
    let mut stack: Vec<&mut T> = vec![root];

    while let Some(node) = stack.pop() {
        let (bom_ref, children) = node.parts();
        namespace.rewrite_opt(bom_ref);
        if let Some(children) = children {
            stack.extend(children.iter_mut());
        }
    }
}

impl Referencing for Component {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace_tree(namespace, self);
    }
}

impl Referencing for Service {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace_tree(namespace, self);
    }
}

impl Referencing for Dependency {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite(&mut self.reference);
        namespace.rewrite_all(&mut self.depends_on);
    }
}

impl Referencing for Composition {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_all(&mut self.assemblies);
        namespace.rewrite_all(&mut self.dependencies);
        namespace.rewrite_all(&mut self.vulnerabilities);
    }
}

impl Referencing for Affect {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite(&mut self.reference);
    }
}

impl Referencing for Vulnerability {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
        self.affects.namespace_refs(namespace);
    }
}

impl Referencing for Assessor {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
    }
}

impl Referencing for AttestationMap {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.requirement);
        namespace.rewrite_all(&mut self.claims);
        namespace.rewrite_all(&mut self.counter_claims);
        if let Some(conformance) = self.conformance.as_mut() {
            namespace.rewrite_all(&mut conformance.mitigation_strategies);
        }
    }
}

impl Referencing for Attestation {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.assessor);
        self.map.namespace_refs(namespace);
    }
}

impl Referencing for Claim {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
        namespace.rewrite_opt(&mut self.target);
        namespace.rewrite_all(&mut self.evidence);
        namespace.rewrite_all(&mut self.counter_evidence);
        namespace.rewrite_all(&mut self.mitigation_strategies);
    }
}

impl Referencing for DeclarationEvidence {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
    }
}

impl Referencing for Organization {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
    }
}

impl Referencing for Requirement {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
        namespace.rewrite_opt(&mut self.parent);
    }
}

impl Referencing for Level {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
        namespace.rewrite_all(&mut self.requirements);
    }
}

impl Referencing for Standard {
    fn namespace_refs(&mut self, namespace: &Namespace) {
        namespace.rewrite_opt(&mut self.bom_ref);
        self.requirements.namespace_refs(namespace);
        self.levels.namespace_refs(namespace);
    }
}
