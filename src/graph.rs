//! Component reference graph
//!
//! Built breadth-first from a root component. Nodes are stored in discovery
//! order and addressed by index; edges are kept in both directions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::bom::Bom;
use crate::descriptor::{ComponentDescriptor, ComponentKey};
use crate::error::SbomError;
use crate::source::DescriptorSource;

/// One component version in the graph
#[derive(Debug)]
pub struct Node {
    pub key: ComponentKey,
    /// Absent when the descriptor could not be fetched
    pub descriptor: Option<ComponentDescriptor>,
    /// Distinct children, in descriptor order
    pub children: Vec<usize>,
    pub parents: Vec<usize>,
    /// Leaf document, taken by the merge of this node
    pub(crate) leaf: Mutex<Option<Bom>>,
    /// Children whose result is still outstanding
    pub(crate) pending: AtomicUsize,
    /// Parents that have not yet folded in the result
    pub(crate) consumers: AtomicUsize,
    /// Merged result, held until the last parent takes it
    pub(crate) result: Mutex<Option<Bom>>,
}

impl Node {
    fn new(key: ComponentKey) -> Self {
        Node {
            key,
            descriptor: None,
            children: Vec::new(),
            parents: Vec::new(),
            leaf: Mutex::new(None),
            pending: AtomicUsize::new(0),
            consumers: AtomicUsize::new(0),
            result: Mutex::new(None),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn set_leaf(&mut self, leaf: Option<Bom>) {
        *self.leaf.get_mut().unwrap_or_else(|e| e.into_inner()) = leaf;
    }

    pub(crate) fn take_leaf(&self) -> Option<Bom> {
        match self.leaf.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    pub(crate) fn store_result(&self, result: Option<Bom>) {
        match self.result.lock() {
            Ok(mut guard) => *guard = result,
            Err(poisoned) => *poisoned.into_inner() = result,
        }
    }

    /// Hand the result to one parent
    ///
    /// Every parent but the last gets a copy; the last one takes the document
    /// out of the graph.
    pub(crate) fn consume_result(&self) -> Option<Bom> {
        let mut guard = self.result.lock().unwrap_or_else(|e| e.into_inner());
        if self.consumers.fetch_sub(1, Ordering::AcqRel) == 1 {
            guard.take()
        } else {
            guard.clone()
        }
    }

    /// Remove the result of a node no parent consumes
    pub(crate) fn take_result(&self) -> Option<Bom> {
        self.result.lock().unwrap_or_else(|e| e.into_inner()).take()
    }
}

/// Components reachable from a root, in discovery order
#[derive(Debug, Default)]
pub struct ComponentGraph {
    nodes: IndexMap<ComponentKey, Node>,
}

impl ComponentGraph {
    /// Walk references breadth-first from `root`
    ///
    /// Every component is fetched once. A component whose descriptor cannot be
    /// fetched stays in the graph as a dead end.
    pub fn discover(root: &ComponentKey, source: &dyn DescriptorSource) -> Self {
        let mut graph = ComponentGraph::default();
        let (root_index, _) = graph.insert(root.clone());
        let mut queue = VecDeque::from([root_index]);

        while let Some(index) = queue.pop_front() {
            let key = graph.nodes[index].key.clone();
            debug!("Fetching descriptor for {}", key);

            let descriptor = match source.get_component(&key.name, &key.version) {
                Ok(descriptor) => descriptor,
                Err(e) => {
                    warn!("{}", as_fetch_failure(&key, e));
                    continue;
                }
            };

            for child in descriptor.children() {
                let (child_index, is_new) = graph.insert(child);
                if is_new {
                    queue.push_back(child_index);
                }
                graph.link(index, child_index);
            }
            graph.nodes[index].descriptor = Some(descriptor);
        }

        debug!("Discovered {} components from {}", graph.len(), root);
        graph
    }

    fn insert(&mut self, key: ComponentKey) -> (usize, bool) {
        match self.nodes.get_index_of(&key) {
            Some(index) => (index, false),
            None => {
                let node = Node::new(key.clone());
                let (index, _) = self.nodes.insert_full(key, node);
                (index, true)
            }
        }
    }

    fn link(&mut self, parent: usize, child: usize) {
        if self.nodes[parent].children.contains(&child) {
            return;
        }
        self.nodes[parent].children.push(child);
        self.nodes[child].parents.push(parent);
    }

    pub(crate) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, index: usize) -> &Node {
        &self.nodes[index]
    }

    pub(crate) fn node_mut(&mut self, index: usize) -> &mut Node {
        &mut self.nodes[index]
    }

    pub fn get(&self, key: &ComponentKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of components whose descriptor could not be fetched
    pub fn missing_descriptors(&self) -> usize {
        self.nodes.values().filter(|n| n.descriptor.is_none()).count()
    }

    /// Fail if the reference graph contains a cycle
    ///
    /// Kahn's algorithm over child counts; components never released are on
    /// or above a cycle.
    pub fn check_acyclic(&self) -> Result<(), SbomError> {
        let mut remaining: Vec<usize> = self.nodes.values().map(|n| n.children.len()).collect();
        let mut ready: Vec<usize> = (0..self.len()).filter(|&i| remaining[i] == 0).collect();
        let mut released = 0;

        while let Some(index) = ready.pop() {
            released += 1;
            for &parent in &self.nodes[index].parents {
                remaining[parent] -= 1;
                if remaining[parent] == 0 {
                    ready.push(parent);
                }
            }
        }

        if released == self.len() {
            return Ok(());
        }

        let stuck: Vec<String> = self
            .nodes
            .values()
            .zip(&remaining)
            .filter(|(_, &count)| count > 0)
            .map(|(node, _)| node.key.to_string())
            .collect();
        Err(SbomError::CycleDetected(stuck.join(", ")))
    }
}

fn as_fetch_failure(key: &ComponentKey, error: SbomError) -> SbomError {
    match error {
        e @ SbomError::DescriptorFetchFailed { .. } => e,
        other => SbomError::DescriptorFetchFailed {
            component: key.to_string(),
            reason: other.to_string(),
        },
    }
}
