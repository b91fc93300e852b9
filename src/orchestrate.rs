//! Bottom-up processing of a component graph
//!
//! Discovers the graph from a root component, generates one leaf SBOM per
//! component and merges results from the leaves upwards. A component is
//! merged exactly once, after all of its children, and its result is shared
//! with every parent that references it. A result leaves the graph as soon as
//! its last parent has folded it in.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{debug, info, warn};

use crate::bom::Bom;
use crate::descriptor::ComponentKey;
use crate::error::SbomError;
use crate::graph::{ComponentGraph, Node};
use crate::merge::{merge_validated, validate_merge_inputs, MergeOptions, Subject};
use crate::scan::{generate_leaf, LeafGenerator};
use crate::source::DescriptorSource;
use crate::staging::Staging;

/// Options for processing a component graph
#[derive(Debug, Clone)]
pub struct ProcessOptions {
    pub merge: MergeOptions,
    /// Upper bound on concurrent leaf generations and merges
    pub max_concurrent: usize,
}

impl Default for ProcessOptions {
    fn default() -> Self {
        Self {
            merge: MergeOptions::default(),
            max_concurrent: 4,
        }
    }
}

/// Statistics from processing
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessStats {
    /// Components reachable from the root (including it)
    pub components_discovered: usize,
    /// Components whose descriptor could not be fetched
    pub descriptors_missing: usize,
    /// Components that produced a leaf SBOM
    pub leaves_generated: usize,
    /// Hierarchical merges performed
    pub merges_performed: usize,
    /// Merges that failed and fell back to their first input
    pub merges_degraded: usize,
}

/// Result of processing
#[derive(Debug)]
pub struct ProcessResult {
    /// Merged document of the root, if any component produced one
    pub root: Option<Bom>,
    pub stats: ProcessStats,
}

#[derive(Default)]
struct MergeCounters {
    performed: AtomicUsize,
    degraded: AtomicUsize,
}

/// State shared by all merge workers
struct MergeContext<'a> {
    options: &'a MergeOptions,
    staging: Option<&'a Staging>,
    counters: &'a MergeCounters,
}

pub struct Orchestrator<'a> {
    source: &'a dyn DescriptorSource,
    generator: &'a dyn LeafGenerator,
    staging: Option<&'a Staging>,
    options: ProcessOptions,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        source: &'a dyn DescriptorSource,
        generator: &'a dyn LeafGenerator,
        options: ProcessOptions,
    ) -> Self {
        Orchestrator {
            source,
            generator,
            staging: None,
            options,
        }
    }

    /// Write every component's result into `staging`
    pub fn with_staging(mut self, staging: &'a Staging) -> Self {
        self.staging = Some(staging);
        self
    }

    /// Merged document for `root`, or `None` if nothing was produced
    pub fn process(&self, root: &ComponentKey) -> Result<Option<Bom>, SbomError> {
        Ok(self.run(root)?.root)
    }

    /// Like [`Orchestrator::process`], also returning statistics
    pub fn run(&self, root: &ComponentKey) -> Result<ProcessResult, SbomError> {
        let pool = build_pool(self.options.max_concurrent)?;

        info!("Discovering components from {}", root);
        let mut graph = ComponentGraph::discover(root, self.source);
        graph.check_acyclic()?;

        let leaves_generated = self.generate_leaves(&mut graph, &pool);

        let counters = MergeCounters::default();
        let ctx = MergeContext {
            options: &self.options.merge,
            staging: self.staging,
            counters: &counters,
        };
        merge_bottom_up(&graph, &pool, &ctx);

        let stats = ProcessStats {
            components_discovered: graph.len(),
            descriptors_missing: graph.missing_descriptors(),
            leaves_generated,
            merges_performed: counters.performed.load(Ordering::Relaxed),
            merges_degraded: counters.degraded.load(Ordering::Relaxed),
        };
        info!(
            "Processed {} components ({} leaves, {} merges, {} degraded, {} missing)",
            stats.components_discovered,
            stats.leaves_generated,
            stats.merges_performed,
            stats.merges_degraded,
            stats.descriptors_missing
        );

        let merged = graph.get(root).and_then(Node::take_result);
        if merged.is_none() {
            warn!("No SBOM produced for {}", root);
        }

        Ok(ProcessResult {
            root: merged,
            stats,
        })
    }

    /// Generate leaf documents on the pool, returning how many were produced
    fn generate_leaves(&self, graph: &mut ComponentGraph, pool: &ThreadPool) -> usize {
        let generator = self.generator;
        let options = &self.options.merge;
        let shared: &ComponentGraph = graph;

        let leaves: Vec<Option<Bom>> = pool.install(|| {
            (0..shared.len())
                .into_par_iter()
                .map(|index| {
                    shared
                        .node(index)
                        .descriptor
                        .as_ref()
                        .and_then(|descriptor| generate_leaf(descriptor, generator, options))
                })
                .collect()
        });

        let mut generated = 0;
        for (index, leaf) in leaves.into_iter().enumerate() {
            generated += usize::from(leaf.is_some());
            graph.node_mut(index).set_leaf(leaf);
        }
        generated
    }
}

fn build_pool(max_concurrent: usize) -> Result<ThreadPool, SbomError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(max_concurrent.max(1))
        .thread_name(|i| format!("sbom-worker-{}", i))
        .build()
        .map_err(|e| SbomError::Config(format!("Failed to start worker pool: {}", e)))
}

/// Merge in waves, starting from components without children
///
/// A parent joins the next wave when the last of its children finishes.
/// Waves are ordered by discovery index so results do not depend on thread
/// scheduling.
fn merge_bottom_up(graph: &ComponentGraph, pool: &ThreadPool, ctx: &MergeContext<'_>) {
    for node in graph.nodes() {
        node.pending.store(node.children.len(), Ordering::Release);
        node.consumers.store(node.parents.len(), Ordering::Release);
    }

    let mut wave: Vec<usize> = (0..graph.len())
        .filter(|&index| graph.node(index).is_leaf())
        .collect();
    let mut depth = 0;

    while !wave.is_empty() {
        debug!("Merge wave {}: {} components", depth, wave.len());
        let mut next: Vec<usize> = pool.install(|| {
            wave.par_iter()
                .flat_map_iter(|&index| merge_node(graph, index, ctx))
                .collect()
        });
        next.sort_unstable();
        wave = next;
        depth += 1;
    }
}

/// Merge one component and return the parents that became ready
fn merge_node(graph: &ComponentGraph, index: usize, ctx: &MergeContext<'_>) -> Vec<usize> {
    let node = graph.node(index);

    let mut inputs = Vec::with_capacity(node.children.len() + 1);
    inputs.extend(node.take_leaf());
    for &child in &node.children {
        inputs.extend(graph.node(child).consume_result());
    }

    let result = combine(&node.key, inputs, ctx);

    if let (Some(bom), Some(staging)) = (&result, ctx.staging) {
        if let Err(e) = staging.write_node(&node.key, bom) {
            warn!("Failed to stage SBOM for {}: {}", node.key, e);
        }
    }

    info!("Processed component {}", node.key);
    node.store_result(result);

    node.parents
        .iter()
        .copied()
        .filter(|&parent| graph.node(parent).pending.fetch_sub(1, Ordering::AcqRel) == 1)
        .collect()
}

/// Combine a component's leaf and child results into one document
fn combine(key: &ComponentKey, mut inputs: Vec<Bom>, ctx: &MergeContext<'_>) -> Option<Bom> {
    match inputs.len() {
        0 => {
            debug!("No SBOM inputs for {}", key);
            None
        }
        1 => inputs.pop(),
        n => {
            debug!("Merging {} SBOMs for {}", n, key);
            let subject = Subject::new(&key.name, &key.version);

            if let Err(e) = validate_merge_inputs(&inputs, &subject) {
                degraded(key, &e, ctx);
                return inputs.into_iter().next();
            }

            let merged = merge_validated(inputs, &subject, ctx.options);
            ctx.counters.performed.fetch_add(1, Ordering::Relaxed);
            Some(merged)
        }
    }
}

fn degraded(key: &ComponentKey, error: &SbomError, ctx: &MergeContext<'_>) {
    ctx.counters.degraded.fetch_add(1, Ordering::Relaxed);
    warn!(
        "{}",
        SbomError::MergeDegraded {
            component: key.to_string(),
            reason: error.to_string(),
        }
    );
}
