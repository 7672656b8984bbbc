//! Condition Cache
//!
//! Condition forests are loaded from a [`ConditionSource`] the first time a rule set is needed
//! and kept until [`ConditionCache::reset`] is called. A cache is owned by the caller and scoped
//! to one logical request; it is not meant to be shared between concurrent evaluations.

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::{
    conditions::{ConditionError, ConditionNode, RuleSetId, forest::ConditionForest},
    legacy::decode_records,
};

/// Supplies the stored condition nodes of a rule set.
pub trait ConditionSource: fmt::Debug {
    /// Load every node of `rule_set_id`.
    ///
    /// # Errors
    ///
    /// Returns a [`ConditionError`] if the stored nodes cannot be read.
    fn nodes(&self, rule_set_id: RuleSetId) -> Result<Vec<ConditionNode>, ConditionError>;
}

/// Condition nodes held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConditionSource {
    nodes: Vec<ConditionNode>,
}

impl InMemoryConditionSource {
    /// Create a source over `nodes`.
    pub fn new(nodes: impl IntoIterator<Item = ConditionNode>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
        }
    }

    /// Add a node.
    pub fn push(&mut self, node: ConditionNode) {
        self.nodes.push(node);
    }
}

impl ConditionSource for InMemoryConditionSource {
    fn nodes(&self, rule_set_id: RuleSetId) -> Result<Vec<ConditionNode>, ConditionError> {
        Ok(self
            .nodes
            .iter()
            .filter(|node| node.rule_set_id == rule_set_id)
            .cloned()
            .collect())
    }
}

/// Condition nodes stored as one serialized blob per rule set.
#[derive(Debug, Clone, Default)]
pub struct BlobConditionSource {
    blobs: FxHashMap<RuleSetId, String>,
}

impl BlobConditionSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the blob for a rule set.
    #[must_use]
    pub fn with_blob(mut self, rule_set_id: RuleSetId, blob: impl Into<String>) -> Self {
        self.blobs.insert(rule_set_id, blob.into());
        self
    }
}

impl ConditionSource for BlobConditionSource {
    fn nodes(&self, rule_set_id: RuleSetId) -> Result<Vec<ConditionNode>, ConditionError> {
        let Some(blob) = self.blobs.get(&rule_set_id) else {
            return Ok(Vec::new());
        };

        Ok(decode_records::<ConditionNode>(blob)?
            .into_iter()
            .map(|(_, node)| node)
            .collect())
    }
}

/// Request-scoped cache of condition forests, keyed by rule set.
#[derive(Debug, Default)]
pub struct ConditionCache {
    forests: FxHashMap<RuleSetId, ConditionForest>,
}

impl ConditionCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forest of `rule_set_id`, loading it from `source` on first use.
    ///
    /// A rule set whose nodes cannot be read is cached as an empty forest, so every tree in it
    /// has no children.
    pub fn forest(
        &mut self,
        source: &dyn ConditionSource,
        rule_set_id: RuleSetId,
    ) -> &ConditionForest {
        self.forests.entry(rule_set_id).or_insert_with(|| {
            let nodes = source.nodes(rule_set_id).unwrap_or_else(|error| {
                warn!(%rule_set_id, %error, "failed to load condition nodes; using an empty set");

                Vec::new()
            });

            let forest = ConditionForest::from_nodes(rule_set_id, nodes);

            debug!(
                %rule_set_id,
                nodes = forest.len(),
                dropped = forest.dropped(),
                "loaded condition forest"
            );

            forest
        })
    }

    /// Whether `rule_set_id` has been loaded.
    pub fn contains(&self, rule_set_id: RuleSetId) -> bool {
        self.forests.contains_key(&rule_set_id)
    }

    /// Number of loaded rule sets.
    pub fn len(&self) -> usize {
        self.forests.len()
    }

    /// Whether nothing has been loaded.
    pub fn is_empty(&self) -> bool {
        self.forests.is_empty()
    }

    /// Forget every loaded forest.
    pub fn reset(&mut self) {
        self.forests.clear();
    }
}
