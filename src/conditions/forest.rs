//! Condition Forest
//!
//! The nodes of one rule set, validated into a forest: every kept node is reachable from a root
//! of the same rule set through parents that also belong to it. Nodes that are orphaned, sit on
//! a cycle, or belong to another rule set are dropped with a warning.

use petgraph::{
    algo::is_cyclic_directed, graph::NodeIndex, stable_graph::StableDiGraph, visit::Dfs,
};
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use tracing::warn;

use crate::conditions::{ConditionNode, ConditionNodeId, HostId, RuleSetId};

/// Validated condition nodes of a single rule set.
#[derive(Debug, Clone, Default)]
pub struct ConditionForest {
    rule_set_id: Option<RuleSetId>,
    nodes: FxHashMap<ConditionNodeId, ConditionNode>,
    children: FxHashMap<ConditionNodeId, SmallVec<[ConditionNodeId; 4]>>,
    roots: FxHashMap<HostId, ConditionNodeId>,
    dropped: usize,
}

impl ConditionForest {
    /// Validate `nodes` into the forest of `rule_set_id`.
    ///
    /// Children keep the order they appear in `nodes`.
    pub fn from_nodes(
        rule_set_id: RuleSetId,
        nodes: impl IntoIterator<Item = ConditionNode>,
    ) -> Self {
        let mut ordered: Vec<ConditionNode> = Vec::new();
        let mut seen = FxHashSet::default();
        let mut dropped = 0;

        for node in nodes {
            if node.rule_set_id != rule_set_id {
                warn!(
                    node = %node.id,
                    node_rule_set = %node.rule_set_id,
                    %rule_set_id,
                    "dropping condition node from another rule set"
                );
                dropped += 1;
                continue;
            }

            if !seen.insert(node.id) {
                warn!(node = %node.id, %rule_set_id, "dropping duplicate condition node");
                dropped += 1;
                continue;
            }

            ordered.push(node);
        }

        let mut graph: StableDiGraph<ConditionNodeId, ()> = StableDiGraph::new();
        let indices: FxHashMap<ConditionNodeId, NodeIndex> = ordered
            .iter()
            .map(|node| (node.id, graph.add_node(node.id)))
            .collect();

        let mut roots: FxHashMap<HostId, ConditionNodeId> = FxHashMap::default();
        let mut starts: SmallVec<[NodeIndex; 4]> = SmallVec::new();

        for node in &ordered {
            let Some(&index) = indices.get(&node.id) else {
                continue;
            };

            match node.parent_id {
                Some(parent) => {
                    if let Some(&parent_index) = indices.get(&parent) {
                        graph.add_edge(parent_index, index, ());
                    }
                }
                None => {
                    starts.push(index);

                    if let Some(host) = node.host_id {
                        if roots.contains_key(&host) {
                            warn!(
                                node = %node.id,
                                %host,
                                %rule_set_id,
                                "host already has a root condition"
                            );
                        } else {
                            roots.insert(host, node.id);
                        }
                    }
                }
            }
        }

        if is_cyclic_directed(&graph) {
            warn!(%rule_set_id, "condition nodes form a cycle; nodes on it are unreachable");
        }

        let mut reachable = FxHashSet::default();

        for start in starts {
            let mut dfs = Dfs::new(&graph, start);

            while let Some(index) = dfs.next(&graph) {
                if let Some(id) = graph.node_weight(index) {
                    reachable.insert(*id);
                }
            }
        }

        let mut forest = Self {
            rule_set_id: Some(rule_set_id),
            roots,
            dropped,
            ..Self::default()
        };

        for node in ordered {
            if !reachable.contains(&node.id) {
                warn!(
                    node = %node.id,
                    %rule_set_id,
                    "dropping condition node unreachable from any root"
                );
                forest.dropped += 1;
                continue;
            }

            if let Some(parent) = node.parent_id {
                forest.children.entry(parent).or_default().push(node.id);
            }

            forest.nodes.insert(node.id, node);
        }

        forest
    }

    /// Rule set the forest was built for.
    pub fn rule_set_id(&self) -> Option<RuleSetId> {
        self.rule_set_id
    }

    /// Root node owned by `host`.
    pub fn root(&self, host: HostId) -> Option<&ConditionNode> {
        self.roots.get(&host).and_then(|id| self.nodes.get(id))
    }

    /// Look up a node.
    pub fn node(&self, id: ConditionNodeId) -> Option<&ConditionNode> {
        self.nodes.get(&id)
    }

    /// Children of `id` in load order. Unknown nodes and leaves have none.
    pub fn children(&self, id: ConditionNodeId) -> impl Iterator<Item = &ConditionNode> {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| self.nodes.get(child))
    }

    /// Number of kept nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether no node was kept.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes dropped during validation.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}
