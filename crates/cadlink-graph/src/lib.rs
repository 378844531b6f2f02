#![warn(missing_docs)]

//! Rooted spanning trees over CAD mate graphs.
//!
//! The mate graph of an assembly is undirected and may contain loops. The
//! kinematic synthesis needs a tree: one root, one parent per other node.
//! [`RootedTree`] is that tree, validated on construction, and
//! [`build_rooted_tree`] derives one deterministically from parts and mates.
//!
//! # Root selection
//!
//! 1. [`RootPolicy::Explicit`] names the root.
//! 2. Otherwise the lexicographically first part flagged `is_fixed`.
//! 3. Otherwise the part with the most distinct mate neighbors, ties broken
//!    by the smallest occurrence id.

use cadlink_ir::{Mate, MateKey, OccurrenceId, Part};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use thiserror::Error;

/// Errors raised while building or validating a rooted tree.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum GraphError {
    /// There are no parts to build a tree from.
    #[error("assembly has no parts")]
    Empty,

    /// The requested root is not a part of the assembly.
    #[error("root occurrence not found: {0}")]
    UnknownRoot(String),

    /// The root appears as the child of an edge.
    #[error("root {0} has an incoming edge")]
    RootHasParent(String),

    /// A node has more than one incoming edge.
    #[error("node {node} has more than one parent ({first}, {second})")]
    MultipleParents {
        /// The node.
        node: String,
        /// First parent seen.
        first: String,
        /// Second parent seen.
        second: String,
    },

    /// An edge joins a node to itself.
    #[error("self loop on node {0}")]
    SelfLoop(String),

    /// Nodes that cannot be reached from the root (they form a cycle).
    #[error("cycle detected among nodes {0:?}")]
    Cycle(Vec<String>),
}

/// A directed tree edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TreeEdge {
    /// Node closer to the root.
    pub parent: OccurrenceId,
    /// Node attached to the parent.
    pub child: OccurrenceId,
}

impl TreeEdge {
    /// Create an edge.
    pub fn new(parent: impl Into<OccurrenceId>, child: impl Into<OccurrenceId>) -> Self {
        Self {
            parent: parent.into(),
            child: child.into(),
        }
    }

    /// The canonical mate key for this edge: `(parent, child)`.
    pub fn key(&self) -> MateKey {
        MateKey::new(self.parent.clone(), self.child.clone())
    }
}

/// A validated rooted tree.
///
/// Exactly one root, exactly one parent for every other node, no cycles, one
/// connected component. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootedTree {
    root: OccurrenceId,
    edges: Vec<TreeEdge>,
    parents: BTreeMap<OccurrenceId, OccurrenceId>,
    children: BTreeMap<OccurrenceId, Vec<OccurrenceId>>,
}

impl RootedTree {
    /// Validate `edges` as a tree rooted at `root`.
    ///
    /// Edge order is preserved by [`RootedTree::edges`].
    pub fn new(root: impl Into<OccurrenceId>, edges: Vec<TreeEdge>) -> Result<Self, GraphError> {
        let root = root.into();
        let mut parents: BTreeMap<OccurrenceId, OccurrenceId> = BTreeMap::new();
        let mut children: BTreeMap<OccurrenceId, Vec<OccurrenceId>> = BTreeMap::new();

        for edge in &edges {
            if edge.parent == edge.child {
                return Err(GraphError::SelfLoop(edge.child.clone()));
            }
            if edge.child == root {
                return Err(GraphError::RootHasParent(root));
            }
            if let Some(first) = parents.get(&edge.child) {
                return Err(GraphError::MultipleParents {
                    node: edge.child.clone(),
                    first: first.clone(),
                    second: edge.parent.clone(),
                });
            }
            parents.insert(edge.child.clone(), edge.parent.clone());
            children
                .entry(edge.parent.clone())
                .or_default()
                .push(edge.child.clone());
        }

        let tree = Self {
            root,
            edges,
            parents,
            children,
        };

        // Every non-root node has one parent; anything the root cannot reach
        // therefore sits on a cycle.
        let reached: BTreeSet<&str> = tree.walk().collect();
        let mut unreached: Vec<String> = tree
            .parents
            .keys()
            .chain(tree.children.keys())
            .filter(|n| !reached.contains(n.as_str()))
            .cloned()
            .collect();
        if !unreached.is_empty() {
            unreached.sort();
            unreached.dedup();
            return Err(GraphError::Cycle(unreached));
        }

        Ok(tree)
    }

    /// The root node.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// All edges in construction order.
    pub fn edges(&self) -> &[TreeEdge] {
        &self.edges
    }

    /// Parent of `node`; `None` for the root and for unknown nodes.
    pub fn parent(&self, node: &str) -> Option<&str> {
        self.parents.get(node).map(String::as_str)
    }

    /// Children of `node` in edge order.
    pub fn children(&self, node: &str) -> &[OccurrenceId] {
        self.children.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether `node` belongs to the tree.
    pub fn contains(&self, node: &str) -> bool {
        node == self.root || self.parents.contains_key(node)
    }

    /// Number of nodes, root included.
    pub fn len(&self) -> usize {
        self.parents.len() + 1
    }

    /// A tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Nodes in breadth-first order from the root.
    pub fn walk(&self) -> impl Iterator<Item = &str> {
        let mut order: Vec<&str> = Vec::with_capacity(self.parents.len() + 1);
        let mut queue: VecDeque<&str> = VecDeque::from([self.root.as_str()]);
        while let Some(node) = queue.pop_front() {
            order.push(node);
            queue.extend(self.children(node).iter().map(String::as_str));
        }
        order.into_iter()
    }

    /// Number of edges between the root and `node`.
    pub fn depth(&self, node: &str) -> Option<usize> {
        if !self.contains(node) {
            return None;
        }
        let mut depth = 0;
        let mut current = node;
        while let Some(parent) = self.parent(current) {
            depth += 1;
            current = parent;
        }
        Some(depth)
    }
}

/// How the root of the spanning tree is chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RootPolicy {
    /// Use this occurrence.
    Explicit(OccurrenceId),
    /// First fixed part, else the part with the highest mate degree.
    #[default]
    Auto,
}

/// Result of [`build_rooted_tree`].
#[derive(Debug, Clone)]
pub struct TreeBuild {
    /// The spanning tree.
    pub tree: RootedTree,
    /// Mates whose pair of occurrences is not a tree edge (kinematic loops).
    pub loop_mates: Vec<MateKey>,
    /// Parts the root cannot reach through mates.
    pub unreachable: Vec<OccurrenceId>,
    /// Mates naming an occurrence that is not a known part.
    pub ignored_mates: Vec<MateKey>,
}

/// Build a rooted spanning tree from parts and mates.
///
/// Traversal is breadth-first with neighbors visited in sorted order, so the
/// result depends only on the input identifiers.
pub fn build_rooted_tree(
    parts: &BTreeMap<OccurrenceId, Part>,
    mates: &[Mate],
    policy: &RootPolicy,
) -> Result<TreeBuild, GraphError> {
    if parts.is_empty() {
        return Err(GraphError::Empty);
    }

    let mut adjacency: BTreeMap<&str, BTreeSet<String>> =
        parts.keys().map(|k| (k.as_str(), BTreeSet::new())).collect();
    let mut mate_keys = Vec::with_capacity(mates.len());
    let mut ignored_mates = Vec::new();

    for mate in mates {
        let key = mate.key();
        if !parts.contains_key(&key.first) || !parts.contains_key(&key.second) {
            tracing::warn!("Ignoring mate {} ({}): unknown occurrence", mate.name, key);
            ignored_mates.push(key);
            continue;
        }
        if key.first == key.second {
            ignored_mates.push(key);
            continue;
        }
        if let Some(n) = adjacency.get_mut(key.first.as_str()) {
            n.insert(key.second.clone());
        }
        if let Some(n) = adjacency.get_mut(key.second.as_str()) {
            n.insert(key.first.clone());
        }
        mate_keys.push(key);
    }

    let root = select_root(parts, &adjacency, policy)?;
    tracing::info!("Selected root occurrence: {}", root);

    let mut visited: BTreeSet<&str> = BTreeSet::from([root.as_str()]);
    let mut queue: VecDeque<&str> = VecDeque::from([root.as_str()]);
    let mut edges = Vec::new();
    while let Some(node) = queue.pop_front() {
        for next in adjacency.get(node).into_iter().flatten() {
            if visited.insert(next.as_str()) {
                edges.push(TreeEdge::new(node, next.as_str()));
                queue.push_back(next.as_str());
            }
        }
    }

    let tree_pairs: BTreeSet<(&str, &str)> = edges
        .iter()
        .flat_map(|e| {
            [
                (e.parent.as_str(), e.child.as_str()),
                (e.child.as_str(), e.parent.as_str()),
            ]
        })
        .collect();

    let mut seen_pairs = BTreeSet::new();
    let mut loop_mates = Vec::new();
    for key in &mate_keys {
        let pair = (key.first.as_str(), key.second.as_str());
        let reached = visited.contains(pair.0) && visited.contains(pair.1);
        let canonical = if pair.0 < pair.1 { pair } else { (pair.1, pair.0) };
        if reached && !tree_pairs.contains(&pair) && seen_pairs.insert(canonical) {
            tracing::warn!("Mate {} closes a kinematic loop and is left out of the tree", key);
            loop_mates.push(key.clone());
        }
    }

    let unreachable: Vec<OccurrenceId> = parts
        .keys()
        .filter(|k| !visited.contains(k.as_str()))
        .cloned()
        .collect();
    for node in &unreachable {
        tracing::warn!("Part {} is not connected to the root by any mate", node);
    }

    let tree = RootedTree::new(root, edges)?;
    Ok(TreeBuild {
        tree,
        loop_mates,
        unreachable,
        ignored_mates,
    })
}

fn select_root(
    parts: &BTreeMap<OccurrenceId, Part>,
    adjacency: &BTreeMap<&str, BTreeSet<String>>,
    policy: &RootPolicy,
) -> Result<OccurrenceId, GraphError> {
    if let RootPolicy::Explicit(id) = policy {
        if !parts.contains_key(id) {
            return Err(GraphError::UnknownRoot(id.clone()));
        }
        return Ok(id.clone());
    }

    if let Some((id, _)) = parts.iter().find(|(_, p)| p.is_fixed) {
        return Ok(id.clone());
    }

    // BTreeMap order makes the first maximum the smallest id.
    let mut best: Option<(&str, usize)> = None;
    for (id, neighbors) in adjacency {
        match best {
            Some((_, degree)) if degree >= neighbors.len() => {}
            _ => best = Some((*id, neighbors.len())),
        }
    }
    best.map(|(id, _)| id.to_string()).ok_or(GraphError::Empty)
}
