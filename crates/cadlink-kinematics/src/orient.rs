//! Mate orientation: reconcile authored mate direction with tree edges.
//!
//! A mate is authored between two occurrences in whichever order the CAD
//! user picked them. The tree fixes a parent→child direction per edge. After
//! orientation `entities[0]` is always the parent side and `entities[1]`
//! the child side, and relation entries keyed by a reversed mate are moved
//! to the canonical key.

use std::collections::BTreeMap;

use cadlink_graph::{RootedTree, TreeEdge};
use cadlink_ir::{Mate, MateKey, MateRelation};

use crate::error::{KinematicsError, Result};

/// Resolve the mate for one tree edge.
///
/// Tries the `(parent, child)` key first, then `(child, parent)`. A reversed
/// hit swaps the mate's entities and re-keys the matching relation entry in
/// the same step.
pub fn resolve_edge(
    edge: &TreeEdge,
    mates: &BTreeMap<MateKey, Mate>,
    relations: &mut BTreeMap<MateKey, MateRelation>,
) -> Result<Mate> {
    let key = edge.key();
    if let Some(mate) = mates.get(&key) {
        return Ok(mate.clone());
    }

    let reversed = key.reversed();
    if let Some(mate) = mates.get(&reversed) {
        tracing::debug!("Reversing mate {} to match edge {}", mate.name, key);
        if let Some(relation) = relations.remove(&reversed) {
            tracing::info!("Re-keying relation {} from {} to {}", relation.name, reversed, key);
            relations.insert(key, relation);
        }
        return Ok(mate.reversed());
    }

    Err(KinematicsError::MissingTopology {
        parent: edge.parent.clone(),
        child: edge.child.clone(),
    })
}

/// Mates re-oriented to a tree, plus the relation table after re-keying.
#[derive(Debug, Clone, Default)]
pub struct OrientedMates {
    mates: BTreeMap<MateKey, Mate>,
    relations: BTreeMap<MateKey, MateRelation>,
    missing: Vec<TreeEdge>,
}

impl OrientedMates {
    /// Oriented mate for a tree edge.
    pub fn get(&self, edge: &TreeEdge) -> Option<&Mate> {
        self.mates.get(&edge.key())
    }

    /// Oriented mate by key.
    pub fn by_key(&self, key: &MateKey) -> Option<&Mate> {
        self.mates.get(key)
    }

    /// All oriented mates keyed by `(parent, child)`.
    pub fn mates(&self) -> &BTreeMap<MateKey, Mate> {
        &self.mates
    }

    /// Relation table after re-keying.
    pub fn relations(&self) -> &BTreeMap<MateKey, MateRelation> {
        &self.relations
    }

    /// Tree edges no mate could be found for.
    pub fn missing(&self) -> &[TreeEdge] {
        &self.missing
    }
}

/// Orient the mate of every tree edge.
///
/// Edges without a mate in either orientation are recorded in
/// [`OrientedMates::missing`] and logged; the pass itself never fails.
pub fn orient_mates(
    tree: &RootedTree,
    mates: &BTreeMap<MateKey, Mate>,
    relations: BTreeMap<MateKey, MateRelation>,
) -> OrientedMates {
    let mut oriented = OrientedMates {
        relations,
        ..Default::default()
    };

    for edge in tree.edges() {
        match resolve_edge(edge, mates, &mut oriented.relations) {
            Ok(mate) => {
                oriented.mates.insert(edge.key(), mate);
            }
            Err(e) => {
                tracing::warn!("{}", e);
                oriented.missing.push(edge.clone());
            }
        }
    }

    oriented
}
