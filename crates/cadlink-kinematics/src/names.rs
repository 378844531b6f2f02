//! Deterministic body and joint names.
//!
//! All names are allocated once, before any task runs, walking the tree in
//! breadth-first order. Concurrent synthesis only reads the table, so output
//! names never depend on task completion order.

use std::collections::BTreeMap;

use cadlink_graph::RootedTree;
use cadlink_ir::naming::UniqueNames;
use cadlink_ir::{MateType, OccurrenceId, Part};

use crate::error::{KinematicsError, Result};
use crate::orient::OrientedMates;

/// Names of everything synthesized for one mate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeNames {
    /// One joint.
    Single(String),
    /// Three joints (x, y, z) through two auxiliary bodies (x, y).
    Ball {
        /// `<base>-x`, `<base>-y`, `<base>-z`.
        joints: [String; 3],
        /// `<base>-dummy-x`, `<base>-dummy-y`.
        bodies: [String; 2],
    },
}

impl EdgeNames {
    /// Name of the joint attached to the parent body.
    pub fn first_joint(&self) -> &str {
        match self {
            EdgeNames::Single(name) => name,
            EdgeNames::Ball { joints, .. } => &joints[0],
        }
    }

    /// Every joint name.
    pub fn joints(&self) -> Vec<&str> {
        match self {
            EdgeNames::Single(name) => vec![name.as_str()],
            EdgeNames::Ball { joints, .. } => joints.iter().map(String::as_str).collect(),
        }
    }
}

/// Body names by occurrence and joint names by mate id.
///
/// The mate-id side doubles as the reverse index the mimic resolver uses to
/// find a driving joint.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    bodies: BTreeMap<OccurrenceId, String>,
    edges: BTreeMap<String, EdgeNames>,
}

impl NameTable {
    /// Allocate names for every tree node and every oriented mate.
    ///
    /// Fails when a tree node has no part record.
    pub fn build(
        tree: &RootedTree,
        parts: &BTreeMap<OccurrenceId, Part>,
        oriented: &OrientedMates,
    ) -> Result<Self> {
        let mut body_names = UniqueNames::new();
        let mut joint_names = UniqueNames::new();
        let mut table = Self::default();

        for node in tree.walk() {
            let part = parts
                .get(node)
                .ok_or_else(|| KinematicsError::MissingPart(node.to_string()))?;
            table
                .bodies
                .insert(node.to_string(), body_names.allocate(&part.name));
        }

        for edge in tree.edges() {
            let Some(mate) = oriented.get(edge) else {
                continue;
            };
            let base = joint_names.allocate(&mate.name);
            let names = if mate.mate_type == MateType::Ball {
                EdgeNames::Ball {
                    joints: ["x", "y", "z"].map(|axis| joint_names.allocate(&format!("{base}-{axis}"))),
                    bodies: ["x", "y"]
                        .map(|axis| body_names.allocate(&format!("{base}-dummy-{axis}"))),
                }
            } else {
                EdgeNames::Single(base)
            };
            table.edges.insert(mate.id.clone(), names);
        }

        Ok(table)
    }

    /// Body name of an occurrence.
    pub fn body(&self, occurrence: &str) -> Option<&str> {
        self.bodies.get(occurrence).map(String::as_str)
    }

    /// Names allocated for a mate.
    pub fn edge(&self, mate_id: &str) -> Option<&EdgeNames> {
        self.edges.get(mate_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadlink_graph::TreeEdge;
    use cadlink_ir::{MassProperties, Mate, MateEntity, MateKey, MatedCs};

    fn part(name: &str) -> Part {
        Part {
            name: name.to_string(),
            document_id: "a1c1addf75444f54b504f25c".to_string(),
            element_id: "0b0c209535554345432581fe".to_string(),
            part_id: "JHD".to_string(),
            configuration: "default".to_string(),
            document_version: None,
            rigid_assembly_workspace_id: None,
            mass_properties: MassProperties {
                mass: 1.0,
                center_of_mass: [0.0; 3],
                inertia: [[0.0; 3]; 3],
            },
            is_rigid_assembly: false,
            is_fixed: false,
            placement: None,
        }
    }

    fn mate(id: &str, name: &str, mate_type: MateType, a: &str, b: &str) -> Mate {
        let entity = |occ: &str| MateEntity {
            occurrence: vec![occ.to_string()],
            mated_cs: MatedCs {
                x_axis: [1.0, 0.0, 0.0],
                y_axis: [0.0, 1.0, 0.0],
                z_axis: [0.0, 0.0, 1.0],
                origin: [0.0; 3],
            },
        };
        Mate {
            id: id.to_string(),
            name: name.to_string(),
            mate_type,
            entities: [entity(a), entity(b)],
        }
    }

    #[test]
    fn test_duplicate_part_and_mate_names_get_suffixes() {
        let tree = RootedTree::new(
            "a",
            vec![TreeEdge::new("a", "b"), TreeEdge::new("a", "c")],
        )
        .unwrap();
        let parts = BTreeMap::from([
            ("a".to_string(), part("Base")),
            ("b".to_string(), part("Link <1>")),
            ("c".to_string(), part("Link <1>")),
        ]);
        let mates: BTreeMap<MateKey, Mate> = [
            mate("m1", "Revolute 1", MateType::Revolute, "a", "b"),
            mate("m2", "Revolute 1", MateType::Revolute, "a", "c"),
        ]
        .into_iter()
        .map(|m| (m.key(), m))
        .collect();
        let oriented = crate::orient::orient_mates(&tree, &mates, BTreeMap::new());
        let names = NameTable::build(&tree, &parts, &oriented).unwrap();

        assert_eq!(names.body("b"), Some("Link_1"));
        assert_eq!(names.body("c"), Some("Link_1-2"));
        assert_eq!(names.edge("m1").map(EdgeNames::first_joint), Some("Revolute_1"));
        assert_eq!(names.edge("m2").map(EdgeNames::first_joint), Some("Revolute_1-2"));
    }

    #[test]
    fn test_ball_mate_names() {
        let tree = RootedTree::new("a", vec![TreeEdge::new("a", "b")]).unwrap();
        let parts = BTreeMap::from([
            ("a".to_string(), part("Base")),
            ("b".to_string(), part("Head")),
        ]);
        let m = mate("m1", "Ball 1", MateType::Ball, "a", "b");
        let mates = BTreeMap::from([(m.key(), m)]);
        let oriented = crate::orient::orient_mates(&tree, &mates, BTreeMap::new());
        let names = NameTable::build(&tree, &parts, &oriented).unwrap();

        let edge = names.edge("m1").unwrap();
        assert_eq!(edge.joints(), vec!["Ball_1-x", "Ball_1-y", "Ball_1-z"]);
        assert!(matches!(
            edge,
            EdgeNames::Ball { bodies, .. } if bodies == &["Ball_1-dummy-x".to_string(), "Ball_1-dummy-y".to_string()]
        ));
    }

    #[test]
    fn test_missing_part_is_fatal() {
        let tree = RootedTree::new("a", vec![TreeEdge::new("a", "ghost")]).unwrap();
        let parts = BTreeMap::from([("a".to_string(), part("Base"))]);
        let err = NameTable::build(&tree, &parts, &OrientedMates::default()).unwrap_err();
        assert!(matches!(err, KinematicsError::MissingPart(id) if id == "ghost"));
    }
}
