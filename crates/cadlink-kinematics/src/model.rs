//! Output model: bodies, joints, download descriptors and warnings.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use cadlink_ir::{MateKey, MateType, RelationConflict};
use cadlink_math::{parallel_axis, Mat3, Transform, Vec3};
use serde::{Deserialize, Serialize};

use crate::assets::DownloadDescriptor;

/// Mass properties of a body, expressed in the body-local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inertial {
    /// Frame of the center of mass. Rotation is identity; the tensor is
    /// expressed along the body axes.
    pub origin: Transform,
    /// Mass in kg.
    pub mass: f64,
    /// Inertia tensor about the center of mass.
    pub inertia: Mat3,
}

impl Inertial {
    /// Zero mass at the body origin, as used by auxiliary bodies.
    pub fn zero() -> Self {
        Self {
            origin: Transform::identity(),
            mass: 0.0,
            inertia: Mat3::zeros(),
        }
    }

    /// Center of mass in body coordinates.
    pub fn center_of_mass(&self) -> Vec3 {
        self.origin.translation_part()
    }

    /// Inertia tensor about the body origin (parallel-axis theorem).
    pub fn about_body_origin(&self) -> Mat3 {
        parallel_axis(&self.inertia, self.mass, &self.center_of_mass())
    }
}

/// Mesh file attached to a body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshRef {
    /// File name relative to the mesh directory, `<body>.stl`.
    pub file_name: String,
}

/// Visual material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    /// Palette entry name.
    pub name: String,
    /// Red, green, blue, alpha in `[0, 1]`.
    pub rgba: [f64; 4],
}

/// A rigid body of the kinematic tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Unique body name.
    pub name: String,
    /// Mesh geometry; `None` for auxiliary bodies.
    pub mesh: Option<MeshRef>,
    /// Display material.
    pub material: Option<Material>,
    /// Mass properties.
    pub inertial: Inertial,
}

impl Body {
    /// A massless body without geometry.
    pub fn auxiliary(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mesh: None,
            material: None,
            inertial: Inertial::zero(),
        }
    }

    /// Whether this body was synthesized rather than taken from a part.
    pub fn is_auxiliary(&self) -> bool {
        self.mesh.is_none()
    }
}

/// Joint limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointLimits {
    /// Maximum effort.
    pub effort: f64,
    /// Maximum velocity.
    pub velocity: f64,
    /// Lower position limit.
    pub lower: f64,
    /// Upper position limit.
    pub upper: f64,
}

/// Joint damping and friction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct JointDynamics {
    /// Viscous damping.
    pub damping: f64,
    /// Static friction.
    pub friction: f64,
}

/// Type of joint between two bodies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JointKind {
    /// No relative motion.
    Fixed,
    /// Rotation about `axis`.
    Revolute {
        /// Rotation axis in the joint frame.
        axis: Vec3,
        /// Position and effort limits.
        limits: JointLimits,
        /// Damping and friction.
        dynamics: JointDynamics,
    },
    /// Translation along `axis`.
    Prismatic {
        /// Translation axis in the joint frame.
        axis: Vec3,
        /// Position and effort limits.
        limits: JointLimits,
        /// Damping and friction.
        dynamics: JointDynamics,
    },
    /// Placeholder for mate types without a joint primitive. Zero DOF.
    Dummy,
}

impl JointKind {
    /// Lowercase type name.
    pub fn name(&self) -> &'static str {
        match self {
            JointKind::Fixed => "fixed",
            JointKind::Revolute { .. } => "revolute",
            JointKind::Prismatic { .. } => "prismatic",
            JointKind::Dummy => "dummy",
        }
    }

    /// Motion axis of revolute and prismatic joints.
    pub fn axis(&self) -> Option<Vec3> {
        match self {
            JointKind::Revolute { axis, .. } | JointKind::Prismatic { axis, .. } => Some(*axis),
            _ => None,
        }
    }

    /// Limits of revolute and prismatic joints.
    pub fn limits(&self) -> Option<&JointLimits> {
        match self {
            JointKind::Revolute { limits, .. } | JointKind::Prismatic { limits, .. } => {
                Some(limits)
            }
            _ => None,
        }
    }

    /// Dynamics of revolute and prismatic joints.
    pub fn dynamics(&self) -> Option<&JointDynamics> {
        match self {
            JointKind::Revolute { dynamics, .. } | JointKind::Prismatic { dynamics, .. } => {
                Some(dynamics)
            }
            _ => None,
        }
    }

    /// Whether the joint has a degree of freedom.
    pub fn is_movable(&self) -> bool {
        self.axis().is_some()
    }
}

/// Coupling of a joint to another joint: `q = multiplier * q_target + offset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mimic {
    /// Name of the driving joint.
    pub joint: String,
    /// Multiplier.
    pub multiplier: f64,
    /// Offset.
    pub offset: f64,
}

/// A joint between a parent and a child body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    /// Unique joint name.
    pub name: String,
    /// Joint type with its parameters.
    pub kind: JointKind,
    /// Parent body name.
    pub parent: String,
    /// Child body name.
    pub child: String,
    /// Joint frame in parent-body coordinates.
    pub origin: Transform,
    /// Coupling to a driving joint.
    pub mimic: Option<Mimic>,
}

/// A non-fatal degradation recorded during synthesis.
#[derive(Debug, Clone, PartialEq)]
pub enum SynthesisWarning {
    /// No mate joins a tree edge; the child and its subtree are absent.
    MissingTopology {
        /// Parent occurrence.
        parent: String,
        /// Child occurrence.
        child: String,
    },
    /// A node was skipped because an ancestor is absent.
    SkippedSubtree {
        /// Skipped occurrence.
        node: String,
        /// Absent parent occurrence.
        parent: String,
    },
    /// The mate type has no joint primitive; a dummy joint was emitted.
    UnsupportedMateType {
        /// Mate name.
        mate: String,
        /// Mate type.
        mate_type: MateType,
    },
    /// A relation could not be turned into a mimic.
    MimicUnresolved {
        /// Relation name.
        relation: String,
        /// Key or joint the mimic was meant for.
        target: String,
        /// What went wrong.
        reason: String,
    },
    /// A mimic pointed at a joint that was never synthesized and was dropped.
    DanglingMimic {
        /// Joint that carried the mimic.
        joint: String,
        /// Missing driving joint.
        target: String,
    },
    /// A relation names a mate that cannot take a mimic from it.
    RelationConflict(RelationConflict),
    /// A relation is still keyed by a mate that is not a tree edge.
    StaleRelation {
        /// Relation name.
        relation: String,
        /// The stale key.
        key: MateKey,
    },
}

impl fmt::Display for SynthesisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SynthesisWarning::MissingTopology { parent, child } => {
                write!(f, "no mate between {parent} and {child}; subtree skipped")
            }
            SynthesisWarning::SkippedSubtree { node, parent } => {
                write!(f, "{node} skipped because {parent} is absent")
            }
            SynthesisWarning::UnsupportedMateType { mate, mate_type } => {
                write!(f, "mate {mate} has unsupported type {mate_type:?}; emitted a dummy joint")
            }
            SynthesisWarning::MimicUnresolved {
                relation,
                target,
                reason,
            } => write!(f, "relation {relation} gives no mimic for {target}: {reason}"),
            SynthesisWarning::DanglingMimic { joint, target } => {
                write!(f, "joint {joint} mimicked missing joint {target}; mimic dropped")
            }
            SynthesisWarning::RelationConflict(conflict) => write!(f, "{conflict}"),
            SynthesisWarning::StaleRelation { relation, key } => {
                write!(f, "relation {relation} is keyed by {key}, which is not a tree edge")
            }
        }
    }
}

/// The synthesized kinematic tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KinematicModel {
    /// Name of the root body.
    pub root: String,
    /// Bodies by name.
    pub bodies: BTreeMap<String, Body>,
    /// Joints by name.
    pub joints: BTreeMap<String, Joint>,
    /// Mesh downloads by body name.
    pub assets: BTreeMap<String, DownloadDescriptor>,
    /// Everything that degraded during the run.
    pub warnings: Vec<SynthesisWarning>,
}

impl KinematicModel {
    /// Bodies synthesized by ball decomposition.
    pub fn auxiliary_bodies(&self) -> impl Iterator<Item = &Body> {
        self.bodies.values().filter(|b| b.is_auxiliary())
    }

    /// Distinct materials by name.
    pub fn materials(&self) -> BTreeMap<&str, &Material> {
        self.bodies
            .values()
            .filter_map(|b| b.material.as_ref())
            .map(|m| (m.name.as_str(), m))
            .collect()
    }

    /// Joint whose child is `body`.
    pub fn parent_joint(&self, body: &str) -> Option<&Joint> {
        self.joints.values().find(|j| j.child == body)
    }

    /// Whether every joint endpoint and mimic target exists.
    pub fn is_consistent(&self) -> bool {
        let joint_names: BTreeSet<&str> = self.joints.keys().map(String::as_str).collect();
        self.bodies.contains_key(&self.root)
            && self.joints.values().all(|j| {
                self.bodies.contains_key(&j.parent)
                    && self.bodies.contains_key(&j.child)
                    && j.mimic
                        .as_ref()
                        .map_or(true, |m| joint_names.contains(m.joint.as_str()))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_about_body_origin_shifts_inertia() {
        let inertial = Inertial {
            origin: Transform::translation(0.0, 0.0, 0.5),
            mass: 2.0,
            inertia: Mat3::from_diagonal(&Vec3::new(0.1, 0.1, 0.2)),
        };
        let shifted = inertial.about_body_origin();
        assert_relative_eq!(shifted[(0, 0)], 0.6, epsilon = 1e-12);
        assert_relative_eq!(shifted[(1, 1)], 0.6, epsilon = 1e-12);
        assert_relative_eq!(shifted[(2, 2)], 0.2, epsilon = 1e-12);
    }

    #[test]
    fn test_joint_kind_accessors() {
        let kind = JointKind::Revolute {
            axis: Vec3::new(0.0, 0.0, -1.0),
            limits: JointLimits {
                effort: 1.0,
                velocity: 1.0,
                lower: -1.0,
                upper: 1.0,
            },
            dynamics: JointDynamics {
                damping: 0.1,
                friction: 0.1,
            },
        };
        assert_eq!(kind.name(), "revolute");
        assert!(kind.is_movable());
        assert_eq!(kind.limits().map(|l| l.upper), Some(1.0));
        assert!(!JointKind::Dummy.is_movable());
        assert!(JointKind::Fixed.axis().is_none());
    }

    #[test]
    fn test_consistency_catches_dangling_mimic() {
        let mut model = KinematicModel {
            root: "base".to_string(),
            ..Default::default()
        };
        model
            .bodies
            .insert("base".to_string(), Body::auxiliary("base"));
        model.bodies.insert("arm".to_string(), Body::auxiliary("arm"));
        model.joints.insert(
            "j1".to_string(),
            Joint {
                name: "j1".to_string(),
                kind: JointKind::Fixed,
                parent: "base".to_string(),
                child: "arm".to_string(),
                origin: Transform::identity(),
                mimic: None,
            },
        );
        assert!(model.is_consistent());

        if let Some(joint) = model.joints.get_mut("j1") {
            joint.mimic = Some(Mimic {
                joint: "gone".to_string(),
                multiplier: 1.0,
                offset: 0.0,
            });
        }
        assert!(!model.is_consistent());
    }
}
