//! Joint synthesis: map a mate type onto joint primitives.

use cadlink_ir::{Mate, MateType};
use cadlink_math::{Transform, Vec3};

use crate::config::JointPolicy;
use crate::model::{Body, Joint, JointKind, Mimic, SynthesisWarning};
use crate::names::EdgeNames;

/// Everything one mate turns into.
#[derive(Debug, Clone, PartialEq)]
pub struct JointSynthesis {
    /// One joint, or three for a ball mate.
    pub joints: Vec<Joint>,
    /// Intermediate bodies of a ball decomposition.
    pub auxiliary_bodies: Vec<Body>,
    /// Set when the mate type degraded to a dummy joint.
    pub warning: Option<SynthesisWarning>,
}

/// Inputs of [`synthesize_joints`] that come from the surrounding tree.
#[derive(Debug, Clone)]
pub struct JointRequest<'a> {
    /// Parent body name.
    pub parent: &'a str,
    /// Child body name.
    pub child: &'a str,
    /// Joint frame in parent-body coordinates.
    pub origin: Transform,
    /// Coupling applied to every produced joint.
    pub mimic: Option<Mimic>,
    /// Names allocated for this mate.
    pub names: &'a EdgeNames,
}

/// Synthesize the joints for an oriented mate.
pub fn synthesize_joints(mate: &Mate, request: JointRequest<'_>, policy: &JointPolicy) -> JointSynthesis {
    let axis = Vec3::new(0.0, 0.0, -1.0);
    let single = |kind: JointKind| Joint {
        name: request.names.first_joint().to_string(),
        kind,
        parent: request.parent.to_string(),
        child: request.child.to_string(),
        origin: request.origin,
        mimic: request.mimic.clone(),
    };

    match mate.mate_type {
        MateType::Fastened => JointSynthesis::one(single(JointKind::Fixed)),
        MateType::Revolute => JointSynthesis::one(single(policy.revolute(axis))),
        MateType::Slider | MateType::Cylindrical => {
            JointSynthesis::one(single(policy.prismatic(axis)))
        }
        MateType::Ball => ball(&request, policy),
        other => {
            tracing::warn!("Unsupported mate type {:?} for {}; using a dummy joint", other, mate.name);
            JointSynthesis {
                joints: vec![single(JointKind::Dummy)],
                auxiliary_bodies: Vec::new(),
                warning: Some(SynthesisWarning::UnsupportedMateType {
                    mate: mate.name.clone(),
                    mate_type: other,
                }),
            }
        }
    }
}

impl JointSynthesis {
    fn one(joint: Joint) -> Self {
        Self {
            joints: vec![joint],
            auxiliary_bodies: Vec::new(),
            warning: None,
        }
    }
}

/// Ball mate: revolute X, then Y, then Z, chained through two massless bodies.
fn ball(request: &JointRequest<'_>, policy: &JointPolicy) -> JointSynthesis {
    let (joints, bodies) = match request.names {
        EdgeNames::Ball { joints, bodies } => (joints.clone(), bodies.clone()),
        EdgeNames::Single(base) => (
            ["x", "y", "z"].map(|a| format!("{base}-{a}")),
            ["x", "y"].map(|a| format!("{base}-dummy-{a}")),
        ),
    };
    let [jx, jy, jz] = joints;
    let [bx, by] = bodies;

    let chain = [
        (jx, request.parent.to_string(), bx.clone(), Vec3::x(), request.origin),
        (jy, bx.clone(), by.clone(), Vec3::y(), Transform::identity()),
        (jz, by.clone(), request.child.to_string(), -Vec3::z(), Transform::identity()),
    ];

    JointSynthesis {
        joints: chain
            .into_iter()
            .map(|(name, parent, child, axis, origin)| Joint {
                name,
                kind: policy.revolute(axis),
                parent,
                child,
                origin,
                mimic: request.mimic.clone(),
            })
            .collect(),
        auxiliary_bodies: vec![Body::auxiliary(bx), Body::auxiliary(by)],
        warning: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadlink_ir::{MateEntity, MatedCs};
    use std::f64::consts::PI;

    fn mate(mate_type: MateType) -> Mate {
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
            id: "m1".to_string(),
            name: "Mate 1".to_string(),
            mate_type,
            entities: [entity("p"), entity("c")],
        }
    }

    fn run(mate_type: MateType, names: &EdgeNames, mimic: Option<Mimic>) -> JointSynthesis {
        synthesize_joints(
            &mate(mate_type),
            JointRequest {
                parent: "parent",
                child: "child",
                origin: Transform::translation(0.0, 0.0, 1.0),
                mimic,
                names,
            },
            &JointPolicy::default(),
        )
    }

    fn single() -> EdgeNames {
        EdgeNames::Single("Mate_1".to_string())
    }

    #[test]
    fn test_fastened_gives_fixed_joint() {
        let out = run(MateType::Fastened, &single(), None);
        assert_eq!(out.joints.len(), 1);
        assert_eq!(out.joints[0].kind, JointKind::Fixed);
        assert!(out.auxiliary_bodies.is_empty());
        assert!(out.warning.is_none());
    }

    #[test]
    fn test_revolute_defaults() {
        let out = run(MateType::Revolute, &single(), None);
        let joint = &out.joints[0];
        assert_eq!(joint.name, "Mate_1");
        assert_eq!(joint.kind.axis(), Some(Vec3::new(0.0, 0.0, -1.0)));
        let limits = joint.kind.limits().unwrap();
        assert_eq!((limits.lower, limits.upper), (-PI, PI));
        assert_eq!((limits.effort, limits.velocity), (1.0, 1.0));
        let dynamics = joint.kind.dynamics().unwrap();
        assert_eq!((dynamics.damping, dynamics.friction), (0.1, 0.1));
    }

    #[test]
    fn test_slider_and_cylindrical_are_prismatic() {
        for mate_type in [MateType::Slider, MateType::Cylindrical] {
            let out = run(mate_type, &single(), None);
            assert_eq!(out.joints[0].kind.name(), "prismatic");
            let limits = out.joints[0].kind.limits().unwrap();
            assert_eq!((limits.lower, limits.upper), (-0.1, 0.1));
        }
    }

    #[test]
    fn test_unsupported_types_degrade_to_dummy() {
        for mate_type in [MateType::Planar, MateType::PinSlot, MateType::Parallel, MateType::Unknown] {
            let out = run(mate_type, &single(), None);
            assert_eq!(out.joints.len(), 1);
            assert_eq!(out.joints[0].kind, JointKind::Dummy);
            assert!(matches!(
                out.warning,
                Some(SynthesisWarning::UnsupportedMateType { mate_type: t, .. }) if t == mate_type
            ));
        }
    }

    #[test]
    fn test_ball_decomposes_into_three_revolutes() {
        let names = EdgeNames::Ball {
            joints: ["Mate_1-x", "Mate_1-y", "Mate_1-z"].map(String::from),
            bodies: ["Mate_1-dummy-x", "Mate_1-dummy-y"].map(String::from),
        };
        let mimic = Mimic {
            joint: "drive".to_string(),
            multiplier: 2.0,
            offset: 0.0,
        };
        let out = run(MateType::Ball, &names, Some(mimic.clone()));

        assert_eq!(out.joints.len(), 3);
        assert_eq!(out.auxiliary_bodies.len(), 2);
        assert!(out.auxiliary_bodies.iter().all(|b| b.inertial.mass == 0.0 && b.mesh.is_none()));

        let chain: Vec<(&str, &str)> = out
            .joints
            .iter()
            .map(|j| (j.parent.as_str(), j.child.as_str()))
            .collect();
        assert_eq!(
            chain,
            vec![
                ("parent", "Mate_1-dummy-x"),
                ("Mate_1-dummy-x", "Mate_1-dummy-y"),
                ("Mate_1-dummy-y", "child"),
            ]
        );
        assert_eq!(out.joints[0].kind.axis(), Some(Vec3::x()));
        assert_eq!(out.joints[1].kind.axis(), Some(Vec3::y()));
        assert_eq!(out.joints[2].kind.axis(), Some(-Vec3::z()));
        assert!(!out.joints[0].origin.is_identity(1e-12));
        assert!(out.joints[1].origin.is_identity(1e-12));
        assert!(out.joints[2].origin.is_identity(1e-12));
        assert!(out.joints.iter().all(|j| j.mimic.as_ref() == Some(&mimic)));
    }

    #[test]
    fn test_ball_with_single_name_derives_suffixes() {
        let out = run(MateType::Ball, &single(), None);
        let names: Vec<&str> = out.joints.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["Mate_1-x", "Mate_1-y", "Mate_1-z"]);
        assert_eq!(out.auxiliary_bodies[1].name, "Mate_1-dummy-y");
    }
}
