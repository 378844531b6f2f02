//! Transform composition along the tree.
//!
//! Every part mesh is authored in its own coordinates. A body's local frame
//! is chosen per body (center of mass for the root, the child-side mate frame
//! otherwise) and `mesh_to_body` maps mesh coordinates into it. Joint origins
//! are then expressed in the parent body's local frame.

use cadlink_ir::{MassProperties, Mate, Part};
use cadlink_math::{rotate_inertia, Point3, Transform};

use crate::error::{KinematicsError, Result};
use crate::model::Inertial;

/// Mesh→body transform of the root: the body origin sits at the center of mass.
pub fn root_mesh_to_body(part: &Part) -> Transform {
    let com = part.mass_properties.center_of_mass();
    Transform::translation(-com.x, -com.y, -com.z)
}

/// Mesh→body transform of a child: the inverse of its own-side mate frame.
///
/// `mate` must be oriented so that `entities[1]` is the child.
pub fn child_mesh_to_body(mate: &Mate) -> Result<Transform> {
    mate.entities[1]
        .mated_cs
        .to_transform()
        .inverse()
        .ok_or_else(|| KinematicsError::SingularFrame(mate.id.clone()))
}

/// Joint frame in parent-body coordinates.
///
/// The parent-side mate frame (`entities[0]`) is authored in the parent's
/// mesh coordinates; a rigid sub-assembly parent contributes its own
/// placement first.
pub fn joint_origin(parent_mesh_to_body: &Transform, parent: &Part, mate: &Mate) -> Transform {
    let frame = mate.entities[0].mated_cs.to_transform();
    let frame = match parent.placement_transform() {
        Some(placement) if parent.is_rigid_assembly => placement.then(&frame),
        _ => frame,
    };
    parent_mesh_to_body.then(&frame)
}

/// Re-express mass properties in the body frame.
///
/// The center of mass is moved by the full transform, the tensor is rotated
/// by its rotation block and stays about the center of mass.
pub fn express_inertial(mass: &MassProperties, mesh_to_body: &Transform) -> Inertial {
    let com = mesh_to_body.apply_point(&Point3::from(mass.center_of_mass()));
    let inertia = rotate_inertia(&mesh_to_body.rotation(), &mass.inertia_tensor());
    Inertial {
        origin: Transform::translation(com.x, com.y, com.z),
        mass: mass.mass,
        inertia,
    }
}
