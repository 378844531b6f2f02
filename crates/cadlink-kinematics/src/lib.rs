#![warn(missing_docs)]

//! Kinematic tree synthesis from CAD mate graphs.
//!
//! Given an assembly (parts, mates, mate relations) and a rooted spanning
//! tree over its parts, this crate produces a [`KinematicModel`]: rigid
//! bodies with mass properties in body-local frames, joints with origins in
//! parent-body frames, mimic couplings, and mesh download descriptors.
//!
//! The pipeline runs in this order:
//!
//! 1. [`orient`] flips mates authored child-first so every tree edge reads
//!    parent→child, re-keying relations alongside.
//! 2. [`names`] allocates every body and joint name up front.
//! 3. [`mimic`] turns relations into joint couplings.
//! 4. [`orchestrator`] walks the tree concurrently, using [`compose`] for
//!    frames and [`synth`] for joints, and merges the results.
//!
//! # Example
//!
//! ```no_run
//! use cadlink_graph::{build_rooted_tree, RootPolicy};
//! use cadlink_ir::AssemblyInput;
//! use cadlink_kinematics::{synthesize_blocking, SynthesisConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = AssemblyInput::from_json(&std::fs::read_to_string("arm.json")?)?;
//! let build = build_rooted_tree(&input.parts, &input.mates, &RootPolicy::Auto)?;
//! let model = synthesize_blocking(&input, &build.tree, &SynthesisConfig::default())?;
//! println!("{} bodies, {} joints", model.bodies.len(), model.joints.len());
//! # Ok(())
//! # }
//! ```

pub mod assets;
pub mod compose;
pub mod config;
pub mod error;
pub mod mimic;
pub mod model;
pub mod names;
pub mod orchestrator;
pub mod orient;
pub mod palette;
pub mod synth;

pub use assets::{fetch_all, DownloadDescriptor, FetchError, MeshFetcher, WorkspaceType};
pub use config::{JointPolicy, SynthesisConfig};
pub use error::{KinematicsError, Result};
pub use model::{
    Body, Inertial, Joint, JointDynamics, JointKind, JointLimits, KinematicModel, Material,
    MeshRef, Mimic, SynthesisWarning,
};
pub use orchestrator::{synthesize, synthesize_blocking};
pub use orient::{orient_mates, resolve_edge, OrientedMates};
pub use synth::{synthesize_joints, JointRequest, JointSynthesis};
