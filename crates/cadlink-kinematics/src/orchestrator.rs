//! Tree traversal with per-node futures.
//!
//! Every tree node owns a `watch` channel that starts `Pending` and is
//! resolved exactly once, to `Ready` or `Absent`. One task per edge waits
//! for its parent's channel, takes a permit from a shared semaphore,
//! computes its child and resolves the child's channel. Permits are taken
//! only after the parent resolved, so waiting tasks never starve the pool.
//!
//! Tasks return their output through a `JoinSet`; this module alone merges
//! outputs into the model, in breadth-first order, so the result does not
//! depend on completion order.

use std::collections::BTreeMap;
use std::sync::Arc;

use cadlink_graph::{RootedTree, TreeEdge};
use cadlink_ir::naming::sanitize;
use cadlink_ir::{AssemblyInput, DocumentRef, OccurrenceId, Part};
use cadlink_math::Transform;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::assets::DownloadDescriptor;
use crate::compose::{child_mesh_to_body, express_inertial, joint_origin, root_mesh_to_body};
use crate::config::{JointPolicy, SynthesisConfig};
use crate::error::{KinematicsError, Result};
use crate::mimic::{prune_dangling, MimicResolver};
use crate::model::{Body, Joint, KinematicModel, MeshRef, SynthesisWarning};
use crate::names::{EdgeNames, NameTable};
use crate::orient::{orient_mates, OrientedMates};
use crate::palette::material_for;
use crate::synth::{synthesize_joints, JointRequest};

/// What a child needs from its resolved parent.
#[derive(Debug, Clone)]
struct NodeFrame {
    body: String,
    mesh_to_body: Transform,
}

#[derive(Debug, Clone)]
enum NodeState {
    Pending,
    Ready(Arc<NodeFrame>),
    Absent,
}

/// Output of one edge task.
#[derive(Debug)]
struct EdgeOutput {
    body: String,
    bodies: Vec<Body>,
    joints: Vec<Joint>,
    asset: DownloadDescriptor,
    warning: Option<SynthesisWarning>,
}

#[derive(Debug)]
enum EdgeOutcome {
    Done(EdgeOutput),
    Missing { parent: OccurrenceId },
    Skipped { parent: OccurrenceId },
    Failed(KinematicsError),
}

/// Read-only state shared by every edge task.
struct SynthesisContext {
    parts: BTreeMap<OccurrenceId, Part>,
    document: DocumentRef,
    oriented: OrientedMates,
    names: NameTable,
    mimics: MimicResolver,
    policy: JointPolicy,
}

impl SynthesisContext {
    fn part(&self, occurrence: &str) -> Result<&Part> {
        self.parts
            .get(occurrence)
            .ok_or_else(|| KinematicsError::MissingPart(occurrence.to_string()))
    }

    fn body_name(&self, occurrence: &str) -> Result<&str> {
        self.names
            .body(occurrence)
            .ok_or_else(|| KinematicsError::MissingPart(occurrence.to_string()))
    }

    fn root(&self, root: &str) -> Result<(NodeFrame, Body, DownloadDescriptor)> {
        let part = self.part(root)?;
        let name = self.body_name(root)?;
        let mesh_to_body = root_mesh_to_body(part);
        tracing::info!("Creating root body {} from {}", name, part.name);
        Ok((
            NodeFrame {
                body: name.to_string(),
                mesh_to_body,
            },
            part_body(name, part, &mesh_to_body),
            DownloadDescriptor::for_part(part, &self.document, name, mesh_to_body),
        ))
    }

    fn edge(&self, edge: &TreeEdge, parent: &NodeFrame) -> Result<(NodeFrame, EdgeOutput)> {
        let mate = self
            .oriented
            .get(edge)
            .ok_or_else(|| KinematicsError::MissingTopology {
                parent: edge.parent.clone(),
                child: edge.child.clone(),
            })?;
        let parent_part = self.part(&edge.parent)?;
        let child_part = self.part(&edge.child)?;
        let child = self.body_name(&edge.child)?;

        let mesh_to_body = child_mesh_to_body(mate)?;
        let origin = joint_origin(&parent.mesh_to_body, parent_part, mate);
        tracing::info!("Creating joint from {} to {}", parent.body, child);
        tracing::debug!("Joint origin for {}: {:?}", mate.name, origin.to_row_major());

        let fallback;
        let names = match self.names.edge(&mate.id) {
            Some(names) => names,
            None => {
                fallback = EdgeNames::Single(sanitize(&mate.name));
                &fallback
            }
        };
        let synthesis = synthesize_joints(
            mate,
            JointRequest {
                parent: &parent.body,
                child,
                origin,
                mimic: self.mimics.mimic_for(&mate.id),
                names,
            },
            &self.policy,
        );

        let mut bodies = synthesis.auxiliary_bodies;
        bodies.push(part_body(child, child_part, &mesh_to_body));

        Ok((
            NodeFrame {
                body: child.to_string(),
                mesh_to_body,
            },
            EdgeOutput {
                body: child.to_string(),
                bodies,
                joints: synthesis.joints,
                asset: DownloadDescriptor::for_part(child_part, &self.document, child, mesh_to_body),
                warning: synthesis.warning,
            },
        ))
    }
}

fn part_body(name: &str, part: &Part, mesh_to_body: &Transform) -> Body {
    Body {
        name: name.to_string(),
        mesh: Some(MeshRef {
            file_name: format!("{name}.stl"),
        }),
        material: Some(material_for(name)),
        inertial: express_inertial(&part.mass_properties, mesh_to_body),
    }
}

async fn run_edge(
    ctx: Arc<SynthesisContext>,
    edge: TreeEdge,
    mut parent_rx: watch::Receiver<NodeState>,
    child_tx: watch::Sender<NodeState>,
    permits: Arc<Semaphore>,
) -> EdgeOutcome {
    // A closed channel means the parent's task died before resolving.
    let parent_state = match parent_rx
        .wait_for(|s| !matches!(s, NodeState::Pending))
        .await
    {
        Ok(state) => (*state).clone(),
        Err(_) => NodeState::Absent,
    };
    let NodeState::Ready(parent) = parent_state else {
        tracing::warn!("Skipping {}: parent {} is absent", edge.child, edge.parent);
        child_tx.send_replace(NodeState::Absent);
        return EdgeOutcome::Skipped {
            parent: edge.parent,
        };
    };

    let _permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            child_tx.send_replace(NodeState::Absent);
            return EdgeOutcome::Failed(KinematicsError::TaskFailed(e.to_string()));
        }
    };

    match ctx.edge(&edge, &parent) {
        Ok((frame, output)) => {
            child_tx.send_replace(NodeState::Ready(Arc::new(frame)));
            EdgeOutcome::Done(output)
        }
        Err(KinematicsError::MissingTopology { parent: occurrence, .. }) => {
            child_tx.send_replace(NodeState::Absent);
            EdgeOutcome::Missing { parent: occurrence }
        }
        Err(e) => {
            child_tx.send_replace(NodeState::Absent);
            EdgeOutcome::Failed(e)
        }
    }
}

fn insert_once<V>(
    map: &mut BTreeMap<String, V>,
    kind: &'static str,
    name: String,
    value: V,
) -> Result<()> {
    if map.contains_key(&name) {
        return Err(KinematicsError::DuplicateName { kind, name });
    }
    map.insert(name, value);
    Ok(())
}

/// Synthesize the kinematic model of `input` over `tree`.
///
/// Missing mates, unsupported mate types and unresolvable relations degrade
/// the output and are reported in [`KinematicModel::warnings`]. A tree node
/// without a part, a singular mate frame or a name collision fails the run.
pub async fn synthesize(
    input: &AssemblyInput,
    tree: &RootedTree,
    config: &SynthesisConfig,
) -> Result<KinematicModel> {
    config.validate()?;

    let relations = input.relation_table();
    let oriented = orient_mates(tree, &input.mate_table(), relations.entries);
    let names = NameTable::build(tree, &input.parts, &oriented)?;
    let mimics = MimicResolver::build(&oriented, &names);
    let mut warnings: Vec<SynthesisWarning> = relations
        .conflicts
        .into_iter()
        .map(SynthesisWarning::RelationConflict)
        .collect();
    warnings.extend_from_slice(mimics.warnings());

    let ctx = Arc::new(SynthesisContext {
        parts: input.parts.clone(),
        document: input.document.clone(),
        oriented,
        names,
        mimics,
        policy: config.joint_policy.clone(),
    });

    let mut model = KinematicModel::default();
    let (root_frame, root_body, root_asset) = ctx.root(tree.root())?;
    model.root = root_body.name.clone();
    model.assets.insert(root_body.name.clone(), root_asset);
    model.bodies.insert(root_body.name.clone(), root_body);

    let mut senders = BTreeMap::new();
    let mut receivers = BTreeMap::new();
    for node in tree.walk() {
        let (tx, rx) = watch::channel(NodeState::Pending);
        senders.insert(node.to_string(), tx);
        receivers.insert(node.to_string(), rx);
    }
    if let Some(tx) = senders.remove(tree.root()) {
        tx.send_replace(NodeState::Ready(Arc::new(root_frame)));
        // Keep the root channel open until every task has read it.
        senders.insert(tree.root().to_string(), tx);
    }

    let permits = Arc::new(Semaphore::new(config.max_concurrency));
    let mut tasks = JoinSet::new();
    for edge in tree.edges() {
        let (Some(parent_rx), Some(child_tx)) =
            (receivers.get(&edge.parent).cloned(), senders.remove(&edge.child))
        else {
            return Err(KinematicsError::TaskFailed(format!(
                "no channel for edge {} -> {}",
                edge.parent, edge.child
            )));
        };
        let ctx = Arc::clone(&ctx);
        let permits = Arc::clone(&permits);
        let edge = edge.clone();
        tasks.spawn(async move {
            let child = edge.child.clone();
            (child, run_edge(ctx, edge, parent_rx, child_tx, permits).await)
        });
    }
    drop(receivers);

    let mut outcomes: BTreeMap<String, EdgeOutcome> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, EdgeOutcome::Failed(e))) => {
                tasks.abort_all();
                return Err(e);
            }
            Ok((child, outcome)) => {
                outcomes.insert(child, outcome);
            }
            Err(e) => {
                tracing::error!("Synthesis task failed: {}", e);
            }
        }
    }
    drop(senders);

    for node in tree.walk().skip(1) {
        match outcomes.remove(node) {
            Some(EdgeOutcome::Done(output)) => {
                for body in output.bodies {
                    insert_once(&mut model.bodies, "body", body.name.clone(), body)?;
                }
                for joint in output.joints {
                    insert_once(&mut model.joints, "joint", joint.name.clone(), joint)?;
                }
                model.assets.insert(output.body, output.asset);
                warnings.extend(output.warning);
            }
            Some(EdgeOutcome::Missing { parent }) => {
                warnings.push(SynthesisWarning::MissingTopology {
                    parent,
                    child: node.to_string(),
                });
            }
            Some(EdgeOutcome::Skipped { parent }) => {
                warnings.push(SynthesisWarning::SkippedSubtree {
                    node: node.to_string(),
                    parent,
                });
            }
            Some(EdgeOutcome::Failed(e)) => return Err(e),
            None => {
                // Task panicked; its children already saw a closed channel.
                return Err(KinematicsError::TaskFailed(format!(
                    "no result for node {node}"
                )));
            }
        }
    }

    warnings.extend(prune_dangling(&mut model.joints));
    model.warnings = warnings;
    tracing::info!(
        "Synthesized {} bodies and {} joints ({} warnings)",
        model.bodies.len(),
        model.joints.len(),
        model.warnings.len()
    );
    Ok(model)
}

/// Blocking wrapper around [`synthesize`] for callers without a runtime.
///
/// Must not be called from inside a tokio runtime.
pub fn synthesize_blocking(
    input: &AssemblyInput,
    tree: &RootedTree,
    config: &SynthesisConfig,
) -> Result<KinematicModel> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| KinematicsError::TaskFailed(e.to_string()))?;
    runtime.block_on(synthesize(input, tree, config))
}
