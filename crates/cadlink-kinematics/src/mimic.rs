//! Mimic resolution: couple dependent joints to their driving joint.

use std::collections::{BTreeMap, BTreeSet};

use cadlink_ir::{Mate, MateRelation};

use crate::model::{Joint, Mimic, SynthesisWarning};
use crate::names::NameTable;
use crate::orient::OrientedMates;

/// Mimics by dependent mate id, computed once before traversal.
#[derive(Debug, Clone, Default)]
pub struct MimicResolver {
    by_mate: BTreeMap<String, Mimic>,
    warnings: Vec<SynthesisWarning>,
}

impl MimicResolver {
    /// Resolve every relation entry against the oriented mates.
    ///
    /// An entry whose key is not an oriented dependent of the relation, or
    /// whose driving mate produced no movable joint, is skipped with a
    /// warning.
    pub fn build(oriented: &OrientedMates, names: &NameTable) -> Self {
        let mut resolver = Self::default();
        let by_id: BTreeMap<&str, &Mate> = oriented
            .mates()
            .values()
            .map(|m| (m.id.as_str(), m))
            .collect();

        for (key, relation) in oriented.relations() {
            let dependent = oriented
                .by_key(key)
                .filter(|m| relation.dependent_mates().contains(&m.id));
            let Some(dependent) = dependent else {
                tracing::warn!(
                    "Relation {} is keyed by {}, which is not one of its tree edges",
                    relation.name,
                    key
                );
                resolver.warnings.push(SynthesisWarning::StaleRelation {
                    relation: relation.name.clone(),
                    key: key.clone(),
                });
                continue;
            };

            let joint = match driving_joint(relation, &by_id, names) {
                Ok(joint) => joint,
                Err(reason) => {
                    tracing::warn!("Relation {}: {}", relation.name, reason);
                    resolver.warnings.push(SynthesisWarning::MimicUnresolved {
                        relation: relation.name.clone(),
                        target: dependent.name.clone(),
                        reason,
                    });
                    continue;
                }
            };

            tracing::debug!("Mate {} mimics joint {}", dependent.name, joint);
            resolver.by_mate.insert(
                dependent.id.clone(),
                Mimic {
                    joint,
                    multiplier: relation.multiplier(),
                    offset: 0.0,
                },
            );
        }

        resolver
    }

    /// Mimic for the joints of a mate.
    pub fn mimic_for(&self, mate_id: &str) -> Option<Mimic> {
        self.by_mate.get(mate_id).cloned()
    }

    /// Warnings recorded while building.
    pub fn warnings(&self) -> &[SynthesisWarning] {
        &self.warnings
    }
}

/// First joint of the driving mate, if it can move.
fn driving_joint(
    relation: &MateRelation,
    by_id: &BTreeMap<&str, &Mate>,
    names: &NameTable,
) -> std::result::Result<String, String> {
    let Some(id) = relation.driving_mate() else {
        return Err("relation names no driving mate".to_string());
    };
    let Some(driver) = by_id.get(id) else {
        return Err(format!("driving mate {id} is not a tree edge"));
    };
    if !driver.mate_type.is_movable() {
        return Err(format!(
            "driving mate {} is {:?} and has no degree of freedom",
            driver.name, driver.mate_type
        ));
    }
    names
        .edge(id)
        .map(|edge| edge.first_joint().to_string())
        .ok_or_else(|| format!("driving mate {id} has no joint"))
}

/// Drop mimics whose target joint does not exist.
///
/// Happens when the driving edge was lost to missing topology after the
/// resolver ran.
pub fn prune_dangling(joints: &mut BTreeMap<String, Joint>) -> Vec<SynthesisWarning> {
    let names: BTreeSet<String> = joints.keys().cloned().collect();
    let mut warnings = Vec::new();
    for joint in joints.values_mut() {
        let dangling = joint
            .mimic
            .as_ref()
            .filter(|m| !names.contains(&m.joint))
            .map(|m| m.joint.clone());
        if let Some(target) = dangling {
            tracing::warn!("Joint {} mimics missing joint {}; mimic dropped", joint.name, target);
            joint.mimic = None;
            warnings.push(SynthesisWarning::DanglingMimic {
                joint: joint.name.clone(),
                target,
            });
        }
    }
    warnings
}
