#![warn(missing_docs)]

//! Assembly records for the cadlink ecosystem.
//!
//! This crate defines the validated input side of a conversion: parts with
//! their mass properties, mates with their paired coordinate frames, and mate
//! relations. Records arrive already parsed from the CAD service; the only
//! checks done here are the structural ones that must hold before any
//! kinematic synthesis runs.

use cadlink_math::{Mat3, Transform, Vec3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub mod naming;

/// Joins the two occurrence identifiers of a mate key.
pub const MATE_JOINER: &str = "-MATE-";

/// Joins the instance ids of an occurrence path inside sub-assemblies.
pub const SUBASSEMBLY_JOINER: &str = "-SUB-";

/// Length of document, workspace and element identifiers.
pub const ID_LENGTH: usize = 24;

/// Identifier of a placed part or rigid sub-assembly.
pub type OccurrenceId = String;

/// Errors raised while validating assembly records.
#[derive(Error, Debug)]
pub enum IrError {
    /// An identifier has the wrong shape.
    #[error("invalid {field} '{value}': expected 24 characters")]
    InvalidIdentifier {
        /// Which field was checked.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// A placement matrix is not homogeneous.
    #[error("invalid placement transform for part {0}: last row must be [0, 0, 0, 1]")]
    InvalidPlacement(String),

    /// Mass properties are not physical.
    #[error("invalid mass properties for part {part}: {reason}")]
    InvalidMassProperties {
        /// Part occurrence id.
        part: String,
        /// What is wrong.
        reason: String,
    },

    /// A mated entity does not name an occurrence.
    #[error("mate {0} has an entity without an occurrence path")]
    EmptyOccurrence(String),

    /// A mate frame has a zero-length axis.
    #[error("mate {0} has a degenerate coordinate frame")]
    DegenerateFrame(String),

    /// A mate joins an occurrence to itself.
    #[error("mate {0} joins an occurrence to itself")]
    SelfMate(String),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key of a mate in lookup tables: the two occurrence ids in authored order.
///
/// The same physical mate is reachable through [`MateKey::reversed`] when it
/// was authored child-first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MateKey {
    /// Occurrence on the first side.
    pub first: OccurrenceId,
    /// Occurrence on the second side.
    pub second: OccurrenceId,
}

impl MateKey {
    /// Create a key from two occurrence ids.
    pub fn new(first: impl Into<OccurrenceId>, second: impl Into<OccurrenceId>) -> Self {
        Self {
            first: first.into(),
            second: second.into(),
        }
    }

    /// The same pair in the opposite order.
    pub fn reversed(&self) -> Self {
        Self {
            first: self.second.clone(),
            second: self.first.clone(),
        }
    }
}

impl fmt::Display for MateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.first, MATE_JOINER, self.second)
    }
}

/// Mass, center of mass and inertia of a part, in its mesh frame.
///
/// Units are pre-normalized (kg, m, kg·m²). The inertia tensor is taken about
/// the center of mass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassProperties {
    /// Mass in kg.
    pub mass: f64,
    /// Center of mass in the part's mesh frame.
    pub center_of_mass: [f64; 3],
    /// Row-major 3x3 inertia tensor about the center of mass.
    pub inertia: [[f64; 3]; 3],
}

impl MassProperties {
    /// Center of mass as a vector.
    pub fn center_of_mass(&self) -> Vec3 {
        Vec3::from(self.center_of_mass)
    }

    /// Inertia tensor as a matrix.
    pub fn inertia_tensor(&self) -> Mat3 {
        let i = &self.inertia;
        Mat3::new(
            i[0][0], i[0][1], i[0][2], //
            i[1][0], i[1][1], i[1][2], //
            i[2][0], i[2][1], i[2][2],
        )
    }
}

fn default_configuration() -> String {
    "default".to_string()
}

/// A part (or rigid sub-assembly) occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Part {
    /// Human-readable instance name, e.g. `"Part 1 <2>"`.
    pub name: String,
    /// Document containing the part.
    pub document_id: String,
    /// Element (part studio or assembly tab) containing the part.
    pub element_id: String,
    /// Part id inside the element.
    pub part_id: String,
    /// Configuration string.
    #[serde(default = "default_configuration")]
    pub configuration: String,
    /// Immutable document version, when the part is referenced from one.
    #[serde(default)]
    pub document_version: Option<String>,
    /// Workspace of the rigid sub-assembly this occurrence stands for.
    #[serde(default)]
    pub rigid_assembly_workspace_id: Option<String>,
    /// Mass properties in the part's mesh frame.
    pub mass_properties: MassProperties,
    /// Treated as a single non-articulated body.
    #[serde(default)]
    pub is_rigid_assembly: bool,
    /// Fixed in space in the CAD assembly.
    #[serde(default)]
    pub is_fixed: bool,
    /// Own placement (row-major 4x4) for nested rigid assemblies.
    #[serde(default)]
    pub placement: Option<[f64; 16]>,
}

impl Part {
    /// The placement as a transform, if present.
    pub fn placement_transform(&self) -> Option<Transform> {
        self.placement.as_ref().map(Transform::from_row_major)
    }

    fn validate(&self, occurrence: &str) -> Result<(), IrError> {
        check_id("document_id", &self.document_id)?;
        check_id("element_id", &self.element_id)?;
        if let Some(version) = &self.document_version {
            check_id("document_version", version)?;
        }
        if let Some(workspace) = &self.rigid_assembly_workspace_id {
            check_id("rigid_assembly_workspace_id", workspace)?;
        }

        let mp = &self.mass_properties;
        if !mp.mass.is_finite() || mp.mass < 0.0 {
            return Err(IrError::InvalidMassProperties {
                part: occurrence.to_string(),
                reason: format!("mass must be finite and non-negative, got {}", mp.mass),
            });
        }
        let tensor = mp.inertia_tensor();
        if (tensor - tensor.transpose()).iter().any(|v| v.abs() > 1e-9) {
            return Err(IrError::InvalidMassProperties {
                part: occurrence.to_string(),
                reason: "inertia tensor is not symmetric".to_string(),
            });
        }

        if let Some(p) = &self.placement {
            if p[12] != 0.0 || p[13] != 0.0 || p[14] != 0.0 || p[15] != 1.0 {
                return Err(IrError::InvalidPlacement(occurrence.to_string()));
            }
        }
        Ok(())
    }
}

/// A local coordinate frame authored on one side of a mate.
///
/// Axes and origin are expressed in the mated part's mesh frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatedCs {
    /// X axis of the frame.
    pub x_axis: [f64; 3],
    /// Y axis of the frame.
    pub y_axis: [f64; 3],
    /// Z axis of the frame.
    pub z_axis: [f64; 3],
    /// Origin of the frame.
    pub origin: [f64; 3],
}

impl MatedCs {
    /// The part→mate transform: rotation columns are the axes, translation is the origin.
    pub fn to_transform(&self) -> Transform {
        Transform::from_axes(
            &Vec3::from(self.x_axis),
            &Vec3::from(self.y_axis),
            &Vec3::from(self.z_axis),
            &Vec3::from(self.origin),
        )
    }

    fn is_degenerate(&self) -> bool {
        [self.x_axis, self.y_axis, self.z_axis]
            .iter()
            .any(|a| Vec3::from(*a).norm() < 1e-12)
    }
}

/// One side of a mate: an occurrence reference plus its local frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MateEntity {
    /// Instance path from the root assembly to the mated occurrence.
    pub occurrence: Vec<String>,
    /// The mate frame on this occurrence.
    pub mated_cs: MatedCs,
}

impl MateEntity {
    /// Occurrence id: the instance path joined with [`SUBASSEMBLY_JOINER`].
    pub fn occurrence_id(&self) -> OccurrenceId {
        self.occurrence.join(SUBASSEMBLY_JOINER)
    }
}

/// CAD mate type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MateType {
    /// Rigid connection.
    Fastened,
    /// Rotation about one axis.
    Revolute,
    /// Translation along one axis.
    Slider,
    /// Rotation and translation about/along one axis.
    Cylindrical,
    /// Planar contact.
    Planar,
    /// Spherical joint.
    Ball,
    /// Pin in slot.
    PinSlot,
    /// Parallel axes.
    Parallel,
    /// Any type this crate does not know.
    #[serde(other)]
    Unknown,
}

impl MateType {
    /// Whether the mate maps onto a real joint primitive.
    pub fn is_supported(self) -> bool {
        matches!(
            self,
            MateType::Fastened
                | MateType::Revolute
                | MateType::Slider
                | MateType::Cylindrical
                | MateType::Ball
        )
    }

    /// Whether the synthesized joint has a degree of freedom to mimic.
    pub fn is_movable(self) -> bool {
        self.is_supported() && self != MateType::Fastened
    }
}

/// A mate between two occurrences.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mate {
    /// Feature id.
    pub id: String,
    /// Authored name, e.g. `"Revolute 1"`.
    pub name: String,
    /// Mate type.
    pub mate_type: MateType,
    /// The two mated entities; index 0 is the first-authored side.
    pub entities: [MateEntity; 2],
}

impl Mate {
    /// Key built from the entity occurrences in their current order.
    pub fn key(&self) -> MateKey {
        MateKey::new(
            self.entities[0].occurrence_id(),
            self.entities[1].occurrence_id(),
        )
    }

    /// The same mate with its entities swapped.
    pub fn reversed(&self) -> Self {
        let mut mate = self.clone();
        mate.entities.swap(0, 1);
        mate
    }

    fn validate(&self) -> Result<(), IrError> {
        for entity in &self.entities {
            if entity.occurrence.is_empty() || entity.occurrence.iter().any(|s| s.is_empty()) {
                return Err(IrError::EmptyOccurrence(self.id.clone()));
            }
            if entity.mated_cs.is_degenerate() {
                return Err(IrError::DegenerateFrame(self.id.clone()));
            }
        }
        let key = self.key();
        if key.first == key.second {
            return Err(IrError::SelfMate(self.id.clone()));
        }
        Ok(())
    }
}

/// Mate relation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationType {
    /// Linear coupling.
    Linear,
    /// Rotational gear ratio.
    Gear,
    /// Rotation to translation.
    Screw,
    /// Rotation to translation through a rack.
    RackAndPinion,
}

/// A relation coupling the motion of several mates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MateRelation {
    /// Feature id.
    pub id: String,
    /// Authored name, e.g. `"Gear 1"`.
    pub name: String,
    /// Relation type.
    pub relation_type: RelationType,
    /// Ids of the related mates; index 0 is the driving mate.
    pub mates: Vec<String>,
    /// Ratio between the dependent and the driving motion.
    #[serde(default)]
    pub ratio: Option<f64>,
    /// Reverse direction flag as authored.
    #[serde(default)]
    pub reverse: bool,
}

impl MateRelation {
    /// Id of the driving mate.
    pub fn driving_mate(&self) -> Option<&str> {
        self.mates.first().map(String::as_str)
    }

    /// Ids of every non-driving mate.
    pub fn dependent_mates(&self) -> &[String] {
        self.mates.get(1..).unwrap_or(&[])
    }

    /// Mimic multiplier: the ratio, or 1.0 when none was authored.
    pub fn multiplier(&self) -> f64 {
        self.ratio.unwrap_or(1.0)
    }
}

/// The assembly document the parts are downloaded from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Document id.
    pub document_id: String,
    /// Workspace the assembly was read from.
    pub workspace_id: String,
}

/// Everything the synthesis needs from the CAD side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyInput {
    /// Assembly name, used as the default robot name.
    pub name: String,
    /// Source document.
    pub document: DocumentRef,
    /// Parts keyed by occurrence id.
    pub parts: BTreeMap<OccurrenceId, Part>,
    /// Mates in authored order.
    #[serde(default)]
    pub mates: Vec<Mate>,
    /// Mate relations.
    #[serde(default)]
    pub relations: Vec<MateRelation>,
}

impl AssemblyInput {
    /// Deserialize from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, IrError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, IrError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Structural checks that must hold before synthesis.
    pub fn validate(&self) -> Result<(), IrError> {
        check_id("document_id", &self.document.document_id)?;
        check_id("workspace_id", &self.document.workspace_id)?;
        for (occurrence, part) in &self.parts {
            part.validate(occurrence)?;
        }
        for mate in &self.mates {
            mate.validate()?;
        }
        Ok(())
    }

    /// Mates keyed by their authored [`MateKey`].
    ///
    /// When two mates join the same pair of occurrences in the same order the
    /// first one wins.
    pub fn mate_table(&self) -> BTreeMap<MateKey, Mate> {
        let mut table = BTreeMap::new();
        for mate in &self.mates {
            let key = mate.key();
            if table.contains_key(&key) {
                tracing::warn!("Duplicate mate {} ({}) for {}; keeping the first", mate.name, mate.id, key);
                continue;
            }
            table.insert(key, mate.clone());
        }
        table
    }

    /// Relations keyed by the [`MateKey`] of each dependent mate.
    ///
    /// A relation with several dependent mates appears once per dependent.
    /// Only mates kept by [`AssemblyInput::mate_table`] can be dependents, and
    /// a mate belongs to at most one relation (the first that names it).
    /// Every entry left out is recorded in [`RelationTable::conflicts`].
    pub fn relation_table(&self) -> RelationTable {
        // Same first-wins rule as `mate_table`.
        let mut kept: BTreeMap<MateKey, &str> = BTreeMap::new();
        let mut keys_by_id: BTreeMap<&str, MateKey> = BTreeMap::new();
        let mut duplicates: BTreeMap<&str, &str> = BTreeMap::new();
        for mate in &self.mates {
            let key = mate.key();
            match kept.get(&key) {
                Some(first) => {
                    duplicates.insert(mate.id.as_str(), *first);
                }
                None => {
                    kept.insert(key.clone(), mate.id.as_str());
                    keys_by_id.insert(mate.id.as_str(), key);
                }
            }
        }

        let mut table = RelationTable::default();
        let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
        for relation in &self.relations {
            for mate_id in relation.dependent_mates() {
                let mate = mate_id.as_str();
                let owner = owners.get(mate).copied();
                let conflict = match (keys_by_id.get(mate), owner) {
                    (Some(_), Some(owner)) => RelationConflict::AlreadyDependent {
                        relation: relation.name.clone(),
                        mate: mate_id.clone(),
                        kept: owner.to_string(),
                    },
                    (Some(key), None) => {
                        owners.insert(mate, relation.name.as_str());
                        table.entries.insert(key.clone(), relation.clone());
                        continue;
                    }
                    (None, _) => match duplicates.get(mate) {
                        Some(first) => RelationConflict::DuplicateMate {
                            relation: relation.name.clone(),
                            mate: mate_id.clone(),
                            kept: first.to_string(),
                        },
                        None => RelationConflict::UnknownMate {
                            relation: relation.name.clone(),
                            mate: mate_id.clone(),
                        },
                    },
                };
                tracing::warn!("{}", conflict);
                table.conflicts.push(conflict);
            }
        }
        table
    }
}

/// Relations by dependent mate key, see [`AssemblyInput::relation_table`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationTable {
    /// One entry per accepted dependent mate.
    pub entries: BTreeMap<MateKey, MateRelation>,
    /// Dependent references that were left out.
    pub conflicts: Vec<RelationConflict>,
}

/// A dependent mate reference that could not enter the relation table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationConflict {
    /// No mate has this id.
    UnknownMate {
        /// Relation name.
        relation: String,
        /// Referenced mate id.
        mate: String,
    },
    /// The mate was dropped as a duplicate of another mate on the same pair.
    DuplicateMate {
        /// Relation name.
        relation: String,
        /// Referenced mate id.
        mate: String,
        /// Id of the mate kept for that pair.
        kept: String,
    },
    /// The mate is already a dependent of an earlier relation.
    AlreadyDependent {
        /// Relation name.
        relation: String,
        /// Referenced mate id.
        mate: String,
        /// Name of the relation that keeps the mate.
        kept: String,
    },
}

impl fmt::Display for RelationConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationConflict::UnknownMate { relation, mate } => {
                write!(f, "relation {relation} references unknown mate {mate}")
            }
            RelationConflict::DuplicateMate {
                relation,
                mate,
                kept,
            } => write!(
                f,
                "relation {relation} references mate {mate}, dropped as a duplicate of {kept}"
            ),
            RelationConflict::AlreadyDependent {
                relation,
                mate,
                kept,
            } => write!(
                f,
                "relation {relation} ignored for mate {mate}, already driven by relation {kept}"
            ),
        }
    }
}

fn check_id(field: &'static str, value: &str) -> Result<(), IrError> {
    if value.len() != ID_LENGTH {
        return Err(IrError::InvalidIdentifier {
            field,
            value: value.to_string(),
        });
    }
    Ok(())
}
