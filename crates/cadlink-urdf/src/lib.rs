#![warn(missing_docs)]

//! URDF serialization of cadlink kinematic models.
//!
//! Dummy joints have no URDF counterpart and are written as `fixed`.
//! Materials are declared once at robot level and referenced by name from
//! each visual.

use std::io::Cursor;

use cadlink_kinematics::{Body, Joint, JointKind, KinematicModel};
use cadlink_math::{Transform, Vec3};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Writer;
use thiserror::Error;

/// Errors from URDF generation.
#[derive(Debug, Error)]
pub enum UrdfError {
    /// XML writer failed.
    #[error("XML error: {0}")]
    Xml(String),

    /// A joint references a link that is not in the model.
    #[error("joint '{joint}' references undefined link '{link}'")]
    UndefinedLink {
        /// Missing link name.
        link: String,
        /// Joint that references it.
        joint: String,
    },

    /// Generated bytes are not UTF-8.
    #[error("invalid UTF-8 in generated XML: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Result type for URDF generation.
pub type Result<T> = std::result::Result<T, UrdfError>;

/// Output options.
#[derive(Debug, Clone)]
pub struct UrdfOptions {
    /// Directory prefix of mesh file names.
    pub mesh_dir: String,
    /// Emit `<collision>` elements alongside visuals.
    pub collision: bool,
}

impl Default for UrdfOptions {
    fn default() -> Self {
        Self {
            mesh_dir: "meshes".to_string(),
            collision: true,
        }
    }
}

/// Serialize `model` as a URDF document named `robot_name`.
pub fn write_urdf(robot_name: &str, model: &KinematicModel, options: &UrdfOptions) -> Result<String> {
    for joint in model.joints.values() {
        for link in [&joint.parent, &joint.child] {
            if !model.bodies.contains_key(link) {
                return Err(UrdfError::UndefinedLink {
                    link: link.clone(),
                    joint: joint.name.clone(),
                });
            }
        }
    }

    let mut buffer = Vec::new();
    let mut xml = XmlOut {
        writer: Writer::new_with_indent(Cursor::new(&mut buffer), b' ', 2),
    };

    xml.event(Event::Decl(BytesDecl::new("1.0", None, None)))?;
    xml.start("robot", &[("name", robot_name.to_string())])?;

    for (name, material) in model.materials() {
        xml.start("material", &[("name", name.to_string())])?;
        xml.empty("color", &[("rgba", join(&material.rgba))])?;
        xml.end("material")?;
    }

    // Root link first, then the rest in name order.
    let bodies = model
        .bodies
        .get(&model.root)
        .into_iter()
        .chain(model.bodies.values().filter(|b| b.name != model.root));
    for body in bodies {
        write_link(&mut xml, body, options)?;
    }

    for joint in model.joints.values() {
        write_joint(&mut xml, joint, model)?;
    }

    xml.end("robot")?;
    drop(xml);
    Ok(String::from_utf8(buffer)?)
}

struct XmlOut<'a> {
    writer: Writer<Cursor<&'a mut Vec<u8>>>,
}

impl XmlOut<'_> {
    fn event(&mut self, event: Event<'_>) -> Result<()> {
        self.writer
            .write_event(event)
            .map_err(|e| UrdfError::Xml(e.to_string()))
    }

    fn element<'b>(name: &'b str, attributes: &[(&str, String)]) -> BytesStart<'b> {
        let mut element = BytesStart::new(name);
        for (key, value) in attributes {
            element.push_attribute((*key, value.as_str()));
        }
        element
    }

    fn start(&mut self, name: &str, attributes: &[(&str, String)]) -> Result<()> {
        self.event(Event::Start(Self::element(name, attributes)))
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, String)]) -> Result<()> {
        self.event(Event::Empty(Self::element(name, attributes)))
    }

    fn end(&mut self, name: &str) -> Result<()> {
        self.event(Event::End(BytesEnd::new(name)))
    }

    fn origin(&mut self, transform: &Transform) -> Result<()> {
        self.empty(
            "origin",
            &[
                ("xyz", vec3(&transform.translation_part())),
                ("rpy", vec3(&transform.rpy())),
            ],
        )
    }

    fn mesh(&mut self, filename: &str) -> Result<()> {
        self.start("geometry", &[])?;
        self.empty("mesh", &[("filename", filename.to_string())])?;
        self.end("geometry")
    }
}

fn join(values: &[f64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

fn vec3(v: &Vec3) -> String {
    join(&[v.x, v.y, v.z])
}

fn write_link(xml: &mut XmlOut<'_>, body: &Body, options: &UrdfOptions) -> Result<()> {
    xml.start("link", &[("name", body.name.clone())])?;

    if let Some(mesh) = &body.mesh {
        let filename = if options.mesh_dir.is_empty() {
            mesh.file_name.clone()
        } else {
            format!("{}/{}", options.mesh_dir.trim_end_matches('/'), mesh.file_name)
        };

        xml.start("visual", &[("name", format!("{}-visual", body.name))])?;
        xml.origin(&Transform::identity())?;
        xml.mesh(&filename)?;
        if let Some(material) = &body.material {
            xml.empty("material", &[("name", material.name.clone())])?;
        }
        xml.end("visual")?;

        if options.collision {
            xml.start("collision", &[("name", format!("{}-collision", body.name))])?;
            xml.origin(&Transform::identity())?;
            xml.mesh(&filename)?;
            xml.end("collision")?;
        }
    }

    let inertial = &body.inertial;
    let i = &inertial.inertia;
    xml.start("inertial", &[])?;
    xml.origin(&inertial.origin)?;
    xml.empty("mass", &[("value", inertial.mass.to_string())])?;
    xml.empty(
        "inertia",
        &[
            ("ixx", i[(0, 0)].to_string()),
            ("ixy", i[(0, 1)].to_string()),
            ("ixz", i[(0, 2)].to_string()),
            ("iyy", i[(1, 1)].to_string()),
            ("iyz", i[(1, 2)].to_string()),
            ("izz", i[(2, 2)].to_string()),
        ],
    )?;
    xml.end("inertial")?;

    xml.end("link")
}

fn joint_type(kind: &JointKind) -> &'static str {
    match kind {
        JointKind::Dummy => "fixed",
        other => other.name(),
    }
}

fn write_joint(xml: &mut XmlOut<'_>, joint: &Joint, model: &KinematicModel) -> Result<()> {
    xml.start(
        "joint",
        &[
            ("name", joint.name.clone()),
            ("type", joint_type(&joint.kind).to_string()),
        ],
    )?;
    xml.empty("parent", &[("link", joint.parent.clone())])?;
    xml.empty("child", &[("link", joint.child.clone())])?;
    xml.origin(&joint.origin)?;

    if let Some(axis) = joint.kind.axis() {
        xml.empty("axis", &[("xyz", vec3(&axis))])?;
    }
    if let Some(limits) = joint.kind.limits() {
        xml.empty(
            "limit",
            &[
                ("effort", limits.effort.to_string()),
                ("velocity", limits.velocity.to_string()),
                ("lower", limits.lower.to_string()),
                ("upper", limits.upper.to_string()),
            ],
        )?;
    }
    if let Some(dynamics) = joint.kind.dynamics() {
        xml.empty(
            "dynamics",
            &[
                ("damping", dynamics.damping.to_string()),
                ("friction", dynamics.friction.to_string()),
            ],
        )?;
    }
    // Both ends of a mimic need a degree of freedom.
    let mimic = joint.mimic.as_ref().filter(|m| {
        joint.kind.is_movable()
            && model
                .joints
                .get(&m.joint)
                .is_some_and(|target| target.kind.is_movable())
    });
    if let Some(mimic) = mimic {
        xml.empty(
            "mimic",
            &[
                ("joint", mimic.joint.clone()),
                ("multiplier", mimic.multiplier.to_string()),
                ("offset", mimic.offset.to_string()),
            ],
        )?;
    }

    xml.end("joint")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadlink_kinematics::{
        Inertial, JointDynamics, JointLimits, Material, MeshRef, Mimic,
    };
    use cadlink_math::Mat3;
    use quick_xml::Reader;

    fn body(name: &str) -> Body {
        Body {
            name: name.to_string(),
            mesh: Some(MeshRef {
                file_name: format!("{name}.stl"),
            }),
            material: Some(Material {
                name: "blue".to_string(),
                rgba: [0.2, 0.4, 0.8, 1.0],
            }),
            inertial: Inertial {
                origin: Transform::translation(0.0, 0.0, 0.05),
                mass: 1.5,
                inertia: Mat3::from_diagonal(&Vec3::new(0.01, 0.02, 0.03)),
            },
        }
    }

    fn revolute() -> JointKind {
        JointKind::Revolute {
            axis: Vec3::new(0.0, 0.0, -1.0),
            limits: JointLimits {
                effort: 1.0,
                velocity: 1.0,
                lower: -1.5,
                upper: 1.5,
            },
            dynamics: JointDynamics {
                damping: 0.1,
                friction: 0.1,
            },
        }
    }

    fn joint(name: &str, kind: JointKind, parent: &str, child: &str) -> Joint {
        Joint {
            name: name.to_string(),
            kind,
            parent: parent.to_string(),
            child: child.to_string(),
            origin: Transform::translation(0.0, 0.0, 0.1),
            mimic: None,
        }
    }

    fn model() -> KinematicModel {
        let mut model = KinematicModel {
            root: "base".to_string(),
            ..Default::default()
        };
        for name in ["base", "arm", "tip"] {
            model.bodies.insert(name.to_string(), body(name));
        }
        model.bodies.insert("aux".to_string(), Body::auxiliary("aux"));
        model
            .joints
            .insert("shoulder".to_string(), joint("shoulder", revolute(), "base", "arm"));
        let mut elbow = joint("elbow", revolute(), "arm", "aux");
        elbow.mimic = Some(Mimic {
            joint: "shoulder".to_string(),
            multiplier: 2.0,
            offset: 0.0,
        });
        model.joints.insert("elbow".to_string(), elbow);
        model
            .joints
            .insert("weld".to_string(), joint("weld", JointKind::Dummy, "aux", "tip"));
        model
    }

    fn element_names(xml: &str) -> Vec<String> {
        let mut reader = Reader::from_str(xml);
        let mut names = Vec::new();
        loop {
            match reader.read_event().unwrap() {
                Event::Start(e) | Event::Empty(e) => {
                    names.push(String::from_utf8(e.name().as_ref().to_vec()).unwrap())
                }
                Event::Eof => break,
                _ => {}
            }
        }
        names
    }

    #[test]
    fn test_document_structure() {
        let xml = write_urdf("arm", &model(), &UrdfOptions::default()).unwrap();
        assert!(xml.starts_with("<?xml version=\"1.0\"?>"));
        assert!(xml.contains("<robot name=\"arm\">"));

        let names = element_names(&xml);
        assert_eq!(names.iter().filter(|n| *n == "link").count(), 4);
        assert_eq!(names.iter().filter(|n| *n == "joint").count(), 3);
        assert_eq!(names.iter().filter(|n| *n == "visual").count(), 3);
        assert_eq!(names.iter().filter(|n| *n == "collision").count(), 3);
        assert_eq!(names.iter().filter(|n| *n == "mimic").count(), 1);
        // One robot-level material plus three references.
        assert_eq!(names.iter().filter(|n| *n == "material").count(), 4);
    }

    #[test]
    fn test_root_link_comes_first() {
        let xml = write_urdf("arm", &model(), &UrdfOptions::default()).unwrap();
        let first = xml.find("<link name=").unwrap();
        assert_eq!(xml.find("<link name=\"base\">"), Some(first));
    }

    #[test]
    fn test_joint_elements() {
        let xml = write_urdf("arm", &model(), &UrdfOptions::default()).unwrap();
        assert!(xml.contains("<joint name=\"weld\" type=\"fixed\">"));
        assert!(xml.contains("<joint name=\"shoulder\" type=\"revolute\">"));
        assert!(xml.contains("<axis xyz=\"0 0 -1\"/>"));
        assert!(xml.contains("<limit effort=\"1\" velocity=\"1\" lower=\"-1.5\" upper=\"1.5\"/>"));
        assert!(xml.contains("<dynamics damping=\"0.1\" friction=\"0.1\"/>"));
        assert!(xml.contains("<mimic joint=\"shoulder\" multiplier=\"2\" offset=\"0\"/>"));
        assert!(xml.contains("<mesh filename=\"meshes/arm.stl\"/>"));
        assert!(xml.contains("<inertia ixx=\"0.01\" ixy=\"0\" ixz=\"0\" iyy=\"0.02\" iyz=\"0\" izz=\"0.03\"/>"));
    }

    #[test]
    fn test_mimic_of_fixed_joint_is_not_written() {
        let mut m = model();
        if let Some(elbow) = m.joints.get_mut("elbow") {
            elbow.mimic = Some(Mimic {
                joint: "weld".to_string(),
                multiplier: 1.0,
                offset: 0.0,
            });
        }
        let xml = write_urdf("arm", &m, &UrdfOptions::default()).unwrap();
        assert!(!xml.contains("<mimic"));
    }

    #[test]
    fn test_options_control_collision_and_mesh_dir() {
        let options = UrdfOptions {
            mesh_dir: "package://robot/meshes/".to_string(),
            collision: false,
        };
        let xml = write_urdf("arm", &model(), &options).unwrap();
        assert!(!xml.contains("<collision"));
        assert!(xml.contains("filename=\"package://robot/meshes/tip.stl\""));
    }

    #[test]
    fn test_undefined_link_is_rejected() {
        let mut m = model();
        m.bodies.remove("tip");
        let err = write_urdf("arm", &m, &UrdfOptions::default()).unwrap_err();
        assert!(matches!(err, UrdfError::UndefinedLink { link, joint } if link == "tip" && joint == "weld"));
    }
}
