//! Synthesis configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid:
//!
//! ```toml
//! max_concurrency = 8
//! max_downloads = 4
//!
//! [joint_policy]
//! effort = 1.0
//! velocity = 1.0
//! damping = 0.1
//! friction = 0.1
//! revolute_limits = [-3.141592653589793, 3.141592653589793]
//! prismatic_limits = [-0.1, 0.1]
//! ```

use std::f64::consts::PI;

use cadlink_math::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{KinematicsError, Result};
use crate::model::{JointDynamics, JointKind, JointLimits};

/// Default number of edges synthesized at once.
pub const DEFAULT_MAX_CONCURRENCY: usize = 8;

/// Default number of concurrent mesh downloads.
pub const DEFAULT_MAX_DOWNLOADS: usize = 4;

/// Fixed joint parameters applied to every synthesized joint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JointPolicy {
    /// Maximum effort.
    pub effort: f64,
    /// Maximum velocity.
    pub velocity: f64,
    /// Viscous damping.
    pub damping: f64,
    /// Static friction.
    pub friction: f64,
    /// `[lower, upper]` for revolute joints, radians.
    pub revolute_limits: [f64; 2],
    /// `[lower, upper]` for prismatic joints, meters.
    pub prismatic_limits: [f64; 2],
}

impl Default for JointPolicy {
    fn default() -> Self {
        Self {
            effort: 1.0,
            velocity: 1.0,
            damping: 0.1,
            friction: 0.1,
            revolute_limits: [-PI, PI],
            prismatic_limits: [-0.1, 0.1],
        }
    }
}

impl JointPolicy {
    fn limits(&self, [lower, upper]: [f64; 2]) -> JointLimits {
        JointLimits {
            effort: self.effort,
            velocity: self.velocity,
            lower,
            upper,
        }
    }

    fn dynamics(&self) -> JointDynamics {
        JointDynamics {
            damping: self.damping,
            friction: self.friction,
        }
    }

    /// A revolute joint about `axis` with the policy limits.
    pub fn revolute(&self, axis: Vec3) -> JointKind {
        JointKind::Revolute {
            axis,
            limits: self.limits(self.revolute_limits),
            dynamics: self.dynamics(),
        }
    }

    /// A prismatic joint along `axis` with the policy limits.
    pub fn prismatic(&self, axis: Vec3) -> JointKind {
        JointKind::Prismatic {
            axis,
            limits: self.limits(self.prismatic_limits),
            dynamics: self.dynamics(),
        }
    }
}

/// Top-level synthesis settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// Edges synthesized at once.
    pub max_concurrency: usize,
    /// Mesh downloads in flight at once.
    pub max_downloads: usize,
    /// Joint parameters.
    pub joint_policy: JointPolicy,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            joint_policy: JointPolicy::default(),
        }
    }
}

impl SynthesisConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrency == 0 {
            return Err(KinematicsError::InvalidConfig(
                "max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_downloads == 0 {
            return Err(KinematicsError::InvalidConfig(
                "max_downloads must be at least 1".to_string(),
            ));
        }
        let policy = &self.joint_policy;
        for (field, [lower, upper]) in [
            ("revolute_limits", policy.revolute_limits),
            ("prismatic_limits", policy.prismatic_limits),
        ] {
            if lower > upper {
                return Err(KinematicsError::InvalidConfig(format!(
                    "{field}: lower {lower} exceeds upper {upper}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = SynthesisConfig::from_toml_str("").unwrap();
        assert_eq!(config, SynthesisConfig::default());
        assert_eq!(config.joint_policy.revolute_limits, [-PI, PI]);
    }

    #[test]
    fn test_partial_override() {
        let config = SynthesisConfig::from_toml_str(
            r#"
            max_concurrency = 2

            [joint_policy]
            effort = 12.5
            prismatic_limits = [0.0, 0.3]
            "#,
        )
        .unwrap();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.max_downloads, DEFAULT_MAX_DOWNLOADS);
        assert_eq!(config.joint_policy.effort, 12.5);
        assert_eq!(config.joint_policy.damping, 0.1);
        assert_eq!(config.joint_policy.prismatic_limits, [0.0, 0.3]);
    }

    #[test]
    fn test_rejects_zero_concurrency() {
        let err = SynthesisConfig::from_toml_str("max_concurrency = 0").unwrap_err();
        assert!(matches!(err, KinematicsError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_inverted_limits() {
        let err =
            SynthesisConfig::from_toml_str("[joint_policy]\nrevolute_limits = [1.0, -1.0]")
                .unwrap_err();
        assert!(matches!(err, KinematicsError::InvalidConfig(msg) if msg.contains("revolute")));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = SynthesisConfig::from_toml_str("max_concurrency = \"many\"").unwrap_err();
        assert!(matches!(err, KinematicsError::Toml(_)));
    }

    #[test]
    fn test_policy_builds_joint_kinds() {
        let policy = JointPolicy::default();
        let kind = policy.prismatic(-Vec3::z());
        let limits = kind.limits().unwrap();
        assert_eq!((limits.lower, limits.upper), (-0.1, 0.1));
        assert_eq!(kind.dynamics().unwrap().friction, 0.1);
    }
}
