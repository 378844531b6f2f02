//! Reproducible body colors.

use sha2::{Digest, Sha256};

use crate::model::Material;

/// Named colors bodies are drawn from.
pub const PALETTE: [(&str, [f64; 4]); 10] = [
    ("red", [0.80, 0.20, 0.20, 1.0]),
    ("orange", [0.90, 0.50, 0.10, 1.0]),
    ("yellow", [0.90, 0.80, 0.20, 1.0]),
    ("lime", [0.55, 0.80, 0.20, 1.0]),
    ("green", [0.20, 0.65, 0.30, 1.0]),
    ("teal", [0.15, 0.60, 0.60, 1.0]),
    ("blue", [0.20, 0.40, 0.80, 1.0]),
    ("indigo", [0.35, 0.30, 0.70, 1.0]),
    ("purple", [0.60, 0.30, 0.70, 1.0]),
    ("gray", [0.55, 0.55, 0.55, 1.0]),
];

/// Material for a body: SHA-256 of the name indexes [`PALETTE`].
pub fn material_for(body_name: &str) -> Material {
    let digest = Sha256::digest(body_name.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(prefix) % PALETTE.len() as u64) as usize;
    let (name, rgba) = PALETTE[index];
    Material {
        name: name.to_string(),
        rgba,
    }
}
