//! Creature records
//!
//! The fixed-schema record stored in the data file.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One creature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Creature {
    /// Unique id, assigned by the engine on create
    pub id: i64,

    pub name: String,

    /// Species or category, e.g. "Seed Creature"
    pub species: String,

    /// Elemental types, primary first
    pub types: Vec<String>,

    pub height_m: f32,

    pub weight_kg: f32,

    pub generation: u8,

    pub legendary: bool,

    pub description: String,
}

impl Creature {
    /// Create a creature with the required fields; the rest start empty
    pub fn new(name: impl Into<String>, species: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
            species: species.into(),
            types: Vec::new(),
            height_m: 0.0,
            weight_kg: 0.0,
            generation: 1,
            legendary: false,
            description: String::new(),
        }
    }

    /// Serialize for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Deserialize a stored payload
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
