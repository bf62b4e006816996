//! Hazard configuration structs.
//!
//! Settings parsing and file resolution live in the embedding
//! application; these structs only define the shape of a hazard's
//! configuration block and its defaults. They deserialize from TOML.

use serde::Deserialize;
use std::collections::BTreeMap;

/// Reference to a variable inside a named file.
#[derive(Debug, Clone, Deserialize)]
pub struct FileVariable {
    pub file: String,
    pub variable: String,
}

/// Iso-raster configuration: the cell variable and the label array.
#[derive(Debug, Clone, Deserialize)]
pub struct IsorasterConfig {
    pub variable: String,
    #[serde(default = "default_index_variable")]
    pub index: String,
}

fn default_index_variable() -> String {
    "index".to_string()
}

/// Flood recovery decay parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RecoveryConfig {
    pub exponent: f32,
    pub threshold: f32,
}

fn default_chunk_size() -> usize {
    10
}

/// Configuration of the flooding hazard.
#[derive(Debug, Clone, Deserialize)]
pub struct FloodingConfig {
    pub flood_fraction: FileVariable,
    pub proxy: FileVariable,
    pub isoraster: IsorasterConfig,
    pub recovery: Option<RecoveryConfig>,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub time_shift: i64,
    /// Sectors receiving this hazard's forcing.
    pub sectors: Vec<String>,
}

impl FloodingConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Configuration of the heat labor-productivity hazard.
#[derive(Debug, Clone, Deserialize)]
pub struct HeatLaborConfig {
    pub day_temperature: FileVariable,
    /// Temperature above which productivity starts to drop.
    pub threshold: f32,
    pub proxy: FileVariable,
    pub isoraster: IsorasterConfig,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub time_shift: i64,
    /// Per-sector response slope above the threshold.
    pub sectors: BTreeMap<String, f32>,
}

impl HeatLaborConfig {
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}
