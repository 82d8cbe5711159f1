//! Content profile supplied by an external analyzer

use serde::{Deserialize, Serialize};

/// Genre of the material being played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Genre {
    /// Classical/Orchestral
    Classical,
    /// Rock
    Rock,
    /// Metal
    Metal,
    /// Electronic/EDM
    Electronic,
    /// Pop
    Pop,
    /// Jazz
    Jazz,
    /// Hip-hop/Rap
    HipHop,
    /// Acoustic/Folk
    Acoustic,
    /// Podcast/Speech
    Speech,
    /// Unknown/Mixed
    #[default]
    Unknown,
}

impl Genre {
    /// Parse a free-form analyzer label; anything unrecognised is `Unknown`
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "classical" | "orchestral" => Genre::Classical,
            "rock" => Genre::Rock,
            "metal" | "heavy_metal" | "heavy metal" => Genre::Metal,
            "electronic" | "edm" | "dance" | "techno" | "house" => Genre::Electronic,
            "pop" => Genre::Pop,
            "jazz" => Genre::Jazz,
            "hiphop" | "hip_hop" | "hip-hop" | "hip hop" | "rap" => Genre::HipHop,
            "acoustic" | "folk" => Genre::Acoustic,
            "speech" | "podcast" | "spoken" => Genre::Speech,
            _ => Genre::Unknown,
        }
    }
}

/// Coarse loudness/energy class of the material
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnergyLevel {
    Low,
    #[default]
    Medium,
    High,
}

/// Caller-supplied summary of the audio character
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentProfile {
    pub genre: Genre,
    pub energy_level: EnergyLevel,
    /// Dynamic range (dB)
    pub dynamic_range: f64,
    /// Spectral centroid (Hz)
    pub spectral_centroid: f64,
}

impl Default for ContentProfile {
    fn default() -> Self {
        Self {
            genre: Genre::Unknown,
            energy_level: EnergyLevel::Medium,
            dynamic_range: 15.0,
            spectral_centroid: 2000.0,
        }
    }
}

impl ContentProfile {
    /// Profile for a genre with neutral energy/dynamics
    pub fn for_genre(genre: Genre) -> Self {
        Self {
            genre,
            ..Default::default()
        }
    }

    pub fn with_energy(mut self, level: EnergyLevel) -> Self {
        self.energy_level = level;
        self
    }

    pub fn with_dynamic_range(mut self, db: f64) -> Self {
        self.dynamic_range = db;
        self
    }

    pub fn with_centroid(mut self, hz: f64) -> Self {
        self.spectral_centroid = hz;
        self
    }
}
