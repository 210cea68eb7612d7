//! Configuration de l'import

use serde::{Deserialize, Serialize};
use std::path::Path;

use anyhow::{Context, Result};

use crate::pipeline::FailurePolicy;

/// Configuration principale
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Label porté par les nœuds créés
    pub label: String,

    /// Nom de la couche spatiale
    pub layer: String,

    /// Comportement après l'échec d'un bâtiment
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            label: "Building".to_string(),
            layer: "buildings".to_string(),
            failure_policy: FailurePolicy::Continue,
        }
    }
}

impl Config {
    /// Charge une configuration depuis un fichier
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config JSON")
    }

    /// Charge une configuration depuis un preset embarqué
    pub fn from_preset(preset: &str) -> Result<Self> {
        match preset {
            "default" => Self::load_embedded(include_str!("presets/default.json")),
            "strict" => Self::load_embedded(include_str!("presets/strict.json")),
            _ => anyhow::bail!("Unknown preset: {}. Use: default, strict", preset),
        }
    }

    /// Preset si le nom est connu, sinon chemin d'un fichier JSON
    pub fn resolve(spec: &str) -> Result<Self> {
        match spec {
            "default" | "strict" => Self::from_preset(spec),
            path => Self::load(Path::new(path)),
        }
    }

    fn load_embedded(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse embedded config")
    }
}
