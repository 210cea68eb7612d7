//! Stockage des nœuds (PostGIS, mémoire) et exports fichiers (GeoJSON, WKT)

pub mod geojson;
pub mod memory;
pub mod postgres;
pub mod text;

pub use memory::MemoryNodeStore;
pub use postgres::{PgNodeStore, PgSettings, TlsMode};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::pipeline::BuildingNode;
use crate::reproject::split_rings;

/// Points d'un anneau fermé valide pour PostGIS
const MIN_RING_POINTS: usize = 4;

/// Stockage de nœuds géolocalisés avec couche spatiale
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Crée (ou met à jour) le nœud et lui ajoute le label
    async fn create_node(&self, node: &BuildingNode, label: &str) -> Result<()>;

    /// Inscrit la géométrie du nœud dans la couche spatiale
    ///
    /// Idempotent. Retourne `false` si le nœud n'a rien d'indexable (voir
    /// [`indexable_geometry`]) ou est déjà inscrit avec la même géométrie.
    async fn add_spatial_index(&self, id: &str, layer: &str) -> Result<bool>;
}

/// Géométrie inscrite dans la couche spatiale, commune à tous les stockages
///
/// Le WKT du nœud reste tel quel ; seule la couche reçoit cette version.
/// Un anneau ouvert est refermé sur son premier point. Un anneau qui compte
/// moins de quatre points une fois fermé, `(())` compris, est écarté.
/// `None` si aucun anneau ne reste.
pub fn indexable_geometry(wkt: &str) -> Option<String> {
    let rings = match split_rings(wkt) {
        Ok(rings) => rings,
        Err(e) => {
            debug!(error = %e, "Geometry not indexable");
            return None;
        }
    };

    let mut out = String::with_capacity(wkt.len() + 32);
    let mut kept = 0usize;
    for ring in rings {
        let mut points: Vec<&str> = ring
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let opening = match (points.first(), points.last()) {
            (Some(&first), Some(&last)) if first != last => Some(first),
            _ => None,
        };
        if let Some(first) = opening {
            points.push(first);
        }
        if points.len() < MIN_RING_POINTS {
            continue;
        }

        out.push_str(if kept == 0 { "MULTIPOLYGON(((" } else { ", ((" });
        out.push_str(&points.join(", "));
        out.push_str("))");
        kept += 1;
    }

    if kept == 0 {
        return None;
    }
    out.push(')');
    Some(out)
}

/// Bilan d'un export fichier (GeoJSON ou WKT)
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    pub document: String,
    /// Bâtiments écrits
    pub features: usize,
    /// Dont sans géométrie
    pub empty_geometry: usize,
    /// Bâtiments ignorés (reprojection impossible)
    pub failed: usize,
}

impl ExportSummary {
    pub fn new(document: &str) -> Self {
        Self {
            document: document.to_string(),
            ..Default::default()
        }
    }
}
