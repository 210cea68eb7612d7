//! Choix de la projection source : Rust pur en priorité, repli sur PROJ

use tracing::debug;

use super::registry::{self, LiteProjection};
use super::{mercator, Geographic, ReprojectError, SourceProjection};

/// Projection source résolue depuis un identifiant de CRS
pub enum SmartProjection {
    /// Projection en Rust pur
    Lite { code: u32, projection: LiteProjection },
    /// Projection via PROJ (si feature activée)
    #[cfg(feature = "reproject")]
    Proj(super::proj_backend::ProjBackend),
}

impl SmartProjection {
    /// Résout un identifiant (`25832`, `EPSG:25832`, URN, URL OGC)
    pub fn from_identifier(identifier: &str) -> Result<Self, ReprojectError> {
        let code = registry::parse_epsg(identifier)?;
        Self::from_epsg(code)
    }

    pub fn from_epsg(code: u32) -> Result<Self, ReprojectError> {
        if let Some(projection) = registry::lite_projection(code) {
            debug!(epsg = code, "Using built-in projection");
            return Ok(Self::Lite { code, projection });
        }

        Self::fallback(code)
    }

    #[cfg(feature = "reproject")]
    fn fallback(code: u32) -> Result<Self, ReprojectError> {
        debug!(epsg = code, "Falling back to PROJ");
        Ok(Self::Proj(super::proj_backend::ProjBackend::new(code)?))
    }

    #[cfg(not(feature = "reproject"))]
    fn fallback(code: u32) -> Result<Self, ReprojectError> {
        Err(ReprojectError::UnknownCrs(format!(
            "EPSG:{} (built-in: 4326, 4258, 4171, 3857, 2154, 3942-3950, 326xx, 327xx, \
             25828-25838; build with --features reproject for PROJ)",
            code
        )))
    }
}

impl SourceProjection for SmartProjection {
    fn to_geographic(&self, x: f64, y: f64) -> Result<Geographic, ReprojectError> {
        match self {
            Self::Lite { projection, .. } => match projection {
                LiteProjection::Geographic => Ok(Geographic::from_degrees(x, y)),
                LiteProjection::WebMercator => mercator::web_mercator_to_geographic(x, y),
                LiteProjection::Lambert(lambert) => lambert.to_geographic(x, y),
                LiteProjection::Utm(utm) => utm.to_geographic(x, y),
            },
            #[cfg(feature = "reproject")]
            Self::Proj(backend) => backend.to_geographic(x, y),
        }
    }

    fn description(&self) -> String {
        match self {
            Self::Lite { code, .. } => format!("built-in (EPSG:{})", code),
            #[cfg(feature = "reproject")]
            Self::Proj(backend) => backend.description(),
        }
    }
}
