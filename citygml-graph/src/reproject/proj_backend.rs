//! Repli sur PROJ pour les codes EPSG sans projection en Rust pur
//!
//! Ce module est disponible uniquement avec la feature `reproject`.

use proj::Proj;

use super::{Geographic, ReprojectError, SourceProjection};

/// Transformation PROJ vers EPSG:4326 (ordre lon/lat, degrés)
pub struct ProjBackend {
    proj: Proj,
    code: u32,
}

impl ProjBackend {
    pub fn new(code: u32) -> Result<Self, ReprojectError> {
        let source = format!("EPSG:{}", code);
        let proj = Proj::new_known_crs(&source, "EPSG:4326", None).map_err(|e| {
            ReprojectError::ProjectionSetup {
                code,
                reason: e.to_string(),
            }
        })?;

        Ok(Self { proj, code })
    }
}

impl SourceProjection for ProjBackend {
    fn to_geographic(&self, x: f64, y: f64) -> Result<Geographic, ReprojectError> {
        let (lon, lat) = self
            .proj
            .convert((x, y))
            .map_err(|e| ReprojectError::Transform {
                token: format!("{} {}", x, y),
                reason: e.to_string(),
            })?;

        Ok(Geographic::from_degrees(lon, lat))
    }

    fn description(&self) -> String {
        format!("proj (EPSG:{})", self.code)
    }
}
