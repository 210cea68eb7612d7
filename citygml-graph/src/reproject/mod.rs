//! Reprojection des géométries WKT vers WGS84 (EPSG:4326)
//!
//! Projections sources en Rust pur :
//! - Lambert 93 (EPSG:2154) et coniques conformes CC42 à CC50 (EPSG:3942 à 3950)
//! - UTM WGS84 (EPSG:326xx, 327xx) et ETRS89 (EPSG:25828 à 25838)
//! - Web Mercator (EPSG:3857)
//! - Systèmes géographiques WGS84, ETRS89, RGF93 (EPSG:4326, 4258, 4171)
//!
//! Les autres codes passent par PROJ avec la feature `reproject`.

pub mod ellipsoid;
mod lambert;
mod mercator;
#[cfg(feature = "reproject")]
mod proj_backend;
pub mod registry;
mod smart;
mod utm;
mod wkt;

pub use lambert::LambertConformal;
pub use registry::parse_epsg;
pub use smart::SmartProjection;
pub use utm::Utm;
pub use wkt::{split_rings, WktReprojector};

use std::fmt::Write;

use thiserror::Error;

/// Erreurs de reprojection
#[derive(Debug, Error)]
pub enum ReprojectError {
    /// Identifiant de CRS illisible ou code non supporté
    #[error("unknown CRS: {0}")]
    UnknownCrs(String),

    /// Échec d'initialisation de PROJ pour un code connu
    #[error("failed to set up projection EPSG:{code}: {reason}")]
    ProjectionSetup { code: u32, reason: String },

    /// Structure `MULTIPOLYGON` invalide
    #[error("malformed MULTIPOLYGON: {0}")]
    MalformedWkt(String),

    /// Jeton de coordonnées qui ne se lit pas comme deux nombres
    #[error("invalid coordinate token '{token}'")]
    InvalidToken { token: String },

    /// Transformation impossible ou non finie
    #[error("cannot transform '{token}': {reason}")]
    Transform { token: String, reason: String },
}

/// Point en coordonnées géographiques (radians)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Geographic {
    /// Longitude en radians
    pub lon: f64,
    /// Latitude en radians
    pub lat: f64,
}

impl Geographic {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self { lon, lat }
    }

    /// Convertit en degrés
    pub fn to_degrees(self) -> (f64, f64) {
        (self.lon.to_degrees(), self.lat.to_degrees())
    }

    /// Crée depuis des degrés
    pub fn from_degrees(lon_deg: f64, lat_deg: f64) -> Self {
        Self {
            lon: lon_deg.to_radians(),
            lat: lat_deg.to_radians(),
        }
    }

    pub fn is_finite(&self) -> bool {
        self.lon.is_finite() && self.lat.is_finite()
    }
}

/// Projection d'un système source vers le géographique
pub trait SourceProjection {
    /// Convertit (x, y) du système source en longitude/latitude (radians)
    fn to_geographic(&self, x: f64, y: f64) -> Result<Geographic, ReprojectError>;

    /// Description courte, pour les logs
    fn description(&self) -> String;
}

/// Système cible : WGS84 en degrés, précision fixe
///
/// Construit une fois et partagé par référence entre les reprojecteurs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSystem {
    epsg: u32,
    decimals: usize,
}

impl TargetSystem {
    /// WGS84 (EPSG:4326), 6 décimales
    pub fn wgs84() -> Self {
        Self {
            epsg: 4326,
            decimals: 6,
        }
    }

    pub fn epsg(&self) -> u32 {
        self.epsg
    }

    /// Écrit `lon lat` en degrés avec la précision du système
    pub fn write_point(&self, out: &mut String, geo: Geographic) {
        let (lon, lat) = geo.to_degrees();
        // `write!` sur un String ne peut pas échouer
        let _ = write!(
            out,
            "{:.prec$} {:.prec$}",
            self.clean_zero(lon),
            self.clean_zero(lat),
            prec = self.decimals
        );
    }

    /// Variante allouée de `write_point`
    pub fn format(&self, geo: Geographic) -> String {
        let mut out = String::with_capacity(24);
        self.write_point(&mut out, geo);
        out
    }

    /// Évite `-0.000000` pour les valeurs arrondies à zéro
    fn clean_zero(&self, value: f64) -> f64 {
        let half_ulp = 0.5 * 10f64.powi(-(self.decimals as i32));
        if value.abs() < half_ulp {
            0.0
        } else {
            value
        }
    }
}

impl Default for TargetSystem {
    fn default() -> Self {
        Self::wgs84()
    }
}
