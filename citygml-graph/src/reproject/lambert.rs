//! Projections coniques conformes de Lambert (2 parallèles standards)
//!
//! - Lambert 93 (EPSG:2154)
//! - Coniques conformes 9 zones CC42 à CC50 (EPSG:3942 à 3950)

use super::ellipsoid::Ellipsoid;
use super::{Geographic, ReprojectError};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

/// Lambert Conformal Conic, constantes précalculées
#[derive(Debug, Clone)]
pub struct LambertConformal {
    ellipsoid: Ellipsoid,
    /// Longitude origine
    lon0: f64,
    /// False easting
    x0: f64,
    /// False northing
    y0: f64,
    /// Exposant de la projection
    n: f64,
    /// Constante C
    c: f64,
    /// Rayon à l'origine
    r0: f64,
}

impl LambertConformal {
    /// Construit la projection à partir de ses paramètres en degrés
    pub fn new(
        ellipsoid: Ellipsoid,
        lon0_deg: f64,
        lat0_deg: f64,
        lat1_deg: f64,
        lat2_deg: f64,
        x0: f64,
        y0: f64,
    ) -> Self {
        let (lat0, lat1, lat2) = (
            lat0_deg.to_radians(),
            lat1_deg.to_radians(),
            lat2_deg.to_radians(),
        );
        let e = ellipsoid.e;

        let n1 = ellipsoid.normal_radius(lat1);
        let n2 = ellipsoid.normal_radius(lat2);

        let iso_lat0 = isometric_latitude(lat0, e);
        let iso_lat1 = isometric_latitude(lat1, e);
        let iso_lat2 = isometric_latitude(lat2, e);

        let n = ((n1 * lat1.cos()).ln() - (n2 * lat2.cos()).ln()) / (iso_lat2 - iso_lat1);
        let c = (n1 * lat1.cos() / n) * (n * iso_lat1).exp();
        let r0 = c * (-n * iso_lat0).exp();

        Self {
            ellipsoid,
            lon0: lon0_deg.to_radians(),
            x0,
            y0,
            n,
            c,
            r0,
        }
    }

    /// Lambert 93 (EPSG:2154)
    pub fn lambert93() -> Self {
        Self::new(Ellipsoid::GRS80, 3.0, 46.5, 44.0, 49.0, 700000.0, 6600000.0)
    }

    /// Zone conique conforme CC42 à CC50 (EPSG:3942 à 3950)
    pub fn conic_conformal_zone(zone: u32) -> Option<Self> {
        if !(42..=50).contains(&zone) {
            return None;
        }
        let lat0 = zone as f64;
        let y0 = (zone as f64 - 41.0) * 1_000_000.0 + 200_000.0;
        Some(Self::new(
            Ellipsoid::GRS80,
            3.0,
            lat0,
            lat0 - 0.75,
            lat0 + 0.75,
            1_700_000.0,
            y0,
        ))
    }

    /// Projection inverse : (x, y) → géographique
    pub fn to_geographic(&self, x: f64, y: f64) -> Result<Geographic, ReprojectError> {
        let dx = x - self.x0;
        let dy = y - self.y0;

        let r = (dx.powi(2) + (self.r0 - dy).powi(2)).sqrt();
        let r = if self.n < 0.0 { -r } else { r };
        let gamma = (dx / (self.r0 - dy)).atan();

        let iso_lat = -(r / self.c).ln() / self.n;
        let lat = latitude_from_isometric(iso_lat, self.ellipsoid.e);
        let lon = self.lon0 + gamma / self.n;

        Ok(Geographic::new(lon, lat))
    }
}

/// Calcule la latitude isométrique
fn isometric_latitude(lat: f64, e: f64) -> f64 {
    let sin_lat = lat.sin();
    let term = ((1.0 - e * sin_lat) / (1.0 + e * sin_lat)).powf(e / 2.0);
    ((FRAC_PI_4 + lat / 2.0).tan() * term).ln()
}

/// Calcule la latitude depuis la latitude isométrique (itératif)
fn latitude_from_isometric(iso_lat: f64, e: f64) -> f64 {
    let mut lat = 2.0 * iso_lat.exp().atan() - FRAC_PI_2;

    for _ in 0..10 {
        let sin_lat = lat.sin();
        let term = ((1.0 + e * sin_lat) / (1.0 - e * sin_lat)).powf(e / 2.0);
        let new_lat = 2.0 * (iso_lat.exp() * term).atan() - FRAC_PI_2;

        if (new_lat - lat).abs() < 1e-12 {
            return new_lat;
        }
        lat = new_lat;
    }
    lat
}
