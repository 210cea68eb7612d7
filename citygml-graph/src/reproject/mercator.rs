//! Projection Web Mercator (EPSG:3857), inverse
//!
//! Aussi connu sous le nom de Pseudo-Mercator ou Spherical Mercator.

use super::ellipsoid::Ellipsoid;
use super::{Geographic, ReprojectError};

/// Convertit Web Mercator vers coordonnées géographiques
pub fn web_mercator_to_geographic(x: f64, y: f64) -> Result<Geographic, ReprojectError> {
    // Modèle sphérique de rayon équatorial
    let r = Ellipsoid::WGS84.a;

    let lon = x / r;
    let lat = 2.0 * (y / r).exp().atan() - std::f64::consts::FRAC_PI_2;

    Ok(Geographic::new(lon, lat))
}
