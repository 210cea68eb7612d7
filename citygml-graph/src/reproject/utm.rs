//! Projection UTM (Universal Transverse Mercator), inverse
//!
//! Toutes les zones WGS84 (EPSG:326xx nord, 327xx sud) et ETRS89
//! (EPSG:25828 à 25838).

use super::ellipsoid::Ellipsoid;
use super::{Geographic, ReprojectError};

/// Facteur d'échelle
const K0: f64 = 0.9996;
/// False easting
const FALSE_EASTING: f64 = 500000.0;
/// False northing dans l'hémisphère sud
const SOUTH_FALSE_NORTHING: f64 = 10000000.0;

/// Zone UTM
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Utm {
    pub zone: u32,
    pub south: bool,
    pub ellipsoid: Ellipsoid,
}

impl Utm {
    pub fn new(zone: u32, south: bool, ellipsoid: Ellipsoid) -> Option<Self> {
        (1..=60).contains(&zone).then_some(Self {
            zone,
            south,
            ellipsoid,
        })
    }

    /// Longitude du méridien central, en radians
    pub fn central_meridian(&self) -> f64 {
        ((self.zone as f64 - 1.0) * 6.0 - 180.0 + 3.0).to_radians()
    }

    /// Projection inverse : (x, y) → géographique
    pub fn to_geographic(&self, x: f64, y: f64) -> Result<Geographic, ReprojectError> {
        let a = self.ellipsoid.a;
        let e2 = self.ellipsoid.e2();
        let ep2 = self.ellipsoid.ep2();

        let y0 = if self.south { SOUTH_FALSE_NORTHING } else { 0.0 };
        let x = x - FALSE_EASTING;
        let y = y - y0;

        // Latitude d'empreinte
        let m = y / K0;
        let mu = m / (a * (1.0 - e2 / 4.0 - 3.0 * e2.powi(2) / 64.0 - 5.0 * e2.powi(3) / 256.0));

        let e1 = (1.0 - (1.0 - e2).sqrt()) / (1.0 + (1.0 - e2).sqrt());

        let phi1 = mu
            + (3.0 * e1 / 2.0 - 27.0 * e1.powi(3) / 32.0) * (2.0 * mu).sin()
            + (21.0 * e1.powi(2) / 16.0 - 55.0 * e1.powi(4) / 32.0) * (4.0 * mu).sin()
            + (151.0 * e1.powi(3) / 96.0) * (6.0 * mu).sin()
            + (1097.0 * e1.powi(4) / 512.0) * (8.0 * mu).sin();

        let sin_phi1 = phi1.sin();
        let cos_phi1 = phi1.cos();
        let tan_phi1 = phi1.tan();

        let n1 = a / (1.0 - e2 * sin_phi1.powi(2)).sqrt();
        let t1 = tan_phi1.powi(2);
        let c1 = ep2 * cos_phi1.powi(2);
        let r1 = a * (1.0 - e2) / (1.0 - e2 * sin_phi1.powi(2)).powf(1.5);
        let d = x / (n1 * K0);

        let lat = phi1
            - (n1 * tan_phi1 / r1)
                * (d.powi(2) / 2.0
                    - (5.0 + 3.0 * t1 + 10.0 * c1 - 4.0 * c1.powi(2) - 9.0 * ep2) * d.powi(4)
                        / 24.0
                    + (61.0 + 90.0 * t1 + 298.0 * c1 + 45.0 * t1.powi(2)
                        - 252.0 * ep2
                        - 3.0 * c1.powi(2))
                        * d.powi(6)
                        / 720.0);

        let lon = self.central_meridian()
            + (d - (1.0 + 2.0 * t1 + c1) * d.powi(3) / 6.0
                + (5.0 - 2.0 * c1 + 28.0 * t1 - 3.0 * c1.powi(2) + 8.0 * ep2 + 24.0 * t1.powi(2))
                    * d.powi(5)
                    / 120.0)
                / cos_phi1;

        Ok(Geographic::new(lon, lat))
    }
}
