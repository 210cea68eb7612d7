//! Définitions des ellipsoïdes

/// Ellipsoïde de référence
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    /// Demi-grand axe (rayon équatorial) en mètres
    pub a: f64,
    /// Aplatissement
    pub f: f64,
    /// Première excentricité
    pub e: f64,
}

impl Ellipsoid {
    /// WGS84 (UTM 326xx / 327xx)
    pub const WGS84: Self = Self {
        a: 6378137.0,
        f: 1.0 / 298.257223563,
        e: 0.0818191908426215, // sqrt(E2)
    };

    /// GRS80 (RGF93, ETRS89)
    /// Note: quasi identique à WGS84, différence < 0.1mm
    pub const GRS80: Self = Self {
        a: 6378137.0,
        f: 1.0 / 298.257222101,
        e: 0.0818191910428158, // sqrt(E2)
    };

    /// Première excentricité au carré
    pub fn e2(&self) -> f64 {
        2.0 * self.f - self.f * self.f
    }

    /// Deuxième excentricité au carré
    pub fn ep2(&self) -> f64 {
        self.e2() / (1.0 - self.e2())
    }

    /// Grande normale à la latitude donnée
    pub fn normal_radius(&self, lat: f64) -> f64 {
        self.a / (1.0 - self.e2() * lat.sin().powi(2)).sqrt()
    }
}
