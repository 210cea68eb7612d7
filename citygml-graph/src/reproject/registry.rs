//! Lecture des identifiants de CRS et table des projections en Rust pur

use std::sync::OnceLock;

use regex::Regex;

use super::ellipsoid::Ellipsoid;
use super::{LambertConformal, ReprojectError, Utm};

/// Projection source connue sans PROJ
#[derive(Debug, Clone)]
pub enum LiteProjection {
    /// Système géographique en degrés (x = longitude, y = latitude)
    Geographic,
    WebMercator,
    Lambert(LambertConformal),
    Utm(Utm),
}

/// `EPSG:25832`, `urn:ogc:def:crs:EPSG::25832`, `urn:ogc:def:crs:EPSG:6.12:25832`,
/// `http://www.opengis.net/def/crs/EPSG/0/25832`
fn epsg_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        // La variante versionnée `:6.12:` doit être essayée avant `:`
        Regex::new(r"(?i)(?:^|[:/,])EPSG(?::[0-9.]+:|::?|/[0-9.]+/)([0-9]+)")
            .expect("Invalid EPSG regex")
    })
}

/// Extrait le code EPSG d'un identifiant de CRS
///
/// Un code nu (`25832`) est accepté. Pour un CRS composé, le premier code
/// (horizontal) est retenu.
pub fn parse_epsg(identifier: &str) -> Result<u32, ReprojectError> {
    let trimmed = identifier.trim();
    let unknown = || ReprojectError::UnknownCrs(identifier.to_string());

    if !trimmed.is_empty() && trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return trimmed.parse().map_err(|_| unknown());
    }

    epsg_pattern()
        .captures(trimmed)
        .and_then(|caps| caps.get(1))
        .and_then(|code| code.as_str().parse().ok())
        .ok_or_else(unknown)
}

/// Projection en Rust pur pour un code EPSG, si elle existe
pub fn lite_projection(code: u32) -> Option<LiteProjection> {
    match code {
        4326 | 4258 | 4171 => Some(LiteProjection::Geographic),
        3857 => Some(LiteProjection::WebMercator),
        2154 => Some(LiteProjection::Lambert(LambertConformal::lambert93())),
        3942..=3950 => LambertConformal::conic_conformal_zone(code - 3900).map(LiteProjection::Lambert),
        32601..=32660 => Utm::new(code - 32600, false, Ellipsoid::WGS84).map(LiteProjection::Utm),
        32701..=32760 => Utm::new(code - 32700, true, Ellipsoid::WGS84).map(LiteProjection::Utm),
        25828..=25838 => Utm::new(code - 25800, false, Ellipsoid::GRS80).map(LiteProjection::Utm),
        _ => None,
    }
}
