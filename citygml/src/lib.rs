//! # citygml
//!
//! Lecture en flux des bâtiments CityGML et encodage de leur géométrie en WKT.
//!
//! ## Features
//!
//! - Lecture streaming avec `quick-xml` (un `Building` en mémoire à la fois)
//! - Entrées `.gml`, `.gml.bz2` et archives `.tar.bz2`
//! - Choix du meilleur niveau de détail (LOD0 → LOD4)
//! - Encodage `MULTIPOLYGON` des anneaux `gml:pos`, `gml:posList` et `gml:coordinates`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::path::Path;
//!
//! for document in citygml::open(Path::new("LoD2_32_690_5335.gml"))? {
//!     for building in document.buildings()? {
//!         let building = building?;
//!         println!("{}: {}", building.id, building.geometry_as_wkt());
//!     }
//! }
//! ```

pub mod archive;
pub mod error;
pub mod parser;
pub mod select;
pub mod types;
pub mod wkt;

pub use archive::{open, DocumentSource, InputKind};
pub use error::CityGmlError;
pub use parser::BuildingReader;
pub use select::select_geometry;
pub use types::{Building, Lod, RawRing, RingEncoding};
pub use wkt::{encode_multipolygon, EMPTY_MULTIPOLYGON};

/// Lit tous les bâtiments d'un document déjà en mémoire
///
/// # Errors
///
/// Retourne `CityGmlError::Xml` au premier élément mal formé.
pub fn parse_str(xml: &str) -> Result<Vec<Building>, CityGmlError> {
    BuildingReader::new(xml.as_bytes()).collect()
}
