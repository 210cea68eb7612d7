//! # citygml-graph
//!
//! Bâtiments CityGML convertis en nœuds géolocalisés : WKT `MULTIPOLYGON`
//! reprojeté en WGS84, stocké dans PostGIS avec une couche spatiale.
//!
//! ## Features
//!
//! - Reprojection Rust pur (Lambert 93, CC, UTM, Web Mercator), PROJ en secours
//! - Import dans PostgreSQL/PostGIS avec pool de connexions
//! - Export GeoJSON et WKT sans base de données
//! - Rapport de conversion JSON
//!
//! ## Usage CLI
//!
//! ```bash
//! # Import vers PostGIS, CRS lu dans le document
//! citygml-graph --path ./berlin/
//!
//! # CRS imposé, arrêt au premier échec
//! citygml-graph --path ./lyon.tar.bz2 --epsg 3946 --fail-fast
//!
//! # Export sans base de données
//! citygml-graph to-geojson --path ./tile.gml --output ./geojson/
//! citygml-graph to-wkt --path ./tile.gml.bz2 --epsg 25833
//! ```

pub mod config;
pub mod export;
pub mod pipeline;
pub mod report;
pub mod reproject;

pub use config::Config;
pub use export::{MemoryNodeStore, NodeStore, PgNodeStore, PgSettings};
pub use pipeline::{
    convert_building, store_document, store_documents, BuildingNode, FailurePolicy,
    PipelineOptions,
};
pub use report::{ConversionReport, ConversionStatus};
pub use reproject::{ReprojectError, TargetSystem, WktReprojector};
