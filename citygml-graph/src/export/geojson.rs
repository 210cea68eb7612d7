//! Export GeoJSON en flux : une FeatureCollection par document

use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::ControlFlow;
use std::path::Path;

use anyhow::{Context, Result};
use citygml::{DocumentSource, EMPTY_MULTIPOLYGON};
use geozero::geojson::GeoJsonWriter;
use geozero::wkt::Wkt;
use geozero::GeozeroGeometry;
use tracing::{debug, warn};

use super::ExportSummary;
use crate::pipeline::{convert_document, BuildingNode};
use crate::reproject::TargetSystem;

/// Exporte les bâtiments d'un document dans un fichier GeoJSON
pub fn export_to_geojson(
    source: &DocumentSource,
    target: &TargetSystem,
    epsg: Option<&str>,
    output_path: &Path,
) -> Result<ExportSummary> {
    let file = File::create(output_path)
        .with_context(|| format!("Failed to create file: {}", output_path.display()))?;
    let mut writer = BufWriter::new(file);

    write_geojson(source, target, epsg, &mut writer)
}

/// Écrit la FeatureCollection au fil de la lecture du document
///
/// Un bâtiment dont la reprojection échoue est ignoré et compté dans
/// `failed`. Une géométrie vide ou illisible devient `null`.
pub fn write_geojson<W: Write>(
    source: &DocumentSource,
    target: &TargetSystem,
    epsg: Option<&str>,
    writer: &mut W,
) -> Result<ExportSummary> {
    let mut summary = ExportSummary::new(&source.name());
    let mut write_error = None;

    write!(
        writer,
        r#"{{"type":"FeatureCollection","crs":{{"type":"name","properties":{{"name":"urn:ogc:def:crs:EPSG::{}"}}}},"features":["#,
        target.epsg()
    )?;

    convert_document(source, target, epsg, |result| {
        let node = match result {
            Ok(node) => node,
            Err(e) => {
                warn!(document = %summary.document, "Skipping {}", e);
                summary.failed += 1;
                return ControlFlow::Continue(());
            }
        };

        match write_feature(writer, &node, summary.features == 0) {
            Ok(()) => {
                summary.features += 1;
                if !node.has_geometry() {
                    summary.empty_geometry += 1;
                }
                ControlFlow::Continue(())
            }
            Err(e) => {
                write_error = Some(e);
                ControlFlow::Break(())
            }
        }
    })?;

    if let Some(e) = write_error {
        return Err(e.context(format!("Failed to write GeoJSON for {}", summary.document)));
    }

    writer.write_all(b"]}")?;
    writer.flush()?;

    Ok(summary)
}

/// Écrit une feature : id, géométrie, propriétés
fn write_feature<W: Write>(writer: &mut W, node: &BuildingNode, first: bool) -> Result<()> {
    let id = serde_json::to_string(&node.id)?;

    if !first {
        writer.write_all(b",")?;
    }
    write!(writer, r#"{{"type":"Feature","id":{},"geometry":"#, id)?;
    match geometry_json(&node.geometry) {
        Some(geometry) => writer.write_all(&geometry)?,
        None => writer.write_all(b"null")?,
    }
    write!(writer, r#","properties":{{"id":{}}}}}"#, id)?;

    Ok(())
}

/// Convertit le WKT en géométrie GeoJSON via geozero
fn geometry_json(wkt: &str) -> Option<Vec<u8>> {
    if wkt == EMPTY_MULTIPOLYGON {
        return None;
    }

    let mut buf = Vec::new();
    let processed = {
        let mut geojson = GeoJsonWriter::new(&mut buf);
        Wkt(wkt).process_geom(&mut geojson)
    };

    match processed {
        Ok(()) => Some(buf),
        Err(e) => {
            debug!("Geometry not representable in GeoJSON: {}", e);
            None
        }
    }
}
