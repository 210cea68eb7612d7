//! Export texte : une ligne `id<TAB>WKT` par bâtiment

use std::io::Write;
use std::ops::ControlFlow;

use anyhow::Result;
use citygml::DocumentSource;
use tracing::warn;

use super::ExportSummary;
use crate::pipeline::convert_document;
use crate::reproject::TargetSystem;

/// Écrit les bâtiments reprojetés, dans l'ordre du document
pub fn write_wkt<W: Write>(
    source: &DocumentSource,
    target: &TargetSystem,
    epsg: Option<&str>,
    writer: &mut W,
) -> Result<ExportSummary> {
    let mut summary = ExportSummary::new(&source.name());
    let mut write_error = None;

    convert_document(source, target, epsg, |result| match result {
        Ok(node) => match writeln!(writer, "{}\t{}", node.id, node.geometry) {
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
        },
        Err(e) => {
            warn!(document = %summary.document, "Skipping {}", e);
            summary.failed += 1;
            ControlFlow::Continue(())
        }
    })?;

    if let Some(e) = write_error {
        return Err(anyhow::Error::new(e)
            .context(format!("Failed to write WKT for {}", summary.document)));
    }
    writer.flush()?;

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOCUMENT: &str = r#"<CityModel>
      <cityObjectMember><Building id="A"><lod0FootPrint><MultiSurface><surfaceMember>
        <Polygon><exterior><LinearRing>
          <pos>500000 0 12.5</pos><pos>500000 0 12.5</pos>
        </LinearRing></exterior></Polygon>
      </surfaceMember></MultiSurface></lod0FootPrint></Building></cityObjectMember>
      <cityObjectMember><Building id="B"/></cityObjectMember>
    </CityModel>"#;

    #[test]
    fn test_write_wkt_lines() {
        let source = DocumentSource::Memory {
            name: "utm.gml".into(),
            data: DOCUMENT.as_bytes().to_vec(),
        };
        let target = TargetSystem::wgs84();
        let mut buffer = Vec::new();

        // Origine de la zone UTM 31N : équateur, méridien 3°E
        let summary = write_wkt(&source, &target, Some("EPSG:32631"), &mut buffer).unwrap();
        assert_eq!(summary.features, 2);
        assert_eq!(summary.empty_geometry, 1);

        let text = String::from_utf8(buffer).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "A\tMULTIPOLYGON(((3.000000 0.000000, 3.000000 0.000000)))",
                "B\tMULTIPOLYGON()",
            ]
        );
    }

    #[test]
    fn test_unknown_crs_fails_document() {
        let source = DocumentSource::Memory {
            name: "utm.gml".into(),
            data: DOCUMENT.as_bytes().to_vec(),
        };
        let target = TargetSystem::wgs84();
        let mut buffer = Vec::new();

        assert!(write_wkt(&source, &target, Some("not-a-crs"), &mut buffer).is_err());
    }
}
