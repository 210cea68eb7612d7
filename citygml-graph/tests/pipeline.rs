//! Tests de bout en bout : document CityGML → nœuds en mémoire

use std::sync::Arc;

use citygml::DocumentSource;
use citygml_graph::export::MemoryNodeStore;
use citygml_graph::pipeline::DocumentOutcome;
use citygml_graph::report::{ConversionReport, ConversionStatus, FailureStage};
use citygml_graph::{
    store_document, store_documents, FailurePolicy, PipelineOptions, TargetSystem,
};

fn footprint(id: &str, pos_list: &str) -> String {
    format!(
        r#"<core:cityObjectMember><bldg:Building gml:id="{id}">
          <bldg:lod0FootPrint><gml:MultiSurface><gml:surfaceMember><gml:Polygon>
            <gml:exterior><gml:LinearRing>
              <gml:posList srsDimension="3">{pos_list}</gml:posList>
            </gml:LinearRing></gml:exterior>
          </gml:Polygon></gml:surfaceMember></gml:MultiSurface></bldg:lod0FootPrint>
        </bldg:Building></core:cityObjectMember>"#
    )
}

fn document(srs_name: Option<&str>, members: &[String]) -> String {
    let envelope = srs_name
        .map(|srs| format!(r#"<gml:boundedBy><gml:Envelope srsName="{srs}"/></gml:boundedBy>"#))
        .unwrap_or_default();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
    xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
    xmlns:gml="http://www.opengis.net/gml">
  {envelope}
  {}
</core:CityModel>"#,
        members.concat()
    )
}

/// Trois bâtiments à Munich (ETRS89 / UTM 32N), le deuxième illisible
fn munich(srs_name: Option<&str>) -> String {
    document(
        srs_name,
        &[
            footprint(
                "DEBY_1",
                "691600 5334750 520 691610 5334750 520 691610 5334760 520 691600 5334750 520",
            ),
            footprint("DEBY_2", "691600 5334750 520 691610 north 520"),
            footprint(
                "DEBY_3",
                "691700 5334850 520 691710 5334850 520 691710 5334860 520 691700 5334850 520",
            ),
        ],
    )
}

fn source(name: &str, xml: String) -> DocumentSource {
    DocumentSource::Memory {
        name: name.to_string(),
        data: xml.into_bytes(),
    }
}

fn options(epsg: Option<&str>, failure_policy: FailurePolicy) -> PipelineOptions {
    PipelineOptions {
        epsg: epsg.map(str::to_string),
        label: "Building".to_string(),
        layer: "buildings".to_string(),
        failure_policy,
    }
}

async fn run(
    source: DocumentSource,
    store: &MemoryNodeStore,
    options: &PipelineOptions,
) -> DocumentOutcome {
    store_document(source, store, Arc::new(TargetSystem::wgs84()), options).await
}

/// Premier point du premier anneau, en degrés
fn first_point(geometry: &str) -> (f64, f64) {
    let body = geometry.trim_start_matches("MULTIPOLYGON(((");
    let first = body.split(',').next().unwrap();
    let mut fields = first.split_whitespace();
    let lon = fields.next().unwrap().parse().unwrap();
    let lat = fields.next().unwrap().trim_end_matches(')').parse().unwrap();
    (lon, lat)
}

#[tokio::test]
async fn test_continue_after_failed_building() {
    let store = MemoryNodeStore::new();
    let outcome = run(
        source("munich.gml", munich(Some("urn:ogc:def:crs:EPSG::25832"))),
        &store,
        &options(None, FailurePolicy::Continue),
    )
    .await;

    assert_eq!(outcome.buildings, 3);
    assert_eq!(outcome.converted, 2);
    assert_eq!(outcome.stored, 2);
    assert_eq!(outcome.indexed, 2);
    assert!(!outcome.halted);
    assert!(outcome.error.is_none());

    assert_eq!(outcome.failures.len(), 1);
    let failure = &outcome.failures[0];
    assert_eq!(failure.building_id.as_deref(), Some("DEBY_2"));
    assert_eq!(failure.stage, FailureStage::Reproject);
    assert!(failure.message.contains("691610 north"), "{}", failure.message);

    assert!(store.node("DEBY_2").is_none());
    assert_eq!(store.layer("buildings"), ["DEBY_1", "DEBY_3"]);
}

#[tokio::test]
async fn test_srs_name_fallback_reprojects_to_wgs84() {
    let store = MemoryNodeStore::new();
    run(
        source("munich.gml", munich(Some("EPSG:25832"))),
        &store,
        &options(None, FailurePolicy::Continue),
    )
    .await;

    let node = store.node("DEBY_1").unwrap();
    assert_eq!(node.labels, ["Building"]);

    let (lon, lat) = first_point(&node.geometry);
    assert!((lon - 11.5754).abs() < 1e-3, "lon = {}", lon);
    assert!((lat - 48.1371).abs() < 1e-3, "lat = {}", lat);
}

#[tokio::test]
async fn test_halt_stops_at_first_failure() {
    let store = MemoryNodeStore::new();
    let outcome = run(
        source("munich.gml", munich(None)),
        &store,
        &options(Some("25832"), FailurePolicy::Halt),
    )
    .await;

    assert!(outcome.halted);
    assert_eq!(outcome.stored, 1);
    assert_eq!(outcome.failures.len(), 1);
    assert!(store.node("DEBY_3").is_none());

    let mut report = ConversionReport::new("munich.gml");
    report.record_document(outcome);
    report.finalize();
    assert_eq!(report.status, ConversionStatus::Failed);
}

#[tokio::test]
async fn test_missing_crs_fails_document() {
    let store = MemoryNodeStore::new();
    let outcome = run(
        source("munich.gml", munich(None)),
        &store,
        &options(None, FailurePolicy::Continue),
    )
    .await;

    assert!(outcome.error.is_some());
    assert_eq!(outcome.stored, 0);
    assert_eq!(store.node_count(), 0);

    let mut report = ConversionReport::new("munich.gml");
    report.record_document(outcome);
    report.finalize();
    assert_eq!(report.documents_failed, 1);
    assert_eq!(report.status, ConversionStatus::Failed);
}

#[tokio::test]
async fn test_building_without_geometry_is_stored() {
    let store = MemoryNodeStore::new();
    let xml = document(
        Some("EPSG:2154"),
        &[r#"<core:cityObjectMember><bldg:Building gml:id="EMPTY"/></core:cityObjectMember>"#
            .to_string()],
    );

    let outcome = run(source("empty.gml", xml), &store, &options(None, FailurePolicy::Continue)).await;
    assert_eq!(outcome.stored, 1);
    assert_eq!(outcome.indexed, 0);
    assert_eq!(outcome.empty_geometry, 1);

    assert_eq!(store.node("EMPTY").unwrap().geometry, "MULTIPOLYGON()");
    assert!(store.layer("buildings").is_empty());
}

#[tokio::test]
async fn test_documents_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.gml"), munich(Some("EPSG:25832"))).unwrap();
    std::fs::write(
        dir.path().join("b.xml"),
        document(
            Some("EPSG:2154"),
            &[footprint("L93", "700000 6600000 0 700010 6600000 0 700000 6600000 0")],
        ),
    )
    .unwrap();

    let store = MemoryNodeStore::new();
    let mut report = ConversionReport::new(&dir.path().display().to_string());
    for source in citygml::open(dir.path()).unwrap() {
        let outcome = run(source, &store, &options(None, FailurePolicy::Continue)).await;
        report.record_document(outcome);
    }
    report.finalize();

    assert_eq!(report.documents_processed, 2);
    assert_eq!(report.buildings_seen, 4);
    assert_eq!(report.buildings_stored, 3);
    assert_eq!(report.status, ConversionStatus::PartialSuccess);

    // Origine Lambert 93 : 3°E, 46.5°N
    let (lon, lat) = first_point(&store.node("L93").unwrap().geometry);
    assert!((lon - 3.0).abs() < 1e-6);
    assert!((lat - 46.5).abs() < 1e-6);
}

/// Bâtiment dont l'anneau est écrit avec `<gml:coordinates>`
fn coordinates_footprint(id: &str, ring: &str) -> String {
    format!(
        r#"<core:cityObjectMember><bldg:Building gml:id="{id}">
          <bldg:lod0FootPrint><gml:MultiSurface><gml:surfaceMember><gml:Polygon>
            <gml:exterior>{ring}</gml:exterior>
          </gml:Polygon></gml:surfaceMember></gml:MultiSurface></bldg:lod0FootPrint>
        </bldg:Building></core:cityObjectMember>"#
    )
}

#[tokio::test]
async fn test_unclosable_rings_are_stored_not_indexed() {
    let store = MemoryNodeStore::new();
    let xml = document(
        Some("EPSG:4326"),
        &[
            coordinates_footprint(
                "S3",
                "<gml:LinearRing><gml:coordinates>1.0,2.0 3.0,4.0</gml:coordinates></gml:LinearRing>",
            ),
            coordinates_footprint("DEG", "<gml:LinearRing/>"),
            coordinates_footprint(
                "OPEN",
                "<gml:LinearRing><gml:coordinates>1.0,2.0 3.0,2.0 3.0,4.0</gml:coordinates></gml:LinearRing>",
            ),
        ],
    );

    let outcome = run(source("rings.gml", xml), &store, &options(None, FailurePolicy::Halt)).await;
    assert!(!outcome.halted);
    assert!(outcome.failures.is_empty(), "{:?}", outcome.failures);
    assert_eq!(outcome.stored, 3);
    assert_eq!(outcome.indexed, 1);

    assert_eq!(
        store.node("S3").unwrap().geometry,
        "MULTIPOLYGON(((1.000000 2.000000, 3.000000 4.000000)))"
    );
    assert_eq!(store.node("DEG").unwrap().geometry, "MULTIPOLYGON((()))");
    assert_eq!(store.layer("buildings"), ["OPEN"]);
    assert_eq!(
        store.indexed_geometry("buildings", "OPEN").as_deref(),
        Some("MULTIPOLYGON(((1.000000 2.000000, 3.000000 2.000000, 3.000000 4.000000, 1.000000 2.000000)))")
    );
}

/// Deux bâtiments valides, identifiants distincts de `munich`
fn healthy() -> String {
    document(
        None,
        &[
            footprint(
                "GOOD_1",
                "691800 5334950 520 691810 5334950 520 691810 5334960 520 691800 5334950 520",
            ),
            footprint(
                "GOOD_2",
                "691900 5335050 520 691910 5335050 520 691910 5335060 520 691900 5335050 520",
            ),
        ],
    )
}

#[tokio::test]
async fn test_halt_stops_starting_documents() {
    let store = MemoryNodeStore::new();
    let mut report = ConversionReport::new("batch");

    store_documents(
        vec![source("munich.gml", munich(None)), source("healthy.gml", healthy())],
        &store,
        Arc::new(TargetSystem::wgs84()),
        &options(Some("25832"), FailurePolicy::Halt),
        1,
        &mut report,
    )
    .await;
    report.finalize();

    assert!(report.halted);
    assert_eq!(report.documents_processed, 1);
    assert_eq!(report.documents_skipped, 1);
    assert_eq!(report.buildings_stored, 1);
    assert_eq!(store.node_count(), 1);
    assert!(store.node("GOOD_1").is_none());
    assert_eq!(report.status, ConversionStatus::Failed);
}

#[tokio::test]
async fn test_halt_counts_documents_in_progress() {
    let store = MemoryNodeStore::new();
    let mut report = ConversionReport::new("batch");

    store_documents(
        vec![source("munich.gml", munich(None)), source("healthy.gml", healthy())],
        &store,
        Arc::new(TargetSystem::wgs84()),
        &options(Some("25832"), FailurePolicy::Halt),
        2,
        &mut report,
    )
    .await;

    // Les deux documents démarrent ensemble : le second va à son terme
    assert!(report.halted);
    assert_eq!(report.documents_processed + report.documents_skipped, 2);
    assert_eq!(report.buildings_stored, store.node_count());
    assert_eq!(report.buildings_indexed, store.layer("buildings").len());
}

#[tokio::test]
async fn test_continue_processes_every_document() {
    let store = MemoryNodeStore::new();
    let mut report = ConversionReport::new("batch");

    store_documents(
        vec![source("munich.gml", munich(None)), source("healthy.gml", healthy())],
        &store,
        Arc::new(TargetSystem::wgs84()),
        &options(Some("25832"), FailurePolicy::Continue),
        2,
        &mut report,
    )
    .await;
    report.finalize();

    assert!(!report.halted);
    assert_eq!(report.documents_processed, 2);
    assert_eq!(report.documents_skipped, 0);
    assert_eq!(report.buildings_stored, 4);
    assert_eq!(store.node_count(), 4);
    assert_eq!(report.status, ConversionStatus::PartialSuccess);
}
