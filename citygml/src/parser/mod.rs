//! Lecture en flux des bâtiments d'un document CityGML
//!
//! Le lecteur parcourt les événements `quick-xml` et ne matérialise qu'un
//! `Building` à la fois. Les préfixes de namespace sont ignorés : seuls les noms
//! locaux sont comparés.

pub mod path;

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use tracing::{debug, trace};

use crate::types::{Building, Lod, RawRing, RingEncoding};
use crate::CityGmlError;

/// Élément enfant d'un `LinearRing` dont on collecte le texte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RingField {
    Pos,
    PosList,
    Coordinates,
}

impl RingField {
    fn from_local_name(name: &str) -> Option<Self> {
        match name {
            "pos" => Some(Self::Pos),
            "posList" => Some(Self::PosList),
            "coordinates" => Some(Self::Coordinates),
            _ => None,
        }
    }
}

/// Anneau en cours de lecture
struct OpenRing {
    lod: Lod,
    /// Profondeur du `LinearRing` relativement au `Building`
    depth: usize,
    raw: RawRing,
    field: Option<(RingField, String)>,
}

/// Lecteur de bâtiments sur un flux XML
pub struct BuildingReader<R: BufRead> {
    reader: Reader<R>,
    srs_name: Option<String>,
    finished: bool,
}

impl<R: BufRead> BuildingReader<R> {
    pub fn new(inner: R) -> Self {
        let mut reader = Reader::from_reader(inner);
        reader.config_mut().trim_text(true);

        Self {
            reader,
            srs_name: None,
            finished: false,
        }
    }

    /// Premier `srsName` rencontré dans le document (souvent sur `gml:Envelope`)
    pub fn srs_name(&self) -> Option<&str> {
        self.srs_name.as_deref()
    }

    /// Lit le prochain bâtiment, `None` en fin de document
    pub fn next_building(&mut self) -> Result<Option<Building>, CityGmlError> {
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let event = self
                .reader
                .read_event_into(&mut buf)
                .map_err(|e| self.xml_error(e))?;

            match event {
                Event::Start(e) => {
                    self.capture_srs_name(&e);
                    if e.local_name().as_ref() == b"Building" {
                        let id = self.building_id(&e)?;
                        return self.read_building(id).map(Some);
                    }
                }
                Event::Empty(e) => {
                    self.capture_srs_name(&e);
                    if e.local_name().as_ref() == b"Building" {
                        let id = self.building_id(&e)?;
                        return Ok(Some(Building::new(id)));
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Lit le contenu d'un `Building` jusqu'à sa balise fermante
    fn read_building(&mut self, id: String) -> Result<Building, CityGmlError> {
        let mut building = Building::new(id);
        let mut ancestors: Vec<String> = Vec::new();
        let mut ring: Option<OpenRing> = None;
        let mut buf = Vec::new();

        loop {
            buf.clear();
            let event = self
                .reader
                .read_event_into(&mut buf)
                .map_err(|e| self.xml_error(e))?;

            match event {
                Event::Start(e) => {
                    self.capture_srs_name(&e);
                    let name = local_name(&e);

                    match ring.as_ref().map(|open| open.depth == ancestors.len()) {
                        // Enfant direct du LinearRing
                        Some(true) => {
                            if let Some(field) = RingField::from_local_name(&name) {
                                let dimension = match field {
                                    RingField::PosList => self.srs_dimension(&e),
                                    _ => None,
                                };
                                if let Some(open) = ring.as_mut() {
                                    if dimension.is_some() {
                                        open.raw.pos_list_dimension = dimension;
                                    }
                                    open.field = Some((field, String::new()));
                                }
                            }
                        }
                        Some(false) => {}
                        None => {
                            if name == "LinearRing" {
                                if let Some(lod) = path::ring_lod(&ancestors) {
                                    ring = Some(OpenRing {
                                        lod,
                                        depth: ancestors.len() + 1,
                                        raw: RawRing::default(),
                                        field: None,
                                    });
                                }
                            }
                        }
                    }

                    ancestors.push(name);
                }
                Event::Empty(e) => {
                    self.capture_srs_name(&e);
                    // `<gml:LinearRing/>` : anneau dégénéré
                    if ring.is_none() && e.local_name().as_ref() == b"LinearRing" {
                        if let Some(lod) = path::ring_lod(&ancestors) {
                            debug!(building = %building.id, lod = %lod, "Ring without coordinates");
                            building.push_ring(lod, RingEncoding::Empty);
                        }
                    }
                }
                Event::Text(t) => {
                    if let Some((_, text)) = ring.as_mut().and_then(|r| r.field.as_mut()) {
                        let unescaped = t.unescape().map_err(|e| self.xml_error(e))?;
                        text.push_str(&unescaped);
                    }
                }
                Event::CData(c) => {
                    if let Some((_, text)) = ring.as_mut().and_then(|r| r.field.as_mut()) {
                        text.push_str(&String::from_utf8_lossy(&c));
                    }
                }
                Event::End(_) => {
                    if ancestors.pop().is_none() {
                        // Fin du Building
                        trace!(building = %building.id, "Building read");
                        return Ok(building);
                    }

                    let closed_depth = ancestors.len();
                    let ring_depth = ring.as_ref().map(|open| open.depth);

                    if ring_depth == Some(closed_depth) {
                        if let Some(open) = ring.as_mut() {
                            if let Some((field, text)) = open.field.take() {
                                match field {
                                    RingField::Pos => open.raw.pos.push(text),
                                    RingField::PosList => open.raw.pos_list = Some(text),
                                    RingField::Coordinates => open.raw.coordinates = Some(text),
                                }
                            }
                        }
                    } else if ring_depth == Some(closed_depth + 1) {
                        if let Some(open) = ring.take() {
                            let lod = open.lod;
                            let encoding = RingEncoding::from(open.raw);
                            if encoding == RingEncoding::Empty {
                                debug!(building = %building.id, lod = %lod, "Ring without coordinates");
                            }
                            building.push_ring(lod, encoding);
                        }
                    }
                }
                Event::Eof => {
                    return Err(CityGmlError::xml(
                        self.byte_position(),
                        format!("unexpected end of document inside Building {}", building.id),
                    ));
                }
                _ => {}
            }
        }
    }

    /// Identifiant du bâtiment (`gml:id`, ou `id` sans préfixe)
    fn building_id(&self, e: &BytesStart) -> Result<String, CityGmlError> {
        for attr in e.attributes() {
            let attr =
                attr.map_err(|err| CityGmlError::xml(self.byte_position(), err.to_string()))?;
            if attr.key.local_name().as_ref() == b"id" {
                let value = attr.unescape_value().map_err(|err| self.xml_error(err))?;
                return Ok(value.into_owned());
            }
        }
        Ok(String::new())
    }

    fn srs_dimension(&self, e: &BytesStart) -> Option<usize> {
        e.attributes()
            .flatten()
            .find(|a| a.key.local_name().as_ref() == b"srsDimension")
            .and_then(|a| std::str::from_utf8(&a.value).ok()?.trim().parse().ok())
    }

    fn capture_srs_name(&mut self, e: &BytesStart) {
        if self.srs_name.is_some() {
            return;
        }
        let found = e
            .attributes()
            .flatten()
            .find(|a| a.key.local_name().as_ref() == b"srsName")
            .and_then(|a| a.unescape_value().ok().map(|v| v.trim().to_string()))
            .filter(|v| !v.is_empty());

        if let Some(srs) = found {
            debug!(srs = srs.as_str(), "Document reference system");
            self.srs_name = Some(srs);
        }
    }

    fn byte_position(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn xml_error(&self, err: quick_xml::Error) -> CityGmlError {
        CityGmlError::xml(self.byte_position(), err.to_string())
    }
}

impl<R: BufRead> Iterator for BuildingReader<R> {
    type Item = Result<Building, CityGmlError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_building() {
            Ok(Some(building)) => Some(Ok(building)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                // Le flux n'est plus fiable après une erreur XML
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

fn local_name(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(xml: &str) -> Vec<Building> {
        BuildingReader::new(xml.as_bytes())
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    const FOOTPRINT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<core:CityModel xmlns:core="http://www.opengis.net/citygml/2.0"
                xmlns:bldg="http://www.opengis.net/citygml/building/2.0"
                xmlns:gml="http://www.opengis.net/gml">
  <gml:boundedBy>
    <gml:Envelope srsName="urn:ogc:def:crs:EPSG::25832" srsDimension="3"/>
  </gml:boundedBy>
  <core:cityObjectMember>
    <bldg:Building gml:id="BLDG_1">
      <bldg:lod0FootPrint>
        <gml:MultiSurface>
          <gml:surfaceMember>
            <gml:Polygon>
              <gml:exterior>
                <gml:LinearRing>
                  <gml:pos>1.0 2.0 0.0</gml:pos>
                  <gml:pos>3.0   4.0 0.0</gml:pos>
                  <gml:pos>1.0 2.0 0.0</gml:pos>
                </gml:LinearRing>
              </gml:exterior>
              <gml:interior>
                <gml:LinearRing>
                  <gml:pos>9 9 9</gml:pos>
                </gml:LinearRing>
              </gml:interior>
            </gml:Polygon>
          </gml:surfaceMember>
        </gml:MultiSurface>
      </bldg:lod0FootPrint>
    </bldg:Building>
  </core:cityObjectMember>
  <core:cityObjectMember>
    <bldg:Building gml:id="BLDG_2">
      <bldg:boundedBy>
        <bldg:GroundSurface>
          <bldg:lod2MultiSurface>
            <gml:MultiSurface>
              <gml:surfaceMember>
                <gml:Polygon>
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:posList srsDimension="3">5 6 0 7 8 0 5 6 0</gml:posList>
                    </gml:LinearRing>
                  </gml:exterior>
                </gml:Polygon>
              </gml:surfaceMember>
            </gml:MultiSurface>
          </bldg:lod2MultiSurface>
        </bldg:GroundSurface>
      </bldg:boundedBy>
      <bldg:boundedBy>
        <bldg:RoofSurface>
          <bldg:lod2MultiSurface>
            <gml:MultiSurface>
              <gml:surfaceMember>
                <gml:Polygon>
                  <gml:exterior>
                    <gml:LinearRing>
                      <gml:posList>100 100 9 101 101 9</gml:posList>
                    </gml:LinearRing>
                  </gml:exterior>
                </gml:Polygon>
              </gml:surfaceMember>
            </gml:MultiSurface>
          </bldg:lod2MultiSurface>
        </bldg:RoofSurface>
      </bldg:boundedBy>
    </bldg:Building>
  </core:cityObjectMember>
  <core:cityObjectMember>
    <bldg:Building gml:id="BLDG_3"/>
  </core:cityObjectMember>
</core:CityModel>"#;

    #[test]
    fn test_reads_buildings_in_order() {
        let buildings = read_all(FOOTPRINT);
        let ids: Vec<&str> = buildings.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, ["BLDG_1", "BLDG_2", "BLDG_3"]);
    }

    #[test]
    fn test_lod0_exterior_only() {
        let buildings = read_all(FOOTPRINT);
        let rings = buildings[0].lod(Lod::Lod0);
        assert_eq!(rings.len(), 1);
        assert_eq!(
            rings[0],
            RingEncoding::Pos(vec![
                "1.0 2.0 0.0".into(),
                "3.0   4.0 0.0".into(),
                "1.0 2.0 0.0".into()
            ])
        );
    }

    #[test]
    fn test_ground_surface_only() {
        let buildings = read_all(FOOTPRINT);
        let b = &buildings[1];
        assert!(b.lod(Lod::Lod0).is_empty());
        assert_eq!(
            b.lod(Lod::Lod2),
            &[RingEncoding::PosList {
                values: "5 6 0 7 8 0 5 6 0".into(),
                dimension: 3
            }]
        );
        assert_eq!(b.geometry_as_wkt(), "MULTIPOLYGON(((5 6, 7 8, 5 6)))");
    }

    #[test]
    fn test_empty_building() {
        let buildings = read_all(FOOTPRINT);
        assert!(buildings[2].has_no_geometry());
        assert_eq!(buildings[2].geometry_as_wkt(), "MULTIPOLYGON()");
    }

    #[test]
    fn test_srs_name_captured() {
        let mut reader = BuildingReader::new(FOOTPRINT.as_bytes());
        assert!(reader.srs_name().is_none());
        reader.next_building().unwrap();
        assert_eq!(reader.srs_name(), Some("urn:ogc:def:crs:EPSG::25832"));
    }

    #[test]
    fn test_legacy_coordinates_element() {
        let xml = r#"<Building id="old">
  <lod0FootPrint><MultiSurface><surfaceMember><Polygon><exterior><LinearRing>
    <coordinates>1.0,2.0 3.0,4.0</coordinates>
  </LinearRing></exterior></Polygon></surfaceMember></MultiSurface></lod0FootPrint>
</Building>"#;
        let buildings = read_all(xml);
        assert_eq!(buildings[0].id, "old");
        assert_eq!(
            buildings[0].geometry_as_wkt(),
            "MULTIPOLYGON(((1.0 2.0, 3.0 4.0)))"
        );
    }

    #[test]
    fn test_truncated_document() {
        let xml = r#"<Building id="cut"><lod0FootPrint>"#;
        let mut reader = BuildingReader::new(xml.as_bytes());
        match reader.next() {
            Some(Err(CityGmlError::Xml { position, reason })) => {
                assert!(position > 0 && position <= xml.len() as u64);
                assert!(reason.contains("inside Building cut"), "{}", reason);
            }
            other => panic!("expected an XML error, got {:?}", other),
        }
        assert!(reader.next().is_none());
    }
}
