//! Encodage des anneaux CityGML en WKT `MULTIPOLYGON`
//!
//! Les valeurs numériques sont recopiées telles quelles : aucune conversion n'est
//! faite ici, la validation des nombres a lieu à la reprojection.

use tracing::debug;

use crate::select::select_geometry;
use crate::types::{Building, RingEncoding};

/// Multipolygone vide, produit quand aucun LOD ne porte de géométrie
pub const EMPTY_MULTIPOLYGON: &str = "MULTIPOLYGON()";

/// Extrait les couples (x, y) d'un anneau, sous forme de texte
pub fn decode_ring(ring: &RingEncoding) -> Vec<(&str, &str)> {
    match ring {
        RingEncoding::Pos(tokens) => decode_pos(tokens),
        RingEncoding::PosList { values, dimension } => decode_pos_list(values, *dimension),
        RingEncoding::Coordinates(coordinates) => decode_coordinates(coordinates),
        RingEncoding::Empty => Vec::new(),
    }
}

/// `gml:pos` : deux premiers champs de chaque position, le z est ignoré
fn decode_pos(tokens: &[String]) -> Vec<(&str, &str)> {
    tokens
        .iter()
        .filter_map(|token| {
            let mut fields = token.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(x), Some(y)) => Some((x, y)),
                _ => {
                    debug!(token = token.as_str(), "Skipping pos with less than two fields");
                    None
                }
            }
        })
        .collect()
}

/// `gml:posList` : tuples de `dimension` valeurs, seuls x et y sont gardés
fn decode_pos_list(values: &str, dimension: usize) -> Vec<(&str, &str)> {
    let tokens: Vec<&str> = values.split_whitespace().collect();
    let chunks = tokens.chunks(dimension.max(2));

    if tokens.len() % dimension.max(2) == 1 {
        debug!(
            tokens = tokens.len(),
            dimension, "posList has a dangling value, dropping it"
        );
    }

    chunks
        .filter(|chunk| chunk.len() >= 2)
        .map(|chunk| (chunk[0], chunk[1]))
        .collect()
}

/// `gml:coordinates` : jetons `x,y[,z]` séparés par des blancs
fn decode_coordinates(coordinates: &str) -> Vec<(&str, &str)> {
    coordinates
        .split_whitespace()
        .filter_map(|token| {
            let mut fields = token.split(',');
            match (fields.next(), fields.next()) {
                (Some(x), Some(y)) if !x.is_empty() && !y.is_empty() => Some((x, y)),
                _ => {
                    debug!(token, "Skipping coordinates tuple without x,y");
                    None
                }
            }
        })
        .collect()
}

/// Encode une suite d'anneaux en `MULTIPOLYGON`, un polygone par anneau
///
/// Un anneau sans point décodable donne le polygone dégénéré `(())` sans
/// interrompre les autres anneaux.
pub fn encode_multipolygon(rings: &[RingEncoding]) -> String {
    let mut wkt = String::with_capacity(16 + rings.len() * 64);
    wkt.push_str("MULTIPOLYGON(");

    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            wkt.push_str(", ");
        }
        write_polygon(&mut wkt, &decode_ring(ring));
    }

    wkt.push(')');
    wkt
}

fn write_polygon(out: &mut String, points: &[(&str, &str)]) {
    out.push_str("((");
    for (i, (x, y)) in points.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(x);
        out.push(' ');
        out.push_str(y);
    }
    out.push_str("))");
}

impl Building {
    /// Géométrie du bâtiment en WKT, dans le système de coordonnées du document
    pub fn geometry_as_wkt(&self) -> String {
        match select_geometry(self) {
            Some((_, rings)) => encode_multipolygon(rings),
            None => EMPTY_MULTIPOLYGON.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lod;

    fn pos(tokens: &[&str]) -> RingEncoding {
        RingEncoding::Pos(tokens.iter().map(|s| s.to_string()).collect())
    }

    fn pos_list(values: &str) -> RingEncoding {
        RingEncoding::PosList {
            values: values.to_string(),
            dimension: 3,
        }
    }

    #[test]
    fn test_pos_ring() {
        let wkt = encode_multipolygon(&[pos(&["1.0 2.0", "3.0 4.0", "1.0 2.0"])]);
        assert_eq!(wkt, "MULTIPOLYGON(((1.0 2.0, 3.0 4.0, 1.0 2.0)))");
    }

    #[test]
    fn test_pos_irregular_whitespace_and_z() {
        let wkt = encode_multipolygon(&[pos(&["  1.0 \t 2.0   5.5 ", "3.0\n4.0 0"])]);
        assert_eq!(wkt, "MULTIPOLYGON(((1.0 2.0, 3.0 4.0)))");
    }

    #[test]
    fn test_pos_list_drops_z() {
        let wkt = encode_multipolygon(&[pos_list("1.0 2.0 0.0 3.0 4.0 0.0")]);
        assert_eq!(wkt, "MULTIPOLYGON(((1.0 2.0, 3.0 4.0)))");
    }

    #[test]
    fn test_pos_list_two_dimensions() {
        let ring = RingEncoding::PosList {
            values: "1 2 3 4".into(),
            dimension: 2,
        };
        assert_eq!(encode_multipolygon(&[ring]), "MULTIPOLYGON(((1 2, 3 4)))");
    }

    #[test]
    fn test_pos_list_dangling_values() {
        // Dernier groupe incomplet : une valeur seule est ignorée, deux valeurs forment un point
        assert_eq!(
            encode_multipolygon(&[pos_list("1 2 0 3")]),
            "MULTIPOLYGON(((1 2)))"
        );
        assert_eq!(
            encode_multipolygon(&[pos_list("1 2 0 3 4")]),
            "MULTIPOLYGON(((1 2, 3 4)))"
        );
    }

    #[test]
    fn test_legacy_coordinates() {
        let ring = RingEncoding::Coordinates("1.0,2.0   3.0,4.0".into());
        assert_eq!(
            encode_multipolygon(&[ring]),
            "MULTIPOLYGON(((1.0 2.0, 3.0 4.0)))"
        );
    }

    #[test]
    fn test_legacy_coordinates_extra_fields() {
        let ring = RingEncoding::Coordinates("1,2,10 3,4,10 bad 5,".into());
        assert_eq!(encode_multipolygon(&[ring]), "MULTIPOLYGON(((1 2, 3 4)))");
    }

    #[test]
    fn test_encodings_are_equivalent() {
        let a = encode_multipolygon(&[pos(&["10 20", "30 40", "10 20"])]);
        let b = encode_multipolygon(&[pos_list("10 20 0 30 40 0 10 20 0")]);
        let c = encode_multipolygon(&[RingEncoding::Coordinates("10,20 30,40 10,20".into())]);
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn test_multiple_rings_and_degenerate() {
        let wkt = encode_multipolygon(&[
            pos(&["1 1", "2 2"]),
            RingEncoding::Empty,
            pos(&["lonely"]),
            pos_list("5 5 0 6 6 0"),
        ]);
        assert_eq!(
            wkt,
            "MULTIPOLYGON(((1 1, 2 2)), (()), (()), ((5 5, 6 6)))"
        );
    }

    #[test]
    fn test_empty_ring_list() {
        assert_eq!(encode_multipolygon(&[]), EMPTY_MULTIPOLYGON);
    }

    #[test]
    fn test_building_without_geometry() {
        let b = Building::new("b0");
        assert_eq!(b.geometry_as_wkt(), "MULTIPOLYGON()");
    }

    #[test]
    fn test_building_uses_lod0_only() {
        let mut b = Building::new("b1");
        b.push_ring(Lod::Lod0, pos(&["1 1", "2 2"]));
        b.push_ring(Lod::Lod1, pos(&["7 7", "8 8"]));
        b.push_ring(Lod::Lod2, pos(&["9 9", "9 9"]));

        let wkt = b.geometry_as_wkt();
        assert_eq!(wkt, "MULTIPOLYGON(((1 1, 2 2)))");
        assert!(!wkt.contains('7') && !wkt.contains('9'));
    }
}
