//! Chemins des anneaux extérieurs retenus sous un `Building`

use crate::types::Lod;

/// `lod0FootPrint/MultiSurface/surfaceMember/Polygon/exterior`
const LOD0_FOOTPRINT: [&str; 5] = [
    "lod0FootPrint",
    "MultiSurface",
    "surfaceMember",
    "Polygon",
    "exterior",
];

/// Fin commune des chemins `boundedBy/GroundSurface/lodNMultiSurface/...`
const MULTI_SURFACE_TAIL: [&str; 4] = ["MultiSurface", "surfaceMember", "Polygon", "exterior"];

/// Détermine le LOD d'un `LinearRing` d'après le chemin de ses ancêtres
/// (noms locaux, relatifs au `Building`, sans le `LinearRing` lui-même).
pub fn ring_lod<S: AsRef<str>>(ancestors: &[S]) -> Option<Lod> {
    let names: Vec<&str> = ancestors.iter().map(AsRef::as_ref).collect();

    if names == LOD0_FOOTPRINT {
        return Some(Lod::Lod0);
    }

    match names.as_slice() {
        ["boundedBy", "GroundSurface", surface, tail @ ..] if tail == MULTI_SURFACE_TAIL => {
            multi_surface_level(surface)
        }
        _ => None,
    }
}

/// `lod2MultiSurface` → `Lod2` (LOD1 à LOD4 seulement)
fn multi_surface_level(name: &str) -> Option<Lod> {
    let level = name
        .strip_prefix("lod")?
        .strip_suffix("MultiSurface")?
        .parse::<u8>()
        .ok()?;

    match level {
        1..=4 => Lod::from_level(level),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> Vec<&str> {
        s.split('/').collect()
    }

    #[test]
    fn test_lod0_path() {
        assert_eq!(
            ring_lod(&path("lod0FootPrint/MultiSurface/surfaceMember/Polygon/exterior")),
            Some(Lod::Lod0)
        );
    }

    #[test]
    fn test_ground_surface_paths() {
        for level in 1..=4u8 {
            let p = format!(
                "boundedBy/GroundSurface/lod{}MultiSurface/MultiSurface/surfaceMember/Polygon/exterior",
                level
            );
            assert_eq!(ring_lod(&path(&p)), Lod::from_level(level));
        }
    }

    #[test]
    fn test_rejected_paths() {
        // Toits, murs, intérieurs et chemins tronqués ne comptent pas
        for p in [
            "boundedBy/RoofSurface/lod2MultiSurface/MultiSurface/surfaceMember/Polygon/exterior",
            "boundedBy/GroundSurface/lod2MultiSurface/MultiSurface/surfaceMember/Polygon/interior",
            "boundedBy/GroundSurface/lod0MultiSurface/MultiSurface/surfaceMember/Polygon/exterior",
            "lod0FootPrint/MultiSurface/surfaceMember/Polygon",
            "lod2Solid/Solid/exterior/CompositeSurface/surfaceMember/Polygon/exterior",
        ] {
            assert_eq!(ring_lod(&path(p)), None, "{}", p);
        }
    }
}
