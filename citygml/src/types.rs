//! Types de données pour le crate citygml

use std::fmt;

/// Taille de tuple par défaut d'un `gml:posList` (x y z)
pub const DEFAULT_POS_LIST_DIMENSION: usize = 3;

/// Niveau de détail CityGML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Lod {
    /// Emprise au sol (`lod0FootPrint`)
    Lod0,
    Lod1,
    Lod2,
    Lod3,
    Lod4,
}

impl Lod {
    /// Ordre de priorité pour le choix de la géométrie
    pub const PRIORITY: [Lod; 5] = [Lod::Lod0, Lod::Lod1, Lod::Lod2, Lod::Lod3, Lod::Lod4];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Crée un niveau depuis son numéro (0 à 4)
    pub fn from_level(level: u8) -> Option<Self> {
        Self::PRIORITY.get(level as usize).copied()
    }
}

impl fmt::Display for Lod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LOD{}", self.index())
    }
}

/// Anneau tel que lu dans le document (un `gml:LinearRing`)
///
/// Les trois champs sont mutuellement exclusifs dans un document valide, mais rien
/// n'empêche un document d'en renseigner plusieurs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRing {
    /// Contenu des éléments `gml:pos`, dans l'ordre
    pub pos: Vec<String>,

    /// Contenu de l'élément `gml:posList`
    pub pos_list: Option<String>,

    /// Attribut `srsDimension` du `gml:posList`
    pub pos_list_dimension: Option<usize>,

    /// Contenu de l'élément `gml:coordinates` (format déprécié)
    pub coordinates: Option<String>,
}

/// Encodage des coordonnées d'un anneau, choisi une fois pour toutes à la lecture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingEncoding {
    /// Positions explicites, une par point (`"x y [z]"`)
    Pos(Vec<String>),
    /// Liste aplatie de coordonnées, groupées par `dimension`
    PosList { values: String, dimension: usize },
    /// Format déprécié `"x,y x,y ..."`
    Coordinates(String),
    /// Aucun encodage renseigné
    Empty,
}

impl From<RawRing> for RingEncoding {
    /// Précédence : pos > posList > coordinates
    fn from(raw: RawRing) -> Self {
        if !raw.pos.is_empty() {
            return Self::Pos(raw.pos);
        }

        if let Some(values) = raw.pos_list.filter(|s| !s.trim().is_empty()) {
            let dimension = match raw.pos_list_dimension {
                Some(d @ (2 | 3)) => d,
                _ => DEFAULT_POS_LIST_DIMENSION,
            };
            return Self::PosList { values, dimension };
        }

        match raw.coordinates.filter(|s| !s.trim().is_empty()) {
            Some(coordinates) => Self::Coordinates(coordinates),
            None => Self::Empty,
        }
    }
}

/// Un bâtiment CityGML et ses géométries candidates, une collection par LOD
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Building {
    /// Identifiant (`gml:id`)
    pub id: String,

    /// Anneaux extérieurs par niveau de détail, indexés par `Lod::index()`
    pub lods: [Vec<RingEncoding>; 5],
}

impl Building {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Anneaux d'un niveau de détail
    pub fn lod(&self, lod: Lod) -> &[RingEncoding] {
        &self.lods[lod.index()]
    }

    /// Ajoute un anneau au niveau de détail donné
    pub fn push_ring(&mut self, lod: Lod, ring: RingEncoding) {
        self.lods[lod.index()].push(ring);
    }

    /// Vrai si aucun niveau de détail ne porte de géométrie
    pub fn has_no_geometry(&self) -> bool {
        self.lods.iter().all(Vec::is_empty)
    }
}
