//! Choix de la géométrie d'un bâtiment parmi ses niveaux de détail

use crate::types::{Building, Lod, RingEncoding};

/// Retourne la première collection non vide dans l'ordre LOD0 → LOD4
pub fn select_geometry(building: &Building) -> Option<(Lod, &[RingEncoding])> {
    Lod::PRIORITY
        .iter()
        .map(|&lod| (lod, building.lod(lod)))
        .find(|(_, rings)| !rings.is_empty())
}

impl Building {
    /// Niveau de détail retenu pour la sortie, s'il y en a un
    pub fn selected_lod(&self) -> Option<Lod> {
        select_geometry(self).map(|(lod, _)| lod)
    }
}
