//! Types d'erreurs pour le crate citygml

use thiserror::Error;

/// Erreurs pouvant survenir lors de la lecture d'un document CityGML
#[derive(Debug, Error)]
pub enum CityGmlError {
    /// Erreur d'I/O lors de la lecture du fichier ou de l'archive
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Erreur du lecteur XML
    #[error("XML error at byte {position}: {reason}")]
    Xml { position: u64, reason: String },

    /// Archive corrompue ou format invalide
    #[error("Invalid archive format: {0}")]
    InvalidArchive(String),

    /// Aucun document CityGML dans l'archive
    #[error("Missing CityGML document in {0}")]
    MissingDocument(String),

    /// Encodage déclaré non supporté
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// Extension de fichier non reconnue
    #[error("Unsupported input file: {0}")]
    UnsupportedInput(String),
}

impl CityGmlError {
    /// Crée une erreur XML avec la position dans le flux
    pub fn xml(position: u64, reason: impl Into<String>) -> Self {
        Self::Xml {
            position,
            reason: reason.into(),
        }
    }
}
