//! Rapport de conversion
//!
//! Collecte les bilans par document, les échecs par bâtiment, et calcule le
//! statut final de l'import.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::pipeline::DocumentOutcome;

/// Statut global de la conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConversionStatus {
    /// Tous les bâtiments ont été convertis et stockés
    Success,
    /// Au moins un bâtiment stocké, au moins un échec
    PartialSuccess,
    /// Aucun bâtiment stocké malgré des erreurs, ou arrêt demandé
    Failed,
}

/// Étape où un bâtiment a échoué
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureStage {
    /// Lecture ou CRS du document
    Document,
    Reproject,
    Store,
    Index,
}

/// Échec avec contexte
#[derive(Debug, Clone, Serialize)]
pub struct BuildingFailure {
    /// Document source
    pub document: String,
    /// Bâtiment concerné (absent pour une erreur de document)
    pub building_id: Option<String>,
    pub stage: FailureStage,
    pub message: String,
}

/// Rapport complet
#[derive(Debug, Clone, Serialize)]
pub struct ConversionReport {
    /// Chemin d'entrée
    pub input: String,
    pub duration_secs: f64,
    pub status: ConversionStatus,

    pub documents_processed: usize,
    pub documents_failed: usize,
    /// Documents jamais démarrés après un arrêt
    pub documents_skipped: usize,
    pub buildings_seen: usize,
    pub buildings_converted: usize,
    pub buildings_stored: usize,
    pub buildings_indexed: usize,
    /// Bâtiments sans géométrie (`MULTIPOLYGON()`)
    pub empty_geometries: usize,
    /// Arrêt avant la fin (`FailurePolicy::Halt`)
    pub halted: bool,

    pub failures: Vec<BuildingFailure>,
}

impl ConversionReport {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.to_string(),
            duration_secs: 0.0,
            status: ConversionStatus::Success,
            documents_processed: 0,
            documents_failed: 0,
            documents_skipped: 0,
            buildings_seen: 0,
            buildings_converted: 0,
            buildings_stored: 0,
            buildings_indexed: 0,
            empty_geometries: 0,
            halted: false,
            failures: Vec::new(),
        }
    }

    /// Ajoute le bilan d'un document
    pub fn record_document(&mut self, outcome: DocumentOutcome) {
        self.documents_processed += 1;
        self.buildings_seen += outcome.buildings;
        self.buildings_converted += outcome.converted;
        self.buildings_stored += outcome.stored;
        self.buildings_indexed += outcome.indexed;
        self.empty_geometries += outcome.empty_geometry;
        self.halted |= outcome.halted;
        self.failures.extend(outcome.failures);

        if let Some(message) = outcome.error {
            self.documents_failed += 1;
            self.failures.push(BuildingFailure {
                document: outcome.document,
                building_id: None,
                stage: FailureStage::Document,
                message,
            });
        }
    }

    /// Enregistre un document qui n'a pas pu être ouvert
    pub fn record_document_failure(&mut self, document: &str, message: &str) {
        self.documents_processed += 1;
        self.documents_failed += 1;
        self.failures.push(BuildingFailure {
            document: document.to_string(),
            building_id: None,
            stage: FailureStage::Document,
            message: message.to_string(),
        });
    }

    pub fn set_duration(&mut self, duration: Duration) {
        self.duration_secs = duration.as_secs_f64();
    }

    /// Détermine le statut final
    pub fn finalize(&mut self) {
        self.status = if self.halted {
            ConversionStatus::Failed
        } else if self.failures.is_empty() {
            ConversionStatus::Success
        } else if self.buildings_stored > 0 {
            ConversionStatus::PartialSuccess
        } else {
            ConversionStatus::Failed
        };
    }

    /// Nombre de bâtiments en échec
    pub fn buildings_failed(&self) -> usize {
        self.failures
            .iter()
            .filter(|f| f.building_id.is_some())
            .count()
    }

    /// Affiche le rapport sur la console
    pub fn display(&self) {
        println!("\n{}", "=".repeat(60));
        println!("CONVERSION REPORT - {}", self.input);
        println!("{}", "=".repeat(60));

        println!("\nStatus: {:?}", self.status);
        println!("Duration: {:.2}s", self.duration_secs);

        println!("\n--- SUMMARY ---");
        println!(
            "Documents: {} processed, {} failed",
            self.documents_processed, self.documents_failed
        );
        println!(
            "Buildings: {} seen, {} converted, {} stored, {} indexed, {} without geometry",
            self.buildings_seen,
            self.buildings_converted,
            self.buildings_stored,
            self.buildings_indexed,
            self.empty_geometries
        );
        if self.halted {
            println!(
                "Stopped after the first failure ({} documents not started)",
                self.documents_skipped
            );
        }

        if !self.failures.is_empty() {
            println!("\n--- FAILURES ({}) ---", self.failures.len());
            for f in self.failures.iter().take(20) {
                match &f.building_id {
                    Some(id) => println!("  {:?} [{}:{}] {}", f.stage, f.document, id, f.message),
                    None => println!("  {:?} [{}] {}", f.stage, f.document, f.message),
                }
            }
            if self.failures.len() > 20 {
                println!("  ... and {} more", self.failures.len() - 20);
            }
        }

        println!("\n{}", "=".repeat(60));
    }

    /// Sauvegarde le rapport en JSON
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        Ok(())
    }

    /// Résumé sur une ligne
    pub fn summary(&self) -> String {
        format!(
            "{}: {} stored, {} failed, {} without geometry",
            self.input,
            self.buildings_stored,
            self.buildings_failed(),
            self.empty_geometries
        )
    }
}
