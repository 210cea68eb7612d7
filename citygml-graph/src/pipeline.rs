//! Conversion des bâtiments en nœuds et enregistrement d'un document
//!
//! La lecture XML et la reprojection tournent sur un thread bloquant ; les
//! nœuds produits arrivent par un canal borné à la tâche qui écrit dans le
//! `NodeStore`, un bâtiment à la fois, dans l'ordre du document.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use citygml::{Building, CityGmlError, DocumentSource, EMPTY_MULTIPOLYGON};
use futures::{stream, StreamExt};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::export::NodeStore;
use crate::report::{BuildingFailure, ConversionReport, FailureStage};
use crate::reproject::{ReprojectError, SourceProjection, TargetSystem, WktReprojector};

/// Nombre de nœuds en attente entre le thread de conversion et l'écriture
const CHANNEL_CAPACITY: usize = 256;

/// Bâtiment converti, prêt à être stocké
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildingNode {
    pub id: String,
    /// `MULTIPOLYGON` en WGS84
    pub geometry: String,
}

impl BuildingNode {
    pub fn has_geometry(&self) -> bool {
        self.geometry != EMPTY_MULTIPOLYGON
    }
}

/// Échec de reprojection d'un bâtiment
#[derive(Debug, Error)]
#[error("building {building_id}: {source}")]
pub struct ConversionError {
    pub building_id: String,
    #[source]
    pub source: ReprojectError,
}

/// Erreur qui interrompt un document entier
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error(transparent)]
    Read(#[from] CityGmlError),

    #[error("no CRS: pass --epsg or declare a srsName in the document")]
    MissingCrs,

    #[error(transparent)]
    Crs(#[from] ReprojectError),
}

/// Comportement après l'échec d'un bâtiment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Consigner l'échec et passer au bâtiment suivant
    #[default]
    Continue,
    /// Arrêter le traitement
    Halt,
}

/// Paramètres d'un import
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// CRS imposé ; sinon le `srsName` du document
    pub epsg: Option<String>,
    /// Label des nœuds créés
    pub label: String,
    /// Couche spatiale
    pub layer: String,
    pub failure_policy: FailurePolicy,
}

/// Bilan d'un document
#[derive(Debug, Clone, Default)]
pub struct DocumentOutcome {
    pub document: String,
    pub buildings: usize,
    pub converted: usize,
    pub stored: usize,
    pub indexed: usize,
    pub empty_geometry: usize,
    pub failures: Vec<BuildingFailure>,
    /// Erreur qui a interrompu le document
    pub error: Option<String>,
    /// Arrêt demandé par `FailurePolicy::Halt`
    pub halted: bool,
}

impl DocumentOutcome {
    pub fn new(document: &str) -> Self {
        Self {
            document: document.to_string(),
            ..Default::default()
        }
    }

    fn record_failure(&mut self, building_id: &str, stage: FailureStage, message: String) {
        warn!(
            document = %self.document,
            building = building_id,
            stage = ?stage,
            "{}",
            message
        );
        self.failures.push(BuildingFailure {
            document: self.document.clone(),
            building_id: Some(building_id.to_string()),
            stage,
            message,
        });
    }
}

/// Convertit un bâtiment : WKT du meilleur LOD, puis reprojection
///
/// # Errors
///
/// Un jeton de coordonnées invalide fait échouer tout le bâtiment ; aucune
/// géométrie partielle n'est produite.
pub fn convert_building<P: SourceProjection>(
    building: &Building,
    reprojector: &WktReprojector<'_, P>,
) -> Result<BuildingNode, ConversionError> {
    let wkt = building.geometry_as_wkt();

    let geometry = reprojector
        .reproject(&wkt)
        .map_err(|source| ConversionError {
            building_id: building.id.clone(),
            source,
        })?;

    Ok(BuildingNode {
        id: building.id.clone(),
        geometry,
    })
}

/// Convertit les bâtiments d'un document, dans l'ordre
///
/// Le reprojecteur est construit au premier bâtiment, depuis `epsg` ou à défaut
/// le `srsName` déclaré avant lui. `emit` peut interrompre la lecture.
pub fn convert_document<F>(
    source: &DocumentSource,
    target: &TargetSystem,
    epsg: Option<&str>,
    mut emit: F,
) -> Result<(), DocumentError>
where
    F: FnMut(Result<BuildingNode, ConversionError>) -> ControlFlow<()>,
{
    let mut reader = source.buildings()?;
    let mut reprojector: Option<WktReprojector<'_>> = None;

    while let Some(next) = reader.next() {
        let building = next?;

        if reprojector.is_none() {
            let identifier = epsg.or(reader.srs_name()).ok_or(DocumentError::MissingCrs)?;
            let created = WktReprojector::from_identifier(identifier, target)?;
            info!(
                document = %source.name(),
                crs = identifier,
                projection = %created.source().description(),
                "Reprojecting to EPSG:{}",
                target.epsg()
            );
            reprojector = Some(created);
        }
        let Some(active) = reprojector.as_ref() else {
            continue;
        };

        let result = convert_building(&building, active);
        if let Ok(node) = &result {
            debug!(building = %node.id, "Building converted");
        }

        if emit(result).is_break() {
            debug!(document = %source.name(), "Conversion stopped by consumer");
            break;
        }
    }

    Ok(())
}

/// Convertit un document et enregistre chaque bâtiment dans le store
///
/// Les échecs par bâtiment sont consignés dans le bilan ; ils n'arrêtent le
/// document que sous `FailurePolicy::Halt`.
pub async fn store_document<S: NodeStore + ?Sized>(
    source: DocumentSource,
    store: &S,
    target: Arc<TargetSystem>,
    options: &PipelineOptions,
) -> DocumentOutcome {
    let mut outcome = DocumentOutcome::new(&source.name());
    let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);
    let epsg = options.epsg.clone();

    let producer = tokio::task::spawn_blocking(move || {
        convert_document(&source, &target, epsg.as_deref(), |result| {
            match tx.blocking_send(result) {
                Ok(()) => ControlFlow::Continue(()),
                Err(_) => ControlFlow::Break(()),
            }
        })
    });

    while let Some(result) = rx.recv().await {
        outcome.buildings += 1;

        match result {
            Ok(node) => {
                outcome.converted += 1;
                if !node.has_geometry() {
                    outcome.empty_geometry += 1;
                }
                store_node(store, &node, options, &mut outcome).await;
            }
            Err(e) => {
                let message = e.source.to_string();
                outcome.record_failure(&e.building_id, FailureStage::Reproject, message);
            }
        }

        if options.failure_policy == FailurePolicy::Halt && !outcome.failures.is_empty() {
            outcome.halted = true;
            break;
        }
    }

    // Débloque le producteur s'il attend encore de la place dans le canal
    drop(rx);

    match producer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(document = %outcome.document, "Document aborted: {}", e);
            outcome.error = Some(e.to_string());
        }
        Err(e) => {
            warn!(document = %outcome.document, "Conversion task failed: {}", e);
            outcome.error = Some(format!("conversion task failed: {}", e));
        }
    }

    outcome
}

/// Enregistre plusieurs documents, au plus `jobs` à la fois
///
/// Après un arrêt (`FailurePolicy::Halt`), aucun nouveau document ne démarre ;
/// ceux déjà en cours vont à leur terme et leurs nœuds sont comptés.
pub async fn store_documents<S: NodeStore + ?Sized>(
    sources: Vec<DocumentSource>,
    store: &S,
    target: Arc<TargetSystem>,
    options: &PipelineOptions,
    jobs: usize,
    report: &mut ConversionReport,
) {
    let stopping = AtomicBool::new(false);
    let stopping_ref = &stopping;

    let mut outcomes = stream::iter(sources)
        .map(|source| {
            let target = Arc::clone(&target);
            async move {
                if stopping_ref.load(Ordering::Acquire) {
                    debug!(document = %source.name(), "Skipped after halt");
                    return None;
                }
                Some(store_document(source, store, target, options).await)
            }
        })
        .buffer_unordered(jobs.max(1));

    while let Some(outcome) = outcomes.next().await {
        let Some(outcome) = outcome else {
            report.documents_skipped += 1;
            continue;
        };
        info!(
            document = %outcome.document,
            stored = outcome.stored,
            indexed = outcome.indexed,
            failures = outcome.failures.len(),
            "Document done"
        );

        let stop = outcome.halted
            || (options.failure_policy == FailurePolicy::Halt && outcome.error.is_some());
        report.record_document(outcome);

        if stop {
            report.halted = true;
            if !stopping.swap(true, Ordering::AcqRel) {
                warn!("Stopping import after the first failure");
            }
        }
    }
}

/// Crée le nœud puis l'inscrit dans la couche spatiale
async fn store_node<S: NodeStore + ?Sized>(
    store: &S,
    node: &BuildingNode,
    options: &PipelineOptions,
    outcome: &mut DocumentOutcome,
) {
    if let Err(e) = store.create_node(node, &options.label).await {
        outcome.record_failure(&node.id, FailureStage::Store, format!("{:#}", e));
        return;
    }
    outcome.stored += 1;

    match store.add_spatial_index(&node.id, &options.layer).await {
        Ok(true) => outcome.indexed += 1,
        Ok(false) => debug!(building = %node.id, "Nothing to index"),
        Err(e) => outcome.record_failure(&node.id, FailureStage::Index, format!("{:#}", e)),
    }
}
