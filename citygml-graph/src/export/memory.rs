//! Stockage en mémoire, pour `--dry-run` et les tests

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::debug;

use super::{indexable_geometry, NodeStore};
use crate::pipeline::BuildingNode;

/// Nœud tel qu'enregistré
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    pub labels: Vec<String>,
    pub geometry: String,
}

#[derive(Debug, Default)]
struct Inner {
    nodes: BTreeMap<String, StoredNode>,
    /// couche → (id → géométrie indexée)
    layers: BTreeMap<String, BTreeMap<String, String>>,
}

/// `NodeStore` en mémoire, mêmes règles que le stockage PostGIS
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    inner: Mutex<Inner>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: &str) -> Option<StoredNode> {
        self.lock().ok()?.nodes.get(id).cloned()
    }

    pub fn node_count(&self) -> usize {
        self.lock().map(|inner| inner.nodes.len()).unwrap_or(0)
    }

    /// Identifiants inscrits dans une couche, triés
    pub fn layer(&self, layer: &str) -> Vec<String> {
        self.lock()
            .ok()
            .and_then(|inner| inner.layers.get(layer).map(|ids| ids.keys().cloned().collect()))
            .unwrap_or_default()
    }

    /// Géométrie inscrite pour un nœud dans une couche
    pub fn indexed_geometry(&self, layer: &str, id: &str) -> Option<String> {
        self.lock().ok()?.layers.get(layer)?.get(id).cloned()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }
}

#[async_trait]
impl NodeStore for MemoryNodeStore {
    async fn create_node(&self, node: &BuildingNode, label: &str) -> Result<()> {
        if node.id.is_empty() {
            bail!("building without identifier");
        }

        let mut inner = self.lock()?;
        let stored = inner
            .nodes
            .entry(node.id.clone())
            .or_insert_with(|| StoredNode {
                labels: Vec::new(),
                geometry: String::new(),
            });

        stored.geometry = node.geometry.clone();
        if !stored.labels.iter().any(|l| l == label) {
            stored.labels.push(label.to_string());
        }
        Ok(())
    }

    async fn add_spatial_index(&self, id: &str, layer: &str) -> Result<bool> {
        let mut inner = self.lock()?;

        let indexable = match inner.nodes.get(id) {
            Some(node) => indexable_geometry(&node.geometry),
            None => {
                debug!(node = id, "Cannot index unknown node");
                return Ok(false);
            }
        };

        let entries = inner.layers.entry(layer.to_string()).or_default();
        let Some(geometry) = indexable else {
            entries.remove(id);
            return Ok(false);
        };
        if entries.get(id) == Some(&geometry) {
            return Ok(false);
        }
        entries.insert(id.to_string(), geometry);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, geometry: &str) -> BuildingNode {
        BuildingNode {
            id: id.to_string(),
            geometry: geometry.to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_node_merges_labels() {
        let store = MemoryNodeStore::new();
        let n = node("B1", "MULTIPOLYGON(((1.000000 2.000000)))");

        store.create_node(&n, "Building").await.unwrap();
        store.create_node(&n, "Building").await.unwrap();
        store.create_node(&n, "Footprint").await.unwrap();

        assert_eq!(store.node_count(), 1);
        assert_eq!(store.node("B1").unwrap().labels, ["Building", "Footprint"]);
    }

    const TRIANGLE: &str = "MULTIPOLYGON(((1.000000 2.000000, 3.000000 2.000000, 3.000000 4.000000, 1.000000 2.000000)))";

    #[tokio::test]
    async fn test_spatial_index_is_idempotent() {
        let store = MemoryNodeStore::new();
        store.create_node(&node("B1", TRIANGLE), "Building").await.unwrap();

        assert!(store.add_spatial_index("B1", "buildings").await.unwrap());
        assert!(!store.add_spatial_index("B1", "buildings").await.unwrap());
        assert_eq!(store.layer("buildings"), ["B1"]);

        // Géométrie modifiée : la couche est mise à jour
        let moved = TRIANGLE.replace("3.000000 4.000000", "3.000000 5.000000");
        store.create_node(&node("B1", &moved), "Building").await.unwrap();
        assert!(store.add_spatial_index("B1", "buildings").await.unwrap());
        assert_eq!(store.indexed_geometry("buildings", "B1").as_deref(), Some(moved.as_str()));
    }

    #[tokio::test]
    async fn test_open_ring_indexed_closed() {
        let store = MemoryNodeStore::new();
        let open = "MULTIPOLYGON(((1.000000 2.000000, 3.000000 2.000000, 3.000000 4.000000)))";
        store.create_node(&node("B1", open), "Building").await.unwrap();

        assert!(store.add_spatial_index("B1", "buildings").await.unwrap());
        assert_eq!(store.node("B1").unwrap().geometry, open);
        assert_eq!(store.indexed_geometry("buildings", "B1").as_deref(), Some(TRIANGLE));
    }

    #[tokio::test]
    async fn test_unclosable_rings_not_indexed() {
        let store = MemoryNodeStore::new();
        let two_points = "MULTIPOLYGON(((1.000000 2.000000, 3.000000 4.000000)))";
        store.create_node(&node("S3", two_points), "Building").await.unwrap();
        store
            .create_node(&node("DEG", "MULTIPOLYGON((()))"), "Building")
            .await
            .unwrap();

        assert!(!store.add_spatial_index("S3", "buildings").await.unwrap());
        assert!(!store.add_spatial_index("DEG", "buildings").await.unwrap());
        assert!(store.layer("buildings").is_empty());
        assert_eq!(store.node_count(), 2);
    }

    #[tokio::test]
    async fn test_geometry_degraded_leaves_layer() {
        let store = MemoryNodeStore::new();
        store.create_node(&node("B1", TRIANGLE), "Building").await.unwrap();
        assert!(store.add_spatial_index("B1", "buildings").await.unwrap());

        store
            .create_node(&node("B1", "MULTIPOLYGON((()))"), "Building")
            .await
            .unwrap();
        assert!(!store.add_spatial_index("B1", "buildings").await.unwrap());
        assert!(store.layer("buildings").is_empty());
    }

    #[tokio::test]
    async fn test_empty_geometry_not_indexed() {
        let store = MemoryNodeStore::new();
        store
            .create_node(&node("E", "MULTIPOLYGON()"), "Building")
            .await
            .unwrap();

        assert!(!store.add_spatial_index("E", "buildings").await.unwrap());
        assert!(store.layer("buildings").is_empty());
    }

    #[tokio::test]
    async fn test_index_unknown_node() {
        let store = MemoryNodeStore::new();
        assert!(!store.add_spatial_index("ghost", "buildings").await.unwrap());
    }

    #[tokio::test]
    async fn test_node_without_identifier() {
        let store = MemoryNodeStore::new();
        assert!(store.create_node(&node("", "MULTIPOLYGON()"), "Building").await.is_err());
    }
}
