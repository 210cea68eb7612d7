//! Stockage des nœuds dans PostgreSQL/PostGIS
//!
//! Deux tables par schéma :
//! - `nodes` : un enregistrement par bâtiment (id, labels, WKT)
//! - `spatial_index` : géométries PostGIS par couche, indexées en GIST

use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use deadpool_postgres::{Config, Pool, PoolConfig, Runtime, Timeouts};
use tokio_postgres::NoTls;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

use super::{indexable_geometry, NodeStore};
use crate::pipeline::BuildingNode;

/// SRID des géométries stockées
const STORAGE_SRID: u32 = 4326;

/// Chiffrement de la connexion
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    #[default]
    Off,
    Prefer,
    Require,
}

impl FromStr for TlsMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "disable" | "off" | "false" | "no" => Self::Off,
            "prefer" => Self::Prefer,
            "require" | "on" | "true" | "yes" => Self::Require,
            other => bail!("invalid SSL mode '{}' (disable, prefer, require)", other),
        })
    }
}

/// Paramètres de connexion PostGIS
///
/// Lus dans les variables `PG*` usuelles ; la CLI remplace ensuite les champs
/// qu'elle reçoit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgSettings {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: Option<String>,
    /// Connexions simultanées, une par document en cours au plus
    pub pool_size: usize,
    pub tls: TlsMode,
}

impl Default for PgSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5432,
            dbname: "citygml".into(),
            user: "postgres".into(),
            password: None,
            pool_size: 8,
            tls: TlsMode::Off,
        }
    }
}

impl PgSettings {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Valeurs absentes ou illisibles : défaut
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: var("PGHOST").unwrap_or(defaults.host),
            port: var("PGPORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
            dbname: var("PGDATABASE").unwrap_or(defaults.dbname),
            user: var("PGUSER").unwrap_or(defaults.user),
            password: var("PGPASSWORD"),
            pool_size: var("POOL_SIZE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.pool_size),
            tls: var("PGSSLMODE")
                .and_then(|v| v.parse().ok())
                .unwrap_or_default(),
        }
    }

    /// `user@host:port/dbname`, sans mot de passe
    pub fn display_target(&self) -> String {
        format!("{}@{}:{}/{}", self.user, self.host, self.port, self.dbname)
    }

    fn pool(&self) -> Result<Pool> {
        let mut cfg = Config::new();
        cfg.host = Some(self.host.clone());
        cfg.port = Some(self.port);
        cfg.dbname = Some(self.dbname.clone());
        cfg.user = Some(self.user.clone());
        cfg.password = self.password.clone();
        cfg.pool = Some(PoolConfig {
            max_size: self.pool_size,
            timeouts: Timeouts {
                wait: Some(Duration::from_secs(30)),
                create: Some(Duration::from_secs(10)),
                recycle: Some(Duration::from_secs(30)),
            },
            ..Default::default()
        });

        let pool = match self.tls {
            TlsMode::Off => cfg.create_pool(Some(Runtime::Tokio1), NoTls),
            TlsMode::Prefer | TlsMode::Require => {
                let roots =
                    rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
                let tls = rustls::ClientConfig::builder()
                    .with_root_certificates(roots)
                    .with_no_client_auth();
                cfg.create_pool(Some(Runtime::Tokio1), MakeRustlsConnect::new(tls))
            }
        };
        pool.with_context(|| format!("Failed to create pool for {}", self.display_target()))
    }
}

/// `NodeStore` adossé à PostGIS
#[derive(Clone)]
pub struct PgNodeStore {
    pool: Pool,
    schema: String,
}

impl PgNodeStore {
    /// Ouvre le pool et vérifie qu'une connexion répond
    pub async fn connect(settings: &PgSettings, schema: &str) -> Result<Self> {
        let pool = settings.pool()?;
        let client = pool
            .get()
            .await
            .with_context(|| format!("Cannot connect to {}", settings.display_target()))?;
        client
            .execute("SELECT 1", &[])
            .await
            .context("Connection test failed")?;

        Ok(Self {
            pool,
            schema: schema.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Crée le schéma, l'extension PostGIS et les deux tables
    pub async fn create_schema(&self, drop_existing: bool) -> Result<()> {
        let client = self.pool.get().await?;
        let schema = &self.schema;

        if drop_existing {
            client
                .execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema), &[])
                .await
                .context("Failed to drop schema")?;
        }

        client
            .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema), &[])
            .await
            .context("Failed to create schema")?;

        // Peut exiger des droits superuser : on accepte une extension déjà là
        if let Err(e) = client
            .execute("CREATE EXTENSION IF NOT EXISTS postgis", &[])
            .await
        {
            warn!("CREATE EXTENSION postgis failed (will check if already installed): {e}");
            let exists = client
                .query_opt("SELECT 1 FROM pg_extension WHERE extname = 'postgis'", &[])
                .await
                .context("Failed to check pg_extension")?
                .is_some();
            if !exists {
                return Err(anyhow!(
                    "PostGIS extension is not installed and could not be created: {e}"
                ));
            }
        }

        let sql = format!(
            r#"
            CREATE TABLE IF NOT EXISTS {schema}.nodes (
                id TEXT PRIMARY KEY,
                labels TEXT[] NOT NULL DEFAULT '{{}}',
                geometry TEXT NOT NULL,
                created_at TIMESTAMPTZ DEFAULT NOW(),
                updated_at TIMESTAMPTZ DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS {schema}.spatial_index (
                layer TEXT NOT NULL,
                node_id TEXT NOT NULL REFERENCES {schema}.nodes(id) ON DELETE CASCADE,
                geom geometry(Geometry, {STORAGE_SRID}) NOT NULL,
                PRIMARY KEY (layer, node_id)
            );
            "#
        );
        client
            .batch_execute(&sql)
            .await
            .context("Failed to create node tables")?;

        info!(schema = %schema, "Schema ready");
        Ok(())
    }

    /// Crée les index GIST (géométries) et GIN (labels)
    pub async fn create_indexes(&self) -> Result<()> {
        let client = self.pool.get().await?;
        let schema = &self.schema;

        let statements = [
            format!(
                "CREATE INDEX IF NOT EXISTS spatial_index_geom_idx ON {schema}.spatial_index USING GIST (geom)"
            ),
            format!(
                "CREATE INDEX IF NOT EXISTS nodes_labels_idx ON {schema}.nodes USING GIN (labels)"
            ),
        ];

        for sql in &statements {
            debug!("Creating index: {}", sql);
            client
                .execute(sql.as_str(), &[])
                .await
                .with_context(|| format!("Failed to create index: {}", sql))?;
        }

        Ok(())
    }

    /// Nombre de nœuds enregistrés
    pub async fn count_nodes(&self) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(&format!("SELECT COUNT(*) FROM {}.nodes", self.schema), &[])
            .await?;
        Ok(row.get(0))
    }

    /// Nombre de géométries inscrites dans une couche
    pub async fn count_layer(&self, layer: &str) -> Result<i64> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                &format!(
                    "SELECT COUNT(*) FROM {}.spatial_index WHERE layer = $1",
                    self.schema
                ),
                &[&layer],
            )
            .await?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl NodeStore for PgNodeStore {
    async fn create_node(&self, node: &BuildingNode, label: &str) -> Result<()> {
        if node.id.is_empty() {
            bail!("building without identifier");
        }

        let client = self.pool.get().await?;
        let sql = format!(
            r#"
            INSERT INTO {}.nodes AS n (id, labels, geometry)
            VALUES ($1, ARRAY[$2::text], $3)
            ON CONFLICT (id) DO UPDATE SET
                geometry = EXCLUDED.geometry,
                labels = CASE
                    WHEN $2::text = ANY(n.labels) THEN n.labels
                    ELSE array_append(n.labels, $2::text)
                END,
                updated_at = NOW()
            "#,
            self.schema
        );

        client
            .execute(&sql, &[&node.id, &label, &node.geometry])
            .await
            .with_context(|| format!("Failed to store node {}", node.id))?;
        Ok(())
    }

    async fn add_spatial_index(&self, id: &str, layer: &str) -> Result<bool> {
        let client = self.pool.get().await?;
        let schema = &self.schema;

        let row = client
            .query_opt(&format!("SELECT geometry FROM {schema}.nodes WHERE id = $1"), &[&id])
            .await
            .with_context(|| format!("Failed to read node {}", id))?;
        let Some(row) = row else {
            debug!(node = id, "Cannot index unknown node");
            return Ok(false);
        };
        let geometry: String = row.get(0);

        let Some(indexable) = indexable_geometry(&geometry) else {
            client
                .execute(
                    &format!("DELETE FROM {schema}.spatial_index WHERE layer = $1 AND node_id = $2"),
                    &[&layer, &id],
                )
                .await
                .with_context(|| format!("Failed to unindex node {} in layer {}", id, layer))?;
            return Ok(false);
        };

        // Réinscrit la géométrie seulement si elle a changé depuis le dernier import
        let sql = format!(
            r#"
            INSERT INTO {schema}.spatial_index AS s (layer, node_id, geom)
            VALUES ($1, $2, ST_GeomFromText($3, {STORAGE_SRID}))
            ON CONFLICT (layer, node_id) DO UPDATE SET geom = EXCLUDED.geom
            WHERE NOT ST_OrderingEquals(s.geom, EXCLUDED.geom)
            "#
        );

        let rows = client
            .execute(&sql, &[&layer, &id, &indexable])
            .await
            .with_context(|| format!("Failed to index node {} in layer {}", id, layer))?;
        Ok(rows > 0)
    }
}
