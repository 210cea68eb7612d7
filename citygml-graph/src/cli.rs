//! Définition et implémentation des commandes CLI
//!
//! - défaut : CityGML → nœuds PostGIS + couche spatiale
//! - `to-geojson` : CityGML → GeoJSON (sans base)
//! - `to-wkt` : CityGML → lignes `id<TAB>WKT` (sans base)

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use rayon::prelude::*;
use regex::Regex;
use tracing::{info, warn};

use citygml::DocumentSource;
use citygml_graph::config::Config;
use citygml_graph::export::{geojson, text, MemoryNodeStore, NodeStore, PgNodeStore, PgSettings};
use citygml_graph::pipeline::{store_documents, FailurePolicy, PipelineOptions};
use citygml_graph::report::ConversionReport;
use citygml_graph::reproject::{SmartProjection, TargetSystem};

#[derive(Subcommand)]
pub enum Commands {
    /// Export CityGML buildings to GeoJSON (no database required)
    ToGeojson {
        /// CityGML file (.gml, .xml, .gml.bz2, .tar.bz2) or directory
        #[arg(short, long)]
        path: PathBuf,

        /// Output directory, or a .geojson file for a single document
        #[arg(short, long)]
        output: PathBuf,

        /// Source CRS (e.g. 25832, EPSG:2154); defaults to the document srsName
        #[arg(long)]
        epsg: Option<String>,
    },

    /// Export CityGML buildings as `id<TAB>WKT` lines (no database required)
    ToWkt {
        /// CityGML file or directory
        #[arg(short, long)]
        path: PathBuf,

        /// Output file (défaut : stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Source CRS; defaults to the document srsName
        #[arg(long)]
        epsg: Option<String>,
    },
}

/// Arguments de l'import (commande par défaut)
#[derive(Args, Debug)]
pub struct ImportArgs {
    /// CityGML file (.gml, .xml, .gml.bz2, .tar.bz2) or directory
    #[arg(short, long)]
    pub path: PathBuf,

    /// Source CRS (e.g. 25832, EPSG:2154); defaults to the document srsName
    #[arg(long)]
    pub epsg: Option<String>,

    /// Target PostgreSQL schema
    #[arg(long, default_value = "citygml")]
    pub schema: String,

    /// Config preset name (default/strict) or path to a JSON config
    #[arg(long, default_value = "default")]
    pub config: String,

    /// Node label (overrides the config)
    #[arg(long)]
    pub label: Option<String>,

    /// Spatial layer name (overrides the config)
    #[arg(long)]
    pub layer: Option<String>,

    /// Maximum number of documents processed concurrently
    #[arg(long, alias = "threads")]
    pub jobs: Option<usize>,

    /// Stop at the first failed building
    #[arg(long)]
    pub fail_fast: bool,

    /// Write the conversion report as JSON
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Convert and store in memory only (no database)
    #[arg(long)]
    pub dry_run: bool,

    /// Drop schema before import
    #[arg(long)]
    pub drop_schema: bool,

    /// PostgreSQL host (défaut : env PGHOST / localhost)
    #[arg(long)]
    pub host: Option<String>,

    /// PostgreSQL database name (défaut : env PGDATABASE / citygml)
    #[arg(long)]
    pub database: Option<String>,

    /// PostgreSQL user (défaut : env PGUSER / postgres)
    #[arg(long)]
    pub user: Option<String>,

    /// PostgreSQL password (défaut : env PGPASSWORD)
    #[arg(long)]
    pub password: Option<String>,

    /// PostgreSQL port (défaut : env PGPORT / 5432)
    #[arg(long)]
    pub port: Option<u16>,

    /// SSL mode: disable, prefer, require (défaut : env PGSSLMODE / disable)
    #[arg(long)]
    pub ssl: Option<String>,
}

/// Exécute l'import : conversion, nœuds, couche spatiale, rapport
pub async fn cmd_import(args: ImportArgs) -> Result<ConversionReport> {
    let started_at = Instant::now();

    // Un CRS imposé invalide arrête tout avant la lecture
    if let Some(epsg) = &args.epsg {
        SmartProjection::from_identifier(epsg)
            .with_context(|| format!("Invalid --epsg value: {}", epsg))?;
    }
    validate_identifier(&args.schema)?;

    let mut config = Config::resolve(&args.config)?;
    if let Some(label) = args.label {
        config.label = label;
    }
    if let Some(layer) = args.layer {
        config.layer = layer;
    }
    if args.fail_fast {
        config.failure_policy = FailurePolicy::Halt;
    }
    if config.label.is_empty() || config.layer.is_empty() {
        anyhow::bail!("Node label and spatial layer must not be empty");
    }

    let sources = citygml::open(&args.path)
        .with_context(|| format!("Failed to open {}", args.path.display()))?;
    if sources.is_empty() {
        anyhow::bail!("No CityGML documents found in {}", args.path.display());
    }

    let jobs = args.jobs.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
    });

    println!("=== Import {} ===", args.path.display());
    println!("Documents: {}", sources.len());
    println!("CRS: {}", args.epsg.as_deref().unwrap_or("from document"));
    println!("Label: {}", config.label);
    println!("Layer: {}", config.layer);
    println!("Failure policy: {:?}", config.failure_policy);
    println!("Jobs: {}", jobs);

    let pg_store = if args.dry_run {
        println!("Dry run: buildings are kept in memory");
        None
    } else {
        let mut settings = PgSettings::from_env();
        if let Some(host) = args.host {
            settings.host = host;
        }
        if let Some(port) = args.port {
            settings.port = port;
        }
        if let Some(dbname) = args.database {
            settings.dbname = dbname;
        }
        if let Some(user) = args.user {
            settings.user = user;
        }
        if args.password.is_some() {
            settings.password = args.password;
        }
        if let Some(ssl) = &args.ssl {
            settings.tls = ssl.parse()?;
        }
        println!("Database: {} (SSL: {:?})", settings.display_target(), settings.tls);

        let store = PgNodeStore::connect(&settings, &args.schema).await?;
        store.create_schema(args.drop_schema).await?;
        println!("Schema ready: {}", store.schema());
        Some(store)
    };

    let store: Arc<dyn NodeStore> = match &pg_store {
        Some(store) => Arc::new(store.clone()),
        None => Arc::new(MemoryNodeStore::new()),
    };

    let options = PipelineOptions {
        epsg: args.epsg,
        label: config.label,
        layer: config.layer,
        failure_policy: config.failure_policy,
    };
    let target = Arc::new(TargetSystem::wgs84());
    let mut report = ConversionReport::new(&args.path.display().to_string());

    store_documents(sources, store.as_ref(), target, &options, jobs, &mut report).await;

    if let Some(store) = &pg_store {
        store.create_indexes().await?;
        info!(
            nodes = store.count_nodes().await?,
            indexed = store.count_layer(&options.layer).await?,
            "Database totals"
        );
    }

    report.set_duration(started_at.elapsed());
    report.finalize();
    report.display();

    if let Some(path) = &args.report {
        report.save_to_file(path)?;
        println!("Report saved to {}", path.display());
    }

    Ok(report)
}

/// Exporte en GeoJSON, un fichier par document, en parallèle
pub fn cmd_geojson(path: &Path, output: &Path, epsg: Option<&str>) -> Result<()> {
    if let Some(epsg) = epsg {
        SmartProjection::from_identifier(epsg)
            .with_context(|| format!("Invalid --epsg value: {}", epsg))?;
    }

    let sources = citygml::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if sources.is_empty() {
        anyhow::bail!("No CityGML documents found in {}", path.display());
    }

    let target = TargetSystem::wgs84();

    // Un seul document vers un fichier .geojson explicite
    if sources.len() == 1 && output.extension().is_some_and(|ext| ext == "geojson") {
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let summary = geojson::export_to_geojson(&sources[0], &target, epsg, output)?;
        println!(
            "Export complete: {} buildings to {} ({} skipped)",
            summary.features,
            output.display(),
            summary.failed
        );
        return Ok(());
    }

    std::fs::create_dir_all(output)?;
    info!("Found {} documents to export", sources.len());

    let success_count = AtomicUsize::new(0);
    let error_count = AtomicUsize::new(0);
    let feature_count = AtomicUsize::new(0);
    let skipped_count = AtomicUsize::new(0);

    sources.par_iter().enumerate().for_each(|(index, source)| {
        let output_file = output.join(output_file_name(source, index, "geojson"));
        match geojson::export_to_geojson(source, &target, epsg, &output_file) {
            Ok(summary) => {
                success_count.fetch_add(1, Ordering::Relaxed);
                feature_count.fetch_add(summary.features, Ordering::Relaxed);
                skipped_count.fetch_add(summary.failed, Ordering::Relaxed);
                info!(
                    "Exported {} buildings to {}",
                    summary.features,
                    output_file.display()
                );
            }
            Err(e) => {
                warn!("Failed to export {}: {:#}", source.name(), e);
                error_count.fetch_add(1, Ordering::Relaxed);
            }
        }
    });

    let errors = error_count.load(Ordering::Relaxed);
    println!(
        "Export complete: {}/{} documents, {} buildings, {} skipped (EPSG:{})",
        success_count.load(Ordering::Relaxed),
        sources.len(),
        feature_count.load(Ordering::Relaxed),
        skipped_count.load(Ordering::Relaxed),
        target.epsg()
    );

    if errors > 0 {
        warn!("{} documents failed", errors);
    }

    Ok(())
}

/// Écrit les lignes `id<TAB>WKT` de tous les documents, dans l'ordre
pub fn cmd_wkt(path: &Path, output: Option<&Path>, epsg: Option<&str>) -> Result<()> {
    if let Some(epsg) = epsg {
        SmartProjection::from_identifier(epsg)
            .with_context(|| format!("Invalid --epsg value: {}", epsg))?;
    }

    let sources = citygml::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    if sources.is_empty() {
        anyhow::bail!("No CityGML documents found in {}", path.display());
    }

    let target = TargetSystem::wgs84();
    let mut writer: Box<dyn Write> = match output {
        Some(file) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(file)
                .with_context(|| format!("Failed to create file: {}", file.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    let mut features = 0;
    let mut skipped = 0;
    for source in &sources {
        match text::write_wkt(source, &target, epsg, &mut writer) {
            Ok(summary) => {
                features += summary.features;
                skipped += summary.failed;
            }
            Err(e) => warn!("Failed to export {}: {:#}", source.name(), e),
        }
    }
    writer.flush()?;

    info!(features, skipped, "WKT export complete");
    Ok(())
}

/// Nom du fichier de sortie d'un document : nom de base sans extension
///
/// L'index évite les collisions entre documents homonymes.
fn output_file_name(source: &DocumentSource, index: usize, extension: &str) -> String {
    let name = source.name();
    let base = name.rsplit(['/', '\\', '!']).next().unwrap_or(&name);

    let stem = [".gml.bz2", ".xml.bz2", ".gml", ".xml"]
        .iter()
        .find_map(|suffix| {
            base.len()
                .checked_sub(suffix.len())
                .filter(|&cut| base.is_char_boundary(cut))
                .filter(|&cut| base[cut..].eq_ignore_ascii_case(suffix))
                .map(|cut| &base[..cut])
        })
        .unwrap_or(base);

    format!("{:04}_{}.{}", index, stem, extension)
}

/// Un nom de schéma est inséré tel quel dans le SQL
fn validate_identifier(name: &str) -> Result<()> {
    let pattern = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$")?;
    if !pattern.is_match(name) {
        anyhow::bail!(
            "Invalid schema name: '{}'. Use letters, digits and underscores",
            name
        );
    }
    Ok(())
}
