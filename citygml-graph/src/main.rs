//! Point d'entrée CLI pour citygml-graph

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

use citygml_graph::report::ConversionStatus;

// Charger .env au démarrage
fn load_env() {
    if dotenvy::dotenv().is_err() {
        // Essayer depuis le répertoire du binaire
        if let Ok(exe) = std::env::current_exe() {
            if let Some(dir) = exe.parent() {
                let _ = dotenvy::from_path(dir.join(".env"));
            }
        }
    }
}

mod cli;

use cli::{Commands, ImportArgs};

/// Convertir les bâtiments CityGML en nœuds géolocalisés
#[derive(Parser)]
#[command(name = "citygml-graph")]
#[command(author, version)]
#[command(about = "Convertir les bâtiments CityGML en WKT WGS84 et les stocker dans PostGIS (défaut)")]
#[command(long_about = "Lit les bâtiments CityGML, choisit le LOD le plus simple, reprojette la géométrie en WGS84 et crée un nœud par bâtiment dans une couche spatiale PostGIS.\n\nUtilisez 'to-geojson' ou 'to-wkt' pour un export fichier sans base de données.")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Augmenter la verbosité (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Mode silencieux
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Sous-commande (défaut: import vers PostGIS)
    #[command(subcommand)]
    command: Option<Commands>,

    /// Arguments de l'import (commande par défaut)
    #[command(flatten)]
    import: Option<ImportArgs>,
}

#[tokio::main]
async fn main() -> Result<()> {
    load_env();

    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match cli.command {
        Some(Commands::ToGeojson { path, output, epsg }) => {
            info!(path = %path.display(), output = %output.display(), epsg = ?epsg, "Export vers GeoJSON");
            cli::cmd_geojson(&path, &output, epsg.as_deref())?;
        }
        Some(Commands::ToWkt { path, output, epsg }) => {
            info!(path = %path.display(), epsg = ?epsg, "Export vers WKT");
            cli::cmd_wkt(&path, output.as_deref(), epsg.as_deref())?;
        }
        None => {
            let args = cli
                .import
                .ok_or_else(|| anyhow!("Missing --path (or use a subcommand, see --help)"))?;
            info!(path = %args.path.display(), epsg = ?args.epsg, "Import vers PostGIS");

            let report = cli::cmd_import(args).await?;
            if report.status == ConversionStatus::Failed {
                return Err(anyhow!("Import failed: {}", report.summary()));
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::WARN,
        (_, 0) => Level::INFO,
        (_, 1) => Level::DEBUG,
        (_, _) => Level::TRACE,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .init();
}
