pub mod types;
pub mod config;
pub mod data;
pub mod processing;
pub mod chart;
pub mod map;
pub mod view;
pub mod dispatch;
pub mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use config::AppConfig;
use types::{Record, View};
use view::{Rendered, ViewController};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render every chart view to SVG and the marker map to PNG tiles
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Decade to filter by, e.g. "1990s"
        #[arg(short, long, default_value = "All")]
        decade: String,
    },
    /// Serve the interactive dashboard
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render { config, decade } => {
            info!(?config, "Rendering dashboard");
            let app_config = AppConfig::load_from_file(config)?;

            // 1. Load Data
            let records = data::load_data(&app_config)?;

            // 2. Charts and map tiles
            render_dashboard(&app_config, records, decade)?;

            info!("Render complete");
        }
        Commands::Serve { config } => {
            info!(?config, "Serving dashboard");
            let app_config = AppConfig::load_from_file(config)?;

            let records = data::load_data(&app_config)?;
            let controller = ViewController::new(&app_config, records);
            let (handle, _dispatch) = dispatch::spawn(controller);

            server::start_server(app_config, handle).await?;
        }
    }

    Ok(())
}

/// Write `<out>/<view>.svg` for every chart view and the marker tiles under `<out>/tiles`.
fn render_dashboard(
    app_config: &AppConfig,
    records: Vec<Record>,
    decade: &str,
) -> anyhow::Result<()> {
    let mut controller = ViewController::new(app_config, records);
    controller.change_filter(decade.into())?;

    let out_dir = &app_config.output.dir;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", out_dir))?;
    for view in View::CHARTS {
        if let Rendered::Chart { svg, groups, .. } = controller.select_view(view) {
            let path = out_dir.join(format!("{}.svg", view));
            fs::write(&path, svg)
                .with_context(|| format!("Failed to write chart: {:?}", path))?;
            info!(?path, groups = groups.len(), "Wrote chart");
        }
    }

    if let Rendered::Map(snapshot) = controller.select_view(View::Map) {
        info!(markers = snapshot.marker_count, "Rendering marker tiles");
    }
    controller.map().export_tiles(
        &out_dir.join("tiles"),
        app_config.output.min_zoom,
        app_config.output.max_zoom,
    )
}
