use std::fs::File;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod columns;
mod controller;
mod dataset;
mod domain;
mod grid;
mod inputter;
mod loader;
mod model;
mod parser;
mod snapshot;
mod sorter;
mod ui;

use controller::Controller;
use domain::{RowLimit, ViewerConfig, ViewerError};
use model::{Model, Status};
use snapshot::Snapshot;
use ui::TableUI;

#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Browse a csv dataset in the terminal
    View {
        /// Local path or http(s) url of the csv file
        #[arg(conflicts_with = "snapshot")]
        csv: Option<String>,

        /// Rows per page, a positive number or "all", anything else means 100
        #[arg(long, default_value = "100", value_parser = parse_row_limit)]
        rows: RowLimit,

        /// Base url relative csv locations are resolved against
        #[arg(long)]
        base_url: Option<url::Url>,

        /// Snapshot (data.js or json) naming the dataset to open
        #[arg(long, requires = "ecosystem")]
        snapshot: Option<String>,

        /// Ecosystem key inside the snapshot
        #[arg(long, requires = "snapshot")]
        ecosystem: Option<String>,

        #[arg(long, default_value_t = 40)]
        max_column_width: usize,

        /// Directory the raw csv is written to on download
        #[arg(long, default_value = ".")]
        download_dir: String,

        #[arg(long, default_value = "statview.log")]
        log_file: String,
    },
    /// Print the concentration statistics stored in a snapshot
    Stats {
        snapshot: String,

        #[arg(long)]
        ecosystem: Option<String>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let result = match cli.command {
        Command::View {
            csv,
            rows,
            base_url,
            snapshot,
            ecosystem,
            max_column_width,
            download_dir,
            log_file,
        } => init_logging(&log_file).and_then(|_| {
            let mut cfg = ViewerConfig::default()
                .with_row_limit(rows)
                .with_max_column_width(max_column_width)
                .with_download_dir(expand_path(&download_dir)?);
            if let Some(url) = base_url {
                cfg = cfg.with_base_url(url);
            }
            let location = match (csv, snapshot, ecosystem) {
                (Some(csv), _, _) => Some(csv),
                (None, Some(path), Some(key)) => {
                    let path = expand_path(&path)?;
                    let snapshot = Snapshot::load(&path)?;
                    Some(snapshot.data_file_location(&key, &path, cfg.base_url.is_some())?)
                }
                _ => None,
            };
            run(&cfg, location)
        }),
        Command::Stats {
            snapshot,
            ecosystem,
        } => stats(&snapshot, ecosystem.as_deref()),
    };

    match result {
        Err(e) => {
            error!("Exiting with error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn parse_row_limit(value: &str) -> Result<RowLimit, ViewerError> {
    Ok(RowLimit::from_selector(value))
}

fn expand_path(path: &str) -> Result<PathBuf, ViewerError> {
    let expanded =
        shellexpand::full(path).map_err(|e| ViewerError::InvalidLocation(e.to_string()))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

// The terminal belongs to the TUI, so traces go to a file.
fn init_logging(log_file: &str) -> Result<(), ViewerError> {
    let file = File::create(expand_path(log_file)?)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
        .with(ErrorLayer::default())
        .init();
    Ok(())
}

fn stats(snapshot: &str, ecosystem: Option<&str>) -> Result<(), ViewerError> {
    let snapshot = Snapshot::load(&expand_path(snapshot)?)?;
    print!("{}", snapshot.render_summary(ecosystem)?);
    Ok(())
}

fn run(cfg: &ViewerConfig, location: Option<String>) -> Result<(), ViewerError> {
    info!("Starting statview with {cfg:?}");

    let mut terminal = ratatui::init();
    let result = (|| -> Result<(), ViewerError> {
        let size = terminal.size()?;
        let mut model = Model::init(cfg, size.width as usize, size.height as usize);
        if let Some(location) = location {
            model.open(&location);
        }
        let mut ui = TableUI::new();
        let controller = Controller::new(cfg);

        while model.status != Status::QUITTING {
            terminal.draw(|f| ui.draw(&model, f))?;
            // None still gives the model a chance to pick up finished fetches
            let message = controller.handle_event(&model)?;
            model.update(message)?;
        }
        Ok(())
    })();
    ratatui::restore();
    result
}
