// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as
// published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use crate::config::{MemReplayConfig, is_valid_config_field, set_config_field, unset_config_field};
use crate::db::Catalog;
use crate::error::CatalogError;
use crate::library::SyncReport;
use crate::modd::{ModdRecord, ModdSet};
use crate::video::VideoRecord;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

mod config;
mod db;
mod error;
mod files;
mod library;
mod modd;
mod time;
mod video;
mod vt;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(about = "Scan for .modd files and update the catalog")]
    Update {
        #[arg(help = "Directories to scan (defaults to the configured watch directories)")]
        directories: Vec<String>,
    },
    #[command(about = "Update the catalog, then move videos into a year/month archive tree")]
    Relocate {
        #[arg(short = 'r', long, help = "Archive root (defaults to the configured archive_root)")]
        root: Option<String>,
        #[arg(help = "Directories to scan (defaults to the configured watch directories)")]
        directories: Vec<String>,
    },
    #[command(about = "List catalogued entries as JSON")]
    List {
        #[command(subcommand)]
        list_command: Option<ListCommands>,
    },
    #[command(about = "Parse a single .modd file and show its paired video")]
    #[command(arg_required_else_help = true)]
    Inspect {
        #[arg(help = "Path to the .modd file")]
        path: String,
    },
    #[command(about = "Display current configuration settings")]
    Config {
        #[command(subcommand)]
        config_command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Debug)]
enum ListCommands {
    #[command(about = "List catalogued videos")]
    Videos,
    #[command(about = "List catalogued .modd files")]
    Modds,
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    #[command(about = "Display current configuration settings")]
    Show,
    #[command(about = "Display path to configuration file")]
    Path,
    #[command(about = "Set a configuration field")]
    Set {
        #[arg(help = "Field name to set")]
        field: String,
        #[arg(help = "Value to set")]
        value: String,
    },
    #[command(about = "Unset/clear a configuration field")]
    Unset {
        #[arg(help = "Field name to unset")]
        field: String,
    },
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "memreplay=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn cancellation_flag() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal, stopping after the current batch");
        flag.store(true, Ordering::SeqCst);
    }) {
        tracing::warn!(error = %e, "could not install interrupt handler");
    }
    cancel
}

fn scan_directories(cfg: &MemReplayConfig, directories: Vec<String>) -> Vec<String> {
    if directories.is_empty() {
        cfg.watch_directories.clone()
    } else {
        directories
    }
}

struct Scan {
    modds: ModdSet,
    videos: Vec<VideoRecord>,
}

fn scan_and_update(
    cfg: &MemReplayConfig,
    catalog: &Catalog,
    directories: &[String],
    cancel: &AtomicBool,
) -> Result<(Scan, SyncReport), Box<dyn std::error::Error>> {
    println!("Searching for modd files...");
    let paths = files::find_modd_files(directories)?;
    let modds = library::import_modds(&paths);

    println!("Searching for video files...");
    let videos = library::resolve_videos(&modds);

    println!("Updating catalog...");
    let report = exit_on_catalog_error(library::sync_catalog(
        catalog,
        &modds,
        &videos,
        cfg.effective_batch_size(),
        cancel,
    ));
    print_sync_report(&report);

    Ok((Scan { modds, videos }, report))
}

fn print_sync_report(report: &SyncReport) {
    println!(
        "modd entries: {} added, {} updated, {} already present, {} rejected",
        report.modds.inserted, report.modds.updated, report.modds.skipped, report.modds.rejected
    );
    println!(
        "video entries: {} added, {} updated, {} unchanged, {} rejected",
        report.videos.inserted, report.videos.updated, report.videos.unchanged, report.videos.rejected
    );
    if report.cancelled {
        println!("Stopped early at user request.");
    }
}

fn exit_on_catalog_error<T>(result: Result<T, CatalogError>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error updating catalog: {}", e);
            if e.is_retryable() {
                eprintln!("The catalog is in use by another process, run the command again later.");
            }
            std::process::exit(1);
        }
    }
}

fn inspect(path: &Path) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let mut modds = ModdSet::new();
    let id = modds.push(ModdRecord::from_path(path)?);
    let video = VideoRecord::from_modd(&modds, id);
    let modd = modds.get(id).ok_or("sidecar missing from set")?;
    Ok(serde_json::json!({
        "modd": modd,
        "video": video,
    }))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    match args.command {
        Some(Commands::Update { directories }) => {
            let cfg = config::load_config()?;
            let directories = scan_directories(&cfg, directories);
            if directories.is_empty() {
                eprintln!("Error: no directories given and no watch_directories configured");
                std::process::exit(1);
            }

            let catalog = Catalog::open(&cfg.database_path)?;
            let cancel = cancellation_flag();
            scan_and_update(&cfg, &catalog, &directories, &cancel)?;
            println!("Done!");
        }
        Some(Commands::Relocate { root, directories }) => {
            let cfg = config::load_config()?;
            let root = root.unwrap_or_else(|| cfg.archive_root.clone());
            if root.is_empty() {
                eprintln!("Error: no archive root given and no archive_root configured");
                std::process::exit(1);
            }
            let directories = scan_directories(&cfg, directories);
            if directories.is_empty() {
                eprintln!("Error: no directories given and no watch_directories configured");
                std::process::exit(1);
            }

            let catalog = Catalog::open(&cfg.database_path)?;
            let cancel = cancellation_flag();
            let (mut scan, report) = scan_and_update(&cfg, &catalog, &directories, &cancel)?;
            if report.cancelled {
                return Ok(());
            }

            println!("Relocating misplaced videos...");
            let relocation =
                library::relocate_videos(&mut scan.videos, &mut scan.modds, &PathBuf::from(&root));
            println!(
                "videos: {} relocated, {} failed, {} skipped",
                relocation.moved, relocation.failed, relocation.skipped
            );

            let report = exit_on_catalog_error(
                library::reconcile_locations(
                    &catalog,
                    &scan.modds,
                    &scan.videos,
                    cfg.effective_batch_size(),
                    &cancel,
                ),
            );
            print_sync_report(&report);
            println!("Done!");
        }
        Some(Commands::List { list_command }) => {
            let cfg = config::load_config()?;
            let catalog = Catalog::open(&cfg.database_path)?;
            let json_output = match list_command {
                Some(ListCommands::Modds) => serde_json::to_string_pretty(&catalog.list_modds()?)?,
                Some(ListCommands::Videos) | None => {
                    serde_json::to_string_pretty(&catalog.list_videos()?)?
                }
            };
            println!("{}", json_output);
        }
        Some(Commands::Inspect { path }) => match inspect(Path::new(&path)) {
            Ok(value) => println!("{}", serde_json::to_string_pretty(&value)?),
            Err(e) => {
                eprintln!("Error reading {}: {}", path, e);
                std::process::exit(1);
            }
        },
        Some(Commands::Config { config_command }) => match config_command {
            Some(ConfigCommands::Show) | None => {
                let cfg: MemReplayConfig = config::load_config()?;
                let json_output = serde_json::to_string_pretty(&cfg)?;
                println!("{}", json_output);
            }
            Some(ConfigCommands::Path) => {
                let config_path = config::config_file_path()?;
                println!("{}", config_path.display());
            }
            Some(ConfigCommands::Set { field, value }) => {
                if !is_valid_config_field(&field) {
                    eprintln!(
                        "Error: Unknown field '{}'. Valid fields are: {}",
                        field,
                        config::CONFIG_FIELDS.join(", ")
                    );
                    std::process::exit(1);
                }

                let mut cfg: MemReplayConfig = config::load_config()?;

                if let Err(e) = set_config_field(&mut cfg, &field, &value) {
                    eprintln!("Error setting field: {}", e);
                    std::process::exit(1);
                }

                config::store_config(&cfg)?;
                println!("Set {} = {}", field, value);
            }
            Some(ConfigCommands::Unset { field }) => {
                if !is_valid_config_field(&field) {
                    eprintln!(
                        "Error: Unknown field '{}'. Valid fields are: {}",
                        field,
                        config::CONFIG_FIELDS.join(", ")
                    );
                    std::process::exit(1);
                }

                let mut cfg: MemReplayConfig = config::load_config()?;

                if let Err(e) = unset_config_field(&mut cfg, &field) {
                    eprintln!("Error unsetting field: {}", e);
                    std::process::exit(1);
                }

                config::store_config(&cfg)?;
                println!("Unset {}", field);
            }
        },
        None => {}
    }

    Ok(())
}
