// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use crate::db;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const CONFIG_FIELDS: &[&str] = &[
    "watch_directories",
    "archive_root",
    "database_path",
    "batch_size",
];

fn default_database_path() -> String {
    db::get_db_path().to_string_lossy().to_string()
}

fn default_batch_size() -> usize {
    500
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct MemReplayConfig {
    #[serde(default)]
    pub watch_directories: Vec<String>,
    #[serde(default)]
    pub archive_root: String,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MemReplayConfig {
    fn default() -> Self {
        Self {
            watch_directories: Vec::new(),
            archive_root: String::new(),
            database_path: default_database_path(),
            batch_size: default_batch_size(),
        }
    }
}

impl MemReplayConfig {
    /// Records per catalog transaction, never zero.
    pub fn effective_batch_size(&self) -> usize {
        self.batch_size.max(1)
    }
}

pub fn load_config() -> Result<MemReplayConfig, confy::ConfyError> {
    if let Ok(config_path) = std::env::var("MEMREPLAY_CONFIG_PATH") {
        confy::load_path(&config_path)
    } else {
        confy::load("memreplay", "config")
    }
}

pub fn store_config(config: &MemReplayConfig) -> Result<(), confy::ConfyError> {
    if let Ok(config_path) = std::env::var("MEMREPLAY_CONFIG_PATH") {
        confy::store_path(&config_path, config)
    } else {
        confy::store("memreplay", "config", config)
    }
}

pub fn config_file_path() -> Result<PathBuf, confy::ConfyError> {
    if let Ok(config_path) = std::env::var("MEMREPLAY_CONFIG_PATH") {
        Ok(PathBuf::from(config_path))
    } else {
        confy::get_configuration_file_path("memreplay", "config")
    }
}

pub fn is_valid_config_field(field: &str) -> bool {
    CONFIG_FIELDS.contains(&field)
}

pub fn set_config_field(cfg: &mut MemReplayConfig, field: &str, value: &str) -> Result<(), String> {
    match field {
        "archive_root" => cfg.archive_root = value.to_string(),
        "database_path" => cfg.database_path = value.to_string(),
        "watch_directories" => {
            // Treat the value as a single directory to add
            if !cfg.watch_directories.contains(&value.to_string()) {
                cfg.watch_directories.push(value.to_string());
            }
        }
        "batch_size" => {
            cfg.batch_size = value
                .parse::<usize>()
                .map_err(|_| format!("Invalid number for batch_size: {}", value))?;
        }
        _ => return Err(format!("Unknown field: {}", field)),
    }
    Ok(())
}

pub fn unset_config_field(cfg: &mut MemReplayConfig, field: &str) -> Result<(), String> {
    match field {
        "archive_root" => cfg.archive_root = String::new(),
        "database_path" => cfg.database_path = default_database_path(),
        "watch_directories" => cfg.watch_directories.clear(),
        "batch_size" => cfg.batch_size = default_batch_size(),
        _ => return Err(format!("Unknown field: {}", field)),
    }
    Ok(())
}
