// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use crate::error::ModdError;
use crate::files;
use crate::vt::{self, Vt};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>";
const DATA_HEADER: &str = "<plist version=\"1.0\"><dict><key>MetaDataList</key><array><dict>";
const DATA_FOOTER: &str =
    "</dict></array><key>XMLFileType</key><string>ModdXML</string></dict></plist>";

/// Seconds between 1899-12-30 (the sidecar epoch) and 1970-01-01.
pub const EPOCH_OFFSET_SECS: i64 = 2_209_161_600;
/// Camcorder clocks are assumed to run on Central Standard Time (UTC-6).
pub const TIMEZONE_OFFSET_SECS: i64 = 6 * 3600;

const SECS_PER_DAY: f64 = 86_400.0;

/// Structured contents of a `.modd` sidecar file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModdRecord {
    /// File name of the sidecar
    pub name: String,
    pub location: PathBuf,
    pub check_code: u32,
    /// Days since 1899-12-30
    pub date_time_original: f64,
    /// Unix seconds, derived from `date_time_original`
    pub date_time_actual: i64,
    /// Seconds
    pub duration: f64,
    /// Bytes
    pub file_size: u64,
    pub vt_list: Vec<Vt>,
}

impl ModdRecord {
    /// Read and parse the sidecar at `path`.
    pub fn from_path(path: &Path) -> Result<Self, ModdError> {
        let bytes = fs::read(path).map_err(|source| ModdError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&String::from_utf8_lossy(&bytes), path)
    }

    /// Parse sidecar text. Unrecognised keys and unparsable scalar values are
    /// skipped; only a malformed `VTList` entry fails the parse.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ModdError> {
        let mut modd = ModdRecord {
            name: path
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            location: path.to_path_buf(),
            ..Default::default()
        };

        let mut in_array = false;
        for line in clean_text(text).lines() {
            if in_array {
                if line.contains(']') {
                    in_array = false;
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                modd.vt_list.push(vt::parse_vt(line)?);
                continue;
            }

            let (key, value) = line.split_once(',').unwrap_or((line, ""));
            let key = key.trim();
            let value = value.trim();
            match key {
                "CheckCode" => {
                    if let Some(code) = parse_value(path, key, value, parse_check_code) {
                        modd.check_code = code;
                    }
                }
                "DateTimeOriginal" => {
                    if let Some((days, actual)) = parse_value(path, key, value, parse_day_count) {
                        modd.date_time_original = days;
                        modd.date_time_actual = actual;
                    }
                }
                "Duration" => {
                    if let Some(duration) = parse_value(path, key, value, f64::from_str) {
                        modd.duration = duration;
                    }
                }
                "FileSize" => {
                    if let Some(size) = parse_value(path, key, value, u64::from_str) {
                        modd.file_size = size;
                    }
                }
                "VTList" => {
                    if value.starts_with('[') {
                        in_array = true;
                    }
                }
                "" => {}
                other => debug!(key = other, path = %path.display(), "skipping unsupported sidecar key"),
            }
        }

        Ok(modd)
    }

    /// True if both records describe the same clip. Location is not compared,
    /// so a copy of a sidecar in another directory matches the original.
    pub fn same_contents(&self, other: &ModdRecord) -> bool {
        self.name == other.name
            && self.check_code == other.check_code
            && self.date_time_original == other.date_time_original
            && self.date_time_actual == other.date_time_actual
            && self.duration == other.duration
            && self.file_size == other.file_size
            && self.vt_list == other.vt_list
    }

    /// Move the sidecar file into `out_dir`. The location only changes once
    /// the original has been removed.
    pub fn relocate(&mut self, out_dir: &Path) -> bool {
        let outcome = files::move_into_directory(&self.location, out_dir);
        if let Some(new_location) = outcome.new_location {
            self.location = new_location;
        }
        outcome.success
    }
}

impl fmt::Display for ModdRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ Name = {}, CheckCode = {:X}, DateTimeOriginal = {:.15}, DateTimeActual = {}, Duration = {:.15}, FileSize = {}, VTList = [",
            self.name,
            self.check_code,
            self.date_time_original,
            self.date_time_actual,
            self.duration,
            self.file_size
        )?;
        for (i, vt) in self.vt_list.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", vt)?;
        }
        write!(f, "]}}")
    }
}

/// Convert days since 1899-12-30 (camcorder local time) into unix seconds.
/// Returns `None` for non-finite day counts or results outside `i64`.
pub fn actual_time(date_time_original: f64) -> Option<i64> {
    let original_secs = (date_time_original * SECS_PER_DAY).floor();
    if !original_secs.is_finite() || original_secs < i64::MIN as f64 || original_secs >= i64::MAX as f64 {
        return None;
    }
    (original_secs as i64)
        .checked_sub(EPOCH_OFFSET_SECS)?
        .checked_add(TIMEZONE_OFFSET_SECS)
}

/// Base-16 check code, with or without a `0x` prefix.
fn parse_check_code(value: &str) -> Result<u32, std::num::ParseIntError> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u32::from_str_radix(digits, 16)
}

fn parse_day_count(value: &str) -> Result<(f64, i64), String> {
    let days = f64::from_str(value).map_err(|e| e.to_string())?;
    let actual = actual_time(days).ok_or_else(|| "day count out of range".to_string())?;
    Ok((days, actual))
}

/// Strip the plist envelope and flatten the markup into one `key,value`
/// pair per line, with `VTList` entries between `[` and `]` lines.
fn clean_text(text: &str) -> String {
    let text = text
        .replacen(XML_HEADER, "", 1)
        .replacen(DATA_HEADER, "", 1)
        .replacen(DATA_FOOTER, "", 1);

    text.replace("<key>", "")
        .replace("</key>", ",")
        .replace("<string>", "")
        .replace("</string>", "\n")
        .replace("<real>", "")
        .replace("</real>", "\n")
        .replace("<integer>", "")
        .replace("</integer>", "\n")
        .replace("<array>", "[\n")
        .replace("</array>", "]\n")
        .trim()
        .to_string()
}

fn parse_value<T, E, F>(path: &Path, key: &str, value: &str, parse: F) -> Option<T>
where
    F: FnOnce(&str) -> Result<T, E>,
    E: fmt::Display,
{
    match parse(value) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            warn!(path = %path.display(), key, value, error = %e, "ignoring unparsable sidecar value");
            None
        }
    }
}

/// Stable handle to a record stored in a [`ModdSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModdId(usize);

/// Owns every parsed sidecar for a run. Videos refer back to their sidecar
/// through a [`ModdId`], so the set must outlive them.
#[derive(Debug, Default)]
pub struct ModdSet {
    records: Vec<ModdRecord>,
    by_check_code: HashMap<u32, Vec<usize>>,
}

impl ModdSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record and return its handle. A record with the same contents
    /// as one already in the set is dropped and the existing handle returned.
    pub fn push(&mut self, modd: ModdRecord) -> ModdId {
        let candidates = self.by_check_code.entry(modd.check_code).or_default();
        if let Some(&index) = candidates
            .iter()
            .find(|&&index| self.records[index].same_contents(&modd))
        {
            debug!(
                duplicate = %modd.location.display(),
                kept = %self.records[index].location.display(),
                "skipping duplicate sidecar"
            );
            return ModdId(index);
        }

        candidates.push(self.records.len());
        self.records.push(modd);
        ModdId(self.records.len() - 1)
    }

    pub fn get(&self, id: ModdId) -> Option<&ModdRecord> {
        self.records.get(id.0)
    }

    pub fn get_mut(&mut self, id: ModdId) -> Option<&mut ModdRecord> {
        self.records.get_mut(id.0)
    }

    pub fn ids(&self) -> impl Iterator<Item = ModdId> + '_ {
        (0..self.records.len()).map(ModdId)
    }

    pub fn records(&self) -> &[ModdRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
