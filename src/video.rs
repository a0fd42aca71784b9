// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use crate::error::FingerprintError;
use crate::files;
use crate::modd::{ModdId, ModdSet};
use crate::time::Time;
use serde::{Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Candidate video extensions, in lookup priority order.
pub const VIDEO_EXTS: [&str; 6] = ["mpg", "mpeg", "mp4", "m4v", "mkv", "avi"];

/// Number of leading bytes hashed to identify a video.
pub const READ_SIZE: u64 = 5_120_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Container {
    Mpeg,
    Mp4,
    Mkv,
    Avi,
    Unknown,
}

impl Container {
    /// Look up the container for a file extension. Only the exact lower- and
    /// upper-case spellings the resolver tries are recognised.
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "mpg" | "MPG" | "mpeg" | "MPEG" => Container::Mpeg,
            "mp4" | "MP4" | "m4v" | "M4V" => Container::Mp4,
            "mkv" | "MKV" => Container::Mkv,
            "avi" | "AVI" => Container::Avi,
            _ => Container::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Container::from_extension)
            .unwrap_or(Container::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VideoCodec {
    Mpeg2,
    X264,
    X265,
    Unknown,
}

impl VideoCodec {
    /// Best guess from the container alone; no stream probing is done.
    pub fn guess(container: Container) -> Self {
        match container {
            Container::Mpeg => VideoCodec::Mpeg2,
            _ => VideoCodec::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AudioCodec {
    Ac3,
    Aac,
    Vorbis,
    Unknown,
}

/// SHA-256 of a video's first [`READ_SIZE`] bytes. Empty when the video
/// could not be read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContentHash(Vec<u8>);

impl ContentHash {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        ContentHash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ContentHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoRecord {
    pub name: String,
    pub location: PathBuf,
    pub creation_time: Time,
    pub duration: f64,
    pub hash: ContentHash,
    pub container: Container,
    pub video_codec: VideoCodec,
    pub audio_codec: AudioCodec,
    /// Size reported by the sidecar, in bytes
    pub file_size: u64,
    pub modd_check_code: Option<u32>,
    #[serde(skip)]
    pub linked_modd: Option<ModdId>,
}

impl VideoRecord {
    /// Locate and fingerprint the video paired with a sidecar in `modds`.
    ///
    /// A video that cannot be read is logged and returned with an empty hash
    /// so one bad file never aborts a run.
    pub fn from_modd(modds: &ModdSet, id: ModdId) -> Option<Self> {
        let modd = modds.get(id)?;
        let location = resolve_location(&modd.location);

        let hash = match fingerprint(&location) {
            Ok(hash) => hash,
            Err(e) => {
                warn!(sidecar = %modd.location.display(), error = %e, "could not fingerprint video");
                ContentHash::default()
            }
        };

        let mut video = Self::from_parts(
            &location,
            Time::from_unix_secs(modd.date_time_actual),
            modd.duration,
            hash,
            modd.file_size,
            Some(modd.check_code),
        );
        video.linked_modd = Some(id);
        Some(video)
    }

    /// Build a record without a linked sidecar, e.g. from a catalog row.
    pub fn from_parts(
        location: &Path,
        creation_time: Time,
        duration: f64,
        hash: ContentHash,
        file_size: u64,
        modd_check_code: Option<u32>,
    ) -> Self {
        let container = Container::from_path(location);
        VideoRecord {
            name: location
                .file_name()
                .unwrap_or_default()
                .to_string_lossy()
                .to_string(),
            location: location.to_path_buf(),
            creation_time,
            duration,
            hash,
            container,
            video_codec: VideoCodec::guess(container),
            audio_codec: AudioCodec::Unknown,
            file_size,
            modd_check_code,
            linked_modd: None,
        }
    }

    /// Directory this video belongs in under `root_dir`: `<root>/<year>/<Month>/`.
    pub fn archive_dir(&self, root_dir: &Path) -> PathBuf {
        root_dir
            .join(self.creation_time.year().to_string())
            .join(self.creation_time.month_name())
    }

    /// Move the video into its archive directory, then move the linked
    /// sidecar next to it. Returns false if any step failed.
    pub fn relocate(&mut self, root_dir: &Path, modds: &mut ModdSet) -> bool {
        let out_dir = self.archive_dir(root_dir);
        let outcome = files::move_into_directory(&self.location, &out_dir);
        if let Some(new_location) = outcome.new_location {
            self.location = new_location;
        }
        if !outcome.success {
            return false;
        }

        match self.linked_modd.and_then(|id| modds.get_mut(id)) {
            Some(modd) => modd.relocate(&out_dir),
            None => true,
        }
    }
}

impl fmt::Display for VideoRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location.display(), self.hash)
    }
}

/// Swap the sidecar's extension for each known video extension, lower case
/// first, and return the first candidate that exists. When nothing matches
/// the last candidate tried is returned, and hashing it will fail.
pub fn resolve_location(modd_path: &Path) -> PathBuf {
    let mut candidate = modd_path.to_path_buf();
    for ext in VIDEO_EXTS {
        for ext in [ext.to_string(), ext.to_uppercase()] {
            candidate = modd_path.with_extension(&ext);
            if candidate.exists() {
                return candidate;
            }
        }
    }
    candidate
}

/// Hash the first [`READ_SIZE`] bytes of a file.
pub fn fingerprint(path: &Path) -> Result<ContentHash, FingerprintError> {
    fingerprint_prefix(path, READ_SIZE)
}

fn fingerprint_prefix(path: &Path, limit: u64) -> Result<ContentHash, FingerprintError> {
    let file = File::open(path).map_err(|source| FingerprintError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let mut buffer = Vec::new();
    file.take(limit)
        .read_to_end(&mut buffer)
        .map_err(|source| FingerprintError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    let mut hasher = Sha256::new();
    hasher.update(&buffer);
    Ok(ContentHash(hasher.finalize().to_vec()))
}
