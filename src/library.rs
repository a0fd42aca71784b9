// memreplay (camcorder sidecar cataloguer)
// Copyright (C) 2025 Andrew Nissen

use crate::db::{BatchReport, Catalog};
use crate::error::CatalogError;
use crate::modd::{ModdRecord, ModdSet};
use crate::video::{ContentHash, VideoRecord};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub modds: BatchReport,
    pub videos: BatchReport,
    /// True if a cancellation request stopped the run between batches
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RelocationReport {
    pub moved: usize,
    pub failed: usize,
    /// Videos that were never fingerprinted
    pub skipped: usize,
}

/// Parse every sidecar. Files that cannot be read or decoded are logged and
/// left out of the set.
pub fn import_modds(paths: &[PathBuf]) -> ModdSet {
    let mut modds = ModdSet::new();
    for path in paths {
        match ModdRecord::from_path(path) {
            Ok(modd) => {
                modds.push(modd);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping sidecar"),
        }
    }
    info!(parsed = modds.len(), found = paths.len(), "imported sidecar files");
    modds
}

/// Find and fingerprint the video paired with every sidecar in the set.
/// When several videos share a fingerprint only the first is kept; videos
/// without a fingerprint are all kept so the catalog can report them.
pub fn resolve_videos(modds: &ModdSet) -> Vec<VideoRecord> {
    let pb = ProgressBar::new(modds.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message("fingerprinting videos");

    let mut videos = Vec::with_capacity(modds.len());
    let mut seen: HashMap<ContentHash, usize> = HashMap::new();
    for id in modds.ids() {
        if let Some(video) = VideoRecord::from_modd(modds, id) {
            if video.hash.is_empty() {
                videos.push(video);
            } else if let Some(&kept) = seen.get(&video.hash) {
                warn!(
                    duplicate = %video.location.display(),
                    kept = %videos[kept].location.display(),
                    "skipping video with duplicate content"
                );
            } else {
                seen.insert(video.hash.clone(), videos.len());
                videos.push(video);
            }
        }
        pb.inc(1);
    }

    pb.finish_and_clear();
    videos
}

/// Add new sidecars, then insert or diff-update their videos, one
/// transaction per batch. Cancellation is only checked between batches.
pub fn sync_catalog(
    catalog: &Catalog,
    modds: &ModdSet,
    videos: &[VideoRecord],
    batch_size: usize,
    cancel: &AtomicBool,
) -> Result<SyncReport, CatalogError> {
    let mut report = SyncReport::default();

    report.cancelled = for_each_batch(modds.records(), batch_size, cancel, &mut report.modds, |batch| {
        catalog.add_entries(batch)
    })?;
    if report.cancelled {
        return Ok(report);
    }

    report.cancelled = for_each_batch(videos, batch_size, cancel, &mut report.videos, |batch| {
        catalog.update_entries(batch)
    })?;
    Ok(report)
}

/// Write current sidecar and video locations back to the catalog.
pub fn reconcile_locations(
    catalog: &Catalog,
    modds: &ModdSet,
    videos: &[VideoRecord],
    batch_size: usize,
    cancel: &AtomicBool,
) -> Result<SyncReport, CatalogError> {
    let mut report = SyncReport::default();

    report.cancelled = for_each_batch(modds.records(), batch_size, cancel, &mut report.modds, |batch| {
        catalog.update_entries(batch)
    })?;
    if report.cancelled {
        return Ok(report);
    }

    report.cancelled = for_each_batch(videos, batch_size, cancel, &mut report.videos, |batch| {
        catalog.update_entries(batch)
    })?;
    Ok(report)
}

/// Move every fingerprinted video, with its sidecar, into the archive tree
/// under `root`.
pub fn relocate_videos(videos: &mut [VideoRecord], modds: &mut ModdSet, root: &Path) -> RelocationReport {
    let mut report = RelocationReport::default();
    for video in videos.iter_mut() {
        if video.hash.is_empty() {
            report.skipped += 1;
            continue;
        }
        if video.relocate(root, modds) {
            report.moved += 1;
        } else {
            warn!(video = %video.location.display(), "relocation incomplete");
            report.failed += 1;
        }
    }
    report
}

fn for_each_batch<T, F>(
    items: &[T],
    batch_size: usize,
    cancel: &AtomicBool,
    total: &mut BatchReport,
    mut write: F,
) -> Result<bool, CatalogError>
where
    F: FnMut(&[T]) -> Result<BatchReport, CatalogError>,
{
    for batch in items.chunks(batch_size.max(1)) {
        if cancel.load(Ordering::SeqCst) {
            warn!("cancellation requested; stopping before next batch");
            return Ok(true);
        }
        total.merge(write(batch)?);
    }
    Ok(false)
}
