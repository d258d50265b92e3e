//! Zip compression.
//!
//! Entries may be files or folders; folders are walked and their files
//! stored under `folderName/relativePath`, top-level files under their
//! own name. A half-written archive is always deleted before an error
//! surfaces, so a failed run leaves no artifact behind.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use crate::backend::{ResourceHandle, Storage};
use crate::cancel::CancelToken;
use crate::errors::{ErrorCode, TransferError};
use crate::location::{StorageLocation, sub_path_of};
use crate::progress::{Counters, ProgressTimer};
use crate::transfer::single::check_space;
use crate::transfer::{SpacePolicy, auto_increment_file_name, stream_copy};

use super::{ArchiveEvents, SeekWriter, discard_partial, map_zip_error};

#[derive(Debug, Clone)]
pub struct CompressOptions {
    /// Remove the original entries once the archive is complete.
    pub delete_entries_on_success: bool,
    pub space: SpacePolicy,
}

impl Default for CompressOptions {
    fn default() -> Self {
        Self {
            delete_entries_on_success: false,
            space: SpacePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResult {
    pub zip: StorageLocation,
    pub bytes_compressed: u64,
    pub total_files: u32,
    /// `(original - zipped) / original`, as a percentage.
    pub size_reduction_percent: f32,
}

/// One file scheduled for the archive.
struct PlannedEntry {
    source: ResourceHandle,
    entry_name: String,
}

/// Compress `entries` into a new zip at `target_zip`.
pub fn compress(
    storage: &Storage,
    entries: &[StorageLocation],
    target_zip: &StorageLocation,
    options: &CompressOptions,
    events: Arc<dyn ArchiveEvents>,
    cancel: &CancelToken,
) -> Result<CompressionResult, TransferError> {
    events.on_counting_files();
    let planned = plan_entries(storage, entries)?;
    let total_bytes: u64 = planned.iter().map(|p| p.source.len).sum();

    let interval = events.report_interval_millis(total_bytes);
    if interval < 0 {
        return Err(TransferError::new(ErrorCode::Canceled));
    }

    let parent = target_zip
        .parent()
        .ok_or_else(|| TransferError::new(ErrorCode::CannotCreateInTarget))?;
    check_space(storage, &parent, total_bytes, &options.space)?;

    // A zip already sitting at the target keeps its place; the new one
    // gets an incremented name.
    let zip_name = match storage.resolve(target_zip, false) {
        Some(_) => {
            let siblings: Vec<String> = storage
                .list(&parent)
                .map_err(|e| TransferError::from_io(&e))?
                .into_iter()
                .map(|h| h.name)
                .collect();
            auto_increment_file_name(&siblings, target_zip.name())
        }
        None => target_zip.name().to_string(),
    };
    let zip_loc = parent.child(&zip_name);

    info!(
        zip = %zip_loc,
        files = planned.len(),
        bytes = total_bytes,
        "compressing"
    );

    storage.create_file(&parent, &zip_name).map_err(|e| {
        TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
    })?;

    let counters = Counters::new(total_bytes);
    match write_archive(storage, &planned, &zip_loc, &counters, interval, &events, cancel) {
        Ok(()) => {}
        Err(e) => {
            discard_partial(storage, &zip_loc);
            return Err(e);
        }
    }

    let zipped_len = storage
        .resolve(&zip_loc, false)
        .map(|h| h.len)
        .unwrap_or(0);
    let size_reduction_percent = if total_bytes > 0 {
        (total_bytes.saturating_sub(zipped_len) as f64 * 100.0 / total_bytes as f64) as f32
    } else {
        0.0
    };

    if options.delete_entries_on_success {
        for entry in dedupe(entries) {
            if let Err(e) = storage.delete(&entry) {
                debug!(entry = %entry, error = %e, "could not delete archived entry");
            }
        }
    }

    info!(
        zip = %zip_loc,
        reduction = size_reduction_percent,
        "compression complete"
    );
    Ok(CompressionResult {
        zip: zip_loc,
        bytes_compressed: counters.bytes_moved(),
        total_files: counters.files_completed(),
        size_reduction_percent,
    })
}

fn write_archive(
    storage: &Storage,
    planned: &[PlannedEntry],
    zip_loc: &StorageLocation,
    counters: &Arc<Counters>,
    interval: i64,
    events: &Arc<dyn ArchiveEvents>,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let sink = storage
        .open_write(zip_loc)
        .map_err(|e| TransferError::from_io(&e))?;
    let mut writer = ZipWriter::new(SeekWriter(sink));

    // Archives tick for any positive interval; the single-file size
    // threshold does not apply here.
    let ev = Arc::clone(events);
    let _watch = (interval > 0).then(|| {
        ProgressTimer::start(
            std::time::Duration::from_millis(interval as u64),
            Arc::clone(counters),
            Arc::new(move |p| ev.on_progress(p)),
        )
    });

    for entry in planned {
        if cancel.is_canceled() {
            return Err(TransferError::new(ErrorCode::Canceled));
        }
        let opts =
            SimpleFileOptions::default().large_file(entry.source.len > u32::MAX as u64);
        writer
            .start_file(entry.entry_name.as_str(), opts)
            .map_err(map_zip_error)?;
        let mut reader = storage
            .open_read(&entry.source.location)
            .map_err(|e| TransferError::from_io(&e))?;
        stream_copy(&mut *reader, &mut writer, counters, cancel)
            .map_err(|e| TransferError::from_io(&e))?;
        counters.add_file();
    }
    writer.finish().map_err(map_zip_error)?;
    if interval > 0 {
        events.on_progress(counters.snapshot());
    }
    Ok(())
}

/// Resolve, de-duplicate and expand the request into concrete files.
/// Zero-length files are left out; an empty plan is an error.
fn plan_entries(
    storage: &Storage,
    entries: &[StorageLocation],
) -> Result<Vec<PlannedEntry>, TransferError> {
    let mut planned = Vec::new();
    let mut used_names: Vec<String> = Vec::new();

    for entry in dedupe(entries) {
        let handle = storage.resolve(&entry, false).ok_or_else(|| {
            TransferError::with_message(ErrorCode::MissingEntryFile, entry.to_string())
        })?;
        if handle.is_file() {
            if handle.len > 0 {
                push_planned(&mut planned, &mut used_names, handle, None);
            }
            continue;
        }
        let folder_base = format!("/{}", handle.location.base_path());
        let folder_name = handle.name.clone();
        for child in storage.walk(&handle.location).map_err(|e| TransferError::from_io(&e))? {
            if !child.is_file() || child.len == 0 {
                continue;
            }
            let child_abs = format!("/{}", child.location.base_path());
            let rel = sub_path_of(&child_abs, &folder_base)
                .unwrap_or(child.name.as_str())
                .to_string();
            push_planned(
                &mut planned,
                &mut used_names,
                child,
                Some(format!("{folder_name}/{rel}")),
            );
        }
    }
    if planned.is_empty() {
        return Err(TransferError::with_message(
            ErrorCode::MissingEntryFile,
            "nothing to compress",
        ));
    }
    Ok(planned)
}

fn push_planned(
    planned: &mut Vec<PlannedEntry>,
    used_names: &mut Vec<String>,
    source: ResourceHandle,
    name: Option<String>,
) {
    let wanted = name.unwrap_or_else(|| source.name.clone());
    let entry_name = auto_increment_file_name(used_names, &wanted);
    used_names.push(entry_name.clone());
    planned.push(PlannedEntry { source, entry_name });
}

fn dedupe(entries: &[StorageLocation]) -> Vec<StorageLocation> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| seen.insert((*e).clone()))
        .cloned()
        .collect()
}
