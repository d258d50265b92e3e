//! Zip decompression.
//!
//! The archive is consumed as a forward-only stream, entry by entry, so
//! it never has to fit in memory and works over any backend read
//! stream. Extraction is idempotent: a target file that already exists
//! with content is left alone and its would-be bytes are accounted
//! separately. Cancellation keeps whatever was already written,
//! including the file that was in flight.

use std::sync::Arc;

use tracing::{debug, info};
use zip::read::read_zipfile_from_stream;

use crate::backend::Storage;
use crate::cancel::CancelToken;
use crate::errors::{ErrorCode, TransferError};
use crate::location::{StorageLocation, trim_separators};
use crate::progress::Counters;
use crate::transfer::stream_copy;

use super::{ArchiveEvents, map_zip_error};

#[derive(Debug, Clone, Copy, Default)]
pub struct DecompressOptions {
    /// Remove the archive itself once extraction succeeds.
    pub delete_zip_on_success: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompressionResult {
    pub zip: StorageLocation,
    pub target_folder: StorageLocation,
    pub bytes_decompressed: u64,
    /// On-disk sizes of target files that already existed and were
    /// left untouched.
    pub skipped_decompressed_bytes: u64,
    pub total_files: u32,
}

/// Extract `zip_loc` into `target_folder`, creating it if needed.
pub fn decompress(
    storage: &Storage,
    zip_loc: &StorageLocation,
    target_folder: &StorageLocation,
    options: &DecompressOptions,
    events: Arc<dyn ArchiveEvents>,
    cancel: &CancelToken,
) -> Result<DecompressionResult, TransferError> {
    let zip = storage.resolve(zip_loc, false).ok_or_else(|| {
        TransferError::with_message(ErrorCode::SourceNotFound, zip_loc.to_string())
    })?;
    if !zip.is_file() || zip.len == 0 || zip.mime_type() != Some("application/zip") {
        return Err(TransferError::with_message(
            ErrorCode::NotAZipFile,
            zip_loc.to_string(),
        ));
    }

    let interval = events.report_interval_millis(zip.len);
    if interval < 0 {
        return Err(TransferError::new(ErrorCode::Canceled));
    }

    let target = storage.create_folder(target_folder).map_err(|e| {
        TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
    })?;

    info!(zip = %zip_loc, dest = %target.location, "decompressing");

    // Entry sizes are only known per record, so there is no meaningful
    // total; progress carries bytes and file counts with percent at 0.
    let counters = Counters::new(0);
    let ev = Arc::clone(&events);
    let _watch = (interval > 0).then(|| {
        crate::progress::ProgressTimer::start(
            std::time::Duration::from_millis(interval as u64),
            Arc::clone(&counters),
            Arc::new(move |p| ev.on_progress(p)),
        )
    });

    let mut reader = storage
        .open_read(zip_loc)
        .map_err(|e| TransferError::from_io(&e))?;
    let mut skipped_bytes = 0u64;

    loop {
        if cancel.is_canceled() {
            return Err(TransferError::new(ErrorCode::Canceled));
        }
        let Some(mut entry) = read_zipfile_from_stream(&mut reader).map_err(map_zip_error)?
        else {
            break;
        };
        // Hostile names are defanged by the separator trim, which also
        // drops traversal segments.
        let rel = trim_separators(entry.name());
        if rel.is_empty() {
            continue;
        }
        let entry_target = target.location.child(&rel);

        if entry.is_dir() {
            // Folder records reuse an existing folder of the same name.
            storage.create_folder(&entry_target).map_err(|e| {
                TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
            })?;
            continue;
        }

        let parent = entry_target
            .parent()
            .ok_or_else(|| TransferError::new(ErrorCode::CannotCreateInTarget))?;
        storage.create_folder(&parent).map_err(|e| {
            TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
        })?;

        if let Some(existing) = storage.resolve(&entry_target, false) {
            if existing.is_file() && existing.len > 0 {
                debug!(target = %entry_target, "target exists, skipping entry");
                // Counts what is actually on disk, not the record size.
                skipped_bytes += existing.len;
                continue;
            }
        }

        let created = storage.create_file(&parent, entry_target.name()).map_err(|e| {
            TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
        })?;
        let mut writer = storage
            .open_write(&created)
            .map_err(|e| TransferError::from_io(&e))?;
        stream_copy(&mut entry, &mut *writer, &counters, cancel)
            .map_err(|e| TransferError::from_io(&e))?;
        counters.add_file();
    }

    if interval > 0 {
        events.on_progress(counters.snapshot());
    }
    if options.delete_zip_on_success {
        if let Err(e) = storage.delete(zip_loc) {
            debug!(zip = %zip_loc, error = %e, "could not delete extracted archive");
        }
    }

    info!(
        dest = %target.location,
        files = counters.files_completed(),
        bytes = counters.bytes_moved(),
        skipped = skipped_bytes,
        "decompression complete"
    );
    Ok(DecompressionResult {
        zip: zip_loc.clone(),
        target_folder: target.location,
        bytes_decompressed: counters.bytes_moved(),
        skipped_decompressed_bytes: skipped_bytes,
        total_files: counters.files_completed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::compress::{CompressOptions, compress};
    use crate::archive::NoArchiveEvents;
    use crate::location::{StorageRegistry, storage_id};
    use crate::transfer::SpacePolicy;
    use std::fs;
    use tempfile::TempDir;

    fn storage(tmp: &TempDir) -> Storage {
        Storage::new(StorageRegistry::new(
            tmp.path().to_string_lossy(),
            "/data/media",
        ))
    }

    fn loc(path: &str) -> StorageLocation {
        StorageLocation::new(storage_id::PRIMARY, path)
    }

    fn make_zip(tmp: &TempDir) {
        fs::create_dir_all(tmp.path().join("in/sub")).unwrap();
        fs::write(tmp.path().join("in/a.txt"), b"alpha").unwrap();
        fs::write(tmp.path().join("in/sub/b.txt"), b"beta beta").unwrap();
        compress(
            &storage(tmp),
            &[loc("in")],
            &loc("pack.zip"),
            &CompressOptions {
                delete_entries_on_success: false,
                space: SpacePolicy::unchecked(),
            },
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap();
    }

    #[test]
    fn round_trip_restores_the_tree() {
        let tmp = TempDir::new().unwrap();
        make_zip(&tmp);
        let st = storage(&tmp);

        let result = decompress(
            &st,
            &loc("pack.zip"),
            &loc("out"),
            &DecompressOptions::default(),
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(result.total_files, 2);
        assert_eq!(result.bytes_decompressed, 14);
        assert_eq!(result.skipped_decompressed_bytes, 0);
        assert_eq!(fs::read(tmp.path().join("out/in/a.txt")).unwrap(), b"alpha");
        assert_eq!(
            fs::read(tmp.path().join("out/in/sub/b.txt")).unwrap(),
            b"beta beta"
        );
    }

    #[test]
    fn re_extraction_skips_existing_targets() {
        let tmp = TempDir::new().unwrap();
        make_zip(&tmp);
        let st = storage(&tmp);
        let opts = DecompressOptions::default();

        decompress(
            &st,
            &loc("pack.zip"),
            &loc("out"),
            &opts,
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap();
        let again = decompress(
            &st,
            &loc("pack.zip"),
            &loc("out"),
            &opts,
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(again.total_files, 0);
        assert_eq!(again.bytes_decompressed, 0);
        assert_eq!(again.skipped_decompressed_bytes, 14);
    }

    #[test]
    fn skipped_bytes_follow_the_file_on_disk() {
        let tmp = TempDir::new().unwrap();
        make_zip(&tmp);
        let st = storage(&tmp);
        let opts = DecompressOptions::default();

        decompress(
            &st,
            &loc("pack.zip"),
            &loc("out"),
            &opts,
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap();
        // A target edited between runs is skipped at its current size,
        // not the size recorded in the archive.
        fs::write(tmp.path().join("out/in/a.txt"), b"xx").unwrap();

        let again = decompress(
            &st,
            &loc("pack.zip"),
            &loc("out"),
            &opts,
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(again.bytes_decompressed, 0);
        assert_eq!(again.skipped_decompressed_bytes, 11);
        assert_eq!(fs::read(tmp.path().join("out/in/a.txt")).unwrap(), b"xx");
    }

    #[test]
    fn wrong_content_type_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("not-a.txt"), b"plain text").unwrap();
        let st = storage(&tmp);
        let err = decompress(
            &st,
            &loc("not-a.txt"),
            &loc("out"),
            &DecompressOptions::default(),
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAZipFile);
    }

    #[test]
    fn empty_zip_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("hollow.zip"), b"").unwrap();
        let st = storage(&tmp);
        let err = decompress(
            &st,
            &loc("hollow.zip"),
            &loc("out"),
            &DecompressOptions::default(),
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotAZipFile);
    }

    #[test]
    fn cancellation_keeps_partial_output() {
        let tmp = TempDir::new().unwrap();
        make_zip(&tmp);
        let st = storage(&tmp);
        let cancel = CancelToken::new();
        cancel.cancel();

        let err = decompress(
            &st,
            &loc("pack.zip"),
            &loc("out"),
            &DecompressOptions::default(),
            Arc::new(NoArchiveEvents),
            &cancel,
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Canceled);
        // The target folder created before the cancel stays.
        assert!(tmp.path().join("out").exists());
    }

    #[test]
    fn delete_zip_after_success() {
        let tmp = TempDir::new().unwrap();
        make_zip(&tmp);
        let st = storage(&tmp);
        decompress(
            &st,
            &loc("pack.zip"),
            &loc("out"),
            &DecompressOptions {
                delete_zip_on_success: true,
            },
            Arc::new(NoArchiveEvents),
            &CancelToken::new(),
        )
        .unwrap();
        assert!(!tmp.path().join("pack.zip").exists());
    }
}
