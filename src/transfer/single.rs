//! Single-file transfer engine.
//!
//! One blocking call copies or moves one file into a destination
//! folder. Checks run in a fixed order (target guard, resolution, start
//! gate, free space, conflict, fast path, stream) so every failure mode
//! maps to exactly one error code.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{ResourceHandle, Storage};
use crate::cancel::CancelToken;
use crate::conflict::{ConflictResolution, Resolver};
use crate::errors::{ErrorCode, TransferError};
use crate::location::{StorageLocation, sanitize_name};
use crate::progress::Counters;

use super::{
    FileTransferEvents, SpacePolicy, TransferMode, TransferReport, auto_increment_file_name,
    maybe_watch, stream_copy,
};

#[derive(Debug, Clone)]
pub struct FileTransferOptions {
    pub mode: TransferMode,
    /// Rename on arrival; defaults to the source name.
    pub new_name: Option<String>,
    pub space: SpacePolicy,
}

impl FileTransferOptions {
    pub fn new(mode: TransferMode) -> Self {
        Self {
            mode,
            new_name: None,
            space: SpacePolicy::default(),
        }
    }

    pub fn with_new_name(mut self, name: impl Into<String>) -> Self {
        self.new_name = Some(name.into());
        self
    }

    pub fn with_space(mut self, space: SpacePolicy) -> Self {
        self.space = space;
        self
    }
}

/// Copy or move `source` into `dest_folder`.
pub fn transfer_file(
    storage: &Storage,
    source: &StorageLocation,
    dest_folder: &StorageLocation,
    options: &FileTransferOptions,
    events: Arc<dyn FileTransferEvents>,
    cancel: &CancelToken,
) -> Result<TransferReport, TransferError> {
    let resolver = Resolver::new();
    let target_name = options
        .new_name
        .as_deref()
        .map(sanitize_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| source.name().to_string());

    // Writing a file onto its own parent under its own name is a no-op
    // request, refused outright.
    if source.parent().as_ref() == Some(dest_folder) && target_name == source.name() {
        return Err(TransferError::with_message(
            ErrorCode::InvalidTarget,
            format!("{source} already lives in {dest_folder}"),
        ));
    }

    let src = storage
        .resolve(source, false)
        .filter(ResourceHandle::is_file)
        .ok_or_else(|| {
            TransferError::with_message(ErrorCode::SourceNotFound, source.to_string())
        })?;
    let dest = match storage.resolve(dest_folder, false) {
        Some(h) if !h.is_folder() => {
            return Err(TransferError::with_message(
                ErrorCode::TargetNotFound,
                format!("{dest_folder} is not a folder"),
            ));
        }
        Some(h) if !h.writable => {
            return Err(TransferError::with_message(
                ErrorCode::StoragePermissionDenied,
                dest_folder.to_string(),
            ));
        }
        Some(h) => h,
        None => {
            return Err(TransferError::with_message(
                ErrorCode::TargetNotFound,
                dest_folder.to_string(),
            ));
        }
    };

    let interval = events.report_interval_millis(src.len);
    if interval < 0 {
        return Err(TransferError::new(ErrorCode::Canceled));
    }

    check_space(storage, &dest.location, src.len, &options.space)?;

    info!(
        src = %source,
        dest = %dest_folder,
        mode = ?options.mode,
        size = src.len,
        "transferring file"
    );

    // Name collision must be settled before the fast path so an atomic
    // move can never silently land on an existing entry.
    let target_name = match storage.resolve(&dest.location.child(&target_name), false) {
        Some(existing) => {
            let answer = resolver.ask(cancel, ConflictResolution::Skip, |action| {
                events.on_conflict(&existing, action);
            });
            match answer {
                ConflictResolution::Skip => {
                    debug!(target = %existing.location, "conflict skipped");
                    return Err(TransferError::new(ErrorCode::Canceled));
                }
                ConflictResolution::Replace => {
                    storage
                        .delete(&existing.location)
                        .map_err(|e| TransferError::from_io(&e))?;
                    target_name
                }
                ConflictResolution::CreateNew => {
                    increment_against_siblings(storage, &dest.location, &target_name)?
                }
            }
        }
        None => target_name,
    };

    let counters = Counters::new(src.len);

    if options.mode == TransferMode::Move {
        match storage.move_entry(source, &dest.location, &target_name) {
            Ok(true) => {
                counters.add_bytes(src.len);
                counters.add_file();
                if interval > 0 {
                    events.on_progress(counters.snapshot());
                }
                debug!(dest = %dest.location.child(&target_name), "moved atomically");
                return Ok(report(dest.location.child(&target_name)));
            }
            Ok(false) => debug!("atomic move unavailable, streaming instead"),
            Err(e) => return Err(TransferError::from_io(&e)),
        }
    }

    let target = storage
        .create_file(&dest.location, &target_name)
        .map_err(|e| {
            TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
        })?;

    let streamed = stream_into(storage, &src, &target, &counters, interval, &events, cancel);
    if let Err(e) = streamed {
        // Half-written target is useless; drop it before surfacing.
        if let Err(del) = storage.delete(&target) {
            warn!(target = %target, error = %del, "could not remove partial file");
        }
        return Err(e);
    }

    if let Some(mtime) = src.modified {
        if let Err(e) = storage.set_modified(&target, mtime) {
            debug!(target = %target, error = %e, "could not carry timestamp");
        }
    }
    counters.add_file();
    if interval > 0 {
        events.on_progress(counters.snapshot());
    }

    if options.mode == TransferMode::Move {
        storage
            .delete(source)
            .map_err(|e| TransferError::from_io(&e))?;
    }
    info!(dest = %target, bytes = counters.bytes_moved(), "transfer complete");
    Ok(report(target))
}

fn report(destination: StorageLocation) -> TransferReport {
    TransferReport {
        destination,
        files_requested: 1,
        files_completed: 1,
        success: true,
    }
}

fn stream_into(
    storage: &Storage,
    src: &ResourceHandle,
    target: &StorageLocation,
    counters: &Arc<Counters>,
    interval: i64,
    events: &Arc<dyn FileTransferEvents>,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let mut reader = storage
        .open_read(&src.location)
        .map_err(|e| TransferError::from_io(&e))?;
    let mut writer = storage
        .open_write(target)
        .map_err(|e| TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string()))?;

    let ev = Arc::clone(events);
    let _watch = maybe_watch(
        interval,
        src.len,
        counters,
        Arc::new(move |p| ev.on_progress(p)),
    );
    stream_copy(&mut *reader, &mut *writer, counters, cancel)
        .map_err(|e| TransferError::from_io(&e))?;
    Ok(())
}

pub(crate) fn check_space(
    storage: &Storage,
    dest: &StorageLocation,
    required: u64,
    policy: &SpacePolicy,
) -> Result<(), TransferError> {
    if !policy.enforce {
        return Ok(());
    }
    let available = storage
        .available_bytes(dest)
        .map_err(|e| TransferError::from_io(&e))?;
    if policy.accepts(available, required) {
        Ok(())
    } else {
        Err(TransferError::with_message(
            ErrorCode::NoSpaceLeft,
            format!("need {required} bytes, {available} available"),
        ))
    }
}

pub(crate) fn increment_against_siblings(
    storage: &Storage,
    folder: &StorageLocation,
    name: &str,
) -> Result<String, TransferError> {
    let siblings: Vec<String> = storage
        .list(folder)
        .map_err(|e| TransferError::from_io(&e))?
        .into_iter()
        .map(|h| h.name)
        .collect();
    Ok(auto_increment_file_name(&siblings, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::ConflictAction;
    use crate::location::{StorageRegistry, storage_id};
    use std::fs;
    use tempfile::TempDir;

    struct Decide(ConflictResolution);

    impl FileTransferEvents for Decide {
        fn on_conflict(
            &self,
            _existing: &ResourceHandle,
            action: ConflictAction<ConflictResolution>,
        ) {
            action.resolve(self.0);
        }
    }

    fn storage(tmp: &TempDir) -> Storage {
        Storage::new(StorageRegistry::new(
            tmp.path().to_string_lossy(),
            "/data/media",
        ))
    }

    fn loc(path: &str) -> StorageLocation {
        StorageLocation::new(storage_id::PRIMARY, path)
    }

    #[test]
    fn copy_keeps_source_and_lands_bytes() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dst")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        let st = storage(&tmp);

        let report = transfer_file(
            &st,
            &loc("a.txt"),
            &loc("dst"),
            &FileTransferOptions::new(TransferMode::Copy).with_space(SpacePolicy::unchecked()),
            Arc::new(super::super::NoEvents),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(report.success);
        assert_eq!(report.destination, loc("dst/a.txt"));
        assert_eq!(fs::read(tmp.path().join("dst/a.txt")).unwrap(), b"hello");
        assert!(tmp.path().join("a.txt").exists());
    }

    #[test]
    fn move_removes_source() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dst")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        let st = storage(&tmp);

        transfer_file(
            &st,
            &loc("a.txt"),
            &loc("dst"),
            &FileTransferOptions::new(TransferMode::Move).with_space(SpacePolicy::unchecked()),
            Arc::new(super::super::NoEvents),
            &CancelToken::new(),
        )
        .unwrap();

        assert!(!tmp.path().join("a.txt").exists());
        assert!(tmp.path().join("dst/a.txt").exists());
    }

    #[test]
    fn same_parent_same_name_is_invalid_target() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), b"x").unwrap();
        let st = storage(&tmp);
        let err = transfer_file(
            &st,
            &loc("a.txt"),
            &loc(""),
            &FileTransferOptions::new(TransferMode::Copy),
            Arc::new(super::super::NoEvents),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidTarget);
    }

    #[test]
    fn conflict_create_new_auto_increments() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dst")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"new").unwrap();
        fs::write(tmp.path().join("dst/a.txt"), b"old").unwrap();
        let st = storage(&tmp);

        let report = transfer_file(
            &st,
            &loc("a.txt"),
            &loc("dst"),
            &FileTransferOptions::new(TransferMode::Copy).with_space(SpacePolicy::unchecked()),
            Arc::new(Decide(ConflictResolution::CreateNew)),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(report.destination, loc("dst/a (1).txt"));
        assert_eq!(fs::read(tmp.path().join("dst/a.txt")).unwrap(), b"old");
        assert_eq!(fs::read(tmp.path().join("dst/a (1).txt")).unwrap(), b"new");
    }

    #[test]
    fn conflict_replace_overwrites() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dst")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"new").unwrap();
        fs::write(tmp.path().join("dst/a.txt"), b"old").unwrap();
        let st = storage(&tmp);

        transfer_file(
            &st,
            &loc("a.txt"),
            &loc("dst"),
            &FileTransferOptions::new(TransferMode::Copy).with_space(SpacePolicy::unchecked()),
            Arc::new(Decide(ConflictResolution::Replace)),
            &CancelToken::new(),
        )
        .unwrap();

        assert_eq!(fs::read(tmp.path().join("dst/a.txt")).unwrap(), b"new");
        assert!(!tmp.path().join("dst/a (1).txt").exists());
    }

    #[test]
    fn conflict_skip_surfaces_canceled() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dst")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"new").unwrap();
        fs::write(tmp.path().join("dst/a.txt"), b"old").unwrap();
        let st = storage(&tmp);

        let err = transfer_file(
            &st,
            &loc("a.txt"),
            &loc("dst"),
            &FileTransferOptions::new(TransferMode::Copy).with_space(SpacePolicy::unchecked()),
            Arc::new(Decide(ConflictResolution::Skip)),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Canceled);
        assert_eq!(fs::read(tmp.path().join("dst/a.txt")).unwrap(), b"old");
    }

    #[test]
    fn missing_destination_is_target_not_found() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), b"x").unwrap();
        let st = storage(&tmp);
        let err = transfer_file(
            &st,
            &loc("a.txt"),
            &loc("nowhere"),
            &FileTransferOptions::new(TransferMode::Copy),
            Arc::new(super::super::NoEvents),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TargetNotFound);
    }

    #[test]
    fn negative_interval_cancels_before_any_byte() {
        struct PreCancel;
        impl FileTransferEvents for PreCancel {
            fn report_interval_millis(&self, _size: u64) -> i64 {
                -1
            }
        }
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("dst")).unwrap();
        fs::write(tmp.path().join("a.txt"), b"x").unwrap();
        let st = storage(&tmp);
        let err = transfer_file(
            &st,
            &loc("a.txt"),
            &loc("dst"),
            &FileTransferOptions::new(TransferMode::Copy),
            Arc::new(PreCancel),
            &CancelToken::new(),
        )
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Canceled);
        assert!(!tmp.path().join("dst/a.txt").exists());
    }
}
