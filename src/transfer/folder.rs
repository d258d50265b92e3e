//! Recursive folder transfer engine.
//!
//! Runs as a small state machine: Validating, CountingFiles,
//! ParentConflictCheck, Transferring, then Completed or Error. Only
//! files count toward the totals; folders are created on the way but
//! never counted. An isolated file failure is recorded and the batch
//! keeps going; cancellation and a full destination abort the whole
//! operation with the best-known partial counts attached to the error.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{ResourceHandle, Storage};
use crate::cancel::CancelToken;
use crate::conflict::{FileConflict, ConflictResolution, FolderConflictResolution, Resolver};
use crate::errors::{Counts, ErrorCode, TransferError};
use crate::location::{StorageLocation, has_parent, sanitize_name, sub_path_of};
use crate::progress::{Counters, ProgressTimer};

use super::single::{check_space, increment_against_siblings};
use super::{
    FolderTransferEvents, SpacePolicy, TransferMode, TransferReport, stream_copy,
};

#[derive(Debug, Clone)]
pub struct FolderTransferOptions {
    pub mode: TransferMode,
    /// Rename on arrival; defaults to the source folder name.
    pub new_folder_name: Option<String>,
    /// Leave zero-length files behind instead of copying them.
    pub skip_empty_files: bool,
    pub space: SpacePolicy,
}

impl FolderTransferOptions {
    pub fn new(mode: TransferMode) -> Self {
        Self {
            mode,
            new_folder_name: None,
            skip_empty_files: false,
            space: SpacePolicy::default(),
        }
    }

    pub fn with_new_folder_name(mut self, name: impl Into<String>) -> Self {
        self.new_folder_name = Some(name.into());
        self
    }

    pub fn with_space(mut self, space: SpacePolicy) -> Self {
        self.space = space;
        self
    }
}

/// How the destination root was settled after the parent conflict check.
enum TargetPlan {
    /// No collision (or the colliding entry was removed/renamed away).
    Fresh(String),
    /// Keep the existing folder and resolve file collisions per entry.
    Merge(StorageLocation),
}

/// Copy or move a whole folder into `dest_parent`.
pub fn transfer_folder(
    storage: &Storage,
    source: &StorageLocation,
    dest_parent: &StorageLocation,
    options: &FolderTransferOptions,
    events: Arc<dyn FolderTransferEvents>,
    cancel: &CancelToken,
) -> Result<TransferReport, TransferError> {
    let resolver = Resolver::new();
    let target_name = options
        .new_folder_name
        .as_deref()
        .map(sanitize_name)
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| source.name().to_string());

    if source.parent().as_ref() == Some(dest_parent) && target_name == source.name() {
        return Err(TransferError::with_message(
            ErrorCode::InvalidTarget,
            format!("{source} already lives in {dest_parent}"),
        ));
    }
    if source.in_same_mount_point_with(dest_parent) {
        let src_abs = format!("/{}", source.base_path());
        let dest_abs = format!("/{}", dest_parent.base_path());
        if src_abs == dest_abs || has_parent(&dest_abs, &src_abs) {
            return Err(TransferError::with_message(
                ErrorCode::InvalidTarget,
                "destination is inside the source folder",
            ));
        }
    }

    let src = storage
        .resolve(source, false)
        .filter(ResourceHandle::is_folder)
        .ok_or_else(|| {
            TransferError::with_message(ErrorCode::SourceNotFound, source.to_string())
        })?;
    let dest = match storage.resolve(dest_parent, false) {
        Some(h) if !h.is_folder() => {
            return Err(TransferError::with_message(
                ErrorCode::TargetNotFound,
                format!("{dest_parent} is not a folder"),
            ));
        }
        Some(h) if !h.writable => {
            return Err(TransferError::with_message(
                ErrorCode::StoragePermissionDenied,
                dest_parent.to_string(),
            ));
        }
        Some(h) => h,
        None => {
            return Err(TransferError::with_message(
                ErrorCode::TargetNotFound,
                dest_parent.to_string(),
            ));
        }
    };

    events.on_counting_files();
    let entries = storage
        .walk(source)
        .map_err(|e| TransferError::from_io(&e))?;
    let counted = |h: &ResourceHandle| h.is_file() && !(options.skip_empty_files && h.len == 0);
    let total_files = entries.iter().filter(|h| counted(h)).count() as u32;
    let total_bytes: u64 = entries.iter().filter(|h| counted(h)).map(|h| h.len).sum();

    let interval = events.report_interval_millis(total_files);
    if interval < 0 {
        return Err(TransferError::new(ErrorCode::Canceled));
    }
    check_space(storage, &dest.location, total_bytes, &options.space)?;

    info!(
        src = %source,
        dest = %dest_parent,
        mode = ?options.mode,
        files = total_files,
        bytes = total_bytes,
        "transferring folder"
    );

    let plan = settle_parent_conflict(
        storage,
        &dest.location,
        target_name,
        total_files,
        &resolver,
        &events,
        cancel,
    )?;

    // Atomic move of the whole tree when the target slot is free.
    if options.mode == TransferMode::Move {
        if let TargetPlan::Fresh(name) = &plan {
            match storage.move_entry(source, &dest.location, name) {
                Ok(true) => {
                    debug!(dest = %dest.location.child(name), "folder moved atomically");
                    if interval > 0 {
                        let counters = Counters::new(total_bytes);
                        counters.add_bytes(total_bytes);
                        events.on_progress(counters.snapshot());
                    }
                    return Ok(TransferReport {
                        destination: dest.location.child(name),
                        files_requested: total_files,
                        files_completed: total_files,
                        success: true,
                    });
                }
                Ok(false) => debug!("atomic folder move unavailable, streaming instead"),
                Err(e) => return Err(TransferError::from_io(&e)),
            }
        }
    }

    let (target_root, merging) = match plan {
        TargetPlan::Fresh(name) => {
            let created = storage
                .create_folder(&dest.location.child(&name))
                .map_err(|e| {
                    TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
                })?;
            (created.location, false)
        }
        TargetPlan::Merge(loc) => (loc, true),
    };

    let counters = Counters::new(total_bytes);
    let ev = Arc::clone(&events);
    let _watch = (interval > 0).then(|| {
        ProgressTimer::start(
            std::time::Duration::from_millis(interval as u64),
            Arc::clone(&counters),
            Arc::new(move |p| ev.on_progress(p)),
        )
    });

    let mut files_requested = total_files;
    let mut failed = 0u32;
    let mut pending: Vec<FileConflict> = Vec::new();
    let mut by_source: HashMap<StorageLocation, ResourceHandle> = HashMap::new();
    let src_abs_base = format!("/{}", src.location.base_path());

    for entry in &entries {
        if cancel.is_canceled() {
            return Err(canceled_with(files_requested, &counters));
        }
        let entry_abs = format!("/{}", entry.location.base_path());
        let Some(rel) = sub_path_of(&entry_abs, &src_abs_base) else {
            continue;
        };
        let target = target_root.child(rel);

        if entry.is_folder() {
            // Merge reuses existing folders; a clash with a same-named
            // file fails every child below it, recorded there.
            if let Err(e) = storage.create_folder(&target) {
                warn!(target = %target, error = %e, "folder creation failed");
            }
            continue;
        }
        if options.skip_empty_files && entry.len == 0 {
            continue;
        }
        if merging && storage.resolve(&target, false).is_some() {
            by_source.insert(entry.location.clone(), entry.clone());
            pending.push(FileConflict::new(entry.location.clone(), target));
            continue;
        }
        match copy_one(storage, entry, &target, &counters, cancel) {
            Ok(()) => counters.add_file(),
            Err(e) if aborts_batch(&e) => {
                return Err(e.with_partial(Counts {
                    files_requested,
                    files_completed: counters.files_completed(),
                }));
            }
            Err(e) => {
                warn!(src = %entry.location, error = %e, "file failed, continuing");
                failed += 1;
            }
        }
    }

    // Collisions found during the merge walk are escalated once, as a
    // single batch.
    if !pending.is_empty() {
        let resolved = resolver.ask(cancel, pending.clone(), |action| {
            events.on_content_conflict(pending.clone(), action);
        });
        if cancel.is_canceled() {
            return Err(canceled_with(files_requested, &counters));
        }
        for conflict in resolved {
            let Some(entry) = by_source.get(&conflict.source) else {
                continue;
            };
            let outcome = match conflict.resolution {
                ConflictResolution::Skip => {
                    // The caller chose to leave this one out; it no
                    // longer counts as requested.
                    files_requested = files_requested.saturating_sub(1);
                    debug!(target = %conflict.target, "merge conflict skipped");
                    continue;
                }
                ConflictResolution::Replace => storage
                    .delete(&conflict.target)
                    .map_err(|e| TransferError::from_io(&e))
                    .and_then(|_| copy_one(storage, entry, &conflict.target, &counters, cancel)),
                ConflictResolution::CreateNew => {
                    match conflict.target.parent() {
                        Some(parent) => {
                            increment_against_siblings(storage, &parent, conflict.target.name())
                                .and_then(|name| {
                                    copy_one(
                                        storage,
                                        entry,
                                        &parent.child(&name),
                                        &counters,
                                        cancel,
                                    )
                                })
                        }
                        None => Err(TransferError::new(ErrorCode::CannotCreateInTarget)),
                    }
                }
            };
            match outcome {
                Ok(()) => counters.add_file(),
                Err(e) if aborts_batch(&e) => {
                    return Err(e.with_partial(Counts {
                        files_requested,
                        files_completed: counters.files_completed(),
                    }));
                }
                Err(e) => {
                    warn!(src = %conflict.source, error = %e, "conflicted file failed");
                    failed += 1;
                }
            }
        }
    }

    if interval > 0 {
        events.on_progress(counters.snapshot());
    }

    let completed = counters.files_completed();
    let success = failed == 0;
    if options.mode == TransferMode::Move {
        if success {
            storage
                .delete(source)
                .map_err(|e| TransferError::from_io(&e))?;
        } else {
            warn!(src = %source, "source kept; some files did not transfer");
        }
    }
    info!(
        dest = %target_root,
        requested = files_requested,
        completed,
        success,
        "folder transfer finished"
    );
    Ok(TransferReport {
        destination: target_root,
        files_requested,
        files_completed: completed,
        success,
    })
}

fn settle_parent_conflict(
    storage: &Storage,
    dest_parent: &StorageLocation,
    target_name: String,
    total_files: u32,
    resolver: &Resolver,
    events: &Arc<dyn FolderTransferEvents>,
    cancel: &CancelToken,
) -> Result<TargetPlan, TransferError> {
    let Some(existing) = storage.resolve(&dest_parent.child(&target_name), false) else {
        return Ok(TargetPlan::Fresh(target_name));
    };

    let can_merge = existing.is_folder();
    // An empty folder in the way is not worth a question.
    if can_merge
        && storage
            .list(&existing.location)
            .map(|children| children.is_empty())
            .unwrap_or(false)
    {
        debug!(target = %existing.location, "destination folder empty, merging");
        return Ok(TargetPlan::Merge(existing.location));
    }

    let mut answer = resolver.ask(cancel, FolderConflictResolution::Skip, |action| {
        events.on_parent_conflict(&existing, can_merge, action);
    });
    if answer == FolderConflictResolution::Merge && !can_merge {
        answer = FolderConflictResolution::CreateNew;
    }
    match answer {
        FolderConflictResolution::Skip => Err(TransferError::new(ErrorCode::Canceled)
            .with_partial(Counts {
                files_requested: total_files,
                files_completed: 0,
            })),
        FolderConflictResolution::Merge => Ok(TargetPlan::Merge(existing.location)),
        FolderConflictResolution::Replace => {
            storage
                .delete(&existing.location)
                .map_err(|e| TransferError::from_io(&e))?;
            Ok(TargetPlan::Fresh(target_name))
        }
        FolderConflictResolution::CreateNew => {
            let name = increment_against_siblings(storage, dest_parent, &target_name)?;
            Ok(TargetPlan::Fresh(name))
        }
    }
}

fn canceled_with(files_requested: u32, counters: &Counters) -> TransferError {
    TransferError::new(ErrorCode::Canceled).with_partial(Counts {
        files_requested,
        files_completed: counters.files_completed(),
    })
}

/// Cancellation and an exhausted destination invalidate the rest of the
/// batch; anything else is an isolated item failure.
fn aborts_batch(e: &TransferError) -> bool {
    matches!(e.code, ErrorCode::Canceled | ErrorCode::NoSpaceLeft)
}

fn copy_one(
    storage: &Storage,
    src: &ResourceHandle,
    target: &StorageLocation,
    counters: &Arc<Counters>,
    cancel: &CancelToken,
) -> Result<(), TransferError> {
    let parent = target
        .parent()
        .ok_or_else(|| TransferError::new(ErrorCode::CannotCreateInTarget))?;
    let created = storage.create_file(&parent, target.name()).map_err(|e| {
        TransferError::with_message(ErrorCode::CannotCreateInTarget, e.to_string())
    })?;
    let result = {
        let mut reader = storage
            .open_read(&src.location)
            .map_err(|e| TransferError::from_io(&e))?;
        let mut writer = storage
            .open_write(&created)
            .map_err(|e| TransferError::from_io(&e))?;
        stream_copy(&mut *reader, &mut *writer, counters, cancel)
    };
    if let Err(e) = result {
        if let Err(del) = storage.delete(&created) {
            warn!(target = %created, error = %del, "could not remove partial file");
        }
        return Err(TransferError::from_io(&e));
    }
    if let Some(mtime) = src.modified {
        if let Err(e) = storage.set_modified(&created, mtime) {
            debug!(target = %created, error = %e, "could not carry timestamp");
        }
    }
    Ok(())
}
