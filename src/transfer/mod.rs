//! Transfer engines and their shared plumbing.
//!
//! Both engines are blocking and single-threaded; the only second
//! thread an operation ever owns is the progress timer. Callers drive
//! them from whatever thread discipline they like and observe the run
//! through an events object.

pub mod folder;
pub mod single;

use std::io::{self, Read, Write};
use std::sync::Arc;

use crate::backend::ResourceHandle;
use crate::cancel::CancelToken;
use crate::conflict::{ConflictAction, ConflictResolution, FileConflict, FolderConflictResolution};
use crate::location::StorageLocation;
use crate::progress::{Counters, Progress, ProgressFn, ProgressTimer};

/// Copy leaves the source in place; Move deletes it after the bytes land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

/// Streaming chunk size.
pub(crate) const CHUNK_SIZE: usize = 64 * 1024;

/// Transfers below this size complete too fast to be worth a timer.
pub(crate) const WATCH_THRESHOLD: u64 = 10 * 1024 * 1024;

/// Free-space gate applied before any byte moves.
///
/// The destination must keep headroom after the transfer: `available >
/// required + tolerance`. An exact fit is a refusal.
#[derive(Debug, Clone, Copy)]
pub struct SpacePolicy {
    pub tolerance_bytes: u64,
    pub enforce: bool,
}

impl Default for SpacePolicy {
    fn default() -> Self {
        Self {
            tolerance_bytes: 100 * 1024 * 1024,
            enforce: true,
        }
    }
}

impl SpacePolicy {
    pub fn unchecked() -> Self {
        Self {
            tolerance_bytes: 0,
            enforce: false,
        }
    }

    pub fn accepts(&self, available: u64, required: u64) -> bool {
        !self.enforce || available > required.saturating_add(self.tolerance_bytes)
    }
}

/// Final accounting of a transfer. Single-file runs count one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReport {
    pub destination: StorageLocation,
    pub files_requested: u32,
    pub files_completed: u32,
    /// False when any item in a batch was skipped or failed.
    pub success: bool,
}

/// Observer of a single-file transfer.
///
/// `report_interval_millis` doubles as the start gate: 0 disables
/// progress reporting, a negative value cancels the operation before
/// any byte moves.
pub trait FileTransferEvents: Send + Sync {
    fn report_interval_millis(&self, _size: u64) -> i64 {
        0
    }

    /// A file with the requested name already exists in the destination.
    fn on_conflict(&self, _existing: &ResourceHandle, action: ConflictAction<ConflictResolution>) {
        action.resolve(ConflictResolution::CreateNew);
    }

    fn on_progress(&self, _progress: Progress) {}
}

/// Observer of a folder transfer.
pub trait FolderTransferEvents: Send + Sync {
    fn report_interval_millis(&self, _total_files: u32) -> i64 {
        0
    }

    fn on_counting_files(&self) {}

    /// The destination parent already holds an entry with the source
    /// folder's name. `can_merge` is true only when that entry is a folder.
    fn on_parent_conflict(
        &self,
        _existing: &ResourceHandle,
        _can_merge: bool,
        action: ConflictAction<FolderConflictResolution>,
    ) {
        action.resolve(FolderConflictResolution::CreateNew);
    }

    /// All file collisions found during a merge, escalated once as a
    /// batch. Resolve with the same list, decisions filled in.
    fn on_content_conflict(
        &self,
        conflicts: Vec<FileConflict>,
        action: ConflictAction<Vec<FileConflict>>,
    ) {
        action.resolve(conflicts);
    }

    fn on_progress(&self, _progress: Progress) {}
}

/// Silent observer; every decision falls back to the defaults.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEvents;

impl FileTransferEvents for NoEvents {}
impl FolderTransferEvents for NoEvents {}

/// Next free name in the `name (n).ext` scheme.
///
/// The increment is max-existing + 1, not first-gap: with `A.txt`,
/// `A (1).txt` and `A (3).txt` present the answer is `A (4).txt`, so a
/// concurrently deleted `A (2).txt` can never be resurrected.
pub fn auto_increment_file_name(sibling_names: &[String], name: &str) -> String {
    if !sibling_names.iter().any(|s| s == name) {
        return name.to_string();
    }
    let (base, ext) = split_extension(name);
    let prefix = format!("{base} (");
    let mut last = 0u32;
    for sibling in sibling_names {
        let (sib_base, sib_ext) = split_extension(sibling);
        if sib_ext != ext {
            continue;
        }
        let num = sib_base
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(')'))
            .and_then(|digits| digits.parse::<u32>().ok());
        if let Some(n) = num {
            last = last.max(n);
        }
    }
    if ext.is_empty() {
        format!("{base} ({})", last + 1)
    } else {
        format!("{base} ({}).{ext}", last + 1)
    }
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rsplit_once('.') {
        Some((base, ext)) if !base.is_empty() => (base, ext),
        _ => (name, ""),
    }
}

/// Chunked copy loop shared by the engines and the archive writer. The
/// cancel token is checked between chunks; cancellation surfaces as an
/// `Interrupted` I/O error, which the taxonomy maps to `Canceled`.
pub(crate) fn stream_copy(
    src: &mut dyn Read,
    dst: &mut dyn Write,
    counters: &Counters,
    cancel: &CancelToken,
) -> io::Result<u64> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;
    loop {
        if cancel.is_canceled() {
            return Err(io::Error::new(io::ErrorKind::Interrupted, "operation canceled"));
        }
        let n = src.read(&mut buf)?;
        if n == 0 {
            break;
        }
        dst.write_all(&buf[..n])?;
        counters.add_bytes(n as u64);
        total += n as u64;
    }
    dst.flush()?;
    Ok(total)
}

/// Start the report timer when the caller asked for one and the job is
/// big enough to watch. Returned guard stops the timer on drop.
pub(crate) fn maybe_watch(
    interval_ms: i64,
    size_hint: u64,
    counters: &Arc<Counters>,
    report: Arc<ProgressFn>,
) -> Option<ProgressTimer> {
    if interval_ms > 0 && size_hint > WATCH_THRESHOLD {
        Some(ProgressTimer::start(
            std::time::Duration::from_millis(interval_ms as u64),
            Arc::clone(counters),
            report,
        ))
    } else {
        None
    }
}
