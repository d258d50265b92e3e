//! Zip archive engine: compression and decompression over the same
//! backend abstraction the transfer engines use.

pub mod compress;
pub mod decompress;

use std::io::{self, Seek, SeekFrom, Write};

use zip::result::ZipError;

use crate::backend::WriteSeek;
use crate::errors::{ErrorCode, TransferError};
use crate::location::StorageLocation;
use crate::progress::Progress;

pub use compress::{CompressOptions, CompressionResult, compress};
pub use decompress::{DecompressOptions, DecompressionResult, decompress};

/// Observer shared by both archive directions.
pub trait ArchiveEvents: Send + Sync {
    /// Same contract as the transfer engines: 0 disables reporting,
    /// negative cancels before any byte moves.
    fn report_interval_millis(&self, _total_bytes: u64) -> i64 {
        0
    }

    fn on_counting_files(&self) {}

    fn on_progress(&self, _progress: Progress) {}
}

/// Silent observer.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoArchiveEvents;

impl ArchiveEvents for NoArchiveEvents {}

/// Adapter giving the zip writer a concrete `Write + Seek` type over a
/// boxed backend stream.
pub(crate) struct SeekWriter(pub Box<dyn WriteSeek>);

impl Write for SeekWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Seek for SeekWriter {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.0.seek(pos)
    }
}

pub(crate) fn map_zip_error(e: ZipError) -> TransferError {
    match e {
        ZipError::Io(io) => TransferError::from_io(&io),
        other => TransferError::with_message(ErrorCode::UnknownIoError, other.to_string()),
    }
}

/// Best-effort removal of a half-written archive artifact.
pub(crate) fn discard_partial(storage: &crate::backend::Storage, loc: &StorageLocation) {
    if let Err(e) = storage.delete(loc) {
        tracing::warn!(target = %loc, error = %e, "could not remove partial archive");
    }
}
