//! Typed error definitions shared by the transfer and archive engines.
//! Provides a small closed set of well-known failure modes for better logs and tests.

use std::io;
use thiserror::Error;

/// Closed error taxonomy. Engine-specific subsets apply: the archive
/// engines are the only producers of [`ErrorCode::MissingEntryFile`] and
/// [`ErrorCode::NotAZipFile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    StoragePermissionDenied,
    SourceNotFound,
    TargetNotFound,
    /// Pre-resolution only; never escapes a public entry point.
    TargetExists,
    CannotCreateInTarget,
    /// Destination equals the source's own parent (same-path guard).
    InvalidTarget,
    NoSpaceLeft,
    UnknownIoError,
    Canceled,
    MissingEntryFile,
    NotAZipFile,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::StoragePermissionDenied => "storage permission denied",
            ErrorCode::SourceNotFound => "source not found",
            ErrorCode::TargetNotFound => "target not found",
            ErrorCode::TargetExists => "target already exists",
            ErrorCode::CannotCreateInTarget => "cannot create in target",
            ErrorCode::InvalidTarget => "invalid target",
            ErrorCode::NoSpaceLeft => "no space left on target",
            ErrorCode::UnknownIoError => "unknown I/O error",
            ErrorCode::Canceled => "canceled",
            ErrorCode::MissingEntryFile => "missing entry file",
            ErrorCode::NotAZipFile => "not a zip file",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-batch accounting attached to both success and failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Counts {
    pub files_requested: u32,
    pub files_completed: u32,
}

/// Terminal error of an engine operation. Batch operations attach the
/// best-known partial counts so callers can distinguish "nothing
/// happened" from "partial success".
#[derive(Debug, Error)]
pub struct TransferError {
    pub code: ErrorCode,
    pub message: Option<String>,
    pub partial: Option<Counts>,
}

impl std::fmt::Display for TransferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(m) => write!(f, "{}: {}", self.code, m),
            None => write!(f, "{}", self.code),
        }
    }
}

impl TransferError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            partial: None,
        }
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
            partial: None,
        }
    }

    pub fn with_partial(mut self, partial: Counts) -> Self {
        self.partial = Some(partial);
        self
    }

    /// Map an I/O error onto the closed taxonomy. Interrupted streams are
    /// the cooperative cancellation mechanism and must never surface as
    /// `UnknownIoError`.
    pub fn from_io(e: &io::Error) -> Self {
        let code = match e.kind() {
            io::ErrorKind::Interrupted => ErrorCode::Canceled,
            io::ErrorKind::PermissionDenied => ErrorCode::StoragePermissionDenied,
            io::ErrorKind::NotFound => ErrorCode::SourceNotFound,
            io::ErrorKind::StorageFull | io::ErrorKind::QuotaExceeded => ErrorCode::NoSpaceLeft,
            _ => ErrorCode::UnknownIoError,
        };
        Self::with_message(code, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupted_io_maps_to_canceled() {
        let e = io::Error::new(io::ErrorKind::Interrupted, "stop");
        assert_eq!(TransferError::from_io(&e).code, ErrorCode::Canceled);
    }

    #[test]
    fn permission_denied_maps_to_storage_permission() {
        let e = io::Error::new(io::ErrorKind::PermissionDenied, "no");
        assert_eq!(
            TransferError::from_io(&e).code,
            ErrorCode::StoragePermissionDenied
        );
    }

    #[test]
    fn display_includes_message() {
        let err = TransferError::with_message(ErrorCode::NoSpaceLeft, "need 5 GiB");
        assert_eq!(format!("{err}"), "no space left on target: need 5 GiB");
    }
}
