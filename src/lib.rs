//! Core library for `duofs`.
//!
//! A dual-backend storage engine: every file and folder is addressed as
//! `storageId:basePath` and reached either directly through the mount
//! table (raw backend) or through a document-provider grant (tree
//! backend). On top of that sit blocking engines for single-file and
//! folder copy/move, directory-set reduction, and zip compression and
//! decompression, all sharing one conflict-resolution protocol, one
//! progress-report discipline, and one closed error taxonomy.

pub mod archive;
pub mod backend;
pub mod cancel;
pub mod conflict;
pub mod config;
pub mod errors;
pub mod location;
pub mod output;
pub mod progress;
pub mod reduce;
pub mod transfer;

pub use archive::{
    ArchiveEvents, CompressOptions, CompressionResult, DecompressOptions, DecompressionResult,
    compress, decompress,
};
pub use backend::{
    DocumentProvider, EntryKind, FsDocumentProvider, ResourceHandle, Storage,
};
pub use cancel::CancelToken;
pub use conflict::{
    ConflictAction, ConflictResolution, FileConflict, FolderConflictResolution, Resolver,
};
pub use config::{Config, LogLevel};
pub use errors::{Counts, ErrorCode, TransferError};
pub use location::{StorageLocation, StorageRegistry};
pub use progress::Progress;
pub use reduce::{find_unique_deepest_sub_folders, find_unique_parents};
pub use transfer::folder::{FolderTransferOptions, transfer_folder};
pub use transfer::single::{FileTransferOptions, transfer_file};
pub use transfer::{
    FileTransferEvents, FolderTransferEvents, SpacePolicy, TransferMode, TransferReport,
    auto_increment_file_name,
};
