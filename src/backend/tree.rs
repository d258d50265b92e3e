//! Tree backend: access mediated by a document provider grant.
//!
//! The provider models an IPC boundary to a privileged document service:
//! one object per process, every call may fail, listings are unsorted,
//! and nothing is reachable outside a granted tree root. The backend
//! itself is a thin adapter from provider records to [`ResourceHandle`].

use std::io::{self, Read};
use std::sync::Arc;
use std::time::SystemTime;

use crate::location::StorageLocation;

use super::{BackendKind, EntryKind, ResourceHandle, WriteSeek};

/// Provider-side record of one document.
#[derive(Debug, Clone)]
pub struct DocumentInfo {
    pub location: StorageLocation,
    pub name: String,
    pub kind: EntryKind,
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub writable: bool,
}

/// The privileged side of the tree boundary.
///
/// `move_document` is the provider's atomic same-volume move; it reports
/// `Ok(false)` when the backing service cannot move this pair, in which
/// case the caller streams the bytes instead.
pub trait DocumentProvider: Send + Sync {
    /// Whether a permission grant covers this location.
    fn has_grant(&self, loc: &StorageLocation) -> bool;

    fn stat(&self, loc: &StorageLocation) -> io::Result<Option<DocumentInfo>>;

    /// Immediate children; order is unspecified.
    fn list(&self, loc: &StorageLocation) -> io::Result<Vec<DocumentInfo>>;

    fn create_document(
        &self,
        parent: &StorageLocation,
        name: &str,
        kind: EntryKind,
    ) -> io::Result<StorageLocation>;

    fn open_read(&self, loc: &StorageLocation) -> io::Result<Box<dyn Read + Send>>;

    fn open_write(&self, loc: &StorageLocation) -> io::Result<Box<dyn WriteSeek>>;

    fn delete(&self, loc: &StorageLocation) -> io::Result<()>;

    fn rename(&self, loc: &StorageLocation, new_name: &str) -> io::Result<StorageLocation>;

    fn move_document(
        &self,
        src: &StorageLocation,
        dest_folder: &StorageLocation,
        new_name: &str,
    ) -> io::Result<bool>;

    fn available_bytes(&self, loc: &StorageLocation) -> io::Result<u64>;

    /// Optional; providers without timestamp control accept and ignore.
    fn set_modified(&self, _loc: &StorageLocation, _mtime: SystemTime) -> io::Result<()> {
        Ok(())
    }
}

pub struct TreeBackend {
    provider: Arc<dyn DocumentProvider>,
}

impl TreeBackend {
    pub fn new(provider: Arc<dyn DocumentProvider>) -> Self {
        Self { provider }
    }

    pub fn has_grant(&self, loc: &StorageLocation) -> bool {
        self.provider.has_grant(loc)
    }

    fn handle_from(info: DocumentInfo) -> ResourceHandle {
        ResourceHandle {
            name: info.name,
            kind: info.kind,
            len: info.len,
            modified: info.modified,
            readable: true,
            writable: info.writable,
            backend: BackendKind::Tree,
            location: info.location,
        }
    }

    pub fn stat(&self, loc: &StorageLocation) -> io::Result<Option<ResourceHandle>> {
        Ok(self.provider.stat(loc)?.map(Self::handle_from))
    }

    pub fn list(&self, loc: &StorageLocation) -> io::Result<Vec<ResourceHandle>> {
        Ok(self
            .provider
            .list(loc)?
            .into_iter()
            .map(Self::handle_from)
            .collect())
    }

    /// Depth-first recursion over `list`, parents before children.
    pub fn walk(&self, loc: &StorageLocation) -> io::Result<Vec<ResourceHandle>> {
        let mut out = Vec::new();
        self.walk_into(loc, &mut out)?;
        Ok(out)
    }

    fn walk_into(
        &self,
        loc: &StorageLocation,
        out: &mut Vec<ResourceHandle>,
    ) -> io::Result<()> {
        for child in self.list(loc)? {
            let child_loc = child.location.clone();
            let is_folder = child.is_folder();
            out.push(child);
            if is_folder {
                self.walk_into(&child_loc, out)?;
            }
        }
        Ok(())
    }

    pub fn create_file(
        &self,
        parent: &StorageLocation,
        name: &str,
    ) -> io::Result<StorageLocation> {
        self.provider.create_document(parent, name, EntryKind::File)
    }

    pub fn create_folder(&self, loc: &StorageLocation) -> io::Result<ResourceHandle> {
        // Build the chain top-down; each level reuses an existing folder.
        let mut missing = Vec::new();
        let mut cursor = loc.clone();
        loop {
            if self.provider.stat(&cursor)?.is_some() {
                break;
            }
            let parent = cursor.parent().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::PermissionDenied,
                    format!("no granted root above {loc}"),
                )
            })?;
            missing.push(cursor.name().to_string());
            cursor = parent;
        }
        for name in missing.iter().rev() {
            cursor = self
                .provider
                .create_document(&cursor, name, EntryKind::Folder)?;
        }
        self.stat(loc)?.ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("created folder vanished: {loc}"))
        })
    }

    pub fn open_read(&self, loc: &StorageLocation) -> io::Result<Box<dyn Read + Send>> {
        self.provider.open_read(loc)
    }

    pub fn open_write(&self, loc: &StorageLocation) -> io::Result<Box<dyn WriteSeek>> {
        self.provider.open_write(loc)
    }

    pub fn delete(&self, loc: &StorageLocation) -> io::Result<()> {
        self.provider.delete(loc)
    }

    pub fn rename(&self, loc: &StorageLocation, new_name: &str) -> io::Result<StorageLocation> {
        self.provider.rename(loc, new_name)
    }

    pub fn move_entry(
        &self,
        src: &StorageLocation,
        dest_folder: &StorageLocation,
        new_name: &str,
    ) -> io::Result<bool> {
        self.provider.move_document(src, dest_folder, new_name)
    }

    pub fn available_bytes(&self, loc: &StorageLocation) -> io::Result<u64> {
        self.provider.available_bytes(loc)
    }

    pub fn set_modified(&self, loc: &StorageLocation, mtime: SystemTime) -> io::Result<()> {
        self.provider.set_modified(loc, mtime)
    }
}
