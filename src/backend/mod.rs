//! Storage backend facade.
//!
//! Two backends reach the same bytes through different doors: the raw
//! backend speaks `std::fs` against the mount table, the tree backend
//! goes through a [`DocumentProvider`] grant. [`Storage`] routes every
//! operation raw-first, falling back to the tree when a grant covers the
//! location, so engine code never branches on backend type.
//!
//! Notes:
//! - Handles are resolved per operation and never cached; external
//!   processes may change the tree between calls.
//! - An unroutable location surfaces as `PermissionDenied`, which the
//!   error taxonomy maps to a permission failure rather than a crash.

pub mod provider;
pub mod raw;
pub mod tree;

use std::io::{self, Read, Seek, Write};
use std::sync::Arc;
use std::time::SystemTime;

use tracing::debug;

use crate::location::{StorageLocation, StorageRegistry, storage_id};
use crate::reduce::find_unique_deepest_sub_folders;

pub use provider::FsDocumentProvider;
pub use tree::{DocumentInfo, DocumentProvider};

/// What a resolved entry is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Folder,
}

/// Which door a handle was resolved through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Raw,
    Tree,
}

/// Writable streams must also seek: the archive writer patches entry
/// headers after the fact.
pub trait WriteSeek: Write + Seek + Send {}
impl<T: Write + Seek + Send> WriteSeek for T {}

/// Snapshot of one entry at resolution time.
#[derive(Debug, Clone)]
pub struct ResourceHandle {
    pub location: StorageLocation,
    pub name: String,
    pub kind: EntryKind,
    /// Byte length; 0 for folders.
    pub len: u64,
    pub modified: Option<SystemTime>,
    pub readable: bool,
    pub writable: bool,
    pub backend: BackendKind,
}

impl ResourceHandle {
    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    /// Thin name-based content type guess; files only.
    pub fn mime_type(&self) -> Option<&'static str> {
        match self.kind {
            EntryKind::File => Some(mime_type_of(&self.name)),
            EntryKind::Folder => None,
        }
    }
}

/// Content type from the file name extension. Only the handful of types
/// the engines actually branch on; everything else is a generic blob.
pub fn mime_type_of(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or("");
    match ext.to_ascii_lowercase().as_str() {
        "zip" => "application/zip",
        "txt" | "log" => "text/plain",
        "xml" => "text/xml",
        "json" => "application/json",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Raw,
    Tree,
}

/// Unified entry point for both backends.
pub struct Storage {
    registry: StorageRegistry,
    raw: raw::RawBackend,
    tree: Option<tree::TreeBackend>,
    /// Whether raw access to the shared volumes (`primary`, removable)
    /// is permitted. `data` is always raw-reachable.
    full_raw_access: bool,
}

impl Storage {
    /// Raw-only storage with unrestricted raw access.
    pub fn new(registry: StorageRegistry) -> Self {
        Self {
            raw: raw::RawBackend::new(registry.clone()),
            registry,
            tree: None,
            full_raw_access: true,
        }
    }

    /// Attach a document provider for tree-mediated access.
    pub fn with_provider(mut self, provider: Arc<dyn DocumentProvider>) -> Self {
        self.tree = Some(tree::TreeBackend::new(provider));
        self
    }

    /// Restrict raw access to the `data` area, modeling hosts where the
    /// shared volumes are only reachable through the document tree.
    pub fn with_full_raw_access(mut self, allowed: bool) -> Self {
        self.full_raw_access = allowed;
        self
    }

    pub fn registry(&self) -> &StorageRegistry {
        &self.registry
    }

    fn raw_allowed(&self, id: &str) -> bool {
        id == storage_id::DATA || self.full_raw_access
    }

    fn route(&self, loc: &StorageLocation) -> Option<Route> {
        if !loc.is_resolvable() {
            return None;
        }
        if self.raw_allowed(loc.storage_id()) && self.registry.root_of(loc.storage_id()).is_some() {
            return Some(Route::Raw);
        }
        match &self.tree {
            Some(t) if t.has_grant(loc) => Some(Route::Tree),
            _ => None,
        }
    }

    fn routed(&self, loc: &StorageLocation) -> io::Result<Route> {
        self.route(loc).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("no backend can reach {loc}"),
            )
        })
    }

    /// Resolve a location to a live handle, or `None` when the entry
    /// does not exist, no backend can reach it, or `require_write` is
    /// set and the entry is read-only.
    pub fn resolve(&self, loc: &StorageLocation, require_write: bool) -> Option<ResourceHandle> {
        let route = self.route(loc)?;
        let handle = match route {
            Route::Raw => self.raw.stat(loc),
            Route::Tree => self.tree.as_ref()?.stat(loc),
        };
        match handle {
            Ok(Some(h)) if !require_write || h.writable => Some(h),
            Ok(Some(_)) => {
                debug!(location = %loc, "resolved read-only, writable handle required");
                None
            }
            Ok(None) => None,
            Err(e) => {
                debug!(location = %loc, error = %e, "resolution failed");
                None
            }
        }
    }

    /// Immediate children, unsorted.
    pub fn list(&self, loc: &StorageLocation) -> io::Result<Vec<ResourceHandle>> {
        match self.routed(loc)? {
            Route::Raw => self.raw.list(loc),
            Route::Tree => self.tree_ref()?.list(loc),
        }
    }

    /// Recursive listing of everything under a folder, parents before
    /// children. The folder itself is not included.
    pub fn walk(&self, loc: &StorageLocation) -> io::Result<Vec<ResourceHandle>> {
        match self.routed(loc)? {
            Route::Raw => self.raw.walk(loc),
            Route::Tree => self.tree_ref()?.walk(loc),
        }
    }

    /// Create an empty file named `name` under `parent`.
    pub fn create_file(
        &self,
        parent: &StorageLocation,
        name: &str,
    ) -> io::Result<StorageLocation> {
        match self.routed(parent)? {
            Route::Raw => self.raw.create_file(parent, name),
            Route::Tree => self.tree_ref()?.create_file(parent, name),
        }
    }

    /// Create a folder, including missing ancestors.
    pub fn create_folder(&self, loc: &StorageLocation) -> io::Result<ResourceHandle> {
        match self.routed(loc)? {
            Route::Raw => self.raw.create_folder(loc),
            Route::Tree => self.tree_ref()?.create_folder(loc),
        }
    }

    /// Batch folder creation: the request set is reduced to its deepest
    /// members first so no ancestor is probed twice. Returns one slot
    /// per requested location, `None` where creation failed.
    pub fn create_folders(&self, locs: &[StorageLocation]) -> Vec<Option<ResourceHandle>> {
        let deepest = find_unique_deepest_sub_folders(
            locs.iter().map(|l| self.registry.simple_path(l)),
        );
        for path in &deepest {
            let loc = self.registry.parse(path);
            if let Err(e) = self.create_folder(&loc) {
                debug!(location = %loc, error = %e, "batch folder creation failed");
            }
        }
        locs.iter().map(|l| self.resolve(l, false)).collect()
    }

    pub fn open_read(&self, loc: &StorageLocation) -> io::Result<Box<dyn Read + Send>> {
        match self.routed(loc)? {
            Route::Raw => self.raw.open_read(loc),
            Route::Tree => self.tree_ref()?.open_read(loc),
        }
    }

    pub fn open_write(&self, loc: &StorageLocation) -> io::Result<Box<dyn WriteSeek>> {
        match self.routed(loc)? {
            Route::Raw => self.raw.open_write(loc),
            Route::Tree => self.tree_ref()?.open_write(loc),
        }
    }

    /// Delete a file or a folder (recursively).
    pub fn delete(&self, loc: &StorageLocation) -> io::Result<()> {
        match self.routed(loc)? {
            Route::Raw => self.raw.delete(loc),
            Route::Tree => self.tree_ref()?.delete(loc),
        }
    }

    /// Rename in place; the entry keeps its parent.
    pub fn rename(&self, loc: &StorageLocation, new_name: &str) -> io::Result<StorageLocation> {
        match self.routed(loc)? {
            Route::Raw => self.raw.rename(loc, new_name),
            Route::Tree => self.tree_ref()?.rename(loc, new_name),
        }
    }

    /// Atomic move fast path. `Ok(true)` means the entry now lives at
    /// `dest_folder.child(new_name)`; `Ok(false)` means this pair cannot
    /// be moved atomically and the caller must stream instead.
    pub fn move_entry(
        &self,
        src: &StorageLocation,
        dest_folder: &StorageLocation,
        new_name: &str,
    ) -> io::Result<bool> {
        if !src.in_same_mount_point_with(dest_folder) {
            return Ok(false);
        }
        let (a, b) = (self.routed(src)?, self.routed(dest_folder)?);
        if a != b {
            return Ok(false);
        }
        match a {
            Route::Raw => self.raw.move_entry(src, dest_folder, new_name),
            Route::Tree => self.tree_ref()?.move_entry(src, dest_folder, new_name),
        }
    }

    /// Free bytes on the volume holding `loc`.
    pub fn available_bytes(&self, loc: &StorageLocation) -> io::Result<u64> {
        match self.routed(loc)? {
            Route::Raw => self.raw.available_bytes(loc),
            Route::Tree => self.tree_ref()?.available_bytes(loc),
        }
    }

    /// Carry a modification time onto an entry. Best effort on the tree
    /// side; providers may not support it.
    pub fn set_modified(&self, loc: &StorageLocation, mtime: SystemTime) -> io::Result<()> {
        match self.routed(loc)? {
            Route::Raw => self.raw.set_modified(loc, mtime),
            Route::Tree => self.tree_ref()?.set_modified(loc, mtime),
        }
    }

    fn tree_ref(&self) -> io::Result<&tree::TreeBackend> {
        self.tree.as_ref().ok_or_else(|| {
            io::Error::new(io::ErrorKind::PermissionDenied, "no document provider attached")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_guess_knows_zip() {
        assert_eq!(mime_type_of("Archive.ZIP"), "application/zip");
        assert_eq!(mime_type_of("noext"), "application/octet-stream");
    }

    #[test]
    fn unresolvable_location_routes_nowhere() {
        let storage = Storage::new(StorageRegistry::default());
        assert!(storage.resolve(&StorageLocation::unknown(), false).is_none());
        let err = storage.list(&StorageLocation::unknown()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn restricted_raw_without_provider_reaches_nothing_shared() {
        let storage = Storage::new(StorageRegistry::default()).with_full_raw_access(false);
        let loc = StorageLocation::new(storage_id::PRIMARY, "Music");
        assert!(storage.resolve(&loc, false).is_none());
    }

    #[test]
    fn batch_folder_creation_covers_ancestors_once() {
        let tmp = tempfile::TempDir::new().unwrap();
        let storage = Storage::new(StorageRegistry::new(
            tmp.path().to_string_lossy(),
            "/data/media",
        ));
        let requested = vec![
            StorageLocation::new(storage_id::PRIMARY, "Music"),
            StorageLocation::new(storage_id::PRIMARY, "Music/Favorites/Pop"),
            StorageLocation::new(storage_id::PRIMARY, "Video"),
        ];
        let created = storage.create_folders(&requested);
        assert_eq!(created.len(), 3);
        assert!(created.iter().all(Option::is_some));
        assert!(tmp.path().join("Music/Favorites/Pop").is_dir());
        assert!(tmp.path().join("Video").is_dir());
    }
}
