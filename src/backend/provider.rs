//! Filesystem-backed document provider.
//!
//! Stands in for the platform document service: granted tree roots are
//! mapped onto local directories and every call is checked against the
//! grant table first. The CLI builds one from the config; tests use it
//! to exercise the tree path without a real privileged service.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::SystemTime;

use filetime::FileTime;

use crate::location::{StorageLocation, sub_path_of};

use super::tree::{DocumentInfo, DocumentProvider};
use super::{EntryKind, WriteSeek};

pub struct FsDocumentProvider {
    /// Granted tree root → backing directory.
    grants: BTreeMap<StorageLocation, PathBuf>,
    /// Test hook: fixed free-space answer instead of asking the OS.
    available_override: Option<u64>,
}

impl FsDocumentProvider {
    pub fn new() -> Self {
        Self {
            grants: BTreeMap::new(),
            available_override: None,
        }
    }

    /// Grant access to everything under `root`, backed by `dir`.
    pub fn grant(mut self, root: StorageLocation, dir: impl Into<PathBuf>) -> Self {
        self.grants.insert(root, dir.into());
        self
    }

    /// Answer every free-space query with a fixed number.
    pub fn with_available_bytes(mut self, bytes: u64) -> Self {
        self.available_override = Some(bytes);
        self
    }

    /// Backing path of a granted location.
    fn path_of(&self, loc: &StorageLocation) -> io::Result<PathBuf> {
        for (root, dir) in &self.grants {
            if root.storage_id() != loc.storage_id() {
                continue;
            }
            if root.base_path() == loc.base_path() {
                return Ok(dir.clone());
            }
            let root_base = format!("/{}", root.base_path());
            let loc_base = format!("/{}", loc.base_path());
            if let Some(rest) = sub_path_of(&loc_base, &root_base) {
                return Ok(dir.join(rest));
            }
        }
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("no grant covers {loc}"),
        ))
    }

    fn info_from(loc: StorageLocation, meta: &fs::Metadata) -> DocumentInfo {
        DocumentInfo {
            name: loc.name().to_string(),
            kind: if meta.is_dir() {
                EntryKind::Folder
            } else {
                EntryKind::File
            },
            len: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
            writable: !meta.permissions().readonly(),
            location: loc,
        }
    }
}

impl Default for FsDocumentProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentProvider for FsDocumentProvider {
    fn has_grant(&self, loc: &StorageLocation) -> bool {
        self.path_of(loc).is_ok()
    }

    fn stat(&self, loc: &StorageLocation) -> io::Result<Option<DocumentInfo>> {
        let path = self.path_of(loc)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(Self::info_from(loc.clone(), &meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn list(&self, loc: &StorageLocation) -> io::Result<Vec<DocumentInfo>> {
        let path = self.path_of(loc)?;
        let mut out = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            out.push(Self::info_from(loc.child(&name), &meta));
        }
        Ok(out)
    }

    fn create_document(
        &self,
        parent: &StorageLocation,
        name: &str,
        kind: EntryKind,
    ) -> io::Result<StorageLocation> {
        let path = self.path_of(parent)?.join(name);
        match kind {
            EntryKind::File => {
                fs::File::create(&path)?;
            }
            EntryKind::Folder => fs::create_dir(&path)?,
        }
        Ok(parent.child(name))
    }

    fn open_read(&self, loc: &StorageLocation) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(self.path_of(loc)?)?))
    }

    fn open_write(&self, loc: &StorageLocation) -> io::Result<Box<dyn WriteSeek>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path_of(loc)?)?;
        Ok(Box::new(file))
    }

    fn delete(&self, loc: &StorageLocation) -> io::Result<()> {
        let path = self.path_of(loc)?;
        if fs::metadata(&path)?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
    }

    fn rename(&self, loc: &StorageLocation, new_name: &str) -> io::Result<StorageLocation> {
        let parent = loc.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot rename a tree root")
        })?;
        fs::rename(self.path_of(loc)?, self.path_of(&parent)?.join(new_name))?;
        Ok(parent.child(new_name))
    }

    fn move_document(
        &self,
        src: &StorageLocation,
        dest_folder: &StorageLocation,
        new_name: &str,
    ) -> io::Result<bool> {
        let from = self.path_of(src)?;
        let to = self.path_of(dest_folder)?.join(new_name);
        match fs::rename(&from, &to) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::CrossesDevices => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn available_bytes(&self, loc: &StorageLocation) -> io::Result<u64> {
        if let Some(bytes) = self.available_override {
            return Ok(bytes);
        }
        fs2::available_space(self.path_of(loc)?)
    }

    fn set_modified(&self, loc: &StorageLocation, mtime: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(self.path_of(loc)?, FileTime::from_system_time(mtime))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::storage_id;
    use tempfile::TempDir;

    fn granted(tmp: &TempDir) -> FsDocumentProvider {
        FsDocumentProvider::new().grant(
            StorageLocation::new(storage_id::PRIMARY, "Documents"),
            tmp.path(),
        )
    }

    #[test]
    fn grant_covers_root_and_descendants_only() {
        let tmp = TempDir::new().unwrap();
        let p = granted(&tmp);
        assert!(p.has_grant(&StorageLocation::new(storage_id::PRIMARY, "Documents")));
        assert!(p.has_grant(&StorageLocation::new(storage_id::PRIMARY, "Documents/a/b")));
        assert!(!p.has_grant(&StorageLocation::new(storage_id::PRIMARY, "Music")));
        assert!(!p.has_grant(&StorageLocation::new(storage_id::PRIMARY, "DocumentsX")));
        assert!(!p.has_grant(&StorageLocation::new(storage_id::DATA, "Documents")));
    }

    #[test]
    fn create_stat_and_delete_through_the_grant() {
        let tmp = TempDir::new().unwrap();
        let p = granted(&tmp);
        let root = StorageLocation::new(storage_id::PRIMARY, "Documents");
        let folder = p
            .create_document(&root, "inbox", EntryKind::Folder)
            .unwrap();
        let file = p.create_document(&folder, "a.txt", EntryKind::File).unwrap();
        assert!(tmp.path().join("inbox/a.txt").exists());
        let info = p.stat(&file).unwrap().unwrap();
        assert_eq!(info.kind, EntryKind::File);
        p.delete(&folder).unwrap();
        assert!(p.stat(&folder).unwrap().is_none());
    }

    #[test]
    fn fixed_free_space_answer() {
        let tmp = TempDir::new().unwrap();
        let p = granted(&tmp).with_available_bytes(42);
        let root = StorageLocation::new(storage_id::PRIMARY, "Documents");
        assert_eq!(p.available_bytes(&root).unwrap(), 42);
    }
}
