//! Raw backend: direct filesystem access through the mount table.

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use filetime::FileTime;
use walkdir::WalkDir;

use crate::location::{StorageLocation, StorageRegistry};

use super::{BackendKind, EntryKind, ResourceHandle, WriteSeek};

pub struct RawBackend {
    registry: StorageRegistry,
}

impl RawBackend {
    pub fn new(registry: StorageRegistry) -> Self {
        Self { registry }
    }

    fn path_of(&self, loc: &StorageLocation) -> io::Result<PathBuf> {
        let abs = self.registry.absolute_path(loc);
        if abs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("unmapped storage id in {loc}"),
            ));
        }
        Ok(PathBuf::from(abs))
    }

    fn handle_from(&self, loc: StorageLocation, meta: &fs::Metadata) -> ResourceHandle {
        ResourceHandle {
            name: loc.name().to_string(),
            kind: if meta.is_dir() {
                EntryKind::Folder
            } else {
                EntryKind::File
            },
            len: if meta.is_dir() { 0 } else { meta.len() },
            modified: meta.modified().ok(),
            readable: true,
            writable: !meta.permissions().readonly(),
            backend: BackendKind::Raw,
            location: loc,
        }
    }

    pub fn stat(&self, loc: &StorageLocation) -> io::Result<Option<ResourceHandle>> {
        let path = self.path_of(loc)?;
        match fs::metadata(&path) {
            Ok(meta) => Ok(Some(self.handle_from(loc.clone(), &meta))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn list(&self, loc: &StorageLocation) -> io::Result<Vec<ResourceHandle>> {
        let path = self.path_of(loc)?;
        let mut out = Vec::new();
        for entry in fs::read_dir(&path)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata()?;
            out.push(self.handle_from(loc.child(&name), &meta));
        }
        Ok(out)
    }

    pub fn walk(&self, loc: &StorageLocation) -> io::Result<Vec<ResourceHandle>> {
        let root = self.path_of(loc)?;
        let mut out = Vec::new();
        for entry in WalkDir::new(&root).min_depth(1) {
            let entry = entry.map_err(io::Error::other)?;
            let rel = entry
                .path()
                .strip_prefix(&root)
                .map_err(io::Error::other)?;
            let meta = entry.metadata().map_err(io::Error::other)?;
            out.push(self.handle_from(loc.child(&rel.to_string_lossy()), &meta));
        }
        Ok(out)
    }

    pub fn create_file(
        &self,
        parent: &StorageLocation,
        name: &str,
    ) -> io::Result<StorageLocation> {
        let path = self.path_of(parent)?.join(name);
        fs::File::create(&path)?;
        Ok(parent.child(name))
    }

    pub fn create_folder(&self, loc: &StorageLocation) -> io::Result<ResourceHandle> {
        let path = self.path_of(loc)?;
        fs::create_dir_all(&path)?;
        let meta = fs::metadata(&path)?;
        Ok(self.handle_from(loc.clone(), &meta))
    }

    pub fn open_read(&self, loc: &StorageLocation) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(fs::File::open(self.path_of(loc)?)?))
    }

    pub fn open_write(&self, loc: &StorageLocation) -> io::Result<Box<dyn WriteSeek>> {
        let file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.path_of(loc)?)?;
        Ok(Box::new(file))
    }

    pub fn delete(&self, loc: &StorageLocation) -> io::Result<()> {
        let path = self.path_of(loc)?;
        if fs::metadata(&path)?.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        }
    }

    pub fn rename(&self, loc: &StorageLocation, new_name: &str) -> io::Result<StorageLocation> {
        let parent = loc.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "cannot rename a storage root")
        })?;
        let old = self.path_of(loc)?;
        let new = self.path_of(&parent)?.join(new_name);
        fs::rename(old, new)?;
        Ok(parent.child(new_name))
    }

    /// Same-volume rename; `Ok(false)` when the pair spans devices.
    pub fn move_entry(
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

    pub fn available_bytes(&self, loc: &StorageLocation) -> io::Result<u64> {
        let path = self.path_of(loc)?;
        fs2::available_space(nearest_existing(&path))
    }

    pub fn set_modified(&self, loc: &StorageLocation, mtime: SystemTime) -> io::Result<()> {
        filetime::set_file_mtime(self.path_of(loc)?, FileTime::from_system_time(mtime))
    }
}

/// Walk up until a path that exists; free-space queries are made before
/// the destination entry is created.
fn nearest_existing(path: &Path) -> &Path {
    let mut cur = path;
    while !cur.exists() {
        match cur.parent() {
            Some(p) => cur = p,
            None => return path,
        }
    }
    cur
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::storage_id;
    use tempfile::TempDir;

    fn backend(tmp: &TempDir) -> RawBackend {
        RawBackend::new(StorageRegistry::new(
            tmp.path().to_string_lossy(),
            "/data/media",
        ))
    }

    #[test]
    fn stat_list_and_walk() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("Music/Pop")).unwrap();
        fs::write(tmp.path().join("Music/Pop/a.mp3"), b"abc").unwrap();
        let raw = backend(&tmp);
        let root = StorageLocation::new(storage_id::PRIMARY, "Music");

        let h = raw.stat(&root).unwrap().unwrap();
        assert!(h.kind == EntryKind::Folder);

        let walked = raw.walk(&root).unwrap();
        let names: Vec<_> = walked.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Pop", "a.mp3"]);
        assert_eq!(walked[1].len, 3);
        assert_eq!(walked[1].location.base_path(), "Music/Pop/a.mp3");
    }

    #[test]
    fn missing_entry_stats_as_none() {
        let tmp = TempDir::new().unwrap();
        let raw = backend(&tmp);
        let loc = StorageLocation::new(storage_id::PRIMARY, "nope.txt");
        assert!(raw.stat(&loc).unwrap().is_none());
    }

    #[test]
    fn move_entry_renames_within_volume() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("dst")).unwrap();
        fs::write(tmp.path().join("x.txt"), b"1").unwrap();
        let raw = backend(&tmp);
        let src = StorageLocation::new(storage_id::PRIMARY, "x.txt");
        let dst = StorageLocation::new(storage_id::PRIMARY, "dst");
        assert!(raw.move_entry(&src, &dst, "x.txt").unwrap());
        assert!(tmp.path().join("dst/x.txt").exists());
        assert!(!tmp.path().join("x.txt").exists());
    }
}
