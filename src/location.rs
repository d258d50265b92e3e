//! Path model: the `storageId:basePath` addressing scheme unifying both
//! backends.
//!
//! A [`StorageLocation`] names a file or folder without saying which
//! backend owns it. The mapping between the three path forms (simple
//! path, absolute OS path, backend handle) is a pure function of the
//! [`StorageRegistry`] mount table; nothing here touches the filesystem.

use std::collections::BTreeMap;

/// Well-known storage identifiers. Removable volumes use their serial
/// (`XXXX-XXXX`) as the identifier instead of a constant.
pub mod storage_id {
    /// The shared primary external volume.
    pub const PRIMARY: &str = "primary";

    /// The app-private data area. Never reachable through the document
    /// tree backend.
    pub const DATA: &str = "data";
}

/// Default mount roots matching the platform layout this model came from.
pub const PRIMARY_ROOT_DEFAULT: &str = "/storage/emulated/0";
pub const DATA_ROOT_DEFAULT: &str = "/data/media";

/// True for removable-volume serials of the form `XXXX-XXXX`
/// (4 alphanumerics, hyphen, 4 alphanumerics).
pub fn is_removable_id(id: &str) -> bool {
    let bytes = id.as_bytes();
    bytes.len() == 9
        && bytes[4] == b'-'
        && bytes[..4]
            .iter()
            .chain(&bytes[5..])
            .all(|b| b.is_ascii_alphanumeric())
}

/// Collapse duplicate separators and trim leading/trailing ones.
/// Traversal segments (`.` / `..`) are dropped outright; the addressing
/// scheme has no notion of relative navigation.
pub fn trim_separators(path: &str) -> String {
    path.split('/')
        .filter(|seg| !seg.is_empty() && *seg != "." && *seg != "..")
        .collect::<Vec<_>>()
        .join("/")
}

/// Strip characters that are not legal in a single file name (separators
/// and the simple-path delimiter).
pub fn sanitize_name(name: &str) -> String {
    name.chars().filter(|c| *c != '/' && *c != ':').collect()
}

/// Component-wise ancestor test over absolute paths.
/// `has_parent("/a/b/c", "/a/b")` is true; `/a/bc` is not a parent of `/a/b`.
pub fn has_parent(child: &str, parent: &str) -> bool {
    let parent = parent.trim_end_matches('/');
    let child = child.trim_end_matches('/');
    if parent.is_empty() || child.len() <= parent.len() {
        return false;
    }
    child.starts_with(parent) && child.as_bytes()[parent.len()] == b'/'
}

/// Relative path of `child` under `parent`, or `None` when `child` is
/// not a strict descendant.
pub fn sub_path_of<'a>(child: &'a str, parent: &str) -> Option<&'a str> {
    if has_parent(child, parent) {
        Some(child[parent.trim_end_matches('/').len()..].trim_start_matches('/'))
    } else {
        None
    }
}

/// Backend-neutral address of a file or folder.
///
/// Invariant: `(storage_id, base_path)` maps to exactly one absolute
/// path and one backend handle; an empty `storage_id` means the address
/// could not be resolved and must be treated as such by callers, never
/// as a crash.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageLocation {
    storage_id: String,
    base_path: String,
}

impl StorageLocation {
    pub fn new(storage_id: impl Into<String>, base_path: &str) -> Self {
        Self {
            storage_id: storage_id.into(),
            base_path: trim_separators(base_path),
        }
    }

    /// The unresolvable address. Produced by [`StorageRegistry::parse`]
    /// for unrecognized inputs.
    pub fn unknown() -> Self {
        Self {
            storage_id: String::new(),
            base_path: String::new(),
        }
    }

    pub fn storage_id(&self) -> &str {
        &self.storage_id
    }

    /// Relative path under the storage root; empty denotes the root itself.
    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn is_resolvable(&self) -> bool {
        !self.storage_id.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.base_path.is_empty()
    }

    /// Final path segment, or the storage id at the root.
    pub fn name(&self) -> &str {
        self.base_path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.storage_id)
    }

    /// Parent folder on the same storage; `None` at the root.
    pub fn parent(&self) -> Option<StorageLocation> {
        if self.base_path.is_empty() {
            return None;
        }
        let parent = match self.base_path.rsplit_once('/') {
            Some((head, _)) => head,
            None => "",
        };
        Some(StorageLocation::new(self.storage_id.clone(), parent))
    }

    /// Child address under this location.
    pub fn child(&self, name: &str) -> StorageLocation {
        let name = trim_separators(name);
        let base = if self.base_path.is_empty() {
            name
        } else if name.is_empty() {
            self.base_path.clone()
        } else {
            format!("{}/{}", self.base_path, name)
        };
        StorageLocation {
            storage_id: self.storage_id.clone(),
            base_path: base,
        }
    }

    pub fn in_same_mount_point_with(&self, other: &StorageLocation) -> bool {
        self.storage_id == other.storage_id
    }
}

impl std::fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.storage_id, self.base_path)
    }
}

/// Mount table mapping storage identifiers to host roots.
///
/// Defaults follow the platform layout; a config file can re-point every
/// root so the same addressing scheme works on any host. All methods are
/// side-effect-free.
#[derive(Debug, Clone)]
pub struct StorageRegistry {
    primary_root: String,
    data_root: String,
    /// Overrides for removable volumes; unknown serials fall back to
    /// `/storage/<SERIAL>`.
    volume_roots: BTreeMap<String, String>,
}

impl Default for StorageRegistry {
    fn default() -> Self {
        Self {
            primary_root: PRIMARY_ROOT_DEFAULT.to_string(),
            data_root: DATA_ROOT_DEFAULT.to_string(),
            volume_roots: BTreeMap::new(),
        }
    }
}

impl StorageRegistry {
    pub fn new(primary_root: impl Into<String>, data_root: impl Into<String>) -> Self {
        Self {
            primary_root: Into::<String>::into(primary_root)
                .trim_end_matches('/')
                .to_string(),
            data_root: Into::<String>::into(data_root)
                .trim_end_matches('/')
                .to_string(),
            volume_roots: BTreeMap::new(),
        }
    }

    /// Register the host mount point of a removable volume.
    pub fn add_volume(&mut self, serial: impl Into<String>, root: impl Into<String>) {
        self.volume_roots.insert(
            serial.into(),
            Into::<String>::into(root).trim_end_matches('/').to_string(),
        );
    }

    pub fn volume_serials(&self) -> impl Iterator<Item = &str> {
        self.volume_roots.keys().map(String::as_str)
    }

    /// Host root directory of a storage id, or `None` for unknown ids.
    pub fn root_of(&self, storage_id: &str) -> Option<String> {
        match storage_id {
            storage_id::PRIMARY => Some(self.primary_root.clone()),
            storage_id::DATA => Some(self.data_root.clone()),
            id if is_removable_id(id) => Some(
                self.volume_roots
                    .get(id)
                    .cloned()
                    .unwrap_or_else(|| format!("/storage/{id}")),
            ),
            _ => None,
        }
    }

    /// Absolute OS path of a location; empty string when unresolvable.
    pub fn absolute_path(&self, loc: &StorageLocation) -> String {
        let Some(root) = self.root_of(loc.storage_id()) else {
            return String::new();
        };
        if loc.base_path().is_empty() {
            root
        } else {
            format!("{}/{}", root, loc.base_path())
        }
    }

    /// `storageId:basePath` form; empty string when unresolvable.
    pub fn simple_path(&self, loc: &StorageLocation) -> String {
        if loc.is_resolvable() {
            loc.to_string()
        } else {
            String::new()
        }
    }

    /// Parse either an absolute OS path or a simple path.
    ///
    /// Unrecognized inputs yield [`StorageLocation::unknown`] — callers
    /// map that to a permission/not-found outcome instead of crashing.
    pub fn parse(&self, input: &str) -> StorageLocation {
        if !input.starts_with('/') {
            let (id, base) = match input.split_once(':') {
                Some((id, base)) => (id, base),
                None => return StorageLocation::unknown(),
            };
            // Tolerate a stray directory prefix before the id, as in
            // "/tree/primary:Music" style inputs.
            let id = id.rsplit('/').next().unwrap_or(id);
            return if self.root_of(id).is_some() {
                StorageLocation::new(id.to_string(), base)
            } else {
                StorageLocation::unknown()
            };
        }

        if let Some(rest) = strip_root(input, &self.primary_root) {
            return StorageLocation::new(storage_id::PRIMARY, rest);
        }
        if let Some(rest) = strip_root(input, &self.data_root) {
            return StorageLocation::new(storage_id::DATA, rest);
        }
        for (serial, root) in &self.volume_roots {
            if let Some(rest) = strip_root(input, root) {
                return StorageLocation::new(serial.clone(), rest);
            }
        }
        // Generic removable layout: /storage/XXXX-XXXX/...
        if let Some(rest) = input.strip_prefix("/storage/") {
            let serial = rest.split('/').next().unwrap_or("");
            if is_removable_id(serial) {
                let base = rest[serial.len()..].trim_start_matches('/');
                return StorageLocation::new(serial.to_string(), base);
            }
        }
        StorageLocation::unknown()
    }
}

fn strip_root<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return None;
    }
    if path == root {
        return Some("");
    }
    path.strip_prefix(root)
        .filter(|rest| rest.starts_with('/'))
        .map(|rest| rest.trim_start_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StorageRegistry {
        let mut r = StorageRegistry::default();
        r.add_volume("9016-4EF8", "/storage/9016-4EF8");
        r
    }

    #[test]
    fn parse_absolute_primary() {
        let loc = registry().parse("/storage/emulated/0/Music/Pop");
        assert_eq!(loc.storage_id(), "primary");
        assert_eq!(loc.base_path(), "Music/Pop");
        assert_eq!(loc.to_string(), "primary:Music/Pop");
    }

    #[test]
    fn parse_simple_path() {
        let loc = registry().parse("9016-4EF8:Movies/Action");
        assert_eq!(loc.storage_id(), "9016-4EF8");
        assert_eq!(
            registry().absolute_path(&loc),
            "/storage/9016-4EF8/Movies/Action"
        );
    }

    #[test]
    fn parse_unknown_yields_empty_storage_id() {
        let loc = registry().parse("/mnt/elsewhere/file.txt");
        assert!(!loc.is_resolvable());
        assert_eq!(registry().absolute_path(&loc), "");
    }

    #[test]
    fn empty_base_path_is_storage_root() {
        let loc = registry().parse("primary:");
        assert!(loc.is_root());
        assert_eq!(registry().absolute_path(&loc), "/storage/emulated/0");
    }

    #[test]
    fn separators_are_normalized() {
        let loc = StorageLocation::new("primary", "/a//b/../c/");
        assert_eq!(loc.base_path(), "a/b/c");
    }

    #[test]
    fn removable_pattern() {
        assert!(is_removable_id("AAAA-BBBB"));
        assert!(is_removable_id("9016-4EF8"));
        assert!(!is_removable_id("primary"));
        assert!(!is_removable_id("AAA-BBBB"));
        assert!(!is_removable_id("AAAA_BBBB"));
    }

    #[test]
    fn parent_and_child() {
        let loc = StorageLocation::new("primary", "Music/Pop");
        assert_eq!(loc.name(), "Pop");
        assert_eq!(loc.parent().unwrap().base_path(), "Music");
        assert_eq!(loc.child("song.mp3").base_path(), "Music/Pop/song.mp3");
        assert_eq!(
            StorageLocation::new("primary", "Music").parent().unwrap(),
            StorageLocation::new("primary", "")
        );
        assert!(StorageLocation::new("primary", "").parent().is_none());
    }

    #[test]
    fn has_parent_is_component_wise() {
        assert!(has_parent("/a/b/c", "/a/b"));
        assert!(!has_parent("/a/bc", "/a/b"));
        assert!(!has_parent("/a/b", "/a/b"));
        assert_eq!(sub_path_of("/a/b/c", "/a"), Some("b/c"));
        assert_eq!(sub_path_of("/a/bc", "/a/b"), None);
    }
}
