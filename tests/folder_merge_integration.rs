use std::fs;
use std::sync::Arc;

use duofs::location::storage_id;
use duofs::transfer::FolderTransferEvents;
use duofs::{
    CancelToken, ConflictAction, FolderConflictResolution, FolderTransferOptions, ResourceHandle,
    SpacePolicy, Storage, StorageLocation, StorageRegistry, TransferMode, transfer_folder,
};
use tempfile::TempDir;

/// Always merges into an existing destination; file collisions keep the
/// default per-file answer (create-new).
struct AlwaysMerge;

impl FolderTransferEvents for AlwaysMerge {
    fn on_parent_conflict(
        &self,
        _existing: &ResourceHandle,
        can_merge: bool,
        action: ConflictAction<FolderConflictResolution>,
    ) {
        assert!(can_merge, "existing destination should be mergeable");
        action.resolve(FolderConflictResolution::Merge);
    }
}

fn storage(tmp: &TempDir) -> Storage {
    Storage::new(StorageRegistry::new(
        tmp.path().to_string_lossy(),
        "/data/media",
    ))
}

fn loc(path: &str) -> StorageLocation {
    StorageLocation::new(storage_id::PRIMARY, path)
}

#[test]
fn merge_keeps_old_files_and_lands_new_ones_beside_them() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("src/sub")).unwrap();
    fs::write(tmp.path().join("src/a.txt"), b"new a").unwrap();
    fs::write(tmp.path().join("src/sub/b.txt"), b"b").unwrap();
    fs::create_dir_all(tmp.path().join("dst/src")).unwrap();
    fs::write(tmp.path().join("dst/src/a.txt"), b"old a").unwrap();

    let st = storage(&tmp);
    let report = transfer_folder(
        &st,
        &loc("src"),
        &loc("dst"),
        &FolderTransferOptions::new(TransferMode::Copy).with_space(SpacePolicy::unchecked()),
        Arc::new(AlwaysMerge),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(report.success);
    assert_eq!(report.files_requested, 2);
    assert_eq!(report.files_completed, 2);
    assert_eq!(fs::read(tmp.path().join("dst/src/a.txt")).unwrap(), b"old a");
    assert_eq!(
        fs::read(tmp.path().join("dst/src/a (1).txt")).unwrap(),
        b"new a"
    );
    assert_eq!(fs::read(tmp.path().join("dst/src/sub/b.txt")).unwrap(), b"b");
}

#[test]
fn move_merge_drops_the_source_tree() {
    let tmp = TempDir::new().unwrap();
    fs::create_dir_all(tmp.path().join("src")).unwrap();
    fs::write(tmp.path().join("src/a.txt"), b"a").unwrap();
    fs::create_dir_all(tmp.path().join("dst/src")).unwrap();

    let st = storage(&tmp);
    let report = transfer_folder(
        &st,
        &loc("src"),
        &loc("dst"),
        &FolderTransferOptions::new(TransferMode::Move).with_space(SpacePolicy::unchecked()),
        Arc::new(AlwaysMerge),
        &CancelToken::new(),
    )
    .unwrap();

    assert!(report.success);
    assert!(!tmp.path().join("src").exists());
    assert_eq!(fs::read(tmp.path().join("dst/src/a.txt")).unwrap(), b"a");
}
