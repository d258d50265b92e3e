use std::fs;
use std::io::{self, Read};
use std::sync::Arc;

use duofs::backend::{DocumentInfo, WriteSeek};
use duofs::location::storage_id;
use duofs::transfer::NoEvents;
use duofs::{
    CancelToken, DocumentProvider, EntryKind, ErrorCode, FileTransferOptions, FsDocumentProvider,
    SpacePolicy, Storage, StorageLocation, TransferMode, transfer_file,
};
use tempfile::TempDir;

/// Reader that trips the cancel token as soon as the first chunk is
/// handed out, like an interrupt landing while bytes are in flight.
struct TrippedReader {
    inner: Box<dyn Read + Send>,
    cancel: CancelToken,
}

impl Read for TrippedReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.cancel.cancel();
        }
        Ok(n)
    }
}

struct TrippedProvider {
    inner: FsDocumentProvider,
    cancel: CancelToken,
}

impl DocumentProvider for TrippedProvider {
    fn has_grant(&self, loc: &StorageLocation) -> bool {
        self.inner.has_grant(loc)
    }

    fn stat(&self, loc: &StorageLocation) -> io::Result<Option<DocumentInfo>> {
        self.inner.stat(loc)
    }

    fn list(&self, loc: &StorageLocation) -> io::Result<Vec<DocumentInfo>> {
        self.inner.list(loc)
    }

    fn create_document(
        &self,
        parent: &StorageLocation,
        name: &str,
        kind: EntryKind,
    ) -> io::Result<StorageLocation> {
        self.inner.create_document(parent, name, kind)
    }

    fn open_read(&self, loc: &StorageLocation) -> io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(TrippedReader {
            inner: self.inner.open_read(loc)?,
            cancel: self.cancel.clone(),
        }))
    }

    fn open_write(&self, loc: &StorageLocation) -> io::Result<Box<dyn WriteSeek>> {
        self.inner.open_write(loc)
    }

    fn delete(&self, loc: &StorageLocation) -> io::Result<()> {
        self.inner.delete(loc)
    }

    fn rename(&self, loc: &StorageLocation, new_name: &str) -> io::Result<StorageLocation> {
        self.inner.rename(loc, new_name)
    }

    fn move_document(
        &self,
        src: &StorageLocation,
        dest_folder: &StorageLocation,
        new_name: &str,
    ) -> io::Result<bool> {
        self.inner.move_document(src, dest_folder, new_name)
    }

    fn available_bytes(&self, loc: &StorageLocation) -> io::Result<u64> {
        self.inner.available_bytes(loc)
    }
}

#[test]
fn cancel_mid_copy_removes_the_partial_target() {
    let docs = TempDir::new().unwrap();
    // Larger than one streaming chunk, so the cancel lands with bytes
    // already written to the target.
    fs::write(docs.path().join("big.bin"), vec![3u8; 256 * 1024]).unwrap();
    fs::create_dir_all(docs.path().join("dst")).unwrap();

    let cancel = CancelToken::new();
    let provider = TrippedProvider {
        inner: FsDocumentProvider::new().grant(
            StorageLocation::new(storage_id::PRIMARY, "Documents"),
            docs.path(),
        ),
        cancel: cancel.clone(),
    };
    let st = Storage::new(duofs::StorageRegistry::new(
        "/nonexistent/primary",
        "/data/media",
    ))
    .with_full_raw_access(false)
    .with_provider(Arc::new(provider));

    let err = transfer_file(
        &st,
        &StorageLocation::new(storage_id::PRIMARY, "Documents/big.bin"),
        &StorageLocation::new(storage_id::PRIMARY, "Documents/dst"),
        &FileTransferOptions::new(TransferMode::Copy).with_space(SpacePolicy::unchecked()),
        Arc::new(NoEvents),
        &cancel,
    )
    .unwrap_err();

    assert_eq!(err.code, ErrorCode::Canceled);
    assert!(
        !docs.path().join("dst/big.bin").exists(),
        "half-written target must be removed"
    );
    assert_eq!(
        fs::metadata(docs.path().join("big.bin")).unwrap().len(),
        256 * 1024,
        "source stays intact"
    );
}
