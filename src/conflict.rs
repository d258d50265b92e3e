//! Conflict resolution protocol.
//!
//! When a transfer hits a naming collision, the worker thread builds a
//! question, hands an answer handle to the caller's decision-maker
//! (typically marshaled onto a UI-bound thread), and parks until the
//! handle is resolved. The handoff is a one-shot channel: the worker
//! blocks on the receiving end, the decision-maker sends exactly one
//! answer.
//!
//! Liveness: if the decision-maker never resolves, the worker stays
//! parked forever (a zombie worker). [`Resolver::with_timeout`] bounds
//! the wait and defaults the answer to skipping. Cancellation of the
//! surrounding operation resolves a pending question as skip
//! immediately.

use std::sync::Mutex;
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};
use tracing::warn;

use crate::cancel::CancelToken;
use crate::location::StorageLocation;

/// Answer set for a file-level collision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Delete the existing destination, then proceed.
    Replace,
    /// Auto-increment the name: `ABC.zip` becomes `ABC (1).zip`.
    CreateNew,
    /// Abort this item.
    Skip,
}

/// Answer set for a folder-level (parent) collision. `Merge` is only
/// offered when the colliding destination is itself a folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderConflictResolution {
    Replace,
    /// Keep the existing folder and resolve content collisions per file.
    Merge,
    CreateNew,
    Skip,
}

impl FolderConflictResolution {
    pub fn to_file_resolution(self) -> ConflictResolution {
        match self {
            FolderConflictResolution::Replace => ConflictResolution::Replace,
            FolderConflictResolution::CreateNew => ConflictResolution::CreateNew,
            _ => ConflictResolution::Skip,
        }
    }
}

/// One file collision inside a merged folder transfer. The content
/// conflict callback receives the whole batch at once and sends it back
/// with a decision per entry.
#[derive(Debug, Clone)]
pub struct FileConflict {
    pub source: StorageLocation,
    pub target: StorageLocation,
    pub resolution: ConflictResolution,
}

impl FileConflict {
    pub fn new(source: StorageLocation, target: StorageLocation) -> Self {
        Self {
            source,
            target,
            resolution: ConflictResolution::CreateNew,
        }
    }
}

/// One-shot answer handle given to the decision-maker.
///
/// The first `resolve` wins; later calls are logged and ignored so a
/// double-confirm in UI code can never crash a transfer.
pub struct ConflictAction<T: Send + 'static> {
    tx: Mutex<Option<Sender<T>>>,
}

impl<T: Send + 'static> ConflictAction<T> {
    fn new() -> (Self, Receiver<T>) {
        let (tx, rx) = channel();
        (
            Self {
                tx: Mutex::new(Some(tx)),
            },
            rx,
        )
    }

    pub fn resolve(&self, answer: T) {
        let sender = match self.tx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        match sender {
            // A send error means the worker already gave up (canceled or
            // timed out); nothing left to do.
            Some(tx) => {
                let _ = tx.send(answer);
            }
            None => warn!("conflict already resolved; ignoring extra resolution"),
        }
    }
}

/// Parks the worker until a [`ConflictAction`] is resolved.
#[derive(Debug, Clone, Default)]
pub struct Resolver {
    timeout: Option<Duration>,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound the wait; an unanswered question resolves as `fallback`
    /// when the timeout elapses.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    /// Hand an answer handle to `present` and block until it is
    /// resolved. `fallback` is returned when the operation is canceled
    /// while parked, or when the configured timeout elapses.
    pub fn ask<T, F>(&self, cancel: &CancelToken, fallback: T, present: F) -> T
    where
        T: Send + Clone + 'static,
        F: FnOnce(ConflictAction<T>),
    {
        let (action, rx) = ConflictAction::new();
        present(action);

        let started = Instant::now();
        let poll = Duration::from_millis(50);
        loop {
            match rx.recv_timeout(poll) {
                Ok(answer) => return answer,
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    if cancel.is_canceled() {
                        return fallback;
                    }
                    if let Some(limit) = self.timeout {
                        if started.elapsed() >= limit {
                            warn!("conflict question unanswered; resolving with fallback");
                            return fallback;
                        }
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    // Decision-maker dropped the handle without answering.
                    return fallback;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn answer_from_another_thread_unblocks_the_worker() {
        let resolver = Resolver::new();
        let cancel = CancelToken::new();
        let got = resolver.ask(&cancel, ConflictResolution::Skip, |action| {
            let action = Arc::new(action);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                action.resolve(ConflictResolution::Replace);
            });
        });
        assert_eq!(got, ConflictResolution::Replace);
    }

    #[test]
    fn second_resolve_is_a_noop() {
        let resolver = Resolver::new();
        let cancel = CancelToken::new();
        let got = resolver.ask(&cancel, ConflictResolution::Skip, |action| {
            action.resolve(ConflictResolution::CreateNew);
            action.resolve(ConflictResolution::Replace);
        });
        assert_eq!(got, ConflictResolution::CreateNew);
    }

    #[test]
    fn cancellation_resolves_as_fallback() {
        let resolver = Resolver::new();
        let cancel = CancelToken::new();
        let c2 = cancel.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            c2.cancel();
        });
        // Never resolve; the cancel must unblock us.
        let got = resolver.ask(&cancel, ConflictResolution::Skip, |action| {
            std::mem::forget(action);
        });
        assert_eq!(got, ConflictResolution::Skip);
    }

    #[test]
    fn timeout_resolves_as_fallback() {
        let resolver = Resolver::with_timeout(Duration::from_millis(60));
        let cancel = CancelToken::new();
        let got = resolver.ask(&cancel, ConflictResolution::Skip, |action| {
            std::mem::forget(action);
        });
        assert_eq!(got, ConflictResolution::Skip);
    }

    #[test]
    fn dropped_handle_resolves_as_fallback() {
        let resolver = Resolver::new();
        let cancel = CancelToken::new();
        let got = resolver.ask(&cancel, ConflictResolution::Skip, |action| drop(action));
        assert_eq!(got, ConflictResolution::Skip);
    }
}
