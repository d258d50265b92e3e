//! Progress metering.
//!
//! The main transfer loop is the single writer of a [`Counters`] set;
//! a lightweight timer thread is the single reader, waking at the
//! caller-chosen interval to emit a [`Progress`] snapshot. The timer
//! performs no I/O of its own — it only reads counters and invokes the
//! caller's report callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Snapshot handed to progress callbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    /// 0..100; 0 when the total is unknown.
    pub percent: f32,
    /// Cumulative bytes written so far.
    pub bytes_moved: u64,
    /// Bytes written since the previous report tick.
    pub write_speed: u64,
    /// Files fully written so far (batch operations only).
    pub files_completed: u32,
}

/// Shared counters between the transfer loop (writer) and the report
/// timer (reader).
#[derive(Debug)]
pub struct Counters {
    total_bytes: AtomicU64,
    bytes: AtomicU64,
    tick_bytes: AtomicU64,
    files: AtomicU32,
}

impl Counters {
    pub fn new(total_bytes: u64) -> Arc<Self> {
        Arc::new(Self {
            total_bytes: AtomicU64::new(total_bytes),
            bytes: AtomicU64::new(0),
            tick_bytes: AtomicU64::new(0),
            files: AtomicU32::new(0),
        })
    }

    /// Grow the denominator mid-run (merge phases discover extra bytes).
    pub fn add_total_bytes(&self, n: u64) {
        self.total_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
        self.tick_bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_file(&self) {
        self.files.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_moved(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    pub fn files_completed(&self) -> u32 {
        self.files.load(Ordering::Relaxed)
    }

    /// Snapshot and reset the per-tick rate counter.
    pub fn tick(&self) -> Progress {
        let bytes = self.bytes.load(Ordering::Relaxed);
        let total = self.total_bytes.load(Ordering::Relaxed);
        Progress {
            percent: percent_of(bytes, total),
            bytes_moved: bytes,
            write_speed: self.tick_bytes.swap(0, Ordering::Relaxed),
            files_completed: self.files.load(Ordering::Relaxed),
        }
    }

    /// Snapshot without touching the rate counter.
    pub fn snapshot(&self) -> Progress {
        let bytes = self.bytes.load(Ordering::Relaxed);
        let total = self.total_bytes.load(Ordering::Relaxed);
        Progress {
            percent: percent_of(bytes, total),
            bytes_moved: bytes,
            write_speed: 0,
            files_completed: self.files.load(Ordering::Relaxed),
        }
    }
}

fn percent_of(bytes: u64, total: u64) -> f32 {
    if total == 0 {
        0.0
    } else {
        (bytes as f64 * 100.0 / total as f64) as f32
    }
}

/// Callback type used by all engines for progress reporting.
pub type ProgressFn = dyn Fn(Progress) + Send + Sync;

/// Periodic reporter. Stops and joins on drop so no tick can outlive
/// the operation that started it.
pub struct ProgressTimer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ProgressTimer {
    pub fn start(interval: Duration, counters: Arc<Counters>, report: Arc<ProgressFn>) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("duofs-progress".into())
            .spawn(move || {
                while !stop2.load(Ordering::Relaxed) {
                    thread::sleep(interval);
                    if stop2.load(Ordering::Relaxed) {
                        break;
                    }
                    report(counters.tick());
                }
            })
            .expect("spawn progress timer");
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Stop ticking. Idempotent; also invoked by drop.
    pub fn cancel(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for ProgressTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn tick_resets_rate_but_not_cumulative() {
        let c = Counters::new(100);
        c.add_bytes(40);
        let p = c.tick();
        assert_eq!(p.bytes_moved, 40);
        assert_eq!(p.write_speed, 40);
        assert!((p.percent - 40.0).abs() < 0.01);
        c.add_bytes(10);
        let p = c.tick();
        assert_eq!(p.bytes_moved, 50);
        assert_eq!(p.write_speed, 10);
    }

    #[test]
    fn unknown_total_reports_zero_percent() {
        let c = Counters::new(0);
        c.add_bytes(1024);
        assert_eq!(c.snapshot().percent, 0.0);
    }

    #[test]
    fn timer_emits_and_stops_on_drop() {
        let c = Counters::new(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let timer = ProgressTimer::start(
            Duration::from_millis(10),
            Arc::clone(&c),
            Arc::new(move |p: Progress| seen2.lock().unwrap().push(p.bytes_moved)),
        );
        c.add_bytes(5);
        thread::sleep(Duration::from_millis(50));
        drop(timer);
        let count = seen.lock().unwrap().len();
        assert!(count >= 1, "expected at least one tick, got {count}");
        thread::sleep(Duration::from_millis(30));
        assert_eq!(seen.lock().unwrap().len(), count, "ticks after drop");
    }
}
