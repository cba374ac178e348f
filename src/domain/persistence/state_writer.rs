use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::domain::persistence::state_file::{StateFilePaths, read_state_file, write_state_file};
use crate::error::Result;

/// Messages sent from the controller to the writer thread.
enum WriterMessage {
    Save(Vec<u8>),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

#[derive(Debug, Default)]
struct WriterStats {
    writes: AtomicU64,
    failures: AtomicU64,
}

/// Single background thread writing packed reservation state to disk.
///
/// Snapshots are packed by the caller under the controller lock, the disk I/O
/// happens here without it. Queued snapshots are superseded by newer ones, so
/// at most one write is in flight and files never interleave.
#[derive(Debug)]
pub struct ResvStateWriter {
    sender: Mutex<mpsc::Sender<WriterMessage>>,
    paths: StateFilePaths,
    /// Serializes readers of the state file with the writer thread.
    file_lock: Arc<Mutex<()>>,
    stats: Arc<WriterStats>,
    handle: Option<JoinHandle<()>>,
}

impl ResvStateWriter {
    /// Creates the state save location if needed and spawns the writer thread.
    pub fn spawn(state_save_location: impl AsRef<Path>) -> Result<Self> {
        fs::create_dir_all(state_save_location.as_ref())?;
        let paths = StateFilePaths::new(state_save_location);
        let file_lock = Arc::new(Mutex::new(()));
        let stats = Arc::new(WriterStats::default());
        let (tx, rx) = mpsc::channel();

        let worker_paths = paths.clone();
        let worker_lock = Arc::clone(&file_lock);
        let worker_stats = Arc::clone(&stats);
        let handle = thread::Builder::new().name("resv-state-writer".to_string()).spawn(move || Self::worker_loop(rx, worker_paths, worker_lock, worker_stats))?;

        Ok(ResvStateWriter { sender: Mutex::new(tx), paths, file_lock, stats, handle: Some(handle) })
    }

    pub fn paths(&self) -> &StateFilePaths {
        &self.paths
    }

    /// Queues a snapshot. Returns immediately.
    pub fn save(&self, data: Vec<u8>) {
        if self.sender.lock().expect("Mutex poisoned").send(WriterMessage::Save(data)).is_err() {
            log::error!("Reservation state writer has stopped, state for '{}' not saved", self.paths.reg_file.display());
        }
    }

    /// Blocks until every snapshot queued so far has been written or has failed.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.sender.lock().expect("Mutex poisoned").send(WriterMessage::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    /// Current content of the state file, `None` if there is none.
    pub fn read_state(&self) -> Result<Option<Vec<u8>>> {
        let _guard = self.file_lock.lock().expect("Mutex poisoned");
        read_state_file(&self.paths)
    }

    pub fn completed_writes(&self) -> u64 {
        self.stats.writes.load(Ordering::Relaxed)
    }

    pub fn failed_writes(&self) -> u64 {
        self.stats.failures.load(Ordering::Relaxed)
    }

    fn worker_loop(rx: mpsc::Receiver<WriterMessage>, paths: StateFilePaths, file_lock: Arc<Mutex<()>>, stats: Arc<WriterStats>) {
        while let Ok(first) = rx.recv() {
            let mut latest = None;
            let mut acks = Vec::new();
            let mut shutdown = false;

            let mut next = Some(first);
            while let Some(msg) = next {
                match msg {
                    WriterMessage::Save(data) => {
                        if latest.is_some() {
                            log::debug!("Superseding queued reservation state snapshot");
                        }
                        latest = Some(data);
                    }
                    WriterMessage::Flush(ack) => acks.push(ack),
                    WriterMessage::Shutdown => shutdown = true,
                }
                next = rx.try_recv().ok();
            }

            if let Some(data) = latest {
                Self::write_snapshot(&paths, &file_lock, &stats, &data);
            }
            for ack in acks {
                let _ = ack.send(());
            }
            if shutdown {
                break;
            }
        }
    }

    fn write_snapshot(paths: &StateFilePaths, file_lock: &Mutex<()>, stats: &WriterStats, data: &[u8]) {
        let started = Instant::now();
        let _guard = file_lock.lock().expect("Mutex poisoned");

        match write_state_file(paths, data) {
            Ok(()) => {
                stats.writes.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(bytes = data.len(), elapsed_us = started.elapsed().as_micros() as u64, "dump_all_resv_state");
            }
            Err(e) => {
                stats.failures.fetch_add(1, Ordering::Relaxed);
                log::error!("Can't save reservation state to '{}': {}", paths.new_file.display(), e);
            }
        }
    }
}

impl Drop for ResvStateWriter {
    fn drop(&mut self) {
        if let Ok(sender) = self.sender.lock() {
            let _ = sender.send(WriterMessage::Shutdown);
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
