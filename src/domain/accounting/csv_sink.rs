use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, mpsc};
use std::thread::{self, JoinHandle};

use crate::domain::accounting::accounting_sink::{AccountingReservationRecord, AccountingSink};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "UPPERCASE")]
enum AccountingEvent {
    Add,
    Modify,
    Remove,
}

/// One line of the accounting file.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct AccountingRow {
    event: AccountingEvent,
    cluster: String,
    id: u32,
    nodes: String,
    cpus: u32,
    flags: u16,
    time_start: i64,
    time_end: i64,
    time_start_prev: i64,
}

impl AccountingRow {
    fn new(event: AccountingEvent, record: &AccountingReservationRecord) -> Self {
        AccountingRow {
            event,
            cluster: record.cluster.id.clone(),
            id: record.id,
            nodes: record.nodes.clone().unwrap_or_default(),
            cpus: record.cpus,
            flags: record.flags,
            time_start: record.time_start,
            time_end: record.time_end,
            time_start_prev: record.time_start_prev,
        }
    }
}

/// Messages sent from the controller to the writer thread.
enum AccountingMessage {
    Log(AccountingRow),
    Flush(mpsc::Sender<()>),
    Shutdown,
}

/// Appends lifecycle events to a `;` separated CSV file from a background thread.
#[derive(Debug)]
pub struct CsvAccountingSink {
    sender: Mutex<mpsc::Sender<AccountingMessage>>,
    handle: Option<JoinHandle<()>>,
    path: PathBuf,
}

impl CsvAccountingSink {
    /// Creates (truncates) the file and spawns the writer thread.
    pub fn spawn(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        let (tx, rx) = mpsc::channel();

        let handle = thread::Builder::new().name("resv-accounting".to_string()).spawn(move || Self::worker_loop(rx, file))?;

        log::info!("Reservation accounting events are written to '{}'", path.display());
        Ok(CsvAccountingSink { sender: Mutex::new(tx), handle: Some(handle), path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Blocks until every event sent so far is on disk.
    pub fn flush(&self) {
        let (tx, rx) = mpsc::channel();
        if self.send(AccountingMessage::Flush(tx)).is_ok() {
            let _ = rx.recv();
        }
    }

    fn worker_loop(rx: mpsc::Receiver<AccountingMessage>, file: File) {
        let mut csv_wtr = csv::WriterBuilder::new().delimiter(b';').from_writer(file);

        for msg in rx {
            match msg {
                AccountingMessage::Log(row) => {
                    if let Err(e) = csv_wtr.serialize(&row) {
                        log::error!("Accounting Error: Failed to write record for reservation {}: {}", row.id, e);
                    }
                }
                AccountingMessage::Flush(ack) => {
                    if let Err(e) = csv_wtr.flush() {
                        log::error!("Accounting Error: Failed to flush: {}", e);
                    }
                    let _ = ack.send(());
                }
                AccountingMessage::Shutdown => {
                    let _ = csv_wtr.flush();
                    break;
                }
            }
        }
    }

    fn send(&self, msg: AccountingMessage) -> Result<()> {
        self.sender
            .lock()
            .expect("Mutex poisoned")
            .send(msg)
            .map_err(|_| Error::AccountingUnavailable(format!("writer for '{}' has stopped", self.path.display())))
    }
}

impl AccountingSink for CsvAccountingSink {
    fn add_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        self.send(AccountingMessage::Log(AccountingRow::new(AccountingEvent::Add, record)))
    }

    fn modify_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        self.send(AccountingMessage::Log(AccountingRow::new(AccountingEvent::Modify, record)))
    }

    fn remove_reservation(&self, record: &AccountingReservationRecord) -> Result<()> {
        self.send(AccountingMessage::Log(AccountingRow::new(AccountingEvent::Remove, record)))
    }
}

impl Drop for CsvAccountingSink {
    fn drop(&mut self) {
        let _ = self.send(AccountingMessage::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
