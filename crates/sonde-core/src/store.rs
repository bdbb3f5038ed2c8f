//! CSV-backed record store.
//!
//! A bounded channel feeds a single writer thread that owns the file
//! handle, so concurrent appenders can never tear a row and never contend
//! on a lock around the file. `append` succeeding means the record is
//! queued; `close` drains the queue and flushes before returning.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use tracing::{debug, error, info};

use crate::{Reading, RecordSink, SinkError};

/// Default bound on the writer queue.
const DEFAULT_QUEUE_CAPACITY: usize = 8_192;

/// Counters for one store instance.
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Records accepted into the queue.
    pub queued: AtomicU64,
    /// Records persisted by the writer thread.
    pub written: AtomicU64,
    /// Serialization or I/O failures inside the writer.
    pub write_errors: AtomicU64,
}

enum StoreMsg {
    Record(Reading),
    Shutdown,
}

/// Append-only CSV store shared across producer threads.
///
/// The file is created fresh with a header row; every reading becomes one
/// row in commit order. Row order across producers is whatever the queue
/// saw; rows from a single producer keep that producer's append order.
pub struct CsvStore {
    path: PathBuf,
    tx: Sender<StoreMsg>,
    closed: AtomicBool,
    writer: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<StoreStats>,
}

impl CsvStore {
    /// Opens `path` for a fresh run and starts the writer thread.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        Self::with_capacity(path, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| SinkError::Io(e.to_string()))?;
            }
        }

        let writer = csv::WriterBuilder::new()
            .has_headers(true)
            .from_path(&path)
            .map_err(|e| SinkError::Io(e.to_string()))?;

        let (tx, rx) = bounded(capacity);
        let stats = Arc::new(StoreStats::default());
        let writer_stats = stats.clone();
        let handle = thread::Builder::new()
            .name("sonde-store".to_string())
            .spawn(move || writer_loop(writer, rx, writer_stats))
            .map_err(|e| SinkError::Io(e.to_string()))?;

        info!(path = %path.display(), capacity, "raw record store opened");

        Ok(Self {
            path,
            tx,
            closed: AtomicBool::new(false),
            writer: Mutex::new(Some(handle)),
            stats,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }
}

impl RecordSink for CsvStore {
    fn append(&self, reading: Reading) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        match self.tx.try_send(StoreMsg::Record(reading)) {
            Ok(()) => {
                self.stats.queued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(SinkError::Backpressure),
            Err(TrySendError::Disconnected(_)) => Err(SinkError::Closed),
        }
    }

    fn close(&self) -> Result<(), SinkError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let _ = self.tx.send(StoreMsg::Shutdown);

        let handle = match self.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            if handle.join().is_err() {
                return Err(SinkError::Io("record store writer panicked".to_string()));
            }
        }

        let write_errors = self.stats.write_errors.load(Ordering::Relaxed);
        if write_errors > 0 {
            return Err(SinkError::Io(format!(
                "{write_errors} record(s) failed to persist"
            )));
        }
        Ok(())
    }
}

impl Drop for CsvStore {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

fn writer_loop(
    mut writer: csv::Writer<std::fs::File>,
    rx: Receiver<StoreMsg>,
    stats: Arc<StoreStats>,
) {
    loop {
        match rx.recv() {
            Ok(StoreMsg::Record(reading)) => write_record(&mut writer, &reading, &stats),
            Ok(StoreMsg::Shutdown) => break,
            // Every sender dropped without an explicit close.
            Err(_) => break,
        }
    }

    // Appends racing the shutdown sentinel may still sit behind it in the
    // queue; they were accepted, so they get written.
    for msg in rx.try_iter() {
        if let StoreMsg::Record(reading) = msg {
            write_record(&mut writer, &reading, &stats);
        }
    }

    if let Err(e) = writer.flush() {
        stats.write_errors.fetch_add(1, Ordering::Relaxed);
        error!(error = %e, "failed to flush record store");
    }
    debug!("record store writer stopped");
}

fn write_record(writer: &mut csv::Writer<std::fs::File>, reading: &Reading, stats: &StoreStats) {
    match writer.serialize(reading) {
        Ok(()) => {
            stats.written.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            stats.write_errors.fetch_add(1, Ordering::Relaxed);
            error!(sensor = %reading.sensor_id, error = %e, "failed to write record");
        }
    }
}

/// Reads every record back from a raw store file, in commit order.
///
/// This is the surface the downstream cleaning pipeline consumes; tests use
/// it to audit what a run persisted.
pub fn read_readings(path: impl AsRef<Path>) -> Result<Vec<Reading>, SinkError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path.as_ref())
        .map_err(|e| SinkError::Io(e.to_string()))?;

    let mut readings = Vec::new();
    for row in reader.deserialize::<Reading>() {
        readings.push(row.map_err(|e| SinkError::Io(e.to_string()))?);
    }
    Ok(readings)
}
