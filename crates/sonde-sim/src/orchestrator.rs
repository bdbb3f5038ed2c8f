//! Fleet orchestration.
//!
//! `Fleet` owns the control signal, the sink, and the producer pool. It
//! exposes the whole lifecycle surface (start, pause, resume, stop) and
//! guarantees that a graceful stop flushes every accepted record before the
//! store closes. Shutdown is cooperative: producers are signalled, never
//! killed; missing the deadline is reported, never papered over.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, unbounded};
use tracing::{error, info, warn};
use uuid::Uuid;

use sonde_core::{CsvStore, GeneratorError, RecordSink, SensorKind, SinkError, ValueModel};

use crate::config::FleetConfig;
use crate::control::{ControlHandle, ControlSignal, SimState};
use crate::producer::{ProducerStats, SensorProducer};

/// Errors surfaced by fleet lifecycle operations.
///
/// Per-producer trouble (a flaky sink, exhausted retries) stays in that
/// producer's counters; only systemic conditions show up here.
#[derive(Debug)]
pub enum FleetError {
    /// A sensor's distribution parameters were rejected at construction.
    Generator {
        sensor_id: String,
        source: GeneratorError,
    },
    /// The store could not be opened or closed.
    Sink(SinkError),
    /// Pause or resume after the fleet already stopped.
    Stopped,
    /// Producers that did not acknowledge the stop before the deadline.
    ShutdownTimeout { pending: Vec<String> },
    /// The OS refused to spawn a producer thread.
    Spawn { sensor_id: String, source: String },
}

impl std::fmt::Display for FleetError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Generator { sensor_id, source } => {
                write!(f, "invalid distribution for {}: {}", sensor_id, source)
            }
            Self::Sink(e) => write!(f, "record store error: {}", e),
            Self::Stopped => write!(f, "fleet already stopped"),
            Self::ShutdownTimeout { pending } => write!(
                f,
                "shutdown deadline expired with {} producer(s) still running: {}",
                pending.len(),
                pending.join(", ")
            ),
            Self::Spawn { sensor_id, source } => {
                write!(f, "failed to spawn producer {}: {}", sensor_id, source)
            }
        }
    }
}

impl std::error::Error for FleetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Generator { source, .. } => Some(source),
            Self::Sink(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SinkError> for FleetError {
    fn from(e: SinkError) -> Self {
        Self::Sink(e)
    }
}

/// Final accounting for one producer after a graceful stop.
#[derive(Debug, Clone)]
pub struct ProducerReport {
    pub id: String,
    pub kind: SensorKind,
    pub samples: u64,
    pub append_retries: u64,
    pub append_failures: u64,
}

/// Result of a graceful stop.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub run_id: Uuid,
    pub elapsed: Duration,
    pub producers: Vec<ProducerReport>,
}

impl ShutdownReport {
    pub fn total_samples(&self) -> u64 {
        self.producers.iter().map(|p| p.samples).sum()
    }

    pub fn total_failures(&self) -> u64 {
        self.producers.iter().map(|p| p.append_failures).sum()
    }
}

/// Live status row for one producer.
#[derive(Debug, Clone)]
pub struct ProducerStatus {
    pub id: String,
    pub kind: SensorKind,
    pub state: SimState,
    pub samples: u64,
    pub append_failures: u64,
}

struct Worker {
    id: String,
    kind: SensorKind,
    handle: JoinHandle<()>,
    stats: Arc<ProducerStats>,
}

/// A running simulation: one producer thread per configured sensor, one
/// shared control signal, one shared store.
///
/// A `Fleet` is single-use. It owns its control signal and sink for the
/// whole run; `stop_and_wait` consumes it, so a second stop (or reusing the
/// sink across runs) is unrepresentable.
pub struct Fleet {
    run_id: Uuid,
    control: Arc<ControlSignal>,
    sink: Arc<dyn RecordSink>,
    workers: Vec<Worker>,
    done_rx: Receiver<String>,
    started_at: Instant,
}

impl Fleet {
    /// Opens the raw store and starts every configured sensor.
    pub fn start(config: FleetConfig) -> Result<Self, FleetError> {
        let store = CsvStore::with_capacity(&config.output, config.queue_capacity)?;
        Self::start_with_sink(config, Arc::new(store))
    }

    /// Starts the fleet against a caller-supplied sink.
    ///
    /// The regular entry point is [`Fleet::start`]; this one lets a harness
    /// substitute an instrumented or failing sink.
    pub fn start_with_sink(
        config: FleetConfig,
        sink: Arc<dyn RecordSink>,
    ) -> Result<Self, FleetError> {
        let run_id = Uuid::new_v4();
        let control = Arc::new(ControlSignal::new());
        let (done_tx, done_rx) = unbounded();
        let poll_interval = config.poll_interval();
        let ids = config.sensor_ids();

        // Validate every distribution before any thread spawns, so a bad
        // sensor fails the whole start instead of dying mid-run.
        let mut planned = Vec::with_capacity(config.sensors.len());
        for (sensor, id) in config.sensors.iter().zip(ids) {
            let model =
                ValueModel::new(sensor.spec(), sensor.clamp).map_err(|source| {
                    FleetError::Generator {
                        sensor_id: id.clone(),
                        source,
                    }
                })?;
            planned.push((id, sensor.kind, model, sensor.interval(), sensor.jitter));
        }

        let mut workers = Vec::with_capacity(planned.len());
        for (id, kind, model, interval, jitter) in planned {
            let stats = Arc::new(ProducerStats::default());
            let producer = SensorProducer {
                id: id.clone(),
                kind,
                model,
                interval,
                jitter,
                poll_interval,
                retry: config.retry,
                control: ControlHandle::new(control.clone()),
                sink: sink.clone(),
                stats: stats.clone(),
                done_tx: done_tx.clone(),
            };
            let handle = match producer.spawn() {
                Ok(handle) => handle,
                Err(e) => {
                    // Producers already running must not keep sampling into
                    // a fleet that failed to start.
                    control.stop();
                    return Err(FleetError::Spawn {
                        sensor_id: id,
                        source: e.to_string(),
                    });
                }
            };
            workers.push(Worker {
                id,
                kind,
                handle,
                stats,
            });
        }

        info!(run_id = %run_id, sensors = workers.len(), "fleet started");

        Ok(Self {
            run_id,
            control,
            sink,
            workers,
            done_rx,
            started_at: Instant::now(),
        })
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn state(&self) -> SimState {
        self.control.state()
    }

    /// Suspends sampling fleet-wide. Idempotent while not stopped.
    pub fn pause(&self) -> Result<(), FleetError> {
        self.control.pause().map_err(|_| FleetError::Stopped)?;
        info!(run_id = %self.run_id, "fleet paused");
        Ok(())
    }

    /// Resumes sampling fleet-wide. Idempotent while not stopped.
    pub fn resume(&self) -> Result<(), FleetError> {
        self.control.resume().map_err(|_| FleetError::Stopped)?;
        info!(run_id = %self.run_id, "fleet resumed");
        Ok(())
    }

    /// Live per-producer status, in configuration order.
    pub fn snapshot(&self) -> Vec<ProducerStatus> {
        let state = self.control.state();
        self.workers
            .iter()
            .map(|worker| ProducerStatus {
                id: worker.id.clone(),
                kind: worker.kind,
                state,
                samples: worker.stats.samples.load(Ordering::Relaxed),
                append_failures: worker.stats.append_failures.load(Ordering::Relaxed),
            })
            .collect()
    }

    /// Signals `Stopped` and waits for every producer to acknowledge.
    ///
    /// On success every accepted record is flushed and the store is closed.
    /// On deadline expiry nothing is forced: the stragglers keep their
    /// cooperative shutdown path, the sink stays open for their in-flight
    /// appends, and the error names them.
    pub fn stop_and_wait(self, timeout: Duration) -> Result<ShutdownReport, FleetError> {
        self.control.stop();
        info!(run_id = %self.run_id, "fleet stopping");

        let deadline = Instant::now() + timeout;
        let expected = self.workers.len();
        let mut acknowledged: HashSet<String> = HashSet::with_capacity(expected);
        while acknowledged.len() < expected {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.done_rx.recv_timeout(remaining) {
                Ok(id) => {
                    acknowledged.insert(id);
                }
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if acknowledged.len() < expected {
            let pending: Vec<String> = self
                .workers
                .iter()
                .filter(|w| !acknowledged.contains(&w.id))
                .map(|w| w.id.clone())
                .collect();
            warn!(run_id = %self.run_id, pending = ?pending, "shutdown deadline expired");
            return Err(FleetError::ShutdownTimeout { pending });
        }

        let Self {
            run_id,
            sink,
            workers,
            started_at,
            ..
        } = self;

        let mut producers = Vec::with_capacity(workers.len());
        for worker in workers {
            let Worker {
                id,
                kind,
                handle,
                stats,
            } = worker;
            // Every producer acknowledged, so the join is immediate.
            if handle.join().is_err() {
                error!(producer = %id, "producer thread panicked");
            }
            producers.push(ProducerReport {
                id,
                kind,
                samples: stats.samples.load(Ordering::Relaxed),
                append_retries: stats.append_retries.load(Ordering::Relaxed),
                append_failures: stats.append_failures.load(Ordering::Relaxed),
            });
        }

        sink.close()?;

        let report = ShutdownReport {
            run_id,
            elapsed: started_at.elapsed(),
            producers,
        };
        info!(
            run_id = %run_id,
            samples = report.total_samples(),
            failures = report.total_failures(),
            "fleet stopped"
        );
        Ok(report)
    }

    /// Runs a bounded simulation: start, let it sample for `duration`, then
    /// stop. A timer around [`Fleet::stop_and_wait`], nothing more.
    pub fn run_for(
        config: FleetConfig,
        duration: Duration,
        shutdown_timeout: Duration,
    ) -> Result<ShutdownReport, FleetError> {
        let fleet = Self::start(config)?;
        std::thread::sleep(duration);
        fleet.stop_and_wait(shutdown_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SensorConfig;
    use sonde_core::{DistributionSpec, Reading};
    use std::sync::Mutex;

    struct MemorySink {
        rows: Mutex<Vec<Reading>>,
    }

    impl MemorySink {
        fn new() -> Self {
            Self {
                rows: Mutex::new(Vec::new()),
            }
        }
    }

    impl RecordSink for MemorySink {
        fn append(&self, reading: Reading) -> Result<(), SinkError> {
            self.rows.lock().unwrap().push(reading);
            Ok(())
        }

        fn close(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[test]
    fn test_invalid_distribution_fails_start() {
        let mut config = FleetConfig::default();
        config.sensors[0].distribution = Some(DistributionSpec::Normal {
            mean: 22.0,
            std_dev: -3.0,
        });

        let result = Fleet::start_with_sink(config, Arc::new(MemorySink::new()));
        assert!(matches!(
            result,
            Err(FleetError::Generator { ref sensor_id, .. }) if sensor_id == "TEMP-001"
        ));
    }

    #[test]
    fn test_pause_and_resume_are_idempotent_at_the_fleet_level() {
        let mut config = FleetConfig::default();
        for sensor in &mut config.sensors {
            sensor.interval_ms = 50;
        }
        config.poll_interval_ms = 5;

        let fleet = Fleet::start_with_sink(config, Arc::new(MemorySink::new())).unwrap();
        assert_eq!(fleet.state(), SimState::Running);

        fleet.pause().unwrap();
        fleet.pause().unwrap();
        assert_eq!(fleet.state(), SimState::Paused);

        fleet.resume().unwrap();
        fleet.resume().unwrap();
        assert_eq!(fleet.state(), SimState::Running);

        fleet
            .stop_and_wait(Duration::from_secs(2))
            .expect("graceful stop");
    }

    #[test]
    fn test_snapshot_lists_every_producer() {
        let config = FleetConfig {
            poll_interval_ms: 5,
            ..FleetConfig::default()
        };
        let fleet = Fleet::start_with_sink(config, Arc::new(MemorySink::new())).unwrap();

        let rows = fleet.snapshot();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.state == SimState::Running));
        assert_eq!(rows[0].id, "TEMP-001");

        fleet
            .stop_and_wait(Duration::from_secs(2))
            .expect("graceful stop");
    }

    #[test]
    fn test_sensor_config_order_is_preserved() {
        let mut config = FleetConfig::default();
        config.sensors = vec![
            SensorConfig::new(SensorKind::Noise),
            SensorConfig::new(SensorKind::Temperature),
        ];
        config.poll_interval_ms = 5;

        let fleet = Fleet::start_with_sink(config, Arc::new(MemorySink::new())).unwrap();
        let rows = fleet.snapshot();
        assert_eq!(rows[0].id, "NOISE-001");
        assert_eq!(rows[1].id, "TEMP-001");

        fleet
            .stop_and_wait(Duration::from_secs(2))
            .expect("graceful stop");
    }
}
