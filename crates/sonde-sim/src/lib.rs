//! # sonde-sim - Concurrent Sensor Fleet Simulation
//!
//! Emulates a small fleet of physical IoT sensors (temperature, humidity,
//! ambient noise). Each sensor runs on its own thread, samples a
//! statistically shaped value model on a jittered cadence, and appends the
//! reading to one shared, append-only raw record store.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                          Fleet                             │
//! │                                                            │
//! │  ControlSignal (Running / Paused / Stopped, atomic)        │
//! │        │ read every poll interval                          │
//! │        ▼                                                   │
//! │  ┌───────────┐  ┌───────────┐  ┌───────────┐               │
//! │  │ TEMP-001  │  │  HUM-001  │  │ NOISE-001 │   one thread  │
//! │  │ producer  │  │ producer  │  │ producer  │   per sensor  │
//! │  └─────┬─────┘  └─────┬─────┘  └─────┬─────┘               │
//! │        │ append       │ append       │ append              │
//! │        └──────────────┼──────────────┘                     │
//! │                       ▼                                    │
//! │              CsvStore (bounded queue,                      │
//! │              single writer thread)                         │
//! │                       │                                    │
//! │                       ▼                                    │
//! │               data/raw_data.csv                            │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key design points
//!
//! 1. **Cooperative lifecycle** - producers poll the control signal; pause,
//!    resume, and stop take effect within one poll interval, never by
//!    killing a thread.
//! 2. **Single-writer store** - appenders enqueue onto a bounded channel;
//!    one writer thread owns the file, so rows are never torn and each
//!    producer's rows keep their append order.
//! 3. **Failure isolation** - transient append failures are retried with
//!    bounded backoff and then counted; one flaky sensor limps along while
//!    the rest of the fleet keeps writing.
//! 4. **Accounted shutdown** - `stop_and_wait` flushes everything and
//!    returns per-producer counters, or names the producers that missed the
//!    deadline.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sonde_sim::{Fleet, FleetConfig};
//!
//! let config = FleetConfig::default();
//! let report = Fleet::run_for(
//!     config,
//!     Duration::from_secs(30),
//!     Duration::from_secs(5),
//! )?;
//! println!("wrote {} readings", report.total_samples());
//! # Ok::<(), sonde_sim::FleetError>(())
//! ```

// Lifecycle control signal
pub mod control;

// Per-sensor worker threads
pub mod producer;

// Fleet lifecycle owner
pub mod orchestrator;

// Run configuration
pub mod config;

// Re-exports for convenience
pub use config::{ConfigError, FleetConfig, SensorConfig};
pub use control::{ControlHandle, ControlSignal, SimState};
pub use orchestrator::{Fleet, FleetError, ProducerReport, ProducerStatus, ShutdownReport};
pub use producer::{JitterKind, JitterSpec, ProducerStats, RetryPolicy};
