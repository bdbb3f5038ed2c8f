//! Sensor producer worker.
//!
//! One thread per simulated sensor: check the control signal, sample the
//! value model, stamp and append the reading, then sleep a jittered
//! interval. Sleeps happen in poll-sized slices so a stop lands within one
//! poll interval even mid-interval. A flaky sink degrades this sensor only;
//! the rest of the fleet keeps running.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use crossbeam_channel::Sender;
use rand::distr::Distribution;
use rand_distr::Normal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use sonde_core::{Reading, RecordSink, SensorKind, SinkError, ValueModel};

use crate::control::{ControlHandle, SimState};

/// Bounded retry policy for transient append failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 50,
        }
    }
}

impl RetryPolicy {
    /// Exponential backoff before retry `attempt` (0-based).
    fn delay(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms << attempt.min(10))
    }
}

/// How much randomness to fold into the sampling cadence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterKind {
    Uniform,
    Gaussian,
}

/// Jitter applied around the nominal sampling interval so producers never
/// fall into lockstep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JitterSpec {
    pub kind: JitterKind,
    pub amount_ms: u64,
}

impl Default for JitterSpec {
    fn default() -> Self {
        Self {
            kind: JitterKind::Uniform,
            amount_ms: 200,
        }
    }
}

impl JitterSpec {
    pub fn none() -> Self {
        Self {
            kind: JitterKind::Uniform,
            amount_ms: 0,
        }
    }

    /// Signed offset in seconds, always within ±amount.
    fn sample_offset(&self) -> f64 {
        let amount = self.amount_ms as f64 / 1_000.0;
        if amount <= 0.0 {
            return 0.0;
        }
        match self.kind {
            JitterKind::Uniform => (fastrand::f64() * 2.0 - 1.0) * amount,
            JitterKind::Gaussian => {
                // A std of half the range keeps ~95 % of draws inside it;
                // the clamp catches the rest.
                Normal::new(0.0, amount / 2.0)
                    .map(|dist| dist.sample(&mut rand::rng()).clamp(-amount, amount))
                    .unwrap_or(0.0)
            }
        }
    }

    /// Next sleep before sampling again.
    fn next_interval(&self, base: Duration) -> Duration {
        let secs = (base.as_secs_f64() + self.sample_offset()).max(0.0);
        Duration::from_secs_f64(secs)
    }
}

/// Counters exposed per producer.
#[derive(Debug, Default)]
pub struct ProducerStats {
    /// Readings accepted by the sink.
    pub samples: AtomicU64,
    /// Transient append failures that were retried.
    pub append_retries: AtomicU64,
    /// Readings given up on after retries exhausted (or the sink closed).
    pub append_failures: AtomicU64,
}

enum AppendOutcome {
    Written,
    Dropped,
    SinkClosed,
}

/// A single simulated sensor bound to the shared control signal and sink.
pub struct SensorProducer {
    pub(crate) id: String,
    pub(crate) kind: SensorKind,
    pub(crate) model: ValueModel,
    pub(crate) interval: Duration,
    pub(crate) jitter: JitterSpec,
    pub(crate) poll_interval: Duration,
    pub(crate) retry: RetryPolicy,
    pub(crate) control: ControlHandle,
    pub(crate) sink: Arc<dyn RecordSink>,
    pub(crate) stats: Arc<ProducerStats>,
    pub(crate) done_tx: Sender<String>,
}

impl SensorProducer {
    /// Consumes the producer and runs it on a dedicated named thread.
    pub(crate) fn spawn(self) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(format!("sonde-{}", self.id.to_lowercase()))
            .spawn(move || self.run())
    }

    fn run(self) {
        info!(producer = %self.id, kind = %self.kind, "sensor producer started");
        let mut last_stamp = Utc::now();

        loop {
            match self.control.state() {
                SimState::Stopped => break,
                SimState::Paused => {
                    thread::sleep(self.poll_interval);
                    continue;
                }
                SimState::Running => {}
            }

            let value = self.model.sample();
            // Wall clocks can step backwards; a producer's own record
            // sequence must not.
            let mut stamp = Utc::now();
            if stamp < last_stamp {
                stamp = last_stamp;
            }
            last_stamp = stamp;

            let reading = Reading::new(self.id.as_str(), self.kind, value, stamp);
            match self.append_with_retry(reading) {
                AppendOutcome::Written => {
                    self.stats.samples.fetch_add(1, Ordering::Relaxed);
                }
                AppendOutcome::Dropped => {
                    self.stats.append_failures.fetch_add(1, Ordering::Relaxed);
                }
                AppendOutcome::SinkClosed => {
                    self.stats.append_failures.fetch_add(1, Ordering::Relaxed);
                    error!(producer = %self.id, "sink closed while running, producer exiting");
                    break;
                }
            }

            self.idle(self.jitter.next_interval(self.interval));
        }

        // Exactly one completion message per producer.
        let _ = self.done_tx.send(self.id.clone());
        info!(
            producer = %self.id,
            samples = self.stats.samples.load(Ordering::Relaxed),
            failures = self.stats.append_failures.load(Ordering::Relaxed),
            "sensor producer stopped"
        );
    }

    fn append_with_retry(&self, reading: Reading) -> AppendOutcome {
        for attempt in 0..=self.retry.max_retries {
            match self.sink.append(reading.clone()) {
                Ok(()) => return AppendOutcome::Written,
                Err(SinkError::Closed) => return AppendOutcome::SinkClosed,
                Err(err) => {
                    if !err.is_transient() || attempt == self.retry.max_retries {
                        warn!(producer = %self.id, error = %err, "append failed, dropping reading");
                        return AppendOutcome::Dropped;
                    }
                    self.stats.append_retries.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(self.retry.delay(attempt));
                }
            }
        }
        AppendOutcome::Dropped
    }

    /// Sleeps `duration` in poll-sized slices, returning early once the
    /// fleet stops.
    fn idle(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.control.state() == SimState::Stopped {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep((deadline - now).min(self.poll_interval));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlSignal;
    use crossbeam_channel::unbounded;
    use sonde_core::DistributionSpec;
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

    struct FullSink;

    impl RecordSink for FullSink {
        fn append(&self, _reading: Reading) -> Result<(), SinkError> {
            Err(SinkError::Backpressure)
        }

        fn close(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    fn test_producer(
        sink: Arc<dyn RecordSink>,
        control: &Arc<ControlSignal>,
        done_tx: Sender<String>,
        interval: Duration,
        retry: RetryPolicy,
    ) -> SensorProducer {
        let spec = DistributionSpec::default_for(SensorKind::Temperature);
        SensorProducer {
            id: "TEMP-001".to_string(),
            kind: SensorKind::Temperature,
            model: ValueModel::new(spec, None).unwrap(),
            interval,
            jitter: JitterSpec::none(),
            poll_interval: Duration::from_millis(10),
            retry,
            control: ControlHandle::new(control.clone()),
            sink,
            stats: Arc::new(ProducerStats::default()),
            done_tx,
        }
    }

    #[test]
    fn test_stop_is_observed_mid_interval() {
        let control = Arc::new(ControlSignal::new());
        let (done_tx, done_rx) = unbounded();
        let sink = Arc::new(MemorySink::new());

        let producer = test_producer(
            sink.clone(),
            &control,
            done_tx,
            Duration::from_secs(10),
            RetryPolicy::default(),
        );
        let stats = producer.stats.clone();
        let handle = producer.spawn().unwrap();

        // Let the first sample land, then stop while the producer is deep
        // inside its ten-second interval.
        thread::sleep(Duration::from_millis(50));
        control.stop();

        let done = done_rx.recv_timeout(Duration::from_millis(500));
        assert_eq!(done.unwrap(), "TEMP-001");
        handle.join().unwrap();

        assert_eq!(stats.samples.load(Ordering::Relaxed), 1);
        assert_eq!(sink.rows.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_exhausted_retries_keep_the_producer_alive() {
        let control = Arc::new(ControlSignal::new());
        let (done_tx, done_rx) = unbounded();

        let producer = test_producer(
            Arc::new(FullSink),
            &control,
            done_tx,
            Duration::from_millis(5),
            RetryPolicy {
                max_retries: 1,
                base_delay_ms: 1,
            },
        );
        let stats = producer.stats.clone();
        let handle = producer.spawn().unwrap();

        thread::sleep(Duration::from_millis(100));
        control.stop();
        assert!(done_rx.recv_timeout(Duration::from_millis(500)).is_ok());
        handle.join().unwrap();

        assert_eq!(stats.samples.load(Ordering::Relaxed), 0);
        assert!(stats.append_failures.load(Ordering::Relaxed) >= 1);
        assert!(stats.append_retries.load(Ordering::Relaxed) >= 1);
    }

    #[test]
    fn test_paused_producer_does_not_sample() {
        let control = Arc::new(ControlSignal::new());
        control.pause().unwrap();
        let (done_tx, done_rx) = unbounded();
        let sink = Arc::new(MemorySink::new());

        let producer = test_producer(
            sink.clone(),
            &control,
            done_tx,
            Duration::from_millis(5),
            RetryPolicy::default(),
        );
        let stats = producer.stats.clone();
        let handle = producer.spawn().unwrap();

        thread::sleep(Duration::from_millis(150));
        assert_eq!(stats.samples.load(Ordering::Relaxed), 0);
        assert!(sink.rows.lock().unwrap().is_empty());

        control.stop();
        assert!(done_rx.recv_timeout(Duration::from_millis(500)).is_ok());
        handle.join().unwrap();
    }

    #[test]
    fn test_jitter_stays_within_range() {
        let jitter = JitterSpec {
            kind: JitterKind::Uniform,
            amount_ms: 100,
        };
        let base = Duration::from_millis(500);
        // A millisecond of slack on each bound absorbs float rounding in
        // the seconds conversion.
        for _ in 0..1_000 {
            let next = jitter.next_interval(base);
            assert!(next >= Duration::from_millis(399));
            assert!(next <= Duration::from_millis(601));
        }

        let gaussian = JitterSpec {
            kind: JitterKind::Gaussian,
            amount_ms: 100,
        };
        for _ in 0..1_000 {
            let next = gaussian.next_interval(base);
            assert!(next >= Duration::from_millis(399));
            assert!(next <= Duration::from_millis(601));
        }
    }

    #[test]
    fn test_zero_jitter_is_exact() {
        let jitter = JitterSpec::none();
        assert_eq!(
            jitter.next_interval(Duration::from_millis(100)),
            Duration::from_millis(100)
        );
    }
}
