//! Shared lifecycle control signal.
//!
//! One atomic tri-state observed by every producer. Only the orchestrator
//! mutates it; producers poll a read-only handle on every loop iteration,
//! so a transition takes effect within one poll interval. `Stopped` is
//! terminal: once a producer can observe it, no later transition will ever
//! take the fleet back to `Running` or `Paused`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Fleet-wide lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimState {
    Running,
    Paused,
    Stopped,
}

impl SimState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Paused,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for SimState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writer side of the control signal, owned by the orchestrator.
#[derive(Debug)]
pub struct ControlSignal {
    state: AtomicU8,
}

impl ControlSignal {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(SimState::Running as u8),
        }
    }

    pub fn state(&self) -> SimState {
        SimState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// `Running` -> `Paused`. No-op when already paused; refused once stopped.
    pub(crate) fn pause(&self) -> Result<(), SimState> {
        self.transition(SimState::Paused)
    }

    /// `Paused` -> `Running`. No-op when already running; refused once stopped.
    pub(crate) fn resume(&self) -> Result<(), SimState> {
        self.transition(SimState::Running)
    }

    /// Terminal and idempotent.
    pub(crate) fn stop(&self) {
        self.state.store(SimState::Stopped as u8, Ordering::Release);
    }

    fn transition(&self, target: SimState) -> Result<(), SimState> {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if current == SimState::Stopped as u8 {
                return Err(SimState::Stopped);
            }
            if current == target as u8 {
                return Ok(());
            }
            match self.state.compare_exchange_weak(
                current,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(observed) => current = observed,
            }
        }
    }
}

impl Default for ControlSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view handed to producers.
#[derive(Debug, Clone)]
pub struct ControlHandle {
    inner: Arc<ControlSignal>,
}

impl ControlHandle {
    pub(crate) fn new(inner: Arc<ControlSignal>) -> Self {
        Self { inner }
    }

    pub fn state(&self) -> SimState {
        self.inner.state()
    }
}
