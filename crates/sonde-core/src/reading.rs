//! Sensor reading types.
//!
//! `Reading` is the primary unit of the simulation: one timestamped, typed
//! measurement produced by a sensor and handed to the raw record store.
//! Struct field order is the persisted column order of the raw CSV, so the
//! serde derive doubles as the wire schema.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The fixed set of simulated sensor kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    Temperature,
    Humidity,
    Noise,
}

impl SensorKind {
    /// Every kind, in fleet order.
    pub const ALL: [SensorKind; 3] = [
        SensorKind::Temperature,
        SensorKind::Humidity,
        SensorKind::Noise,
    ];

    /// Lowercase name as persisted in the `sensor_type` column.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Humidity => "humidity",
            Self::Noise => "noise",
        }
    }

    /// Measurement unit recorded alongside every reading.
    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Humidity => "%",
            Self::Noise => "dB",
        }
    }

    /// Prefix used when auto-assigning sensor ids (`TEMP-001`).
    pub fn id_prefix(&self) -> &'static str {
        match self {
            Self::Temperature => "TEMP",
            Self::Humidity => "HUM",
            Self::Noise => "NOISE",
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One timestamped sensor measurement.
///
/// Immutable after construction; ownership moves into the sink on append
/// and the record is never touched again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    pub sensor_id: String,
    pub sensor_type: SensorKind,
    pub value: f64,
    pub unit: String,
}

impl Reading {
    pub fn new(
        sensor_id: impl Into<String>,
        kind: SensorKind,
        value: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            timestamp,
            sensor_id: sensor_id.into(),
            sensor_type: kind,
            value,
            unit: kind.unit().to_string(),
        }
    }
}
