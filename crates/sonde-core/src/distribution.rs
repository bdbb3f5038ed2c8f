//! Statistical value models for synthetic readings.
//!
//! Each sensor kind has a documented default shape: temperature is gaussian
//! around a working point, humidity is a beta concentrating mass in the
//! comfortable band, ambient noise is log-normal with a heavy right tail.
//! A `DistributionSpec` is validated once into a `ValueModel`; sampling
//! after that is pure and side-effect free, safe from any thread without
//! synchronization.

use rand::distr::Distribution;
use rand_distr::{Beta, LogNormal, Normal};
use serde::{Deserialize, Serialize};

use crate::SensorKind;

/// Declarative distribution parameters, as carried in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum DistributionSpec {
    /// Gaussian around a working point.
    Normal { mean: f64, std_dev: f64 },
    /// Beta on `[0, scale]`, concentrating mass near `alpha / (alpha + beta)`.
    Beta { alpha: f64, beta: f64, scale: f64 },
    /// Log-normal with a heavy right tail, parameterized by its median.
    LogNormal { median: f64, spread: f64 },
}

impl DistributionSpec {
    /// The documented default shape for a sensor kind.
    pub fn default_for(kind: SensorKind) -> Self {
        match kind {
            // Indoor working point with occasional excursions in the tails.
            SensorKind::Temperature => Self::Normal {
                mean: 22.0,
                std_dev: 3.0,
            },
            // Mass concentrated in the 60-80 % band, full support on [0, 100].
            SensorKind::Humidity => Self::Beta {
                alpha: 7.0,
                beta: 3.0,
                scale: 100.0,
            },
            // Urban ambient baseline with rare high-amplitude spikes.
            SensorKind::Noise => Self::LogNormal {
                median: 55.0,
                spread: 0.25,
            },
        }
    }

    /// Theoretical mean, used by tests and reporting.
    pub fn mean(&self) -> f64 {
        match *self {
            Self::Normal { mean, .. } => mean,
            Self::Beta { alpha, beta, scale } => scale * alpha / (alpha + beta),
            Self::LogNormal { median, spread } => median * (spread * spread / 2.0).exp(),
        }
    }
}

/// Inclusive physical bounds applied after sampling.
///
/// Disabled by default: distribution tails are valid output and represent
/// sensor excursions. Configure a range only when a deployment needs hard
/// physical limits.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClampRange {
    pub min: f64,
    pub max: f64,
}

impl ClampRange {
    pub fn apply(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }
}

/// Invalid model parameters, rejected before any sampling happens.
#[derive(Debug, Clone)]
pub enum GeneratorError {
    InvalidDistribution {
        spec: DistributionSpec,
        reason: String,
    },
    InvalidClamp {
        min: f64,
        max: f64,
    },
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidDistribution { spec, reason } => {
                write!(f, "invalid distribution {:?}: {}", spec, reason)
            }
            Self::InvalidClamp { min, max } => {
                write!(f, "invalid clamp range: min {} is not below max {}", min, max)
            }
        }
    }
}

impl std::error::Error for GeneratorError {}

#[derive(Debug, Clone)]
enum Sampler {
    Normal(Normal<f64>),
    Beta { dist: Beta<f64>, scale: f64 },
    LogNormal(LogNormal<f64>),
}

/// A validated sampler for one sensor.
///
/// Construction is the only fallible step; `sample` cannot fail and holds
/// no shared state (the RNG is thread-local per call).
#[derive(Debug, Clone)]
pub struct ValueModel {
    sampler: Sampler,
    clamp: Option<ClampRange>,
}

impl ValueModel {
    pub fn new(spec: DistributionSpec, clamp: Option<ClampRange>) -> Result<Self, GeneratorError> {
        if let Some(range) = clamp {
            if !(range.min < range.max) {
                return Err(GeneratorError::InvalidClamp {
                    min: range.min,
                    max: range.max,
                });
            }
        }

        let sampler = match spec {
            DistributionSpec::Normal { mean, std_dev } => Sampler::Normal(
                Normal::new(mean, std_dev).map_err(|e| GeneratorError::InvalidDistribution {
                    spec,
                    reason: e.to_string(),
                })?,
            ),
            DistributionSpec::Beta { alpha, beta, scale } => {
                if !(scale > 0.0) {
                    return Err(GeneratorError::InvalidDistribution {
                        spec,
                        reason: "scale must be positive".to_string(),
                    });
                }
                Sampler::Beta {
                    dist: Beta::new(alpha, beta).map_err(|e| {
                        GeneratorError::InvalidDistribution {
                            spec,
                            reason: e.to_string(),
                        }
                    })?,
                    scale,
                }
            }
            DistributionSpec::LogNormal { median, spread } => {
                if !(median > 0.0) {
                    return Err(GeneratorError::InvalidDistribution {
                        spec,
                        reason: "median must be positive".to_string(),
                    });
                }
                Sampler::LogNormal(LogNormal::new(median.ln(), spread).map_err(|e| {
                    GeneratorError::InvalidDistribution {
                        spec,
                        reason: e.to_string(),
                    }
                })?)
            }
        };

        Ok(Self { sampler, clamp })
    }

    /// Draws one value. Independent of every other call.
    pub fn sample(&self) -> f64 {
        let mut rng = rand::rng();
        let raw = match &self.sampler {
            Sampler::Normal(dist) => dist.sample(&mut rng),
            Sampler::Beta { dist, scale } => dist.sample(&mut rng) * scale,
            Sampler::LogNormal(dist) => dist.sample(&mut rng),
        };
        match self.clamp {
            Some(range) => range.apply(raw),
            None => raw,
        }
    }
}

/// Samples one value from the documented default shape for `kind`.
pub fn sample(kind: SensorKind) -> f64 {
    // The documented defaults are compile-time constants and always valid.
    ValueModel::new(DistributionSpec::default_for(kind), None)
        .expect("default distribution parameters are valid")
        .sample()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: usize = 10_000;

    fn sample_mean(model: &ValueModel) -> f64 {
        (0..SAMPLES).map(|_| model.sample()).sum::<f64>() / SAMPLES as f64
    }

    #[test]
    fn test_temperature_mean_converges() {
        let spec = DistributionSpec::default_for(SensorKind::Temperature);
        let model = ValueModel::new(spec, None).unwrap();
        let mean = sample_mean(&model);
        assert!(
            (mean - 22.0).abs() < 0.2,
            "temperature mean drifted: {mean}"
        );
    }

    #[test]
    fn test_temperature_tails_are_not_truncated() {
        let spec = DistributionSpec::default_for(SensorKind::Temperature);
        let model = ValueModel::new(spec, None).unwrap();
        let min = (0..SAMPLES)
            .map(|_| model.sample())
            .fold(f64::INFINITY, f64::min);
        // Two standard deviations below the mean shows up reliably at 10k draws.
        assert!(min < 16.0, "suspiciously narrow lower tail: {min}");
    }

    #[test]
    fn test_humidity_concentrates_in_comfort_band() {
        let spec = DistributionSpec::default_for(SensorKind::Humidity);
        let model = ValueModel::new(spec, None).unwrap();

        let values: Vec<f64> = (0..SAMPLES).map(|_| model.sample()).collect();
        let mean = values.iter().sum::<f64>() / SAMPLES as f64;
        assert!((mean - spec.mean()).abs() < 1.5, "humidity mean drifted: {mean}");

        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
        let in_band = values.iter().filter(|v| (40.0..=95.0).contains(*v)).count();
        assert!(in_band as f64 / SAMPLES as f64 > 0.9);
    }

    #[test]
    fn test_noise_has_a_heavy_right_tail() {
        let spec = DistributionSpec::default_for(SensorKind::Noise);
        let model = ValueModel::new(spec, None).unwrap();

        let values: Vec<f64> = (0..SAMPLES).map(|_| model.sample()).collect();
        let mean = values.iter().sum::<f64>() / SAMPLES as f64;
        assert!((mean - spec.mean()).abs() < 1.5, "noise mean drifted: {mean}");

        assert!(values.iter().all(|v| *v > 0.0));
        assert!(values.iter().any(|v| *v > 75.0), "no loudness spikes in 10k draws");
    }

    #[test]
    fn test_clamp_bounds_every_sample() {
        let spec = DistributionSpec::Normal {
            mean: 22.0,
            std_dev: 3.0,
        };
        let clamp = ClampRange {
            min: 21.0,
            max: 23.0,
        };
        let model = ValueModel::new(spec, Some(clamp)).unwrap();
        for _ in 0..1_000 {
            let v = model.sample();
            assert!((21.0..=23.0).contains(&v));
        }
    }

    #[test]
    fn test_invalid_parameters_fail_at_construction() {
        let negative_std = DistributionSpec::Normal {
            mean: 0.0,
            std_dev: -1.0,
        };
        assert!(ValueModel::new(negative_std, None).is_err());

        let bad_beta = DistributionSpec::Beta {
            alpha: 0.0,
            beta: 3.0,
            scale: 100.0,
        };
        assert!(ValueModel::new(bad_beta, None).is_err());

        let bad_median = DistributionSpec::LogNormal {
            median: -5.0,
            spread: 0.25,
        };
        assert!(ValueModel::new(bad_median, None).is_err());

        let inverted_clamp = ClampRange { min: 5.0, max: 1.0 };
        let ok_spec = DistributionSpec::default_for(SensorKind::Temperature);
        assert!(ValueModel::new(ok_spec, Some(inverted_clamp)).is_err());
    }

    #[test]
    fn test_default_sample_helper_covers_every_kind() {
        for kind in SensorKind::ALL {
            let value = sample(kind);
            assert!(value.is_finite());
        }
    }
}
