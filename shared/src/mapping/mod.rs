//! Mapping strategies translating samples into remote-write series.
//!
//! A strategy decides the series name (`__name__`), the value reported, and
//! how many series one sample turns into. The strategy is selected once from
//! configuration by its identifier.

pub mod sink;

use crate::models::{MetricType, Sample};
use crate::remote::proto::{Label, TimeSeries};
use serde::{Deserialize, Serialize};
use sink::Sink;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use thiserror::Error;

/// Prefix of every series name produced by a mapping.
pub const METRIC_PREFIX: &str = "k6_";

/// Errors produced while mapping a sample.
#[derive(Debug, Error, PartialEq)]
pub enum MappingError {
    /// The sample has no metric name.
    #[error("Sample has an empty metric name")]
    EmptyMetricName,

    /// The sample value is NaN or infinite.
    #[error("Sample of metric '{metric}' has non-finite value {value}")]
    NonFiniteValue {
        /// Metric name.
        metric: String,
        /// Offending value.
        value: f64,
    },

    /// The metric was first seen with a different type.
    #[error("Metric '{metric}' was registered as {registered} but sample is {actual}")]
    TypeMismatch {
        /// Metric name.
        metric: String,
        /// Type the metric was first seen with.
        registered: MetricType,
        /// Type of the offending sample.
        actual: MetricType,
    },

    /// The aggregate for a new metric could not be allocated.
    #[error("Failed to create aggregate for metric '{metric}': {message}")]
    Aggregate {
        /// Metric name.
        metric: String,
        /// Allocation failure.
        message: String,
    },
}

/// Identifier of a mapping strategy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum MappingKind {
    /// Every sample becomes one series carrying the raw sample value.
    Raw,
    /// Samples are aggregated per metric into Prometheus-style series.
    #[default]
    Prometheus,
}

impl MappingKind {
    /// Resolves a strategy from its configuration identifier.
    #[must_use]
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier.trim().to_ascii_lowercase().as_str() {
            "raw" => Some(Self::Raw),
            "prometheus" => Some(Self::Prometheus),
            _ => None,
        }
    }

    /// Returns the configuration identifier of this strategy.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Prometheus => "prometheus",
        }
    }
}

impl TryFrom<String> for MappingKind {
    type Error = String;

    fn try_from(identifier: String) -> Result<Self, Self::Error> {
        Self::from_identifier(&identifier).ok_or_else(|| {
            format!("unknown mapping '{identifier}', expected 'raw' or 'prometheus'")
        })
    }
}

impl std::fmt::Display for MappingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate state of one metric.
#[derive(Debug, Clone)]
struct StoredMetric {
    sink: Sink,
    timestamp: i64,
}

/// Aggregates kept across flush cycles, keyed by metric name.
#[derive(Debug, Clone, Default)]
pub struct MetricsStorage {
    metrics: HashMap<String, StoredMetric>,
}

impl MetricsStorage {
    /// Creates empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of metrics with aggregate state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns true if no metric has been aggregated yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Adds a sample to its metric's sink and returns the updated state.
    ///
    /// The stored timestamp follows the newest sample so consecutive series
    /// of the same metric do not reuse a timestamp.
    fn update(&mut self, sample: &Sample) -> Result<&mut StoredMetric, MappingError> {
        let timestamp = sample.timestamp_millis();
        let stored = match self.metrics.entry(sample.metric.clone()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let sink =
                    Sink::for_type(sample.metric_type).map_err(|e| MappingError::Aggregate {
                        metric: sample.metric.clone(),
                        message: e.to_string(),
                    })?;
                entry.insert(StoredMetric { sink, timestamp })
            }
        };

        if stored.sink.metric_type() != sample.metric_type {
            return Err(MappingError::TypeMismatch {
                metric: sample.metric.clone(),
                registered: stored.sink.metric_type(),
                actual: sample.metric_type,
            });
        }

        stored.sink.add(sample.value);
        stored.timestamp = stored.timestamp.max(timestamp);
        Ok(stored)
    }
}

/// A mapping strategy together with the state it needs.
#[derive(Debug, Clone)]
pub enum Mapping {
    /// See [`MappingKind::Raw`].
    Raw,
    /// See [`MappingKind::Prometheus`].
    Prometheus(MetricsStorage),
}

impl Mapping {
    /// Creates the strategy identified by `kind`.
    #[must_use]
    pub fn new(kind: MappingKind) -> Self {
        match kind {
            MappingKind::Raw => Self::Raw,
            MappingKind::Prometheus => Self::Prometheus(MetricsStorage::new()),
        }
    }

    /// Returns the identifier of this strategy.
    #[must_use]
    pub fn kind(&self) -> MappingKind {
        match self {
            Self::Raw => MappingKind::Raw,
            Self::Prometheus(_) => MappingKind::Prometheus,
        }
    }

    /// Translates a sample and its labels into series.
    ///
    /// Every returned series carries a `__name__` label and a single point.
    ///
    /// # Errors
    ///
    /// Returns an error if the sample has no name, a non-finite value, or a
    /// type that conflicts with earlier samples of the same metric.
    pub fn transform(
        &mut self,
        sample: &Sample,
        labels: &[Label],
    ) -> Result<Vec<TimeSeries>, MappingError> {
        if sample.metric.is_empty() {
            return Err(MappingError::EmptyMetricName);
        }
        if !sample.value.is_finite() {
            return Err(MappingError::NonFiniteValue {
                metric: sample.metric.clone(),
                value: sample.value,
            });
        }

        let base = format!("{METRIC_PREFIX}{}", sample.metric);

        match self {
            Self::Raw => Ok(vec![TimeSeries::with_labels(labels, base)
                .with_point(sample.value, sample.timestamp_millis())]),
            Self::Prometheus(storage) => {
                let stored = storage.update(sample)?;
                let ts = stored.timestamp;
                let series = |suffix: &str, value: f64| {
                    TimeSeries::with_labels(labels, format!("{base}{suffix}")).with_point(value, ts)
                };

                Ok(match &stored.sink {
                    Sink::Counter(sink) => vec![series("_total", sink.sum)],
                    Sink::Gauge(_) => vec![series("", sample.value)],
                    Sink::Rate(sink) => vec![series("_rate", sink.rate())],
                    // Prometheus has no trend type, so key order statistics are reported as gauges.
                    Sink::Trend(sink) => vec![
                        series("_min", sink.min),
                        series("_max", sink.max),
                        series("_avg", sink.avg()),
                        series("_med", sink.percentile(0.5)),
                        series("_p90", sink.percentile(0.9)),
                        series("_p95", sink.percentile(0.95)),
                    ],
                })
            }
        }
    }
}
