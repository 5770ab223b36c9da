//! Sample data model.
//!
//! Defines the `Sample` produced by the test runner for every measurement and the
//! `SampleContainer` that groups samples emitted together.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Type of the metric a sample belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// A value that is summed over time (e.g., number of requests).
    Counter,
    /// A value that only the latest observation matters for (e.g., active users).
    #[default]
    Gauge,
    /// A ratio of non-zero observations to all observations (e.g., failed checks).
    Rate,
    /// A distribution of observations (e.g., request duration).
    Trend,
}

impl std::fmt::Display for MetricType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Gauge => write!(f, "gauge"),
            Self::Rate => write!(f, "rate"),
            Self::Trend => write!(f, "trend"),
        }
    }
}

/// A single measurement emitted by the test runner.
///
/// # Example
///
/// ```
/// use shared::models::{MetricType, Sample};
///
/// let sample = Sample::new("http_req_duration", MetricType::Trend, 12.5)
///     .with_tag("status", "200")
///     .with_tag("method", "GET");
///
/// assert_eq!(sample.tag("status"), Some("200"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Name of the metric (e.g., "`http_req_duration`").
    pub metric: String,

    /// Type of the metric.
    #[serde(default)]
    pub metric_type: MetricType,

    /// Observed value.
    pub value: f64,

    /// Tags attached to this observation.
    #[serde(default)]
    pub tags: HashMap<String, String>,

    /// Time the observation was made.
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    /// Creates a new sample with the current timestamp and no tags.
    #[must_use]
    pub fn new(metric: impl Into<String>, metric_type: MetricType, value: f64) -> Self {
        Self {
            metric: metric.into(),
            metric_type,
            value,
            tags: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    /// Adds a tag to the sample.
    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Sets the timestamp of the sample.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the value of a tag, if present.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    /// Returns the timestamp in milliseconds since the Unix epoch.
    #[must_use]
    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}

/// A group of samples emitted together by the test runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleContainer {
    /// The samples in this container.
    pub samples: Vec<Sample>,
}

impl SampleContainer {
    /// Creates a container holding the given samples.
    #[must_use]
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    /// Returns the samples in this container.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Returns the number of samples in this container.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if this container holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl From<Sample> for SampleContainer {
    fn from(sample: Sample) -> Self {
        Self::new(vec![sample])
    }
}
