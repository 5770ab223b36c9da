//! Cumulative latency histogram shared between producers and the flush cycle.
//!
//! Observations are keyed by a fixed list of label names (for the latency
//! histogram: `status` and `host`). Counts are kept since construction and are
//! never reset; every snapshot reports totals since start.

use crate::models::{HistogramBucket, HistogramData};
use crate::remote::proto::Label;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use thiserror::Error;

/// Metric whose samples feed the latency histogram.
pub const LATENCY_METRIC: &str = "http_req_duration";

/// Family name of the latency histogram series.
pub const LATENCY_HISTOGRAM_NAME: &str = "k6_nano_duration";

/// Label names of the latency histogram, in observation order.
pub const LATENCY_LABELS: [&str; 2] = ["status", "host"];

/// Errors reported by the histogram aggregator.
#[derive(Debug, Error, PartialEq)]
pub enum HistogramError {
    /// Bucket bounds are not finite or not strictly increasing.
    #[error("Histogram buckets must be finite and strictly increasing")]
    InvalidBuckets,

    /// The number of label values does not match the label names.
    #[error("Expected {expected} label values, got {actual}")]
    LabelCardinality {
        /// Number of label names.
        expected: usize,
        /// Number of values supplied.
        actual: usize,
    },

    /// The observed value is NaN.
    #[error("Cannot observe NaN")]
    NaN,
}

/// Per label combination state.
#[derive(Debug, Clone)]
struct Counts {
    /// Non-cumulative count per bucket; values above the last bound are only in `count`.
    buckets: Vec<u64>,
    sum: f64,
    count: u64,
}

impl Counts {
    fn new(len: usize) -> Self {
        Self {
            buckets: vec![0; len],
            sum: 0.0,
            count: 0,
        }
    }
}

/// Snapshot of one label combination.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSeries {
    /// Labels identifying this combination (empty values omitted).
    pub labels: Vec<Label>,
    /// Cumulative bucket counts, sum and count.
    pub data: HistogramData,
}

/// A thread-safe cumulative histogram keyed by label values.
///
/// # Example
///
/// ```
/// use shared::histogram::HistogramAggregator;
///
/// let hist = HistogramAggregator::new("k6_nano_duration", &["status"], &[1.0, 5.0]).unwrap();
/// hist.observe(&["200"], 3.0).unwrap();
///
/// let snapshot = hist.snapshot();
/// assert_eq!(snapshot[0].data.count, 1);
/// assert_eq!(snapshot[0].data.buckets[1].count, 1);
/// ```
#[derive(Debug)]
pub struct HistogramAggregator {
    name: String,
    label_names: Vec<String>,
    bounds: Vec<f64>,
    series: Mutex<BTreeMap<Vec<String>, Counts>>,
}

impl HistogramAggregator {
    /// Creates a histogram with the given bucket upper bounds.
    ///
    /// A trailing `+Inf` bound is implicit and dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if a bound is not finite or bounds are not strictly increasing.
    pub fn new(
        name: impl Into<String>,
        label_names: &[&str],
        bounds: &[f64],
    ) -> Result<Self, HistogramError> {
        let mut bounds = bounds.to_vec();
        if bounds
            .last()
            .is_some_and(|b| b.is_infinite() && b.is_sign_positive())
        {
            bounds.pop();
        }
        if bounds.iter().any(|b| !b.is_finite()) || bounds.windows(2).any(|w| w[1] <= w[0]) {
            return Err(HistogramError::InvalidBuckets);
        }

        Ok(Self {
            name: name.into(),
            label_names: label_names.iter().map(|n| (*n).to_string()).collect(),
            bounds,
            series: Mutex::new(BTreeMap::new()),
        })
    }

    /// Creates the latency histogram (`k6_nano_duration` by `status` and `host`).
    ///
    /// # Errors
    ///
    /// Returns an error if the bounds are invalid.
    pub fn latency(bounds: &[f64]) -> Result<Self, HistogramError> {
        Self::new(LATENCY_HISTOGRAM_NAME, &LATENCY_LABELS, bounds)
    }

    /// Returns the family name of the histogram.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the finite bucket upper bounds.
    #[must_use]
    pub fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    /// Records one observation for the given label values.
    ///
    /// # Errors
    ///
    /// Returns an error if the number of label values is wrong or the value is NaN.
    pub fn observe(&self, label_values: &[&str], value: f64) -> Result<(), HistogramError> {
        if label_values.len() != self.label_names.len() {
            return Err(HistogramError::LabelCardinality {
                expected: self.label_names.len(),
                actual: label_values.len(),
            });
        }
        if value.is_nan() {
            return Err(HistogramError::NaN);
        }

        let idx = self.bounds.partition_point(|bound| *bound < value);
        let key: Vec<String> = label_values.iter().map(|v| (*v).to_string()).collect();

        let mut series = self.series.lock();
        let counts = series
            .entry(key)
            .or_insert_with(|| Counts::new(self.bounds.len()));
        if let Some(bucket) = counts.buckets.get_mut(idx) {
            *bucket += 1;
        }
        counts.sum += value;
        counts.count += 1;
        Ok(())
    }

    /// Returns the cumulative state of every label combination seen so far.
    ///
    /// Combinations are ordered by label values.
    #[must_use]
    pub fn snapshot(&self) -> Vec<HistogramSeries> {
        let series = self.series.lock();
        series
            .iter()
            .map(|(values, counts)| {
                let labels = self
                    .label_names
                    .iter()
                    .zip(values)
                    .filter(|(_, value)| !value.is_empty())
                    .map(|(name, value)| Label::new(name.as_str(), value.as_str()))
                    .collect();

                let mut cumulative: u64 = 0;
                let buckets = self
                    .bounds
                    .iter()
                    .zip(&counts.buckets)
                    .map(|(bound, count)| {
                        cumulative += *count;
                        HistogramBucket {
                            upper_bound: *bound,
                            count: cumulative,
                        }
                    })
                    .collect();

                HistogramSeries {
                    labels,
                    data: HistogramData {
                        buckets,
                        sum: counts.sum,
                        count: counts.count,
                    },
                }
            })
            .collect()
    }
}
