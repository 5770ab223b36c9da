//! Histogram data model.

use serde::{Deserialize, Serialize};

/// A histogram bucket for distribution metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramBucket {
    /// The upper bound of this bucket (inclusive).
    pub upper_bound: f64,
    /// The cumulative count of observations less than or equal to the upper bound.
    pub count: u64,
}

/// Cumulative histogram data.
///
/// The `+Inf` bucket is implicit: its count is `count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramData {
    /// The histogram buckets, ordered by upper bound.
    pub buckets: Vec<HistogramBucket>,
    /// The sum of all observed values.
    pub sum: f64,
    /// The total count of observations.
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> HistogramData {
        HistogramData {
            buckets: vec![
                HistogramBucket {
                    upper_bound: 0.1,
                    count: 10,
                },
                HistogramBucket {
                    upper_bound: 0.5,
                    count: 25,
                },
                HistogramBucket {
                    upper_bound: 1.0,
                    count: 30,
                },
            ],
            sum: 15.5,
            count: 32,
        }
    }

    #[test]
    fn test_histogram_serialization() {
        let json = serde_json::to_string(&data()).unwrap();
        let back: HistogramData = serde_json::from_str(&json).unwrap();
        assert_eq!(back, data());
    }
}
