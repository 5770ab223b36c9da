//! Prometheus remote-write protocol support.
//!
//! This module provides the protobuf wire types of the remote-write protocol
//! together with the snappy-compressed batch codec.
//!
//! # Example
//!
//! ```
//! use shared::remote::{codec, proto::TimeSeries};
//!
//! let series = TimeSeries::new("k6_vus")
//!     .with_label("scenario", "default")
//!     .with_point(10.0, 1_700_000_000_000);
//!
//! let payload = codec::encode(vec![series]).unwrap();
//! let decoded = codec::decode(&payload).unwrap();
//! assert_eq!(decoded.timeseries.len(), 1);
//! ```

pub mod codec;

pub use codec::CodecError;

/// Label carrying the series name in remote-write payloads.
pub const METRIC_NAME_LABEL: &str = "__name__";

#[allow(clippy::derive_partial_eq_without_eq)]
pub mod proto {
    //! Remote-write protobuf messages (`prometheus.WriteRequest` and friends).
    //!
    //! Only the fields the remote write handler reads are modelled; unknown
    //! fields are skipped on decode.

    use serde::Serialize;

    /// A batch of time series pushed in one request.
    #[derive(Clone, PartialEq, Serialize, ::prost::Message)]
    pub struct WriteRequest {
        /// The series in this batch.
        #[prost(message, repeated, tag = "1")]
        pub timeseries: ::prost::alloc::vec::Vec<TimeSeries>,
    }

    /// A label set together with its timestamped values.
    #[derive(Clone, PartialEq, Serialize, ::prost::Message)]
    pub struct TimeSeries {
        /// Labels identifying the series, including `__name__`.
        #[prost(message, repeated, tag = "1")]
        pub labels: ::prost::alloc::vec::Vec<Label>,
        /// Points of the series, ordered by timestamp.
        #[prost(message, repeated, tag = "2")]
        pub samples: ::prost::alloc::vec::Vec<Sample>,
    }

    /// A single label name/value pair.
    #[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, ::prost::Message)]
    pub struct Label {
        /// Label name.
        #[prost(string, tag = "1")]
        pub name: ::prost::alloc::string::String,
        /// Label value.
        #[prost(string, tag = "2")]
        pub value: ::prost::alloc::string::String,
    }

    /// A single point of a series.
    #[derive(Clone, PartialEq, Serialize, ::prost::Message)]
    pub struct Sample {
        /// Point value.
        #[prost(double, tag = "1")]
        pub value: f64,
        /// Milliseconds since the Unix epoch.
        #[prost(int64, tag = "2")]
        pub timestamp: i64,
    }

    impl Label {
        /// Creates a new label.
        #[must_use]
        pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                value: value.into(),
            }
        }
    }

    impl TimeSeries {
        /// Creates an empty series named `name`.
        #[must_use]
        pub fn new(name: impl Into<String>) -> Self {
            Self {
                labels: vec![Label::new(super::METRIC_NAME_LABEL, name)],
                samples: Vec::new(),
            }
        }

        /// Creates a series from an existing label set plus a name label.
        #[must_use]
        pub fn with_labels(labels: &[Label], name: impl Into<String>) -> Self {
            let mut all = Vec::with_capacity(labels.len() + 1);
            all.extend_from_slice(labels);
            all.push(Label::new(super::METRIC_NAME_LABEL, name));
            Self {
                labels: all,
                samples: Vec::new(),
            }
        }

        /// Adds a label.
        #[must_use]
        pub fn with_label(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
            self.labels.push(Label::new(name, value));
            self
        }

        /// Adds a point.
        #[must_use]
        pub fn with_point(mut self, value: f64, timestamp: i64) -> Self {
            self.samples.push(Sample { value, timestamp });
            self
        }

        /// Returns the value of the `__name__` label, if any.
        #[must_use]
        pub fn name(&self) -> Option<&str> {
            self.label(super::METRIC_NAME_LABEL)
        }

        /// Returns the value of the label called `name`, if any.
        #[must_use]
        pub fn label(&self, name: &str) -> Option<&str> {
            self.labels
                .iter()
                .rev()
                .find(|l| l.name == name)
                .map(|l| l.value.as_str())
        }

        /// Returns true if two points of this series share a timestamp.
        #[must_use]
        pub fn has_duplicate_timestamps(&self) -> bool {
            let mut seen = std::collections::HashSet::with_capacity(self.samples.len());
            self.samples.iter().any(|s| !seen.insert(s.timestamp))
        }

        /// Sorts labels by name and drops repeated names.
        ///
        /// When a name repeats, the label added last wins.
        pub fn normalize_labels(&mut self) {
            self.labels.reverse();
            self.labels.sort_by(|a, b| a.name.cmp(&b.name));
            self.labels.dedup_by(|later, earlier| later.name == earlier.name);
        }
    }
}
