//! Data models for samples and histograms.
//!
//! This module contains the structures produced by the test runner and the
//! cumulative histogram representation read at flush time.

pub mod histogram;
pub mod sample;

pub use histogram::{HistogramBucket, HistogramData};
pub use sample::{MetricType, Sample, SampleContainer};
