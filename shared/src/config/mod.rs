//! Configuration module for promflush.
//!
//! This module contains the remote-write output configuration and its parsing helpers.

mod duration;
pub mod output;

pub use duration::parse_duration;
pub use output::{ConfigError, OutputConfig, DEFAULT_HISTOGRAM_BUCKETS, DEFAULT_WRITE_METRICS};
