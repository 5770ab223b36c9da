//! promflush Shared Library
//!
//! This crate contains the building blocks of the remote-write flush
//! pipeline: sample models, label construction, histogram aggregation,
//! mapping strategies, series assembly and the remote-write wire codec.
//!
//! # Modules
//!
//! - [`models`] - Samples, sample containers and histogram data
//! - [`config`] - Output configuration
//! - [`labels`] - Sample tags to remote-write labels
//! - [`histogram`] - Cumulative latency histogram
//! - [`mapping`] - Strategies translating samples into series
//! - [`assembler`] - Series assembly for one flush cycle
//! - [`remote`] - Remote-write protobuf types and snappy codec
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use shared::assembler::SeriesAssembler;
//! use shared::config::OutputConfig;
//! use shared::labels::LabelBuilder;
//! use shared::models::{MetricType, Sample, SampleContainer};
//!
//! let config = Arc::new(OutputConfig::default());
//! let labels = LabelBuilder::new(Arc::clone(&config), "loadgen-1");
//! let mut assembler = SeriesAssembler::new(config, labels);
//!
//! let sample = Sample::new("http_reqs", MetricType::Counter, 1.0).with_tag("status", "200");
//! let series = assembler.assemble(&[SampleContainer::from(sample)], false);
//!
//! assert_eq!(series[0].name(), Some("k6_http_reqs_total"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod assembler;
pub mod config;
pub mod histogram;
pub mod labels;
pub mod mapping;
pub mod models;
pub mod remote;

/// Re-export common dependencies for convenience.
pub use chrono;
pub use serde;
pub use serde_json;
pub use validator;
