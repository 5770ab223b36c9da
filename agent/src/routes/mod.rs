//! API route definitions.
//!
//! This module organizes all HTTP routes for the promflush agent.

mod health;
mod samples;

pub use health::health_routes;
pub use samples::{samples_routes, SampleIngestRequest, SampleIngestResponse};
