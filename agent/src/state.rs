//! Application state module.
//!
//! Defines the shared application state that is passed to route handlers.

use crate::buffer::SampleBuffer;
use std::sync::Arc;

/// Application state shared across all request handlers.
///
/// Ingested samples land in the output's buffer and are picked up by the
/// next flush cycle.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Buffer drained by the flush loop.
    buffer: Arc<SampleBuffer>,
}

impl AppState {
    /// Creates a new application state around the given buffer.
    #[must_use]
    pub fn new(buffer: Arc<SampleBuffer>) -> Self {
        Self { buffer }
    }

    /// Returns a reference to the sample buffer.
    #[must_use]
    pub fn buffer(&self) -> &SampleBuffer {
        self.buffer.as_ref()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Arc::new(SampleBuffer::new()))
    }
}
