//! Buffer of sample containers waiting for the next flush cycle.

use parking_lot::Mutex;
use shared::models::SampleContainer;

/// Source of samples for a flush cycle.
pub trait SampleSource: Send + Sync {
    /// Removes and returns every buffered container, oldest first.
    fn drain(&self) -> Vec<SampleContainer>;
}

/// Thread-safe buffer filled by the ingestion surface and drained by the flush loop.
#[derive(Debug, Default)]
pub struct SampleBuffer {
    containers: Mutex<Vec<SampleContainer>>,
}

impl SampleBuffer {
    /// Creates an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends containers to the buffer. Empty containers are ignored.
    pub fn add_samples(&self, containers: impl IntoIterator<Item = SampleContainer>) {
        let mut buffered = self.containers.lock();
        buffered.extend(containers.into_iter().filter(|c| !c.is_empty()));
    }

    /// Returns the number of buffered containers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.containers.lock().len()
    }

    /// Returns true if nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.containers.lock().is_empty()
    }
}

impl SampleSource for SampleBuffer {
    fn drain(&self) -> Vec<SampleContainer> {
        std::mem::take(&mut *self.containers.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{MetricType, Sample};

    fn container(metric: &str) -> SampleContainer {
        SampleContainer::from(Sample::new(metric, MetricType::Counter, 1.0))
    }

    #[test]
    fn test_drain_returns_in_order_and_empties() {
        let buffer = SampleBuffer::new();
        buffer.add_samples([container("a"), container("b")]);
        buffer.add_samples([container("c")]);

        let drained = buffer.drain();
        let names: Vec<&str> = drained
            .iter()
            .map(|c| c.samples()[0].metric.as_str())
            .collect();

        assert_eq!(names, vec!["a", "b", "c"]);
        assert!(buffer.is_empty());
        assert!(buffer.drain().is_empty());
    }

    #[test]
    fn test_empty_containers_ignored() {
        let buffer = SampleBuffer::new();
        buffer.add_samples([SampleContainer::default(), container("a")]);
        assert_eq!(buffer.len(), 1);
    }
}
