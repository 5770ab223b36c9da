//! The flush cycle: drain, aggregate, assemble, encode, push.

use crate::buffer::SampleSource;
use crate::transport::{RemoteWriteClient, TransportError};
use chrono::Utc;
use shared::assembler::SeriesAssembler;
use shared::config::OutputConfig;
use shared::histogram::{HistogramAggregator, LATENCY_METRIC};
use shared::labels::LabelBuilder;
use shared::models::SampleContainer;
use shared::remote::{codec, CodecError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

const STATUS_TAG: &str = "status";

/// Errors that end the flush loop.
#[derive(Debug, Error)]
pub enum FlushError {
    /// The batch could not be serialized; nothing can be sent.
    #[error("Failed to encode remote write batch: {0}")]
    Codec(#[from] CodecError),
}

/// Diagnostics of one flush cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct FlushOutcome {
    /// Number of series in the batch.
    pub series: usize,
    /// Number of samples drained from the buffer.
    pub samples: usize,
    /// Wall time of the cycle.
    pub duration: Duration,
    /// Whether the cycle took longer than the flush period.
    pub overran: bool,
    /// Whether the endpoint accepted the batch.
    pub stored: bool,
}

/// Runs flush cycles against a sample source and a remote-write client.
///
/// Cycles must not overlap; `flush` takes `&mut self` so the owner
/// serializes them.
pub struct FlushPipeline {
    flush_period: Duration,
    source: Arc<dyn SampleSource>,
    histogram: Arc<HistogramAggregator>,
    assembler: SeriesAssembler,
    client: Arc<dyn RemoteWriteClient>,
    shedding: bool,
}

impl std::fmt::Debug for FlushPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushPipeline")
            .field("flush_period", &self.flush_period)
            .field("histogram", &self.histogram.name())
            .field("mapping", &self.assembler.mapping_kind())
            .field("shedding", &self.shedding)
            .finish_non_exhaustive()
    }
}

impl FlushPipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(
        config: Arc<OutputConfig>,
        labels: LabelBuilder,
        source: Arc<dyn SampleSource>,
        histogram: Arc<HistogramAggregator>,
        client: Arc<dyn RemoteWriteClient>,
    ) -> Self {
        Self {
            flush_period: config.flush_period,
            assembler: SeriesAssembler::new(config, labels),
            source,
            histogram,
            client,
            shedding: false,
        }
    }

    /// Returns true if the previous cycle overran the flush period.
    #[must_use]
    pub fn is_shedding(&self) -> bool {
        self.shedding
    }

    /// Runs one flush cycle.
    ///
    /// Transport failures and timeouts are logged and the batch is dropped.
    /// The shedding flag for the next cycle is updated from this cycle's
    /// duration.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch cannot be encoded. The pipeline must not
    /// be used afterwards.
    pub async fn flush(&mut self) -> Result<FlushOutcome, FlushError> {
        let start = Instant::now();

        let containers = self.source.drain();
        let samples = containers.iter().map(SampleContainer::len).sum();
        self.observe_latency(&containers);

        let mut series = self.assembler.assemble(&containers, self.shedding);
        drop(containers);
        series.extend(SeriesAssembler::histogram_series(
            &self.histogram.snapshot(),
            self.histogram.name(),
            Utc::now().timestamp_millis(),
        ));

        let nts = series.len();
        tracing::debug!(nts, samples, "Converted samples to time series in preparation for sending");

        let batch = codec::encode(series)?;
        let stored = match tokio::time::timeout(self.flush_period, self.client.store(batch)).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                log_store_error(nts, &e);
                false
            }
            Err(_) => {
                tracing::error!(
                    nts,
                    timeout_ms = duration_ms(self.flush_period),
                    "Remote write did not complete within the flush period"
                );
                false
            }
        };

        let duration = start.elapsed();
        let overran = duration > self.flush_period;
        if overran {
            tracing::warn!(
                nts,
                duration_ms = duration_ms(duration),
                flush_period_ms = duration_ms(self.flush_period),
                "Remote write took longer than the flush period, some samples may be dropped"
            );
        } else {
            tracing::debug!(nts, duration_ms = duration_ms(duration), "Remote write finished");
        }
        self.shedding = overran;

        Ok(FlushOutcome {
            series: nts,
            samples,
            duration,
            overran,
            stored,
        })
    }

    fn observe_latency(&self, containers: &[SampleContainer]) {
        let host = self.assembler.labels().host();
        for sample in containers.iter().flat_map(SampleContainer::samples) {
            if sample.metric != LATENCY_METRIC {
                continue;
            }
            let status = sample.tag(STATUS_TAG).unwrap_or_default();
            if let Err(e) = self.histogram.observe(&[status, host], sample.value) {
                tracing::warn!(metric = LATENCY_METRIC, error = %e, "Failed to observe latency");
            }
        }
    }
}

fn log_store_error(nts: usize, error: &TransportError) {
    tracing::error!(nts, error = %error, "Failed to store time series");
}

#[allow(clippy::cast_possible_truncation)]
fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::SampleBuffer;
    use crate::transport::RecordingClient;
    use shared::mapping::MappingKind;
    use shared::models::{MetricType, Sample};
    use shared::remote::proto::TimeSeries;

    struct Fixture {
        buffer: Arc<SampleBuffer>,
        client: RecordingClient,
        histogram: Arc<HistogramAggregator>,
        pipeline: FlushPipeline,
    }

    fn fixture(config: OutputConfig, client: RecordingClient) -> Fixture {
        let config = Arc::new(config);
        let labels = LabelBuilder::new(Arc::clone(&config), "loadgen-1");
        let buffer = Arc::new(SampleBuffer::new());
        let histogram = Arc::new(HistogramAggregator::latency(&config.histogram_buckets).unwrap());
        let pipeline = FlushPipeline::new(
            Arc::clone(&config),
            labels,
            Arc::clone(&buffer) as Arc<dyn SampleSource>,
            Arc::clone(&histogram),
            Arc::new(client.clone()),
        );
        Fixture {
            buffer,
            client,
            histogram,
            pipeline,
        }
    }

    fn raw_config() -> OutputConfig {
        OutputConfig {
            mapping: MappingKind::Raw,
            histogram_buckets: vec![1.0, 2.0, 5.0, 10.0],
            ..OutputConfig::default()
        }
    }

    fn latency(value: f64, status: &str) -> Sample {
        Sample::new(LATENCY_METRIC, MetricType::Trend, value).with_tag(STATUS_TAG, status)
    }

    fn decode_last(client: &RecordingClient) -> Vec<TimeSeries> {
        let batches = client.batches();
        let last = batches.last().unwrap();
        codec::decode(last).unwrap().timeseries
    }

    #[tokio::test]
    async fn test_flush_pushes_samples_and_histogram() {
        let mut fx = fixture(raw_config(), RecordingClient::new());
        fx.buffer.add_samples([SampleContainer::new(vec![
            latency(1.5, "200"),
            latency(4.0, "200"),
            latency(12.0, "200"),
        ])]);

        let outcome = fx.pipeline.flush().await.unwrap();

        assert!(outcome.stored);
        assert!(!outcome.overran);
        assert_eq!(outcome.samples, 3);
        // 3 raw series, 4 buckets + Inf + sum + count
        assert_eq!(outcome.series, 3 + 7);

        let series = decode_last(&fx.client);
        assert_eq!(series.len(), 10);
        let inf = series
            .iter()
            .find(|ts| ts.label("le") == Some("+Inf"))
            .unwrap();
        assert_eq!(inf.samples[0].value, 3.0);
        assert_eq!(inf.label("status"), Some("200"));
        assert_eq!(inf.label("host"), Some("loadgen-1"));
        assert!(fx.buffer.is_empty());
    }

    #[tokio::test]
    async fn test_histogram_is_cumulative_across_cycles() {
        let mut fx = fixture(raw_config(), RecordingClient::new());

        fx.buffer.add_samples([SampleContainer::from(latency(1.5, "200"))]);
        fx.pipeline.flush().await.unwrap();
        fx.buffer.add_samples([SampleContainer::from(latency(4.0, "200"))]);
        fx.pipeline.flush().await.unwrap();

        let series = decode_last(&fx.client);
        let count = series
            .iter()
            .find(|ts| ts.name() == Some("k6_nano_duration_count"))
            .unwrap();
        assert_eq!(count.samples[0].value, 2.0);
        assert_eq!(fx.histogram.snapshot()[0].data.count, 2);
    }

    #[tokio::test]
    async fn test_missing_status_observed_without_label() {
        let mut fx = fixture(raw_config(), RecordingClient::new());
        fx.buffer
            .add_samples([SampleContainer::from(Sample::new(LATENCY_METRIC, MetricType::Trend, 3.0))]);

        fx.pipeline.flush().await.unwrap();

        let snapshot = fx.histogram.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot[0].labels.iter().all(|l| l.name != STATUS_TAG));
    }

    #[tokio::test]
    async fn test_empty_cycle_still_pushes() {
        let mut fx = fixture(raw_config(), RecordingClient::new());

        let outcome = fx.pipeline.flush().await.unwrap();

        assert_eq!(outcome.series, 0);
        assert!(outcome.stored);
        assert_eq!(fx.client.batches().len(), 1);
        assert!(decode_last(&fx.client).is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure_drops_batch() {
        let mut fx = fixture(raw_config(), RecordingClient::new().failing(500));
        fx.buffer
            .add_samples([SampleContainer::from(Sample::new("vus", MetricType::Gauge, 1.0))]);

        let outcome = fx.pipeline.flush().await.unwrap();

        assert!(!outcome.stored);
        assert!(fx.buffer.is_empty());
        assert!(!fx.pipeline.is_shedding());
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_bounded_by_flush_period() {
        let config = OutputConfig {
            flush_period: Duration::from_millis(100),
            ..raw_config()
        };
        let mut fx = fixture(config, RecordingClient::new().with_delay(Duration::from_secs(5)));

        let outcome = fx.pipeline.flush().await.unwrap();

        assert!(!outcome.stored);
        assert!(fx.client.batches().is_empty());
        assert!(outcome.duration < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_slow_cycle_sets_shedding_and_fast_cycle_clears_it() {
        let config = OutputConfig {
            flush_period: Duration::from_millis(20),
            ..raw_config()
        };
        let client = RecordingClient::new().with_delay(Duration::from_millis(50));
        let mut fx = fixture(config, client);

        let outcome = fx.pipeline.flush().await.unwrap();
        assert!(outcome.overran);
        assert!(fx.pipeline.is_shedding());

        let config = Arc::new(OutputConfig {
            flush_period: Duration::from_secs(5),
            ..raw_config()
        });
        let mut fast = FlushPipeline::new(
            Arc::clone(&config),
            LabelBuilder::new(Arc::clone(&config), "loadgen-1"),
            Arc::clone(&fx.buffer) as Arc<dyn SampleSource>,
            Arc::clone(&fx.histogram),
            Arc::new(RecordingClient::new()),
        );
        fast.shedding = true;
        let outcome = fast.flush().await.unwrap();
        assert!(!outcome.overran);
        assert!(!fast.is_shedding());
    }
}
