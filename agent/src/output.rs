//! Output lifecycle: construction, periodic flushing and shutdown.

use crate::buffer::{SampleBuffer, SampleSource};
use crate::pipeline::{FlushError, FlushPipeline};
use crate::transport::{HttpRemoteWriteClient, RemoteWriteClient, TransportError};
use shared::config::{ConfigError, OutputConfig};
use shared::histogram::{HistogramAggregator, HistogramError};
use shared::labels::{resolve_host_identity, LabelBuilder};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Errors raised by the output lifecycle.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The latency histogram could not be created.
    #[error(transparent)]
    Histogram(#[from] HistogramError),

    /// The remote-write client could not be created.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// `start` was called twice.
    #[error("Output has already been started")]
    AlreadyStarted,

    /// The flush loop ended with a fatal error.
    #[error(transparent)]
    Flush(#[from] FlushError),

    /// The flush loop task panicked or was aborted.
    #[error("Flush loop task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A remote-write output: buffers samples and flushes them periodically.
#[derive(Debug)]
pub struct Output {
    config: Arc<OutputConfig>,
    buffer: Arc<SampleBuffer>,
    pipeline: Option<FlushPipeline>,
}

impl Output {
    /// Creates an output pushing through `client`.
    ///
    /// Resolves the host identity once; it is reused for the host label and
    /// the latency histogram for the lifetime of the output.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: OutputConfig,
        client: Arc<dyn RemoteWriteClient>,
    ) -> Result<Self, OutputError> {
        config.validate_config()?;

        let config = Arc::new(config);
        let labels = LabelBuilder::new(Arc::clone(&config), resolve_host_identity());
        let buffer = Arc::new(SampleBuffer::new());
        let histogram = Arc::new(HistogramAggregator::latency(&config.histogram_buckets)?);

        let pipeline = FlushPipeline::new(
            Arc::clone(&config),
            labels,
            Arc::clone(&buffer) as Arc<dyn SampleSource>,
            histogram,
            client,
        );

        Ok(Self {
            config,
            buffer,
            pipeline: Some(pipeline),
        })
    }

    /// Creates an output pushing over HTTP to the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the HTTP client
    /// cannot be built.
    pub fn with_http_client(config: OutputConfig) -> Result<Self, OutputError> {
        let client = HttpRemoteWriteClient::new(&config)?;
        Self::new(config, Arc::new(client))
    }

    /// Returns a human readable description of the output.
    #[must_use]
    pub fn description(&self) -> String {
        format!(
            "Prometheus remote write ({}, mapping {})",
            self.config.url, self.config.mapping
        )
    }

    /// Returns the buffer samples should be added to.
    #[must_use]
    pub fn buffer(&self) -> Arc<SampleBuffer> {
        Arc::clone(&self.buffer)
    }

    /// Starts the periodic flush loop on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the output was already started.
    pub fn start(&mut self) -> Result<OutputHandle, OutputError> {
        let pipeline = self.pipeline.take().ok_or(OutputError::AlreadyStarted)?;
        let cancel = CancellationToken::new();

        tracing::info!(
            url = %self.config.url,
            mapping = %self.config.mapping,
            flush_period = ?self.config.flush_period,
            "Starting remote write output"
        );

        let finished = CancellationToken::new();
        let guard = finished.clone().drop_guard();
        let period = self.config.flush_period;
        let loop_cancel = cancel.child_token();

        // The guard also fires when the loop panics.
        let task = tokio::spawn(async move {
            let _guard = guard;
            run_flush_loop(pipeline, period, loop_cancel).await
        });

        Ok(OutputHandle {
            cancel,
            finished,
            task,
        })
    }
}

/// Handle of a running output.
#[derive(Debug)]
pub struct OutputHandle {
    cancel: CancellationToken,
    finished: CancellationToken,
    task: JoinHandle<Result<(), FlushError>>,
}

impl OutputHandle {
    /// Returns true if the flush loop has ended, either by `stop` or by a
    /// fatal error.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Returns a future resolving once the flush loop has ended for any
    /// reason, without consuming the handle.
    #[must_use]
    pub fn finished(&self) -> WaitForCancellationFutureOwned {
        self.finished.clone().cancelled_owned()
    }

    /// Stops the flush loop.
    ///
    /// No further ticks are scheduled. An in-flight cycle is allowed to
    /// finish, then one final cycle flushes whatever is still buffered.
    ///
    /// # Errors
    ///
    /// Returns an error if the loop ended with a fatal error.
    pub async fn stop(self) -> Result<(), OutputError> {
        tracing::debug!("Stopping remote write output");
        self.cancel.cancel();
        self.task.await??;
        tracing::info!("Remote write output stopped");
        Ok(())
    }
}

async fn run_flush_loop(
    mut pipeline: FlushPipeline,
    period: Duration,
    cancel: CancellationToken,
) -> Result<(), FlushError> {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                if let Err(e) = pipeline.flush().await {
                    tracing::error!(error = %e, "Fatal error in flush cycle, stopping output");
                    return Err(e);
                }
            }
        }
    }

    pipeline.flush().await?;
    Ok(())
}
