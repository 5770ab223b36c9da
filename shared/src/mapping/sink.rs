//! Running aggregates kept per metric name by the Prometheus mapping.

use crate::models::MetricType;
use hdrhistogram::Histogram;

/// Trend values are recorded in microseconds; samples arrive in milliseconds.
const TREND_SCALE: f64 = 1000.0;
const TREND_SIGFIG: u8 = 3;

/// Sum of all observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CounterSink {
    /// Running total.
    pub sum: f64,
}

/// Latest observation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaugeSink {
    /// Most recent value.
    pub value: f64,
}

/// Fraction of non-zero observations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RateSink {
    /// Number of non-zero observations.
    pub trues: u64,
    /// Number of observations.
    pub total: u64,
}

/// Distribution of observations, for order statistics.
///
/// Percentiles come from an auto-resizing HDR histogram with three
/// significant figures, so memory stays bounded however long the run is.
/// Extremes and the mean are tracked exactly.
#[derive(Debug, Clone)]
pub struct TrendSink {
    histogram: Histogram<u64>,
    /// Smallest value seen.
    pub min: f64,
    /// Largest value seen.
    pub max: f64,
    /// Sum of observations.
    pub sum: f64,
}

/// Aggregate state for one metric.
#[derive(Debug, Clone)]
pub enum Sink {
    /// Aggregate of a counter metric.
    Counter(CounterSink),
    /// Aggregate of a gauge metric.
    Gauge(GaugeSink),
    /// Aggregate of a rate metric.
    Rate(RateSink),
    /// Aggregate of a trend metric.
    Trend(TrendSink),
}

impl Sink {
    /// Creates an empty sink for the given metric type.
    ///
    /// # Errors
    ///
    /// Returns an error if the trend histogram cannot be allocated.
    pub fn for_type(metric_type: MetricType) -> Result<Self, hdrhistogram::CreationError> {
        Ok(match metric_type {
            MetricType::Counter => Self::Counter(CounterSink::default()),
            MetricType::Gauge => Self::Gauge(GaugeSink::default()),
            MetricType::Rate => Self::Rate(RateSink::default()),
            MetricType::Trend => Self::Trend(TrendSink::new()?),
        })
    }

    /// Returns the metric type this sink aggregates.
    #[must_use]
    pub fn metric_type(&self) -> MetricType {
        match self {
            Self::Counter(_) => MetricType::Counter,
            Self::Gauge(_) => MetricType::Gauge,
            Self::Rate(_) => MetricType::Rate,
            Self::Trend(_) => MetricType::Trend,
        }
    }

    /// Adds one observation.
    pub fn add(&mut self, value: f64) {
        match self {
            Self::Counter(s) => s.add(value),
            Self::Gauge(s) => s.add(value),
            Self::Rate(s) => s.add(value),
            Self::Trend(s) => s.add(value),
        }
    }
}

impl CounterSink {
    /// Adds one observation.
    pub fn add(&mut self, value: f64) {
        self.sum += value;
    }
}

impl GaugeSink {
    /// Adds one observation.
    pub fn add(&mut self, value: f64) {
        self.value = value;
    }
}

impl RateSink {
    /// Adds one observation.
    pub fn add(&mut self, value: f64) {
        self.total += 1;
        if value != 0.0 {
            self.trues += 1;
        }
    }

    /// Returns the fraction of non-zero observations.
    #[must_use]
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = self.trues as f64 / self.total as f64;
        rate
    }
}

impl TrendSink {
    /// Creates an empty trend aggregate.
    ///
    /// # Errors
    ///
    /// Returns an error if the histogram cannot be allocated.
    pub fn new() -> Result<Self, hdrhistogram::CreationError> {
        Ok(Self {
            histogram: Histogram::new(TREND_SIGFIG)?,
            min: 0.0,
            max: 0.0,
            sum: 0.0,
        })
    }

    /// Adds one observation. Negative values are recorded as zero in the
    /// percentile histogram.
    pub fn add(&mut self, value: f64) {
        if self.histogram.len() == 0 || value < self.min {
            self.min = value;
        }
        if self.histogram.len() == 0 || value > self.max {
            self.max = value;
        }
        self.sum += value;

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let scaled = (value * TREND_SCALE).round().max(0.0) as u64;
        self.histogram.saturating_record(scaled);
    }

    /// Returns the number of observations.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    /// Returns the mean of observations.
    #[must_use]
    pub fn avg(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let avg = self.sum / count as f64;
        avg
    }

    /// Returns the percentile `pct` (0.0 to 1.0).
    ///
    /// The result is within the histogram's precision of the exact order
    /// statistic and always lies between `min` and `max`.
    #[must_use]
    pub fn percentile(&self, pct: f64) -> f64 {
        if self.histogram.len() == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let value = self.histogram.value_at_quantile(pct.clamp(0.0, 1.0)) as f64 / TREND_SCALE;
        value.clamp(self.min, self.max)
    }
}
