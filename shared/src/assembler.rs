//! Assembly of remote-write series from drained sample containers.

use crate::config::OutputConfig;
use crate::histogram::HistogramSeries;
use crate::labels::LabelBuilder;
use crate::mapping::{Mapping, MappingKind};
use crate::models::SampleContainer;
use crate::remote::proto::TimeSeries;
use std::sync::Arc;

/// Series count above which a shedding cycle stops accumulating.
pub const SHEDDING_HIGH_WATER_MARK: usize = 150_000;

/// Label holding the upper bound of a histogram bucket.
pub const BUCKET_LABEL: &str = "le";

/// Turns samples and histogram snapshots into series.
#[derive(Debug)]
pub struct SeriesAssembler {
    config: Arc<OutputConfig>,
    labels: LabelBuilder,
    mapping: Mapping,
}

impl SeriesAssembler {
    /// Creates an assembler using the mapping selected by the configuration.
    #[must_use]
    pub fn new(config: Arc<OutputConfig>, labels: LabelBuilder) -> Self {
        let mapping = Mapping::new(config.mapping);
        Self {
            config,
            labels,
            mapping,
        }
    }

    /// Returns the active mapping strategy.
    #[must_use]
    pub fn mapping_kind(&self) -> MappingKind {
        self.mapping.kind()
    }

    /// Returns the label builder.
    #[must_use]
    pub fn labels(&self) -> &LabelBuilder {
        &self.labels
    }

    /// Maps every eligible sample of `containers` into series.
    ///
    /// Samples of metrics outside the configured write set are skipped, as
    /// are samples the mapping rejects. Each point lives in its own series.
    ///
    /// When `shedding` is set, assembly stops after the first container that
    /// leaves more than [`SHEDDING_HIGH_WATER_MARK`] series; that container
    /// is kept in full and the remaining ones are discarded.
    pub fn assemble(&mut self, containers: &[SampleContainer], shedding: bool) -> Vec<TimeSeries> {
        let mut series = Vec::new();

        for (idx, container) in containers.iter().enumerate() {
            for sample in container.samples() {
                if !self.config.is_write_metric(&sample.metric) {
                    continue;
                }

                let labels = self.labels.build(&sample.tags);
                match self.mapping.transform(sample, &labels) {
                    Ok(mapped) => {
                        for mut ts in mapped {
                            ts.normalize_labels();
                            if ts.name().is_none() {
                                tracing::warn!(metric = %sample.metric, "Dropping series without a name");
                                continue;
                            }
                            series.push(ts);
                        }
                    }
                    Err(e) => {
                        tracing::error!(metric = %sample.metric, error = %e, "Failed to map sample");
                    }
                }
            }

            if shedding && series.len() > SHEDDING_HIGH_WATER_MARK {
                let dropped: usize = containers[idx + 1..].iter().map(SampleContainer::len).sum();
                tracing::warn!(
                    nts = series.len(),
                    dropped_samples = dropped,
                    "Series limit reached while shedding, dropping remaining samples"
                );
                break;
            }
        }

        series
    }

    /// Expands histogram snapshots into `_bucket`, `_sum` and `_count` series.
    ///
    /// Every series of one label combination carries the same base labels and
    /// a single point at `timestamp`.
    #[must_use]
    pub fn histogram_series(
        snapshot: &[HistogramSeries],
        family: &str,
        timestamp: i64,
    ) -> Vec<TimeSeries> {
        let bucket_name = format!("{family}_bucket");
        let mut series = Vec::new();

        for hist in snapshot {
            for bucket in &hist.data.buckets {
                #[allow(clippy::cast_precision_loss)]
                let count = bucket.count as f64;
                series.push(
                    TimeSeries::with_labels(&hist.labels, bucket_name.as_str())
                        .with_label(BUCKET_LABEL, format_bound(bucket.upper_bound))
                        .with_point(count, timestamp),
                );
            }

            #[allow(clippy::cast_precision_loss)]
            let count = hist.data.count as f64;
            series.push(
                TimeSeries::with_labels(&hist.labels, bucket_name.as_str())
                    .with_label(BUCKET_LABEL, "+Inf")
                    .with_point(count, timestamp),
            );
            series.push(
                TimeSeries::with_labels(&hist.labels, format!("{family}_sum"))
                    .with_point(hist.data.sum, timestamp),
            );
            series.push(
                TimeSeries::with_labels(&hist.labels, format!("{family}_count"))
                    .with_point(count, timestamp),
            );
        }

        for ts in &mut series {
            ts.normalize_labels();
        }
        series
    }
}

fn format_bound(bound: f64) -> String {
    format!("{bound:.6}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::histogram::HistogramAggregator;
    use crate::models::{MetricType, Sample};
    use crate::remote::METRIC_NAME_LABEL;
    use std::collections::HashMap;

    fn assembler(config: OutputConfig) -> SeriesAssembler {
        let config = Arc::new(config);
        let labels = LabelBuilder::new(Arc::clone(&config), "loadgen-1");
        SeriesAssembler::new(config, labels)
    }

    fn raw_config() -> OutputConfig {
        OutputConfig {
            mapping: MappingKind::Raw,
            ..OutputConfig::default()
        }
    }

    fn container(n: usize, metric: &str) -> SampleContainer {
        SampleContainer::new(
            (0..n)
                .map(|i| {
                    #[allow(clippy::cast_precision_loss)]
                    let value = i as f64;
                    Sample::new(metric, MetricType::Gauge, value).with_tag("vu", i.to_string())
                })
                .collect(),
        )
    }

    #[test]
    fn test_eligible_sample_produces_named_series() {
        let mut asm = assembler(raw_config());
        let sample = Sample::new("http_reqs", MetricType::Counter, 1.0).with_tag("status", "200");

        let series = asm.assemble(&[SampleContainer::from(sample)], false);

        assert_eq!(series.len(), 1);
        let ts = &series[0];
        assert_eq!(ts.name(), Some("k6_http_reqs"));
        assert_eq!(ts.label("status"), Some("200"));
        assert_eq!(ts.label("name"), None);
        assert_eq!(ts.label("url"), None);
        assert_eq!(ts.labels.len(), 2);
    }

    #[test]
    fn test_ineligible_metric_skipped() {
        let mut asm = assembler(raw_config());
        let sample = Sample::new("my_custom_metric", MetricType::Gauge, 1.0);

        let series = asm.assemble(&[SampleContainer::from(sample)], false);
        assert!(series.is_empty());
    }

    #[test]
    fn test_mapping_error_skips_only_that_sample() {
        let mut asm = assembler(OutputConfig::default());
        let samples = vec![
            Sample::new("vus", MetricType::Gauge, f64::NAN),
            Sample::new("vus", MetricType::Gauge, 3.0),
        ];

        let series = asm.assemble(&[SampleContainer::new(samples)], false);
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].samples[0].value, 3.0);
    }

    #[test]
    fn test_labels_sorted_and_name_present() {
        let mut asm = assembler(OutputConfig {
            host_label: true,
            ..OutputConfig::default()
        });
        let sample = Sample::new("http_req_duration", MetricType::Trend, 12.0)
            .with_tag("status", "200")
            .with_tag("method", "GET")
            .with_tag(METRIC_NAME_LABEL, "spoofed");

        let series = asm.assemble(&[SampleContainer::from(sample)], false);

        assert_eq!(series.len(), 6);
        for ts in &series {
            let names: Vec<&str> = ts.labels.iter().map(|l| l.name.as_str()).collect();
            let mut sorted = names.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(names, sorted);
            assert!(ts.name().is_some_and(|n| n.starts_with("k6_http_req_duration_")));
            assert_eq!(ts.label("host"), Some("loadgen-1"));
        }
    }

    #[test]
    fn test_no_duplicate_timestamps() {
        let mut asm = assembler(OutputConfig::default());
        let tags: HashMap<String, String> = HashMap::from([("status".into(), "200".into())]);
        let samples = (0..50)
            .map(|_| {
                let mut s = Sample::new("http_reqs", MetricType::Counter, 1.0);
                s.tags.clone_from(&tags);
                s
            })
            .collect();

        let series = asm.assemble(&[SampleContainer::new(samples)], false);

        assert_eq!(series.len(), 50);
        assert!(series.iter().all(|ts| !ts.has_duplicate_timestamps()));
        assert!(series.iter().all(|ts| ts.name().is_some()));
    }

    #[test]
    fn test_shedding_stops_after_crossing_container() {
        let mut asm = assembler(raw_config());
        let containers: Vec<SampleContainer> = (0..4).map(|_| container(60_000, "vus")).collect();

        let series = asm.assemble(&containers, true);

        // 60k, 120k, then 180k crosses the mark and the fourth container is dropped
        assert_eq!(series.len(), 180_000);
    }

    #[test]
    fn test_shedding_exactly_at_mark_continues() {
        let mut asm = assembler(raw_config());
        let containers = vec![
            container(SHEDDING_HIGH_WATER_MARK, "vus"),
            container(10, "vus"),
            container(10, "vus"),
        ];

        let series = asm.assemble(&containers, true);
        assert_eq!(series.len(), SHEDDING_HIGH_WATER_MARK + 10);
    }

    #[test]
    fn test_no_cap_without_shedding() {
        let mut asm = assembler(raw_config());
        let containers: Vec<SampleContainer> = (0..4).map(|_| container(60_000, "vus")).collect();

        let series = asm.assemble(&containers, false);
        assert_eq!(series.len(), 240_000);
    }

    #[test]
    fn test_histogram_series_families() {
        let hist = HistogramAggregator::latency(&[1.0, 2.0, 5.0, 10.0]).unwrap();
        for v in [1.5, 4.0, 12.0] {
            hist.observe(&["200", "loadgen-1"], v).unwrap();
        }

        let series = SeriesAssembler::histogram_series(&hist.snapshot(), hist.name(), 42);
        assert_eq!(series.len(), 4 + 1 + 2);

        let bucket = |le: &str| {
            series
                .iter()
                .find(|ts| ts.name() == Some("k6_nano_duration_bucket") && ts.label("le") == Some(le))
                .map(|ts| ts.samples[0].value)
        };
        assert_eq!(bucket("1.000000"), Some(0.0));
        assert_eq!(bucket("2.000000"), Some(1.0));
        assert_eq!(bucket("5.000000"), Some(2.0));
        assert_eq!(bucket("10.000000"), Some(2.0));
        assert_eq!(bucket("+Inf"), Some(3.0));

        let sum = series
            .iter()
            .find(|ts| ts.name() == Some("k6_nano_duration_sum"))
            .unwrap();
        assert_eq!(sum.samples[0].value, 17.5);
        assert_eq!(sum.label("le"), None);

        let count = series
            .iter()
            .find(|ts| ts.name() == Some("k6_nano_duration_count"))
            .unwrap();
        assert_eq!(count.samples[0].value, 3.0);

        for ts in &series {
            assert_eq!(ts.label("status"), Some("200"));
            assert_eq!(ts.label("host"), Some("loadgen-1"));
            assert_eq!(ts.samples.len(), 1);
            assert_eq!(ts.samples[0].timestamp, 42);
        }
    }

    #[test]
    fn test_histogram_series_empty_snapshot() {
        assert!(SeriesAssembler::histogram_series(&[], "k6_nano_duration", 1).is_empty());
    }
}
