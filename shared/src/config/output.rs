//! Remote-write output configuration.
//!
//! The configuration is layered: built-in defaults, then an optional JSON
//! document, then `K6_*` environment variables. It is immutable once the
//! output has been constructed.

use crate::mapping::MappingKind;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use validator::Validate;

/// Metric names forwarded when no explicit list is configured.
pub const DEFAULT_WRITE_METRICS: &[&str] = &[
    "vus",
    "vus_max",
    "iterations",
    "iteration_duration",
    "dropped_iterations",
    "data_sent",
    "data_received",
    "checks",
    "http_reqs",
    "http_req_duration",
    "http_req_blocked",
    "http_req_connecting",
    "http_req_tls_handshaking",
    "http_req_sending",
    "http_req_waiting",
    "http_req_receiving",
    "http_req_failed",
];

/// Latency histogram bucket bounds used when none are configured.
pub const DEFAULT_HISTOGRAM_BUCKETS: &[f64] = &[
    0.5, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 12.0, 15.0, 20.0, 30.0, 40.0, 50.0,
    70.0, 100.0, 500.0, 1000.0,
];

const DEFAULT_URL: &str = "http://localhost:9090/api/v1/write";
const DEFAULT_FLUSH_PERIOD: Duration = Duration::from_secs(1);
const HEADER_ENV_PREFIX: &str = "K6_PROMETHEUS_HEADERS_";

/// Errors that can occur while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The JSON configuration document could not be parsed.
    #[error("Invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// An environment variable holds a value that cannot be parsed.
    #[error("Invalid value for {key}: {message}")]
    InvalidEnv {
        /// The environment variable name.
        key: String,
        /// What went wrong.
        message: String,
    },

    /// The mapping identifier is not known.
    #[error("Unknown mapping '{0}', expected 'raw' or 'prometheus'")]
    UnknownMapping(String),

    /// Histogram buckets are unusable.
    #[error("Invalid histogram buckets: {0}")]
    InvalidBuckets(String),

    /// The flush period is zero.
    #[error("Flush period must be greater than zero")]
    ZeroFlushPeriod,

    /// Field-level validation failed.
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}

/// Configuration of the remote-write output.
///
/// # Example
///
/// ```
/// use shared::config::OutputConfig;
///
/// let config = OutputConfig::from_json(r#"{"keepNameTag": true, "flushPeriod": "5s"}"#).unwrap();
/// assert!(config.keep_name_tag);
/// assert_eq!(config.flush_period.as_secs(), 5);
/// assert!(config.validate_config().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
pub struct OutputConfig {
    /// Remote-write endpoint URL.
    #[validate(url(message = "Remote write URL is not a valid URL"))]
    pub url: String,

    /// Skip TLS certificate verification when pushing.
    pub insecure_skip_tls_verify: bool,

    /// Basic auth user.
    pub user: Option<String>,

    /// Basic auth password.
    pub password: Option<String>,

    /// Extra HTTP headers sent with every push.
    pub headers: HashMap<String, String>,

    /// Period between two flush cycles.
    #[serde(deserialize_with = "super::duration::deserialize")]
    pub flush_period: Duration,

    /// Strategy translating samples into series.
    pub mapping: MappingKind,

    /// Whether sample tags become labels at all.
    pub keep_tags: bool,

    /// Whether the `name` tag is kept.
    pub keep_name_tag: bool,

    /// Whether the `url` tag is kept.
    pub keep_url_tag: bool,

    /// Whether a `host` label with the process host identity is appended.
    pub host_label: bool,

    /// Metric names eligible for forwarding.
    pub write_metrics: HashMap<String, bool>,

    /// Upper bounds of the latency histogram buckets, strictly increasing.
    #[validate(length(min = 1, message = "At least one histogram bucket is required"))]
    pub histogram_buckets: Vec<f64>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            insecure_skip_tls_verify: false,
            user: None,
            password: None,
            headers: HashMap::new(),
            flush_period: DEFAULT_FLUSH_PERIOD,
            mapping: MappingKind::default(),
            keep_tags: true,
            keep_name_tag: false,
            keep_url_tag: true,
            host_label: false,
            write_metrics: DEFAULT_WRITE_METRICS
                .iter()
                .map(|name| ((*name).to_string(), true))
                .collect(),
            histogram_buckets: DEFAULT_HISTOGRAM_BUCKETS.to_vec(),
        }
    }
}

impl OutputConfig {
    /// Loads the configuration from defaults and the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None, std::env::vars())
    }

    /// Loads the configuration from defaults, an optional JSON document and
    /// `K6_*` variables, in that order of precedence.
    ///
    /// # Errors
    ///
    /// Returns an error if the document or a variable cannot be parsed.
    pub fn load<I>(json: Option<&str>, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = match json {
            Some(json) => Self::from_json(json)?,
            None => Self::default(),
        };
        config.apply_env(vars)?;
        Ok(config)
    }

    /// Loads the configuration from a JSON document layered over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_json::from_str(json)?;
        config.finalize();
        Ok(config)
    }

    /// Overrides fields from `K6_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a recognized variable holds an unparsable value.
    pub fn apply_env<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            match key.as_str() {
                "K6_PROMETHEUS_REMOTE_URL" => self.url = value,
                "K6_PROMETHEUS_INSECURE_SKIP_TLS_VERIFY" => {
                    self.insecure_skip_tls_verify = parse_bool(&key, &value)?;
                }
                "K6_PROMETHEUS_USER" => self.user = Some(value),
                "K6_PROMETHEUS_PASSWORD" => self.password = Some(value),
                "K6_PROMETHEUS_FLUSH_PERIOD" => {
                    self.flush_period = super::parse_duration(&value)
                        .map_err(|message| ConfigError::InvalidEnv {
                            key: key.clone(),
                            message,
                        })?;
                }
                "K6_PROMETHEUS_MAPPING" => {
                    self.mapping = MappingKind::from_identifier(&value)
                        .ok_or(ConfigError::UnknownMapping(value))?;
                }
                "K6_KEEP_TAGS" => self.keep_tags = parse_bool(&key, &value)?,
                "K6_KEEP_NAME_TAG" => self.keep_name_tag = parse_bool(&key, &value)?,
                "K6_KEEP_URL_TAG" => self.keep_url_tag = parse_bool(&key, &value)?,
                "K6_PROMETHEUS_HOST_LABEL" => self.host_label = parse_bool(&key, &value)?,
                "K6_PROMETHEUS_WRITE_METRICS" => {
                    self.write_metrics = value
                        .split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(|name| (name.to_string(), true))
                        .collect();
                }
                "K6_PROMETHEUS_HISTOGRAM_BUCKETS" => {
                    self.histogram_buckets = parse_buckets(&value)
                        .map_err(|message| ConfigError::InvalidEnv {
                            key: key.clone(),
                            message,
                        })?;
                }
                _ => {
                    if let Some(header) = key.strip_prefix(HEADER_ENV_PREFIX) {
                        if !header.is_empty() {
                            self.headers.insert(header.to_string(), value);
                        }
                    }
                }
            }
        }
        self.finalize();
        Ok(())
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The URL is malformed
    /// - The flush period is zero
    /// - Histogram buckets are empty, not finite, or not strictly increasing
    pub fn validate_config(&self) -> Result<(), ConfigError> {
        self.validate()?;

        if self.flush_period.is_zero() {
            return Err(ConfigError::ZeroFlushPeriod);
        }

        for bound in &self.histogram_buckets {
            if !bound.is_finite() {
                return Err(ConfigError::InvalidBuckets(format!(
                    "bucket bound {bound} is not finite"
                )));
            }
        }
        for pair in self.histogram_buckets.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ConfigError::InvalidBuckets(
                    "bucket bounds must be strictly increasing".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Returns true if samples of `metric` should be forwarded.
    #[must_use]
    pub fn is_write_metric(&self, metric: &str) -> bool {
        self.write_metrics.get(metric).copied().unwrap_or(false)
    }

    /// Normalizes derived settings.
    ///
    /// A trailing `+Inf` bucket bound is implicit and removed. Listing `host`
    /// among the write metrics also enables the host label.
    fn finalize(&mut self) {
        if self
            .histogram_buckets
            .last()
            .is_some_and(|b| b.is_infinite() && b.is_sign_positive())
        {
            self.histogram_buckets.pop();
        }
        if self.is_write_metric("host") {
            self.host_label = true;
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            key: key.to_string(),
            message: format!("expected a boolean, got '{value}'"),
        }),
    }
}

fn parse_buckets(value: &str) -> Result<Vec<f64>, String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|bound| !bound.is_empty())
        .map(|bound| match bound {
            "+Inf" | "Inf" | "inf" => Ok(f64::INFINITY),
            _ => bound
                .parse::<f64>()
                .map_err(|_| format!("'{bound}' is not a number")),
        })
        .collect()
}
