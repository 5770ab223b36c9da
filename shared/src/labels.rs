//! Conversion of sample tags into remote-write labels.
//!
//! Series names are mapping-dependent, so no `__name__` label is produced here.

use crate::config::OutputConfig;
use crate::remote::proto::Label;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;

/// Label appended with the host identity when enabled.
pub const HOST_LABEL: &str = "host";

const NAME_TAG: &str = "name";
const URL_TAG: &str = "url";

/// Resolves the identity of the machine this process runs on.
///
/// Falls back to a synthetic `host_rnd_<unix millis>` identifier when the OS
/// hostname cannot be read.
#[must_use]
pub fn resolve_host_identity() -> String {
    match hostname::get() {
        Ok(name) if !name.is_empty() => name.to_string_lossy().into_owned(),
        Ok(_) => synthetic_host_identity(),
        Err(e) => {
            tracing::debug!(error = %e, "Failed to query hostname, using synthetic identity");
            synthetic_host_identity()
        }
    }
}

fn synthetic_host_identity() -> String {
    format!("host_rnd_{}", Utc::now().timestamp_millis())
}

/// Builds label sets from sample tags according to the output configuration.
#[derive(Debug, Clone)]
pub struct LabelBuilder {
    config: Arc<OutputConfig>,
    host: String,
}

impl LabelBuilder {
    /// Creates a builder using `host` as the value of the optional host label.
    #[must_use]
    pub fn new(config: Arc<OutputConfig>, host: impl Into<String>) -> Self {
        Self {
            config,
            host: host.into(),
        }
    }

    /// Returns the host identity used for the host label.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Turns a tag set into labels.
    ///
    /// Returns an empty set when tag retention is disabled. Otherwise empty
    /// names or values are skipped, `name` and `url` are skipped unless
    /// retained, and a single `host` label is appended when enabled (it
    /// replaces a `host` tag). The output order follows tag iteration order
    /// and is not stable.
    #[must_use]
    pub fn build(&self, tags: &HashMap<String, String>) -> Vec<Label> {
        if !self.config.keep_tags {
            return Vec::new();
        }

        let host_extra = usize::from(self.config.host_label);
        let mut labels = Vec::with_capacity(tags.len() + host_extra);

        for (name, value) in tags {
            if name.is_empty() || value.is_empty() {
                continue;
            }
            if !self.config.keep_name_tag && name == NAME_TAG {
                continue;
            }
            if !self.config.keep_url_tag && name == URL_TAG {
                continue;
            }
            if self.config.host_label && name == HOST_LABEL {
                continue;
            }
            labels.push(Label::new(name.as_str(), value.as_str()));
        }

        if self.config.host_label {
            labels.push(Label::new(HOST_LABEL, self.host.as_str()));
        }

        labels
    }
}
