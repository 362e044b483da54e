// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! YAML publish settings loader.
//!
//! Every field is optional; missing fields keep their [`PublishSettings`]
//! defaults. Durations are given in milliseconds.
//!
//! # Example YAML
//!
//! ```yaml
//! # publisher.yaml
//! publish:
//!   delay_threshold_ms: 5
//!   count_threshold: 200
//!   byte_threshold: 2000000
//!   timeout_ms: 30000
//!   enable_message_ordering: true
//!   enable_compression: true
//!   compression_bytes_threshold: 1024
//!   flow_control:
//!     max_outstanding_messages: 5000
//!     max_outstanding_bytes: 67108864
//!     limit_exceeded_behavior: BLOCK
//!   retry:
//!     initial_backoff_ms: 50
//!     max_backoff_ms: 10000
//!     multiplier: 2.0
//! ```

use super::{LimitExceededBehavior, PublishSettings};
use crate::error::{Error, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// YAML settings loader.
pub struct SettingsLoader;

/// Root YAML document structure.
#[derive(Debug, Deserialize, Default)]
pub struct YamlSettingsDocument {
    /// Publisher settings section.
    #[serde(default)]
    pub publish: YamlPublishSettings,
}

/// Publisher settings in YAML format.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlPublishSettings {
    pub delay_threshold_ms: Option<u64>,
    pub count_threshold: Option<usize>,
    pub byte_threshold: Option<usize>,
    pub num_workers: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub enable_compression: Option<bool>,
    pub compression_bytes_threshold: Option<usize>,
    pub enable_message_ordering: Option<bool>,
    pub buffered_byte_limit: Option<usize>,
    pub flow_control: Option<YamlFlowControl>,
    pub retry: Option<YamlRetry>,
}

/// Flow control settings in YAML.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlFlowControl {
    pub max_outstanding_messages: Option<i64>,
    pub max_outstanding_bytes: Option<i64>,
    /// IGNORE, BLOCK or SIGNAL_ERROR
    pub limit_exceeded_behavior: Option<String>,
}

/// Retry backoff in YAML.
#[derive(Debug, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct YamlRetry {
    pub initial_backoff_ms: Option<u64>,
    pub max_backoff_ms: Option<u64>,
    pub multiplier: Option<f64>,
    pub max_attempts: Option<u32>,
}

impl SettingsLoader {
    /// Load publish settings from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<PublishSettings> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            Error::SettingsLoad(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::parse_yaml(&content)
    }

    /// Parse YAML content into validated settings.
    pub fn parse_yaml(content: &str) -> Result<PublishSettings> {
        let doc: YamlSettingsDocument = serde_yaml::from_str(content)
            .map_err(|e| Error::SettingsLoad(format!("failed to parse YAML: {}", e)))?;
        let settings = Self::to_settings(&doc.publish)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Overlay a YAML section onto the default settings.
    pub fn to_settings(yaml: &YamlPublishSettings) -> Result<PublishSettings> {
        let mut s = PublishSettings::default();

        if let Some(ms) = yaml.delay_threshold_ms {
            s.delay_threshold = Duration::from_millis(ms);
        }
        if let Some(v) = yaml.count_threshold {
            s.count_threshold = v;
        }
        if let Some(v) = yaml.byte_threshold {
            s.byte_threshold = v;
        }
        if let Some(v) = yaml.num_workers {
            s.num_workers = v;
        }
        if let Some(ms) = yaml.timeout_ms {
            s.timeout = Duration::from_millis(ms);
        }
        if let Some(v) = yaml.enable_compression {
            s.enable_compression = v;
        }
        if let Some(v) = yaml.compression_bytes_threshold {
            s.compression_bytes_threshold = v;
        }
        if let Some(v) = yaml.enable_message_ordering {
            s.enable_message_ordering = v;
        }
        if let Some(v) = yaml.buffered_byte_limit {
            s.buffered_byte_limit = v;
        }

        if let Some(ref fc) = yaml.flow_control {
            if let Some(v) = fc.max_outstanding_messages {
                s.flow_control.max_outstanding_messages = v;
            }
            if let Some(v) = fc.max_outstanding_bytes {
                s.flow_control.max_outstanding_bytes = v;
            }
            if let Some(ref behavior) = fc.limit_exceeded_behavior {
                s.flow_control.limit_exceeded_behavior = parse_behavior(behavior)?;
            }
        }

        if let Some(ref retry) = yaml.retry {
            if let Some(ms) = retry.initial_backoff_ms {
                s.retry.initial_backoff = Duration::from_millis(ms);
            }
            if let Some(ms) = retry.max_backoff_ms {
                s.retry.max_backoff = Duration::from_millis(ms);
            }
            if let Some(v) = retry.multiplier {
                s.retry.multiplier = v;
            }
            if let Some(v) = retry.max_attempts {
                s.retry.max_attempts = v;
            }
        }

        Ok(s)
    }
}

fn parse_behavior(value: &str) -> Result<LimitExceededBehavior> {
    match value.to_uppercase().as_str() {
        "IGNORE" => Ok(LimitExceededBehavior::Ignore),
        "BLOCK" => Ok(LimitExceededBehavior::Block),
        "SIGNAL_ERROR" | "ERROR" => Ok(LimitExceededBehavior::SignalError),
        other => Err(Error::SettingsLoad(format!(
            "invalid limit_exceeded_behavior: {}",
            other
        ))),
    }
}
