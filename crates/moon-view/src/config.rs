//! View engine configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use serde_json::Value;

use crate::error::ConfigError;

/// Timing and sizing knobs shared by the components of one view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Window in which repeated triggers collapse into one.
    #[serde(rename = "debounce_ms", with = "serde_millis")]
    pub debounce: Duration,
    /// Age after which a cached option result is fetched again.
    #[serde(rename = "option_cache_ttl_ms", with = "serde_millis")]
    pub option_cache_ttl: Duration,
    /// Page size used when a list is mounted.
    pub default_page_size: u32,
    /// Auto-refresh interval for list controllers, if any.
    #[serde(rename = "poll_interval_ms", with = "serde_millis_opt")]
    pub poll_interval: Option<Duration>,
    /// Capacity of the notice broadcast channel.
    pub notice_capacity: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(500),
            option_cache_ttl: Duration::from_secs(300),
            default_page_size: 10,
            poll_interval: None,
            notice_capacity: 64,
        }
    }
}

impl ViewConfig {
    /// Parse a configuration object from JSON; missing keys keep their
    /// defaults. Zero sizes are raised to one.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let doc: Value = serde_json::from_str(json)?;
        let kind = match &doc {
            Value::Object(_) => None,
            Value::Null => Some("null"),
            Value::Bool(_) => Some("a boolean"),
            Value::Number(_) => Some("a number"),
            Value::String(_) => Some("a string"),
            Value::Array(_) => Some("an array"),
        };
        if let Some(kind) = kind {
            return Err(ConfigError::NotAnObject(kind));
        }
        let config: Self = serde_json::from_value(doc)?;
        let page_size = config.default_page_size;
        let capacity = config.notice_capacity;
        Ok(config
            .with_default_page_size(page_size)
            .with_notice_capacity(capacity))
    }

    /// Set the debounce window.
    #[must_use]
    pub const fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Set the option cache staleness window.
    #[must_use]
    pub const fn with_option_cache_ttl(mut self, ttl: Duration) -> Self {
        self.option_cache_ttl = ttl;
        self
    }

    /// Set the default page size. Zero is raised to one.
    #[must_use]
    pub fn with_default_page_size(mut self, size: u32) -> Self {
        self.default_page_size = size.max(1);
        self
    }

    /// Enable auto-refresh.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the notice channel capacity.
    #[must_use]
    pub fn with_notice_capacity(mut self, capacity: usize) -> Self {
        self.notice_capacity = capacity.max(1);
        self
    }
}

mod serde_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod serde_millis_opt {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    #[allow(clippy::ref_option)]
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}
