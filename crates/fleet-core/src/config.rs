//! fleet.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub resolver: ResolverConfig,
    pub retry: RetryConfig,
    pub queue: QueueConfig,
    pub poller: PollerConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Pause between cyclical resolves when nothing triggers one early.
    pub update_interval: String,
    /// Pairs processed concurrently by each pipeline stage.
    pub pipeline_concurrency: usize,
    /// Buffer size of the channels between pipeline stages.
    pub channel_buffer: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            update_interval: "60s".to_string(),
            pipeline_concurrency: 4,
            channel_buffer: 10,
        }
    }
}

impl ResolverConfig {
    pub fn update_interval(&self) -> Duration {
        parse_duration(&self.update_interval).unwrap_or(Duration::from_secs(60))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub attempts: u32,
    pub backoff: String,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: "50ms".to_string(),
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            backoff: parse_duration(&self.backoff).unwrap_or(Duration::from_millis(50)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued rectifications per deployment.
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 10 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    pub interval: String,
    /// Consecutive failed status fetches before a cluster is given up on.
    pub http_failure_limit: u32,
    pub request_timeout: String,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: "500ms".to_string(),
            http_failure_limit: 10,
            request_timeout: "5s".to_string(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        parse_duration(&self.interval).unwrap_or(Duration::from_millis(500))
    }

    pub fn request_timeout(&self) -> Duration {
        parse_duration(&self.request_timeout).unwrap_or(Duration::from_secs(5))
    }
}

impl FleetConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: FleetConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> ConfigResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values that would wedge the reconciler rather than slow it.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue.capacity == 0 {
            return Err(invalid("queue.capacity", "must be at least 1"));
        }
        if self.retry.attempts == 0 {
            return Err(invalid("retry.attempts", "must be at least 1"));
        }
        if self.resolver.pipeline_concurrency == 0 {
            return Err(invalid("resolver.pipeline_concurrency", "must be at least 1"));
        }
        if self.resolver.channel_buffer == 0 {
            return Err(invalid("resolver.channel_buffer", "must be at least 1"));
        }
        if self.poller.http_failure_limit == 0 {
            return Err(invalid("poller.http_failure_limit", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Parse a duration string like "5s", "500ms", "2m", or a bare number of
/// seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| Duration::from_secs(m * 60))
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = FleetConfig::default();
        assert_eq!(config.resolver.update_interval(), Duration::from_secs(60));
        assert_eq!(config.retry.policy().attempts, 3);
        assert_eq!(config.retry.policy().backoff, Duration::from_millis(50));
        assert_eq!(config.queue.capacity, 10);
        assert_eq!(config.poller.interval(), Duration::from_millis(500));
        assert_eq!(config.poller.http_failure_limit, 10);
    }

    #[test]
    fn parse_partial_file_fills_defaults() {
        let toml_str = r#"
[resolver]
update_interval = "2m"

[queue]
capacity = 3
"#;
        let config = FleetConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.resolver.update_interval(), Duration::from_secs(120));
        assert_eq!(config.resolver.pipeline_concurrency, 4);
        assert_eq!(config.queue.capacity, 3);
        assert_eq!(config.poller, PollerConfig::default());
    }

    #[test]
    fn empty_file_is_default() {
        let config = FleetConfig::from_toml_str("").unwrap();
        assert_eq!(config, FleetConfig::default());
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = FleetConfig::from_toml_str("[queue]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "queue.capacity", .. }));
    }

    #[test]
    fn unparsable_duration_falls_back() {
        let config = FleetConfig::from_toml_str("[poller]\ninterval = \"soon\"\n").unwrap();
        assert_eq!(config.poller.interval(), Duration::from_millis(500));
    }

    #[test]
    fn toml_roundtrip() {
        let mut config = FleetConfig::default();
        config.retry.attempts = 5;
        let text = config.to_toml_string().unwrap();
        assert_eq!(FleetConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn from_file_reads_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fleet.toml");
        std::fs::write(&path, "[retry]\nbackoff = \"10ms\"\n").unwrap();
        let config = FleetConfig::from_file(&path).unwrap();
        assert_eq!(config.retry.policy().backoff, Duration::from_millis(10));
    }

    #[test]
    fn from_file_missing_reports_path() {
        let err = FleetConfig::from_file(Path::new("/nonexistent/fleet.toml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/fleet.toml"));
    }

    #[test]
    fn parse_duration_forms() {
        assert_eq!(parse_duration("5s"), Some(Duration::from_secs(5)));
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("10"), Some(Duration::from_secs(10)));
        assert_eq!(parse_duration("ten"), None);
    }

    #[test]
    fn fractional_durations_fall_back_to_section_defaults() {
        assert_eq!(parse_duration("1.5s"), None);
        assert_eq!(parse_duration("0.5m"), None);

        let toml_str = r#"
[resolver]
update_interval = "1.5m"

[retry]
backoff = "1.5s"

[poller]
request_timeout = "2.5s"
"#;
        let config = FleetConfig::from_toml_str(toml_str).unwrap();
        assert_eq!(config.resolver.update_interval(), Duration::from_secs(60));
        assert_eq!(config.retry.policy().backoff, Duration::from_millis(50));
        assert_eq!(config.poller.request_timeout(), Duration::from_secs(5));
    }
}
