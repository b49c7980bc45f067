//! Controller configuration.

use crate::{Error, Result, Scope};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::time::Duration;
use tracing::warn;

/// Namespace watched when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Interval between recovery sweeps when none is configured.
pub const DEFAULT_RECOVERY_CHECK_DURATION: Duration = Duration::from_secs(60);

/// Interval used when the configured one is empty, unparsable, or zero.
pub const FALLBACK_RECOVERY_CHECK_DURATION: Duration = Duration::from_secs(1);

/// Default capacity of the controller's error channel.
pub const DEFAULT_ERROR_BUFFER: usize = 16;

/// Default bound on concurrently in-flight recovery requests.
pub const DEFAULT_MAX_CONCURRENT_RECOVERIES: usize = 32;

/// Configuration for a [`ReplicationController`](crate::ReplicationController).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Application name of the replica members to manage.
    pub name: String,

    /// Namespace the members live in.
    pub namespace: String,

    /// Interval between recovery sweeps. Serialized as a human-readable
    /// string; empty, unparsable or zero values fall back like
    /// [`with_recovery_check_duration_str`](Self::with_recovery_check_duration_str).
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration_or_fallback"
    )]
    pub recovery_check_duration: Duration,

    /// Capacity of the merged error channel returned by `start`.
    pub error_buffer: usize,

    /// Upper bound on concurrently in-flight recovery requests.
    pub max_concurrent_recoveries: usize,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            recovery_check_duration: DEFAULT_RECOVERY_CHECK_DURATION,
            error_buffer: DEFAULT_ERROR_BUFFER,
            max_concurrent_recoveries: DEFAULT_MAX_CONCURRENT_RECOVERIES,
        }
    }
}

impl ControllerConfig {
    /// Creates a configuration for members of application `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if !namespace.is_empty() {
            self.namespace = namespace;
        }
        self
    }

    /// Sets the sweep interval. Zero falls back to
    /// [`FALLBACK_RECOVERY_CHECK_DURATION`].
    pub fn with_recovery_check_duration(mut self, duration: Duration) -> Self {
        self.recovery_check_duration = if duration.is_zero() {
            FALLBACK_RECOVERY_CHECK_DURATION
        } else {
            duration
        };
        self
    }

    /// Sets the sweep interval from a human-readable string such as `"1m"`
    /// or `"30s 500ms"`.
    ///
    /// Empty or unparsable input falls back to
    /// [`FALLBACK_RECOVERY_CHECK_DURATION`] rather than failing.
    pub fn with_recovery_check_duration_str(self, duration: &str) -> Self {
        self.with_recovery_check_duration(parse_duration_or_fallback(duration))
    }

    pub fn with_error_buffer(mut self, capacity: usize) -> Self {
        self.error_buffer = capacity;
        self
    }

    pub fn with_max_concurrent_recoveries(mut self, limit: usize) -> Self {
        self.max_concurrent_recoveries = limit;
        self
    }

    /// The watched application/namespace pair.
    pub fn scope(&self) -> Scope {
        Scope::new(&self.name, &self.namespace)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Config("target name must not be empty".to_string()));
        }
        if self.namespace.is_empty() {
            return Err(Error::Config("namespace must not be empty".to_string()));
        }
        if self.recovery_check_duration.is_zero() {
            return Err(Error::Config(
                "recovery check duration must be positive".to_string(),
            ));
        }
        if self.error_buffer == 0 {
            return Err(Error::Config("error buffer must be >= 1".to_string()));
        }
        if self.max_concurrent_recoveries == 0 {
            return Err(Error::Config(
                "max concurrent recoveries must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Parses a human-readable duration, falling back on empty, invalid or
/// zero input.
pub fn parse_duration_or_fallback(input: &str) -> Duration {
    let input = input.trim();
    if input.is_empty() {
        return FALLBACK_RECOVERY_CHECK_DURATION;
    }
    match humantime::parse_duration(input) {
        Ok(duration) if !duration.is_zero() => duration,
        Ok(_) => FALLBACK_RECOVERY_CHECK_DURATION,
        Err(e) => {
            warn!(
                input,
                error = %e,
                fallback = ?FALLBACK_RECOVERY_CHECK_DURATION,
                "invalid recovery check duration, using fallback"
            );
            FALLBACK_RECOVERY_CHECK_DURATION
        }
    }
}

fn serialize_duration<S: Serializer>(
    duration: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*duration))
}

fn deserialize_duration_or_fallback<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Duration, D::Error> {
    let text = String::deserialize(deserializer)?;
    Ok(parse_duration_or_fallback(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults() {
        let config = ControllerConfig::new("vald-agent");

        assert_eq!(config.namespace, "default");
        assert_eq!(config.recovery_check_duration, Duration::from_secs(60));
        assert_eq!(config.error_buffer, 16);
        assert_eq!(config.max_concurrent_recoveries, 32);
        assert!(config.validate().is_ok());
    }

    #[test_case("1m", Duration::from_secs(60); "minutes")]
    #[test_case("30s", Duration::from_secs(30); "seconds")]
    #[test_case("1m 30s", Duration::from_secs(90); "compound")]
    #[test_case("250ms", Duration::from_millis(250); "millis")]
    #[test_case("", FALLBACK_RECOVERY_CHECK_DURATION; "empty")]
    #[test_case("   ", FALLBACK_RECOVERY_CHECK_DURATION; "blank")]
    #[test_case("soon", FALLBACK_RECOVERY_CHECK_DURATION; "garbage")]
    #[test_case("0s", FALLBACK_RECOVERY_CHECK_DURATION; "zero")]
    fn recovery_check_duration_parsing(input: &str, expected: Duration) {
        let config = ControllerConfig::new("vald-agent").with_recovery_check_duration_str(input);
        assert_eq!(config.recovery_check_duration, expected);
    }

    #[test_case("0s", FALLBACK_RECOVERY_CHECK_DURATION; "zero")]
    #[test_case("whenever", FALLBACK_RECOVERY_CHECK_DURATION; "garbage")]
    #[test_case("45s", Duration::from_secs(45); "valid")]
    fn deserialized_interval_falls_back(input: &str, expected: Duration) {
        let config: ControllerConfig = serde_json::from_value(serde_json::json!({
            "name": "vald-agent",
            "recovery_check_duration": input,
        }))
        .unwrap();

        assert_eq!(config.recovery_check_duration, expected);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn interval_serializes_as_text() {
        let value = serde_json::to_value(ControllerConfig::new("vald-agent")).unwrap();
        assert_eq!(value["recovery_check_duration"], "1m");
    }

    #[test]
    fn empty_namespace_keeps_default() {
        let config = ControllerConfig::new("vald-agent").with_namespace("");
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(matches!(
            ControllerConfig::default().validate(),
            Err(Error::Config(_))
        ));
        assert!(
            ControllerConfig::new("vald-agent")
                .with_error_buffer(0)
                .validate()
                .is_err()
        );
        assert!(
            ControllerConfig::new("vald-agent")
                .with_max_concurrent_recoveries(0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn scope_matches_name_and_namespace() {
        let scope = ControllerConfig::new("vald-agent")
            .with_namespace("vald")
            .scope();
        assert_eq!(scope, Scope::new("vald-agent", "vald"));
    }
}
