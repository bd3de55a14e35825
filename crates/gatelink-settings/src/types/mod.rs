//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may specify any subset of fields; missing fields keep their default.

mod gateway;
mod rest;

pub use gateway::*;
pub use rest::*;

use gatelink_core::logging::LogFormat;
use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "rest": { "retryCount": 3 },
///   "gateway": { "intents": 513 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GatelinkSettings {
    /// Rate-limited request engine settings.
    pub rest: RestSettings,
    /// Control-plane session settings.
    pub gateway: GatewaySettings,
    /// Media-signaling session settings.
    pub media: MediaSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Output format for stderr.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Compact,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let json = r#"{"rest": {"retryCount": 2}, "logging": {"format": "json"}}"#;
        let settings: GatelinkSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.rest.retry_count, 2);
        assert_eq!(settings.rest.connection_timeout_ms, 5000);
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn serializes_camel_case() {
        let value = serde_json::to_value(GatelinkSettings::default()).unwrap();
        assert!(value["rest"]["connectionTimeoutMs"].is_u64());
        assert!(value["gateway"]["settleDelayMs"].is_u64());
        assert!(value["rest"].get("authorization").is_none());
    }
}
