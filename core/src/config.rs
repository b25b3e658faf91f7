//! Client configuration.
//!
//! Everything has a default matching the reference engine, so a config is
//! only needed for engines that export different symbol names or expect an
//! empty header table instead of a null pointer.

use serde::{Deserialize, Serialize};

/// Names of the engine's exported entry points.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSymbols {
    pub request: String,
    pub request_async: String,
    pub free: String,
    /// Optional refusal channel for `request_async`. An engine that does not
    /// export it can never reject a submission.
    pub last_error: Option<String>,
}

impl Default for EngineSymbols {
    fn default() -> Self {
        Self {
            request: "httpc".to_string(),
            request_async: "httpc_async".to_string(),
            free: "httpc_free".to_string(),
            last_error: Some("httpc_last_error".to_string()),
        }
    }
}

/// How an empty header mapping is passed to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyHeaders {
    /// A null table pointer.
    #[default]
    Null,
    /// A table with `count = 0` and a null item array.
    EmptyTable,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub symbols: EngineSymbols,
    pub empty_headers: EmptyHeaders,
}

impl ClientConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_engine() {
        let config = ClientConfig::default();
        assert_eq!(config.symbols.request, "httpc");
        assert_eq!(config.symbols.request_async, "httpc_async");
        assert_eq!(config.symbols.free, "httpc_free");
        assert_eq!(config.empty_headers, EmptyHeaders::Null);
    }

    #[test]
    fn empty_json_is_default() {
        assert_eq!(ClientConfig::from_json("{}").unwrap(), ClientConfig::default());
    }

    #[test]
    fn partial_symbols_keep_other_defaults() {
        let config = ClientConfig::from_json(
            r#"{"symbols":{"free":"engine_free"},"empty_headers":"empty_table"}"#,
        )
        .unwrap();
        assert_eq!(config.symbols.request, "httpc");
        assert_eq!(config.symbols.free, "engine_free");
        assert_eq!(config.empty_headers, EmptyHeaders::EmptyTable);
    }

    #[test]
    fn last_error_symbol_can_be_disabled() {
        let config = ClientConfig::from_json(r#"{"symbols":{"last_error":null}}"#).unwrap();
        assert_eq!(config.symbols.last_error, None);
        assert_eq!(config.symbols.request_async, "httpc_async");
        assert_eq!(
            ClientConfig::default().symbols.last_error.as_deref(),
            Some("httpc_last_error")
        );
    }

    #[test]
    fn unknown_empty_headers_mode_is_rejected() {
        assert!(ClientConfig::from_json(r#"{"empty_headers":"zero"}"#).is_err());
    }
}
