//! Client configuration.
//!
//! [`SocketConfig`] is the platform-neutral option bag handed to either
//! adapter. Each platform translates it into its native option shape
//! (`json::options`, `lua::options`); nothing here knows about natives.
//!
//! # File format
//!
//! ```json
//! {
//!   "auth": { "token": "abc" },
//!   "cookie": ["session=xyz; Path=/; Secure"],
//!   "extraHeaders": { "X-Client": "bridge" },
//!   "query": { "room": "lobby" },
//!   "transports": ["websocket"],
//!   "debug": false
//! }
//! ```
//!
//! # Environment Overrides
//!
//! - `SOCKET_BRIDGE_DEBUG` - `1` or `true` forces `debug`
//! - `SOCKET_BRIDGE_TRANSPORTS` - comma-separated list replacing `transports`

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Query string option: either a raw string or a key/value map.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum Query {
    /// Raw query string, with or without a leading `?`.
    Text(String),
    /// Parameters to append.
    Params(BTreeMap<String, String>),
}

/// Options recognized by both platform adapters.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct SocketConfig {
    /// Value attached at connect time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<Value>,
    /// Set-Cookie style cookie strings.
    pub cookie: Vec<String>,
    /// Additional HTTP headers for the handshake.
    pub extra_headers: BTreeMap<String, String>,
    /// Extra query parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
    /// Allowed transports, e.g. `["websocket"]`.
    pub transports: Vec<String>,
    /// Verbose native logging.
    pub debug: bool,
}

impl SocketConfig {
    /// Parse a JSON configuration document.
    pub fn from_json_str(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("Failed to parse socket config")
    }

    /// Load a configuration file and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read socket config {}", path.display()))?;
        let mut config = Self::from_json_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `SOCKET_BRIDGE_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(debug) = std::env::var("SOCKET_BRIDGE_DEBUG") {
            if debug == "1" || debug.eq_ignore_ascii_case("true") {
                self.debug = true;
            }
        }
        if let Ok(transports) = std::env::var("SOCKET_BRIDGE_TRANSPORTS") {
            self.transports = transports
                .split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(ToString::to_string)
                .collect();
        }
    }

    /// Set the connect-time auth value.
    #[must_use]
    pub fn with_auth(mut self, auth: impl Into<Value>) -> Self {
        self.auth = Some(auth.into());
        self
    }

    /// Set the query option.
    #[must_use]
    pub fn with_query(mut self, query: Query) -> Self {
        self.query = Some(query);
        self
    }

    /// Set the allowed transports.
    #[must_use]
    pub fn with_transports<I, S>(mut self, transports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.transports = transports.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_document() {
        let config = SocketConfig::from_json_str(
            r#"{
                "auth": { "token": "abc" },
                "cookie": ["session=xyz"],
                "extraHeaders": { "X-Client": "bridge" },
                "query": { "room": "lobby" },
                "transports": ["websocket"],
                "debug": true
            }"#,
        )
        .unwrap();

        assert_eq!(
            config.auth.as_ref().and_then(|a| a.get("token")),
            Some(&Value::from("abc"))
        );
        assert_eq!(config.cookie, vec!["session=xyz".to_string()]);
        assert_eq!(config.extra_headers.get("X-Client").map(String::as_str), Some("bridge"));
        assert_eq!(
            config.query,
            Some(Query::Params(BTreeMap::from([("room".into(), "lobby".into())])))
        );
        assert_eq!(config.transports, vec!["websocket".to_string()]);
        assert!(config.debug);
    }

    #[test]
    fn test_parse_string_query_and_defaults() {
        let config = SocketConfig::from_json_str(r#"{ "query": "?a=1&b=2" }"#).unwrap();
        assert_eq!(config.query, Some(Query::Text("?a=1&b=2".into())));
        assert!(config.auth.is_none());
        assert!(config.transports.is_empty());
        assert!(!config.debug);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = SocketConfig::from_json_str("not json").unwrap_err();
        assert!(err.to_string().contains("Failed to parse socket config"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "transports": ["polling"] }}"#).unwrap();

        let config = SocketConfig::load(file.path()).unwrap();
        assert!(!config.transports.is_empty());
    }

    #[test]
    fn test_builders() {
        let config = SocketConfig::default()
            .with_auth("token")
            .with_query(Query::Text("x=1".into()))
            .with_transports(["websocket"]);

        assert_eq!(config.auth, Some(Value::from("token")));
        assert_eq!(config.query, Some(Query::Text("x=1".into())));
        assert_eq!(config.transports, vec!["websocket".to_string()]);
    }
}
