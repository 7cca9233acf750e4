//! Translation of [`SocketConfig`] into json library options.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;
use url::Url;

use super::marshal;
use crate::config::{Query, SocketConfig};

/// Header carrying the configured cookies.
pub const COOKIE_HEADER: &str = "Cookie";

/// Options understood by the json library's connector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JsonOptions {
    /// Share one transport between namespace sockets.
    pub multiplex: bool,
    /// Auth payload sent on connect.
    pub auth: Option<JsonValue>,
    /// Handshake headers; each header may repeat.
    pub extra_headers: BTreeMap<String, Vec<String>>,
    /// Encoded query string.
    pub query: Option<String>,
    /// Allowed transports.
    pub transports: Vec<String>,
    /// Verbose library logging.
    pub debug: bool,
}

impl JsonOptions {
    /// Build options for `url` from an optional neutral configuration.
    #[must_use]
    pub fn from_config(url: &Url, config: Option<&SocketConfig>) -> Self {
        let mut options = Self {
            multiplex: true,
            ..Self::default()
        };

        let Some(config) = config else {
            return options;
        };

        options.auth = config.auth.as_ref().map(marshal::serialize);

        if !config.cookie.is_empty() {
            options
                .extra_headers
                .insert(COOKIE_HEADER.to_string(), config.cookie.clone());
        }
        for (key, value) in &config.extra_headers {
            options
                .extra_headers
                .entry(key.clone())
                .or_default()
                .push(value.clone());
        }

        options.query = config.query.as_ref().map(|query| encode_query(url, query));
        options.transports.clone_from(&config.transports);
        options.debug = config.debug;

        options
    }
}

/// Query string for the connector: a raw string as given, a map appended to
/// the URL's own query.
fn encode_query(url: &Url, query: &Query) -> String {
    match query {
        Query::Text(text) => text.clone(),
        Query::Params(params) => {
            let mut with_params = url.clone();
            {
                let mut pairs = with_params.query_pairs_mut();
                for (key, value) in params {
                    pairs.append_pair(key, value);
                }
            }
            with_params.query().unwrap_or_default().to_string()
        }
    }
}
