//! Translation of [`SocketConfig`] into lua library options.

use std::collections::BTreeMap;

use url::{form_urlencoded, Url};

use crate::config::{Query, SocketConfig};

/// Cookie handed to the lua library, parsed from a Set-Cookie style string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpCookie {
    /// Cookie name.
    pub name: String,
    /// Cookie value.
    pub value: String,
    /// `Path` attribute, `/` when absent.
    pub path: String,
    /// `Domain` attribute, the URL host when absent.
    pub domain: String,
    /// `Secure` flag.
    pub secure: bool,
    /// Raw `Expires` attribute.
    pub expires: Option<String>,
    /// Raw `Max-Age` attribute.
    pub max_age: Option<String>,
}

impl HttpCookie {
    /// Parse `raw` for a connection to `url`.
    ///
    /// The first segment is the `name=value` pair. Later segments are
    /// attributes; unknown ones and segments without `=` are skipped.
    /// Returns `None` when no name could be read.
    #[must_use]
    pub fn parse(raw: &str, url: &Url) -> Option<Self> {
        let mut cookie = Self {
            name: String::new(),
            value: String::new(),
            path: "/".to_string(),
            domain: url.host_str().unwrap_or_default().to_string(),
            secure: false,
            expires: None,
            max_age: None,
        };

        for (index, segment) in raw.split(';').enumerate() {
            let segment = segment.trim();
            if segment.eq_ignore_ascii_case("secure") {
                cookie.secure = true;
                continue;
            }
            let Some((key, value)) = segment.split_once('=') else {
                continue;
            };
            let (key, value) = (key.trim(), value.trim().to_string());

            if index == 0 {
                cookie.name = key.to_string();
                cookie.value = value;
                continue;
            }
            match key.to_ascii_lowercase().as_str() {
                "path" => cookie.path = value,
                "domain" => cookie.domain = value,
                "expires" => cookie.expires = Some(value),
                "max-age" => cookie.max_age = Some(value),
                _ => {}
            }
        }

        if cookie.name.is_empty() {
            log::debug!("Ignoring cookie without a name: {raw:?}");
            return None;
        }
        Some(cookie)
    }
}

/// Options understood by the lua library's connector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LuaOptions {
    /// Query parameters sent with the handshake.
    pub connect_params: BTreeMap<String, String>,
    /// Verbose library logging.
    pub log: bool,
    /// Cookies sent with the handshake.
    pub cookies: Vec<HttpCookie>,
    /// Use only the websocket transport.
    pub force_websockets: bool,
    /// Use only the long-polling transport.
    pub force_polling: bool,
    /// Handshake headers.
    pub extra_headers: BTreeMap<String, String>,
}

impl LuaOptions {
    /// Build options for `url` from an optional neutral configuration.
    #[must_use]
    pub fn from_config(url: &Url, config: Option<&SocketConfig>) -> Self {
        let mut options = Self {
            connect_params: url.query_pairs().into_owned().collect(),
            ..Self::default()
        };

        let Some(config) = config else {
            return options;
        };

        match &config.query {
            Some(Query::Text(text)) => {
                let text = text.strip_prefix('?').unwrap_or(text);
                options
                    .connect_params
                    .extend(form_urlencoded::parse(text.as_bytes()).into_owned());
            }
            Some(Query::Params(params)) => {
                options
                    .connect_params
                    .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
            None => {}
        }

        options.log = config.debug;
        options.cookies = config
            .cookie
            .iter()
            .filter_map(|raw| HttpCookie::parse(raw, url))
            .collect();

        if let [transport] = config.transports.as_slice() {
            match transport.as_str() {
                "websocket" => options.force_websockets = true,
                "polling" => options.force_polling = true,
                other => log::debug!("Unknown transport '{other}', not forcing one"),
            }
        }

        options.extra_headers.clone_from(&config.extra_headers);
        options
    }
}
