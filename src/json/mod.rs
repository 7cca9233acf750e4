//! json platform adapter.
//!
//! Wraps a native socket whose containers are `serde_json` values and whose
//! listeners are removed by identity.
//!
//! # Usage
//!
//! ```ignore
//! let connector = LoopbackConnector::new();
//! let client = json::io("http://localhost:3000", None, &connector)?;
//!
//! client.on("greeting", Box::new(|args| {
//!     log::info!("greeting: {:?}", args.first());
//! }))?;
//! client.emit("hello", Value::from("world"), None)?;
//! ```

pub mod loopback;
pub mod marshal;
pub mod native;
pub mod options;

use std::fmt;
use std::sync::{Arc, Mutex};

use url::Url;

use crate::bridge;
use crate::client::{Ack, AckCallback, Args, EventCallback, SocketClient, Subscription};
use crate::config::SocketConfig;
use crate::error::{parse_url, require_event, SocketError};
use crate::marshal::Marshal;
use crate::value::Value;

pub use loopback::{LoopbackConnector, LoopbackManager, LoopbackSocket};
pub use marshal::JsonMarshal;
pub use native::{JsonAck, JsonArg, JsonConnector, JsonListener, JsonManager, JsonSocket};
pub use options::JsonOptions;

/// Client facade over a json-platform native socket.
pub struct JsonSocketClient {
    url: Url,
    config: Option<SocketConfig>,
    socket: Arc<dyn JsonSocket>,
}

impl JsonSocketClient {
    /// Create a client for `url` through the library entry point.
    ///
    /// # Errors
    ///
    /// Returns `SocketError::InvalidArgument` for an empty URL and
    /// `SocketError::InvalidUrl` when it does not parse.
    pub fn new(
        url: &str,
        config: Option<SocketConfig>,
        connector: &dyn JsonConnector,
    ) -> Result<Self, SocketError> {
        let url = parse_url(url)?;
        let options = JsonOptions::from_config(&url, config.as_ref());

        if options.debug {
            log::set_max_level(log::LevelFilter::Trace);
        }

        let socket = connector.socket(&url, &options);
        log::debug!("Created json socket for {}", url);
        Ok(Self {
            url,
            config,
            socket,
        })
    }

    /// The native socket handle.
    #[must_use]
    pub fn instance(&self) -> &Arc<dyn JsonSocket> {
        &self.socket
    }

    /// URL the client was created for.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Configuration the client was created with.
    #[must_use]
    pub fn config(&self) -> Option<&SocketConfig> {
        self.config.as_ref()
    }

    fn subscribe(
        &self,
        event: &str,
        callback: EventCallback,
        once: bool,
    ) -> Result<Subscription, SocketError> {
        require_event(event)?;

        let listener = bridge_listener(callback);
        if once {
            self.socket.once(event, Arc::clone(&listener));
        } else {
            self.socket.on(event, Arc::clone(&listener));
        }
        log::debug!("Registered json listener for '{}' (once: {})", event, once);

        let socket = Arc::clone(&self.socket);
        let name = event.to_string();
        Ok(Subscription::new(event, move || {
            socket.off_listener(&name, &listener);
        }))
    }
}

impl fmt::Debug for JsonSocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonSocketClient")
            .field("url", &self.url.as_str())
            .field("connected", &self.socket.connected())
            .finish_non_exhaustive()
    }
}

impl SocketClient for JsonSocketClient {
    fn connected(&self) -> bool {
        self.socket.connected()
    }

    fn connect(&self) {
        if self.connected() {
            return;
        }
        self.socket.connect();
    }

    fn disconnect(&self) {
        self.socket.disconnect();
    }

    fn emit(&self, event: &str, payload: Value, ack: Option<AckCallback>) -> Result<(), SocketError> {
        require_event(event)?;

        let mut args = vec![JsonArg::Value(marshal::serialize(&payload))];
        if let Some(ack) = ack {
            args.push(JsonArg::Ack(ack_handle(ack)));
        }

        log::debug!("Emitting json event '{}' ({} native args)", event, args.len());
        self.socket.emit(event, args);
        Ok(())
    }

    fn on(&self, event: &str, callback: EventCallback) -> Result<Subscription, SocketError> {
        self.subscribe(event, callback, false)
    }

    fn once(&self, event: &str, callback: EventCallback) -> Result<Subscription, SocketError> {
        self.subscribe(event, callback, true)
    }

    fn off(&self, event: &str) {
        self.socket.off(event);
    }

    fn of(&self, namespace: &str) -> Result<Self, SocketError> {
        let socket = self.socket.manager().socket(namespace);
        let client = Self {
            url: self.url.clone(),
            config: self.config.clone(),
            socket,
        };

        // Join only if currently connected, otherwise join on connect.
        if self.socket.connected() {
            client.connect();
        }
        log::debug!(
            "Derived json namespace client '{}' (joined: {})",
            namespace,
            client.connected()
        );
        Ok(client)
    }
}

/// Create a client and connect it immediately.
///
/// # Errors
///
/// Same as [`JsonSocketClient::new`].
pub fn io(
    url: &str,
    config: Option<SocketConfig>,
    connector: &dyn JsonConnector,
) -> Result<JsonSocketClient, SocketError> {
    let client = JsonSocketClient::new(url, config, connector)?;
    client.connect();
    Ok(client)
}

/// Wrap an application callback into a native listener running the bridge.
fn bridge_listener(callback: EventCallback) -> JsonListener {
    Arc::new(move |args: Vec<JsonArg>| {
        let args: Args = bridge::demux(args, deserialize_arg, |handle: JsonAck| {
            Ack::new(move |response: Vec<Value>| {
                handle.call(JsonMarshal.serialize_all(&response));
                Ok(())
            })
        });
        callback(args);
    })
}

fn deserialize_arg(arg: JsonArg) -> Value {
    match arg {
        JsonArg::Value(value) => marshal::deserialize(&value),
        JsonArg::Binary(bytes) => {
            log::trace!("Binary argument ({} bytes) is not a marshaled value", bytes.len());
            Value::Undefined
        }
        JsonArg::Ack(_) => {
            log::trace!("Ack handle outside the last position is not a marshaled value");
            Value::Undefined
        }
    }
}

/// Native ack handle that demarshals the peer's answer into `ack`.
fn ack_handle(ack: AckCallback) -> JsonAck {
    let pending = Mutex::new(Some(ack));
    JsonAck::new(move |response| {
        let ack = pending.lock().expect("Ack callback mutex poisoned").take();
        match ack {
            Some(ack) => ack(JsonMarshal.deserialize_all(&response)),
            None => log::warn!("Acknowledgment answered more than once, ignoring"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_rejects_empty_url() {
        let connector = LoopbackConnector::new();
        let err = JsonSocketClient::new("", None, &connector).unwrap_err();
        assert!(matches!(err, SocketError::InvalidArgument(_)));
        assert!(connector.last_opened().is_none());
    }

    #[test]
    fn test_new_rejects_unparsable_url() {
        let connector = LoopbackConnector::new();
        let err = JsonSocketClient::new("not a url", None, &connector).unwrap_err();
        assert!(matches!(err, SocketError::InvalidUrl(_)));
    }

    #[test]
    fn test_deserialize_arg_gaps_are_undefined() {
        assert_eq!(deserialize_arg(JsonArg::Binary(vec![0xff])), Value::Undefined);
        assert_eq!(
            deserialize_arg(JsonArg::Ack(JsonAck::new(|_| {}))),
            Value::Undefined
        );
        assert_eq!(deserialize_arg(JsonArg::Value(json!(2))), Value::Number(2.0));
    }

    #[test]
    fn test_ack_handle_fires_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let handle = ack_handle(Box::new(move |values| sink.lock().unwrap().push(values)));

        handle.call(vec![json!("first")]);
        handle.call(vec![json!("second")]);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], vec![Value::from("first")]);
    }
}
