//! Native API consumed from the json socket library.
//!
//! The adapter never opens connections itself. It receives a
//! [`JsonConnector`] (the library entry point) and talks to the sockets it
//! hands out through [`JsonSocket`] and [`JsonManager`].
//!
//! # Calling Convention
//!
//! Events carry a list of [`JsonArg`]. An emit that wants an answer appends
//! a [`JsonArg::Ack`]; a delivery whose sender wants an answer ends with one.
//! Listeners are removed by identity (`Arc::ptr_eq`), or all at once per
//! event.

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use url::Url;

use super::options::JsonOptions;
use crate::bridge::AckCandidate;

/// Native listener registered with a [`JsonSocket`].
pub type JsonListener = Arc<dyn Fn(Vec<JsonArg>) + Send + Sync + 'static>;

/// One native event argument.
#[derive(Clone, Debug)]
pub enum JsonArg {
    /// JSON container or primitive.
    Value(JsonValue),
    /// Binary attachment. Not a marshaled value.
    Binary(Vec<u8>),
    /// Acknowledgment handle.
    Ack(JsonAck),
}

impl AckCandidate for JsonArg {
    type Handle = JsonAck;

    fn into_ack(self) -> Result<JsonAck, Self> {
        match self {
            Self::Ack(ack) => Ok(ack),
            other => Err(other),
        }
    }
}

impl From<JsonValue> for JsonArg {
    fn from(value: JsonValue) -> Self {
        Self::Value(value)
    }
}

/// Callable acknowledgment handle of the json library.
#[derive(Clone)]
pub struct JsonAck {
    call: Arc<dyn Fn(Vec<JsonValue>) + Send + Sync + 'static>,
}

impl JsonAck {
    /// Wrap a native ack function.
    pub fn new(call: impl Fn(Vec<JsonValue>) + Send + Sync + 'static) -> Self {
        Self {
            call: Arc::new(call),
        }
    }

    /// Answer with `args`.
    pub fn call(&self, args: Vec<JsonValue>) {
        (self.call)(args);
    }
}

impl fmt::Debug for JsonAck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonAck").finish_non_exhaustive()
    }
}

/// A socket of the json library, bound to one namespace.
pub trait JsonSocket: Send + Sync {
    /// Open the connection.
    fn connect(&self);

    /// Close the connection.
    fn disconnect(&self);

    /// Whether the socket is connected.
    fn connected(&self) -> bool;

    /// Register `listener` for every delivery of `event`.
    fn on(&self, event: &str, listener: JsonListener);

    /// Register `listener` for the next delivery of `event`.
    fn once(&self, event: &str, listener: JsonListener);

    /// Remove one listener by identity. Unknown listeners are ignored.
    fn off_listener(&self, event: &str, listener: &JsonListener);

    /// Remove every listener of `event`.
    fn off(&self, event: &str);

    /// Send `args` for `event`.
    fn emit(&self, event: &str, args: Vec<JsonArg>);

    /// Manager shared by every namespace socket of this connection.
    fn manager(&self) -> Arc<dyn JsonManager>;
}

/// Connection manager; hands out namespace sockets sharing one transport.
pub trait JsonManager: Send + Sync {
    /// Socket for `namespace`, created on first use.
    fn socket(&self, namespace: &str) -> Arc<dyn JsonSocket>;
}

/// Entry point of the json library.
pub trait JsonConnector: Send + Sync {
    /// Create a socket for `url` on the default namespace.
    fn socket(&self, url: &Url, options: &JsonOptions) -> Arc<dyn JsonSocket>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_only_ack_variant_has_ack_shape() {
        assert!(JsonArg::Value(json!(1)).into_ack().is_err());
        assert!(JsonArg::Binary(vec![1, 2]).into_ack().is_err());
        assert!(JsonArg::Ack(JsonAck::new(|_| {})).into_ack().is_ok());
    }

    #[test]
    fn test_ack_call_forwards_args() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let ack = JsonAck::new(move |args| sink.lock().unwrap().extend(args));

        ack.call(vec![json!("done")]);
        assert_eq!(*seen.lock().unwrap(), vec![json!("done")]);
    }
}
