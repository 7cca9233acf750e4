//! Unified client contract shared by every platform adapter.
//!
//! # Architecture
//!
//! ```text
//! SocketClient (trait)
//!     │
//!     ├── JsonSocketClient
//!     │   └── serde_json containers, listener-identity removal
//!     │
//!     └── LuaSocketClient
//!         └── Lua tables in an embedded state, uuid registration ids
//! ```
//!
//! Adapters are picked statically: code that should run on either platform
//! is written generically over `C: SocketClient`.
//!
//! # Usage
//!
//! ```ignore
//! let sub = client.on("chat", Box::new(|args: Args| {
//!     log::info!("chat: {:?}", args.values());
//!     if let Some(ack) = args.into_ack() {
//!         let _ = ack.send(vec![Value::from("received")]);
//!     }
//! }))?;
//!
//! client.emit("chat", Value::from("hello"), Some(Box::new(|reply| {
//!     log::info!("server replied {reply:?}");
//! })))?;
//!
//! sub.unsubscribe();
//! ```

use std::cell::RefCell;
use std::fmt;

use crate::error::SocketError;
use crate::value::Value;

/// Application listener invoked with the demarshaled payload.
pub type EventCallback = Box<dyn Fn(Args) + Send + Sync + 'static>;

/// Application callback invoked once with the peer's acknowledgment payload.
pub type AckCallback = Box<dyn FnOnce(Vec<Value>) + Send + 'static>;

/// Payload delivered to an [`EventCallback`].
///
/// `values` holds every native argument after demarshaling, in order. When
/// the peer asked for an acknowledgment, `ack` carries the reverse closure
/// that was split off the end of the native argument list.
pub struct Args {
    values: Vec<Value>,
    ack: Option<Ack>,
}

impl Args {
    /// Assemble delivered arguments.
    #[must_use]
    pub fn new(values: Vec<Value>, ack: Option<Ack>) -> Self {
        Self { values, ack }
    }

    /// Demarshaled payload values.
    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// First payload value, the common single-payload case.
    #[must_use]
    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    /// Number of payload values (the ack is not counted).
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no payload values were delivered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Whether the peer is waiting for an acknowledgment.
    #[must_use]
    pub fn has_ack(&self) -> bool {
        self.ack.is_some()
    }

    /// Take the acknowledgment, leaving the payload in place.
    pub fn take_ack(&mut self) -> Option<Ack> {
        self.ack.take()
    }

    /// Consume and return only the acknowledgment.
    #[must_use]
    pub fn into_ack(self) -> Option<Ack> {
        self.ack
    }

    /// Split into payload values and acknowledgment.
    #[must_use]
    pub fn into_parts(self) -> (Vec<Value>, Option<Ack>) {
        (self.values, self.ack)
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args")
            .field("values", &self.values)
            .field("has_ack", &self.ack.is_some())
            .finish()
    }
}

/// Reverse closure answering a peer's acknowledgment request.
///
/// Sending marshals the response into the platform's native containers and
/// invokes the native ack handle. An ack can be answered once.
///
/// `Ack` is not `Send`. The lua platform's handles are bound to the thread
/// owning the Lua state, so one type serves both platforms. Answer the ack
/// from inside the listener. A json listener that needs a worker thread
/// computes the response there and answers once the worker returns.
pub struct Ack {
    respond: Box<dyn FnOnce(Vec<Value>) -> Result<(), SocketError>>,
}

impl Ack {
    /// Wrap a native responder.
    pub fn new(respond: impl FnOnce(Vec<Value>) -> Result<(), SocketError> + 'static) -> Self {
        Self {
            respond: Box::new(respond),
        }
    }

    /// Answer the peer with `response`.
    ///
    /// # Errors
    ///
    /// Failures of the native ack handle are returned unchanged.
    pub fn send(self, response: Vec<Value>) -> Result<(), SocketError> {
        (self.respond)(response)
    }
}

impl fmt::Debug for Ack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ack").finish_non_exhaustive()
    }
}

/// Handle returned by `on`/`once` that removes exactly that listener.
///
/// Unsubscribing twice is a no-op, and never touches other listeners of the
/// same event. Dropping the handle leaves the listener registered.
pub struct Subscription {
    event: String,
    remove: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    /// Wrap the native removal for `event`.
    pub fn new(event: impl Into<String>, remove: impl FnOnce() + 'static) -> Self {
        Self {
            event: event.into(),
            remove: RefCell::new(Some(Box::new(remove))),
        }
    }

    /// Event the listener was registered for.
    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Whether `unsubscribe` has not been called yet.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.remove.borrow().is_some()
    }

    /// Remove the listener from the native emitter.
    pub fn unsubscribe(&self) {
        let remove = self.remove.borrow_mut().take();
        if let Some(remove) = remove {
            log::debug!("Unsubscribing listener for '{}'", self.event);
            remove();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("active", &self.is_active())
            .finish()
    }
}

/// Capabilities every socket client exposes, independent of platform.
pub trait SocketClient {
    /// Whether the native socket is currently connected.
    fn connected(&self) -> bool;

    /// Negation of [`connected`](Self::connected).
    fn disconnected(&self) -> bool {
        !self.connected()
    }

    /// Open the native connection. No-op when already connected.
    fn connect(&self);

    /// Close the native connection.
    fn disconnect(&self);

    /// Send `payload` as a single native argument for `event`.
    ///
    /// When `ack` is given, the peer's acknowledgment is demarshaled and
    /// passed to it.
    ///
    /// # Errors
    ///
    /// Returns `SocketError::InvalidArgument` for an empty event name before
    /// anything reaches the native socket.
    fn emit(&self, event: &str, payload: Value, ack: Option<AckCallback>) -> Result<(), SocketError>;

    /// Register `callback` for every delivery of `event`.
    ///
    /// # Errors
    ///
    /// Returns `SocketError::InvalidArgument` for an empty event name.
    fn on(&self, event: &str, callback: EventCallback) -> Result<Subscription, SocketError>;

    /// Register `callback` for the next delivery of `event` only.
    ///
    /// # Errors
    ///
    /// Returns `SocketError::InvalidArgument` for an empty event name.
    fn once(&self, event: &str, callback: EventCallback) -> Result<Subscription, SocketError>;

    /// Remove every listener registered for `event`.
    fn off(&self, event: &str);

    /// Client for `namespace` on the same manager, URL and configuration.
    ///
    /// The new client joins immediately only when `self` is connected.
    fn of(&self, namespace: &str) -> Result<Self, SocketError>
    where
        Self: Sized;
}
