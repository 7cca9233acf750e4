//! Native API consumed from the lua socket library.
//!
//! Sockets of this library live next to an embedded Lua state: payloads are
//! Lua values, listeners are Lua functions registered under a generated id,
//! and an event whose sender wants an answer ends with a Lua function.
//!
//! The whole platform is single-threaded, so handles are shared with `Rc`.

use std::fmt;
use std::rc::Rc;

use mlua::{Function, Lua, Value as LuaValue};
use url::Url;
use uuid::Uuid;

use super::options::LuaOptions;
use crate::bridge::AckCandidate;

/// Connection status reported by a [`LuaSocket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SocketStatus {
    /// Never asked to connect.
    #[default]
    NotConnected,
    /// Was connected, now closed.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Open.
    Connected,
}

impl fmt::Display for SocketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotConnected => "notconnected",
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        };
        f.write_str(name)
    }
}

// Only a plain function is an ack; callable tables stay data.
impl AckCandidate for LuaValue {
    type Handle = Function;

    fn into_ack(self) -> Result<Function, Self> {
        match self {
            Self::Function(handle) => Ok(handle),
            other => Err(other),
        }
    }
}

/// A socket of the lua library, bound to one namespace.
pub trait LuaSocket {
    /// Open the connection, handing `payload` to the server handshake.
    fn connect(&self, payload: Option<LuaValue>);

    /// Close the connection.
    fn disconnect(&self);

    /// Current connection status.
    fn status(&self) -> SocketStatus;

    /// Register `handler` for every delivery of `event`.
    ///
    /// # Errors
    ///
    /// Fails when the handler cannot be anchored in the Lua state.
    fn on(&self, event: &str, handler: Function) -> mlua::Result<Uuid>;

    /// Register `handler` for the next delivery of `event`.
    ///
    /// # Errors
    ///
    /// Fails when the handler cannot be anchored in the Lua state.
    fn once(&self, event: &str, handler: Function) -> mlua::Result<Uuid>;

    /// Remove one registration. Unknown ids are ignored.
    fn off_with_id(&self, id: Uuid);

    /// Remove every registration of `event`.
    fn off(&self, event: &str);

    /// Send `items` for `event`.
    ///
    /// # Errors
    ///
    /// Fails when the items cannot be handed to the transport.
    fn emit(&self, event: &str, items: Vec<LuaValue>) -> mlua::Result<()>;

    /// Send `items` for `event`; `ack` runs with the server's answer.
    ///
    /// # Errors
    ///
    /// Fails when the items cannot be handed to the transport.
    fn emit_with_ack(&self, event: &str, items: Vec<LuaValue>, ack: Function) -> mlua::Result<()>;

    /// Manager shared by every namespace socket of this connection.
    fn manager(&self) -> Rc<dyn LuaManager>;
}

/// Connection manager of the lua library.
pub trait LuaManager {
    /// Socket of the default namespace `/`.
    fn default_socket(&self) -> Rc<dyn LuaSocket>;

    /// Socket for `namespace`, created on first use.
    fn socket_for_namespace(&self, namespace: &str) -> Rc<dyn LuaSocket>;
}

/// Entry point of the lua library.
pub trait LuaConnector {
    /// Create a manager for `url` whose sockets live in `lua`.
    ///
    /// # Errors
    ///
    /// Fails when the library cannot set itself up in the Lua state.
    fn manager(&self, lua: &Lua, url: &Url, options: &LuaOptions) -> mlua::Result<Rc<dyn LuaManager>>;
}
