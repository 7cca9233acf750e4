//! lua platform adapter.
//!
//! Wraps a native socket living next to an embedded Lua state. Payloads are
//! Lua values, listeners are Lua functions removed by registration id, and
//! an ack is a trailing Lua function.
//!
//! The platform is single-threaded: clients, sockets and callbacks must stay
//! on the thread that owns the [`Lua`] state.
//!
//! # Usage
//!
//! ```ignore
//! let lua = Lua::new();
//! let connector = LoopbackLuaConnector::new();
//! let client = lua::io(&lua, "http://localhost:3000", None, &connector)?;
//!
//! client.on("greeting", Box::new(|args| {
//!     log::info!("greeting: {:?}", args.first());
//! }))?;
//! ```

pub mod loopback;
pub mod marshal;
pub mod native;
pub mod options;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use mlua::{Function, Lua, MultiValue, Value as LuaValue};
use url::Url;

use crate::bridge;
use crate::client::{Ack, AckCallback, Args, EventCallback, SocketClient, Subscription};
use crate::config::SocketConfig;
use crate::error::{parse_url, require_event, SocketError};
use crate::marshal::Marshal;
use crate::value::Value;

pub use loopback::{LoopbackLuaConnector, LoopbackLuaManager, LoopbackLuaSocket, LuaEmitted};
pub use marshal::LuaMarshal;
pub use native::{LuaConnector, LuaManager, LuaSocket, SocketStatus};
pub use options::{HttpCookie, LuaOptions};

/// Client facade over a lua-platform native socket.
pub struct LuaSocketClient {
    marshal: LuaMarshal,
    url: Url,
    config: Option<SocketConfig>,
    manager: Rc<dyn LuaManager>,
    socket: Rc<dyn LuaSocket>,
}

impl LuaSocketClient {
    /// Create a client for `url` whose values live in `lua`.
    ///
    /// # Errors
    ///
    /// Returns `SocketError::InvalidArgument` for an empty URL,
    /// `SocketError::InvalidUrl` when it does not parse, and
    /// `SocketError::Lua` when the library cannot create its manager.
    pub fn new(
        lua: &Lua,
        url: &str,
        config: Option<SocketConfig>,
        connector: &dyn LuaConnector,
    ) -> Result<Self, SocketError> {
        let url = parse_url(url)?;
        let options = LuaOptions::from_config(&url, config.as_ref());

        if options.log {
            log::set_max_level(log::LevelFilter::Trace);
        }

        let manager = connector.manager(lua, &url, &options)?;
        let socket = manager.default_socket();
        log::debug!("Created lua socket for {}", url);
        Ok(Self {
            marshal: LuaMarshal::new(lua.clone()),
            url,
            config,
            manager,
            socket,
        })
    }

    /// The native socket handle.
    #[must_use]
    pub fn instance(&self) -> &Rc<dyn LuaSocket> {
        &self.socket
    }

    /// The native connection manager.
    #[must_use]
    pub fn manager(&self) -> &Rc<dyn LuaManager> {
        &self.manager
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

    /// Native connection status.
    #[must_use]
    pub fn status(&self) -> SocketStatus {
        self.socket.status()
    }

    fn subscribe(
        &self,
        event: &str,
        callback: EventCallback,
        once: bool,
    ) -> Result<Subscription, SocketError> {
        require_event(event)?;

        let listener = bridge_listener(self.marshal.lua(), callback)?;
        let id = if once {
            self.socket.once(event, listener)?
        } else {
            self.socket.on(event, listener)?
        };
        log::debug!("Registered lua handler {} for '{}' (once: {})", id, event, once);

        let socket = Rc::clone(&self.socket);
        Ok(Subscription::new(event, move || socket.off_with_id(id)))
    }
}

impl fmt::Debug for LuaSocketClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LuaSocketClient")
            .field("url", &self.url.as_str())
            .field("status", &self.socket.status())
            .finish_non_exhaustive()
    }
}

impl SocketClient for LuaSocketClient {
    fn connected(&self) -> bool {
        self.socket.status() == SocketStatus::Connected
    }

    fn connect(&self) {
        if self.connected() {
            return;
        }
        let payload = self
            .config
            .as_ref()
            .and_then(|c| c.auth.as_ref())
            .map(|auth| self.marshal.serialize(auth));
        self.socket.connect(payload);
    }

    fn disconnect(&self) {
        self.socket.disconnect();
    }

    fn emit(&self, event: &str, payload: Value, ack: Option<AckCallback>) -> Result<(), SocketError> {
        require_event(event)?;

        let items = vec![self.marshal.serialize(&payload)];
        match ack {
            Some(ack) => {
                log::debug!("Emitting lua event '{}' with ack", event);
                let handle = ack_function(self.marshal.lua(), ack)?;
                self.socket.emit_with_ack(event, items, handle)?;
            }
            None => {
                log::debug!("Emitting lua event '{}'", event);
                self.socket.emit(event, items)?;
            }
        }
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
        let client = Self {
            marshal: self.marshal.clone(),
            url: self.url.clone(),
            config: self.config.clone(),
            manager: Rc::clone(&self.manager),
            socket: self.manager.socket_for_namespace(namespace),
        };

        // Join only if currently connected, otherwise join on connect.
        if self.connected() {
            client.connect();
        }
        log::debug!(
            "Derived lua namespace client '{}' (joined: {})",
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
/// Same as [`LuaSocketClient::new`].
pub fn io(
    lua: &Lua,
    url: &str,
    config: Option<SocketConfig>,
    connector: &dyn LuaConnector,
) -> Result<LuaSocketClient, SocketError> {
    let client = LuaSocketClient::new(lua, url, config, connector)?;
    client.connect();
    Ok(client)
}

/// Wrap an application callback into a Lua handler running the bridge.
///
/// The handler is stored inside the Lua state, so it borrows the state from
/// its call arguments instead of capturing it.
fn bridge_listener(lua: &Lua, callback: EventCallback) -> mlua::Result<Function> {
    lua.create_function(move |lua, args: MultiValue| {
        let marshal = LuaMarshal::new(lua.clone());
        let reverse = marshal.clone();
        let args: Args = bridge::demux(
            args.into_iter().collect(),
            |native: LuaValue| marshal.deserialize(&native),
            move |handle: Function| {
                Ack::new(move |response: Vec<Value>| {
                    handle.call::<()>(MultiValue::from_vec(reverse.serialize_all(&response)))?;
                    Ok(())
                })
            },
        );
        callback(args);
        Ok(())
    })
}

/// Lua function that demarshals the peer's answer into `ack`.
fn ack_function(lua: &Lua, ack: AckCallback) -> mlua::Result<Function> {
    let pending = RefCell::new(Some(ack));
    lua.create_function(move |lua, response: MultiValue| {
        let ack = pending.borrow_mut().take();
        match ack {
            Some(ack) => {
                let marshal = LuaMarshal::new(lua.clone());
                let values: Vec<LuaValue> = response.into_iter().collect();
                ack(marshal.deserialize_all(&values));
            }
            None => log::warn!("Acknowledgment answered more than once, ignoring"),
        }
        Ok(())
    })
}
