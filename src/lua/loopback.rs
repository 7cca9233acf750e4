//! In-process implementation of the lua native library.
//!
//! Handlers are anchored in the Lua registry so the garbage collector keeps
//! them alive while registered. Each registration gets a uuid, which is what
//! [`LuaSocket::off_with_id`] removes.
//!
//! # Deadlock Prevention
//!
//! [`LoopbackLuaSocket::deliver`] resolves the matching handlers while
//! holding the handler borrow, then releases it before calling any of them.
//! Handlers may therefore subscribe, unsubscribe or emit on the same socket.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use mlua::{Function, Lua, MultiValue, RegistryKey, Value as LuaValue};
use url::Url;
use uuid::Uuid;

use super::native::{LuaConnector, LuaManager, LuaSocket, SocketStatus};
use super::options::LuaOptions;

/// Event delivered to a socket's own handlers when it connects.
pub const CONNECT_EVENT: &str = "connect";
/// Event delivered to a socket's own handlers when it disconnects.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// Namespace of [`LuaManager::default_socket`].
pub const DEFAULT_NAMESPACE: &str = "/";

/// An emit recorded by a [`LoopbackLuaSocket`].
#[derive(Debug, Clone)]
pub struct LuaEmitted {
    /// Event name.
    pub event: String,
    /// Payload items.
    pub items: Vec<LuaValue>,
    /// Ack function passed to `emit_with_ack`.
    pub ack: Option<Function>,
}

struct Handler {
    id: Uuid,
    event: String,
    key: RegistryKey,
    once: bool,
}

/// Loopback socket bound to one namespace.
pub struct LoopbackLuaSocket {
    lua: Lua,
    namespace: String,
    manager: Rc<LoopbackLuaManager>,
    status: Cell<SocketStatus>,
    connect_payload: RefCell<Option<LuaValue>>,
    handlers: RefCell<Vec<Handler>>,
    emitted: RefCell<Vec<LuaEmitted>>,
}

impl LoopbackLuaSocket {
    /// Namespace this socket is bound to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Payload given to the most recent `connect`.
    #[must_use]
    pub fn connect_payload(&self) -> Option<LuaValue> {
        self.connect_payload.borrow().clone()
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .borrow()
            .iter()
            .filter(|h| h.event == event)
            .count()
    }

    /// Drain every emit recorded so far.
    pub fn take_emitted(&self) -> Vec<LuaEmitted> {
        std::mem::take(&mut *self.emitted.borrow_mut())
    }

    /// Deliver `event` as if the remote peer had sent it.
    ///
    /// Returns the number of handlers that ran without error. Failing
    /// handlers are logged and skipped.
    ///
    /// # Errors
    ///
    /// Fails when a registered handler cannot be read back from the
    /// registry.
    pub fn deliver(&self, event: &str, items: Vec<LuaValue>) -> mlua::Result<usize> {
        let functions: Vec<Function> = {
            let mut handlers = self.handlers.borrow_mut();
            let functions = handlers
                .iter()
                .filter(|h| h.event == event)
                .map(|h| self.lua.registry_value::<Function>(&h.key))
                .collect::<mlua::Result<Vec<_>>>()?;

            let (fired, kept): (Vec<Handler>, Vec<Handler>) = std::mem::take(&mut *handlers)
                .into_iter()
                .partition(|h| h.once && h.event == event);
            *handlers = kept;
            for handler in fired {
                self.release(handler);
            }
            functions
        };
        // Borrow released here

        log::debug!(
            "[loopback:{}] Delivering '{}' to {} handler(s)",
            self.namespace,
            event,
            functions.len()
        );

        let mut invoked = 0;
        for function in functions {
            match function.call::<()>(MultiValue::from_vec(items.clone())) {
                Ok(()) => invoked += 1,
                Err(e) => log::warn!("Handler for '{}' failed: {}", event, e),
            }
        }
        Ok(invoked)
    }

    fn register(&self, event: &str, handler: Function, once: bool) -> mlua::Result<Uuid> {
        let key = self.lua.create_registry_value(handler)?;
        let id = Uuid::new_v4();
        self.handlers.borrow_mut().push(Handler {
            id,
            event: event.to_string(),
            key,
            once,
        });
        Ok(id)
    }

    fn release(&self, handler: Handler) {
        if let Err(e) = self.lua.remove_registry_value(handler.key) {
            log::warn!("Failed to release handler {}: {}", handler.id, e);
        }
    }

    fn remove_where(&self, predicate: impl Fn(&Handler) -> bool) {
        let removed: Vec<Handler> = {
            let mut handlers = self.handlers.borrow_mut();
            let (removed, kept) = std::mem::take(&mut *handlers)
                .into_iter()
                .partition(|h| predicate(h));
            *handlers = kept;
            removed
        };
        for handler in removed {
            self.release(handler);
        }
    }

    fn fire(&self, event: &str, items: Vec<LuaValue>) {
        if let Err(e) = self.deliver(event, items) {
            log::warn!("[loopback:{}] Failed to deliver '{}': {}", self.namespace, event, e);
        }
    }
}

impl fmt::Debug for LoopbackLuaSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackLuaSocket")
            .field("namespace", &self.namespace)
            .field("status", &self.status.get())
            .field("handlers", &self.handlers.borrow().len())
            .finish_non_exhaustive()
    }
}

impl LuaSocket for LoopbackLuaSocket {
    fn connect(&self, payload: Option<LuaValue>) {
        if self.status.get() == SocketStatus::Connected {
            return;
        }
        *self.connect_payload.borrow_mut() = payload;
        self.status.set(SocketStatus::Connected);
        self.fire(CONNECT_EVENT, Vec::new());
    }

    fn disconnect(&self) {
        if self.status.get() != SocketStatus::Connected {
            return;
        }
        self.status.set(SocketStatus::Disconnected);
        match self.lua.create_string("io client disconnect") {
            Ok(reason) => self.fire(DISCONNECT_EVENT, vec![LuaValue::String(reason)]),
            Err(e) => log::warn!("Failed to build disconnect reason: {}", e),
        }
    }

    fn status(&self) -> SocketStatus {
        self.status.get()
    }

    fn on(&self, event: &str, handler: Function) -> mlua::Result<Uuid> {
        self.register(event, handler, false)
    }

    fn once(&self, event: &str, handler: Function) -> mlua::Result<Uuid> {
        self.register(event, handler, true)
    }

    fn off_with_id(&self, id: Uuid) {
        self.remove_where(|h| h.id == id);
    }

    fn off(&self, event: &str) {
        self.remove_where(|h| h.event == event);
    }

    fn emit(&self, event: &str, items: Vec<LuaValue>) -> mlua::Result<()> {
        log::debug!("[loopback:{}] Emit '{}'", self.namespace, event);
        self.emitted.borrow_mut().push(LuaEmitted {
            event: event.to_string(),
            items,
            ack: None,
        });
        Ok(())
    }

    fn emit_with_ack(&self, event: &str, items: Vec<LuaValue>, ack: Function) -> mlua::Result<()> {
        log::debug!("[loopback:{}] Emit '{}' with ack", self.namespace, event);
        self.emitted.borrow_mut().push(LuaEmitted {
            event: event.to_string(),
            items,
            ack: Some(ack),
        });
        Ok(())
    }

    fn manager(&self) -> Rc<dyn LuaManager> {
        Rc::clone(&self.manager) as Rc<dyn LuaManager>
    }
}

/// Loopback connection manager caching one socket per namespace.
pub struct LoopbackLuaManager {
    me: Weak<LoopbackLuaManager>,
    lua: Lua,
    sockets: RefCell<HashMap<String, Weak<LoopbackLuaSocket>>>,
}

impl LoopbackLuaManager {
    /// Create a manager whose sockets live in `lua`.
    #[must_use]
    pub fn new(lua: Lua) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            lua,
            sockets: RefCell::new(HashMap::new()),
        })
    }

    /// Socket for `namespace`, reusing a live one.
    ///
    /// # Panics
    ///
    /// Panics if called while the manager is being dropped.
    #[must_use]
    pub fn namespace(&self, namespace: &str) -> Rc<LoopbackLuaSocket> {
        let mut sockets = self.sockets.borrow_mut();

        if let Some(existing) = sockets.get(namespace).and_then(Weak::upgrade) {
            return existing;
        }

        let manager = self
            .me
            .upgrade()
            .expect("LoopbackLuaManager used after its last Rc was dropped");
        let socket = Rc::new(LoopbackLuaSocket {
            lua: self.lua.clone(),
            namespace: namespace.to_string(),
            manager,
            status: Cell::new(SocketStatus::NotConnected),
            connect_payload: RefCell::new(None),
            handlers: RefCell::new(Vec::new()),
            emitted: RefCell::new(Vec::new()),
        });
        sockets.insert(namespace.to_string(), Rc::downgrade(&socket));
        socket
    }
}

impl fmt::Debug for LoopbackLuaManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackLuaManager")
            .field("namespaces", &self.sockets.borrow().len())
            .finish_non_exhaustive()
    }
}

impl LuaManager for LoopbackLuaManager {
    fn default_socket(&self) -> Rc<dyn LuaSocket> {
        self.namespace(DEFAULT_NAMESPACE)
    }

    fn socket_for_namespace(&self, namespace: &str) -> Rc<dyn LuaSocket> {
        self.namespace(namespace)
    }
}

/// Loopback entry point; creates one manager per `manager` call.
#[derive(Debug, Default)]
pub struct LoopbackLuaConnector {
    managers: RefCell<Vec<Rc<LoopbackLuaManager>>>,
    opened: RefCell<Vec<(Url, LuaOptions)>>,
}

impl LoopbackLuaConnector {
    /// Create a connector that has not opened anything yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager created by the most recent `manager` call.
    #[must_use]
    pub fn last_manager(&self) -> Option<Rc<LoopbackLuaManager>> {
        self.managers.borrow().last().cloned()
    }

    /// URL and options of the most recent `manager` call.
    #[must_use]
    pub fn last_opened(&self) -> Option<(Url, LuaOptions)> {
        self.opened.borrow().last().cloned()
    }
}

impl LuaConnector for LoopbackLuaConnector {
    fn manager(&self, lua: &Lua, url: &Url, options: &LuaOptions) -> mlua::Result<Rc<dyn LuaManager>> {
        let manager = LoopbackLuaManager::new(lua.clone());
        self.managers.borrow_mut().push(Rc::clone(&manager));
        self.opened.borrow_mut().push((url.clone(), options.clone()));
        Ok(manager)
    }
}
