//! In-process implementation of the json native library.
//!
//! Stands in for a network socket library: emits are recorded instead of
//! sent, and the remote peer is simulated with [`LoopbackSocket::deliver`].
//! Used by the integration tests and the demo binary.
//!
//! # Deadlock Prevention
//!
//! Listeners are collected under the listener lock, then the lock is
//! released before any listener runs. Listeners may therefore subscribe,
//! unsubscribe or emit on the same socket.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

use url::Url;

use super::native::{JsonArg, JsonConnector, JsonListener, JsonManager, JsonSocket};
use super::options::JsonOptions;

/// Event delivered to a socket's own listeners when it connects.
pub const CONNECT_EVENT: &str = "connect";
/// Event delivered to a socket's own listeners when it disconnects.
pub const DISCONNECT_EVENT: &str = "disconnect";

/// An emit recorded by a [`LoopbackSocket`].
#[derive(Debug, Clone)]
pub struct Emitted {
    /// Event name.
    pub event: String,
    /// Native arguments, ack handle included.
    pub args: Vec<JsonArg>,
}

struct Registered {
    event: String,
    listener: JsonListener,
    once: bool,
}

/// Loopback socket bound to one namespace.
pub struct LoopbackSocket {
    namespace: String,
    manager: Arc<LoopbackManager>,
    connected: AtomicBool,
    connect_count: AtomicUsize,
    listeners: Mutex<Vec<Registered>>,
    emitted: Mutex<Vec<Emitted>>,
}

impl LoopbackSocket {
    /// Namespace this socket is bound to.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// How many times the socket went from disconnected to connected.
    #[must_use]
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::SeqCst)
    }

    /// Number of listeners registered for `event`.
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .lock()
            .expect("LoopbackSocket listeners mutex poisoned")
            .iter()
            .filter(|r| r.event == event)
            .count()
    }

    /// Drain every emit recorded so far.
    pub fn take_emitted(&self) -> Vec<Emitted> {
        std::mem::take(
            &mut *self
                .emitted
                .lock()
                .expect("LoopbackSocket emitted mutex poisoned"),
        )
    }

    /// Deliver `event` as if the remote peer had sent it.
    ///
    /// Returns the number of listeners invoked. `once` listeners are removed
    /// before they run.
    pub fn deliver(&self, event: &str, args: Vec<JsonArg>) -> usize {
        let listeners: Vec<JsonListener> = {
            let mut registered = self
                .listeners
                .lock()
                .expect("LoopbackSocket listeners mutex poisoned");
            let matching = registered
                .iter()
                .filter(|r| r.event == event)
                .map(|r| Arc::clone(&r.listener))
                .collect();
            registered.retain(|r| !(r.once && r.event == event));
            matching
        };
        // Lock released here

        log::debug!(
            "[loopback:{}] Delivering '{}' to {} listener(s)",
            self.namespace,
            event,
            listeners.len()
        );

        for listener in &listeners {
            listener(args.clone());
        }
        listeners.len()
    }

    fn register(&self, event: &str, listener: JsonListener, once: bool) {
        self.listeners
            .lock()
            .expect("LoopbackSocket listeners mutex poisoned")
            .push(Registered {
                event: event.to_string(),
                listener,
                once,
            });
    }
}

impl fmt::Debug for LoopbackSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackSocket")
            .field("namespace", &self.namespace)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .field("connect_count", &self.connect_count())
            .finish_non_exhaustive()
    }
}

impl JsonSocket for LoopbackSocket {
    fn connect(&self) {
        if self.connected.swap(true, Ordering::SeqCst) {
            return;
        }
        self.connect_count.fetch_add(1, Ordering::SeqCst);
        self.deliver(CONNECT_EVENT, Vec::new());
    }

    fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            self.deliver(
                DISCONNECT_EVENT,
                vec![JsonArg::Value("io client disconnect".into())],
            );
        }
    }

    fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn on(&self, event: &str, listener: JsonListener) {
        self.register(event, listener, false);
    }

    fn once(&self, event: &str, listener: JsonListener) {
        self.register(event, listener, true);
    }

    fn off_listener(&self, event: &str, listener: &JsonListener) {
        self.listeners
            .lock()
            .expect("LoopbackSocket listeners mutex poisoned")
            .retain(|r| !(r.event == event && Arc::ptr_eq(&r.listener, listener)));
    }

    fn off(&self, event: &str) {
        self.listeners
            .lock()
            .expect("LoopbackSocket listeners mutex poisoned")
            .retain(|r| r.event != event);
    }

    fn emit(&self, event: &str, args: Vec<JsonArg>) {
        log::debug!("[loopback:{}] Emit '{}'", self.namespace, event);
        self.emitted
            .lock()
            .expect("LoopbackSocket emitted mutex poisoned")
            .push(Emitted {
                event: event.to_string(),
                args,
            });
    }

    fn manager(&self) -> Arc<dyn JsonManager> {
        Arc::clone(&self.manager) as Arc<dyn JsonManager>
    }
}

/// Loopback connection manager caching one socket per namespace.
pub struct LoopbackManager {
    me: Weak<LoopbackManager>,
    sockets: Mutex<HashMap<String, Weak<LoopbackSocket>>>,
}

impl LoopbackManager {
    /// Create a manager with no sockets.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            sockets: Mutex::new(HashMap::new()),
        })
    }

    /// Socket for `namespace`, reusing a live one.
    #[must_use]
    pub fn namespace(&self, namespace: &str) -> Arc<LoopbackSocket> {
        let mut sockets = self
            .sockets
            .lock()
            .expect("LoopbackManager sockets mutex poisoned");

        if let Some(existing) = sockets.get(namespace).and_then(Weak::upgrade) {
            return existing;
        }

        let manager = self
            .me
            .upgrade()
            .expect("LoopbackManager used after its last Arc was dropped");
        let socket = Arc::new(LoopbackSocket {
            namespace: namespace.to_string(),
            manager,
            connected: AtomicBool::new(false),
            connect_count: AtomicUsize::new(0),
            listeners: Mutex::new(Vec::new()),
            emitted: Mutex::new(Vec::new()),
        });
        sockets.insert(namespace.to_string(), Arc::downgrade(&socket));
        socket
    }
}

impl fmt::Debug for LoopbackManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let namespaces = self
            .sockets
            .lock()
            .map(|s| s.len())
            .unwrap_or_default();
        f.debug_struct("LoopbackManager")
            .field("namespaces", &namespaces)
            .finish()
    }
}

impl JsonManager for LoopbackManager {
    fn socket(&self, namespace: &str) -> Arc<dyn JsonSocket> {
        self.namespace(namespace)
    }
}

/// Loopback entry point; every URL shares one [`LoopbackManager`].
#[derive(Debug)]
pub struct LoopbackConnector {
    manager: Arc<LoopbackManager>,
    opened: Mutex<Vec<(Url, JsonOptions)>>,
}

impl LoopbackConnector {
    /// Create a connector with a fresh manager.
    #[must_use]
    pub fn new() -> Self {
        Self {
            manager: LoopbackManager::new(),
            opened: Mutex::new(Vec::new()),
        }
    }

    /// The shared manager.
    #[must_use]
    pub fn manager(&self) -> &Arc<LoopbackManager> {
        &self.manager
    }

    /// URL and options of the most recent `socket` call.
    #[must_use]
    pub fn last_opened(&self) -> Option<(Url, JsonOptions)> {
        self.opened
            .lock()
            .expect("LoopbackConnector opened mutex poisoned")
            .last()
            .cloned()
    }
}

impl Default for LoopbackConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonConnector for LoopbackConnector {
    fn socket(&self, url: &Url, options: &JsonOptions) -> Arc<dyn JsonSocket> {
        self.opened
            .lock()
            .expect("LoopbackConnector opened mutex poisoned")
            .push((url.clone(), options.clone()));
        self.manager.namespace(url.path())
    }
}
