//! Socket Bridge - one socket.io-style client contract over two native libraries.
//!
//! Applications write against [`SocketClient`] and exchange platform-neutral
//! [`Value`]s. Each platform adapter wraps a native socket library, marshals
//! values into its containers and back, and bridges acknowledgments in both
//! directions.
//!
//! # Architecture
//!
//! - **Contract** - [`SocketClient`], [`Args`], [`Ack`], [`Subscription`]
//! - **Marshalers** - [`Marshal`] implementations per platform
//! - **Bridge** - splits a trailing ack off native arguments and builds the reverse closure
//! - **Adapters** - [`json::JsonSocketClient`] and [`lua::LuaSocketClient`]
//! - **Loopbacks** - in-process native libraries for tests and the demo binary
//!
//! # Modules
//!
//! - [`client`] - Unified client contract
//! - [`value`] - Neutral value model
//! - [`marshal`] - Marshaler trait and native kinds
//! - [`bridge`] - Event/ack bridge
//! - [`config`] - Neutral client configuration
//! - [`json`] - json platform (serde_json containers)
//! - [`lua`] - lua platform (embedded Lua state)

pub mod bridge;
pub mod client;
pub mod config;
pub mod error;
pub mod json;
pub mod lua;
pub mod marshal;
pub mod value;

// Re-export commonly used types
pub use client::{Ack, AckCallback, Args, EventCallback, SocketClient, Subscription};
pub use config::{Query, SocketConfig};
pub use error::SocketError;
pub use marshal::{Marshal, NativeKind};
pub use value::{Object, Value};
