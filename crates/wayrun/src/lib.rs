//! # Wayrun
//!
//! The server side of a compositor protocol connection: per-client object
//! tables, request dispatch, and the session that turns inbound bytes into
//! handler calls and handler events into outbound bytes.
//!
//! ## Philosophy
//!
//! - **Owner driven**: A `Session` does no I/O and spawns nothing. Whoever
//!   owns the socket calls `feed`, `feed_fds` and `drain_outbound`.
//! - **Fail closed**: Any protocol violation ends the session after queueing
//!   `wl_display.error`. Handler errors are reported and the session goes on.
//! - **Shared definitions**: `Registry` and `Globals` are read-only and shared
//!   between sessions through `Arc`; everything else belongs to one session.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use wayproto::Registry;
//! use wayrun::Globals;
//! use wayrun::Session;
//! use wayrun::SessionConfig;
//!
//! let registry = Arc::new(Registry::core());
//! let globals = Arc::new(Globals::new());
//! let mut session = Session::new(registry, globals, SessionConfig::default()).unwrap();
//!
//! # let received: &[u8] = &[];
//! session.feed(received).unwrap();
//! let reply = session.drain_outbound();
//! # drop(reply);
//! ```

mod client;
mod config;
mod core_handlers;
mod dispatch;
mod error;
mod global;
mod handler;
mod object;
mod session;
mod table;

pub use client::ClientId;
pub use client::ClientMap;
pub use config::ConfigError;
pub use config::SessionConfig;
pub use dispatch::SessionState;
pub use error::AppError;
pub use error::ErrorCategory;
pub use error::ObjectError;
pub use error::ProtocolError;
pub use error::SessionError;
pub use error::TableError;
pub use global::BindFn;
pub use global::Global;
pub use global::Globals;
pub use handler::handler_fn;
pub use handler::Context;
pub use handler::FnHandler;
pub use handler::Handler;
pub use handler::Request;
pub use object::Handle;
pub use object::Object;
pub use session::Session;
pub use table::ObjectTable;
