//! # Wayproto
//!
//! Interface definitions for the compositor protocol and the registry that
//! resolves them by name and version.
//!
//! Definitions come from three places: the built-in core interfaces
//! (`core_protocol`), hand-written `InterfaceDef`s, and XML protocol
//! descriptions (`xml`).

pub mod core_protocol;
mod error;
mod interface;
mod registry;
pub mod xml;

pub use error::Error;
pub use error::Result;
pub use interface::Direction;
pub use interface::InterfaceDef;
pub use interface::MethodDef;
pub use registry::Registry;
pub use registry::RegistryBuilder;
