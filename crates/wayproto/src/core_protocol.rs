//! The core interfaces every connection starts from.
//!
//! `wl_display` is object 1 of every connection. Through it a client reaches
//! `wl_registry`, which advertises globals, and `wl_callback`, which answers
//! round trips.

use waypack::ArgSpec;

use crate::interface::InterfaceDef;
use crate::interface::MethodDef;

pub const WL_DISPLAY: &str = "wl_display";
pub const WL_REGISTRY: &str = "wl_registry";
pub const WL_CALLBACK: &str = "wl_callback";

/// Opcodes of `wl_display`.
pub mod display {
    pub const SYNC: u16 = 0;
    pub const GET_REGISTRY: u16 = 1;

    pub const ERROR: u16 = 0;
    pub const DELETE_ID: u16 = 1;
}

/// Opcodes of `wl_registry`.
pub mod registry {
    pub const BIND: u16 = 0;

    pub const GLOBAL: u16 = 0;
    pub const GLOBAL_REMOVE: u16 = 1;
}

/// Opcodes of `wl_callback`.
pub mod callback {
    pub const DONE: u16 = 0;
}

/// Codes carried by `wl_display.error`.
pub mod display_error {
    /// The request named an object that does not exist.
    pub const INVALID_OBJECT: u32 = 0;
    /// The request or its arguments do not fit the interface.
    pub const INVALID_METHOD: u32 = 1;
    pub const NO_MEMORY: u32 = 2;
    pub const IMPLEMENTATION: u32 = 3;
}

pub fn wl_display() -> InterfaceDef {
    InterfaceDef::new(WL_DISPLAY, 1)
        .request(MethodDef::new("sync", vec![ArgSpec::new_id("callback", Some(WL_CALLBACK))]))
        .request(MethodDef::new(
            "get_registry",
            vec![ArgSpec::new_id("registry", Some(WL_REGISTRY))],
        ))
        .event(MethodDef::new("error", vec![
            ArgSpec::object("object_id", None),
            ArgSpec::uint("code"),
            ArgSpec::string("message"),
        ]))
        .event(MethodDef::new("delete_id", vec![ArgSpec::uint("id")]))
}

pub fn wl_registry() -> InterfaceDef {
    InterfaceDef::new(WL_REGISTRY, 1)
        .request(MethodDef::new("bind", vec![ArgSpec::uint("name"), ArgSpec::new_id("id", None)]))
        .event(MethodDef::new("global", vec![
            ArgSpec::uint("name"),
            ArgSpec::string("interface"),
            ArgSpec::uint("version"),
        ]))
        .event(MethodDef::new("global_remove", vec![ArgSpec::uint("name")]))
}

pub fn wl_callback() -> InterfaceDef {
    InterfaceDef::new(WL_CALLBACK, 1)
        .event(MethodDef::new("done", vec![ArgSpec::uint("callback_data")]).destructor())
}

pub fn interfaces() -> Vec<InterfaceDef> {
    vec![wl_display(), wl_registry(), wl_callback()]
}
