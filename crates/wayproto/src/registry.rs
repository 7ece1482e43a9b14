//! # Registry of protocol interfaces
//!
//! The Registry is the source of truth for every interface a server speaks.
//! It maps an interface name to the ordered request and event tables that
//! the codec decodes against.
//!
//! ## Philosophy
//!
//! - **Build-Time Safety**: Definitions are validated once, when the registry
//!   is built. Every interface referenced by an argument must be present.
//! - **Read-Only**: A built registry never changes. Sessions share it through
//!   an `Arc` and look up definitions without locking.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::core_protocol;
use crate::error::Error;
use crate::error::Result;
use crate::interface::Direction;
use crate::interface::InterfaceDef;
use crate::interface::MethodDef;
use crate::xml;

/// Immutable map from interface name to definition.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    interfaces: HashMap<String, Arc<InterfaceDef>>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    /// A registry holding only the core interfaces.
    pub fn core() -> Self {
        let interfaces = core_protocol::interfaces()
            .into_iter()
            .map(|def| (def.name.clone(), Arc::new(def)))
            .collect();
        Self { interfaces }
    }

    /// Resolves `name` at `version`, which must lie in `1..=def.version`.
    pub fn lookup(&self, name: &str, version: u32) -> Result<Arc<InterfaceDef>> {
        let def = self.get(name).ok_or_else(|| Error::InterfaceNotFound(name.to_owned()))?;
        if version == 0 || version > def.version {
            return Err(Error::VersionUnsupported {
                interface: name.to_owned(),
                version,
                max: def.version,
            });
        }
        Ok(Arc::clone(def))
    }

    pub fn get(&self, name: &str) -> Option<&Arc<InterfaceDef>> {
        self.interfaces.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.interfaces.contains_key(name)
    }

    /// Looks up the method behind `opcode` on `interface`.
    pub fn signature_for(
        &self,
        interface: &str,
        opcode: u16,
        direction: Direction,
    ) -> Result<&MethodDef> {
        let def = self
            .get(interface)
            .ok_or_else(|| Error::InterfaceNotFound(interface.to_owned()))?;
        def.method(direction, opcode).ok_or_else(|| Error::OpcodeNotFound {
            interface: interface.to_owned(),
            direction,
            opcode,
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.interfaces.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }
}

/// Collects definitions and validates them as a whole.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    interfaces: Vec<InterfaceDef>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `wl_display`, `wl_registry` and `wl_callback`.
    pub fn core(self) -> Self {
        self.extend(core_protocol::interfaces())
    }

    pub fn interface(mut self, def: InterfaceDef) -> Self {
        self.interfaces.push(def);
        self
    }

    pub fn extend(mut self, defs: impl IntoIterator<Item = InterfaceDef>) -> Self {
        self.interfaces.extend(defs);
        self
    }

    /// Adds every interface of an XML protocol description.
    pub fn xml(self, source: &str) -> Result<Self> {
        let protocol = xml::parse_protocol(source)?;
        debug!(
            protocol = %protocol.name,
            interfaces = protocol.interfaces.len(),
            "loaded protocol description"
        );
        Ok(self.extend(protocol.interfaces))
    }

    pub fn build(self) -> Result<Registry> {
        let mut interfaces = HashMap::with_capacity(self.interfaces.len());
        for def in self.interfaces {
            def.validate()?;
            if interfaces.contains_key(&def.name) {
                return Err(Error::DuplicateInterface(def.name));
            }
            interfaces.insert(def.name.clone(), Arc::new(def));
        }

        let registry = Registry { interfaces };
        validate_references(&registry)?;
        debug!(interfaces = registry.len(), "registry built");
        Ok(registry)
    }
}

/// Checks that every interface named by an argument is registered.
fn validate_references(registry: &Registry) -> Result<()> {
    for def in registry.interfaces.values() {
        for (method, arg, target) in def.references() {
            if !registry.contains(target) {
                return Err(Error::UnknownInterfaceReference {
                    interface: def.name.clone(),
                    method: method.name.clone(),
                    arg: arg.name.clone(),
                    target: target.to_owned(),
                });
            }
        }
    }
    Ok(())
}
