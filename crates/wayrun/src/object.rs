use std::sync::Arc;

use waypack::ObjectId;
use wayproto::InterfaceDef;

use crate::handler::Handler;

/// A live protocol object: an interface at a bound version, plus the
/// handler that implements its requests.
pub struct Object {
    interface: Arc<InterfaceDef>,
    version: u32,
    generation: u64,
    pub(crate) handler: Option<Box<dyn Handler>>,
}

impl Object {
    /// An object with no implementation bound yet.
    pub fn new(interface: Arc<InterfaceDef>, version: u32) -> Self {
        Self { interface, version, generation: 0, handler: None }
    }

    pub fn with_handler(mut self, handler: impl Handler + 'static) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn interface(&self) -> &Arc<InterfaceDef> {
        &self.interface
    }

    pub fn name(&self) -> &str {
        &self.interface.name
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Stamped by the table on insertion; unique within one table.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_bound(&self) -> bool {
        self.handler.is_some()
    }

    pub(crate) fn stamp(&mut self, generation: u64) {
        self.generation = generation;
    }
}

impl std::fmt::Debug for Object {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Object")
            .field("interface", &self.interface.name)
            .field("version", &self.version)
            .field("generation", &self.generation)
            .field("bound", &self.is_bound())
            .finish()
    }
}

/// A reference to one particular object that survives id reuse.
///
/// Once the object is destroyed, operations through the handle fail with
/// `Stale`, even if a new object took the same id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle {
    id: ObjectId,
    generation: u64,
}

impl Handle {
    pub(crate) fn new(id: ObjectId, generation: u64) -> Self {
        Self { id, generation }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}
