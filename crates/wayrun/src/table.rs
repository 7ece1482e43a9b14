//! # Object table
//!
//! Maps the ids of one connection to live objects.
//!
//! ## Invariants
//!
//! - Client ids come from `1..=0xFEFFFFFF`, server ids from
//!   `0xFF000000..=0xFFFFFFFF`. Neither side may insert into the other's range.
//! - A destroyed id leaves a stale marker. Requests that still name it read
//!   as stale, not unknown.
//! - A destroyed client id is reusable only after the client acknowledged
//!   the deletion. Server ids are never reused.
//! - Markers are bounded: past capacity, the oldest acknowledged ones expire.
//!   A server id below the allocation counter stays stale even then.

use std::collections::HashMap;
use std::collections::VecDeque;

use tracing::trace;
use waypack::ObjectId;
use waypack::Side;
use waypack::Signature;
use wayproto::Direction;

use crate::error::TableError;
use crate::object::Handle;
use crate::object::Object;

enum Slot {
    Live(Object),
    Stale { acked: bool },
}

/// Per-connection map from id to object.
pub struct ObjectTable {
    slots: HashMap<ObjectId, Slot>,
    /// Stale ids in destruction order.
    stale: VecDeque<ObjectId>,
    stale_capacity: usize,
    next_server: u64,
    next_generation: u64,
    live: usize,
}

impl ObjectTable {
    pub fn new(stale_capacity: usize) -> Self {
        Self {
            slots: HashMap::new(),
            stale: VecDeque::new(),
            stale_capacity,
            next_server: u64::from(ObjectId::SERVER_MIN),
            next_generation: 1,
            live: 0,
        }
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of remembered destroyed ids.
    pub fn stale_len(&self) -> usize {
        self.stale.len()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        matches!(self.slots.get(&id), Some(Slot::Live(_)))
    }

    pub fn is_stale(&self, id: ObjectId) -> bool {
        match self.slots.get(&id) {
            Some(Slot::Live(_)) => false,
            Some(Slot::Stale { .. }) => true,
            None => self.was_allocated(id),
        }
    }

    /// Inserts `object` at an id chosen by `side`.
    pub fn insert(
        &mut self,
        side: Side,
        id: ObjectId,
        mut object: Object,
    ) -> Result<Handle, TableError> {
        if !side.contains(id.raw()) || id.side() != side {
            return Err(TableError::IdOutOfRange { id: id.raw(), side });
        }
        match self.slots.get(&id) {
            Some(Slot::Live(_)) => return Err(TableError::IdInUse(id)),
            Some(Slot::Stale { acked: false, .. }) => return Err(TableError::IdNotReleased(id)),
            Some(Slot::Stale { acked: true, .. }) if side == Side::Server => {
                return Err(TableError::IdNotReleased(id));
            }
            Some(Slot::Stale { acked: true, .. }) => self.forget_stale(id),
            // Handed out before and expired since; server ids never come back.
            None if self.was_allocated(id) => return Err(TableError::IdNotReleased(id)),
            None => {}
        }
        if side == Side::Server {
            self.next_server = u64::from(id.raw()) + 1;
        }

        let generation = self.next_generation;
        self.next_generation += 1;
        object.stamp(generation);
        trace!(%id, interface = object.name(), generation, "inserted object");
        self.slots.insert(id, Slot::Live(object));
        self.live += 1;
        Ok(Handle::new(id, generation))
    }

    /// Inserts `object` at the next unused server id.
    pub fn allocate_server(&mut self, object: Object) -> Result<Handle, TableError> {
        let id = u32::try_from(self.next_server)
            .ok()
            .and_then(ObjectId::new)
            .ok_or(TableError::ServerIdsExhausted)?;
        self.insert(Side::Server, id, object)
    }

    pub fn get(&self, id: ObjectId) -> Result<&Object, TableError> {
        match self.slots.get(&id) {
            Some(Slot::Live(object)) => Ok(object),
            Some(Slot::Stale { .. }) => Err(TableError::Stale(id)),
            None => Err(self.missing(id)),
        }
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Result<&mut Object, TableError> {
        let missing = self.missing(id);
        match self.slots.get_mut(&id) {
            Some(Slot::Live(object)) => Ok(object),
            Some(Slot::Stale { .. }) => Err(TableError::Stale(id)),
            None => Err(missing),
        }
    }

    /// Looks up the object behind `handle`; `Stale` once it was destroyed.
    pub fn by_handle(&self, handle: Handle) -> Result<&Object, TableError> {
        match self.get(handle.id()) {
            Ok(object) if object.generation() == handle.generation() => Ok(object),
            Ok(_) | Err(TableError::Stale(_)) => Err(TableError::Stale(handle.id())),
            Err(e) => Err(e),
        }
    }

    /// True while `id` still holds the object stamped with `generation`.
    pub fn is_current(&self, id: ObjectId, generation: u64) -> bool {
        matches!(self.slots.get(&id), Some(Slot::Live(o)) if o.generation() == generation)
    }

    /// Destroys the object at `id`, leaving a stale marker.
    pub fn remove(&mut self, id: ObjectId) -> Result<Object, TableError> {
        match self.slots.get(&id) {
            Some(Slot::Live(_)) => {}
            Some(Slot::Stale { .. }) => return Err(TableError::Stale(id)),
            None => return Err(self.missing(id)),
        }
        let marker = Slot::Stale { acked: id.side() == Side::Server };
        let Some(Slot::Live(object)) = self.slots.insert(id, marker) else {
            return Err(TableError::Stale(id));
        };

        self.live -= 1;
        self.stale.push_back(id);
        self.expire();
        trace!(%id, "removed object");
        Ok(object)
    }

    /// Records that the client knows `id` is gone. Returns false if `id` was
    /// not awaiting acknowledgement.
    pub fn acknowledge(&mut self, id: ObjectId) -> bool {
        let Some(Slot::Stale { acked }) = self.slots.get_mut(&id) else {
            return false;
        };
        if *acked {
            return false;
        }
        *acked = true;
        self.expire();
        true
    }

    /// Removes every live object, highest id first. Stale markers are dropped.
    pub fn drain(&mut self) -> Vec<(ObjectId, Object)> {
        let mut objects: Vec<_> = self
            .slots
            .drain()
            .filter_map(|(id, slot)| match slot {
                Slot::Live(object) => Some((id, object)),
                Slot::Stale { .. } => None,
            })
            .collect();
        objects.sort_by(|a, b| b.0.cmp(&a.0));
        self.stale.clear();
        self.live = 0;
        objects
    }

    pub fn ids(&self) -> impl Iterator<Item = ObjectId> {
        self.slots
            .iter()
            .filter_map(|(id, slot)| matches!(slot, Slot::Live(_)).then_some(*id))
    }

    /// Server ids are handed out in order, so any below the counter existed once.
    fn was_allocated(&self, id: ObjectId) -> bool {
        id.side() == Side::Server && u64::from(id.raw()) < self.next_server
    }

    /// The error for an id with no slot at all.
    fn missing(&self, id: ObjectId) -> TableError {
        if self.was_allocated(id) {
            TableError::Stale(id)
        } else {
            TableError::NotFound(id)
        }
    }

    fn forget_stale(&mut self, id: ObjectId) {
        if let Some(pos) = self.stale.iter().position(|s| *s == id) {
            self.stale.remove(pos);
        }
    }

    /// Drops the oldest acknowledged markers until within capacity.
    fn expire(&mut self) {
        let mut index = 0;
        while self.stale.len() > self.stale_capacity && index < self.stale.len() {
            let id = self.stale[index];
            if matches!(self.slots.get(&id), Some(Slot::Stale { acked: true, .. })) {
                self.slots.remove(&id);
                self.stale.remove(index);
            } else {
                index += 1;
            }
        }
    }
}

impl std::fmt::Debug for ObjectTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectTable")
            .field("live", &self.live)
            .field("stale", &self.stale.len())
            .field("next_server", &self.next_server)
            .finish()
    }
}

/// Resolves request signatures for the decoder.
impl waypack::Resolve for ObjectTable {
    fn resolve(&self, object: ObjectId, opcode: u16) -> waypack::Result<&Signature> {
        let target = self.get(object).map_err(|e| match e {
            TableError::Stale(_) => waypack::Error::StaleObject(object.raw()),
            _ => waypack::Error::UnknownObject(object.raw()),
        })?;
        target
            .interface()
            .method(Direction::Request, opcode)
            .map(|m| &m.signature)
            .ok_or_else(|| waypack::Error::UnknownOpcode {
                interface: target.name().to_owned(),
                opcode,
            })
    }
}
