//! # Dispatcher
//!
//! Routes decoded requests to handlers and serializes the events they emit.
//!
//! ## Invariants
//!
//! - Requests are handled in arrival order, one at a time.
//! - Events leave in the order they were queued; a handler's events follow
//!   every event queued before its request.
//! - Once the session stops being `Open`, nothing more is dispatched or
//!   queued. A protocol error queues `wl_display.error` first.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use tracing::debug;
use tracing::trace;
use tracing::warn;
use waypack::Arg;
use waypack::ArgSpec;
use waypack::Encoder;
use waypack::HEADER_SIZE;
use waypack::Message;
use waypack::ObjectId;
use waypack::Side;
use waypack::Signature;
use wayproto::core_protocol::display;
use wayproto::core_protocol::registry;
use wayproto::core_protocol::WL_REGISTRY;
use wayproto::Direction;
use wayproto::InterfaceDef;
use wayproto::Registry;

use crate::client::ClientId;
use crate::config::SessionConfig;
use crate::error::resolution_error;
use crate::error::AppError;
use crate::error::ObjectError;
use crate::error::ProtocolError;
use crate::error::TableError;
use crate::global::Globals;
use crate::handler::Context;
use crate::handler::Handler;
use crate::handler::Request;
use crate::object::Handle;
use crate::object::Object;
use crate::table::ObjectTable;

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Requests are dispatched, events queued.
    Open,
    /// Stopped; already queued events still wait to be drained.
    Closing,
    /// Drained. Nothing more happens.
    Closed,
}

impl SessionState {
    pub fn is_open(self) -> bool {
        self == SessionState::Open
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Open => f.write_str("open"),
            SessionState::Closing => f.write_str("closing"),
            SessionState::Closed => f.write_str("closed"),
        }
    }
}

/// Per-connection dispatch state: the objects, the outbound queue and the
/// lifecycle.
pub struct Dispatcher {
    client: ClientId,
    registry: Arc<Registry>,
    globals: Arc<Globals>,
    pub(crate) table: ObjectTable,
    outbound: Encoder,
    /// Client ids whose `delete_id` sits in the outbound queue.
    pending_acks: Vec<ObjectId>,
    state: SessionState,
    serial: u32,
}

impl Dispatcher {
    pub(crate) fn new(
        client: ClientId,
        registry: Arc<Registry>,
        globals: Arc<Globals>,
        config: &SessionConfig,
    ) -> Result<Self, ObjectError> {
        let mut table = ObjectTable::new(config.stale_id_capacity);
        let root = registry.lookup(wayproto::core_protocol::WL_DISPLAY, 1)?;
        let display = Object::new(root, 1).with_handler(crate::core_handlers::DisplayHandler);
        table.insert(Side::Client, ObjectId::DISPLAY, display)?;

        Ok(Self {
            client,
            registry,
            globals,
            table,
            outbound: Encoder::with_limit(config.max_message_size),
            pending_acks: Vec::new(),
            state: SessionState::Open,
            serial: 0,
        })
    }

    pub fn client(&self) -> ClientId {
        self.client
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn globals(&self) -> Arc<Globals> {
        Arc::clone(&self.globals)
    }

    pub fn table(&self) -> &ObjectTable {
        &self.table
    }

    pub fn next_serial(&mut self) -> u32 {
        self.serial = self.serial.wrapping_add(1);
        self.serial
    }

    fn ensure_open(&self) -> Result<(), ObjectError> {
        match self.state {
            SessionState::Open => Ok(()),
            state => Err(ObjectError::NotOpen(state)),
        }
    }

    // ========================================================================
    //  INBOUND
    // ========================================================================

    /// Handles one request.
    ///
    /// Checks run in order: target object, opcode, version, arguments, new
    /// object allocation. Only then is the handler invoked. An `Err` is a
    /// protocol violation; the caller ends the session with it.
    pub fn dispatch_inbound(&mut self, message: Message) -> Result<(), ProtocolError> {
        let Message { object: id, opcode, args } = message;

        let (interface, version, generation) = {
            let object = self.table.get(id).map_err(resolution_error)?;
            (Arc::clone(object.interface()), object.version(), object.generation())
        };
        let method = interface.method(Direction::Request, opcode).ok_or_else(|| {
            waypack::Error::UnknownOpcode { interface: interface.name.clone(), opcode }
        })?;
        if method.since > version {
            return Err(ProtocolError::VersionGated {
                object: id,
                interface: interface.name.clone(),
                request: method.name.clone(),
                since: method.since,
                version,
            });
        }
        method.signature.check(&args)?;
        self.check_object_args(&method.signature, &args)?;
        if let Some((index, spec)) = method.signature.new_id() {
            self.create_from_request(index, spec, &args[index], version)?;
        }

        trace!(object = %id, interface = %interface.name, request = %method.name, "dispatching");
        let destructor = method.destructor;
        let handler = self.table.get_mut(id).ok().and_then(|o| o.handler.take());
        match handler {
            Some(handler) => {
                let interface = Arc::clone(&interface);
                let request = Request { object: id, opcode, version, interface, args };
                self.invoke(id, generation, handler, request);
            }
            None if destructor => {}
            None => {
                return Err(ProtocolError::Unimplemented {
                    object: id,
                    interface: interface.name.clone(),
                });
            }
        }

        if destructor && self.state.is_open() && self.table.is_current(id, generation) {
            if let Err(error) = self.destroy(id) {
                debug!(object = %id, %error, "destructor left object in place");
            }
        }
        Ok(())
    }

    fn invoke(
        &mut self,
        id: ObjectId,
        generation: u64,
        mut handler: Box<dyn Handler>,
        request: Request,
    ) {
        let result = handler.request(&mut Context::new(self, id), request);

        match self.table.get_mut(id) {
            Ok(object) if object.generation() == generation && object.handler.is_none() => {
                object.handler = Some(handler);
            }
            _ => handler.destroyed(id),
        }

        if let Err(error) = result {
            self.post_app_error(id, error);
        }
    }

    fn post_app_error(&mut self, id: ObjectId, error: AppError) {
        warn!(
            client = %self.client,
            object = %id,
            code = error.code,
            message = %error.message,
            "application error"
        );
        if let Err(e) = self.queue_error(id, error.code, &error.message) {
            debug!(error = %e, "dropped application error");
        }
    }

    /// Queues `wl_display.error`, cutting `message` short so the event fits
    /// within the message size limit.
    fn queue_error(
        &mut self,
        object: ObjectId,
        code: u32,
        message: &str,
    ) -> Result<(), ObjectError> {
        // Header, then the object, code and string length words.
        let fixed_part = HEADER_SIZE + 12;
        let room = (self.outbound.limit().saturating_sub(fixed_part) & !3).saturating_sub(1);
        let mut end = message.len().min(room);
        while !message.is_char_boundary(end) {
            end -= 1;
        }
        if end < message.len() {
            debug!(%object, len = message.len(), kept = end, "truncated error message");
        }
        let text = message[..end].replace('\0', " ");
        let args = vec![Arg::Object(Some(object)), Arg::Uint(code), Arg::string(text)];
        self.queue_outbound(ObjectId::DISPLAY, display::ERROR, args)
    }

    /// Object arguments must name live objects of the declared interface.
    fn check_object_args(
        &self,
        signature: &Signature,
        args: &[Arg],
    ) -> Result<(), ProtocolError> {
        for (index, (spec, arg)) in signature.args().iter().zip(args).enumerate() {
            let Arg::Object(Some(target)) = arg else {
                continue;
            };
            let object = self.table.get(*target).map_err(resolution_error)?;
            if let Some(expected) = spec.interface.as_deref() {
                if object.name() != expected {
                    return Err(ProtocolError::InterfaceMismatch {
                        index,
                        expected: expected.to_owned(),
                        found: object.name().to_owned(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Inserts the object a request creates, unbound.
    ///
    /// A typed `new_id` inherits the parent's version, capped at what its
    /// interface provides. A generic one names interface and version itself.
    fn create_from_request(
        &mut self,
        index: usize,
        spec: &ArgSpec,
        arg: &Arg,
        parent_version: u32,
    ) -> Result<(), ProtocolError> {
        let (id, def, version) = match (arg, spec.interface.as_deref()) {
            (Arg::NewId(id), Some(name)) => {
                let max = self.registry.get(name).map_or(parent_version, |d| d.version);
                let version = parent_version.min(max);
                (*id, self.registry.lookup(name, version)?, version)
            }
            (Arg::GenericNewId { interface, version, id }, None) => {
                (*id, self.registry.lookup(interface, *version)?, *version)
            }
            (arg, _) => {
                return Err(waypack::Error::ArgumentType {
                    index,
                    expected: spec.kind,
                    found: arg.kind(),
                }
                .into());
            }
        };
        debug!(client = %self.client, %id, interface = %def.name, version, "created object");
        self.table.insert(Side::Client, id, Object::new(def, version))?;
        Ok(())
    }

    // ========================================================================
    //  OBJECTS
    // ========================================================================

    pub fn bind(
        &mut self,
        id: ObjectId,
        handler: Box<dyn Handler>,
    ) -> Result<Handle, ObjectError> {
        self.ensure_open()?;
        let object = self.table.get_mut(id)?;
        if object.is_bound() {
            return Err(TableError::AlreadyBound(id).into());
        }
        object.handler = Some(handler);
        Ok(Handle::new(id, object.generation()))
    }

    pub fn create_object(&mut self, interface: &str, version: u32) -> Result<Handle, ObjectError> {
        self.ensure_open()?;
        let def = self.registry.lookup(interface, version)?;
        let handle = self.table.allocate_server(Object::new(def, version))?;
        debug!(
            client = %self.client,
            id = %handle.id(),
            interface,
            version,
            "created server object"
        );
        Ok(handle)
    }

    /// Withdraws global `name` from this connection and announces it on
    /// every `wl_registry`. Returns false if the name was not advertised.
    pub fn remove_global(&mut self, name: u32) -> Result<bool, ObjectError> {
        self.ensure_open()?;
        if Arc::make_mut(&mut self.globals).remove(name).is_none() {
            return Ok(false);
        }
        let mut registries: Vec<ObjectId> = self
            .table
            .ids()
            .filter(|id| self.table.get(*id).is_ok_and(|o| o.name() == WL_REGISTRY))
            .collect();
        registries.sort();
        for id in registries {
            self.queue_outbound(id, registry::GLOBAL_REMOVE, vec![Arg::Uint(name)])?;
        }
        debug!(client = %self.client, name, "removed global");
        Ok(true)
    }

    /// Destroys `id` and tells the client, if the client allocated it.
    pub fn destroy(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        self.ensure_open()?;
        if id == ObjectId::DISPLAY {
            return Err(TableError::Permanent(id).into());
        }
        let mut object = self.table.remove(id)?;
        if id.side() == Side::Client {
            let args = vec![Arg::Uint(id.raw())];
            self.outbound.encode(Message::new(ObjectId::DISPLAY, display::DELETE_ID, args))?;
            self.pending_acks.push(id);
        }
        debug!(client = %self.client, %id, interface = object.name(), "destroyed object");
        if let Some(mut handler) = object.handler.take() {
            handler.destroyed(id);
        }
        Ok(())
    }

    // ========================================================================
    //  OUTBOUND
    // ========================================================================

    /// Appends an event for `object` to the outbound queue.
    ///
    /// Destructor events destroy their object once queued.
    pub fn queue_outbound(
        &mut self,
        object: ObjectId,
        opcode: u16,
        args: Vec<Arg>,
    ) -> Result<(), ObjectError> {
        self.ensure_open()?;
        let (interface, version) = {
            let target = self.table.get(object)?;
            (Arc::clone(target.interface()), target.version())
        };
        let method = event_def(&interface, opcode)?;
        if method.since > version {
            return Err(ObjectError::VersionGated {
                object,
                interface: interface.name.clone(),
                event: method.name.clone(),
                since: method.since,
                version,
            });
        }
        method.signature.check(&args)?;
        self.outbound.encode(Message::new(object, opcode, args))?;
        trace!(%object, interface = %interface.name, event = %method.name, "queued event");

        if method.destructor {
            self.destroy(object)?;
        }
        Ok(())
    }

    /// Hands over queued bytes. Deletions they carry count as acknowledged.
    pub(crate) fn take_outbound(&mut self) -> Vec<u8> {
        let bytes = self.outbound.take_bytes();
        for id in self.pending_acks.drain(..) {
            self.table.acknowledge(id);
        }
        if self.state == SessionState::Closing {
            self.state = SessionState::Closed;
            debug!(client = %self.client, "session closed");
        }
        bytes
    }

    pub(crate) fn take_outbound_fds(&mut self) -> Vec<OwnedFd> {
        self.outbound.take_fds()
    }

    pub(crate) fn has_outbound(&self) -> bool {
        !self.outbound.is_empty()
    }

    // ========================================================================
    //  LIFECYCLE
    // ========================================================================

    /// Reports a protocol violation and stops the session.
    pub(crate) fn fail(&mut self, error: &ProtocolError, object: ObjectId) {
        warn!(
            client = %self.client,
            %object,
            code = error.code(),
            category = ?error.category(),
            %error,
            "protocol error"
        );
        if let Err(e) = self.queue_error(object, error.code(), &error.to_string()) {
            debug!(error = %e, "could not queue protocol error");
        }
        self.close();
    }

    /// Stops dispatching and tears down every object. Idempotent.
    pub fn close(&mut self) {
        if !self.state.is_open() {
            return;
        }
        self.state = SessionState::Closing;
        self.pending_acks.clear();
        for (id, mut object) in self.table.drain() {
            if let Some(mut handler) = object.handler.take() {
                handler.destroyed(id);
            }
        }
        debug!(client = %self.client, "session closing");
    }
}

fn event_def(interface: &InterfaceDef, opcode: u16) -> Result<&wayproto::MethodDef, ObjectError> {
    interface.method(Direction::Event, opcode).ok_or_else(|| {
        wayproto::Error::OpcodeNotFound {
            interface: interface.name.clone(),
            direction: Direction::Event,
            opcode,
        }
        .into()
    })
}
