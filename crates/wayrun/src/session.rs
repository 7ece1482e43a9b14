//! # Connection session
//!
//! One client connection, driven entirely by its owner: bytes and
//! descriptors go in through `feed`, encoded events come out of
//! `drain_outbound`. The session never touches a socket.
//!
//! ## Invariants
//!
//! - Input is consumed whole messages at a time. A partial message stays
//!   buffered until the rest arrives.
//! - The first protocol error queues `wl_display.error`, drops all buffered
//!   input and moves the session to `Closing`.
//! - `Closing` becomes `Closed` when the remaining output has been drained.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use tracing::debug;
use tracing::debug_span;
use waypack::decode_message;
use waypack::peek_header;
use waypack::Arg;
use waypack::Decoded;
use waypack::FdQueue;
use waypack::Message;
use waypack::ObjectId;
use wayproto::Registry;

use crate::client::ClientId;
use crate::config::SessionConfig;
use crate::dispatch::Dispatcher;
use crate::dispatch::SessionState;
use crate::error::ObjectError;
use crate::error::ProtocolError;
use crate::error::SessionError;
use crate::global::Globals;
use crate::handler::Handler;
use crate::object::Handle;
use crate::table::ObjectTable;

pub struct Session {
    config: SessionConfig,
    inbound: Vec<u8>,
    fds: FdQueue,
    dispatcher: Dispatcher,
}

impl Session {
    /// Opens a session whose only object is `wl_display`.
    ///
    /// `registry` must contain the core interfaces.
    pub fn new(
        registry: Arc<Registry>,
        globals: Arc<Globals>,
        config: SessionConfig,
    ) -> Result<Self, ObjectError> {
        let client = ClientId::next();
        let dispatcher = Dispatcher::new(client, registry, globals, &config)?;
        debug!(%client, "session opened");
        Ok(Self { config, inbound: Vec::new(), fds: FdQueue::new(), dispatcher })
    }

    pub fn client_id(&self) -> ClientId {
        self.dispatcher.client()
    }

    pub fn state(&self) -> SessionState {
        self.dispatcher.state()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn objects(&self) -> &ObjectTable {
        self.dispatcher.table()
    }

    pub fn object_count(&self) -> usize {
        self.dispatcher.table().len()
    }

    /// Bytes received but not yet part of a complete message.
    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    pub fn pending_fds(&self) -> usize {
        self.fds.len()
    }

    fn ensure_open(&self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Open => Ok(()),
            state => Err(SessionError::NotOpen(state)),
        }
    }

    // ========================================================================
    //  INBOUND
    // ========================================================================

    /// Appends received bytes and dispatches every complete message.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<(), SessionError> {
        self.ensure_open()?;
        let _span = debug_span!("feed", client = %self.client_id(), bytes = bytes.len()).entered();

        self.inbound.extend_from_slice(bytes);
        self.process()
    }

    /// Queues descriptors received alongside the byte stream.
    ///
    /// Messages waiting for descriptors are dispatched once enough arrive.
    pub fn feed_fds(&mut self, fds: impl IntoIterator<Item = OwnedFd>) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.fds.extend(fds);
        if self.fds.len() > self.config.max_queued_fds {
            let error = ProtocolError::FdOverflow { limit: self.config.max_queued_fds };
            return Err(self.fail(error, ObjectId::DISPLAY));
        }
        self.process()
    }

    /// Dispatches an already decoded request.
    pub fn dispatch(&mut self, message: Message) -> Result<(), SessionError> {
        self.ensure_open()?;
        let target = message.object;
        match self.dispatcher.dispatch_inbound(message) {
            Ok(()) => Ok(()),
            Err(error) => Err(self.fail(error, target)),
        }
    }

    fn process(&mut self) -> Result<(), SessionError> {
        let mut offset = 0;
        let outcome = loop {
            if !self.dispatcher.state().is_open() {
                break Ok(());
            }
            let buf = &self.inbound[offset..];
            match peek_header(buf) {
                Ok(Some(header)) if header.byte_len() > self.config.max_message_size => {
                    let error = waypack::Error::MessageTooLarge {
                        size: header.byte_len(),
                        limit: self.config.max_message_size,
                    };
                    let target = ObjectId::new(header.object).unwrap_or(ObjectId::DISPLAY);
                    break Err((error.into(), target));
                }
                Ok(_) => {}
                Err(error) => break Err((error.into(), ObjectId::DISPLAY)),
            }

            match decode_message(buf, &mut self.fds, &self.dispatcher.table) {
                Ok(Decoded::Incomplete) => break Ok(()),
                Ok(Decoded::Message { message, consumed }) => {
                    offset += consumed;
                    let target = message.object;
                    if let Err(error) = self.dispatcher.dispatch_inbound(message) {
                        break Err((error, target));
                    }
                }
                Err(error) => {
                    let target = peek_header(buf)
                        .ok()
                        .flatten()
                        .and_then(|h| ObjectId::new(h.object))
                        .unwrap_or(ObjectId::DISPLAY);
                    break Err((error.into(), target));
                }
            }
        };

        match outcome {
            Ok(()) if self.dispatcher.state().is_open() => {
                self.inbound.drain(..offset);
                if self.inbound.len() > self.config.max_inbound_bytes {
                    let limit = self.config.max_inbound_bytes;
                    let error = ProtocolError::InboundOverflow { limit };
                    return Err(self.fail(error, ObjectId::DISPLAY));
                }
                Ok(())
            }
            Ok(()) => {
                // A handler closed the session; the rest is never dispatched.
                self.inbound.clear();
                self.fds.clear();
                Ok(())
            }
            Err((error, target)) => Err(self.fail(error, target)),
        }
    }

    fn fail(&mut self, error: ProtocolError, target: ObjectId) -> SessionError {
        self.inbound.clear();
        self.fds.clear();
        self.dispatcher.fail(&error, target);
        error.into()
    }

    // ========================================================================
    //  OUTBOUND
    // ========================================================================

    /// Takes every queued event, in order.
    ///
    /// Deletions carried by the returned bytes count as acknowledged. In
    /// `Closing`, this is the last output and the session becomes `Closed`.
    pub fn drain_outbound(&mut self) -> Vec<u8> {
        self.dispatcher.take_outbound()
    }

    /// Takes the descriptors that go with the drained bytes.
    pub fn take_outbound_fds(&mut self) -> Vec<OwnedFd> {
        self.dispatcher.take_outbound_fds()
    }

    pub fn has_outbound(&self) -> bool {
        self.dispatcher.has_outbound()
    }

    // ========================================================================
    //  SERVER-SIDE OBJECTS
    // ========================================================================

    /// Queues an event for the object behind `handle`.
    pub fn post_event(
        &mut self,
        handle: Handle,
        opcode: u16,
        args: Vec<Arg>,
    ) -> Result<(), ObjectError> {
        self.dispatcher.table().by_handle(handle)?;
        self.dispatcher.queue_outbound(handle.id(), opcode, args)
    }

    /// Creates a server-allocated object.
    pub fn create_object(&mut self, interface: &str, version: u32) -> Result<Handle, ObjectError> {
        self.dispatcher.create_object(interface, version)
    }

    pub fn bind(
        &mut self,
        handle: Handle,
        handler: impl Handler + 'static,
    ) -> Result<Handle, ObjectError> {
        self.dispatcher.table().by_handle(handle)?;
        self.dispatcher.bind(handle.id(), Box::new(handler))
    }

    pub fn destroy(&mut self, handle: Handle) -> Result<(), ObjectError> {
        self.dispatcher.table().by_handle(handle)?;
        self.dispatcher.destroy(handle.id())
    }

    /// Withdraws a global from this connection and sends
    /// `wl_registry.global_remove` on every registry the client holds.
    ///
    /// Binding the name afterwards fails without closing the session.
    pub fn remove_global(&mut self, name: u32) -> Result<bool, ObjectError> {
        self.dispatcher.remove_global(name)
    }

    /// Moves to `Closing` and tears down every object. Idempotent.
    pub fn close(&mut self) {
        self.inbound.clear();
        self.fds.clear();
        self.dispatcher.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("client", &self.client_id())
            .field("state", &self.state())
            .field("objects", &self.object_count())
            .field("pending_inbound", &self.inbound.len())
            .finish()
    }
}
