//! Handlers implement objects; the context is what they act through.

use std::os::fd::OwnedFd;
use std::sync::Arc;

use waypack::Arg;
use waypack::ObjectId;
use wayproto::Direction;
use wayproto::InterfaceDef;
use wayproto::Registry;

use crate::client::ClientId;
use crate::dispatch::Dispatcher;
use crate::error::AppError;
use crate::error::ObjectError;
use crate::error::TableError;
use crate::global::Globals;
use crate::object::Handle;

/// Implementation of one object.
///
/// A handler runs on the session's thread with exclusive access to its own
/// state. Returning an `AppError` reports a non-fatal error to the client.
pub trait Handler: Send {
    fn request(&mut self, ctx: &mut Context<'_>, request: Request) -> Result<(), AppError>;

    /// The object is gone, either destroyed or torn down with its connection.
    fn destroyed(&mut self, _object: ObjectId) {}
}

/// A decoded request, checked against its interface.
#[derive(Debug)]
pub struct Request {
    pub object: ObjectId,
    pub opcode: u16,
    /// Version the target object is bound at.
    pub version: u32,
    pub interface: Arc<InterfaceDef>,
    pub args: Vec<Arg>,
}

impl Request {
    pub fn name(&self) -> &str {
        self.interface
            .method(Direction::Request, self.opcode)
            .map_or("", |m| m.name.as_str())
    }

    pub fn arg(&self, index: usize) -> Option<&Arg> {
        self.args.get(index)
    }

    /// Takes the descriptor at `index`, leaving nothing behind.
    pub fn take_fd(&mut self, index: usize) -> Option<OwnedFd> {
        match self.args.get(index) {
            Some(Arg::Fd(_)) => self.args.remove(index).into_fd(),
            _ => None,
        }
    }

    fn missing(&self, index: usize, what: &str) -> AppError {
        AppError::implementation(format!(
            "{}.{} argument {index} is not {what}",
            self.interface.name,
            self.name()
        ))
    }

    pub fn uint(&self, index: usize) -> Result<u32, AppError> {
        self.arg(index).and_then(Arg::as_uint).ok_or_else(|| self.missing(index, "a uint"))
    }

    pub fn int(&self, index: usize) -> Result<i32, AppError> {
        self.arg(index).and_then(Arg::as_int).ok_or_else(|| self.missing(index, "an int"))
    }

    pub fn new_id(&self, index: usize) -> Result<ObjectId, AppError> {
        self.arg(index).and_then(Arg::as_new_id).ok_or_else(|| self.missing(index, "a new_id"))
    }
}

/// Wraps a closure as a `Handler`.
pub struct FnHandler<F>(F);

/// Builds a handler from `f`.
pub fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: FnMut(&mut Context<'_>, Request) -> Result<(), AppError> + Send,
{
    FnHandler(f)
}

impl<F> Handler for FnHandler<F>
where
    F: FnMut(&mut Context<'_>, Request) -> Result<(), AppError> + Send,
{
    fn request(&mut self, ctx: &mut Context<'_>, request: Request) -> Result<(), AppError> {
        (self.0)(ctx, request)
    }
}

/// What a handler can do while it handles a request.
pub struct Context<'a> {
    dispatcher: &'a mut Dispatcher,
    object: ObjectId,
}

impl<'a> Context<'a> {
    pub(crate) fn new(dispatcher: &'a mut Dispatcher, object: ObjectId) -> Self {
        Self { dispatcher, object }
    }

    /// The object the current request was sent to.
    pub fn object(&self) -> ObjectId {
        self.object
    }

    pub fn client(&self) -> ClientId {
        self.dispatcher.client()
    }

    pub fn registry(&self) -> &Registry {
        self.dispatcher.registry()
    }

    pub fn globals(&self) -> Arc<Globals> {
        self.dispatcher.globals()
    }

    /// Queues an event, after every event queued before it.
    pub fn post_event(
        &mut self,
        object: ObjectId,
        opcode: u16,
        args: Vec<Arg>,
    ) -> Result<(), ObjectError> {
        self.dispatcher.queue_outbound(object, opcode, args)
    }

    /// Installs the implementation of an object created by this request.
    pub fn bind(
        &mut self,
        id: ObjectId,
        handler: impl Handler + 'static,
    ) -> Result<Handle, ObjectError> {
        self.bind_boxed(id, Box::new(handler))
    }

    pub fn bind_boxed(
        &mut self,
        id: ObjectId,
        handler: Box<dyn Handler>,
    ) -> Result<Handle, ObjectError> {
        if id == self.object {
            return Err(TableError::AlreadyBound(id).into());
        }
        self.dispatcher.bind(id, handler)
    }

    /// Creates a server-side object, to be announced through a `new_id` event.
    pub fn create_object(&mut self, interface: &str, version: u32) -> Result<Handle, ObjectError> {
        self.dispatcher.create_object(interface, version)
    }

    /// Destroys `id`. Client ids are released with `wl_display.delete_id`.
    pub fn destroy(&mut self, id: ObjectId) -> Result<(), ObjectError> {
        self.dispatcher.destroy(id)
    }

    pub fn next_serial(&mut self) -> u32 {
        self.dispatcher.next_serial()
    }

    /// Stops the session once the current request returns.
    pub fn close(&mut self) {
        self.dispatcher.close();
    }

    pub fn is_open(&self) -> bool {
        self.dispatcher.state().is_open()
    }
}
