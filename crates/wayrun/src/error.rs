use waypack::ObjectId;
use waypack::Side;
use wayproto::core_protocol::display_error;

use crate::dispatch::SessionState;

/// Object table errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("id {0} is already in use")]
    IdInUse(ObjectId),
    #[error("id {id:#x} is outside the {side:?} id range")]
    IdOutOfRange { id: u32, side: Side },
    /// Destroyed, but the client has not yet been told so.
    #[error("id {0} was destroyed and its deletion is not yet acknowledged")]
    IdNotReleased(ObjectId),
    #[error("no object with id {0}")]
    NotFound(ObjectId),
    #[error("object {0} was destroyed")]
    Stale(ObjectId),
    #[error("server id range exhausted")]
    ServerIdsExhausted,
    #[error("object {0} already has an implementation")]
    AlreadyBound(ObjectId),
    #[error("object {0} lives as long as the connection")]
    Permanent(ObjectId),
}

/// The class of a protocol violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Bytes that cannot form a message.
    Framing,
    /// Unknown or destroyed object, unknown opcode or interface.
    Resolution,
    /// Arguments that do not fit the method.
    Signature,
    /// An id the client may not allocate.
    Allocation,
    /// The server has nothing to handle the request with.
    Implementation,
}

/// A fatal violation by the client. The session stops reading after one.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error(transparent)]
    Wire(#[from] waypack::Error),
    #[error(transparent)]
    Registry(#[from] wayproto::Error),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error("{interface}.{request} needs version {since}, object {object} is version {version}")]
    VersionGated { object: ObjectId, interface: String, request: String, since: u32, version: u32 },
    #[error("argument {index} must be a {expected}, object is a {found}")]
    InterfaceMismatch { index: usize, expected: String, found: String },
    #[error("object {object} ({interface}) has no implementation")]
    Unimplemented { object: ObjectId, interface: String },
    #[error("more than {limit} bytes of undecoded input")]
    InboundOverflow { limit: usize },
    #[error("more than {limit} descriptors waiting to be claimed")]
    FdOverflow { limit: usize },
}

impl ProtocolError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            ProtocolError::Wire(e) if e.is_framing() => ErrorCategory::Framing,
            ProtocolError::Wire(e) if e.is_resolution() => ErrorCategory::Resolution,
            ProtocolError::Wire(_) => ErrorCategory::Signature,
            ProtocolError::Registry(_) => ErrorCategory::Resolution,
            ProtocolError::Table(_) => ErrorCategory::Allocation,
            ProtocolError::VersionGated { .. } | ProtocolError::InterfaceMismatch { .. } => {
                ErrorCategory::Signature
            }
            ProtocolError::Unimplemented { .. } => ErrorCategory::Implementation,
            ProtocolError::InboundOverflow { .. } | ProtocolError::FdOverflow { .. } => {
                ErrorCategory::Framing
            }
        }
    }

    /// The `wl_display.error` code reported to the client.
    pub fn code(&self) -> u32 {
        match self {
            ProtocolError::Wire(
                waypack::Error::UnknownObject(_) | waypack::Error::StaleObject(_),
            ) => display_error::INVALID_OBJECT,
            ProtocolError::Wire(waypack::Error::UnknownOpcode { .. }) => {
                display_error::INVALID_METHOD
            }
            ProtocolError::InboundOverflow { .. } | ProtocolError::FdOverflow { .. } => {
                display_error::NO_MEMORY
            }
            _ => match self.category() {
                ErrorCategory::Resolution | ErrorCategory::Allocation => {
                    display_error::INVALID_OBJECT
                }
                ErrorCategory::Framing | ErrorCategory::Signature => display_error::INVALID_METHOD,
                ErrorCategory::Implementation => display_error::IMPLEMENTATION,
            },
        }
    }
}

/// Maps a failed lookup of a referenced object to the matching wire error.
pub(crate) fn resolution_error(error: TableError) -> ProtocolError {
    match error {
        TableError::NotFound(id) => waypack::Error::UnknownObject(id.raw()).into(),
        TableError::Stale(id) => waypack::Error::StaleObject(id.raw()).into(),
        other => other.into(),
    }
}

/// Errors of server-side object operations: posting events, binding,
/// creating and destroying objects.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ObjectError {
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Registry(#[from] wayproto::Error),
    #[error(transparent)]
    Wire(#[from] waypack::Error),
    #[error("{interface}.{event} needs version {since}, object {object} is version {version}")]
    VersionGated { object: ObjectId, interface: String, event: String, since: u32, version: u32 },
    #[error("session is {0}")]
    NotOpen(SessionState),
}

/// Errors returned to whoever feeds a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("session is {0}")]
    NotOpen(SessionState),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// A non-fatal error raised by a handler.
///
/// It reaches the client as `wl_display.error` on the request's object;
/// the session stays open.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message} (code {code})")]
pub struct AppError {
    pub code: u32,
    pub message: String,
}

impl AppError {
    pub fn new(code: u32, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn implementation(message: impl Into<String>) -> Self {
        Self::new(display_error::IMPLEMENTATION, message)
    }
}

impl From<ObjectError> for AppError {
    fn from(error: ObjectError) -> Self {
        AppError::implementation(error.to_string())
    }
}
