use crate::interface::Direction;

/// Registry and protocol description errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No interface with this name was registered.
    #[error("interface {0} is not registered")]
    InterfaceNotFound(String),
    /// Requested version is 0 or above what the interface provides.
    #[error("interface {interface} does not support version {version} (highest is {max})")]
    VersionUnsupported { interface: String, version: u32, max: u32 },
    /// The interface has no request or event with this opcode.
    #[error("interface {interface} has no {direction} with opcode {opcode}")]
    OpcodeNotFound { interface: String, direction: Direction, opcode: u16 },
    /// Two definitions share one name.
    #[error("interface {0} is defined twice")]
    DuplicateInterface(String),
    /// An `object` or `new_id` argument names an interface nobody registered.
    #[error("{interface}.{method} argument {arg} references unknown interface {target}")]
    UnknownInterfaceReference { interface: String, method: String, arg: String, target: String },
    /// A definition that cannot be dispatched against.
    #[error("interface {interface} is invalid: {reason}")]
    InvalidInterface { interface: String, reason: String },
    /// The XML description could not be read.
    #[error("invalid protocol description: {0}")]
    Xml(String),
}

/// Specialized `Result` for registry operations.
pub type Result<T> = std::result::Result<T, Error>;
