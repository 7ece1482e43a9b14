use crate::types::ArgKind;

/// Wire codec errors.
///
/// Framing errors describe bytes that cannot be a message at all. Resolution
/// errors come from the caller's `Resolve` implementation. Signature errors
/// describe well-framed bytes that do not fit the resolved signature.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Declared size is below the header size or not word aligned.
    #[error("malformed header: declared size {size} must be at least 8 and a multiple of 4")]
    MalformedHeader { size: u16 },
    /// Message does not fit the size limit.
    #[error("message of {size} bytes exceeds the {limit} byte limit")]
    MessageTooLarge { size: usize, limit: usize },
    /// Arguments did not consume exactly the declared size.
    #[error("size mismatch: header declared {declared} bytes, arguments need {consumed}")]
    SizeMismatch { declared: usize, consumed: usize },
    /// No object has ever held this id (or the id is 0).
    #[error("unknown object {0}")]
    UnknownObject(u32),
    /// The id belonged to an object that was destroyed.
    #[error("object {0} was destroyed")]
    StaleObject(u32),
    /// The interface has no method with this opcode.
    #[error("unknown opcode {opcode} on interface {interface}")]
    UnknownOpcode { interface: String, opcode: u16 },
    /// Argument count does not match the signature.
    #[error("argument count mismatch: expected {expected}, found {found}")]
    ArgumentCount { expected: usize, found: usize },
    /// Argument kind does not match the signature.
    #[error("argument {index}: expected {expected}, found {found}")]
    ArgumentType { index: usize, expected: ArgKind, found: ArgKind },
    /// A null object or string where the signature forbids null.
    #[error("argument {index} is null but is not nullable")]
    NullArgument { index: usize },
    /// A `new_id` carrying id 0.
    #[error("argument {index} is a new_id of 0")]
    InvalidNewId { index: usize },
    /// String length points past the end of the message.
    #[error("string argument {index} of {len} bytes overruns the message")]
    StringOverrun { index: usize, len: u32 },
    /// Array length points past the end of the message.
    #[error("array argument {index} of {len} bytes overruns the message")]
    ArrayOverrun { index: usize, len: u32 },
    /// String is missing its NUL, holds an interior NUL, or is not UTF-8.
    #[error("string argument {index} is not a NUL-terminated UTF-8 string")]
    InvalidString { index: usize },
}

impl Error {
    /// True for errors raised before a signature was known.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Error::MalformedHeader { .. }
                | Error::MessageTooLarge { .. }
                | Error::SizeMismatch { .. }
                | Error::StringOverrun { .. }
                | Error::ArrayOverrun { .. }
                | Error::InvalidString { .. }
        )
    }

    /// True for errors produced while resolving the target object and opcode.
    pub fn is_resolution(&self) -> bool {
        matches!(
            self,
            Error::UnknownObject(_) | Error::StaleObject(_) | Error::UnknownOpcode { .. }
        )
    }
}

/// Specialized `Result` for wire codec operations.
pub type Result<T> = std::result::Result<T, Error>;
