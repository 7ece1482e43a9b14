use std::os::fd::AsRawFd;
use std::os::fd::OwnedFd;

use crate::error::Error;
use crate::error::Result;
use crate::fixed::Fixed;

/// Bytes in a message header.
pub const HEADER_SIZE: usize = 8;

/// Largest size the 16-bit size field can declare while staying word aligned.
pub const MAX_MESSAGE_SIZE: usize = 0xFFFC;

// ============================================================================
//  OBJECT IDS
// ============================================================================

/// Which peer allocates an id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// `1..=0xFEFFFFFF`
    Client,
    /// `0xFF000000..=0xFFFFFFFF`
    Server,
}

impl Side {
    pub const fn contains(self, raw: u32) -> bool {
        match self {
            Side::Client => raw != 0 && raw < ObjectId::SERVER_MIN,
            Side::Server => raw >= ObjectId::SERVER_MIN,
        }
    }
}

/// Non-zero id of a protocol object within one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u32);

impl ObjectId {
    /// The root object every connection starts with.
    pub const DISPLAY: ObjectId = ObjectId(1);
    pub const SERVER_MIN: u32 = 0xFF00_0000;

    /// Returns `None` for 0, the null id.
    pub const fn new(raw: u32) -> Option<Self> {
        if raw == 0 { None } else { Some(Self(raw)) }
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn side(self) -> Side {
        if self.0 >= Self::SERVER_MIN {
            Side::Server
        } else {
            Side::Client
        }
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
//  SIGNATURES
// ============================================================================

/// Wire kind of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Int,
    Uint,
    Fixed,
    String,
    Object,
    NewId,
    Array,
    Fd,
}

impl ArgKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ArgKind::Int => "int",
            ArgKind::Uint => "uint",
            ArgKind::Fixed => "fixed",
            ArgKind::String => "string",
            ArgKind::Object => "object",
            ArgKind::NewId => "new_id",
            ArgKind::Array => "array",
            ArgKind::Fd => "fd",
        }
    }
}

impl std::fmt::Display for ArgKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared argument of a request or event.
///
/// For `Object` and `NewId`, `interface` names the expected interface. A
/// `NewId` without an interface is generic: the wire carries the interface
/// name and version in front of the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: String,
    pub kind: ArgKind,
    pub interface: Option<String>,
    pub nullable: bool,
}

impl ArgSpec {
    pub fn new(name: impl Into<String>, kind: ArgKind) -> Self {
        Self { name: name.into(), kind, interface: None, nullable: false }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ArgKind::Int)
    }

    pub fn uint(name: impl Into<String>) -> Self {
        Self::new(name, ArgKind::Uint)
    }

    pub fn fixed(name: impl Into<String>) -> Self {
        Self::new(name, ArgKind::Fixed)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ArgKind::String)
    }

    pub fn array(name: impl Into<String>) -> Self {
        Self::new(name, ArgKind::Array)
    }

    pub fn fd(name: impl Into<String>) -> Self {
        Self::new(name, ArgKind::Fd)
    }

    pub fn object(name: impl Into<String>, interface: Option<&str>) -> Self {
        Self { interface: interface.map(str::to_owned), ..Self::new(name, ArgKind::Object) }
    }

    pub fn new_id(name: impl Into<String>, interface: Option<&str>) -> Self {
        Self { interface: interface.map(str::to_owned), ..Self::new(name, ArgKind::NewId) }
    }

    /// Marks an object or string argument as accepting null.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// A `new_id` whose interface travels on the wire.
    pub fn is_generic_new_id(&self) -> bool {
        self.kind == ArgKind::NewId && self.interface.is_none()
    }
}

/// Ordered argument list of one request or event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Signature {
    args: Vec<ArgSpec>,
}

impl Signature {
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Descriptors a message of this signature claims from the fd queue.
    pub fn fd_count(&self) -> usize {
        self.args.iter().filter(|a| a.kind == ArgKind::Fd).count()
    }

    /// Position and spec of the `new_id` argument, if any.
    pub fn new_id(&self) -> Option<(usize, &ArgSpec)> {
        self.args.iter().enumerate().find(|(_, a)| a.kind == ArgKind::NewId)
    }

    /// Checks that `args` match this signature in count, kind and nullability,
    /// and that no string carries an interior NUL.
    pub fn check(&self, args: &[Arg]) -> Result<()> {
        if args.len() != self.args.len() {
            return Err(Error::ArgumentCount { expected: self.args.len(), found: args.len() });
        }

        for (index, (spec, arg)) in self.args.iter().zip(args).enumerate() {
            let shape_ok = match (spec.kind, arg) {
                (ArgKind::NewId, Arg::NewId(_)) => spec.interface.is_some(),
                (ArgKind::NewId, Arg::GenericNewId { .. }) => spec.interface.is_none(),
                (kind, arg) => kind == arg.kind(),
            };
            if !shape_ok {
                return Err(Error::ArgumentType { index, expected: spec.kind, found: arg.kind() });
            }
            if arg.is_null() && !spec.nullable {
                return Err(Error::NullArgument { index });
            }
            let text = match arg {
                Arg::Str(Some(s)) => Some(s.as_str()),
                Arg::GenericNewId { interface, .. } => Some(interface.as_str()),
                _ => None,
            };
            if text.is_some_and(|s| s.contains('\0')) {
                return Err(Error::InvalidString { index });
            }
        }
        Ok(())
    }
}

// ============================================================================
//  MESSAGES
// ============================================================================

/// A decoded argument value.
#[derive(Debug)]
pub enum Arg {
    Int(i32),
    Uint(u32),
    Fixed(Fixed),
    /// `None` is the null string.
    Str(Option<String>),
    /// `None` is the null object.
    Object(Option<ObjectId>),
    NewId(ObjectId),
    GenericNewId { interface: String, version: u32, id: ObjectId },
    Array(Vec<u8>),
    Fd(OwnedFd),
}

impl Arg {
    /// Non-null string argument.
    pub fn string(s: impl Into<String>) -> Self {
        Arg::Str(Some(s.into()))
    }

    pub fn kind(&self) -> ArgKind {
        match self {
            Arg::Int(_) => ArgKind::Int,
            Arg::Uint(_) => ArgKind::Uint,
            Arg::Fixed(_) => ArgKind::Fixed,
            Arg::Str(_) => ArgKind::String,
            Arg::Object(_) => ArgKind::Object,
            Arg::NewId(_) | Arg::GenericNewId { .. } => ArgKind::NewId,
            Arg::Array(_) => ArgKind::Array,
            Arg::Fd(_) => ArgKind::Fd,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Arg::Str(None) | Arg::Object(None))
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Arg::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u32> {
        match self {
            Arg::Uint(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_fixed(&self) -> Option<Fixed> {
        match self {
            Arg::Fixed(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Arg::Str(v) => v.as_deref(),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<ObjectId> {
        match self {
            Arg::Object(v) => *v,
            _ => None,
        }
    }

    /// Id of either a typed or a generic `new_id`.
    pub fn as_new_id(&self) -> Option<ObjectId> {
        match self {
            Arg::NewId(id) | Arg::GenericNewId { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[u8]> {
        match self {
            Arg::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_fd(self) -> Option<OwnedFd> {
        match self {
            Arg::Fd(fd) => Some(fd),
            _ => None,
        }
    }
}

/// Descriptors compare by number; the same open file duplicated compares unequal.
impl PartialEq for Arg {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Arg::Int(a), Arg::Int(b)) => a == b,
            (Arg::Uint(a), Arg::Uint(b)) => a == b,
            (Arg::Fixed(a), Arg::Fixed(b)) => a == b,
            (Arg::Str(a), Arg::Str(b)) => a == b,
            (Arg::Object(a), Arg::Object(b)) => a == b,
            (Arg::NewId(a), Arg::NewId(b)) => a == b,
            (
                Arg::GenericNewId { interface: ia, version: va, id: a },
                Arg::GenericNewId { interface: ib, version: vb, id: b },
            ) => ia == ib && va == vb && a == b,
            (Arg::Array(a), Arg::Array(b)) => a == b,
            (Arg::Fd(a), Arg::Fd(b)) => a.as_raw_fd() == b.as_raw_fd(),
            _ => false,
        }
    }
}

/// A request or event addressed to one object.
#[derive(Debug, PartialEq)]
pub struct Message {
    pub object: ObjectId,
    pub opcode: u16,
    pub args: Vec<Arg>,
}

impl Message {
    pub fn new(object: ObjectId, opcode: u16, args: Vec<Arg>) -> Self {
        Self { object, opcode, args }
    }
}

/// Raw header fields, read without resolving the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub object: u32,
    pub opcode: u16,
    pub size: u16,
}

impl Header {
    /// Declared size in bytes, header included.
    pub fn byte_len(&self) -> usize {
        usize::from(self.size)
    }
}
