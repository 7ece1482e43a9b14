use tracing::trace;

use crate::error::Error;
use crate::error::Result;
use crate::fd::FdQueue;
use crate::fixed::Fixed;
use crate::padded_len;
use crate::types::Arg;
use crate::types::ArgKind;
use crate::types::ArgSpec;
use crate::types::Header;
use crate::types::Message;
use crate::types::ObjectId;
use crate::types::Signature;
use crate::types::HEADER_SIZE;

/// Maps the target of a message to the signature its body must follow.
///
/// Implementations report `UnknownObject`, `StaleObject` and `UnknownOpcode`
/// as distinct errors; the decoder passes them through untouched.
pub trait Resolve {
    fn resolve(&self, object: ObjectId, opcode: u16) -> Result<&Signature>;
}

/// Outcome of one decode attempt.
#[derive(Debug)]
pub enum Decoded {
    /// A complete message and the bytes it occupied.
    Message { message: Message, consumed: usize },
    /// Not enough bytes or descriptors yet. Nothing was consumed.
    Incomplete,
}

/// Reads the header at the front of `buf` without resolving its target.
///
/// Returns `Ok(None)` while fewer than 8 bytes are buffered.
pub fn peek_header(buf: &[u8]) -> Result<Option<Header>> {
    let Some(bytes) = buf.get(..HEADER_SIZE) else {
        return Ok(None);
    };
    let object = word_at(bytes, 0);
    let word = word_at(bytes, 4);
    let size = (word >> 16) as u16;
    let opcode = (word & 0xFFFF) as u16;

    if usize::from(size) < HEADER_SIZE || size % 4 != 0 {
        return Err(Error::MalformedHeader { size });
    }
    Ok(Some(Header { object, opcode, size }))
}

/// Decodes the message at the front of `buf`.
///
/// # Invariants
/// - `Incomplete` consumes zero bytes and zero descriptors.
/// - Descriptors are claimed only once the whole body decoded cleanly.
pub fn decode_message<R: Resolve + ?Sized>(
    buf: &[u8],
    fds: &mut FdQueue,
    resolver: &R,
) -> Result<Decoded> {
    let Some(header) = peek_header(buf)? else {
        return Ok(Decoded::Incomplete);
    };
    let size = header.byte_len();
    if buf.len() < size {
        return Ok(Decoded::Incomplete);
    }

    let object = ObjectId::new(header.object).ok_or(Error::UnknownObject(0))?;
    let signature = resolver.resolve(object, header.opcode)?;
    let wanted = signature.fd_count();
    if fds.len() < wanted {
        let queued = fds.len();
        trace!(%object, opcode = header.opcode, wanted, queued, "waiting for descriptors");
        return Ok(Decoded::Incomplete);
    }

    let mut body = Decoder::new(&buf[HEADER_SIZE..size]);
    let mut pending = Vec::with_capacity(signature.len());
    for (index, spec) in signature.args().iter().enumerate() {
        pending.push(body.arg(index, spec)?);
    }
    if body.remaining() != 0 {
        return Err(Error::SizeMismatch { declared: size, consumed: HEADER_SIZE + body.pos });
    }

    let mut args = Vec::with_capacity(pending.len());
    for arg in pending {
        match arg {
            Some(arg) => args.push(arg),
            None => {
                let Some(fd) = fds.claim() else {
                    return Ok(Decoded::Incomplete);
                };
                args.push(Arg::Fd(fd));
            }
        }
    }

    trace!(%object, opcode = header.opcode, size, "decoded message");
    Ok(Decoded::Message { message: Message::new(object, header.opcode, args), consumed: size })
}

fn word_at(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Bounds-checked view over one message body.
struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn declared(&self) -> usize {
        HEADER_SIZE + self.buf.len()
    }

    fn word(&mut self) -> Result<u32> {
        if self.remaining() < 4 {
            return Err(Error::SizeMismatch {
                declared: self.declared(),
                consumed: HEADER_SIZE + self.pos + 4,
            });
        }
        let v = word_at(self.buf, self.pos);
        self.pos += 4;
        Ok(v)
    }

    /// Reads a length-prefixed blob, skipping its padding.
    fn blob(&mut self, overrun: impl FnOnce(u32) -> Error) -> Result<&'a [u8]> {
        let len = self.word()?;
        let padded = match padded_len(len as usize) {
            Some(padded) if padded <= self.remaining() => padded,
            _ => return Err(overrun(len)),
        };
        let data = &self.buf[self.pos..self.pos + len as usize];
        self.pos += padded;
        Ok(data)
    }

    fn string(&mut self, index: usize, nullable: bool) -> Result<Option<String>> {
        let raw = self.blob(|len| Error::StringOverrun { index, len })?;
        if raw.is_empty() {
            return if nullable { Ok(None) } else { Err(Error::NullArgument { index }) };
        }
        let Some((&0, text)) = raw.split_last() else {
            return Err(Error::InvalidString { index });
        };
        if text.contains(&0) {
            return Err(Error::InvalidString { index });
        }
        let text = std::str::from_utf8(text).map_err(|_| Error::InvalidString { index })?;
        Ok(Some(text.to_owned()))
    }

    fn new_id(&mut self, index: usize) -> Result<ObjectId> {
        ObjectId::new(self.word()?).ok_or(Error::InvalidNewId { index })
    }

    /// Decodes one argument. Descriptors decode to `None`, claimed later.
    fn arg(&mut self, index: usize, spec: &ArgSpec) -> Result<Option<Arg>> {
        let arg = match spec.kind {
            ArgKind::Int => Arg::Int(self.word()? as i32),
            ArgKind::Uint => Arg::Uint(self.word()?),
            ArgKind::Fixed => Arg::Fixed(Fixed::from_raw(self.word()? as i32)),
            ArgKind::String => Arg::Str(self.string(index, spec.nullable)?),
            ArgKind::Object => {
                let id = ObjectId::new(self.word()?);
                if id.is_none() && !spec.nullable {
                    return Err(Error::NullArgument { index });
                }
                Arg::Object(id)
            }
            ArgKind::NewId if spec.is_generic_new_id() => {
                let interface = self.string(index, false)?.ok_or(Error::NullArgument { index })?;
                let version = self.word()?;
                let id = self.new_id(index)?;
                Arg::GenericNewId { interface, version, id }
            }
            ArgKind::NewId => Arg::NewId(self.new_id(index)?),
            ArgKind::Array => {
                let data = self.blob(|len| Error::ArrayOverrun { index, len })?;
                Arg::Array(data.to_vec())
            }
            ArgKind::Fd => return Ok(None),
        };
        Ok(Some(arg))
    }
}
