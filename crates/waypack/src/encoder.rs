use std::os::fd::OwnedFd;

use tracing::trace;

use crate::error::Error;
use crate::error::Result;
use crate::padded_len;
use crate::types::Arg;
use crate::types::Message;
use crate::types::HEADER_SIZE;
use crate::types::MAX_MESSAGE_SIZE;

/// Outbound byte stream plus its descriptor side channel.
///
/// ## Invariants
/// - The buffer only ever holds whole messages: a failed encode truncates
///   back to where the message began and keeps none of its descriptors.
/// - Descriptors are queued in the order their messages were encoded.
#[derive(Debug)]
pub struct Encoder {
    buf: Vec<u8>,
    fds: Vec<OwnedFd>,
    limit: usize,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder {
    pub fn new() -> Self {
        Self::with_limit(MAX_MESSAGE_SIZE)
    }

    /// Caps the size of any single message. Clamped to what the header can express.
    pub fn with_limit(limit: usize) -> Self {
        Self { buf: Vec::new(), fds: Vec::new(), limit: limit.min(MAX_MESSAGE_SIZE) }
    }

    /// Largest message this encoder accepts, in bytes.
    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn fd_count(&self) -> usize {
        self.fds.len()
    }

    /// Hands over every encoded byte, leaving the encoder empty.
    pub fn take_bytes(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buf)
    }

    /// Hands over every queued descriptor, oldest first.
    pub fn take_fds(&mut self) -> Vec<OwnedFd> {
        std::mem::take(&mut self.fds)
    }

    /// Appends one message. Arguments are not checked against a signature.
    pub fn encode(&mut self, message: Message) -> Result<()> {
        let start = self.buf.len();
        let mut fds = Vec::new();

        self.write_u32(message.object.raw());
        self.write_u32(0); // Size placeholder

        let body = message
            .args
            .into_iter()
            .enumerate()
            .try_for_each(|(index, arg)| self.write_arg(index, arg, &mut fds));
        let size = self.buf.len() - start;
        if let Err(e) = body {
            self.buf.truncate(start);
            return Err(e);
        }
        if size > self.limit {
            self.buf.truncate(start);
            return Err(Error::MessageTooLarge { size, limit: self.limit });
        }

        let word = ((size as u32) << 16) | u32::from(message.opcode);
        self.buf[start + 4..start + HEADER_SIZE].copy_from_slice(&word.to_le_bytes());
        self.fds.append(&mut fds);

        trace!(object = %message.object, opcode = message.opcode, size, "encoded message");
        Ok(())
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    fn write_blob(&mut self, data: &[u8], nul: bool) -> Result<()> {
        let len = data.len() + usize::from(nul);
        let padded = padded_len(len).filter(|p| *p <= self.limit);
        let Some(padded) = padded else {
            return Err(Error::MessageTooLarge { size: len, limit: self.limit });
        };
        self.write_u32(len as u32);
        self.buf.extend_from_slice(data);
        self.buf.resize(self.buf.len() + padded - data.len(), 0);
        Ok(())
    }

    fn write_string(&mut self, index: usize, s: &str) -> Result<()> {
        if s.as_bytes().contains(&0) {
            return Err(Error::InvalidString { index });
        }
        self.write_blob(s.as_bytes(), true)
    }

    fn write_arg(&mut self, index: usize, arg: Arg, fds: &mut Vec<OwnedFd>) -> Result<()> {
        match arg {
            Arg::Int(v) => self.write_u32(v as u32),
            Arg::Uint(v) => self.write_u32(v),
            Arg::Fixed(v) => self.write_u32(v.raw() as u32),
            Arg::Str(None) => self.write_u32(0),
            Arg::Str(Some(s)) => self.write_string(index, &s)?,
            Arg::Object(id) => self.write_u32(id.map_or(0, |id| id.raw())),
            Arg::NewId(id) => self.write_u32(id.raw()),
            Arg::GenericNewId { interface, version, id } => {
                self.write_string(index, &interface)?;
                self.write_u32(version);
                self.write_u32(id.raw());
            }
            Arg::Array(data) => self.write_blob(&data, false)?,
            Arg::Fd(fd) => fds.push(fd),
        }
        Ok(())
    }
}

/// Appends `message` to `out`, moving its descriptors to the side channel.
pub fn encode_message(message: Message, out: &mut Encoder) -> Result<()> {
    out.encode(message)
}
