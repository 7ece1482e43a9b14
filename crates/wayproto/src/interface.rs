use waypack::ArgKind;
use waypack::ArgSpec;
use waypack::Signature;

use crate::error::Error;
use crate::error::Result;

/// Which way a method travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Client to server.
    Request,
    /// Server to client.
    Event,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Request => f.write_str("request"),
            Direction::Event => f.write_str("event"),
        }
    }
}

/// One request or event of an interface. Its opcode is its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDef {
    pub name: String,
    /// First interface version that carries this method.
    pub since: u32,
    /// Sending it ends the life of the target object.
    pub destructor: bool,
    pub signature: Signature,
}

impl MethodDef {
    pub fn new(name: impl Into<String>, args: Vec<ArgSpec>) -> Self {
        Self { name: name.into(), since: 1, destructor: false, signature: Signature::new(args) }
    }

    pub fn since(mut self, version: u32) -> Self {
        self.since = version;
        self
    }

    pub fn destructor(mut self) -> Self {
        self.destructor = true;
        self
    }
}

/// A named, versioned set of requests and events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDef {
    pub name: String,
    /// Highest version this server implements.
    pub version: u32,
    pub requests: Vec<MethodDef>,
    pub events: Vec<MethodDef>,
}

impl InterfaceDef {
    pub fn new(name: impl Into<String>, version: u32) -> Self {
        Self { name: name.into(), version, requests: Vec::new(), events: Vec::new() }
    }

    pub fn request(mut self, method: MethodDef) -> Self {
        self.requests.push(method);
        self
    }

    pub fn event(mut self, method: MethodDef) -> Self {
        self.events.push(method);
        self
    }

    pub fn methods(&self, direction: Direction) -> &[MethodDef] {
        match direction {
            Direction::Request => &self.requests,
            Direction::Event => &self.events,
        }
    }

    pub fn method(&self, direction: Direction, opcode: u16) -> Option<&MethodDef> {
        self.methods(direction).get(usize::from(opcode))
    }

    /// Opcode of the method called `name`.
    pub fn opcode(&self, direction: Direction, name: &str) -> Option<u16> {
        let index = self.methods(direction).iter().position(|m| m.name == name)?;
        u16::try_from(index).ok()
    }

    /// Interfaces named by `object` and `new_id` arguments, with where they appear.
    pub(crate) fn references(&self) -> impl Iterator<Item = (&MethodDef, &ArgSpec, &str)> {
        self.requests
            .iter()
            .chain(&self.events)
            .flat_map(|m| m.signature.args().iter().map(move |a| (m, a)))
            .filter_map(|(m, a)| a.interface.as_deref().map(|target| (m, a, target)))
    }

    /// Checks the definition is self-consistent.
    ///
    /// - Version is at least 1 and every `since` lies within `1..=version`.
    /// - A method creates at most one object.
    /// - Opcodes fit in 16 bits.
    pub(crate) fn validate(&self) -> Result<()> {
        let invalid =
            |reason: String| Error::InvalidInterface { interface: self.name.clone(), reason };

        if self.version == 0 {
            return Err(invalid("version must be at least 1".into()));
        }
        for direction in [Direction::Request, Direction::Event] {
            let methods = self.methods(direction);
            if methods.len() > usize::from(u16::MAX) + 1 {
                return Err(invalid(format!("too many {direction}s")));
            }
            for m in methods {
                if m.since == 0 || m.since > self.version {
                    return Err(invalid(format!(
                        "{direction} {} has since {} outside 1..={}",
                        m.name, m.since, self.version
                    )));
                }
                let new_ids =
                    m.signature.args().iter().filter(|a| a.kind == ArgKind::NewId).count();
                if new_ids > 1 {
                    let reason = format!("{direction} {} creates {new_ids} objects", m.name);
                    return Err(invalid(reason));
                }
            }
        }
        Ok(())
    }
}
