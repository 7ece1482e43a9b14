#![allow(dead_code)]

use std::collections::HashMap;
use std::os::fd::OwnedFd;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::Once;

use tracing_subscriber::EnvFilter;
use waypack::decode_message;
use waypack::Arg;
use waypack::Decoded;
use waypack::Encoder;
use waypack::FdQueue;
use waypack::Message;
use waypack::ObjectId;
use waypack::Resolve;
use waypack::Signature;
use wayproto::Direction;
use wayproto::Registry;
use wayrun::AppError;
use wayrun::Context;
use wayrun::Globals;
use wayrun::Handler;
use wayrun::Request;
use wayrun::Session;
use wayrun::SessionConfig;
use wayrun::SessionError;

pub const TEST_SHELL: &str = include_str!("../fixtures/test_shell.xml");

pub mod factory {
    pub const CREATE_ITEM: u16 = 0;
    pub const DESTROY: u16 = 1;
    pub const LATE: u16 = 2;
    pub const CREATE_UNBOUND: u16 = 3;

    pub const READY: u16 = 0;
}

pub mod item {
    pub const PING: u16 = 0;
    pub const DESTROY: u16 = 1;
    pub const BURST: u16 = 2;
    pub const ATTACH: u16 = 3;
    pub const SET_TITLE: u16 = 4;
    pub const TAKE_FD: u16 = 5;
    pub const FAIL: u16 = 6;
    pub const QUIT: u16 = 7;
    pub const SPAWN: u16 = 8;

    pub const PONG: u16 = 0;
    pub const NOTE: u16 = 1;
    pub const SPAWNED: u16 = 2;
    pub const SCALE: u16 = 3;
}

pub mod note {
    pub const DESTROY: u16 = 0;

    pub const TEXT: u16 = 0;
}

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::fmt().with_env_filter(filter).with_test_writer().try_init();
    });
}

pub fn registry() -> anyhow::Result<Arc<Registry>> {
    Ok(Arc::new(Registry::builder().core().xml(TEST_SHELL)?.build()?))
}

// --- Handlers ---

pub type Log = Arc<Mutex<Vec<String>>>;

fn record(log: &Log, entry: String) {
    log.lock().unwrap().push(entry);
}

pub struct FactoryHandler {
    pub log: Log,
}

impl Handler for FactoryHandler {
    fn request(&mut self, ctx: &mut Context<'_>, request: Request) -> Result<(), AppError> {
        match request.opcode {
            factory::CREATE_ITEM => {
                let id = request.new_id(0)?;
                ctx.bind(id, ItemHandler { log: Arc::clone(&self.log) })?;
                record(&self.log, format!("create_item {id}"));
            }
            factory::CREATE_UNBOUND => {
                record(&self.log, format!("create_unbound {}", request.new_id(0)?));
            }
            factory::LATE => record(&self.log, "late".into()),
            factory::DESTROY => record(&self.log, "factory destroy".into()),
            _ => return Err(AppError::implementation("unexpected factory request")),
        }
        Ok(())
    }

    fn destroyed(&mut self, object: ObjectId) {
        record(&self.log, format!("destroyed factory {object}"));
    }
}

pub struct ItemHandler {
    pub log: Log,
}

impl Handler for ItemHandler {
    fn request(&mut self, ctx: &mut Context<'_>, mut request: Request) -> Result<(), AppError> {
        let object = request.object;
        match request.opcode {
            item::PING => {
                let serial = request.uint(0)?;
                record(&self.log, format!("ping {serial}"));
                ctx.post_event(object, item::PONG, vec![Arg::Uint(serial)])?;
            }
            item::DESTROY => record(&self.log, format!("destroy {object}")),
            item::BURST => {
                for n in 1..=request.uint(0)? {
                    ctx.post_event(object, item::NOTE, vec![Arg::string(format!("E{n}"))])?;
                }
            }
            item::ATTACH => {
                let other = request.arg(0).and_then(Arg::as_object);
                record(&self.log, format!("attach {other:?}"));
            }
            item::SET_TITLE => {
                let title = request.arg(0).and_then(Arg::as_str).unwrap_or_default();
                record(&self.log, format!("title {title}"));
            }
            item::TAKE_FD => {
                let size = request.uint(1)?;
                let fd = request.take_fd(0);
                record(&self.log, format!("fd {} {size}", fd.is_some()));
            }
            item::FAIL => {
                let code = request.uint(0)?;
                return Err(AppError::new(code, format!("asked to fail with code {code}")));
            }
            item::QUIT => {
                record(&self.log, "quit".into());
                ctx.close();
            }
            item::SPAWN => {
                let spawned = ctx.create_object("ts_note", 1)?;
                ctx.post_event(object, item::SPAWNED, vec![Arg::NewId(spawned.id())])?;
                ctx.post_event(spawned.id(), note::TEXT, vec![Arg::string("hello")])?;
            }
            _ => return Err(AppError::implementation("unexpected item request")),
        }
        Ok(())
    }

    fn destroyed(&mut self, object: ObjectId) {
        record(&self.log, format!("destroyed {object}"));
    }
}

/// One `ts_factory` global. Binding it sends `ready` with a fresh serial.
pub fn globals(log: &Log) -> Globals {
    let mut globals = Globals::new();
    let log = Arc::clone(log);
    globals.add("ts_factory", 2, move |ctx, id, _version| {
        let serial = ctx.next_serial();
        ctx.post_event(id, factory::READY, vec![Arg::Uint(serial)])?;
        let handler: Box<dyn Handler> = Box::new(FactoryHandler { log: Arc::clone(&log) });
        Ok(handler)
    });
    globals
}

// --- Client side ---

/// A decoded event, named after its interface and method.
#[derive(Debug)]
pub struct Event {
    pub object: u32,
    pub interface: String,
    pub name: String,
    pub args: Vec<Arg>,
}

impl Event {
    pub fn label(&self) -> String {
        format!("{}.{}", self.interface, self.name)
    }

    pub fn uint(&self, index: usize) -> u32 {
        self.args[index].as_uint().unwrap()
    }

    pub fn str(&self, index: usize) -> &str {
        self.args[index].as_str().unwrap()
    }
}

pub fn labels(events: &[Event]) -> Vec<String> {
    events.iter().map(Event::label).collect()
}

/// The client end of a connection: encodes requests, decodes events, and
/// tracks which interface each id refers to.
pub struct Peer {
    registry: Arc<Registry>,
    objects: HashMap<u32, String>,
}

struct EventResolver<'a> {
    registry: &'a Registry,
    objects: &'a HashMap<u32, String>,
}

impl Resolve for EventResolver<'_> {
    fn resolve(&self, object: ObjectId, opcode: u16) -> waypack::Result<&Signature> {
        let interface = self
            .objects
            .get(&object.raw())
            .ok_or(waypack::Error::UnknownObject(object.raw()))?;
        self.registry
            .signature_for(interface, opcode, Direction::Event)
            .map(|m| &m.signature)
            .map_err(|_| waypack::Error::UnknownOpcode { interface: interface.clone(), opcode })
    }
}

impl Peer {
    pub fn new(registry: Arc<Registry>) -> Self {
        let objects = HashMap::from([(1, "wl_display".to_owned())]);
        Self { registry, objects }
    }

    /// Records an id the server announced some other way.
    pub fn learn(&mut self, id: u32, interface: &str) {
        self.objects.insert(id, interface.to_owned());
    }

    pub fn interface_of(&self, id: u32) -> Option<&str> {
        self.objects.get(&id).map(String::as_str)
    }

    pub fn encode(&mut self, object: u32, opcode: u16, args: Vec<Arg>) -> Vec<u8> {
        self.encode_with_fds(object, opcode, args).0
    }

    pub fn encode_with_fds(
        &mut self,
        object: u32,
        opcode: u16,
        args: Vec<Arg>,
    ) -> (Vec<u8>, Vec<OwnedFd>) {
        self.track_request(object, opcode, &args);
        let mut out = Encoder::new();
        out.encode(Message::new(ObjectId::new(object).unwrap(), opcode, args)).unwrap();
        (out.take_bytes(), out.take_fds())
    }

    fn track_request(&mut self, object: u32, opcode: u16, args: &[Arg]) {
        let Some(interface) = self.objects.get(&object) else {
            return;
        };
        let Ok(method) = self.registry.signature_for(interface, opcode, Direction::Request) else {
            return;
        };
        for (spec, arg) in method.signature.args().iter().zip(args) {
            match (arg, &spec.interface) {
                (Arg::NewId(id), Some(name)) => {
                    self.objects.insert(id.raw(), name.clone());
                }
                (Arg::GenericNewId { interface, id, .. }, _) => {
                    self.objects.insert(id.raw(), interface.clone());
                }
                _ => {}
            }
        }
    }

    pub fn decode(&mut self, bytes: &[u8], fds: Vec<OwnedFd>) -> anyhow::Result<Vec<Event>> {
        let mut queue = FdQueue::new();
        queue.extend(fds);
        let mut events = Vec::new();
        let mut offset = 0;

        while offset < bytes.len() {
            let resolver = EventResolver { registry: &self.registry, objects: &self.objects };
            let decoded = decode_message(&bytes[offset..], &mut queue, &resolver)?;
            let (message, consumed) = match decoded {
                Decoded::Message { message, consumed } => (message, consumed),
                Decoded::Incomplete => anyhow::bail!("truncated event stream at byte {offset}"),
            };
            offset += consumed;

            let id = message.object.raw();
            let interface = self.objects[&id].clone();
            let method = self.registry.signature_for(&interface, message.opcode, Direction::Event)?;
            for (spec, arg) in method.signature.args().iter().zip(&message.args) {
                if let (Arg::NewId(new), Some(name)) = (arg, &spec.interface) {
                    self.objects.insert(new.raw(), name.clone());
                }
            }
            if interface == "wl_display" && method.name == "delete_id" {
                if let Some(deleted) = message.args[0].as_uint() {
                    self.objects.remove(&deleted);
                }
            }
            let name = method.name.clone();
            events.push(Event { object: id, interface, name, args: message.args });
        }
        Ok(events)
    }
}

// --- Fixture ---

/// A session wired to the test protocol, plus the client that talks to it.
pub struct Fixture {
    pub session: Session,
    pub peer: Peer,
    pub log: Log,
}

impl Fixture {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> anyhow::Result<Self> {
        init_tracing();
        let registry = registry()?;
        let log = Log::default();
        let globals = Arc::new(globals(&log));
        let session = Session::new(Arc::clone(&registry), globals, config)?;
        Ok(Self { session, peer: Peer::new(registry), log })
    }

    pub fn send(&mut self, object: u32, opcode: u16, args: Vec<Arg>) -> Result<(), SessionError> {
        let bytes = self.peer.encode(object, opcode, args);
        self.session.feed(&bytes)
    }

    pub fn events(&mut self) -> anyhow::Result<Vec<Event>> {
        let bytes = self.session.drain_outbound();
        let fds = self.session.take_outbound_fds();
        self.peer.decode(&bytes, fds)
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Gets the registry as id 2 and binds the factory global as id 3.
    pub fn bind_factory(&mut self, version: u32) -> anyhow::Result<()> {
        self.send(1, 1, vec![Arg::NewId(id(2))])?;
        let bind = Arg::GenericNewId { interface: "ts_factory".into(), version, id: id(3) };
        self.send(2, 0, vec![Arg::Uint(1), bind])?;
        self.events()?;
        Ok(())
    }

    /// Binds the factory and creates item 4 from it.
    pub fn with_item() -> anyhow::Result<Self> {
        Self::with_item_config(SessionConfig::default())
    }

    pub fn with_item_config(config: SessionConfig) -> anyhow::Result<Self> {
        let mut fixture = Self::with_config(config)?;
        fixture.bind_factory(2)?;
        fixture.send(3, factory::CREATE_ITEM, vec![Arg::NewId(id(4))])?;
        Ok(fixture)
    }
}

pub fn id(raw: u32) -> ObjectId {
    ObjectId::new(raw).unwrap()
}

/// The `(object, code)` of the `wl_display.error` in `events`, if any.
pub fn error_of(events: &[Event]) -> Option<(u32, u32)> {
    events
        .iter()
        .find(|e| e.label() == "wl_display.error")
        .map(|e| (e.args[0].as_object().map_or(0, ObjectId::raw), e.uint(1)))
}
