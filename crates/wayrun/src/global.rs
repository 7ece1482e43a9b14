use std::sync::Arc;

use waypack::ObjectId;

use crate::error::AppError;
use crate::handler::Context;
use crate::handler::Handler;

/// Builds the handler of a freshly bound global: `(ctx, id, version)`.
pub type BindFn =
    dyn Fn(&mut Context<'_>, ObjectId, u32) -> Result<Box<dyn Handler>, AppError> + Send + Sync;

/// A singleton advertised through `wl_registry`.
#[derive(Clone)]
pub struct Global {
    pub name: u32,
    pub interface: String,
    /// Highest version a client may bind.
    pub version: u32,
    bind: Arc<BindFn>,
}

impl Global {
    pub fn bind(
        &self,
        ctx: &mut Context<'_>,
        id: ObjectId,
        version: u32,
    ) -> Result<Box<dyn Handler>, AppError> {
        (self.bind)(ctx, id, version)
    }
}

impl std::fmt::Debug for Global {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Global")
            .field("name", &self.name)
            .field("interface", &self.interface)
            .field("version", &self.version)
            .finish()
    }
}

/// The globals a server advertises, shared by every session.
///
/// Names are never reused, even after a global is removed.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    entries: Vec<Global>,
    last_name: u32,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a global and returns its name. Names start at 1.
    pub fn add<F>(&mut self, interface: impl Into<String>, version: u32, bind: F) -> u32
    where
        F: Fn(&mut Context<'_>, ObjectId, u32) -> Result<Box<dyn Handler>, AppError>
            + Send
            + Sync
            + 'static,
    {
        self.last_name += 1;
        let name = self.last_name;
        let interface = interface.into();
        self.entries.push(Global { name, interface, version, bind: Arc::new(bind) });
        name
    }

    /// Withdraws a global. Objects already bound to it stay alive.
    pub fn remove(&mut self, name: u32) -> Option<Global> {
        let index = self.entries.iter().position(|g| g.name == name)?;
        Some(self.entries.remove(index))
    }

    pub fn get(&self, name: u32) -> Option<&Global> {
        self.entries.iter().find(|g| g.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Global> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert;

    impl Handler for Inert {
        fn request(
            &mut self,
            _ctx: &mut Context<'_>,
            _request: crate::handler::Request,
        ) -> Result<(), AppError> {
            Ok(())
        }
    }

    fn inert(_: &mut Context<'_>, _: ObjectId, _: u32) -> Result<Box<dyn Handler>, AppError> {
        Ok(Box::new(Inert))
    }

    #[test]
    fn test_removed_names_are_not_reused() {
        let mut globals = Globals::new();
        let a = globals.add("a", 1, inert);
        let b = globals.add("b", 3, inert);
        assert_eq!((a, b), (1, 2));

        assert_eq!(globals.remove(b).map(|g| g.interface), Some("b".to_owned()));
        assert!(globals.remove(b).is_none());
        assert!(globals.get(b).is_none());

        let c = globals.add("c", 1, inert);
        assert_eq!(c, 3);
        let names: Vec<_> = globals.iter().map(|g| g.name).collect();
        assert_eq!(names, [1, 3]);
        assert_eq!(globals.len(), 2);
    }
}
