//! Implementations of `wl_display` and `wl_registry`.
//!
//! `wl_callback` has no requests, so it needs no handler: `sync` answers
//! with `done`, whose destructor semantics release the callback.

use tracing::debug;
use waypack::Arg;
use waypack::ObjectId;
use wayproto::core_protocol::callback;
use wayproto::core_protocol::display;
use wayproto::core_protocol::display_error;
use wayproto::core_protocol::registry;

use crate::error::AppError;
use crate::handler::Context;
use crate::handler::Handler;
use crate::handler::Request;

pub(crate) struct DisplayHandler;

impl Handler for DisplayHandler {
    fn request(&mut self, ctx: &mut Context<'_>, request: Request) -> Result<(), AppError> {
        match request.opcode {
            display::SYNC => {
                let callback = request.new_id(0)?;
                let serial = ctx.next_serial();
                ctx.post_event(callback, callback::DONE, vec![Arg::Uint(serial)])?;
            }
            display::GET_REGISTRY => {
                let id = request.new_id(0)?;
                ctx.bind(id, RegistryHandler)?;
                let globals = ctx.globals();
                for global in globals.iter() {
                    let args = vec![
                        Arg::Uint(global.name),
                        Arg::string(&global.interface),
                        Arg::Uint(global.version),
                    ];
                    ctx.post_event(id, registry::GLOBAL, args)?;
                }
            }
            opcode => {
                let message = format!("wl_display has no request {opcode}");
                return Err(AppError::implementation(message));
            }
        }
        Ok(())
    }
}

pub(crate) struct RegistryHandler;

impl RegistryHandler {
    fn reject(ctx: &mut Context<'_>, id: ObjectId, message: String) -> Result<(), AppError> {
        ctx.destroy(id)?;
        Err(AppError::new(display_error::INVALID_OBJECT, message))
    }
}

impl Handler for RegistryHandler {
    fn request(&mut self, ctx: &mut Context<'_>, request: Request) -> Result<(), AppError> {
        if request.opcode != registry::BIND {
            let message = format!("wl_registry has no request {}", request.opcode);
            return Err(AppError::implementation(message));
        }
        let name = request.uint(0)?;
        let Some(Arg::GenericNewId { interface, version, id }) = request.arg(1) else {
            return Err(AppError::implementation("wl_registry.bind without a new_id"));
        };
        let (id, version) = (*id, *version);

        let globals = ctx.globals();
        let Some(global) = globals.get(name).filter(|g| g.interface == *interface) else {
            return Self::reject(ctx, id, format!("invalid global {interface} ({name})"));
        };
        if version > global.version {
            let message = format!(
                "invalid version for global {interface} ({name}): have {}, wanted {version}",
                global.version
            );
            return Self::reject(ctx, id, message);
        }

        let handler = global.bind(ctx, id, version)?;
        ctx.bind_boxed(id, handler)?;
        debug!(client = %ctx.client(), %id, interface = %global.interface, version, "bound global");
        Ok(())
    }
}
