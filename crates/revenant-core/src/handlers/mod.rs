//! Per-opcode frame handlers.
//!
//! A handler receives the context, the session and the frame (by mutable
//! reference; most rewrites happen in place) and decides what the broker
//! does with the triggering frame. Side-effect sends through either channel
//! are queued before the broker forwards the triggering frame, so injected
//! frames always precede it on the wire.

pub mod handshake;
pub mod identity;
pub mod lobby;
pub mod misc;
pub mod retarget;
pub mod subcommands;
pub mod transfer;

use revenant_proto::Command;

use crate::context::ProxyContext;
use crate::error::SessionError;
use crate::session::Session;

/// What the broker does with the frame a handler saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerAction {
    /// Send the (possibly mutated) frame to the opposite channel unchanged
    /// in opcode and flag
    Forward,
    /// Send nothing; the handler handled the frame itself
    Suppress,
    /// Forward with opcode/flag substitutions where given
    Modified {
        /// Replacement opcode, `None` to keep the original
        opcode: Option<u16>,
        /// Replacement flag, `None` to keep the original
        flag: Option<u32>,
    },
}

impl HandlerAction {
    /// Payload was mutated in place; opcode and flag stand
    #[must_use]
    pub fn modified() -> Self {
        HandlerAction::Modified { opcode: None, flag: None }
    }

    /// Forward or report a modification depending on `changed`
    #[must_use]
    pub fn forward_or_modified(changed: bool) -> Self {
        if changed {
            Self::modified()
        } else {
            HandlerAction::Forward
        }
    }
}

/// Handler function type filling the dispatch tables
pub type Handler =
    fn(&ProxyContext, &mut Session, &mut Command) -> Result<HandlerAction, SessionError>;

/// Default cell: pure forward
pub fn process_default(
    _ctx: &ProxyContext,
    _session: &mut Session,
    _cmd: &mut Command,
) -> Result<HandlerAction, SessionError> {
    Ok(HandlerAction::Forward)
}
