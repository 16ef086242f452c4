//! # Revenant Core
//!
//! The per-session command broker of the revenant proxy.
//!
//! For every client the proxy keeps two cryptographically independent
//! channels (one to the client, one to the remote server) and pushes each
//! received frame through a per-dialect, per-direction, per-opcode handler
//! table that forwards, rewrites or suppresses it:
//!
//! ```text
//! ┌──────────┐  bytes   ┌─────────┐  frames  ┌──────────────┐
//! │  client  │─────────▶│ Channel │─────────▶│   dispatch   │
//! └──────────┘          │ (crypt) │          │ table[d][dir]│
//!       ▲               └─────────┘          │    [opcode]  │
//!       │                                    └──────┬───────┘
//!       │               ┌─────────┐  re-framed,     │
//!       └───────────────│ Channel │◀─rewritten──────┘
//!                       │ (crypt) │          ▲
//! ┌──────────┐          └─────────┘          │
//! │  server  │◀──────────────┴───────────────┘
//! └──────────┘
//! ```
//!
//! Everything session-scoped is single-owner and lock-free; the licence
//! store and the file cache are the only cross-session state.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod broker;
pub mod channel;
pub mod context;
pub mod error;
pub mod handlers;
pub mod license;
pub mod messages;
pub mod session;
pub mod table;

pub use broker::{dispatch, run_session};
pub use channel::Channel;
pub use context::{ChatCommandHandler, CodeAnnotator, HomePorts, ProxyContext};
pub use error::SessionError;
pub use handlers::{Handler, HandlerAction};
pub use license::{License, LicenseStore};
pub use session::{LobbyPlayer, Session, SessionFlags, SessionOptions};
