//! # Revenant Files
//!
//! File-side collaborators of the session proxy:
//!
//! - Capture sinks: sanitised, timestamped on-disk files for quests, code
//!   blobs, player snapshots, card lists and maps the proxy observes
//! - PRS decompression for compressed map and code payloads
//! - A process-wide read-through content cache used by the outbound send
//!   path
//!
//! Capture writes are synchronous; they run on the session task and count
//! against that session's latency (the broker never buffers more than one
//! frame).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod capture;
pub mod prs;

pub use cache::FileCache;
pub use capture::{CaptureError, CaptureSink, SavingFile};

/// Largest chunk a single WriteFile frame may append
pub const MAX_CHUNK: usize = 0x400;
