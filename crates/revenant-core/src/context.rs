//! Process-wide proxy state shared (read-only) by every session.

use std::path::PathBuf;
use std::sync::Arc;

use revenant_crypto::BbKeyFile;
use revenant_files::FileCache;
use revenant_proto::Dialect;

use crate::error::SessionError;
use crate::license::LicenseStore;
use crate::session::{Session, SessionOptions};

/// Home-server ports clients are redirected back to
#[derive(Debug, Clone, Copy)]
pub struct HomePorts {
    /// DC/GC/XB login port
    pub console_login: u16,
    /// PC login port
    pub pc_login: u16,
    /// BB patch port
    pub bb_patch: u16,
    /// BB login port
    pub bb_login: u16,
}

impl HomePorts {
    /// Port a returning client of `dialect` should land on
    #[must_use]
    pub fn for_dialect(&self, dialect: Dialect) -> u16 {
        match dialect {
            Dialect::Dc | Dialect::Gc | Dialect::Xb => self.console_login,
            Dialect::Pc => self.pc_login,
            Dialect::Patch => self.bb_patch,
            Dialect::Bb => self.bb_login,
        }
    }
}

impl Default for HomePorts {
    fn default() -> Self {
        Self { console_login: 9100, pc_login: 9300, bb_patch: 11000, bb_login: 12000 }
    }
}

/// Hook for the chat-command sub-language
///
/// Invoked when client chat starts with the command sigil; the sub-language
/// itself lives outside the broker.
pub trait ChatCommandHandler: Send + Sync {
    /// Process one command line (sigil already stripped)
    ///
    /// # Errors
    ///
    /// A returned error tears the session down; command handlers should
    /// prefer messaging the client over failing.
    fn handle(&self, session: &mut Session, text: &str) -> Result<(), SessionError>;
}

/// Default chat-command hook: log and swallow
#[derive(Debug, Default)]
pub struct NoChatCommands;

impl ChatCommandHandler for NoChatCommands {
    fn handle(&self, _session: &mut Session, text: &str) -> Result<(), SessionError> {
        tracing::info!(text, "chat command ignored (no handler installed)");
        Ok(())
    }
}

/// Hook for annotating captured executable blobs
///
/// When present, captured code is also written out as a human-readable
/// listing; the disassembler itself lives outside the broker.
pub trait CodeAnnotator: Send + Sync {
    /// Render `code` as a listing, or `None` if it cannot be disassembled
    fn disassemble(&self, code: &[u8]) -> Option<String>;
}

/// Read-mostly state every session task holds an `Arc` to
pub struct ProxyContext {
    /// Operator-visible server name, shown in return-home messages
    pub name: String,
    /// Home-server ports for the return redirect
    pub home_ports: HomePorts,
    /// Candidate BB master keys for the multi-key detector
    pub bb_master_keys: Vec<Arc<BbKeyFile>>,
    /// Directory session capture sinks are rooted in
    pub capture_dir: PathBuf,
    /// Process-wide outbound file cache
    pub file_cache: FileCache,
    /// Licence store consulted at session start
    pub licenses: LicenseStore,
    /// Defaults copied into each new session's options
    pub default_options: SessionOptions,
    /// Chat-command sub-language hook
    pub chat_commands: Box<dyn ChatCommandHandler>,
    /// Optional disassembler for captured code
    pub code_annotator: Option<Box<dyn CodeAnnotator>>,
}

impl ProxyContext {
    /// Context with defaults suitable for tests and simple deployments
    #[must_use]
    pub fn new(name: impl Into<String>, capture_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            home_ports: HomePorts::default(),
            bb_master_keys: Vec::new(),
            capture_dir: capture_dir.into(),
            file_cache: FileCache::new(),
            licenses: LicenseStore::new(),
            default_options: SessionOptions::default(),
            chat_commands: Box::new(NoChatCommands),
            code_annotator: None,
        }
    }
}

impl std::fmt::Debug for ProxyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyContext")
            .field("name", &self.name)
            .field("bb_master_keys", &self.bb_master_keys.len())
            .field("licenses", &self.licenses.len())
            .finish_non_exhaustive()
    }
}
