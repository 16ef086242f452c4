//! The twin-channel session object.
//!
//! A session exclusively owns both channels plus every piece of state the
//! handlers consult: identity substitution, the lobby roster, capture
//! bookkeeping and the operator toggles. One driver task owns the session;
//! nothing in here is shared or locked.

use std::net::SocketAddr;
use std::sync::Arc;

use revenant_crypto::multikey::KeyResolution;
use revenant_files::CaptureSink;
use revenant_proto::payloads::subcommand::ItemData;
use revenant_proto::{Dialect, CLIENT_CONFIG_SIZE};

use crate::channel::Channel;
use crate::error::SessionError;
use crate::license::License;

/// Per-session behavior flags mirrored into the stashed client config
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionFlags(u16);

impl SessionFlags {
    /// Client is allowed to save (cheat protection disarmed)
    pub const SAVE_ENABLED: u16 = 0x0001;
    /// Client does not confirm large message boxes
    pub const NO_MESSAGE_BOX_CONFIRM: u16 = 0x0002;
    /// Client stops confirming message boxes after a lobby join
    pub const NO_MESSAGE_BOX_CONFIRM_AFTER_LOBBY_JOIN: u16 = 0x0004;
    /// DC client speaks the V1 login shape
    pub const DC_V1: u16 = 0x0008;
    /// Server wraps execute-code payloads in the encrypted envelope
    pub const ENCRYPTED_SEND_FUNCTION_CALL: u16 = 0x0010;

    /// Empty flag set
    #[must_use]
    pub fn new() -> Self {
        Self(0)
    }

    /// Whether `flag` is set
    #[must_use]
    pub fn has(self, flag: u16) -> bool {
        self.0 & flag != 0
    }

    /// Set `flag`
    pub fn set(&mut self, flag: u16) {
        self.0 |= flag;
    }

    /// Raw bits
    #[must_use]
    pub fn bits(self) -> u16 {
        self.0
    }
}

/// Operator-controlled toggles and one-shot overrides
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    /// Capture quests, code blobs, maps and player snapshots to disk
    pub save_files: bool,
    /// Normalise chat color tags on outgoing chat
    pub enable_chat_filter: bool,
    /// Keep the player's HP topped up
    pub infinite_hp: bool,
    /// Keep the player's TP topped up
    pub infinite_tp: bool,
    /// Replay the previous switch activation alongside each new one
    pub switch_assist: bool,
    /// Force the section id in game joins
    pub override_section_id: Option<u8>,
    /// Force the lobby event in joins
    pub override_lobby_event: Option<u8>,
    /// Force the lobby number in lobby joins
    pub override_lobby_number: Option<u8>,
    /// Force the rare seed in game joins
    pub override_random_seed: Option<u32>,
}

/// One slot of the lobby roster
#[derive(Debug, Clone, Default)]
pub struct LobbyPlayer {
    /// Guild card number as the client sees it (0 = empty slot)
    pub guild_card_number: u32,
    /// Display name
    pub name: String,
}

/// Roster size in a lobby
pub const LOBBY_SLOTS: usize = 12;

/// Roster size in a game
pub const GAME_SLOTS: usize = 4;

/// A brokered client↔server session
pub struct Session {
    /// Listener-assigned id, used only for log context
    pub id: u64,
    /// Protocol dialect, fixed for the session's life
    pub dialect: Dialect,
    /// Leg facing the local client
    pub client_channel: Channel,
    /// Leg facing the remote server
    pub server_channel: Channel,

    /// Licence for linked sessions; `None` leaves authentication untouched
    pub license: Option<Arc<License>>,
    /// Client sub-version from its original login
    pub sub_version: u8,
    /// Client language from its original login
    pub language: u8,
    /// Character name used when impersonating logins
    pub character_name: String,
    /// DC hardware id used by the V1 login shape
    pub hardware_id: u64,

    /// Identity the remote server assigned (0 until observed)
    pub remote_guild_card_number: u32,
    /// Stashed 0x20-byte client config from the remote server
    pub remote_client_config: [u8; CLIENT_CONFIG_SIZE],
    /// Behavior flags restored when the client returns home
    pub flags: SessionFlags,

    /// Lobby or game roster keyed by slot id
    pub lobby_players: Vec<LobbyPlayer>,
    /// The local client's slot id
    pub lobby_client_id: u8,
    /// Last reported leader slot id
    pub leader_client_id: u8,

    /// First 16 payload bytes of the last sizeable server frame, used to
    /// fill deliberately undersized retarget frames
    pub prev_server_frame: [u8; 16],
    /// Where the server leg reconnects next
    pub next_destination: Option<SocketAddr>,
    /// Driver should reconnect the server leg before reading again
    pub pending_server_reconnect: bool,

    /// Resolution holder of the BB multi-key detector, once one exists
    pub detector: Option<Arc<KeyResolution>>,
    /// Saved BB login payload replayed on server-leg rekey
    pub bb_login_frame: Vec<u8>,
    /// Work around upstream servers that checksum the retarget address
    pub enable_remote_ip_crc_patch: bool,
    /// CRC of the last retarget address, when the patch is armed
    pub remote_ip_crc: u32,

    /// Intercept execute-code frames and answer with this value
    pub function_call_return_value: Option<u32>,
    /// Operator toggles
    pub options: SessionOptions,
    /// One-shot operator-seeded item
    pub next_drop_item: Option<ItemData>,
    /// Item id allocator for seeded drops
    pub next_item_id: u32,
    /// Cached switch activation for switch assist
    pub last_switch_command: Option<[u8; 12]>,

    /// On-disk capture sink; writes are gated on `options.save_files`
    pub capture: CaptureSink,
    /// Port the local listener accepted this client on
    pub local_port: u16,
}

impl Session {
    /// Create a session around a freshly accepted client
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] if the capture directory cannot be
    /// created.
    pub fn new(
        id: u64,
        dialect: Dialect,
        local_port: u16,
        capture_dir: impl Into<std::path::PathBuf>,
    ) -> Result<Self, SessionError> {
        Ok(Self {
            id,
            dialect,
            client_channel: Channel::new(dialect),
            server_channel: Channel::new(dialect),
            license: None,
            sub_version: 0,
            language: 0,
            character_name: String::new(),
            hardware_id: 0,
            remote_guild_card_number: 0,
            remote_client_config: [0; CLIENT_CONFIG_SIZE],
            flags: SessionFlags::new(),
            lobby_players: vec![LobbyPlayer::default(); LOBBY_SLOTS],
            lobby_client_id: 0,
            leader_client_id: 0,
            prev_server_frame: [0; 16],
            next_destination: None,
            pending_server_reconnect: false,
            detector: None,
            bb_login_frame: Vec::new(),
            enable_remote_ip_crc_patch: false,
            remote_ip_crc: 0,
            function_call_return_value: None,
            options: SessionOptions::default(),
            next_drop_item: None,
            next_item_id: 0x0F00_0000,
            last_switch_command: None,
            capture: CaptureSink::new(capture_dir)?,
            local_port,
        })
    }

    /// Whether this session impersonates authentication upstream
    #[must_use]
    pub fn is_linked(&self) -> bool {
        self.license.is_some()
    }

    /// Allocate an item id for a seeded drop
    pub fn allocate_item_id(&mut self) -> u32 {
        let id = self.next_item_id;
        self.next_item_id = self.next_item_id.wrapping_add(1);
        id
    }

    /// Reset the roster to `slots` empty entries
    pub fn reset_lobby(&mut self, slots: usize) {
        self.lobby_players.clear();
        self.lobby_players.resize_with(slots, LobbyPlayer::default);
    }

    /// Record a roster entry, ignoring out-of-range slots
    pub fn set_lobby_player(&mut self, slot: usize, guild_card_number: u32, name: String) {
        match self.lobby_players.get_mut(slot) {
            Some(player) => {
                player.guild_card_number = guild_card_number;
                player.name = name;
                tracing::info!(slot, guild_card_number, "added lobby player");
            }
            None => tracing::warn!(slot, "ignoring out-of-range player slot"),
        }
    }

    /// Clear a roster entry, ignoring out-of-range slots
    pub fn clear_lobby_player(&mut self, slot: usize) {
        match self.lobby_players.get_mut(slot) {
            Some(player) => {
                player.guild_card_number = 0;
                player.name.clear();
                tracing::info!(slot, "removed lobby player");
            }
            None => tracing::warn!(slot, "leave references missing player slot"),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("dialect", &self.dialect)
            .field("linked", &self.is_linked())
            .field("remote_guild_card_number", &self.remote_guild_card_number)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_bookkeeping() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(1, Dialect::Gc, 9100, dir.path()).unwrap();
        assert_eq!(session.lobby_players.len(), LOBBY_SLOTS);

        session.set_lobby_player(3, 1000, "Alice".into());
        assert_eq!(session.lobby_players[3].guild_card_number, 1000);

        // Out-of-range slots are ignored, not fatal
        session.set_lobby_player(40, 1, String::new());
        session.clear_lobby_player(3);
        assert_eq!(session.lobby_players[3].guild_card_number, 0);

        session.reset_lobby(GAME_SLOTS);
        assert_eq!(session.lobby_players.len(), GAME_SLOTS);
    }

    #[test]
    fn item_ids_are_sequential() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = Session::new(1, Dialect::Dc, 9100, dir.path()).unwrap();
        let a = session.allocate_item_id();
        let b = session.allocate_item_id();
        assert_eq!(b, a + 1);
    }

    #[test]
    fn flags_accumulate() {
        let mut flags = SessionFlags::new();
        assert!(!flags.has(SessionFlags::SAVE_ENABLED));
        flags.set(SessionFlags::SAVE_ENABLED);
        flags.set(SessionFlags::DC_V1);
        assert!(flags.has(SessionFlags::SAVE_ENABLED));
        assert!(flags.has(SessionFlags::DC_V1));
        assert!(!flags.has(SessionFlags::NO_MESSAGE_BOX_CONFIRM));
    }
}
