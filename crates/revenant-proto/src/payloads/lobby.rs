//! Lobby and game roster payloads: join, leave, arrows, choice search and
//! card-lobby entries.
//!
//! The join layouts differ between dialects only in fixed offsets (entry
//! sizes and name widths), so each view carries a [`RosterLayout`] chosen by
//! dialect instead of being generic over a struct shape.

use crate::dialect::Dialect;
use crate::error::ProtoError;
use crate::payloads::{get_u32_le, put_u32_le, require};
use crate::text;

/// Per-dialect roster entry geometry
#[derive(Debug, Clone, Copy)]
pub struct RosterLayout {
    /// Size of one entry in bytes
    pub entry_size: usize,
    /// Offset of the guild card number within an entry
    pub guild_card_offset: usize,
    /// Offset of the client id word within an entry
    pub client_id_offset: usize,
    /// Offset of the display name, if the layout carries one
    pub name_offset: Option<usize>,
    /// Whether the name field is 16-bit text
    pub wide_name: bool,
}

/// Size of the per-player network block shared by every dialect
const LOBBY_DATA_LEN: usize = 16;

/// Extra per-player network bytes carried by the XB dialect
const XB_NETLOC_LEN: usize = 24;

impl RosterLayout {
    /// Layout of one `65`/`67`/`68` join-lobby entry
    #[must_use]
    pub fn join_lobby(dialect: Dialect) -> Self {
        let (net_len, disp_len, wide) = match dialect {
            Dialect::Dc | Dialect::Gc => (LOBBY_DATA_LEN, 0x30, false),
            Dialect::Xb => (LOBBY_DATA_LEN + XB_NETLOC_LEN, 0x30, false),
            Dialect::Pc | Dialect::Bb => (LOBBY_DATA_LEN, 0x40, true),
            // The patch dialect never joins a lobby; give it the narrow shape
            Dialect::Patch => (LOBBY_DATA_LEN, 0x30, false),
        };
        Self {
            entry_size: net_len + disp_len,
            guild_card_offset: 4,
            client_id_offset: 12,
            name_offset: Some(net_len),
            wide_name: wide,
        }
    }

    /// Layout of one `64` join-game network entry (no display block)
    #[must_use]
    pub fn join_game(dialect: Dialect) -> Self {
        let net_len = match dialect {
            Dialect::Xb => LOBBY_DATA_LEN + XB_NETLOC_LEN,
            _ => LOBBY_DATA_LEN,
        };
        Self {
            entry_size: net_len,
            guild_card_offset: 4,
            client_id_offset: 12,
            name_offset: None,
            wide_name: false,
        }
    }
}

/// `65`/`67`/`68` join-lobby view: a 12-byte header followed by `flag`
/// roster entries
#[derive(Debug)]
pub struct JoinLobby<'a> {
    data: &'a mut [u8],
    layout: RosterLayout,
    count: usize,
}

/// Length of the join-lobby fixed header
pub const JOIN_LOBBY_HEADER_LEN: usize = 12;

impl<'a> JoinLobby<'a> {
    /// Parse a join-lobby payload carrying `count` entries
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the declared entries do not fit.
    pub fn parse(dialect: Dialect, data: &'a mut [u8], count: usize) -> Result<Self, ProtoError> {
        let layout = RosterLayout::join_lobby(dialect);
        require(data, JOIN_LOBBY_HEADER_LEN + count * layout.entry_size)?;
        Ok(Self { data, layout, count })
    }

    /// Entry count this view was parsed with
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// The receiving client's slot id
    #[must_use]
    pub fn client_id(&self) -> u8 {
        self.data[0]
    }

    /// Current room leader slot id
    #[must_use]
    pub fn leader_id(&self) -> u8 {
        self.data[1]
    }

    /// Lobby number byte
    pub fn set_lobby_number(&mut self, value: u8) {
        self.data[3] = value;
    }

    /// Lobby event
    pub fn set_event(&mut self, value: u8) {
        self.data[6] = value;
        self.data[7] = 0;
    }

    fn entry_off(&self, index: usize) -> Result<usize, ProtoError> {
        if index >= self.count {
            return Err(ProtoError::EntryOutOfRange { index, count: self.count });
        }
        Ok(JOIN_LOBBY_HEADER_LEN + index * self.layout.entry_size)
    }

    /// Guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn guild_card(&self, index: usize) -> Result<u32, ProtoError> {
        let off = self.entry_off(index)?;
        Ok(get_u32_le(self.data, off + self.layout.guild_card_offset))
    }

    /// Replace the guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn set_guild_card(&mut self, index: usize, value: u32) -> Result<(), ProtoError> {
        let off = self.entry_off(index)?;
        put_u32_le(self.data, off + self.layout.guild_card_offset, value);
        Ok(())
    }

    /// Slot id of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn slot(&self, index: usize) -> Result<u8, ProtoError> {
        let off = self.entry_off(index)?;
        Ok((get_u32_le(self.data, off + self.layout.client_id_offset) & 0xFF) as u8)
    }

    /// Display name of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn name(&self, index: usize) -> Result<String, ProtoError> {
        let off = self.entry_off(index)?;
        let Some(name_off) = self.layout.name_offset else {
            return Ok(String::new());
        };
        let width = if self.layout.wide_name { 0x20 } else { 0x10 };
        let dialect = if self.layout.wide_name { Dialect::Pc } else { Dialect::Gc };
        Ok(text::decode(dialect, &self.data[off + name_off..off + name_off + width]))
    }
}

/// Fixed entry count of a `64` join-game frame
pub const JOIN_GAME_ENTRIES: usize = 4;

/// Length of the per-game variations table leading a `64`
pub const VARIATIONS_LEN: usize = 0x80;

/// Size of one Episode-3 extension block appended per player
const EP3_PLAYER_LEN: usize = 0x80;

/// Name offset within an Episode-3 extension block
const EP3_NAME_OFFSET: usize = 0x10;

/// `64` join-game view
#[derive(Debug)]
pub struct JoinGame<'a> {
    data: &'a mut [u8],
    layout: RosterLayout,
    tail: usize,
}

impl<'a> JoinGame<'a> {
    /// Parse a join-game payload
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the four network entries and the
    /// trailing game parameters do not fit.
    pub fn parse(dialect: Dialect, data: &'a mut [u8]) -> Result<Self, ProtoError> {
        let layout = RosterLayout::join_game(dialect);
        let tail = VARIATIONS_LEN + JOIN_GAME_ENTRIES * layout.entry_size;
        require(data, tail + 12)?;
        Ok(Self { data, layout, tail })
    }

    /// Whether the payload carries the Episode-3 extension blocks
    #[must_use]
    pub fn has_ep3_extension(&self) -> bool {
        self.data.len() >= self.tail + 12 + JOIN_GAME_ENTRIES * EP3_PLAYER_LEN
    }

    /// The receiving client's slot id
    #[must_use]
    pub fn client_id(&self) -> u8 {
        self.data[self.tail]
    }

    /// Current room leader slot id
    #[must_use]
    pub fn leader_id(&self) -> u8 {
        self.data[self.tail + 1]
    }

    /// Replace the section id
    pub fn set_section_id(&mut self, value: u8) {
        self.data[self.tail + 6] = value;
    }

    /// Replace the lobby event
    pub fn set_event(&mut self, value: u8) {
        self.data[self.tail + 5] = value;
    }

    /// Replace the rare seed
    pub fn set_rare_seed(&mut self, value: u32) {
        put_u32_le(self.data, self.tail + 8, value);
    }

    fn entry_off(&self, index: usize) -> Result<usize, ProtoError> {
        if index >= JOIN_GAME_ENTRIES {
            return Err(ProtoError::EntryOutOfRange { index, count: JOIN_GAME_ENTRIES });
        }
        Ok(VARIATIONS_LEN + index * self.layout.entry_size)
    }

    /// Guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] for `index >= 4`.
    pub fn guild_card(&self, index: usize) -> Result<u32, ProtoError> {
        let off = self.entry_off(index)?;
        Ok(get_u32_le(self.data, off + self.layout.guild_card_offset))
    }

    /// Replace the guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] for `index >= 4`.
    pub fn set_guild_card(&mut self, index: usize, value: u32) -> Result<(), ProtoError> {
        let off = self.entry_off(index)?;
        put_u32_le(self.data, off + self.layout.guild_card_offset, value);
        Ok(())
    }

    /// Display name from the Episode-3 extension, if present
    #[must_use]
    pub fn ep3_name(&self, index: usize) -> Option<String> {
        if !self.has_ep3_extension() || index >= JOIN_GAME_ENTRIES {
            return None;
        }
        let base = self.tail + 12 + index * EP3_PLAYER_LEN + EP3_NAME_OFFSET;
        Some(text::decode(Dialect::Gc, &self.data[base..base + 0x10]))
    }
}

/// `66`/`69` leave-lobby view: `{client_id: u8, leader_id: u8, unused: u16}`
#[derive(Debug)]
pub struct LeaveLobby<'a> {
    data: &'a [u8],
}

impl<'a> LeaveLobby<'a> {
    /// Parse a leave-lobby payload
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] on fewer than 4 bytes.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtoError> {
        require(data, 4)?;
        Ok(Self { data })
    }

    /// Slot being vacated
    #[must_use]
    pub fn client_id(&self) -> u8 {
        self.data[0]
    }

    /// Leader after the departure
    #[must_use]
    pub fn leader_id(&self) -> u8 {
        self.data[1]
    }
}

/// Build a `69` leave-lobby notification payload
#[must_use]
pub fn build_leave_lobby(client_id: u8, leader_id: u8) -> Vec<u8> {
    vec![client_id, leader_id, 0, 0]
}

/// Size of one `88` arrow-update entry
pub const ARROW_ENTRY_LEN: usize = 12;

/// `88` arrow-update view: `flag` entries of
/// `{player_tag: u32, guild_card_number: u32, arrow_color: u32}`
#[derive(Debug)]
pub struct ArrowUpdate<'a> {
    data: &'a mut [u8],
    count: usize,
}

impl<'a> ArrowUpdate<'a> {
    /// Parse an arrow-update list carrying `count` entries
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the entries do not fit.
    pub fn parse(data: &'a mut [u8], count: usize) -> Result<Self, ProtoError> {
        require(data, count * ARROW_ENTRY_LEN)?;
        Ok(Self { data, count })
    }

    /// Guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn guild_card(&self, index: usize) -> Result<u32, ProtoError> {
        if index >= self.count {
            return Err(ProtoError::EntryOutOfRange { index, count: self.count });
        }
        Ok(get_u32_le(self.data, index * ARROW_ENTRY_LEN + 4))
    }

    /// Replace the guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn set_guild_card(&mut self, index: usize, value: u32) -> Result<(), ProtoError> {
        if index >= self.count {
            return Err(ProtoError::EntryOutOfRange { index, count: self.count });
        }
        put_u32_le(self.data, index * ARROW_ENTRY_LEN + 4, value);
        Ok(())
    }
}

/// Size of one `C4` choice-search result entry
pub const CHOICE_SEARCH_ENTRY_LEN: usize = 0xD4;

/// `C4` choice-search result view: `flag` entries with the guild card number
/// leading each entry. Some servers append trailing garbage, which the
/// client ignores; the view ignores it too.
#[derive(Debug)]
pub struct ChoiceSearchResult<'a> {
    data: &'a mut [u8],
    count: usize,
}

impl<'a> ChoiceSearchResult<'a> {
    /// Parse a choice-search result list carrying `count` entries
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the entries do not fit.
    pub fn parse(data: &'a mut [u8], count: usize) -> Result<Self, ProtoError> {
        require(data, count * CHOICE_SEARCH_ENTRY_LEN)?;
        Ok(Self { data, count })
    }

    /// Guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn guild_card(&self, index: usize) -> Result<u32, ProtoError> {
        if index >= self.count {
            return Err(ProtoError::EntryOutOfRange { index, count: self.count });
        }
        Ok(get_u32_le(self.data, index * CHOICE_SEARCH_ENTRY_LEN))
    }

    /// Replace the guild card number of entry `index`
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::EntryOutOfRange`] past the declared count.
    pub fn set_guild_card(&mut self, index: usize, value: u32) -> Result<(), ProtoError> {
        if index >= self.count {
            return Err(ProtoError::EntryOutOfRange { index, count: self.count });
        }
        put_u32_le(self.data, index * CHOICE_SEARCH_ENTRY_LEN, value);
        Ok(())
    }
}

/// Size of one `E4` card-lobby game entry
pub const CARD_LOBBY_ENTRY_LEN: usize = 16;

/// Entry count of an `E4` card-lobby frame
pub const CARD_LOBBY_ENTRIES: usize = 4;

/// `E4` Episode-3 card-lobby view: four fixed entries of
/// `{present: u32, guild_card_number: u32, client_id: u32, unused: u32}`
#[derive(Debug)]
pub struct CardLobbyGame<'a> {
    data: &'a mut [u8],
}

impl<'a> CardLobbyGame<'a> {
    /// Parse a card-lobby payload
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the four entries do not fit.
    pub fn parse(data: &'a mut [u8]) -> Result<Self, ProtoError> {
        require(data, CARD_LOBBY_ENTRIES * CARD_LOBBY_ENTRY_LEN)?;
        Ok(Self { data })
    }

    /// Guild card number of entry `index`
    #[must_use]
    pub fn guild_card(&self, index: usize) -> u32 {
        get_u32_le(self.data, index * CARD_LOBBY_ENTRY_LEN + 4)
    }

    /// Replace the guild card number of entry `index`
    pub fn set_guild_card(&mut self, index: usize, value: u32) {
        put_u32_le(self.data, index * CARD_LOBBY_ENTRY_LEN + 4, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lobby_payload(dialect: Dialect, entries: &[(u8, u32, &str)]) -> Vec<u8> {
        let layout = RosterLayout::join_lobby(dialect);
        let mut data = vec![0u8; JOIN_LOBBY_HEADER_LEN + entries.len() * layout.entry_size];
        for (i, &(slot, guild_card, name)) in entries.iter().enumerate() {
            let off = JOIN_LOBBY_HEADER_LEN + i * layout.entry_size;
            put_u32_le(&mut data, off + layout.guild_card_offset, guild_card);
            put_u32_le(&mut data, off + layout.client_id_offset, u32::from(slot));
            if let Some(name_off) = layout.name_offset {
                let encoded = if layout.wide_name {
                    text::encode(Dialect::Pc, name)
                } else {
                    text::encode(Dialect::Gc, name)
                };
                data[off + name_off..off + name_off + encoded.len()].copy_from_slice(&encoded);
            }
        }
        data
    }

    #[test]
    fn join_lobby_reads_entries_by_slot() {
        for dialect in [Dialect::Dc, Dialect::Pc, Dialect::Gc, Dialect::Xb, Dialect::Bb] {
            let mut data = lobby_payload(dialect, &[(3, 1000, "Alice"), (7, 2000, "Bob")]);
            let mut view = JoinLobby::parse(dialect, &mut data, 2).unwrap();
            assert_eq!(view.slot(0).unwrap(), 3);
            assert_eq!(view.guild_card(1).unwrap(), 2000);
            assert_eq!(view.name(0).unwrap(), "Alice");
            view.set_guild_card(0, 42).unwrap();
            assert_eq!(view.guild_card(0).unwrap(), 42);
            assert!(view.guild_card(2).is_err());
        }
    }

    #[test]
    fn join_game_tail_fields() {
        let layout = RosterLayout::join_game(Dialect::Gc);
        let mut data = vec![0u8; VARIATIONS_LEN + 4 * layout.entry_size + 12];
        let tail = VARIATIONS_LEN + 4 * layout.entry_size;
        data[tail] = 2; // client_id
        data[tail + 1] = 1; // leader_id
        let mut view = JoinGame::parse(Dialect::Gc, &mut data).unwrap();
        assert_eq!(view.client_id(), 2);
        assert_eq!(view.leader_id(), 1);
        assert!(!view.has_ep3_extension());
        view.set_section_id(9);
        view.set_rare_seed(0x1234_5678);
        view.set_guild_card(0, 77).unwrap();
        assert_eq!(view.guild_card(0).unwrap(), 77);
        assert_eq!(data[tail + 6], 9);
    }

    #[test]
    fn arrow_update_rewrites_all_matches() {
        let mut data = vec![0u8; 3 * ARROW_ENTRY_LEN];
        for i in 0..3 {
            put_u32_le(&mut data, i * ARROW_ENTRY_LEN + 4, 1000);
        }
        let mut view = ArrowUpdate::parse(&mut data, 3).unwrap();
        for i in 0..3 {
            assert_eq!(view.guild_card(i).unwrap(), 1000);
            view.set_guild_card(i, 2000).unwrap();
        }
        assert!(view.guild_card(3).is_err());
    }
}
