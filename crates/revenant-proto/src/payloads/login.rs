//! Login frames the proxy synthesises upstream, plus the `04` client-config
//! update it rewrites.
//!
//! The login builders cover the four authentication shapes the handshake
//! needs: `93` (DC V1), `9D` (DC V2 / PC), `9E` (GC, optionally extended),
//! and `DB` (V3 licence check). They are write-only; the proxy never parses
//! a login it did not build.

use crate::error::ProtoError;
use crate::payloads::{get_u32_le, put_fixed_str, put_u32_le, require};
use crate::CLIENT_CONFIG_SIZE;

/// Player tag used once a guild card number is known
pub const PLAYER_TAG_KNOWN: u32 = 0x0001_0000;

/// Player tag used before any guild card number was assigned
pub const PLAYER_TAG_UNSET: u32 = 0xFFFF_0000;

/// Guild card placeholder before any number was assigned
pub const GUILD_CARD_UNSET: u32 = 0xFFFF_FFFF;

/// Credentials shared by every login shape
#[derive(Debug, Clone)]
pub struct LoginCredentials {
    /// Guild card number to present upstream (`None` before assignment)
    pub guild_card_number: Option<u32>,
    /// Serial number, rendered as eight uppercase hex digits
    pub serial_number: u32,
    /// Access key string
    pub access_key: String,
    /// Client sub-version byte
    pub sub_version: u8,
    /// Language byte
    pub language: u8,
    /// Character name
    pub name: String,
}

impl LoginCredentials {
    fn tag_and_card(&self) -> (u32, u32) {
        match self.guild_card_number {
            Some(number) => (PLAYER_TAG_KNOWN, number),
            None => (PLAYER_TAG_UNSET, GUILD_CARD_UNSET),
        }
    }

    fn serial_text(&self) -> String {
        format!("{:08X}", self.serial_number)
    }
}

/// Build a `93` DC V1 login
#[must_use]
pub fn build_93(creds: &LoginCredentials, hardware_id: u64) -> Vec<u8> {
    let (tag, card) = creds.tag_and_card();
    let mut out = vec![0u8; 0x68];
    put_u32_le(&mut out, 0x00, tag);
    put_u32_le(&mut out, 0x04, card);
    out[0x10] = creds.sub_version;
    out[0x11] = 0; // not extended
    out[0x12] = creds.language;
    put_fixed_str(&mut out, 0x14, 0x10, &creds.serial_text());
    put_fixed_str(&mut out, 0x24, 0x10, &creds.access_key);
    out[0x34..0x3C].copy_from_slice(&hardware_id.to_le_bytes());
    put_fixed_str(&mut out, 0x3C, 0x10, &creds.name);
    out
}

/// Build a `9D` DC V2 / PC login
#[must_use]
pub fn build_9d(creds: &LoginCredentials) -> Vec<u8> {
    let (tag, card) = creds.tag_and_card();
    let mut out = vec![0u8; 0x78];
    put_u32_le(&mut out, 0x00, tag);
    put_u32_le(&mut out, 0x04, card);
    // unused block the real client leaves at FF..FF 00 00
    out[0x08..0x10].copy_from_slice(&0xFFFF_FFFF_FFFF_0000u64.to_le_bytes());
    out[0x10] = creds.sub_version;
    out[0x11] = 0;
    out[0x12] = creds.language;
    let serial = creds.serial_text();
    put_fixed_str(&mut out, 0x14, 0x10, &serial);
    put_fixed_str(&mut out, 0x24, 0x10, &creds.access_key);
    put_fixed_str(&mut out, 0x34, 0x10, &serial);
    put_fixed_str(&mut out, 0x44, 0x10, &creds.access_key);
    put_fixed_str(&mut out, 0x54, 0x10, &creds.name);
    out
}

/// Build a `9E` GC login carrying the stashed client config
///
/// The extended form is used only before a guild card number is known; it
/// appends the zeroed extension block the client would send on its first
/// contact with a server.
#[must_use]
pub fn build_9e(creds: &LoginCredentials, client_config: &[u8; CLIENT_CONFIG_SIZE]) -> Vec<u8> {
    let is_extended = creds.guild_card_number.is_none();
    let (tag, card) = creds.tag_and_card();
    let base = 0x78 + CLIENT_CONFIG_SIZE;
    let mut out = vec![0u8; if is_extended { base + 0x8C } else { base }];
    put_u32_le(&mut out, 0x00, tag);
    put_u32_le(&mut out, 0x04, card);
    out[0x10] = creds.sub_version;
    out[0x11] = u8::from(is_extended);
    out[0x12] = creds.language;
    let serial = creds.serial_text();
    put_fixed_str(&mut out, 0x14, 0x10, &serial);
    put_fixed_str(&mut out, 0x24, 0x10, &creds.access_key);
    put_fixed_str(&mut out, 0x34, 0x10, &serial);
    put_fixed_str(&mut out, 0x44, 0x10, &creds.access_key);
    put_fixed_str(&mut out, 0x54, 0x10, &creds.name);
    out[0x78..0x78 + CLIENT_CONFIG_SIZE].copy_from_slice(client_config);
    out
}

/// Build a `DB` V3 licence verification
#[must_use]
pub fn build_db(creds: &LoginCredentials, password: &str) -> Vec<u8> {
    let mut out = vec![0u8; 0x58];
    let serial = creds.serial_text();
    put_fixed_str(&mut out, 0x00, 0x10, &serial);
    put_fixed_str(&mut out, 0x10, 0x10, &creds.access_key);
    out[0x20] = creds.sub_version;
    put_fixed_str(&mut out, 0x24, 0x10, &serial);
    put_fixed_str(&mut out, 0x34, 0x10, &creds.access_key);
    put_fixed_str(&mut out, 0x44, 0x10, password);
    out
}

/// `04` UpdateClientConfig view:
/// `{player_tag: u32, guild_card_number: u32, cfg: [u8; 0x20]}`
///
/// Servers may send a short `04` that carries fewer than 0x20 config bytes;
/// only the two leading words are required.
#[derive(Debug)]
pub struct UpdateClientConfig<'a> {
    data: &'a mut [u8],
}

impl<'a> UpdateClientConfig<'a> {
    /// Offset of the config blob
    pub const CFG_OFFSET: usize = 8;
    /// Full payload length
    pub const FULL_LEN: usize = Self::CFG_OFFSET + CLIENT_CONFIG_SIZE;

    /// Parse, requiring only the leading words
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the guild card field is missing.
    pub fn parse(data: &'a mut [u8]) -> Result<Self, ProtoError> {
        require(data, Self::CFG_OFFSET)?;
        Ok(Self { data })
    }

    /// Guild card number assigned by the remote server
    #[must_use]
    pub fn guild_card_number(&self) -> u32 {
        get_u32_le(self.data, 4)
    }

    /// Replace the guild card number
    pub fn set_guild_card_number(&mut self, value: u32) {
        put_u32_le(self.data, 4, value);
    }

    /// Config bytes actually present (possibly fewer than 0x20)
    #[must_use]
    pub fn cfg(&self) -> &[u8] {
        let end = self.data.len().min(Self::FULL_LEN);
        &self.data[Self::CFG_OFFSET..end]
    }
}

/// Build a full `04` payload from a stashed config
#[must_use]
pub fn build_04(guild_card_number: u32, cfg: &[u8; CLIENT_CONFIG_SIZE]) -> Vec<u8> {
    let mut out = vec![0u8; UpdateClientConfig::FULL_LEN];
    put_u32_le(&mut out, 0, PLAYER_TAG_KNOWN);
    put_u32_le(&mut out, 4, guild_card_number);
    out[UpdateClientConfig::CFG_OFFSET..].copy_from_slice(cfg);
    out
}

/// Build a `B3` execute-code result
#[must_use]
pub fn build_b3(return_value: u32) -> Vec<u8> {
    let mut out = vec![0u8; 8];
    put_u32_le(&mut out, 0, return_value);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> LoginCredentials {
        LoginCredentials {
            guild_card_number: None,
            serial_number: 0xDEAD_BEEF,
            access_key: "AAAAAAAA".into(),
            sub_version: 0x33,
            language: 1,
            name: "Hunter".into(),
        }
    }

    #[test]
    fn db_carries_serial_and_access_key() {
        let out = build_db(&creds(), "pass");
        assert_eq!(&out[0x00..0x08], b"DEADBEEF");
        assert_eq!(&out[0x10..0x18], b"AAAAAAAA");
        assert_eq!(out[0x20], 0x33);
        assert_eq!(&out[0x44..0x48], b"pass");
    }

    #[test]
    fn unset_guild_card_uses_placeholder_tag() {
        let out = build_9d(&creds());
        assert_eq!(get_u32_le(&out, 0), PLAYER_TAG_UNSET);
        assert_eq!(get_u32_le(&out, 4), GUILD_CARD_UNSET);

        let mut with_card = creds();
        with_card.guild_card_number = Some(1000);
        let out = build_9d(&with_card);
        assert_eq!(get_u32_le(&out, 0), PLAYER_TAG_KNOWN);
        assert_eq!(get_u32_le(&out, 4), 1000);
    }

    #[test]
    fn extended_9e_only_without_guild_card() {
        let cfg = [0xABu8; CLIENT_CONFIG_SIZE];
        let fresh = build_9e(&creds(), &cfg);
        let mut known = creds();
        known.guild_card_number = Some(7);
        let resumed = build_9e(&known, &cfg);
        assert!(fresh.len() > resumed.len());
        assert_eq!(fresh[0x11], 1);
        assert_eq!(resumed[0x11], 0);
        assert_eq!(&resumed[0x78..0x98], &cfg);
    }

    #[test]
    fn update_client_config_rewrites() {
        let mut data = build_04(1000, &[0u8; CLIENT_CONFIG_SIZE]);
        let mut view = UpdateClientConfig::parse(&mut data).unwrap();
        assert_eq!(view.guild_card_number(), 1000);
        view.set_guild_card_number(2000);
        assert_eq!(view.guild_card_number(), 2000);
        assert_eq!(view.cfg().len(), CLIENT_CONFIG_SIZE);
    }

    #[test]
    fn short_04_exposes_partial_cfg() {
        let mut data = vec![0u8; 0x10];
        let view = UpdateClientConfig::parse(&mut data).unwrap();
        assert_eq!(view.cfg().len(), 8);
    }
}
