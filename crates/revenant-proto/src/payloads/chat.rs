//! Chat, guild-card search and simple-mail payloads.

use crate::dialect::Dialect;
use crate::error::ProtoError;
use crate::payloads::{get_u32_le, put_u32_le, require};
use crate::text;

/// Offset of the text body in a `01`/`06`/`11` text frame
pub const TEXT_BODY_OFFSET: usize = 8;

/// Text-header view shared by chat (`06`) and message (`01`/`11`) frames:
/// `{player_tag: u32, guild_card_number: u32, text...}`
#[derive(Debug)]
pub struct TextHeader<'a> {
    data: &'a mut [u8],
}

impl<'a> TextHeader<'a> {
    /// Parse a text frame
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the header words are missing.
    pub fn parse(data: &'a mut [u8]) -> Result<Self, ProtoError> {
        require(data, TEXT_BODY_OFFSET)?;
        Ok(Self { data })
    }

    /// Guild card number of the sender
    #[must_use]
    pub fn guild_card_number(&self) -> u32 {
        get_u32_le(self.data, 4)
    }

    /// Replace the sender guild card number
    pub fn set_guild_card_number(&mut self, value: u32) {
        put_u32_le(self.data, 4, value);
    }

    /// Decode the text body in the dialect's width
    #[must_use]
    pub fn decode_text(&self, dialect: Dialect) -> String {
        text::decode(dialect, &self.data[TEXT_BODY_OFFSET..])
    }
}

/// Build a text frame payload (header words zeroed, body padded to 4)
#[must_use]
pub fn build_text(dialect: Dialect, message: &str) -> Vec<u8> {
    let mut out = vec![0u8; TEXT_BODY_OFFSET];
    out.extend_from_slice(&text::encode(dialect, message));
    while out.len() % 4 != 0 {
        out.push(0);
    }
    out
}

/// Client `40` guild-card search:
/// `{player_tag: u32, searcher: u32, target: u32}`
#[derive(Debug)]
pub struct GuildCardSearch<'a> {
    data: &'a mut [u8],
}

impl<'a> GuildCardSearch<'a> {
    /// Parse a search request
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] on fewer than 12 bytes.
    pub fn parse(data: &'a mut [u8]) -> Result<Self, ProtoError> {
        require(data, 12)?;
        Ok(Self { data })
    }

    /// Searcher guild card number
    #[must_use]
    pub fn searcher(&self) -> u32 {
        get_u32_le(self.data, 4)
    }

    /// Replace the searcher guild card number
    pub fn set_searcher(&mut self, value: u32) {
        put_u32_le(self.data, 4, value);
    }

    /// Target guild card number
    #[must_use]
    pub fn target(&self) -> u32 {
        get_u32_le(self.data, 8)
    }

    /// Replace the target guild card number
    pub fn set_target(&mut self, value: u32) {
        put_u32_le(self.data, 8, value);
    }
}

/// Server `41` search result; the searcher and result guild card numbers
/// lead the payload at the same offsets on every dialect, the dialects only
/// differ in the reply text that follows (which the proxy never touches).
#[derive(Debug)]
pub struct GuildCardSearchResult<'a> {
    data: &'a mut [u8],
}

impl<'a> GuildCardSearchResult<'a> {
    /// Parse a search result
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] on fewer than 12 bytes.
    pub fn parse(data: &'a mut [u8]) -> Result<Self, ProtoError> {
        require(data, 12)?;
        Ok(Self { data })
    }

    /// Searcher guild card number
    #[must_use]
    pub fn searcher(&self) -> u32 {
        get_u32_le(self.data, 4)
    }

    /// Replace the searcher guild card number
    pub fn set_searcher(&mut self, value: u32) {
        put_u32_le(self.data, 4, value);
    }

    /// Found player's guild card number
    #[must_use]
    pub fn result(&self) -> u32 {
        get_u32_le(self.data, 8)
    }

    /// Replace the found player's guild card number
    pub fn set_result(&mut self, value: u32) {
        put_u32_le(self.data, 8, value);
    }
}

/// Simple-mail (`81`) field geometry, tagged by text width
#[derive(Debug, Clone, Copy)]
pub struct MailLayout {
    /// Offset of the recipient guild card number
    pub to_offset: usize,
    /// Offset of the message text
    pub text_offset: usize,
}

impl MailLayout {
    /// Layout for `dialect`
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        if dialect.wide_text() {
            // {tag, from_gc, from_name: [u16; 0x10], to_gc, to_name: [u16; 0x10]}
            Self { to_offset: 0x28, text_offset: 0x4C }
        } else {
            // {tag, from_gc, from_name: [u8; 0x10], to_gc, to_name: [u8; 0x10]}
            Self { to_offset: 0x18, text_offset: 0x2C }
        }
    }
}

/// `81` simple-mail view
#[derive(Debug)]
pub struct SimpleMail<'a> {
    data: &'a mut [u8],
    layout: MailLayout,
}

impl<'a> SimpleMail<'a> {
    /// Parse a mail payload
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the fixed fields do not fit.
    pub fn parse(dialect: Dialect, data: &'a mut [u8]) -> Result<Self, ProtoError> {
        let layout = MailLayout::for_dialect(dialect);
        require(data, layout.text_offset)?;
        Ok(Self { data, layout })
    }

    /// Sender guild card number
    #[must_use]
    pub fn from_guild_card(&self) -> u32 {
        get_u32_le(self.data, 4)
    }

    /// Replace the sender guild card number
    pub fn set_from_guild_card(&mut self, value: u32) {
        put_u32_le(self.data, 4, value);
    }

    /// Recipient guild card number
    #[must_use]
    pub fn to_guild_card(&self) -> u32 {
        get_u32_le(self.data, self.layout.to_offset)
    }

    /// Replace the recipient guild card number
    pub fn set_to_guild_card(&mut self, value: u32) {
        put_u32_le(self.data, self.layout.to_offset, value);
    }

    /// Zero everything after the text terminator; clients send
    /// uninitialised buffer tails that should not cross the proxy
    pub fn clear_text_tail(&mut self, dialect: Dialect) {
        let body = &mut self.data[self.layout.text_offset..];
        let end = if dialect.wide_text() {
            body.chunks_exact(2)
                .position(|c| c == [0, 0])
                .map_or(body.len(), |i| (i + 1) * 2)
        } else {
            body.iter().position(|&b| b == 0).map_or(body.len(), |i| i + 1)
        };
        body[end..].fill(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_result_offsets() {
        let mut data = vec![0u8; 0x20];
        put_u32_le(&mut data, 4, 1000);
        put_u32_le(&mut data, 8, 1000);
        let mut view = GuildCardSearchResult::parse(&mut data).unwrap();
        view.set_searcher(2000);
        view.set_result(2000);
        assert_eq!(get_u32_le(&data, 4), 2000);
        assert_eq!(get_u32_le(&data, 8), 2000);
    }

    #[test]
    fn mail_layout_differs_by_width() {
        let narrow = MailLayout::for_dialect(Dialect::Gc);
        let wide = MailLayout::for_dialect(Dialect::Pc);
        assert!(wide.to_offset > narrow.to_offset);
    }

    #[test]
    fn mail_tail_is_cleared() {
        let layout = MailLayout::for_dialect(Dialect::Gc);
        let mut data = vec![0u8; layout.text_offset + 8];
        data[layout.text_offset..layout.text_offset + 8]
            .copy_from_slice(&[b'h', b'i', 0, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE]);
        let mut view = SimpleMail::parse(Dialect::Gc, &mut data).unwrap();
        view.clear_text_tail(Dialect::Gc);
        assert_eq!(&data[layout.text_offset..], &[b'h', b'i', 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn build_text_pads_to_word() {
        let payload = build_text(Dialect::Gc, "abc");
        assert_eq!(payload.len() % 4, 0);
        let mut copy = payload.clone();
        let view = TextHeader::parse(&mut copy).unwrap();
        assert_eq!(view.decode_text(Dialect::Gc), "abc");
    }
}
