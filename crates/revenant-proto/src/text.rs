//! Text encoding for synthetic messages.
//!
//! DC/GC/XB/PATCH carry narrow (byte) text; PC/BB carry 16-bit text. The
//! proxy only ever synthesises ASCII, so narrow encoding is a byte copy and
//! wide encoding is UTF-16LE. Inbound text is decoded with the same rules;
//! non-ASCII narrow bytes pass through untranslated.

use crate::dialect::Dialect;

/// Encode `text` plus a NUL terminator in the dialect's width
#[must_use]
pub fn encode(dialect: Dialect, text: &str) -> Vec<u8> {
    if dialect.wide_text() {
        let mut out = Vec::with_capacity((text.len() + 1) * 2);
        for unit in text.encode_utf16() {
            out.extend_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&[0, 0]);
        out
    } else {
        let mut out = Vec::with_capacity(text.len() + 1);
        out.extend_from_slice(text.as_bytes());
        out.push(0);
        out
    }
}

/// Decode a text body in the dialect's width, stopping at the first NUL
#[must_use]
pub fn decode(dialect: Dialect, data: &[u8]) -> String {
    if dialect.wide_text() {
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .take_while(|&u| u != 0)
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        data[..end].iter().map(|&b| b as char).collect()
    }
}

/// Normalise chat color tags in place; returns true if anything changed
///
/// Client chat that does not start with a color escape is given the default
/// white tag so downstream servers render it consistently. The body is byte
/// text on narrow dialects and UTF-16 pairs on wide ones, but the escape
/// characters are ASCII in both, so the check operates on the first units.
pub fn add_color_inplace(dialect: Dialect, data: &mut Vec<u8>) -> bool {
    let has_tag = if dialect.wide_text() {
        data.len() >= 4 && data[0] == b'\t' && data[1] == 0 && data[2] == b'C' && data[3] == 0
    } else {
        data.len() >= 2 && data[0] == b'\t' && data[1] == b'C'
    };
    if has_tag || data.is_empty() {
        return false;
    }
    let prefix: &[u8] = if dialect.wide_text() {
        &[b'\t', 0, b'C', 0, b'7', 0]
    } else {
        b"\tC7"
    };
    data.splice(0..0, prefix.iter().copied());
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrow_round_trip() {
        let bytes = encode(Dialect::Gc, "hello");
        assert_eq!(bytes, b"hello\0");
        assert_eq!(decode(Dialect::Gc, &bytes), "hello");
    }

    #[test]
    fn wide_round_trip() {
        let bytes = encode(Dialect::Pc, "hi");
        assert_eq!(bytes, vec![b'h', 0, b'i', 0, 0, 0]);
        assert_eq!(decode(Dialect::Pc, &bytes), "hi");
    }

    #[test]
    fn decode_stops_at_nul() {
        assert_eq!(decode(Dialect::Dc, b"abc\0def"), "abc");
    }

    #[test]
    fn color_tag_added_once() {
        let mut body = b"hello".to_vec();
        assert!(add_color_inplace(Dialect::Gc, &mut body));
        assert_eq!(&body, b"\tC7hello");
        assert!(!add_color_inplace(Dialect::Gc, &mut body));
    }
}
