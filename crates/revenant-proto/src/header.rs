//! Frame header encoding and decoding.
//!
//! Four layouts cover the six dialects:
//!
//! - DC / XB: `{opcode: u8, flag: u8, size: u16 LE}`
//! - GC:      `{opcode: u8, flag: u8, size: u16 BE}`
//! - PC / PATCH: `{size: u16 LE, opcode: u8, flag: u8}`
//! - BB:      `{size: u16 LE, opcode: u16 LE, flag: u32 LE}`
//!
//! The size field counts the header. Frames are padded to the dialect
//! alignment on the wire; BB keeps the unpadded size in the header, the
//! other dialects store the padded size.

use crate::dialect::Dialect;
use crate::error::ProtoError;

/// Decoded frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Operation code
    pub opcode: u16,
    /// Flag field
    pub flag: u32,
    /// Declared frame size, counting the header but not alignment padding
    pub size: u16,
}

impl FrameHeader {
    /// Payload length this header declares
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::SizeUnderflow`] if the size field is smaller
    /// than the header itself.
    pub fn payload_len(&self, dialect: Dialect) -> Result<usize, ProtoError> {
        let header = dialect.header_size();
        (self.size as usize)
            .checked_sub(header)
            .ok_or(ProtoError::SizeUnderflow { size: self.size as usize, header })
    }

    /// Total bytes this frame occupies on the wire, including padding
    #[must_use]
    pub fn wire_len(&self, dialect: Dialect) -> usize {
        let align = dialect.alignment();
        let size = (self.size as usize).max(dialect.header_size());
        (size + align - 1) & !(align - 1)
    }
}

/// Decode a header from the front of `bytes`
///
/// # Errors
///
/// Returns [`ProtoError::TooShort`] if fewer than `dialect.header_size()`
/// bytes are available.
pub fn decode(dialect: Dialect, bytes: &[u8]) -> Result<FrameHeader, ProtoError> {
    let need = dialect.header_size();
    if bytes.len() < need {
        return Err(ProtoError::TooShort { expected: need, actual: bytes.len() });
    }
    let header = match dialect {
        Dialect::Dc | Dialect::Xb => FrameHeader {
            opcode: u16::from(bytes[0]),
            flag: u32::from(bytes[1]),
            size: u16::from_le_bytes([bytes[2], bytes[3]]),
        },
        Dialect::Gc => FrameHeader {
            opcode: u16::from(bytes[0]),
            flag: u32::from(bytes[1]),
            size: u16::from_be_bytes([bytes[2], bytes[3]]),
        },
        Dialect::Pc | Dialect::Patch => FrameHeader {
            opcode: u16::from(bytes[2]),
            flag: u32::from(bytes[3]),
            size: u16::from_le_bytes([bytes[0], bytes[1]]),
        },
        Dialect::Bb => FrameHeader {
            opcode: u16::from_le_bytes([bytes[2], bytes[3]]),
            flag: u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            size: u16::from_le_bytes([bytes[0], bytes[1]]),
        },
    };
    Ok(header)
}

/// Encode a header into the dialect's layout
#[must_use]
pub fn encode(dialect: Dialect, opcode: u16, flag: u32, size: u16) -> Vec<u8> {
    match dialect {
        Dialect::Dc | Dialect::Xb => {
            let s = size.to_le_bytes();
            vec![(opcode & 0xFF) as u8, (flag & 0xFF) as u8, s[0], s[1]]
        }
        Dialect::Gc => {
            let s = size.to_be_bytes();
            vec![(opcode & 0xFF) as u8, (flag & 0xFF) as u8, s[0], s[1]]
        }
        Dialect::Pc | Dialect::Patch => {
            let s = size.to_le_bytes();
            vec![s[0], s[1], (opcode & 0xFF) as u8, (flag & 0xFF) as u8]
        }
        Dialect::Bb => {
            let mut out = Vec::with_capacity(8);
            out.extend_from_slice(&size.to_le_bytes());
            out.extend_from_slice(&opcode.to_le_bytes());
            out.extend_from_slice(&flag.to_le_bytes());
            out
        }
    }
}

/// Build a complete frame: header, payload, alignment padding
///
/// Non-BB dialects pad the payload to the alignment and store the padded
/// size; BB stores the unpadded size and pads the wire frame to 8.
///
/// # Errors
///
/// Returns [`ProtoError::FrameTooLarge`] if the frame does not fit the
/// 16-bit size field.
pub fn frame(dialect: Dialect, opcode: u16, flag: u32, payload: &[u8]) -> Result<Vec<u8>, ProtoError> {
    let header_size = dialect.header_size();
    let align = dialect.alignment();
    let logical = header_size + payload.len();
    let padded = (logical + align - 1) & !(align - 1);
    if padded > usize::from(u16::MAX) {
        return Err(ProtoError::FrameTooLarge(padded));
    }

    let declared = if dialect == Dialect::Bb { logical } else { padded } as u16;
    let mut out = encode(dialect, opcode, flag, declared);
    out.reserve(padded - header_size);
    out.extend_from_slice(payload);
    out.resize(padded, 0);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gc_size_is_big_endian() {
        let bytes = encode(Dialect::Gc, 0x17, 0x00, 0x0123);
        assert_eq!(bytes, vec![0x17, 0x00, 0x01, 0x23]);
        let h = decode(Dialect::Gc, &bytes).unwrap();
        assert_eq!(h.size, 0x0123);
    }

    #[test]
    fn pc_layout_leads_with_size() {
        let bytes = encode(Dialect::Pc, 0x19, 0x02, 0x0010);
        assert_eq!(bytes, vec![0x10, 0x00, 0x19, 0x02]);
    }

    #[test]
    fn bb_header_is_eight_bytes() {
        let bytes = encode(Dialect::Bb, 0x0093, 0x0102_0304, 0x00B4);
        assert_eq!(bytes, vec![0xB4, 0x00, 0x93, 0x00, 0x04, 0x03, 0x02, 0x01]);
        let h = decode(Dialect::Bb, &bytes).unwrap();
        assert_eq!(h.opcode, 0x93);
        assert_eq!(h.flag, 0x0102_0304);
        assert_eq!(h.payload_len(Dialect::Bb).unwrap(), 0xB4 - 8);
    }

    #[test]
    fn framing_pads_to_alignment() {
        let f = frame(Dialect::Gc, 0x06, 0, &[1, 2, 3, 4, 5]).unwrap();
        assert_eq!(f.len(), 12);
        let h = decode(Dialect::Gc, &f).unwrap();
        assert_eq!(h.size, 12);

        let f = frame(Dialect::Bb, 0x06, 0, &[1, 2, 3]).unwrap();
        assert_eq!(f.len(), 16);
        let h = decode(Dialect::Bb, &f).unwrap();
        // BB keeps the unpadded size in the header
        assert_eq!(h.size, 11);
        assert_eq!(h.wire_len(Dialect::Bb), 16);
    }

    #[test]
    fn size_underflow_is_rejected() {
        let h = FrameHeader { opcode: 0, flag: 0, size: 2 };
        assert!(matches!(
            h.payload_len(Dialect::Dc),
            Err(ProtoError::SizeUnderflow { .. })
        ));
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn any_dialect() -> impl Strategy<Value = Dialect> {
            prop::sample::select(Dialect::ALL.to_vec())
        }

        proptest! {
            #[test]
            fn header_round_trip(
                dialect in any_dialect(),
                opcode in 0u16..=0xFF,
                flag in 0u32..=0xFF,
                size in 8u16..0x400,
            ) {
                let bytes = encode(dialect, opcode, flag, size);
                prop_assert_eq!(bytes.len(), dialect.header_size());
                let h = decode(dialect, &bytes).unwrap();
                prop_assert_eq!(h.opcode, opcode);
                prop_assert_eq!(h.flag, flag);
                prop_assert_eq!(h.size, size);
            }

            #[test]
            fn framed_commands_are_aligned(
                dialect in any_dialect(),
                payload in prop::collection::vec(any::<u8>(), 0..512),
            ) {
                let f = frame(dialect, 0x60, 0, &payload).unwrap();
                prop_assert_eq!(f.len() % dialect.alignment(), 0);
                let h = decode(dialect, &f).unwrap();
                prop_assert_eq!(h.wire_len(dialect), f.len());
                let len = h.payload_len(dialect).unwrap();
                // padding may extend the payload, never shrink it
                prop_assert!(len >= payload.len());
                prop_assert_eq!(&f[dialect.header_size()..dialect.header_size() + payload.len()], &payload[..]);
            }
        }
    }
}
