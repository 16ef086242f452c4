//! Dialect tags and per-dialect framing parameters.
//!
//! A dialect is fixed for the life of a session and selects the header
//! layout, the frame alignment, the text width, and the cipher family used
//! by the handshake.

use crate::{ALIGN_BB, ALIGN_V2_V3};

/// The six protocol dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Dreamcast (narrow text, V2 ciphers)
    Dc,
    /// PC (wide text, V2 ciphers)
    Pc,
    /// GameCube (narrow text, V3 ciphers, big-endian header size)
    Gc,
    /// Xbox (narrow text, V3 ciphers)
    Xb,
    /// Blue Burst (wide text, BB ciphers, 8-byte header)
    Bb,
    /// Patch server (narrow text, V2 ciphers, PC header layout)
    Patch,
}

impl Dialect {
    /// All dialects, in handler-table row order
    pub const ALL: [Dialect; 6] = [
        Dialect::Dc,
        Dialect::Pc,
        Dialect::Gc,
        Dialect::Xb,
        Dialect::Bb,
        Dialect::Patch,
    ];

    /// Frame header size in bytes
    #[must_use]
    pub fn header_size(self) -> usize {
        match self {
            Dialect::Bb => 8,
            _ => 4,
        }
    }

    /// Frame alignment in bytes
    #[must_use]
    pub fn alignment(self) -> usize {
        match self {
            Dialect::Bb => ALIGN_BB,
            _ => ALIGN_V2_V3,
        }
    }

    /// Whether user-visible text is 16-bit on this dialect
    #[must_use]
    pub fn wide_text(self) -> bool {
        matches!(self, Dialect::Pc | Dialect::Bb)
    }

    /// Whether the handshake installs the V3 cipher family (V2 otherwise;
    /// BB is neither and uses its own key schedule)
    #[must_use]
    pub fn uses_v3_crypt(self) -> bool {
        matches!(self, Dialect::Gc | Dialect::Xb)
    }

    /// Row index into the handler tables
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Dialect::Dc => 0,
            Dialect::Pc => 1,
            Dialect::Gc => 2,
            Dialect::Xb => 3,
            Dialect::Bb => 4,
            Dialect::Patch => 5,
        }
    }
}

impl std::fmt::Display for Dialect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Dialect::Dc => "dc",
            Dialect::Pc => "pc",
            Dialect::Gc => "gc",
            Dialect::Xb => "xb",
            Dialect::Bb => "bb",
            Dialect::Patch => "patch",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_parameters() {
        assert_eq!(Dialect::Bb.header_size(), 8);
        assert_eq!(Dialect::Bb.alignment(), 8);
        for d in [Dialect::Dc, Dialect::Pc, Dialect::Gc, Dialect::Xb, Dialect::Patch] {
            assert_eq!(d.header_size(), 4);
            assert_eq!(d.alignment(), 4);
        }
    }

    #[test]
    fn row_indices_are_distinct() {
        let mut seen = [false; 6];
        for d in Dialect::ALL {
            assert!(!seen[d.index()]);
            seen[d.index()] = true;
        }
    }
}
