//! Error types for wire-level parsing.

use thiserror::Error;

/// Errors raised while decoding headers or payload layouts
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtoError {
    /// Payload shorter than the layout it claims to carry
    #[error("payload too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum size the layout requires
        expected: usize,
        /// Actual payload size
        actual: usize,
    },

    /// Header size field smaller than the header itself
    #[error("frame size {size} smaller than header size {header}")]
    SizeUnderflow {
        /// Declared frame size
        size: usize,
        /// Header size for the dialect
        header: usize,
    },

    /// Frame larger than a dialect permits
    #[error("frame size {0} exceeds the 16-bit size field")]
    FrameTooLarge(usize),

    /// Entry index outside the roster a join frame declares
    #[error("entry {index} out of range (count {count})")]
    EntryOutOfRange {
        /// Requested entry
        index: usize,
        /// Entries present
        count: usize,
    },
}
