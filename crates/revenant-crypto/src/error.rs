//! Cipher error types.

use thiserror::Error;

/// Errors raised by the cipher families
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Buffer length not a multiple of the cipher's block size
    #[error("buffer length {len} not aligned to {block}-byte blocks")]
    UnalignedBuffer {
        /// Offending buffer length
        len: usize,
        /// Required block size
        block: usize,
    },

    /// A multi-key imitator was used before its detector resolved
    #[error("multi-key detector has not resolved a master key yet")]
    DetectorUnresolved,

    /// No candidate master key produced the expected plaintext
    #[error("no candidate master key matched the expected first-frame prefix")]
    KeyDetectionFailed,

    /// The detector cipher is decrypt-only
    #[error("detector cipher cannot encrypt")]
    DetectorCannotEncrypt,

    /// A master key file was the wrong size
    #[error("master key file has {0} bytes, expected {1}")]
    BadKeyFile(usize, usize),
}
