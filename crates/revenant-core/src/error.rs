//! Session-level error types.
//!
//! Three failure classes exist (protocol violations, policy refusals and
//! transient capture problems); only the first two surface as errors from a
//! handler and tear the session down. Transient problems are logged at WARN
//! where they happen and the frame keeps flowing.

use thiserror::Error;

use revenant_crypto::CryptoError;
use revenant_files::capture::CaptureError;
use revenant_files::prs::PrsError;
use revenant_proto::ProtoError;

/// Fatal session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Wire-level parse failure on a frame the proxy must understand
    #[error("protocol violation: {0}")]
    Proto(#[from] ProtoError),

    /// Cipher failure (misalignment, failed key detection)
    #[error("cipher failure: {0}")]
    Crypto(#[from] CryptoError),

    /// The patch dialect delivered a `17` server init, which it must not
    #[error("patch server sent a 17 server init")]
    PatchServerInit17,

    /// A licence kind the proxy cannot impersonate upstream
    #[error("unsupported licence kind: {0}")]
    UnsupportedLicence(&'static str),

    /// A resumed BB session without its saved login frame
    #[error("linked BB session has no saved login frame")]
    MissingBbLogin,

    /// An encrypted code blob declared more data than it decompressed to
    #[error("decompressed code smaller than declared size")]
    CodeSizeMismatch,

    /// A compressed payload that had to decode did not
    #[error("corrupt compressed payload: {0}")]
    Prs(#[from] PrsError),

    /// Transport failure on either leg
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),

    /// Either peer closed its leg
    #[error("{0} leg closed")]
    ChannelClosed(&'static str),
}

impl From<CaptureError> for SessionError {
    fn from(err: CaptureError) -> Self {
        // Capture failures are transient by contract; callers that get here
        // chose to escalate, which only io errors warrant
        match err {
            CaptureError::Io(e) => SessionError::Io(e),
            CaptureError::NotOpen(name) => {
                SessionError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, name))
            }
        }
    }
}
