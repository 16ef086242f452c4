//! The framed channel: one encrypted leg of a session.
//!
//! A channel owns the two cipher slots of its leg and the byte buffers
//! between the transport and the broker. It is transport-free: the driver
//! feeds raw socket bytes into [`Channel::receive_bytes`] and drains
//! [`Channel::take_outgoing`] back to the socket, which keeps every handler
//! synchronous and the whole broker testable without sockets.
//!
//! Decryption tracks a watermark: bytes before it are plaintext, bytes
//! after it are still ciphertext. Installing a new `crypt_in` therefore
//! leaves already-decrypted bytes alone and applies the new cipher from the
//! next byte on, which is exactly the mid-stream rekey the handshake needs.

use std::net::SocketAddr;

use revenant_crypto::PsoCipher;
use revenant_proto::{header, Command, Dialect};

use crate::error::SessionError;

/// One directional pair of an encrypted session leg
pub struct Channel {
    dialect: Dialect,
    /// Cipher applied to inbound bytes, when the handshake has installed one
    pub crypt_in: Option<Box<dyn PsoCipher>>,
    /// Cipher applied to outbound frames, when the handshake has installed one
    pub crypt_out: Option<Box<dyn PsoCipher>>,
    /// Whether this leg is backed by an in-process pipe instead of a socket
    pub is_virtual: bool,
    /// Local address of the backing socket, when there is one
    pub local_addr: Option<SocketAddr>,
    recv_buffer: Vec<u8>,
    decrypted: usize,
    send_buffer: Vec<u8>,
    connected: bool,
}

impl Channel {
    /// Create a channel with no transport attached
    #[must_use]
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            crypt_in: None,
            crypt_out: None,
            is_virtual: false,
            local_addr: None,
            recv_buffer: Vec::new(),
            decrypted: 0,
            send_buffer: Vec::new(),
            connected: false,
        }
    }

    /// Dialect this channel frames for
    #[must_use]
    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Whether a transport is attached
    #[must_use]
    pub fn connected(&self) -> bool {
        self.connected
    }

    /// Attach a transport endpoint
    pub fn attach(&mut self, local_addr: Option<SocketAddr>, is_virtual: bool) {
        self.connected = true;
        self.local_addr = local_addr;
        self.is_virtual = is_virtual;
    }

    /// Detach the transport; buffered bytes are discarded
    pub fn detach(&mut self) {
        self.connected = false;
        self.local_addr = None;
        self.recv_buffer.clear();
        self.decrypted = 0;
        self.send_buffer.clear();
    }

    /// Frame, encrypt and queue one command
    ///
    /// A disconnected channel drops the command with a warning; the proxy
    /// stays transparent even when one leg is gone.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on a framing or cipher failure.
    pub fn send(&mut self, opcode: u16, flag: u32, payload: &[u8]) -> Result<(), SessionError> {
        if !self.connected {
            tracing::warn!(opcode, "no endpoint present; dropping command");
            return Ok(());
        }
        let mut frame = header::frame(self.dialect, opcode, flag, payload)?;
        if let Some(cipher) = self.crypt_out.as_mut() {
            cipher.encrypt(&mut frame)?;
        }
        self.send_buffer.extend_from_slice(&frame);
        Ok(())
    }

    /// Bytes queued for the transport; empties the queue
    pub fn take_outgoing(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.send_buffer)
    }

    /// Whether any bytes are queued for the transport
    #[must_use]
    pub fn has_outgoing(&self) -> bool {
        !self.send_buffer.is_empty()
    }

    /// Feed raw transport bytes; returns every complete command they finish
    ///
    /// Partial trailing bytes stay buffered (and encrypted, until a full
    /// cipher block of them has arrived).
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] on a cipher failure or a malformed header.
    pub fn receive_bytes(&mut self, bytes: &[u8]) -> Result<Vec<Command>, SessionError> {
        self.recv_buffer.extend_from_slice(bytes);
        self.decrypt_pending()?;

        let header_size = self.dialect.header_size();
        let mut commands = Vec::new();
        loop {
            if self.decrypted < header_size {
                break;
            }
            let header = header::decode(self.dialect, &self.recv_buffer)?;
            let total = header.wire_len(self.dialect);
            if self.decrypted < total {
                break;
            }
            let payload_len = header.payload_len(self.dialect)?;
            let payload = self.recv_buffer[header_size..header_size + payload_len].to_vec();
            commands.push(Command::new(header.opcode, header.flag, payload));
            self.recv_buffer.drain(..total);
            self.decrypted -= total;
        }
        Ok(commands)
    }

    fn decrypt_pending(&mut self) -> Result<(), SessionError> {
        let Some(cipher) = self.crypt_in.as_mut() else {
            self.decrypted = self.recv_buffer.len();
            return Ok(());
        };
        let block = cipher.block_size();
        let pending = self.recv_buffer.len() - self.decrypted;
        let usable = pending - pending % block;
        if usable > 0 {
            let start = self.decrypted;
            cipher.decrypt(&mut self.recv_buffer[start..start + usable])?;
            self.decrypted += usable;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("dialect", &self.dialect)
            .field("connected", &self.connected)
            .field("is_virtual", &self.is_virtual)
            .field("encrypted", &self.crypt_in.is_some())
            .field("buffered", &(self.recv_buffer.len() - self.decrypted))
            .finish()
    }
}
