//! BB multi-key detection: one detector resolves the client's master key by
//! trial-decrypting the first inbound frame; any number of imitators defer
//! to its choice.
//!
//! The detector is installed as the client-input cipher before anyone knows
//! which of the shipped master keys the client was built with. Its first
//! `decrypt` call sees the first encrypted frame, tries every candidate
//! from byte zero, and accepts the one whose plaintext starts with the
//! expected login prefix. The resolved key is published through a shared
//! [`KeyResolution`] holder; imitators construct their own session cipher
//! from it lazily on first use and fail with
//! [`CryptoError::DetectorUnresolved`] if driven too early. The broker's
//! frame ordering guarantees that cannot happen on a well-behaved session:
//! the upstream server stays silent until the proxy replays the client's
//! login, which happens after detection.

use std::sync::{Arc, OnceLock};

use crate::bb::{BbCipher, BbKeyFile};
use crate::error::CryptoError;
use crate::{BB_BLOCK, BB_SEED_SIZE, PsoCipher};

/// Expected plaintext prefix of the first client frame of a BB session
pub const EXPECTED_FIRST_FRAME: [u8; 8] = [0xB4, 0x00, 0x93, 0x00, 0x00, 0x00, 0x00, 0x00];

/// Resolve-exactly-once holder shared by a detector and its imitators
#[derive(Default)]
pub struct KeyResolution {
    resolved: OnceLock<Arc<BbKeyFile>>,
}

impl KeyResolution {
    /// Fresh unresolved holder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The resolved master key, if detection has happened
    #[must_use]
    pub fn get(&self) -> Option<Arc<BbKeyFile>> {
        self.resolved.get().cloned()
    }

    fn set(&self, key: Arc<BbKeyFile>) {
        // A second resolution attempt can only happen if two detectors share
        // a holder, which the session layer never does; keep the first.
        let _ = self.resolved.set(key);
    }
}

impl std::fmt::Debug for KeyResolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyResolution")
            .field("resolved", &self.resolved.get().is_some())
            .finish()
    }
}

/// Client-input cipher that picks its master key by trial decryption
pub struct DetectorCipher {
    candidates: Vec<Arc<BbKeyFile>>,
    expected_prefix: Vec<u8>,
    seed: [u8; BB_SEED_SIZE],
    shared: Arc<KeyResolution>,
    inner: Option<BbCipher>,
}

impl DetectorCipher {
    /// Create a detector over the shipped candidate keys
    ///
    /// `seed` is the client-stream seed from the `03` handshake frame the
    /// proxy sent (or forwarded) to the client.
    #[must_use]
    pub fn new(
        candidates: Vec<Arc<BbKeyFile>>,
        expected_prefix: &[u8],
        seed: [u8; BB_SEED_SIZE],
    ) -> Self {
        Self {
            candidates,
            expected_prefix: expected_prefix.to_vec(),
            seed,
            shared: Arc::new(KeyResolution::new()),
            inner: None,
        }
    }

    /// The holder imitators should be constructed with
    #[must_use]
    pub fn resolution(&self) -> Arc<KeyResolution> {
        Arc::clone(&self.shared)
    }

    fn resolve(&mut self, first_bytes: &[u8]) -> Result<(), CryptoError> {
        let probe_len = self.expected_prefix.len().min(first_bytes.len());
        for key in &self.candidates {
            let mut trial = BbCipher::new(key, &self.seed, false);
            let mut probe = first_bytes[..probe_len].to_vec();
            trial.decrypt(&mut probe)?;
            if probe == self.expected_prefix[..probe_len] {
                self.shared.set(Arc::clone(key));
                // Restart from byte zero so the real stream decrypts cleanly
                self.inner = Some(BbCipher::new(key, &self.seed, false));
                return Ok(());
            }
        }
        Err(CryptoError::KeyDetectionFailed)
    }
}

impl PsoCipher for DetectorCipher {
    fn encrypt(&mut self, _data: &mut [u8]) -> Result<(), CryptoError> {
        Err(CryptoError::DetectorCannotEncrypt)
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CryptoError> {
        if self.inner.is_none() {
            self.resolve(data)?;
        }
        self.inner
            .as_mut()
            .ok_or(CryptoError::DetectorUnresolved)?
            .decrypt(data)
    }

    fn block_size(&self) -> usize {
        BB_BLOCK
    }
}

impl std::fmt::Debug for DetectorCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DetectorCipher")
            .field("candidates", &self.candidates.len())
            .field("resolved", &self.inner.is_some())
            .finish()
    }
}

/// Cipher that defers its master key to a paired detector
pub struct ImitatorCipher {
    shared: Arc<KeyResolution>,
    seed: [u8; BB_SEED_SIZE],
    big_endian: bool,
    inner: Option<BbCipher>,
}

impl ImitatorCipher {
    /// Create an imitator over `shared`, keyed with its own stream seed
    #[must_use]
    pub fn new(shared: Arc<KeyResolution>, seed: [u8; BB_SEED_SIZE], big_endian: bool) -> Self {
        Self { shared, seed, big_endian, inner: None }
    }

    fn ensure_inner(&mut self) -> Result<&mut BbCipher, CryptoError> {
        if self.inner.is_none() {
            let key = self.shared.get().ok_or(CryptoError::DetectorUnresolved)?;
            self.inner = Some(BbCipher::new(&key, &self.seed, self.big_endian));
        }
        Ok(self.inner.as_mut().unwrap_or_else(|| unreachable!("imitator cipher just initialised")))
    }
}

impl PsoCipher for ImitatorCipher {
    fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CryptoError> {
        self.ensure_inner()?.encrypt(data)
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CryptoError> {
        self.ensure_inner()?.decrypt(data)
    }

    fn block_size(&self) -> usize {
        BB_BLOCK
    }
}

impl std::fmt::Debug for ImitatorCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImitatorCipher")
            .field("big_endian", &self.big_endian)
            .field("keyed", &self.inner.is_some())
            .finish()
    }
}
