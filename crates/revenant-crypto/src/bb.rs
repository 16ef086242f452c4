//! BB block cipher: a reduced-round Feistel network whose working table is
//! derived from a per-install master key file and a 48-byte session seed.
//!
//! The master key file carries a 0x48-byte initial table and 0x412 32-bit
//! private key words (the subkey array followed by four substitution boxes).
//! Session setup folds the seed into the subkeys and then re-keys the whole
//! table by running the cipher over itself, so two sessions with the same
//! master key but different seeds share nothing observable.

use std::sync::Arc;

use crate::error::CryptoError;
use crate::{BB_BLOCK, BB_SEED_SIZE, PsoCipher};

/// Words in the working table: 18 subkeys + 4 × 256 S-box entries
pub const BB_TABLE_WORDS: usize = 0x412;

/// Bytes in the initial-key table of a master key file
pub const BB_INITIAL_KEY_BYTES: usize = 0x48;

/// Serialized master key file size
pub const BB_KEY_FILE_BYTES: usize = BB_INITIAL_KEY_BYTES + BB_TABLE_WORDS * 4;

const SUBKEYS: usize = 18;

/// One shipped master key: the data a BB install derives its sessions from
#[derive(Clone)]
pub struct BbKeyFile {
    /// Seed-whitening table applied to the session seed
    pub initial_keys: [u8; BB_INITIAL_KEY_BYTES],
    /// Subkey and S-box source words
    pub private_keys: [u32; BB_TABLE_WORDS],
}

impl BbKeyFile {
    /// Parse a master key file from its on-disk little-endian form
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::BadKeyFile`] on a size mismatch.
    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != BB_KEY_FILE_BYTES {
            return Err(CryptoError::BadKeyFile(data.len(), BB_KEY_FILE_BYTES));
        }
        let mut initial_keys = [0u8; BB_INITIAL_KEY_BYTES];
        initial_keys.copy_from_slice(&data[..BB_INITIAL_KEY_BYTES]);
        let mut private_keys = [0u32; BB_TABLE_WORDS];
        for (i, chunk) in data[BB_INITIAL_KEY_BYTES..].chunks_exact(4).enumerate() {
            private_keys[i] = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        Ok(Self { initial_keys, private_keys })
    }
}

impl std::fmt::Debug for BbKeyFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of logs
        f.debug_struct("BbKeyFile").finish_non_exhaustive()
    }
}

/// BB session cipher
pub struct BbCipher {
    table: Box<[u32; BB_TABLE_WORDS]>,
    big_endian: bool,
}

impl BbCipher {
    /// Derive a session cipher from a master key and a 48-byte seed
    ///
    /// `big_endian` selects the word order blocks are read in; the client
    /// decrypts its inbound stream big-endian, everything else is
    /// little-endian.
    #[must_use]
    pub fn new(key: &Arc<BbKeyFile>, seed: &[u8; BB_SEED_SIZE], big_endian: bool) -> Self {
        // Whiten the seed with the initial-key table and the fixed
        // three-byte XOR pattern the client applies
        let mut whitened = [0u8; BB_SEED_SIZE];
        for (i, byte) in whitened.iter_mut().enumerate() {
            *byte = seed[i] ^ key.initial_keys[i];
        }
        for chunk in whitened.chunks_exact_mut(3) {
            chunk[0] ^= 0x19;
            chunk[1] ^= 0x16;
            chunk[2] ^= 0x18;
        }

        let mut table = Box::new(key.private_keys);

        // Fold the whitened seed into the subkeys
        for (i, subkey) in table[..SUBKEYS].iter_mut().enumerate() {
            let base = (i * 4) % (BB_SEED_SIZE - 3);
            let word = u32::from_le_bytes([
                whitened[base],
                whitened[base + 1],
                whitened[base + 2],
                whitened[base + 3],
            ]);
            *subkey ^= word;
        }

        let mut cipher = Self { table, big_endian };

        // Re-key the entire table by running the cipher over itself
        let (mut left, mut right) = (0u32, 0u32);
        for i in (0..BB_TABLE_WORDS - 1).step_by(2) {
            let (l, r) = cipher.encrypt_block(left, right);
            cipher.table[i] = l;
            cipher.table[i + 1] = r;
            left = l;
            right = r;
        }

        cipher
    }

    fn f(&self, x: u32) -> u32 {
        let s = &self.table[SUBKEYS..];
        let a = s[(x >> 24) as usize];
        let b = s[0x100 + ((x >> 16) & 0xFF) as usize];
        let c = s[0x200 + ((x >> 8) & 0xFF) as usize];
        let d = s[0x300 + (x & 0xFF) as usize];
        (a.wrapping_add(b) ^ c).wrapping_add(d)
    }

    fn encrypt_block(&self, l0: u32, r0: u32) -> (u32, u32) {
        let p = &self.table[..SUBKEYS];
        let mut l = l0 ^ p[0];
        let mut r = r0 ^ self.f(l) ^ p[1];
        l ^= self.f(r) ^ p[2];
        r ^= self.f(l) ^ p[3];
        l ^= self.f(r) ^ p[4];
        r ^= p[5];
        (r, l)
    }

    fn decrypt_block(&self, c0: u32, c1: u32) -> (u32, u32) {
        let p = &self.table[..SUBKEYS];
        let mut r = c0;
        let mut l = c1;
        r ^= p[5];
        l ^= self.f(r) ^ p[4];
        r ^= self.f(l) ^ p[3];
        l ^= self.f(r) ^ p[2];
        r ^= self.f(l) ^ p[1];
        l ^= p[0];
        (l, r)
    }

    fn read_word(&self, chunk: &[u8]) -> u32 {
        let bytes = [chunk[0], chunk[1], chunk[2], chunk[3]];
        if self.big_endian {
            u32::from_be_bytes(bytes)
        } else {
            u32::from_le_bytes(bytes)
        }
    }

    fn write_word(&self, chunk: &mut [u8], word: u32) {
        let bytes = if self.big_endian {
            word.to_be_bytes()
        } else {
            word.to_le_bytes()
        };
        chunk.copy_from_slice(&bytes);
    }

    fn check_alignment(&self, data: &[u8]) -> Result<(), CryptoError> {
        if data.len() % BB_BLOCK != 0 {
            Err(CryptoError::UnalignedBuffer { len: data.len(), block: BB_BLOCK })
        } else {
            Ok(())
        }
    }
}

impl PsoCipher for BbCipher {
    fn encrypt(&mut self, data: &mut [u8]) -> Result<(), CryptoError> {
        self.check_alignment(data)?;
        for block in data.chunks_exact_mut(BB_BLOCK) {
            let l = self.read_word(&block[..4]);
            let r = self.read_word(&block[4..]);
            let (cl, cr) = self.encrypt_block(l, r);
            self.write_word(&mut block[..4], cl);
            self.write_word(&mut block[4..], cr);
        }
        Ok(())
    }

    fn decrypt(&mut self, data: &mut [u8]) -> Result<(), CryptoError> {
        self.check_alignment(data)?;
        for block in data.chunks_exact_mut(BB_BLOCK) {
            let l = self.read_word(&block[..4]);
            let r = self.read_word(&block[4..]);
            let (pl, pr) = self.decrypt_block(l, r);
            self.write_word(&mut block[..4], pl);
            self.write_word(&mut block[4..], pr);
        }
        Ok(())
    }

    fn block_size(&self) -> usize {
        BB_BLOCK
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Deterministic throwaway master key for tests
    #[must_use]
    pub fn key_file(tag: u8) -> Arc<BbKeyFile> {
        let mut initial_keys = [0u8; BB_INITIAL_KEY_BYTES];
        for (i, byte) in initial_keys.iter_mut().enumerate() {
            *byte = (i as u8).wrapping_mul(7).wrapping_add(tag);
        }
        let mut private_keys = [0u32; BB_TABLE_WORDS];
        let mut state = 0x9E37_79B9u32 ^ u32::from(tag);
        for word in private_keys.iter_mut() {
            state = state.wrapping_mul(0x0001_9660).wrapping_add(0x3C6E_F35F);
            *word = state;
        }
        Arc::new(BbKeyFile { initial_keys, private_keys })
    }
}
