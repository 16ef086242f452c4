//! Handshake and retarget payload views.

use crate::error::ProtoError;
use crate::payloads::{get_u16_le, get_u32_be, get_u32_le, put_u16_le, put_u32_be, require};
use crate::BB_SEED_SIZE;

/// `02`/`17` ServerInit for the V2/V3 dialects: copyright banner followed by
/// two 32-bit cipher seeds. The trailing after-message is optional and most
/// servers truncate it, so only the seeds are required.
#[derive(Debug)]
pub struct ServerInitV2V3<'a> {
    data: &'a [u8],
}

impl<'a> ServerInitV2V3<'a> {
    /// Banner length preceding the seeds
    pub const BANNER_LEN: usize = 0x40;
    /// Minimum payload: banner plus both seeds
    pub const MIN_LEN: usize = Self::BANNER_LEN + 8;

    /// Parse, requiring the banner and both seeds
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the seeds are missing.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtoError> {
        require(data, Self::MIN_LEN)?;
        Ok(Self { data })
    }

    /// Seed for the server-to-proxy stream
    #[must_use]
    pub fn server_key(&self) -> u32 {
        get_u32_le(self.data, Self::BANNER_LEN)
    }

    /// Seed for the proxy-to-server stream
    #[must_use]
    pub fn client_key(&self) -> u32 {
        get_u32_le(self.data, Self::BANNER_LEN + 4)
    }
}

/// BB `03` ServerInit: copyright banner followed by two 48-byte seeds
#[derive(Debug)]
pub struct ServerInitBb<'a> {
    data: &'a [u8],
}

impl<'a> ServerInitBb<'a> {
    /// Banner length preceding the seeds
    pub const BANNER_LEN: usize = 0x60;
    /// Minimum payload: banner plus both seeds
    pub const MIN_LEN: usize = Self::BANNER_LEN + 2 * BB_SEED_SIZE;

    /// Parse, requiring the banner and both seeds
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if either seed is missing.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtoError> {
        require(data, Self::MIN_LEN)?;
        Ok(Self { data })
    }

    /// 48-byte server stream seed
    #[must_use]
    pub fn server_key(&self) -> [u8; BB_SEED_SIZE] {
        let mut out = [0u8; BB_SEED_SIZE];
        out.copy_from_slice(&self.data[Self::BANNER_LEN..Self::BANNER_LEN + BB_SEED_SIZE]);
        out
    }

    /// 48-byte client stream seed
    #[must_use]
    pub fn client_key(&self) -> [u8; BB_SEED_SIZE] {
        let start = Self::BANNER_LEN + BB_SEED_SIZE;
        let mut out = [0u8; BB_SEED_SIZE];
        out.copy_from_slice(&self.data[start..start + BB_SEED_SIZE]);
        out
    }
}

/// `19` (and patch `14`) retarget payload:
/// `{address: u32 network order, port: u16 LE, unused: u16}`
#[derive(Debug)]
pub struct Reconnect<'a> {
    data: &'a mut [u8],
}

impl<'a> Reconnect<'a> {
    /// Exact on-wire size of the retarget record
    pub const LEN: usize = 8;

    /// Parse a payload that has already been padded to [`Self::LEN`]
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] on an unpadded short payload.
    pub fn parse(data: &'a mut [u8]) -> Result<Self, ProtoError> {
        require(data, Self::LEN)?;
        Ok(Self { data })
    }

    /// IPv4 address in network byte order
    #[must_use]
    pub fn address(&self) -> u32 {
        get_u32_be(self.data, 0)
    }

    /// Replace the address
    pub fn set_address(&mut self, address: u32) {
        put_u32_be(self.data, 0, address);
    }

    /// TCP port
    #[must_use]
    pub fn port(&self) -> u16 {
        get_u16_le(self.data, 4)
    }

    /// Replace the port
    pub fn set_port(&mut self, port: u16) {
        put_u16_le(self.data, 4, port);
    }
}

/// Build a `19` retarget payload
#[must_use]
pub fn build_reconnect(address: u32, port: u16) -> Vec<u8> {
    let mut out = vec![0u8; Reconnect::LEN];
    put_u32_be(&mut out, 0, address);
    put_u16_le(&mut out, 4, port);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_init_seeds() {
        let mut data = vec![0u8; ServerInitV2V3::MIN_LEN];
        data[0x40..0x44].copy_from_slice(&0x1111_1111u32.to_le_bytes());
        data[0x44..0x48].copy_from_slice(&0x2222_2222u32.to_le_bytes());
        let cmd = ServerInitV2V3::parse(&data).unwrap();
        assert_eq!(cmd.server_key(), 0x1111_1111);
        assert_eq!(cmd.client_key(), 0x2222_2222);
    }

    #[test]
    fn short_server_init_rejected() {
        assert!(ServerInitV2V3::parse(&[0u8; 0x44]).is_err());
    }

    #[test]
    fn reconnect_round_trip() {
        let mut data = build_reconnect(0xC0A8_0101, 9100);
        let mut cmd = Reconnect::parse(&mut data).unwrap();
        assert_eq!(cmd.address(), 0xC0A8_0101);
        assert_eq!(cmd.port(), 9100);
        cmd.set_port(12000);
        assert_eq!(cmd.port(), 12000);
    }
}
