//! File-transfer payloads the capture path parses: OpenFile, WriteFile,
//! the GC card list and the execute-code frame.

use crate::dialect::Dialect;
use crate::error::ProtoError;
use crate::payloads::{get_fixed_str, get_u32_le, require};

/// OpenFile (`44`/`A6`) field geometry, tagged by dialect
#[derive(Debug, Clone, Copy)]
pub struct OpenFileLayout {
    /// Offset of the 16-byte on-wire filename
    pub filename_offset: usize,
    /// Offset of the declared file size
    pub file_size_offset: usize,
    /// Minimum payload size
    pub min_len: usize,
}

impl OpenFileLayout {
    /// Layout for `dialect`
    #[must_use]
    pub fn for_dialect(dialect: Dialect) -> Self {
        match dialect {
            // {name: [u8; 0x20], flags: u16, unused: u16, filename, size}
            Dialect::Dc => Self { filename_offset: 0x24, file_size_offset: 0x34, min_len: 0x38 },
            // {unused: [u8; 0x24], name: [u8; 0x20], filename, size, type}
            Dialect::Bb => Self { filename_offset: 0x44, file_size_offset: 0x54, min_len: 0x5C },
            // DC shape with a file-type word between filename and size
            _ => Self { filename_offset: 0x24, file_size_offset: 0x38, min_len: 0x3C },
        }
    }
}

/// `44`/`A6` OpenFile view
#[derive(Debug)]
pub struct OpenFile<'a> {
    data: &'a [u8],
    layout: OpenFileLayout,
}

impl<'a> OpenFile<'a> {
    /// Width of the on-wire filename field
    pub const FILENAME_LEN: usize = 0x10;

    /// Parse an OpenFile payload
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the fixed fields do not fit.
    pub fn parse(dialect: Dialect, data: &'a [u8]) -> Result<Self, ProtoError> {
        let layout = OpenFileLayout::for_dialect(dialect);
        require(data, layout.min_len)?;
        Ok(Self { data, layout })
    }

    /// On-wire filename (the key WriteFile chunks refer to)
    #[must_use]
    pub fn filename(&self) -> String {
        get_fixed_str(self.data, self.layout.filename_offset, Self::FILENAME_LEN)
    }

    /// Declared total file size
    #[must_use]
    pub fn file_size(&self) -> u32 {
        get_u32_le(self.data, self.layout.file_size_offset)
    }
}

/// Offset of the chunk data in a WriteFile payload
pub const WRITE_FILE_DATA_OFFSET: usize = 0x10;

/// Maximum chunk size a WriteFile may carry
pub const WRITE_FILE_CHUNK_MAX: usize = 0x400;

/// `13`/`A7` WriteFile view:
/// `{filename: [u8; 0x10], data: [u8; 0x400], data_size: u32}`
#[derive(Debug)]
pub struct WriteFile<'a> {
    data: &'a [u8],
}

impl<'a> WriteFile<'a> {
    /// Exact payload length
    pub const LEN: usize = WRITE_FILE_DATA_OFFSET + WRITE_FILE_CHUNK_MAX + 4;

    /// Parse a WriteFile payload
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] on a truncated chunk frame.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtoError> {
        require(data, Self::LEN)?;
        Ok(Self { data })
    }

    /// Filename key from the matching OpenFile
    #[must_use]
    pub fn filename(&self) -> String {
        get_fixed_str(self.data, 0, 0x10)
    }

    /// Declared chunk size; may exceed [`WRITE_FILE_CHUNK_MAX`] on
    /// misbehaving servers and must be clamped by the caller
    #[must_use]
    pub fn data_size(&self) -> u32 {
        get_u32_le(self.data, WRITE_FILE_DATA_OFFSET + WRITE_FILE_CHUNK_MAX)
    }

    /// Chunk bytes, clamped to the buffer
    #[must_use]
    pub fn chunk(&self) -> &[u8] {
        let len = (self.data_size() as usize).min(WRITE_FILE_CHUNK_MAX);
        &self.data[WRITE_FILE_DATA_OFFSET..WRITE_FILE_DATA_OFFSET + len]
    }
}

/// `B2` execute-code header:
/// `{code_size: u32, checksum_start: u32, checksum_size: u32}`
#[derive(Debug)]
pub struct ExecuteCode<'a> {
    data: &'a [u8],
}

impl<'a> ExecuteCode<'a> {
    /// Header length preceding the code blob
    pub const HEADER_LEN: usize = 12;

    /// Parse an execute-code payload
    ///
    /// # Errors
    ///
    /// Returns [`ProtoError::TooShort`] if the header words are missing.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtoError> {
        require(data, Self::HEADER_LEN)?;
        Ok(Self { data })
    }

    /// Declared code size
    #[must_use]
    pub fn code_size(&self) -> u32 {
        get_u32_le(self.data, 0)
    }

    /// Code blob following the header
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.data[Self::HEADER_LEN..]
    }
}

/// Strip the 32-bit length prefix from a GC `B8` card-list payload
///
/// # Errors
///
/// Returns [`ProtoError::TooShort`] if the prefix is missing or the declared
/// body extends past the payload.
pub fn card_list_body(data: &[u8]) -> Result<&[u8], ProtoError> {
    require(data, 4)?;
    let size = get_u32_le(data, 0) as usize;
    require(data, 4 + size)?;
    Ok(&data[4..4 + size])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payloads::{put_fixed_str, put_u32_le};

    #[test]
    fn open_file_layouts() {
        for dialect in [Dialect::Dc, Dialect::Gc, Dialect::Pc, Dialect::Xb, Dialect::Bb] {
            let layout = OpenFileLayout::for_dialect(dialect);
            let mut data = vec![0u8; layout.min_len];
            put_fixed_str(&mut data, layout.filename_offset, 0x10, "quest.dat");
            put_u32_le(&mut data, layout.file_size_offset, 0x1234);
            let view = OpenFile::parse(dialect, &data).unwrap();
            assert_eq!(view.filename(), "quest.dat");
            assert_eq!(view.file_size(), 0x1234);
        }
    }

    #[test]
    fn write_file_clamps_chunk() {
        let mut data = vec![0u8; WriteFile::LEN];
        put_fixed_str(&mut data, 0, 0x10, "quest.dat");
        put_u32_le(&mut data, WRITE_FILE_DATA_OFFSET + WRITE_FILE_CHUNK_MAX, 0x1000);
        let view = WriteFile::parse(&data).unwrap();
        assert_eq!(view.data_size(), 0x1000);
        assert_eq!(view.chunk().len(), WRITE_FILE_CHUNK_MAX);
    }

    #[test]
    fn card_list_strips_prefix() {
        let mut data = vec![0u8; 12];
        put_u32_le(&mut data, 0, 5);
        data[4..9].copy_from_slice(b"cards");
        assert_eq!(card_list_body(&data).unwrap(), b"cards");

        put_u32_le(&mut data, 0, 100);
        assert!(card_list_body(&data).is_err());
    }
}
