//! Raw frame capture files.
//!
//! A capture is a plain concatenation of length-delimited frames:
//!
//! ```text
//! [varint length][frame bytes]
//! [varint length][frame bytes]
//! ...
//! ```
//!
//! Frames are stored exactly as received, so a replay exercises the full
//! decode path.

use crate::Result;
use plume_core::cid::{read_uvarint_from, write_uvarint};
use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::Path;

/// Upper bound on one frame; anything larger means a corrupt length prefix.
const MAX_FRAME_LEN: u64 = 64 * 1024 * 1024;

/// Appends received frames to a capture file.
pub struct CaptureWriter {
    writer: BufWriter<File>,
    frames: usize,
}

impl CaptureWriter {
    /// Create (or truncate) a capture file.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
            frames: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let mut prefix = Vec::with_capacity(5);
        write_uvarint(frame.len() as u64, &mut prefix);
        self.writer.write_all(&prefix)?;
        self.writer.write_all(frame)?;
        self.frames += 1;
        Ok(())
    }

    /// Frames written so far.
    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Read the next frame.
///
/// Returns `Ok(None)` on a clean end of file. A file that ends inside a
/// frame yields an `UnexpectedEof` error.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Option<Vec<u8>>> {
    let len = match read_uvarint_from(reader)? {
        Some(len) => len,
        None => return Ok(None),
    };
    if len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame length {len} exceeds {MAX_FRAME_LEN}"),
        ));
    }

    let mut frame = vec![0u8; len as usize];
    reader.read_exact(&mut frame)?;
    Ok(Some(frame))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_capture_then_read() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("frames.bin");

        let big = vec![7u8; 300];
        let mut writer = CaptureWriter::create(&path).unwrap();
        writer.write_frame(b"first").unwrap();
        writer.write_frame(&big).unwrap();
        writer.flush().unwrap();
        assert_eq!(writer.frames(), 2);

        let mut reader = std::io::BufReader::new(File::open(&path).unwrap());
        assert_eq!(read_frame(&mut reader).unwrap().unwrap(), b"first");
        assert_eq!(read_frame(&mut reader).unwrap().unwrap(), big);
        assert!(read_frame(&mut reader).unwrap().is_none());
    }

    #[test]
    fn test_truncated_frame() {
        let mut reader = Cursor::new(vec![5u8, b'a', b'b']);
        let err = read_frame(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_truncated_prefix() {
        let mut reader = Cursor::new(vec![0x80u8]);
        let err = read_frame(&mut reader).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_oversized_length_rejected() {
        let mut prefix = Vec::new();
        write_uvarint(MAX_FRAME_LEN + 1, &mut prefix);
        let err = read_frame(&mut Cursor::new(prefix)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
