//! UTF-8 byte-order-mark skipping adapter.

use std::io::{self, Read, Seek, SeekFrom};

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// Hides a leading UTF-8 BOM.
///
/// Positions reported and accepted by `Seek` are relative to the first byte
/// after the BOM. The adapter must be created at the start of the stream.
pub struct BomSkipReader<R> {
    inner: R,
    /// Length of the detected BOM, `None` until the first read or seek
    bom_len: Option<u64>,
}

impl<R: Read + Seek> BomSkipReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            bom_len: None,
        }
    }

    /// Whether a BOM was found (detects on demand).
    pub fn has_bom(&mut self) -> io::Result<bool> {
        Ok(self.detect()? > 0)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn detect(&mut self) -> io::Result<u64> {
        if let Some(len) = self.bom_len {
            return Ok(len);
        }
        let mut head = [0u8; 3];
        let mut filled = 0;
        while filled < head.len() {
            let n = self.inner.read(&mut head[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        let len = if filled == 3 && head == UTF8_BOM {
            3
        } else {
            // partial matches at end of stream are ordinary content
            self.inner.seek(SeekFrom::Current(-(filled as i64)))?;
            0
        };
        self.bom_len = Some(len);
        Ok(len)
    }
}

impl<R: Read + Seek> Read for BomSkipReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.detect()?;
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> Seek for BomSkipReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let bom = self.detect()?;
        let raw = match pos {
            SeekFrom::Start(p) => self.inner.seek(SeekFrom::Start(p + bom))?,
            other => self.inner.seek(other)?,
        };
        if raw < bom {
            self.inner.seek(SeekFrom::Start(bom))?;
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before the start of the content",
            ));
        }
        Ok(raw - bom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn with_bom(body: &[u8]) -> Vec<u8> {
        let mut v = UTF8_BOM.to_vec();
        v.extend_from_slice(body);
        v
    }

    #[test]
    fn test_strips_bom() {
        let mut reader = BomSkipReader::new(Cursor::new(with_bom(b"A,B\n")));
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "A,B\n");
        assert!(reader.has_bom().unwrap());
    }

    #[test]
    fn test_no_bom_passthrough() {
        let mut reader = BomSkipReader::new(Cursor::new(b"A,B\n".to_vec()));
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "A,B\n");
        assert!(!reader.has_bom().unwrap());
    }

    #[test]
    fn test_partial_bom_is_content() {
        let mut reader = BomSkipReader::new(Cursor::new(vec![0xEF, 0xBB]));
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, vec![0xEF, 0xBB]);
    }

    #[test]
    fn test_position_is_bom_relative() {
        let mut reader = BomSkipReader::new(Cursor::new(with_bom(b"hello")));
        assert_eq!(reader.stream_position().unwrap(), 0);
        let mut two = [0u8; 2];
        reader.read_exact(&mut two).unwrap();
        assert_eq!(reader.stream_position().unwrap(), 2);

        reader.seek(SeekFrom::Start(1)).unwrap();
        let mut rest = String::new();
        reader.read_to_string(&mut rest).unwrap();
        assert_eq!(rest, "ello");
        assert_eq!(reader.into_inner().position(), 8);
    }

    #[test]
    fn test_seek_before_content_fails() {
        let mut reader = BomSkipReader::new(Cursor::new(with_bom(b"abc")));
        assert!(reader.seek(SeekFrom::Current(-5)).is_err());
        assert_eq!(reader.stream_position().unwrap(), 0);
    }
}
