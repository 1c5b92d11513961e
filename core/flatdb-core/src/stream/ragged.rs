//! Ragged-row normalizer.
//!
//! Delimited files written by hand or by spreadsheets often drop trailing
//! empty fields. `RaggedRowReader` pads every data line with separators until
//! it has as many unquoted separators as the header line, so the parser can
//! rely on a fixed field count. A quoted field may span physical lines; the
//! line breaks inside it are passed through untouched.

use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom};

/// Count separators that occur outside quoted spans.
pub fn count_unquoted(line: &[u8], separator: u8, quote: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0;
    for &b in line {
        if b == quote {
            in_quotes = !in_quotes;
        } else if b == separator && !in_quotes {
            count += 1;
        }
    }
    count
}

/// An odd number of quote bytes leaves a quoted field open (`""` escapes
/// count twice).
pub fn has_open_quote(text: &[u8], quote: u8) -> bool {
    text.iter().filter(|&&b| b == quote).count() % 2 == 1
}

/// Pads short lines with separators up to the header's separator count.
///
/// Only `seek(SeekFrom::Start(0))` is supported; it rewinds the source and
/// forces the header to be detected again on the next read.
pub struct RaggedRowReader<R> {
    inner: BufReader<R>,
    separator: u8,
    quote: u8,
    /// Unquoted separators in the header, known after the first line
    header_separators: Option<usize>,
    buffer: Vec<u8>,
    consumed: usize,
    eof: bool,
}

impl<R: Read + Seek> RaggedRowReader<R> {
    pub fn new(inner: R, separator: u8) -> Self {
        Self {
            inner: BufReader::new(inner),
            separator,
            quote: b'"',
            header_separators: None,
            buffer: Vec::new(),
            consumed: 0,
            eof: false,
        }
    }

    pub fn header_separators(&self) -> Option<usize> {
        self.header_separators
    }

    /// Refill the internal buffer with the next normalized record.
    /// Returns `false` at end of stream.
    fn fill(&mut self) -> io::Result<bool> {
        let mut line = Vec::new();
        if self.inner.read_until(b'\n', &mut line)? == 0 {
            self.eof = true;
            return Ok(false);
        }
        while has_open_quote(&line, self.quote) {
            if self.inner.read_until(b'\n', &mut line)? == 0 {
                break;
            }
        }
        while matches!(line.last(), Some(b'\n' | b'\r')) {
            line.pop();
        }

        let count = count_unquoted(&line, self.separator, self.quote);
        match self.header_separators {
            None => self.header_separators = Some(count),
            Some(expected) if count < expected => {
                line.resize(line.len() + (expected - count), self.separator);
            }
            Some(_) => {}
        }
        line.push(b'\n');

        self.buffer = line;
        self.consumed = 0;
        Ok(true)
    }
}

impl<R: Read + Seek> Read for RaggedRowReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.consumed >= self.buffer.len() {
            if self.eof || !self.fill()? {
                return Ok(0);
            }
        }
        let remaining = &self.buffer[self.consumed..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.consumed += n;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for RaggedRowReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match pos {
            SeekFrom::Start(0) => {
                self.inner.seek(SeekFrom::Start(0))?;
                self.header_separators = None;
                self.buffer.clear();
                self.consumed = 0;
                self.eof = false;
                Ok(0)
            }
            other => Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("ragged row reader can only rewind to the start, not {other:?}"),
            )),
        }
    }
}
