//! Re-seekable stream transforms.
//!
//! Both adapters support the "peek schema, then replay from start" protocol
//! used by text formats: a first pass samples rows for type inference, then
//! `seek(SeekFrom::Start(0))` rewinds for the real pass.

pub mod bom;
pub mod ragged;

pub use bom::BomSkipReader;
pub use ragged::{RaggedRowReader, count_unquoted, has_open_quote};

use std::io::{Read, Seek};

/// A readable, seekable byte source.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}
