//! In-memory provider backed by a stream registry.

use crate::config::StorageMode;
use crate::error::{FlatDbError, FlatDbResult};
use crate::provider::{ChangeEvent, ChangeNotifier, SourceProvider};
use crate::stream::ReadSeek;
use dashmap::DashMap;
use std::io::{self, Cursor, Write};
use std::sync::Arc;
use std::sync::mpsc::Receiver;

/// Registry of named byte buffers.
///
/// In directory mode each table has its own entry; in file mode the whole
/// database lives under the provider's name.
pub struct MemoryProvider {
    name: String,
    mode: StorageMode,
    entries: Arc<DashMap<String, Vec<u8>>>,
    notifier: ChangeNotifier,
}

impl MemoryProvider {
    pub fn new(name: impl Into<String>, mode: StorageMode) -> Self {
        Self {
            name: name.into(),
            mode,
            entries: Arc::new(DashMap::new()),
            notifier: ChangeNotifier::new(),
        }
    }

    fn key(&self, table: &str) -> String {
        match self.mode {
            StorageMode::Directory => table.to_string(),
            StorageMode::File => self.name.clone(),
        }
    }

    /// Replace the stored bytes as an external editor would, raising a
    /// change event while watching.
    pub fn put(&self, table: &str, bytes: impl Into<Vec<u8>>) {
        self.entries.insert(self.key(table), bytes.into());
        let event = match self.mode {
            StorageMode::Directory => ChangeEvent::Table(table.to_string()),
            StorageMode::File => ChangeEvent::All,
        };
        self.notifier.notify(event);
    }

    /// Current stored bytes for `table`.
    pub fn get(&self, table: &str) -> Option<Vec<u8>> {
        self.entries.get(&self.key(table)).map(|e| e.value().clone())
    }

    pub fn get_string(&self, table: &str) -> Option<String> {
        self.get(table)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }
}

impl SourceProvider for MemoryProvider {
    fn mode(&self) -> StorageMode {
        self.mode
    }

    fn exists(&self, table: &str) -> bool {
        self.entries.contains_key(&self.key(table))
    }

    fn open_read(&self, table: &str) -> FlatDbResult<Box<dyn ReadSeek>> {
        let bytes = self.get(table).ok_or_else(|| FlatDbError::TableNotFound {
            table: table.to_string(),
            path: self.identifier(table),
        })?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    fn open_write(&self, table: &str) -> FlatDbResult<Box<dyn Write + Send>> {
        Ok(Box::new(MemoryWriter {
            key: self.key(table),
            entries: Arc::clone(&self.entries),
            buffer: Vec::new(),
            dirty: true,
        }))
    }

    fn remove(&self, table: &str) -> FlatDbResult<()> {
        self.entries.remove(&self.key(table));
        Ok(())
    }

    fn identifier(&self, table: &str) -> String {
        match self.mode {
            StorageMode::Directory => table.to_string(),
            StorageMode::File => self.name.clone(),
        }
    }

    fn list_tables(&self) -> FlatDbResult<Vec<String>> {
        Ok(match self.mode {
            StorageMode::Directory => self.entries.iter().map(|e| e.key().clone()).collect(),
            StorageMode::File => Vec::new(),
        })
    }

    fn start_watching(&self) -> FlatDbResult<()> {
        self.notifier.set_watching(true);
        Ok(())
    }

    fn stop_watching(&self) {
        self.notifier.set_watching(false);
    }

    fn is_watching(&self) -> bool {
        self.notifier.is_watching()
    }

    fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.notifier.subscribe()
    }
}

/// Buffers writes and commits them into the registry on flush/drop.
struct MemoryWriter {
    key: String,
    entries: Arc<DashMap<String, Vec<u8>>>,
    buffer: Vec<u8>,
    dirty: bool,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        self.dirty = true;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.dirty {
            self.entries.insert(self.key.clone(), self.buffer.clone());
            self.dirty = false;
        }
        Ok(())
    }
}

impl Drop for MemoryWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
