//! Source providers: map table names to byte streams.
//!
//! The table engine never touches files directly: every read and write goes
//! through a [`SourceProvider`], which is backed either by the file system
//! ([`FileSystemProvider`]) or by an in-memory registry ([`MemoryProvider`]).
//! Providers also report *external* changes to the backing storage through a
//! channel of [`ChangeEvent`]s.

pub mod file;
pub mod memory;

pub use file::FileSystemProvider;
pub use memory::MemoryProvider;

use crate::config::StorageMode;
use crate::error::FlatDbResult;
use crate::stream::ReadSeek;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};

/// An external modification of the backing storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    /// One table's file changed
    Table(String),
    /// The shared database file changed (file-as-database mode)
    All,
}

/// Storage backend for one logical database.
///
/// # Contract
///
/// - `exists`/`open_read`/`open_write` address a table by name; in
///   file-as-database mode every table maps onto the same stream and the
///   format decides where the table lives inside it.
/// - `list_tables` enumerates tables in directory mode; file mode returns an
///   empty list (the format reads table names out of the file).
/// - Change events are only raised between `start_watching` and
///   `stop_watching`, and never for writes made through `open_write`.
pub trait SourceProvider: Send + Sync {
    fn mode(&self) -> StorageMode;

    /// Whether the stream for `table` exists.
    fn exists(&self, table: &str) -> bool;

    fn open_read(&self, table: &str) -> FlatDbResult<Box<dyn ReadSeek>>;

    /// Open a truncating writer. Content is committed once the writer is
    /// flushed or dropped.
    fn open_write(&self, table: &str) -> FlatDbResult<Box<dyn Write + Send>>;

    /// Remove the stream backing `table` (directory mode).
    fn remove(&self, table: &str) -> FlatDbResult<()>;

    /// File name (directory mode / file mode) or table name (memory).
    fn identifier(&self, table: &str) -> String;

    fn list_tables(&self) -> FlatDbResult<Vec<String>>;

    fn start_watching(&self) -> FlatDbResult<()>;

    fn stop_watching(&self);

    fn is_watching(&self) -> bool;

    /// Register a new receiver of change events.
    fn subscribe(&self) -> Receiver<ChangeEvent>;
}

/// Fan-out of change events to subscribers; shared by provider
/// implementations and by their watcher callbacks.
#[derive(Debug, Default)]
pub struct ChangeNotifier {
    subscribers: Mutex<Vec<Sender<ChangeEvent>>>,
    watching: AtomicBool,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().push(tx);
        rx
    }

    pub fn set_watching(&self, watching: bool) {
        self.watching.store(watching, Ordering::SeqCst);
    }

    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    /// Deliver `event` to live subscribers; dropped while not watching.
    pub fn notify(&self, event: ChangeEvent) {
        if !self.is_watching() {
            return;
        }
        tracing::debug!(?event, "storage changed externally");
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Suspends change notifications for the lifetime of the guard, restoring
/// the previous watching state on drop (also on error paths).
pub struct WatchSuspension<'a> {
    provider: &'a dyn SourceProvider,
    resume: bool,
}

impl<'a> WatchSuspension<'a> {
    pub fn new(provider: &'a dyn SourceProvider) -> Self {
        let resume = provider.is_watching();
        if resume {
            provider.stop_watching();
        }
        Self { provider, resume }
    }
}

impl Drop for WatchSuspension<'_> {
    fn drop(&mut self) {
        if self.resume {
            if let Err(e) = self.provider.start_watching() {
                tracing::warn!(error = %e, "failed to resume watching");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notifier_drops_events_when_not_watching() {
        let notifier = ChangeNotifier::new();
        let rx = notifier.subscribe();
        notifier.notify(ChangeEvent::Table("a".into()));
        assert!(rx.try_recv().is_err());

        notifier.set_watching(true);
        notifier.notify(ChangeEvent::Table("b".into()));
        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::Table("b".into()));
    }

    #[test]
    fn test_notifier_prunes_closed_subscribers() {
        let notifier = ChangeNotifier::new();
        notifier.set_watching(true);
        let rx = notifier.subscribe();
        drop(notifier.subscribe());
        notifier.notify(ChangeEvent::All);
        assert_eq!(notifier.subscribers.lock().len(), 1);
        assert_eq!(rx.try_recv().unwrap(), ChangeEvent::All);
    }

    #[test]
    fn test_suspension_restores_state() {
        let provider = MemoryProvider::new("db", StorageMode::Directory);
        provider.start_watching().unwrap();
        {
            let _guard = WatchSuspension::new(&provider);
            assert!(!provider.is_watching());
        }
        assert!(provider.is_watching());

        provider.stop_watching();
        {
            let _guard = WatchSuspension::new(&provider);
        }
        assert!(!provider.is_watching());
    }
}
