//! File system provider with change watching.

use crate::config::StorageMode;
use crate::error::{FlatDbError, FlatDbResult};
use crate::provider::{ChangeEvent, ChangeNotifier, SourceProvider};
use crate::stream::ReadSeek;
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::SystemTime;
use tracing::{debug, info};

/// Size and modification time of a file, used to recognise our own writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    len: u64,
    modified: Option<SystemTime>,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

/// State shared with the watcher callback.
struct WatchState {
    root: PathBuf,
    mode: StorageMode,
    extension: String,
    notifier: ChangeNotifier,
    /// Stamps of files this provider wrote last
    own_writes: Mutex<HashMap<PathBuf, FileStamp>>,
}

impl WatchState {
    fn table_for(&self, path: &Path) -> Option<ChangeEvent> {
        match self.mode {
            StorageMode::Directory => {
                let ext = path.extension()?.to_str()?;
                if !ext.eq_ignore_ascii_case(&self.extension) {
                    return None;
                }
                let stem = path.file_stem()?.to_str()?;
                Some(ChangeEvent::Table(stem.to_string()))
            }
            StorageMode::File => {
                (path.file_name()? == self.root.file_name()?).then_some(ChangeEvent::All)
            }
        }
    }

    fn is_own_write(&self, path: &Path) -> bool {
        let own = self.own_writes.lock();
        let recorded = own
            .iter()
            .find(|(p, _)| p.file_name() == path.file_name())
            .map(|(_, stamp)| *stamp);
        recorded.is_some() && recorded == FileStamp::of(path)
    }

    fn handle(&self, event: Event) {
        if event.kind.is_access() || event.kind.is_other() {
            return;
        }
        for path in &event.paths {
            if let Some(change) = self.table_for(path) {
                if self.is_own_write(path) {
                    debug!(path = %path.display(), "ignoring self-triggered change");
                    continue;
                }
                self.notifier.notify(change);
            }
        }
    }
}

/// Provider over a directory (one file per table) or a single file.
pub struct FileSystemProvider {
    state: Arc<WatchState>,
    watcher: Mutex<Option<RecommendedWatcher>>,
    /// Files written since the watcher was last stopped
    pending_stamps: Mutex<HashSet<PathBuf>>,
}

impl FileSystemProvider {
    /// Open a provider rooted at `root`.
    ///
    /// Directory mode requires an existing directory unless `create` is set;
    /// file mode requires the parent directory to exist.
    pub fn open(
        root: impl Into<PathBuf>,
        mode: StorageMode,
        extension: &str,
        create: bool,
    ) -> FlatDbResult<Self> {
        let root = root.into();
        match mode {
            StorageMode::Directory if !root.is_dir() => {
                if create {
                    fs::create_dir_all(&root)?;
                } else {
                    return Err(FlatDbError::StorageNotFound(root.display().to_string()));
                }
            }
            StorageMode::File if !root.is_file() && !create => {
                return Err(FlatDbError::StorageNotFound(root.display().to_string()));
            }
            StorageMode::File => {
                if let Some(parent) = root.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)?;
                }
            }
            StorageMode::Directory => {}
        }
        info!(root = %root.display(), ?mode, "opened file provider");
        Ok(Self {
            state: Arc::new(WatchState {
                root,
                mode,
                extension: extension.to_string(),
                notifier: ChangeNotifier::new(),
                own_writes: Mutex::new(HashMap::new()),
            }),
            watcher: Mutex::new(None),
            pending_stamps: Mutex::new(HashSet::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.state.root
    }

    pub fn path_for(&self, table: &str) -> PathBuf {
        match self.state.mode {
            StorageMode::Directory => self
                .state
                .root
                .join(format!("{table}.{}", self.state.extension)),
            StorageMode::File => self.state.root.clone(),
        }
    }

    fn watch_dir(&self) -> PathBuf {
        match self.state.mode {
            StorageMode::Directory => self.state.root.clone(),
            StorageMode::File => self
                .state
                .root
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    fn ensure_watcher(&self) -> FlatDbResult<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }
        let state = Arc::clone(&self.state);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => state.handle(event),
                Err(e) => tracing::warn!(error = %e, "file watcher error"),
            }
        })?;
        watcher.watch(&self.watch_dir(), RecursiveMode::NonRecursive)?;
        *slot = Some(watcher);
        Ok(())
    }
}

impl SourceProvider for FileSystemProvider {
    fn mode(&self) -> StorageMode {
        self.state.mode
    }

    fn exists(&self, table: &str) -> bool {
        self.path_for(table).is_file()
    }

    fn open_read(&self, table: &str) -> FlatDbResult<Box<dyn ReadSeek>> {
        let path = self.path_for(table);
        match File::open(&path) {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(FlatDbError::TableNotFound {
                table: table.to_string(),
                path: path.display().to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn open_write(&self, table: &str) -> FlatDbResult<Box<dyn Write + Send>> {
        let path = self.path_for(table);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(&path)?;
        self.pending_stamps.lock().insert(path);
        Ok(Box::new(BufWriter::new(file)))
    }

    fn remove(&self, table: &str) -> FlatDbResult<()> {
        let path = self.path_for(table);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
        self.state.own_writes.lock().remove(&path);
        Ok(())
    }

    fn identifier(&self, table: &str) -> String {
        self.path_for(table).display().to_string()
    }

    fn list_tables(&self) -> FlatDbResult<Vec<String>> {
        if self.state.mode == StorageMode::File {
            return Ok(Vec::new());
        }
        let mut tables = Vec::new();
        for entry in fs::read_dir(&self.state.root)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let matches_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(&self.state.extension));
            if let (true, Some(stem)) = (matches_ext, path.file_stem().and_then(|s| s.to_str())) {
                tables.push(stem.to_string());
            }
        }
        tables.sort();
        Ok(tables)
    }

    fn start_watching(&self) -> FlatDbResult<()> {
        {
            let mut own = self.state.own_writes.lock();
            for path in self.pending_stamps.lock().drain() {
                if let Some(stamp) = FileStamp::of(&path) {
                    own.insert(path, stamp);
                }
            }
        }
        self.ensure_watcher()?;
        self.state.notifier.set_watching(true);
        Ok(())
    }

    fn stop_watching(&self) {
        self.state.notifier.set_watching(false);
    }

    fn is_watching(&self) -> bool {
        self.state.notifier.is_watching()
    }

    fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.state.notifier.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_directory_mode_paths() {
        let dir = TempDir::new().unwrap();
        let provider =
            FileSystemProvider::open(dir.path(), StorageMode::Directory, "csv", false).unwrap();
        assert_eq!(provider.path_for("Employees"), dir.path().join("Employees.csv"));
        assert!(!provider.exists("Employees"));

        provider
            .open_write("Employees")
            .unwrap()
            .write_all(b"Id,Name\n")
            .unwrap();
        assert!(provider.exists("Employees"));
        assert_eq!(provider.list_tables().unwrap(), vec!["Employees".to_string()]);

        let mut text = String::new();
        provider
            .open_read("Employees")
            .unwrap()
            .read_to_string(&mut text)
            .unwrap();
        assert_eq!(text, "Id,Name\n");
    }

    #[test]
    fn test_list_ignores_other_extensions() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.csv"), "x\n").unwrap();
        fs::write(dir.path().join("b.txt"), "x\n").unwrap();
        let provider =
            FileSystemProvider::open(dir.path(), StorageMode::Directory, "csv", false).unwrap();
        assert_eq!(provider.list_tables().unwrap(), vec!["a".to_string()]);
    }

    #[test]
    fn test_missing_storage() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            FileSystemProvider::open(&missing, StorageMode::Directory, "csv", false),
            Err(FlatDbError::StorageNotFound(_))
        ));
        assert!(FileSystemProvider::open(&missing, StorageMode::Directory, "csv", true).is_ok());
        assert!(missing.is_dir());
    }

    #[test]
    fn test_file_mode_identifier() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("db.json");
        let provider = FileSystemProvider::open(&file, StorageMode::File, "json", true).unwrap();
        assert_eq!(provider.identifier("Anything"), file.display().to_string());
        assert!(!provider.exists("Anything"));
    }

    #[test]
    fn test_read_missing_table_names_path() {
        let dir = TempDir::new().unwrap();
        let provider =
            FileSystemProvider::open(dir.path(), StorageMode::Directory, "csv", false).unwrap();
        match provider.open_read("Ghost") {
            Err(FlatDbError::TableNotFound { table, path }) => {
                assert_eq!(table, "Ghost");
                assert!(path.ends_with("Ghost.csv"));
            }
            other => panic!("unexpected: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_own_write_is_recognised() {
        let dir = TempDir::new().unwrap();
        let provider =
            FileSystemProvider::open(dir.path(), StorageMode::Directory, "csv", false).unwrap();
        provider.stop_watching();
        provider.open_write("t").unwrap().write_all(b"A\n").unwrap();
        provider.start_watching().unwrap();
        let path = provider.path_for("t");
        assert!(provider.state.is_own_write(&path));

        fs::write(&path, "A\n1\n2\n").unwrap();
        assert!(!provider.state.is_own_write(&path));
    }
}
