//! Atomic JSON document store.

use crate::dir::DataDir;
use crate::error::{StoreError, StoreResult};
use dosesync_protocol::{unix_seconds, DocumentKind};
use parking_lot::Mutex;
use serde_json::Value;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Durable get/put of the tracker and library documents.
///
/// # Thread Safety
///
/// The store is `Send + Sync` and meant to be shared behind an `Arc`.
/// Each document has its own rename lock, held only while the finished temp
/// file is moved into place. Serialization and fsync happen outside it, and
/// readers never lock.
///
/// # Example
///
/// ```no_run
/// use dosesync_protocol::DocumentKind;
/// use dosesync_store::DocumentStore;
/// use std::path::Path;
///
/// let store = DocumentStore::open(Path::new("data")).unwrap();
/// let tracker = store.read(DocumentKind::Tracker);
/// let mtime = store.mtime(DocumentKind::Tracker).unwrap();
/// ```
#[derive(Debug)]
pub struct DocumentStore {
    dir: DataDir,
    tracker_lock: Mutex<()>,
    library_lock: Mutex<()>,
}

impl DocumentStore {
    /// Opens the store in `path`, creating the directory if needed.
    ///
    /// Temp files left behind by an interrupted write are removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if another process owns the directory.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let dir = DataDir::open(path)?;

        for stale in dir.stale_temp_files()? {
            debug!(path = %stale.display(), "removing stale temp file");
            fs::remove_file(&stale)?;
        }

        Ok(Self {
            dir,
            tracker_lock: Mutex::new(()),
            library_lock: Mutex::new(()),
        })
    }

    /// Returns the data directory path.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the backing file of a document.
    #[must_use]
    pub fn document_path(&self, kind: DocumentKind) -> PathBuf {
        self.dir.document_path(kind)
    }

    /// Reads a document, falling back to its default.
    ///
    /// A missing file yields the default silently. A corrupt or unreadable
    /// file also yields the default, with a warning; use
    /// [`read_strict`](Self::read_strict) to see the failure.
    pub fn read(&self, kind: DocumentKind) -> Value {
        match self.read_strict(kind) {
            Ok(Some(document)) => document,
            Ok(None) => kind.default_document(),
            Err(err) => {
                warn!(document = %kind, error = %err, "serving default document");
                kind.default_document()
            }
        }
    }

    /// Reads a document, distinguishing missing from corrupt.
    ///
    /// Returns `Ok(None)` if nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Corrupted`] if the file is not valid JSON or has the
    ///   wrong top-level shape
    /// - [`StoreError::Io`] if the file cannot be read
    pub fn read_strict(&self, kind: DocumentKind) -> StoreResult<Option<Value>> {
        let bytes = match fs::read(self.dir.document_path(kind)) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let document: Value = serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::corrupted(kind, e.to_string()))?;

        if !kind.accepts(&document) {
            return Err(StoreError::corrupted(kind, "wrong top-level type"));
        }

        Ok(Some(document))
    }

    /// Replaces a document on disk.
    ///
    /// The payload shape is checked first; a rejected payload never touches
    /// disk. The write goes to a unique temp file which is fsynced and then
    /// renamed over the target, followed by a directory fsync. On failure
    /// the previous file is left as it was and the temp file is removed.
    pub fn write(&self, kind: DocumentKind, document: &Value) -> StoreResult<()> {
        kind.validate(document)?;
        let bytes = serde_json::to_vec(document)?;

        let temp_path = self.dir.temp_path(kind);
        let result = self.write_via(&temp_path, kind, &bytes);
        if result.is_err() {
            let _ = fs::remove_file(&temp_path);
        }
        result
    }

    fn write_via(&self, temp_path: &Path, kind: DocumentKind, bytes: &[u8]) -> StoreResult<()> {
        let mut file = File::create(temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        drop(file);

        {
            let _guard = self.rename_lock(kind).lock();
            fs::rename(temp_path, self.dir.document_path(kind))?;
        }

        self.dir.sync()?;
        debug!(document = %kind, bytes = bytes.len(), "document written");
        Ok(())
    }

    /// Returns the modification time of a document in epoch seconds.
    ///
    /// Returns 0 if the document has never been written.
    pub fn mtime(&self, kind: DocumentKind) -> StoreResult<f64> {
        match fs::metadata(self.dir.document_path(kind)) {
            Ok(meta) => Ok(unix_seconds(meta.modified()?)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(0.0),
            Err(err) => Err(err.into()),
        }
    }

    fn rename_lock(&self, kind: DocumentKind) -> &Mutex<()> {
        match kind {
            DocumentKind::Tracker => &self.tracker_lock,
            DocumentKind::Library => &self.library_lock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    #[test]
    fn missing_documents_read_as_default() {
        let temp = tempdir().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();

        assert_eq!(
            store.read(DocumentKind::Tracker),
            json!({"schema_version": 1, "logs": []})
        );
        assert_eq!(store.read(DocumentKind::Library), json!([]));
        assert!(store.read_strict(DocumentKind::Tracker).unwrap().is_none());
        assert_eq!(store.mtime(DocumentKind::Tracker).unwrap(), 0.0);
    }

    #[test]
    fn write_then_read() {
        let temp = tempdir().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();

        let tracker = json!({"schema_version": 2, "logs": [{"dose": 5, "unit": "mg"}]});
        store.write(DocumentKind::Tracker, &tracker).unwrap();

        assert_eq!(store.read(DocumentKind::Tracker), tracker);
        assert!(store.mtime(DocumentKind::Tracker).unwrap() > 0.0);
        // Writing one document leaves the other untouched.
        assert_eq!(store.mtime(DocumentKind::Library).unwrap(), 0.0);
    }

    #[test]
    fn persists_across_reopen() {
        let temp = tempdir().unwrap();
        let library = json!([{"name": "a"}, {"name": "b"}]);
        {
            let store = DocumentStore::open(temp.path()).unwrap();
            store.write(DocumentKind::Library, &library).unwrap();
        }
        let store = DocumentStore::open(temp.path()).unwrap();
        assert_eq!(store.read(DocumentKind::Library), library);
    }

    #[test]
    fn wrong_shape_is_rejected_without_writing() {
        let temp = tempdir().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();

        let result = store.write(DocumentKind::Tracker, &json!([1, 2, 3]));
        assert!(matches!(result, Err(StoreError::InvalidPayload(_))));
        let result = store.write(DocumentKind::Library, &json!({"logs": []}));
        assert!(matches!(result, Err(StoreError::InvalidPayload(_))));

        assert!(!store.document_path(DocumentKind::Tracker).exists());
        assert!(!store.document_path(DocumentKind::Library).exists());
    }

    #[test]
    fn corrupt_file_falls_back_to_default() {
        let temp = tempdir().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        fs::write(store.document_path(DocumentKind::Tracker), b"{\"logs\": [").unwrap();

        assert!(matches!(
            store.read_strict(DocumentKind::Tracker),
            Err(StoreError::Corrupted { kind: DocumentKind::Tracker, .. })
        ));
        assert_eq!(
            store.read(DocumentKind::Tracker),
            DocumentKind::Tracker.default_document()
        );
    }

    #[test]
    fn wrong_shape_on_disk_is_corrupt() {
        let temp = tempdir().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        fs::write(store.document_path(DocumentKind::Library), b"{}").unwrap();

        assert!(matches!(
            store.read_strict(DocumentKind::Library),
            Err(StoreError::Corrupted { .. })
        ));
        assert_eq!(store.read(DocumentKind::Library), json!([]));
    }

    #[test]
    fn empty_file_reads_as_missing() {
        let temp = tempdir().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();
        fs::write(store.document_path(DocumentKind::Library), b"  \n").unwrap();

        assert!(store.read_strict(DocumentKind::Library).unwrap().is_none());
    }

    #[test]
    fn failed_rename_keeps_previous_state() {
        let temp = tempdir().unwrap();
        let store = DocumentStore::open(temp.path()).unwrap();

        // A non-empty directory at the target path makes the rename fail.
        let target = store.document_path(DocumentKind::Tracker);
        fs::create_dir(&target).unwrap();
        fs::write(target.join("keep"), b"x").unwrap();

        let result = store.write(DocumentKind::Tracker, &json!({"logs": []}));
        assert!(matches!(result, Err(StoreError::Io(_))));
        assert!(target.join("keep").exists());
        assert!(store.dir.stale_temp_files().unwrap().is_empty());
    }

    #[test]
    fn stale_temp_files_removed_on_open() {
        let temp = tempdir().unwrap();
        {
            let dir = DataDir::open(temp.path()).unwrap();
            fs::write(dir.temp_path(DocumentKind::Tracker), b"{\"half").unwrap();
        }
        let store = DocumentStore::open(temp.path()).unwrap();
        assert!(store.dir.stale_temp_files().unwrap().is_empty());
    }

    #[test]
    fn concurrent_writes_never_mix() {
        let temp = tempdir().unwrap();
        let store = Arc::new(DocumentStore::open(temp.path()).unwrap());

        let a = json!({"schema_version": 1, "logs": vec!["a"; 500]});
        let b = json!({"schema_version": 1, "logs": vec!["b"; 700]});

        let writers: Vec<_> = [a.clone(), b.clone()]
            .into_iter()
            .map(|doc| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        store.write(DocumentKind::Tracker, &doc).unwrap();
                    }
                })
            })
            .collect();

        let reader = {
            let store = Arc::clone(&store);
            let (a, b) = (a.clone(), b.clone());
            thread::spawn(move || {
                for _ in 0..200 {
                    if let Some(doc) = store.read_strict(DocumentKind::Tracker).unwrap() {
                        assert!(doc == a || doc == b);
                    }
                }
            })
        };

        for writer in writers {
            writer.join().unwrap();
        }
        reader.join().unwrap();

        let stored = store.read(DocumentKind::Tracker);
        assert!(stored == a || stored == b);
        assert!(store.dir.stale_temp_files().unwrap().is_empty());
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-zA-Z0-9 _-]{0,12}".prop_map(Value::from),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn stored_documents_read_back_equal(
            logs in prop::collection::vec(arb_json(), 0..8),
            library in prop::collection::vec(arb_json(), 0..8),
        ) {
            let temp = tempdir().unwrap();
            let store = DocumentStore::open(temp.path()).unwrap();

            let tracker = json!({"schema_version": 1, "logs": logs});
            let library = Value::Array(library);
            store.write(DocumentKind::Tracker, &tracker).unwrap();
            store.write(DocumentKind::Library, &library).unwrap();

            prop_assert_eq!(store.read(DocumentKind::Tracker), tracker);
            prop_assert_eq!(store.read(DocumentKind::Library), library);
        }
    }
}
