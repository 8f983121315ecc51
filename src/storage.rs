use std::error::Error;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::error;
use uuid::Uuid;

#[derive(Debug)]
pub enum StorageError {
    Io { path: PathBuf, source: std::io::Error },
    InvalidName(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io { path, source } => {
                write!(f, "I/O error on {}: {}", path.display(), source)
            }
            StorageError::InvalidName(name) => {
                write!(f, "invalid document name '{}'", name)
            }
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StorageError::Io { source, .. } => Some(source),
            StorageError::InvalidName(_) => None,
        }
    }
}

/// Whole-document text storage. Reads of a missing document yield `None`;
/// writes replace the document in full.
pub trait DocumentStorage {
    fn read_text(&self, name: &str) -> Result<Option<String>, StorageError>;
    fn write_text(&self, name: &str, contents: &str) -> Result<(), StorageError>;
}

#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        let path = Path::new(name);
        let escapes = path
            .components()
            .any(|part| matches!(part, std::path::Component::ParentDir));
        if name.trim().is_empty() || escapes {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(self.root.join(path))
    }
}

impl DocumentStorage for FsStorage {
    fn read_text(&self, name: &str) -> Result<Option<String>, StorageError> {
        let path = self.resolve(name)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io { path, source }),
        }
    }

    fn write_text(&self, name: &str, contents: &str) -> Result<(), StorageError> {
        let path = self.resolve(name)?;
        let io_err = |source: std::io::Error| StorageError::Io {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let file_name = path
            .file_name()
            .map(|value| value.to_string_lossy().to_string())
            .unwrap_or_default();
        let tmp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::now_v7()));
        let written = (|| -> std::io::Result<()> {
            let mut file = OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&tmp_path)?;
            file.write_all(contents.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &path)
        })();
        if let Err(source) = written {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_err(source));
        }
        Ok(())
    }
}

/// Invoked after every successful workflow document write.
pub trait ChangeNotifier {
    fn storage_changed(&self) -> Result<(), Box<dyn Error + Send + Sync>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopNotifier;

impl ChangeNotifier for NoopNotifier {
    fn storage_changed(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

/// Receives file-boundary failures the engine absorbs instead of returning.
pub trait ErrorReporter {
    fn report(&self, context: &str, err: &dyn Error);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &str, err: &dyn Error) {
        error!(context, error = %err, "alert engine error");
    }
}


#[cfg(test)]
mod tests {
    use super::{DocumentStorage, FsStorage, StorageError};
    use std::path::PathBuf;
    use uuid::Uuid;

    fn unique_workspace() -> PathBuf {
        let root = std::env::temp_dir().join(format!("alertsync-storage-{}", Uuid::now_v7()));
        std::fs::create_dir_all(&root).expect("temp workspace should be creatable");
        root
    }

    #[test]
    fn missing_document_reads_as_none() {
        let root = unique_workspace();
        let storage = FsStorage::new(&root);
        assert!(storage
            .read_text("absent.json")
            .expect("read should succeed")
            .is_none());
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn write_replaces_document_and_leaves_no_temp_files() {
        let root = unique_workspace();
        let storage = FsStorage::new(&root);
        storage
            .write_text("nested/doc.json", "first")
            .expect("first write should succeed");
        storage
            .write_text("nested/doc.json", "second")
            .expect("second write should succeed");

        let text = storage
            .read_text("nested/doc.json")
            .expect("read should succeed");
        assert_eq!(text.as_deref(), Some("second"));

        let entries = std::fs::read_dir(root.join("nested"))
            .expect("dir should be readable")
            .count();
        assert_eq!(entries, 1);
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn rejects_names_escaping_the_root() {
        let storage = FsStorage::new(std::env::temp_dir());
        let result = storage.write_text("../outside.json", "x");
        assert!(matches!(result, Err(StorageError::InvalidName(_))));
    }
}
