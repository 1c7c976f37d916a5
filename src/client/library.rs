use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::info;
use tokio::sync::RwLock;

use crate::{error::Result, models::FileDescriptor};

#[derive(Debug, Clone)]
pub struct SharedFile {
    pub descriptor: FileDescriptor,
    pub path: PathBuf,
}

/// Files this client currently offers. Each publish replaces the whole list,
/// matching what the server keeps for the session.
#[derive(Debug, Clone, Default)]
pub struct FileLibrary {
    files: Arc<RwLock<HashMap<String, SharedFile>>>,
}

impl FileLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the library with `paths` and returns the descriptors to
    /// publish. Nothing changes if any path is unreadable or not a file.
    pub async fn publish_paths<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<FileDescriptor>> {
        let mut shared = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            shared.push(SharedFile {
                descriptor: FileDescriptor::from_path(path, None)?,
                path: path.to_path_buf(),
            });
        }
        Ok(self.publish(shared).await)
    }

    pub async fn publish(&self, shared: Vec<SharedFile>) -> Vec<FileDescriptor> {
        let descriptors: Vec<FileDescriptor> =
            shared.iter().map(|file| file.descriptor.clone()).collect();

        // later duplicates of a name win
        let files = shared
            .into_iter()
            .map(|file| (file.descriptor.file_name.clone(), file))
            .collect();
        *self.files.write().await = files;

        info!("Sharing {} file(s)", descriptors.len());
        descriptors
    }

    pub async fn lookup(&self, file_name: &str) -> Option<SharedFile> {
        self.files.read().await.get(file_name).cloned()
    }

    pub async fn descriptors(&self) -> Vec<FileDescriptor> {
        let mut descriptors: Vec<FileDescriptor> = self
            .files
            .read()
            .await
            .values()
            .map(|file| file.descriptor.clone())
            .collect();
        descriptors.sort_by(|a, b| a.file_name.cmp(&b.file_name));
        descriptors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_replaces_wholesale() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"hello").unwrap();
        std::fs::write(&b, vec![0u8; 100]).unwrap();

        let library = FileLibrary::new();
        let published = library.publish_paths(&[&a, &b]).await.unwrap();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].file_name, "a.txt");
        assert_eq!(published[0].size, 5);
        assert_eq!(published[0].description, "text/plain");

        library.publish_paths(&[&b]).await.unwrap();
        assert!(library.lookup("a.txt").await.is_none());
        let found = library.lookup("b.bin").await.unwrap();
        assert_eq!(found.path, b);
        assert_eq!(library.descriptors().await.len(), 1);
    }

    #[tokio::test]
    async fn bad_path_leaves_library_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.txt");
        std::fs::write(&a, b"x").unwrap();

        let library = FileLibrary::new();
        library.publish_paths(&[&a]).await.unwrap();

        let missing = dir.path().join("missing.txt");
        assert!(library.publish_paths(&[&a, &missing]).await.is_err());
        assert!(library.publish_paths(&[dir.path()]).await.is_err());
        assert!(library.lookup("a.txt").await.is_some());
    }
}
