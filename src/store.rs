use std::io;
use std::path::PathBuf;

use futures::future::{BoxFuture, FutureExt};

use crate::errors::BackendError;

pub mod mock;

/// Staging for evidence files. A saved file is retrievable under its
/// stored name until it is explicitly deleted; deletion is idempotent
/// so cleanup after a failed request can never fail on a file that was
/// never staged.
pub trait Store: Send + Sync {
    /// Saves the given data under the given stored name.
    fn save(&self, stored_name: &str, raw: Vec<u8>) -> BoxFuture<Result<(), BackendError>>;

    /// Deletes the given file. Deleting a nonexistent file is not an
    /// error.
    fn delete(&self, stored_name: &str) -> BoxFuture<Result<(), BackendError>>;
}

/// A store that stages evidence beneath a local directory.
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Creates a new instance, ensuring the staging directory exists.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, io::Error> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        Ok(DiskStore { root })
    }

    fn path_for(&self, stored_name: &str) -> PathBuf {
        self.root.join(stored_name)
    }
}

impl Store for DiskStore {
    fn save(&self, stored_name: &str, raw: Vec<u8>) -> BoxFuture<Result<(), BackendError>> {
        let path = self.path_for(stored_name);

        async move {
            tokio::fs::write(&path, &raw)
                .await
                .map_err(|source| BackendError::Staging { source })
        }
        .boxed()
    }

    fn delete(&self, stored_name: &str) -> BoxFuture<Result<(), BackendError>> {
        let path = self.path_for(stored_name);

        async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(source) => Err(BackendError::Staging { source }),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_files_are_retrievable_until_deleted() {
        let dir = tempfile::tempdir().expect("create temporary directory");
        let store = DiskStore::new(dir.path()).expect("create store");

        store
            .save("voice-abc123", b"not really audio".to_vec())
            .await
            .expect("save");

        let staged = tokio::fs::read(dir.path().join("voice-abc123"))
            .await
            .expect("read staged file");
        assert_eq!(staged, b"not really audio");

        store.delete("voice-abc123").await.expect("delete");
        assert!(!dir.path().join("voice-abc123").exists());
    }

    #[tokio::test]
    async fn deleting_twice_is_not_an_error() {
        let dir = tempfile::tempdir().expect("create temporary directory");
        let store = DiskStore::new(dir.path()).expect("create store");

        store.save("image-xyz", vec![1, 2, 3]).await.expect("save");

        store.delete("image-xyz").await.expect("first delete");
        store.delete("image-xyz").await.expect("second delete");
        store.delete("never-staged").await.expect("delete of nonexistent file");
    }
}
