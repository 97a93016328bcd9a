//! Filesystem helpers for the store path: content hashing, atomic placement
//! and the advisory lock that serializes writers of one target file.

use crate::error::EdaPartsError;
use backon::{ConstantBuilder, Retryable};
use fs4::FileExt;
use sha2::{Digest, Sha256};
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::{AsyncReadExt, BufReader};
use tracing::{debug, warn};

const HASH_BUFFER_SIZE: usize = 8 * 1024;
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Hex encoded SHA-256 of a file, read in fixed-size chunks.
pub async fn hash_file(path: &Path) -> Result<String, EdaPartsError> {
    let file = tokio::fs::File::open(path).await?;
    let mut reader = BufReader::with_capacity(HASH_BUFFER_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Whether two files have the same content.
pub async fn same_content(a: &Path, b: &Path) -> Result<bool, EdaPartsError> {
    Ok(hash_file(a).await? == hash_file(b).await?)
}

/// Copy `source` next to `target` and rename it into place, so readers of
/// `target` never observe a partially written file.
pub async fn place_file(source: &Path, target: &Path) -> Result<(), EdaPartsError> {
    let mut part_name = target.file_name().unwrap_or_default().to_os_string();
    part_name.push(".part");
    let part = target.with_file_name(part_name);

    if let Err(e) = tokio::fs::copy(source, &part).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e.into());
    }
    if let Err(e) = tokio::fs::rename(&part, target).await {
        let _ = tokio::fs::remove_file(&part).await;
        return Err(e.into());
    }
    Ok(())
}

/// Best effort removal of a temporary upload.
pub async fn discard_upload(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed temporary upload {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove temporary upload {}: {}", path.display(), e),
    }
}

/// Exclusive advisory lock held on a marker file; released on drop.
///
/// The marker file itself is left on disk.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Poll for the lock until `timeout` elapses.
    pub async fn acquire(path: &Path, timeout: Duration) -> Result<Self, EdaPartsError> {
        let lock_path = path.to_path_buf();
        let file = tokio::task::spawn_blocking(move || {
            OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(lock_path)
        })
        .await
        .map_err(|e| EdaPartsError::Io(std::io::Error::other(e)))??;

        let attempts = (timeout.as_millis() / LOCK_RETRY_DELAY.as_millis()).max(1) as usize;
        let policy = ConstantBuilder::default()
            .with_delay(LOCK_RETRY_DELAY)
            .with_max_times(attempts);

        let handle = &file;
        let locked = (|| async move { handle.try_lock_exclusive() })
            .retry(policy)
            .when(|e| e.kind() == ErrorKind::WouldBlock)
            .await;

        match locked {
            Ok(()) => {
                debug!("Acquired lock {}", path.display());
                Ok(Self {
                    file,
                    path: path.to_path_buf(),
                })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Err(EdaPartsError::LockTimeout {
                path: path.to_path_buf(),
                waited: timeout,
            }),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hashes_identify_content() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let c = dir.path().join("c");
        std::fs::write(&a, b"abc").unwrap();
        std::fs::write(&b, b"abc").unwrap();
        std::fs::write(&c, b"abd").unwrap();

        assert_eq!(
            hash_file(&a).await.unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert!(same_content(&a, &b).await.unwrap());
        assert!(!same_content(&a, &c).await.unwrap());
    }

    #[tokio::test]
    async fn places_files_without_leaving_partials() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("upload");
        let target = dir.path().join("R0805.kicad_mod");
        std::fs::write(&source, b"first").unwrap();
        place_file(&source, &target).await.unwrap();
        std::fs::write(&source, b"second").unwrap();
        place_file(&source, &target).await.unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        assert!(!dir.path().join("R0805.kicad_mod.part").exists());
        assert!(source.exists());
    }

    #[tokio::test]
    async fn second_locker_times_out_until_release() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("R0805.kicad_mod.lock");

        let held = FileLock::acquire(&path, Duration::from_millis(100)).await.unwrap();
        let err = FileLock::acquire(&path, Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, EdaPartsError::LockTimeout { .. }));

        drop(held);
        let again = FileLock::acquire(&path, Duration::from_millis(100)).await.unwrap();
        assert_eq!(again.path(), path.as_path());
        assert!(path.exists());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn opening_a_lock_in_a_missing_directory_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent").join("x.lock");
        let err = FileLock::acquire(&path, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, EdaPartsError::Io(_)));
        assert!(!path.exists());
    }
}
