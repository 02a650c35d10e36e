use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;

use crate::constants::FILE_TRACKER_LEDGER_FILENAME;
use crate::errors::ServerResult;

/// Deferred-deletion ledger: a file is only ever removed once no
/// published snapshot references it. Callers submit candidate paths with
/// a starting reference count; `release` drops the count and deletes at
/// zero. Persisted so a restart does not leak files whose snapshot
/// already moved on.
#[derive(Default, Serialize, Deserialize)]
struct Ledger {
  pending: HashMap<String, usize>,
}

pub struct FileTracker {
  base_path: PathBuf,
  ledger: Mutex<Ledger>,
}

impl FileTracker {
  pub async fn open(base_path: &Path) -> ServerResult<FileTracker> {
    let ledger_path = base_path.join(FILE_TRACKER_LEDGER_FILENAME);
    let ledger = if ledger_path.exists() {
      let bytes = fs::read(&ledger_path).await?;
      serde_json::from_slice(&bytes)?
    } else {
      Ledger::default()
    };
    Ok(FileTracker { base_path: base_path.to_path_buf(), ledger: Mutex::new(ledger) })
  }

  /// Registers `paths` for eventual deletion once `refcount` releases
  /// have been observed for each (normally 1: "no snapshot references
  /// this file anymore").
  pub async fn submit(&self, paths: &[PathBuf], refcount: usize) -> ServerResult<()> {
    let mut ledger = self.ledger.lock().await;
    for path in paths {
      ledger.pending.insert(path_key(path), refcount);
    }
    self.persist(&ledger).await
  }

  /// Decrements the refcount for `path` and deletes it once it reaches
  /// zero. Unknown paths are ignored (already swept or never tracked).
  pub async fn release(&self, path: &Path) -> ServerResult<()> {
    let mut ledger = self.ledger.lock().await;
    let key = path_key(path);
    let mut should_delete = false;
    if let Some(count) = ledger.pending.get_mut(&key) {
      if *count > 0 {
        *count -= 1;
      }
      if *count == 0 {
        should_delete = true;
      }
    }
    if should_delete {
      ledger.pending.remove(&key);
      let _ = fs::remove_file(path).await;
    }
    self.persist(&ledger).await
  }

  /// Releases every path from a completed reference (e.g. an evicted
  /// snapshot), sweeping any that reach zero.
  pub async fn release_all(&self, paths: &[PathBuf]) -> ServerResult<()> {
    for path in paths {
      self.release(path).await?;
    }
    Ok(())
  }

  pub async fn pending_count(&self) -> usize {
    self.ledger.lock().await.pending.len()
  }

  async fn persist(&self, ledger: &Ledger) -> ServerResult<()> {
    let body = serde_json::to_vec(ledger)?;
    let tmp_path = self.base_path.join(format!("{}.tmp", FILE_TRACKER_LEDGER_FILENAME));
    fs::write(&tmp_path, &body).await?;
    fs::rename(&tmp_path, self.base_path.join(FILE_TRACKER_LEDGER_FILENAME)).await?;
    Ok(())
  }
}

fn path_key(path: &Path) -> String {
  path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
  use tempfile::tempdir;

  use super::*;

  #[tokio::test]
  async fn release_deletes_file_once_refcount_reaches_zero() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seg0.cst");
    fs::write(&path, b"data").await.unwrap();

    let tracker = FileTracker::open(dir.path()).await.unwrap();
    tracker.submit(&[path.clone()], 2).await.unwrap();
    assert_eq!(tracker.pending_count().await, 1);

    tracker.release(&path).await.unwrap();
    assert!(path.exists());
    assert_eq!(tracker.pending_count().await, 1);

    tracker.release(&path).await.unwrap();
    assert!(!path.exists());
    assert_eq!(tracker.pending_count().await, 0);
  }

  #[tokio::test]
  async fn ledger_survives_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("seg0.cst");
    fs::write(&path, b"data").await.unwrap();

    let tracker = FileTracker::open(dir.path()).await.unwrap();
    tracker.submit(&[path.clone()], 1).await.unwrap();
    drop(tracker);

    let reopened = FileTracker::open(dir.path()).await.unwrap();
    assert_eq!(reopened.pending_count().await, 1);
    reopened.release(&path).await.unwrap();
    assert!(!path.exists());
  }

  #[tokio::test]
  async fn release_of_untracked_path_is_a_no_op() {
    let dir = tempdir().unwrap();
    let tracker = FileTracker::open(dir.path()).await.unwrap();
    tracker.release(&dir.path().join("nonexistent.cst")).await.unwrap();
    assert_eq!(tracker.pending_count().await, 0);
  }
}
