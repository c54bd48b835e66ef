// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Workspace Lock Pool (spec.md §4.L): a singleton async mutex per
//! canonicalized workspace root. Every state-modifying request (WS
//! `command`, HTTP POST, queue worker step) acquires the guard for its
//! workspace before touching the database; reads and the WS ping may skip it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct WorkspaceLockPool {
    locks: Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>,
}

impl WorkspaceLockPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize `workspace_root` (realpath, falling back to the path as
    /// given if it doesn't exist yet) and acquire its singleton mutex.
    pub async fn acquire(&self, workspace_root: &Path) -> OwnedMutexGuard<()> {
        let key = normalize(workspace_root);
        let mutex = {
            let mut locks = self.locks.lock().unwrap();
            locks.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        mutex.lock_owned().await
    }

    /// Number of distinct workspace keys currently tracked (for tests/metrics).
    pub fn tracked_count(&self) -> usize {
        self.locks.lock().unwrap().len()
    }
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn distinct_workspaces_do_not_contend() {
        let pool = Arc::new(WorkspaceLockPool::new());
        let dir_a = tempfile::tempdir().unwrap();
        let dir_b = tempfile::tempdir().unwrap();

        let guard_a = pool.acquire(dir_a.path()).await;
        // Must not block: different workspace key.
        let fut = pool.acquire(dir_b.path());
        let guard_b = tokio::time::timeout(Duration::from_millis(200), fut).await.unwrap();
        drop(guard_a);
        drop(guard_b);
    }

    #[tokio::test]
    async fn same_workspace_serializes_acquisitions() {
        let pool = Arc::new(WorkspaceLockPool::new());
        let dir = tempfile::tempdir().unwrap();

        let guard = pool.acquire(dir.path()).await;
        let pool2 = pool.clone();
        let path2 = dir.path().to_path_buf();
        let handle = tokio::spawn(async move {
            let _second = pool2.acquire(&path2).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished(), "second acquire must block while the first guard is held");

        drop(guard);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn repeated_acquire_reuses_the_same_tracked_key() {
        let pool = WorkspaceLockPool::new();
        let dir = tempfile::tempdir().unwrap();
        drop(pool.acquire(dir.path()).await);
        drop(pool.acquire(dir.path()).await);
        assert_eq!(pool.tracked_count(), 1);
    }
}
