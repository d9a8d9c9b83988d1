//! Backup ring
//!
//! Shadow copies of in-flight SAFE tasks live in one list per queue manager.
//! The list is walked by rotating it (RPOPLPUSH onto itself), never drained;
//! a single marker entry tells a scan when it has gone all the way round.

use crate::storage::Store;
use crate::task::Task;
use crate::Result;
use std::sync::Arc;

/// Backup ring handle
#[derive(Clone)]
pub struct BackupQueue {
    store: Arc<dyn Store>,
    name: String,
}

impl BackupQueue {
    /// Create a handle for the ring with the given key
    pub fn new(store: Arc<dyn Store>, name: impl Into<String>) -> Self {
        Self {
            store,
            name: name.into(),
        }
    }

    /// Ring key
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Seed the ring with its marker unless it already exists
    ///
    /// Returns true when this call created the ring. Store errors are logged
    /// and reported as false.
    pub async fn init_queue(&self) -> bool {
        match self.try_init_queue().await {
            Ok(seeded) => seeded,
            Err(e) => {
                tracing::error!("Failed to init backup queue {}: {}", self.name, e);
                false
            }
        }
    }

    /// Seed the ring with its marker unless it already exists
    pub async fn try_init_queue(&self) -> Result<bool> {
        let marker = Task::marker(&self.name).encode()?;
        let seeded = self.store.lpush_if_absent(&self.name, &marker).await?;

        if seeded {
            tracing::info!("Backup queue {} created with marker", self.name);
        } else {
            let entries = self.snapshot().await?;
            tracing::info!("Backup queue {} already exists with {} entries", self.name, entries.len());
            for entry in &entries {
                tracing::debug!("Backup queue {} entry: {}", self.name, entry);
            }
        }

        Ok(seeded)
    }

    /// Rotate the ring by one and return the entry that moved
    ///
    /// Ring length and membership are unchanged. Store errors are logged
    /// and reported as `None`.
    pub async fn pop_task(&self) -> Option<Task> {
        match self.try_pop_task().await {
            Ok(task) => task,
            Err(e) => {
                tracing::error!("Failed to rotate backup queue {}: {}", self.name, e);
                None
            }
        }
    }

    /// Rotate the ring by one and return the entry that moved
    pub async fn try_pop_task(&self) -> Result<Option<Task>> {
        match self.try_pop_raw().await? {
            Some(raw) => Task::decode(&raw).map(Some),
            None => Ok(None),
        }
    }

    /// Rotate the ring by one and return the raw entry
    pub(crate) async fn try_pop_raw(&self) -> Result<Option<String>> {
        self.store.rpoplpush(&self.name, &self.name).await
    }

    /// Remove one entry equal to the task's serialized form
    pub async fn finish_task(&self, task: &Task) {
        if let Err(e) = self.try_finish_task(task).await {
            tracing::error!("Failed to remove task {} from backup queue {}: {}",
                task.id, self.name, e);
        }
    }

    /// Remove one entry equal to the task's serialized form
    ///
    /// Returns the number of removed entries (0 or 1).
    pub async fn try_finish_task(&self, task: &Task) -> Result<u64> {
        self.remove_raw(&task.encode()?).await
    }

    /// Remove one entry equal to `raw`
    pub(crate) async fn remove_raw(&self, raw: &str) -> Result<u64> {
        self.store.lrem(&self.name, 1, raw).await
    }

    /// Add a shadow copy at the tail of the ring
    ///
    /// Outside a scan the marker sits at the head, so a new shadow is reached
    /// by the next pass before the marker.
    pub(crate) async fn shadow(&self, task: &Task) -> Result<()> {
        self.store.rpush(&self.name, &task.encode()?).await?;
        Ok(())
    }

    /// All raw entries, head first
    pub async fn snapshot(&self) -> Result<Vec<String>> {
        self.store.lrange(&self.name, 0, -1).await
    }

    /// Number of entries, marker included
    pub async fn len(&self) -> Result<u64> {
        self.store.llen(&self.name).await
    }

    /// Check whether the ring holds nothing at all, not even its marker
    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

impl std::fmt::Debug for BackupQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupQueue").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn ring() -> (Arc<MemoryStore>, BackupQueue) {
        let store = Arc::new(MemoryStore::new());
        let ring = BackupQueue::new(store.clone(), "back_up_queue_test");
        (store, ring)
    }

    #[tokio::test]
    async fn test_init_seeds_single_marker() {
        let (_store, ring) = ring();

        assert!(ring.init_queue().await);
        assert!(!ring.init_queue().await);
        assert_eq!(ring.len().await.unwrap(), 1);

        let marker = Task::decode(&ring.snapshot().await.unwrap()[0]).unwrap();
        assert!(marker.is_marker_of("back_up_queue_test"));
    }

    #[tokio::test]
    async fn test_concurrent_init_seeds_one_marker() {
        let (store, ring) = ring();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ring = ring.clone();
            handles.push(tokio::spawn(async move { ring.init_queue().await }));
        }

        let mut seeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                seeded += 1;
            }
        }
        assert_eq!(seeded, 1);
        assert_eq!(store.llen("back_up_queue_test").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rotation_preserves_membership() {
        let (_store, ring) = ring();
        ring.init_queue().await;
        for i in 0..3 {
            let task = Task::builder("q").id(format!("t{}", i)).build().unwrap();
            ring.shadow(&task).await.unwrap();
        }

        let before = ring.snapshot().await.unwrap();
        let len = ring.len().await.unwrap();
        for _ in 0..len {
            assert!(ring.pop_task().await.is_some());
            assert_eq!(ring.len().await.unwrap(), len);
        }
        assert_eq!(ring.snapshot().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_shadow_is_reached_before_marker() {
        let (_store, ring) = ring();
        ring.init_queue().await;
        let task = Task::builder("q").id("t").build().unwrap();
        ring.shadow(&task).await.unwrap();

        assert_eq!(ring.pop_task().await.unwrap(), task);
        assert!(ring.pop_task().await.unwrap().is_marker_of("back_up_queue_test"));

        // after a full rotation the marker is back at the head
        let later = Task::builder("q").id("u").build().unwrap();
        ring.shadow(&later).await.unwrap();
        assert_eq!(ring.pop_task().await.unwrap(), task);
        assert_eq!(ring.pop_task().await.unwrap(), later);
        assert!(ring.pop_task().await.unwrap().is_marker_of("back_up_queue_test"));
    }

    #[tokio::test]
    async fn test_finish_removes_one_occurrence() {
        let (_store, ring) = ring();
        let task = Task::builder("q").id("t").build().unwrap();
        ring.shadow(&task).await.unwrap();
        ring.shadow(&task).await.unwrap();

        assert_eq!(ring.try_finish_task(&task).await.unwrap(), 1);
        assert_eq!(ring.len().await.unwrap(), 1);

        ring.finish_task(&task).await;
        assert!(ring.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_pop_empty_ring() {
        let (_store, ring) = ring();
        assert!(ring.pop_task().await.is_none());
    }
}
