// ============================================================================
// Snapshot Publication
// ============================================================================
//
// The tracking thread publishes a fresh immutable snapshot after every
// mutation. Readers (the audio render thread) take an Arc under a short read
// lock and never observe a partially updated track.

use crate::track::TrackSnapshot;
use parking_lot::RwLock;
use std::sync::Arc;

/// Latest published snapshot
#[derive(Debug)]
pub struct SnapshotCell {
    current: RwLock<Arc<TrackSnapshot>>,
}

impl SnapshotCell {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(TrackSnapshot::empty())),
        }
    }

    /// Replace the published snapshot
    pub fn publish(&self, snapshot: TrackSnapshot) {
        *self.current.write() = Arc::new(snapshot);
    }

    /// Most recently published snapshot
    pub fn load(&self) -> Arc<TrackSnapshot> {
        Arc::clone(&self.current.read())
    }
}

impl Default for SnapshotCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable read-only handle to a `SnapshotCell`
#[derive(Clone, Debug)]
pub struct SnapshotReader {
    cell: Arc<SnapshotCell>,
}

impl SnapshotReader {
    pub fn new(cell: Arc<SnapshotCell>) -> Self {
        Self { cell }
    }

    pub fn load(&self) -> Arc<TrackSnapshot> {
        self.cell.load()
    }
}
