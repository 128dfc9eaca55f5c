//! Process-wide cache of template snapshots.
//!
//! Snapshots are captured once when an instance starts and never change
//! afterwards, so entries need no expiry. Entries of an instance are dropped
//! when it reaches a terminal state.

use dashmap::DashMap;
use uuid::Uuid;

use playbymail_domain::{GameInstanceId, SheetType, TemplateSnapshot};

type SnapshotKey = (GameInstanceId, SheetType, Option<Uuid>);

/// Thread-safe snapshot cache shared by request handlers and job workers.
#[derive(Default)]
pub struct SnapshotCache {
    entries: DashMap<SnapshotKey, TemplateSnapshot>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        instance_id: GameInstanceId,
        sheet_type: SheetType,
        record_id: Option<Uuid>,
    ) -> Option<TemplateSnapshot> {
        self.entries
            .get(&(instance_id, sheet_type, record_id))
            .map(|entry| entry.value().clone())
    }

    pub fn insert(&self, snapshot: TemplateSnapshot) {
        let key = (
            snapshot.game_instance_id,
            snapshot.sheet_type,
            snapshot.record_id,
        );
        self.entries.insert(key, snapshot);
    }

    /// Drop every snapshot of an instance.
    pub fn forget_instance(&self, instance_id: GameInstanceId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(id, _, _), _| *id != instance_id);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
