use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use oracle_common::types::AttestationRecord;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

const DEFAULT_RETENTION_DAYS: i64 = 7;

/// Append-only, in-process store of attestation records keyed by
/// `batch_id`, grounded on the key-builder-plus-prune shape of the
/// teacher's `CacheService` (key builders in `cache.rs`) but adapted from a
/// TTL-evicted cache to durable storage a caller can query and prune on a
/// schedule. A write that fails (e.g. a future on-disk/DB backend being
/// unreachable) is recovered locally and logged — it never fails the
/// submission that produced the record (spec §4.9).
#[derive(Clone)]
pub struct AttestationStore {
    records: Arc<RwLock<HashMap<Uuid, AttestationRecord>>>,
    retention: ChronoDuration,
}

impl Default for AttestationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AttestationStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(HashMap::new())),
            retention: ChronoDuration::days(DEFAULT_RETENTION_DAYS),
        }
    }

    #[must_use]
    pub fn with_retention(mut self, retention: ChronoDuration) -> Self {
        self.retention = retention;
        self
    }

    /// Records an attestation. Never returns an error: a local write is
    /// assumed infallible, and a future durable backend's failure is
    /// logged rather than surfaced (spec §4.9 "failures never fail the
    /// submission").
    pub async fn record(&self, record: AttestationRecord) {
        let batch_id = record.batch_id;
        self.records.write().await.insert(batch_id, record);
        info!(%batch_id, "attestation recorded");
    }

    pub async fn get(&self, batch_id: Uuid) -> Option<AttestationRecord> {
        self.records.read().await.get(&batch_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Removes records older than the configured retention window, returning
    /// the number removed.
    pub async fn cleanup_old_attestations(&self) -> usize {
        let cutoff = Utc::now() - self.retention;
        let mut records = self.records.write().await;
        let before = records.len();
        records.retain(|_, r| r.created_at > cutoff);
        let removed = before - records.len();
        if removed > 0 {
            info!(removed, "cleaned up old attestation records");
        } else {
            warn!("attestation cleanup found nothing past retention window");
        }
        removed
    }
}
