//! Durable queue of offline writes, replayed against the remote system
//! in enqueue order once connectivity returns.

use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{CoreError, CoreResult};
use crate::model::{
    local_id, meta_keys, MutationAction, MutationItem, MutationStatus, Zone, LOCAL_ID_PREFIX,
};
use crate::net::NetworkMonitor;
use crate::remote::RemoteApi;
use crate::storage::{Collection, LocalStore};

/// Width of the zero-padded sequence id. Store iteration order over these
/// keys is enqueue order.
const SEQ_WIDTH: usize = 12;

/// Outcome of a single `drain` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub failed: usize,
    pub abandoned: usize,
    pub remaining: usize,
}

pub struct MutationQueue {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteApi>,
    network: NetworkMonitor,
}

impl MutationQueue {
    pub fn new(store: Arc<LocalStore>, remote: Arc<dyn RemoteApi>, network: NetworkMonitor) -> Self {
        Self { store, remote, network }
    }

    // ==================== Enqueue ====================

    /// Record a zone creation. The zone is given a temporary local id when
    /// it does not already carry one, written to the local cache so it is
    /// immediately searchable, and queued for replay.
    pub fn enqueue_create_zone(&self, mut zone: Zone) -> CoreResult<Zone> {
        if zone.code.is_empty() {
            zone.code = local_id();
        }
        zone = zone.with_derived_geohash();
        zone.validate()?;

        self.store.put(&zone)?;
        self.push(MutationAction::Create, serde_json::to_value(&zone)?)?;
        Ok(zone)
    }

    /// Record a zone update, applied locally first (last writer wins).
    pub fn enqueue_update_zone(&self, zone: Zone) -> CoreResult<Zone> {
        let zone = zone.with_derived_geohash();
        zone.validate()?;
        if self.store.get::<Zone>(&zone.code)?.is_none() {
            return Err(CoreError::RecordNotFound(zone.code.clone()));
        }

        self.store.put(&zone)?;
        self.push(MutationAction::Update, serde_json::to_value(&zone)?)?;
        Ok(zone)
    }

    /// Record a zone deletion, removed from the local cache immediately.
    pub fn enqueue_delete_zone(&self, code: &str) -> CoreResult<()> {
        self.store.remove::<Zone>(code)?;

        // A delete of a never-synced local zone cancels its queued create
        // and any updates instead of reaching the remote at all.
        if code.starts_with(LOCAL_ID_PREFIX) {
            for item in self.items()? {
                if payload_code(&item.payload) == Some(code) {
                    self.store.remove::<MutationItem>(&item.id)?;
                }
            }
            return Ok(());
        }

        self.push(MutationAction::Delete, serde_json::json!({ "code": code }))
    }

    // ==================== Inspection ====================

    /// All queued items in enqueue order, abandoned ones included.
    pub fn items(&self) -> CoreResult<Vec<MutationItem>> {
        self.store.get_all::<MutationItem>()
    }

    /// Items still eligible for replay.
    pub fn pending_count(&self) -> CoreResult<usize> {
        Ok(self.items()?.iter().filter(|i| !i.is_abandoned()).count())
    }

    /// Items that have failed at least once, including those past the
    /// retry ceiling, kept for operator inspection.
    pub fn failed_items(&self) -> CoreResult<Vec<MutationItem>> {
        Ok(self
            .items()?
            .into_iter()
            .filter(|i| i.status == MutationStatus::Failed || i.is_abandoned())
            .collect())
    }

    /// Drop one abandoned item after manual resolution.
    pub fn discard(&self, id: &str) -> CoreResult<()> {
        self.store.remove::<MutationItem>(id)
    }

    // ==================== Replay ====================

    /// Replay pending mutations in enqueue order. Stops at the first
    /// transient failure so later writes cannot overtake earlier ones;
    /// non-retryable rejections count against the item's retry ceiling
    /// and the drain moves on.
    pub async fn drain(&self) -> CoreResult<DrainReport> {
        if !self.network.is_online() {
            return Err(CoreError::NetworkUnavailable);
        }

        let mut report = DrainReport::default();
        let ids: Vec<String> = self.items()?.into_iter().map(|i| i.id).collect();

        for id in ids {
            // Re-read: an earlier create in this pass may have rewritten
            // this item's payload with the server-assigned code.
            let Some(mut item) = self.store.get::<MutationItem>(&id)? else {
                continue;
            };
            if item.is_abandoned() {
                report.abandoned += 1;
                continue;
            }

            item.status = MutationStatus::Syncing;
            self.store.put(&item)?;

            match self.replay_one(&item).await {
                Ok(()) => {
                    self.store.remove::<MutationItem>(&item.id)?;
                    report.replayed += 1;
                }
                Err(e) if e.is_retryable() => {
                    item.retry_count += 1;
                    item.status = MutationStatus::Failed;
                    item.last_error = Some(e.to_string());
                    let abandoned = item.is_abandoned();
                    self.store.put(&item)?;
                    warn!("Replay of mutation {} failed, will retry: {}", item.id, e);
                    if abandoned {
                        report.abandoned += 1;
                        continue;
                    }
                    report.failed += 1;
                    break;
                }
                Err(e) => {
                    item.retry_count = MutationItem::MAX_RETRIES;
                    item.status = MutationStatus::Failed;
                    item.last_error = Some(e.to_string());
                    self.store.put(&item)?;
                    warn!("Mutation {} permanently rejected: {}", item.id, e);
                    report.abandoned += 1;
                }
            }
        }

        report.remaining = self.pending_count()?;
        info!(
            "Queue drain: {} replayed, {} deferred, {} abandoned, {} remaining",
            report.replayed, report.failed, report.abandoned, report.remaining
        );
        Ok(report)
    }

    async fn replay_one(&self, item: &MutationItem) -> CoreResult<()> {
        match item.action {
            MutationAction::Create => {
                let zone: Zone = serde_json::from_value(item.payload.clone())?;
                let temp_code = zone.code.clone();
                let created = self.remote.create_zone(&zone).await?;
                if temp_code.starts_with(LOCAL_ID_PREFIX) {
                    self.adopt_server_code(&temp_code, &created)?;
                }
                Ok(())
            }
            MutationAction::Update => {
                let zone: Zone = serde_json::from_value(item.payload.clone())?;
                let updated = self.remote.update_zone(&zone).await?;
                self.store.put(&updated)?;
                Ok(())
            }
            MutationAction::Delete => {
                let code = payload_code(&item.payload)
                    .ok_or_else(|| {
                        CoreError::InvalidRecord("delete mutation without a code".to_string())
                    })?
                    .to_string();
                self.remote.delete_zone(&code).await
            }
        }
    }

    /// Swap a temporary local id for the server-assigned code: replace the
    /// cached record and rewrite any queued mutations that still reference
    /// the old id.
    fn adopt_server_code(&self, temp_code: &str, created: &Zone) -> CoreResult<()> {
        self.store.remove::<Zone>(temp_code)?;
        self.store.put(created)?;
        info!("Zone {} adopted server code {}", temp_code, created.code);

        for mut queued in self.items()? {
            if payload_code(&queued.payload) == Some(temp_code) {
                if let JsonValue::Object(map) = &mut queued.payload {
                    map.insert("code".to_string(), JsonValue::String(created.code.clone()));
                }
                self.store.put(&queued)?;
            }
        }
        Ok(())
    }

    // ==================== Internals ====================

    fn push(&self, action: MutationAction, payload: JsonValue) -> CoreResult<()> {
        let item = MutationItem {
            id: self.next_seq_id()?,
            action,
            target_collection: Collection::Zones.cf_name().to_string(),
            payload,
            enqueued_at: Utc::now(),
            status: MutationStatus::Pending,
            retry_count: 0,
            last_error: None,
        };
        self.store.put(&item)
    }

    fn next_seq_id(&self) -> CoreResult<String> {
        let next = self
            .store
            .meta_get(meta_keys::MUTATION_SEQ)?
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;
        self.store.meta_put(meta_keys::MUTATION_SEQ, &next.to_string())?;
        Ok(format!("{:0width$}", next, width = SEQ_WIDTH))
    }
}

fn payload_code(payload: &JsonValue) -> Option<&str> {
    payload.get("code").and_then(JsonValue::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_ids_sort_in_enqueue_order() {
        let a = format!("{:0width$}", 9u64, width = SEQ_WIDTH);
        let b = format!("{:0width$}", 10u64, width = SEQ_WIDTH);
        let c = format!("{:0width$}", 100u64, width = SEQ_WIDTH);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn test_payload_code_extraction() {
        let v = serde_json::json!({ "code": "1100-001", "name": "x" });
        assert_eq!(payload_code(&v), Some("1100-001"));
        assert_eq!(payload_code(&serde_json::json!({})), None);
    }
}
