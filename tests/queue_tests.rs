//! Mutation queue tests
//!
//! Covers:
//! - Offline creates visible immediately under temporary ids
//! - Strict enqueue-order replay on reconnect
//! - Temporary-id adoption of the server-assigned code
//! - Retry ceiling and permanent rejections
//! - Deleting a never-synced local zone cancelling its queued create

mod common;

use std::sync::Arc;

use common::{directory_with, freetown_zones, zone, MockRemote};
use zonepost::model::LOCAL_ID_PREFIX;

fn draft_zone(name: &str) -> zonepost::Zone {
    let mut z = zone("", name, "Western Area Urban", 8.4601, -13.2401);
    z.code = String::new();
    z
}

#[tokio::test]
async fn test_offline_create_is_immediately_searchable() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    let created = directory
        .create_zone_offline(draft_zone("Kissy Market Segment"))
        .unwrap();
    assert!(created.code.starts_with(LOCAL_ID_PREFIX));
    assert_eq!(directory.pending_mutations().unwrap(), 1);

    // Visible through local search right away
    let results = directory.search("Kissy Market", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].code, created.code);
}

#[tokio::test]
async fn test_reconnect_drains_and_adopts_server_code() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    let created = directory
        .create_zone_offline(draft_zone("Kissy Market Segment"))
        .unwrap();
    let temp_code = created.code.clone();

    directory.set_online(true).await;

    assert_eq!(directory.pending_mutations().unwrap(), 0);
    assert!(directory.zone(&temp_code).unwrap().is_none());

    let adopted = directory.zone("9000-001").unwrap().unwrap();
    assert_eq!(adopted.name, "Kissy Market Segment");
    assert!(remote.remote_zones().iter().any(|z| z.code == "9000-001"));
}

#[tokio::test]
async fn test_drain_preserves_enqueue_order() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    directory.create_zone_offline(draft_zone("First Segment")).unwrap();
    directory.create_zone_offline(draft_zone("Second Segment")).unwrap();
    directory.create_zone_offline(draft_zone("Third Segment")).unwrap();

    directory.set_online(true).await;

    // Server codes are assigned sequentially, so order of arrival is
    // observable through them
    let first = directory.zone("9000-001").unwrap().unwrap();
    let second = directory.zone("9000-002").unwrap().unwrap();
    let third = directory.zone("9000-003").unwrap().unwrap();
    assert_eq!(first.name, "First Segment");
    assert_eq!(second.name, "Second Segment");
    assert_eq!(third.name, "Third Segment");
}

#[tokio::test]
async fn test_queued_update_follows_adopted_code() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    let mut created = directory
        .create_zone_offline(draft_zone("Kissy Market Segment"))
        .unwrap();
    created.name = "Kissy Market Segment East".to_string();
    directory.update_zone_offline(created).unwrap();
    assert_eq!(directory.pending_mutations().unwrap(), 2);

    directory.set_online(true).await;

    assert_eq!(directory.pending_mutations().unwrap(), 0);
    assert_eq!(remote.calls("update_zone"), 1);
    let remote_copy = remote
        .remote_zones()
        .into_iter()
        .find(|z| z.code == "9000-001")
        .unwrap();
    assert_eq!(remote_copy.name, "Kissy Market Segment East");
}

#[tokio::test]
async fn test_transient_failures_hit_retry_ceiling() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;
    directory.create_zone_offline(draft_zone("Flaky Segment")).unwrap();

    remote.fail_times("create_zone", 10, 503);
    directory.set_online(true).await;

    // One attempt per drain pass; reconnect made the first, two more
    // passes exhaust the ceiling of three
    directory.drain_queue().await.unwrap();
    directory.drain_queue().await.unwrap();
    assert_eq!(remote.calls("create_zone"), 3);

    let report = directory.drain_queue().await.unwrap();
    assert_eq!(remote.calls("create_zone"), 3);
    assert_eq!(report.replayed, 0);
    assert_eq!(report.abandoned, 1);
    assert_eq!(report.remaining, 0);
}

#[tokio::test]
async fn test_permanent_rejection_abandons_immediately() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;
    directory.create_zone_offline(draft_zone("Rejected Segment")).unwrap();

    remote.fail_times("create_zone", 1, 422);
    directory.set_online(true).await;

    assert_eq!(remote.calls("create_zone"), 1);
    assert_eq!(directory.pending_mutations().unwrap(), 0);

    // Re-draining does not retry a permanently rejected item
    let report = directory.drain_queue().await.unwrap();
    assert_eq!(report.abandoned, 1);
    assert_eq!(remote.calls("create_zone"), 1);
}

#[tokio::test]
async fn test_deleting_local_zone_cancels_its_queue_entries() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    let created = directory
        .create_zone_offline(draft_zone("Ephemeral Segment"))
        .unwrap();
    directory.delete_zone_offline(&created.code).unwrap();

    assert_eq!(directory.pending_mutations().unwrap(), 0);
    assert!(directory.zone(&created.code).unwrap().is_none());

    directory.set_online(true).await;
    assert_eq!(remote.calls("create_zone"), 0);
    assert_eq!(remote.calls("delete_zone"), 0);
}

#[tokio::test]
async fn test_delete_of_synced_zone_reaches_the_remote() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    directory.delete_zone_offline("2300-001").unwrap();
    assert!(directory.zone("2300-001").unwrap().is_none());

    directory.set_online(true).await;
    assert_eq!(remote.calls("delete_zone"), 1);
    assert!(!remote.remote_zones().iter().any(|z| z.code == "2300-001"));
}

#[tokio::test]
async fn test_drain_while_offline_is_rejected() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(remote, false);

    assert!(directory.drain_queue().await.is_err());
}
