//! Dual-mode search tests
//!
//! Covers:
//! - Online paths delegating to the remote endpoints
//! - Transparent fallback to the cache on remote failure
//! - Offline ranked text search over the cached zones
//! - Offline proximity search through the geohash index
//! - Cold-start behavior with nothing cached

mod common;

use std::sync::Arc;

use common::{directory_with, freetown_zones, test_config, MockRemote};
use zonepost::search::{Provenance, MAX_TEXT_SCORE};
use zonepost::{CoreError, OfflineDirectory};

#[tokio::test]
async fn test_online_text_search_uses_remote() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);

    let results = directory.search("Aberdeen", 10).await.unwrap();

    assert_eq!(remote.calls("search_text"), 1);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].code, "1200-001");
    assert_eq!(results[0].provenance, Provenance::Online);
}

#[tokio::test]
async fn test_remote_failure_falls_back_to_cache() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();

    remote.fail_times("search_text", 1, 503);
    let results = directory.search("Aberdeen", 10).await.unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].code, "1200-001");
    assert_eq!(results[0].provenance, Provenance::Offline);
}

#[tokio::test]
async fn test_offline_code_prefix_query_ranks_exact_district_first() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    let results = directory.search("1100", 10).await.unwrap();

    assert!(results.len() >= 2);
    assert_eq!(results[0].code, "1100-001");
    // Primary-code exact match plus code prefix: raw score at least 170
    assert!(results[0].relevance >= 170.0 / MAX_TEXT_SCORE as f64);

    // Non-increasing relevance
    for pair in results.windows(2) {
        assert!(pair[0].relevance >= pair[1].relevance);
    }
}

#[tokio::test]
async fn test_offline_name_search_matches_cached_zone() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    let results = directory.search("central freetown cbd", 10).await.unwrap();
    assert_eq!(results[0].code, "1100-001");
    assert_eq!(results[0].provenance, Provenance::Offline);
}

#[tokio::test]
async fn test_empty_query_returns_nothing() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(remote, true);

    assert!(directory.search("", 10).await.unwrap().is_empty());
    assert!(directory.search("   ", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cold_start_offline_returns_empty_not_error() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), false);

    let results = directory.search("Freetown", 10).await.unwrap();
    assert!(results.is_empty());
    assert_eq!(remote.calls("search_text"), 0);
}

#[tokio::test]
async fn test_online_nearby_uses_remote() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);

    let results = directory.search_nearby(8.4657, -13.2317, 2000.0).await.unwrap();

    assert_eq!(remote.calls("search_nearby"), 1);
    assert!(!results.is_empty());
    assert_eq!(results[0].provenance, Provenance::Online);
}

#[tokio::test]
async fn test_offline_nearby_filters_by_haversine_ascending() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(Arc::clone(&remote), true);
    directory.sync_if_needed().await.unwrap();
    directory.set_online(false).await;

    let results = directory.search_nearby(8.4657, -13.2317, 2000.0).await.unwrap();

    // CBD at the origin, Tower Hill ~600 m away; Aberdeen and Bo are
    // outside the radius
    let codes: Vec<&str> = results.iter().map(|r| r.code.as_str()).collect();
    assert_eq!(codes, vec!["1100-001", "1100-002"]);

    for result in &results {
        let d = result.distance_m.unwrap();
        assert!(d <= 2000.0);
        assert_eq!(result.provenance, Provenance::Offline);
    }
    for pair in results.windows(2) {
        assert!(pair[0].distance_m.unwrap() <= pair[1].distance_m.unwrap());
    }
}

#[tokio::test]
async fn test_remote_only_mode_when_store_cannot_open() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));

    // A plain file where the store directory should be makes the open fail
    let tmp = tempfile::TempDir::new().unwrap();
    let blocker = tmp.path().join("occupied");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let directory =
        OfflineDirectory::init_with_remote(&blocker, test_config(), remote, true).unwrap();
    assert!(directory.store().is_none());

    // Online search still serves from the remote
    let results = directory.search("Aberdeen", 10).await.unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provenance, Provenance::Online);

    // Store-backed surfaces report the degraded state instead of panicking
    assert!(matches!(
        directory.zone("1100-001"),
        Err(CoreError::StorageUnavailable(_))
    ));
    assert!(matches!(
        directory.pending_mutations(),
        Err(CoreError::StorageUnavailable(_))
    ));
    assert!(matches!(
        directory.sync_state(),
        Err(CoreError::StorageUnavailable(_))
    ));
}

#[tokio::test]
async fn test_nearby_rejects_invalid_input() {
    let remote = Arc::new(MockRemote::new(freetown_zones()));
    let (directory, _tmp) = directory_with(remote, true);

    assert!(directory.search_nearby(95.0, -13.2, 2000.0).await.unwrap().is_empty());
    assert!(directory.search_nearby(8.4, -13.2, -5.0).await.unwrap().is_empty());
}
