//! # Check Endpoint Tests
//!
//! Exercises `/check`, `/health` and `/metrics` through the router with a
//! scripted beacon node behind the real detection service.

use std::path::Path;
use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use checker_runtime::http::{check_router, metrics_router, AppState, CheckResponse};
use dg_detection::adapters::{InMemoryStateStore, MockBeaconNode};
use dg_detection::domain::start_slot;
use dg_detection::{AttesterDuty, DetectionConfig, DoppelgangerService, ValidatorStateStore};

const ROOT: &str = "0x77aa";

struct Harness {
    router: Router,
    beacon: Arc<MockBeaconNode>,
    store: Arc<InMemoryStateStore>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    write_list(dir.path(), "ops.txt", "0xa1,0xb2");
    write_list(dir.path(), "blank.txt", " , ");
    write_list(dir.path(), "canary.txt", "0xa1");

    let beacon = Arc::new(MockBeaconNode::new());
    beacon.add_validator("0xa1", 5);
    beacon.add_validator("0xb2", 6);
    let store = Arc::new(InMemoryStateStore::new());
    let service = DoppelgangerService::new(
        DetectionConfig::default(),
        Arc::clone(&beacon),
        Arc::clone(&store),
    );

    let router = check_router(AppState {
        api: Arc::new(service),
        validators_dir: dir.path().to_path_buf(),
    });
    Harness {
        router,
        beacon,
        store,
        _dir: dir,
    }
}

fn write_list(dir: &Path, name: &str, content: &str) {
    std::fs::write(dir.join(name), content).unwrap();
}

async fn get(router: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, body.to_vec())
}

async fn check(router: &Router, uri: &str) -> (StatusCode, CheckResponse) {
    let (status, body) = get(router, uri).await;
    (status, serde_json::from_slice(&body).unwrap())
}

fn silent_epoch(beacon: &MockBeaconNode, epoch: u64) {
    for index in [5u64, 6] {
        let duty = AttesterDuty {
            validator_index: index,
            slot: start_slot(epoch) + index,
            committee_index: 1,
            validator_committee_index: index,
            committee_length: 32,
        };
        beacon.set_block_root(duty.slot, ROOT);
        beacon.add_aggregate(duty.inclusion_slot(), 1, ROOT, 32, &[0, 1]);
        beacon.add_duty(epoch, duty);
    }
}

#[tokio::test]
async fn test_missing_filename_is_bad_request() {
    let h = harness();

    let (status, body) = check(&h.router, "/check").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!body.start);
    assert!(body.error.is_some());

    let (status, _) = check(&h.router, "/check?filename=").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_bad_lists_are_bad_requests() {
    let h = harness();
    h.beacon.set_head_slot(start_slot(10));

    for uri in [
        "/check?filename=missing.txt",
        "/check?filename=blank.txt",
        "/check?filename=..%2Fsecrets",
    ] {
        let (status, body) = check(&h.router, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert!(!body.start);
    }
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_check_lifecycle_over_http() {
    let h = harness();

    // first call opens the window
    h.beacon.set_head_slot(start_slot(10));
    let (status, body) = check(&h.router, "/check?filename=ops.txt").await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert!(!body.start);
    assert_eq!(body.inconclusive, Some(true));
    assert!(h.store.load(5).unwrap().unwrap().in_doppelganger);

    // safe epoch reached, keys silent throughout
    for epoch in 10..=12 {
        silent_epoch(&h.beacon, epoch);
    }
    h.beacon.set_head_slot(start_slot(12) + 20);
    let (status, body) = check(&h.router, "/check?filename=ops.txt").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        CheckResponse {
            start: true,
            error: None,
            inconclusive: None,
        }
    );
}

#[tokio::test]
async fn test_unreachable_beacon_is_service_unavailable() {
    let h = harness();
    h.beacon.set_head_unavailable(true);

    let (status, body) = check(&h.router, "/check?filename=ops.txt").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(!body.start);
    assert_eq!(body.inconclusive, None);
}

#[tokio::test]
async fn test_health() {
    let h = harness();
    let (status, body) = get(&h.router, "/health").await;
    assert_eq!(status, StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn test_metrics_exposes_group_gauge() {
    let h = harness();
    h.beacon.set_head_slot(start_slot(40));
    let (status, _) = check(&h.router, "/check?filename=canary.txt").await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, body) = get(&metrics_router(), "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("doppelganger_group_in_check{group=\"canary\"} 1"));
    assert!(text.contains("doppelganger_checks_total"));
}
