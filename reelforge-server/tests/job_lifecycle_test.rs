mod common;

use common::{build_test_app, touch};
use serde_json::json;

#[tokio::test]
async fn batch_submit_enqueues_missing_thumbnails() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/Predator.mp4"));
    touch(&root.join("Movies/Predator.thumbnail.jpg"));

    let resp = app
        .server
        .post("/api/tasks/batch")
        .json(&json!({
            "path": "Movies",
            "recursive": true,
            "kinds": {"type": "specific", "kinds": ["thumbnail"]},
            "mode": "missing",
            "scope": {"type": "all"},
        }))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    // Only Alien.mp4 is missing a thumbnail; Predator already has one.
    assert_eq!(body["data"]["fileCount"], 1);
    assert_eq!(body["data"]["enqueued"].as_array().unwrap().len(), 1);

    let jobs_resp = app.server.get("/api/tasks/jobs").await;
    let jobs_body: serde_json::Value = jobs_resp.json();
    assert_eq!(jobs_body["data"]["jobs"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn resubmitting_the_same_batch_skips_existing_claims() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();
    touch(&root.join("Movies/Alien.mp4"));

    let req = json!({
        "path": "Movies",
        "recursive": true,
        "kinds": {"type": "specific", "kinds": ["thumbnail"]},
        "mode": "missing",
        "scope": {"type": "all"},
    });

    let first = app.server.post("/api/tasks/batch").json(&req).await;
    first.assert_status_ok();
    let first_body: serde_json::Value = first.json();
    assert_eq!(first_body["data"]["enqueued"].as_array().unwrap().len(), 1);

    let second = app.server.post("/api/tasks/batch").json(&req).await;
    second.assert_status_ok();
    let second_body: serde_json::Value = second.json();
    assert_eq!(second_body["data"]["enqueued"].as_array().unwrap().len(), 0);
    assert_eq!(second_body["data"]["skippedExistingClaim"], 1);
}

#[tokio::test]
async fn pausing_the_scheduler_marks_queued_jobs_paused() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();
    touch(&root.join("Movies/Alien.mp4"));

    let pause_resp = app.server.post("/api/tasks/pause").add_query_param("paused", "true").await;
    pause_resp.assert_status_ok();
    let pause_body: serde_json::Value = pause_resp.json();
    assert_eq!(pause_body["data"]["paused"], true);

    let batch_resp = app
        .server
        .post("/api/tasks/batch")
        .json(&json!({
            "path": "Movies",
            "kinds": {"type": "specific", "kinds": ["thumbnail"]},
            "mode": "missing",
            "scope": {"type": "all"},
        }))
        .await;
    batch_resp.assert_status_ok();

    let jobs_resp = app.server.get("/api/tasks/jobs").await;
    let jobs_body: serde_json::Value = jobs_resp.json();
    let jobs = jobs_body["data"]["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["state"], "queued");
    assert_eq!(jobs[0]["paused"], true);
}

#[tokio::test]
async fn cancel_queued_removes_pending_jobs_without_touching_active_ones() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();
    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/Predator.mp4"));

    app.state.scheduler.pause();
    let batch_resp = app
        .server
        .post("/api/tasks/batch")
        .json(&json!({
            "path": "Movies",
            "kinds": {"type": "specific", "kinds": ["thumbnail"]},
            "mode": "missing",
            "scope": {"type": "all"},
        }))
        .await;
    batch_resp.assert_status_ok();

    let cancel_resp = app.server.post("/api/tasks/jobs/cancel-queued").await;
    cancel_resp.assert_status_ok();
    let cancel_body: serde_json::Value = cancel_resp.json();
    assert_eq!(cancel_body["data"]["canceled"].as_array().unwrap().len(), 2);

    let jobs_resp = app.server.get("/api/tasks/jobs").await;
    let jobs_body: serde_json::Value = jobs_resp.json();
    let jobs = jobs_body["data"]["jobs"].as_array().unwrap();
    assert!(jobs.iter().all(|j| j["state"] == "canceled"));
}

#[tokio::test]
async fn concurrency_endpoint_rejects_out_of_range_values() {
    let app = build_test_app();

    let resp = app.server.post("/api/tasks/concurrency").add_query_param("value", "0").await;
    resp.assert_status_bad_request();
}

#[tokio::test]
async fn concurrency_endpoint_applies_valid_values() {
    let app = build_test_app();

    let resp = app.server.post("/api/tasks/concurrency").add_query_param("value", "8").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["global_max_concurrency"], 8);
}
