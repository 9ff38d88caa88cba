mod common;

use common::{build_test_app, touch};
use serde_json::json;

#[tokio::test]
async fn status_reports_present_and_absent_kinds() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/Alien.thumbnail.jpg"));

    let resp = app.server.get("/api/artifacts/status").add_query_param("path", "Movies/Alien.mp4").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["thumbnail"], true);
    assert_eq!(body["data"]["preview"], false);
}

#[tokio::test]
async fn status_404s_on_missing_file() {
    let app = build_test_app();

    let resp = app.server.get("/api/artifacts/status").add_query_param("path", "nope.mp4").await;
    resp.assert_status_not_found();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn orphans_finds_sidecar_with_no_matching_media() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/Alien_old_cut.thumbnail.jpg"));

    let resp = app.server.get("/api/artifacts/orphans").add_query_param("path", "Movies").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let orphans = body["data"].as_array().unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0]["kind"], "thumbnail");
}

#[tokio::test]
async fn repair_preview_suggests_the_closest_stem() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/alien.thumbnail.jpg"));

    let resp = app
        .server
        .post("/api/artifacts/repair-preview")
        .json(&json!({"path": "Movies", "confidence_floor": 0.5}))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let suggestions = body["data"].as_array().unwrap();
    assert_eq!(suggestions.len(), 1);
    assert!(suggestions[0]["confidence"].as_f64().unwrap() >= 0.9);
}

#[tokio::test]
async fn cleanup_dry_run_reports_without_moving_files() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    let orphan = root.join("Movies/alien.thumbnail.jpg");
    touch(&orphan);

    let resp = app
        .server
        .post("/api/artifacts/cleanup")
        .add_query_param("dry_run", "true")
        .add_query_param("reassociate", "true")
        .json(&json!({"path": "Movies"}))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["dry_run"], true);
    assert_eq!(body["data"]["reassociated"], 0);
    assert!(orphan.exists(), "dry run must not touch the filesystem");
}

#[tokio::test]
async fn cleanup_reassociates_when_not_dry_run() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    let orphan = root.join("Movies/alien.thumbnail.jpg");
    touch(&orphan);

    let resp = app
        .server
        .post("/api/artifacts/cleanup")
        .add_query_param("reassociate", "true")
        .json(&json!({"path": "Movies"}))
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["reassociated"], 1);
    assert!(!orphan.exists());
    assert!(root.join("Movies/Alien.thumbnail.jpg").exists());
}
