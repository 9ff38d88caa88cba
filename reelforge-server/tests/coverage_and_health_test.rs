mod common;

use common::{build_test_app, touch};

#[tokio::test]
async fn healthz_reports_ok() {
    let app = build_test_app();
    let resp = app.server.get("/healthz").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn coverage_reports_missing_and_total_per_kind() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/Predator.mp4"));
    touch(&root.join("Movies/Predator.thumbnail.jpg"));

    let resp = app.server.get("/api/tasks/coverage").add_query_param("path", "Movies").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let thumbnail = &body["data"]["kinds"]["thumbnail"];
    assert_eq!(thumbnail["total"], 2);
    assert_eq!(thumbnail["processed"], 1);
    assert_eq!(thumbnail["missing"], 1);
}

#[tokio::test]
async fn coverage_is_monotonic_after_repairing_an_orphan() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/alien.thumbnail.jpg"));

    let before = app.server.get("/api/tasks/coverage").add_query_param("path", "Movies").await;
    let before_body: serde_json::Value = before.json();
    assert_eq!(before_body["data"]["kinds"]["thumbnail"]["missing"], 1);

    let cleanup_resp = app
        .server
        .post("/api/artifacts/cleanup")
        .add_query_param("reassociate", "true")
        .json(&serde_json::json!({"path": "Movies"}))
        .await;
    cleanup_resp.assert_status_ok();

    let after = app.server.get("/api/tasks/coverage").add_query_param("path", "Movies").await;
    let after_body: serde_json::Value = after.json();
    assert_eq!(after_body["data"]["kinds"]["thumbnail"]["missing"], 0);
    assert_eq!(after_body["data"]["kinds"]["thumbnail"]["processed"], 1);
}

#[tokio::test]
async fn tools_endpoint_lists_every_artifact_kind() {
    let app = build_test_app();
    let resp = app.server.get("/api/tasks/tools").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    let tools = body["data"].as_array().unwrap();
    assert_eq!(tools.len(), 10);
}

#[tokio::test]
async fn library_listing_paginates_and_filters_by_search() {
    let app = build_test_app();
    let root = app.state.resolver.root().to_path_buf();

    touch(&root.join("Movies/Alien.mp4"));
    touch(&root.join("Movies/Predator.mp4"));

    let resp = app
        .server
        .get("/api/library")
        .add_query_param("path", "Movies")
        .add_query_param("search", "alien")
        .await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["entries"][0]["stem"], "Alien");
}
