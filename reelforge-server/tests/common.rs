//! Shared test app builder: a real `AppState` wired against a throwaway
//! media root, exercised through the router directly rather than a spawned
//! process.

use std::path::Path;

use axum_test::TestServer;
use reelforge_server::config::ServerConfig;
use reelforge_server::state::AppState;
use reelforge_server::routes::build_router;
use tempfile::TempDir;

pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    // Keeps the directory alive for the lifetime of the test.
    pub _media_root: TempDir,
    pub _state_dir: TempDir,
}

pub fn touch(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, b"fake media bytes").unwrap();
}

pub fn build_test_app() -> TestApp {
    let media_root = TempDir::new().unwrap();
    let state_dir = TempDir::new().unwrap();

    let config = ServerConfig {
        media_root: media_root.path().to_path_buf(),
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        state_dir: state_dir.path().to_path_buf(),
        job_store_horizon: chrono::Duration::days(7),
        runtime: Default::default(),
    };

    let state = AppState::bootstrap(config).expect("bootstrap test app state");
    let app = build_router(state.clone());
    let server = TestServer::new(app).expect("build test server");

    TestApp { server, state, _media_root: media_root, _state_dir: state_dir }
}
