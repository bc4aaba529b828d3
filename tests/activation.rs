#![cfg(unix)]

mod common;

use common::{free_port, script, wait_for, STDIO_ECHO};
use lsvisor::installer::InstalledArtifactInfo;
use lsvisor::types::MemorySink;
use lsvisor::{activate, Error, LaunchError, SessionState, SupervisorConfig, UpdateError, VersionStore};
use semver::Version;
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::write::SimpleFileOptions;

fn offline_config(install_dir: &Path) -> SupervisorConfig {
    let mut config = SupervisorConfig::default();
    config.install.dir = Some(install_dir.to_path_buf());
    config.server.api_base = format!("http://127.0.0.1:{}", free_port());
    config.java.required = false;
    config.launch.shutdown_grace_ms = 200;
    config
}

fn install_script(install_dir: &Path) {
    let bin = install_dir.join("server").join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    script(&bin, "kotlin-language-server", STDIO_ECHO);
}

fn seed_recent(install_dir: &Path, version: &str) {
    VersionStore::new(install_dir)
        .save(&InstalledArtifactInfo {
            version: Version::parse(version).unwrap(),
            last_update: chrono::Utc::now().timestamp_millis(),
        })
        .unwrap();
}

#[tokio::test]
async fn test_custom_path_skips_download() {
    let dir = tempfile::tempdir().unwrap();
    let exe = script(dir.path(), "my-server", STDIO_ECHO);
    let install_dir = dir.path().join("install");

    let mut config = offline_config(&install_dir);
    config.server.path = Some(exe);

    let status = MemorySink::new();
    let output = Arc::new(MemorySink::new());
    let session = activate(&config, &status, output.clone()).await.unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert!(status.contains("Activating Kotlin Language Server..."));
    assert!(!install_dir.exists());
    assert!(wait_for(&output, |lines| lines.iter().any(|l| l.starts_with("started "))).await);

    session.stop().await;
}

#[tokio::test]
async fn test_recent_install_launches_without_network() {
    let dir = tempfile::tempdir().unwrap();
    install_script(dir.path());
    seed_recent(dir.path(), "1.0.0");

    let config = offline_config(dir.path());
    let session = activate(&config, &MemorySink::new(), Arc::new(MemorySink::new()))
        .await
        .unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(
        session.config().executable,
        dir.path().join("server/bin/kotlin-language-server")
    );
    session.stop().await;
}

#[tokio::test]
async fn test_stale_install_survives_offline_index() {
    let dir = tempfile::tempdir().unwrap();
    install_script(dir.path());
    VersionStore::new(dir.path())
        .save(&InstalledArtifactInfo {
            version: Version::new(1, 0, 0),
            last_update: 0,
        })
        .unwrap();

    let config = offline_config(dir.path());
    let session = activate(&config, &MemorySink::new(), Arc::new(MemorySink::new()))
        .await
        .unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(VersionStore::new(dir.path()).load().version, Version::new(1, 0, 0));
    session.stop().await;
}

#[tokio::test]
async fn test_first_run_offline_is_an_update_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = offline_config(dir.path());

    let result = activate(&config, &MemorySink::new(), Arc::new(MemorySink::new())).await;

    assert!(matches!(result, Err(Error::Update(UpdateError::Network(_)))));
}

#[tokio::test]
async fn test_broken_install_is_a_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    seed_recent(dir.path(), "1.0.0");

    let config = offline_config(dir.path());
    let result = activate(&config, &MemorySink::new(), Arc::new(MemorySink::new())).await;

    assert!(matches!(result, Err(Error::Launch(LaunchError::Spawn { .. }))));
}

fn server_zip() -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().unix_permissions(0o755);
    writer
        .start_file("server/bin/kotlin-language-server", options)
        .unwrap();
    writer.write_all(STDIO_ECHO.as_bytes()).unwrap();
    writer.finish().unwrap().into_inner()
}

#[tokio::test]
async fn test_fresh_install_then_launch() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/fwcd/kotlin-language-server/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag_name": "1.3.0",
            "assets": [{
                "name": "server.zip",
                "browser_download_url": format!("{}/download/server.zip", server.uri())
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/download/server.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(server_zip()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let mut config = offline_config(dir.path());
    config.server.api_base = server.uri();

    let status = MemorySink::new();
    let session = activate(&config, &status, Arc::new(MemorySink::new()))
        .await
        .unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert!(status.contains("Downloading Kotlin Language Server 1.3.0 :: 100%"));

    let record = VersionStore::new(dir.path()).read().unwrap();
    assert_eq!(record.version, Version::new(1, 3, 0));

    session.stop().await;
}

#[tokio::test]
async fn test_failed_update_falls_back_to_installed_version() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/repos/fwcd/kotlin-language-server/releases/latest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "tag_name": "1.3.0",
            "assets": [{
                "name": "something-else.zip",
                "browser_download_url": format!("{}/download/other.zip", server.uri())
            }]
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    install_script(dir.path());
    VersionStore::new(dir.path())
        .save(&InstalledArtifactInfo {
            version: Version::new(1, 2, 0),
            last_update: 0,
        })
        .unwrap();

    let mut config = offline_config(dir.path());
    config.server.api_base = server.uri();

    let status = MemorySink::new();
    let session = activate(&config, &status, Arc::new(MemorySink::new()))
        .await
        .unwrap();

    assert_eq!(session.state(), SessionState::Running);
    assert!(status.contains("using 1.2.0"));
    assert_eq!(VersionStore::new(dir.path()).load().version, Version::new(1, 2, 0));

    session.stop().await;
}
