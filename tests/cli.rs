use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

fn write_config(dir: &Path, api_base: &str) -> std::path::PathBuf {
    let path = dir.join("lsvisor.toml");
    let install = dir.join("install");
    std::fs::write(
        &path,
        format!(
            "[server]\napi_base = \"{}\"\n\n[install]\ndir = {:?}\n",
            api_base,
            install.to_string_lossy()
        ),
    )
    .unwrap();
    path
}

fn unreachable_api() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    format!("http://127.0.0.1:{}", listener.local_addr().unwrap().port())
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("lsvisor")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("update"))
        .stdout(predicate::str::contains("info"))
        .stdout(predicate::str::contains("run"));
}

#[test]
fn test_info_reports_nothing_installed() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &unreachable_api());

    Command::cargo_bin("lsvisor")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Kotlin Language Server"))
        .stdout(predicate::str::contains("not installed"));
}

#[test]
fn test_update_offline_without_install_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &unreachable_api());

    Command::cargo_bin("lsvisor")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("update")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Could not update/download"));
}

#[test]
fn test_invalid_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("broken.toml");
    std::fs::write(&config, "[transport]\nkind = \"carrier-pigeon\"\n").unwrap();

    Command::cargo_bin("lsvisor")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

#[cfg(unix)]
#[test]
fn test_run_proxies_stdio_across_sighup_restart() {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    use std::io::{BufRead, BufReader, Write};
    use std::os::unix::fs::PermissionsExt;
    use std::process::Stdio;

    let dir = tempfile::tempdir().unwrap();
    let server = dir.path().join("echo-server");
    std::fs::write(&server, "#!/bin/sh\nexec cat\n").unwrap();
    std::fs::set_permissions(&server, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = dir.path().join("lsvisor.toml");
    std::fs::write(
        &config,
        format!(
            "[server]\npath = {:?}\n\n[java]\nrequired = false\n\n[launch]\nshutdown_grace_ms = 500\n",
            server.to_string_lossy()
        ),
    )
    .unwrap();

    let mut child = std::process::Command::new(assert_cmd::cargo::cargo_bin("lsvisor"))
        .arg("--config")
        .arg(&config)
        .arg("run")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    let mut stdout = BufReader::new(child.stdout.take().unwrap());

    let mut line = String::new();
    writeln!(stdin, "first").unwrap();
    stdin.flush().unwrap();
    stdout.read_line(&mut line).unwrap();
    assert_eq!(line, "first\n");

    kill(Pid::from_raw(child.id() as i32), Signal::SIGHUP).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(500));

    line.clear();
    writeln!(stdin, "second").unwrap();
    stdin.flush().unwrap();
    stdout.read_line(&mut line).unwrap();
    assert_eq!(line, "second\n");

    drop(stdin);
    assert!(child.wait().unwrap().success());
}
