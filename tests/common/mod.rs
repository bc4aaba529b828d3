#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lsvisor::types::MemorySink;

/// Write an executable shell script
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Echo server over stdio that announces itself on stderr
pub const STDIO_ECHO: &str = "#!/bin/sh\necho \"started $$\" >&2\nexec cat\n";

/// Connects back to the given port with bash's /dev/tcp and echoes
pub const TCP_ECHO: &str = "#!/bin/bash\n\
echo \"args: $*\" >&2\n\
exec 3<>/dev/tcp/127.0.0.1/$2 || exit 7\n\
echo \"started $$\" >&2\n\
cat <&3 >&3\n";

pub fn has_bash() -> bool {
    Path::new("/bin/bash").exists()
}

/// Poll until `condition` holds or two seconds have passed
pub async fn wait_for(sink: &MemorySink, condition: impl Fn(&[String]) -> bool) -> bool {
    for _ in 0..100 {
        if condition(&sink.lines()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition(&sink.lines())
}

pub fn count_started(lines: &[String]) -> usize {
    lines.iter().filter(|l| l.starts_with("started ")).count()
}

/// A loopback port that was free a moment ago
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Poll `condition` for up to two seconds
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

/// Pid announced by the first `started <pid>` line
pub fn started_pid(lines: &[String]) -> Option<u32> {
    lines
        .iter()
        .find_map(|l| l.strip_prefix("started "))
        .and_then(|pid| pid.trim().parse().ok())
}

/// Whether `pid` is a live process; zombies count as gone
pub fn process_alive(pid: u32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Ok(stat) => stat
            .rsplit(')')
            .next()
            .is_some_and(|rest| !rest.trim_start().starts_with('Z')),
        Err(_) if Path::new("/proc/self").exists() => false,
        Err(_) => nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid as i32), None).is_ok(),
    }
}
