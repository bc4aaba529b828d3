//! Java runtime discovery for JVM-based servers
//!
//! Search order: configured java home(s), then `$JAVA_HOME`, then `PATH`.

use crate::server::platform::correct_binname;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JavaInstall {
    pub executable: PathBuf,
    /// The java home the executable was found in, if it came from one
    pub home: Option<PathBuf>,
}

pub fn find_java(configured_home: Option<&str>) -> Option<JavaInstall> {
    let binname = correct_binname("java");

    if let Some(home) = configured_home.filter(|h| !h.is_empty()) {
        debug!("Looking for Java in java.home (settings): {}", home);
        if let Some(found) = find_in_java_home(home, &binname) {
            return Some(found);
        }
    }

    if let Ok(env_home) = std::env::var("JAVA_HOME") {
        if !env_home.is_empty() {
            debug!("Looking for Java in JAVA_HOME (environment variable): {}", env_home);
            if let Some(found) = find_in_java_home(&env_home, &binname) {
                return Some(found);
            }
        }
    }

    debug!("Looking for Java in PATH");
    which::which(&binname).ok().map(|executable| JavaInstall {
        executable,
        home: None,
    })
}

/// `java_home` may list several homes separated by the path separator
pub fn find_in_java_home(java_home: &str, binname: &str) -> Option<JavaInstall> {
    std::env::split_paths(java_home).find_map(|home| candidate(&home, binname))
}

fn candidate(home: &Path, binname: &str) -> Option<JavaInstall> {
    let executable = home.join("bin").join(binname);
    executable.is_file().then(|| JavaInstall {
        executable,
        home: Some(home.to_path_buf()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_home(root: &Path, name: &str) -> PathBuf {
        let home = root.join(name);
        std::fs::create_dir_all(home.join("bin")).unwrap();
        std::fs::write(home.join("bin").join(correct_binname("java")), "").unwrap();
        home
    }

    #[test]
    fn test_finds_java_in_home() {
        let dir = tempfile::tempdir().unwrap();
        let home = fake_home(dir.path(), "jdk-17");

        let found = find_in_java_home(home.to_str().unwrap(), &correct_binname("java")).unwrap();
        assert_eq!(found.home.as_deref(), Some(home.as_path()));
        assert!(found.executable.ends_with(Path::new("bin").join(correct_binname("java"))));
    }

    #[test]
    fn test_searches_every_listed_home() {
        let dir = tempfile::tempdir().unwrap();
        let empty = dir.path().join("empty");
        std::fs::create_dir_all(&empty).unwrap();
        let home = fake_home(dir.path(), "jdk-21");

        let joined = std::env::join_paths([&empty, &home]).unwrap();
        let found = find_in_java_home(joined.to_str().unwrap(), &correct_binname("java")).unwrap();
        assert_eq!(found.home, Some(home));
    }

    #[test]
    fn test_configured_home_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let home = fake_home(dir.path(), "configured");

        let found = find_java(home.to_str()).unwrap();
        assert_eq!(found.home, Some(home));
    }

    #[test]
    fn test_home_without_java_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_in_java_home(dir.path().to_str().unwrap(), "java").is_none());
    }
}
