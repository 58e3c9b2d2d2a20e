use std::{
    fs, io,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const HOME_ENV: &str = "TRIDIRT_HOME";
pub const PYTHON_ENV: &str = "TRIDIRT_PYTHON";
pub const ASSUME_YES_ENV: &str = "TRIDIRT_ASSUME_YES";
pub const OFFLINE_ENV: &str = "TRIDIRT_OFFLINE";
pub const REGISTRY_ENV: &str = "TRIDIRT_REGISTRY";
pub const LOG_ENV: &str = "TRIDIRT_LOG";

pub const DEFAULT_INSTALL_DIR: &str = "~/.trid";
const DEFAULT_LOG_FILTER: &str = "warn";

pub fn env_var(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub fn env_flag(key: &str) -> bool {
    std::env::var(key)
        .map(|value| parse_flag(&value))
        .unwrap_or(false)
}

pub fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
}

/// Per-user directory that holds the managed tools and their state files.
/// `None` when `~` cannot be resolved and no user name is known either.
pub fn install_dir() -> Option<PathBuf> {
    let configured = env_var(HOME_ENV, DEFAULT_INSTALL_DIR);
    resolve_install_dir(configured.trim(), home_dir(), user_name())
}

/// Expands `configured` against `home`. Without a home directory a `~` path
/// falls back to a per-user directory under the system temp dir.
pub fn resolve_install_dir(
    configured: &str,
    home: Option<PathBuf>,
    user: Option<String>,
) -> Option<PathBuf> {
    let expanded = expand_with_home(configured, home);
    if !expanded.starts_with("~") {
        return Some(expanded);
    }
    let user = user?;
    tracing::warn!(
        "No home directory; using a temporary install directory for {}",
        user
    );
    Some(std::env::temp_dir().join(format!("tridirt-{user}")))
}

pub fn user_name() -> Option<String> {
    ["USER", "USERNAME", "LOGNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .map(|name| name.trim().to_string())
        .find(|name| !name.is_empty() && !name.contains(['/', '\\']))
}

pub fn expand_user(path: &str) -> PathBuf {
    expand_with_home(path, home_dir())
}

fn expand_with_home(path: &str, home: Option<PathBuf>) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = home {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

pub fn default_python() -> &'static str {
    if cfg!(windows) {
        "python"
    } else {
        "python3"
    }
}

/// Replaces `path` with `data` through a sibling temp file, so readers see
/// either the old contents or the new ones.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_sibling(path);
    let result = fs::write(&tmp, data).and_then(|()| fs::rename(&tmp, path));
    if result.is_err() {
        if let Err(err) = fs::remove_file(&tmp) {
            if err.kind() != io::ErrorKind::NotFound {
                tracing::debug!("Failed to remove {}: {}", tmp.display(), err);
            }
        }
    }
    result
}

pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "state".into());
    path.with_file_name(format!(".{name}.tmp-{}", Uuid::new_v4()))
}

pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("1"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" yes "));
        assert!(parse_flag("on"));
        assert!(!parse_flag("0"));
        assert!(!parse_flag("no"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn test_expand_user_leaves_plain_paths() {
        assert_eq!(expand_user("/opt/trid"), PathBuf::from("/opt/trid"));
        assert_eq!(expand_user("relative/dir"), PathBuf::from("relative/dir"));
    }

    #[test]
    fn test_expand_user_home_prefix() {
        if let Some(home) = home_dir() {
            assert_eq!(expand_user("~/.trid"), home.join(".trid"));
            assert_eq!(expand_user("~"), home);
        }
    }

    #[test]
    fn test_install_dir_expands_home() {
        let dir = resolve_install_dir("~/.trid", Some(PathBuf::from("/home/ana")), None);
        assert_eq!(dir, Some(PathBuf::from("/home/ana/.trid")));

        let dir = resolve_install_dir("/opt/trid", None, None);
        assert_eq!(dir, Some(PathBuf::from("/opt/trid")));
    }

    #[test]
    fn test_install_dir_without_home_is_per_user() {
        let ana = resolve_install_dir("~/.trid", None, Some("ana".into())).unwrap();
        let bo = resolve_install_dir("~/.trid", None, Some("bo".into())).unwrap();
        assert_eq!(ana, std::env::temp_dir().join("tridirt-ana"));
        assert_ne!(ana, bo);
    }

    #[test]
    fn test_install_dir_without_home_or_user_is_unresolved() {
        assert_eq!(resolve_install_dir("~/.trid", None, None), None);
    }

    #[test]
    fn test_write_atomic_failure_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state");
        fs::create_dir(&path).unwrap();
        fs::write(path.join("occupied"), "x").unwrap();

        assert!(write_atomic(&path, b"data").is_err());
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_write_atomic_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state");

        write_atomic(&path, b"first").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"first");

        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"second");

        let leftovers: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_temp_sibling_stays_in_same_directory() {
        let path = Path::new("/var/lib/trid/TRID_LU");
        let tmp = temp_sibling(path);
        assert_eq!(tmp.parent(), path.parent());
        assert!(tmp
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(".TRID_LU.tmp-"));
    }
}
