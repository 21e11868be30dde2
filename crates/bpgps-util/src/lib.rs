use std::{
    fs, io,
    path::{Path, PathBuf},
};

use serde::Serialize;
use tracing::debug;

pub const DATA_DIR_ENV: &str = "BPGPS_DATA_DIR";

/// The trimmed value of `key`, or `default` when it is unset or blank.
pub fn env_or(key: &str, default: &str) -> String {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => value.trim().to_string(),
        _ => default.to_string(),
    }
}

pub fn env_flag(key: &str) -> Option<bool> {
    let value = std::env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok()?.trim().parse().ok()
}

pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.trim().is_empty() {
            return expand_user(dir.trim());
        }
    }
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".local/share/bpgps")
    } else {
        PathBuf::from("/tmp/bpgps")
    }
}

pub fn state_dir() -> PathBuf {
    data_dir().join("state")
}

pub fn expand_user(path: &str) -> PathBuf {
    if path == "~" || path.starts_with("~/") {
        if let Ok(home) = std::env::var("HOME") {
            let rest = path.strip_prefix("~/").unwrap_or("");
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}

/// Writes `value` as pretty JSON next to `path` and renames it into place, so
/// readers never observe a half-written file.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    debug!("wrote {}", path.display());
    Ok(())
}

/// Reads a file that may legitimately not exist yet. `Ok(None)` means missing.
pub fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

pub fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, serde::Deserialize, PartialEq, Debug)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn atomic_write_creates_parent_and_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/state/sample.json");
        let value = Sample {
            name: "unit".into(),
            count: 3,
        };

        write_json_atomic(&path, &value).unwrap();

        let data = fs::read_to_string(&path).unwrap();
        let back: Sample = serde_json::from_str(&data).unwrap();
        assert_eq!(back, value);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn read_optional_reports_missing_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(read_optional(&dir.path().join("absent.json")).unwrap(), None);

        let path = dir.path().join("present.json");
        fs::write(&path, "[]").unwrap();
        assert_eq!(read_optional(&path).unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn env_or_trims_and_falls_back_on_blank() {
        let key = "BPGPS_UTIL_TEST_ENV_OR";
        std::env::remove_var(key);
        assert_eq!(env_or(key, "fallback"), "fallback");
        std::env::set_var(key, "   ");
        assert_eq!(env_or(key, "fallback"), "fallback");
        std::env::set_var(key, "  value ");
        assert_eq!(env_or(key, "fallback"), "value");
        std::env::remove_var(key);
    }

    #[test]
    fn expand_user_leaves_plain_paths_alone() {
        assert_eq!(expand_user("/var/lib/bpgps"), PathBuf::from("/var/lib/bpgps"));
        assert_eq!(expand_user("relative/dir"), PathBuf::from("relative/dir"));
    }
}
