//! Durable, origin-scoped key-value mirror of the shared cache.
//!
//! The mirror only exists to make restarts feel fast. It is never
//! authoritative: hydration reads it, every successful network fetch
//! overwrites it, and any unreadable entry is treated as absent.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::debug;

/// Mirror key for the current credential.
pub const CREDENTIAL_KEY: &str = "credential";

/// Mirror key for the dashboard numeric snapshot.
pub const DASHBOARD_KEY: &str = "dashboard_stats";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mirrored<T> {
    pub data: T,
    pub saved_at: DateTime<Utc>,
}

impl<T> Mirrored<T> {
    pub fn new(data: T) -> Self {
        Self {
            data,
            saved_at: Utc::now(),
        }
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.saved_at).num_minutes().max(0)
    }
}

#[derive(Debug, Clone)]
pub struct Mirror {
    dir: PathBuf,
}

impl Mirror {
    pub fn new(dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create mirror directory: {}", dir.display()))?;
        Ok(Self { dir })
    }

    /// A mirror under `base` that is private to one backend origin, so
    /// switching backends never hydrates another backend's records.
    pub fn for_origin(base: &Path, origin: &str) -> Result<Self> {
        Self::new(base.join(origin_dir_name(origin)))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }

    pub fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<Mirrored<T>>> {
        let path = self.entry_path(key);
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read mirror entry: {}", key))?;

        let mirrored: Mirrored<T> = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse mirror entry: {}", key))?;

        Ok(Some(mirrored))
    }

    /// Best-effort load: absent and corrupt entries both come back as `None`.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.load(key) {
            Ok(Some(mirrored)) => Some(mirrored.data),
            Ok(None) => None,
            Err(e) => {
                debug!(key, error = %e, "Ignoring unreadable mirror entry");
                None
            }
        }
    }

    pub fn save<T: Serialize>(&self, key: &str, data: &T) -> Result<()> {
        let mirrored = Mirrored::new(data);
        let contents = serde_json::to_string(&mirrored)?;

        // Write-then-rename so a crash mid-write leaves the old entry intact
        let path = self.entry_path(key);
        let tmp = self.dir.join(format!("{}.json.tmp", key));
        std::fs::write(&tmp, contents)
            .with_context(|| format!("Failed to write mirror entry: {}", key))?;
        std::fs::rename(&tmp, &path)
            .with_context(|| format!("Failed to replace mirror entry: {}", key))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let path = self.entry_path(key);
        if path.exists() {
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to remove mirror entry: {}", key))?;
        }
        Ok(())
    }
}

/// Turn an origin like `https://api.example.com/api` into a directory name.
fn origin_dir_name(origin: &str) -> String {
    let trimmed = origin
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/');
    let name: String = trimmed
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect();
    if name.is_empty() {
        "default".to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_save_then_read() {
        let temp_dir = TempDir::new().unwrap();
        let mirror = Mirror::new(temp_dir.path().to_path_buf()).unwrap();

        mirror.save("visits", &vec![serde_json::json!({"id": 1})]).unwrap();
        let visits: Vec<serde_json::Value> = mirror.read("visits").unwrap();
        assert_eq!(visits.len(), 1);
        assert!(!mirror.entry_path("visits.json.tmp").exists());
    }

    #[test]
    fn test_corrupt_entry_reads_as_absent() {
        let temp_dir = TempDir::new().unwrap();
        let mirror = Mirror::new(temp_dir.path().to_path_buf()).unwrap();
        std::fs::write(mirror.entry_path("patients"), "{not json").unwrap();

        assert!(mirror.load::<Vec<serde_json::Value>>("patients").is_err());
        assert!(mirror.read::<Vec<serde_json::Value>>("patients").is_none());
    }

    #[test]
    fn test_remove_missing_entry_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let mirror = Mirror::new(temp_dir.path().to_path_buf()).unwrap();
        mirror.remove("sales").unwrap();

        mirror.save("sales", &Vec::<u8>::new()).unwrap();
        mirror.remove("sales").unwrap();
        assert!(mirror.read::<Vec<u8>>("sales").is_none());
    }

    #[test]
    fn test_origins_get_separate_directories() {
        let temp_dir = TempDir::new().unwrap();
        let a = Mirror::for_origin(temp_dir.path(), "https://a.example.com/api").unwrap();
        let b = Mirror::for_origin(temp_dir.path(), "http://127.0.0.1:5173/api").unwrap();
        assert_ne!(a.dir(), b.dir());
        assert!(a.dir().ends_with("a.example.com_api"));
    }

    #[test]
    fn test_mirrored_age_just_saved() {
        let mirrored = Mirrored::new(1);
        assert_eq!(mirrored.age_minutes(), 0);
    }
}
