//! Persisted login profile.
//!
//! The logged-in principal and API token survive restarts as a small JSON
//! file under the platform config directory. Hydrate at startup, clear on
//! logout; the profile is passed into the client by the caller, never read
//! through a global.

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::info;

use tutoria_shared::Principal;

use crate::error::{ChatError, Result};

const PROFILE_FILE: &str = "profile.json";

/// The persisted login state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub principal: Principal,
    pub token: String,
}

/// Filesystem store for the profile.
pub struct ProfileStore {
    dir: PathBuf,
}

impl ProfileStore {
    /// Store under the platform config directory:
    /// - Linux: `~/.config/tutoria/profile.json`
    /// - macOS: `~/Library/Application Support/com.tutoria.tutoria/profile.json`
    /// - Windows: `{FOLDERID_RoamingAppData}\tutoria\tutoria\config\profile.json`
    pub fn open() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "tutoria", "tutoria")
            .ok_or_else(|| ChatError::Profile("cannot determine config directory".to_string()))?;
        Ok(Self::at(dirs.config_dir()))
    }

    /// Store rooted at an explicit directory.
    pub fn at(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(PROFILE_FILE)
    }

    /// Load the persisted profile; `None` when nobody is logged in.
    pub fn load(&self) -> Result<Option<Profile>> {
        let path = self.path();
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(&path)?;
        let profile = serde_json::from_str(&json)
            .map_err(|e| ChatError::Profile(format!("corrupt profile: {e}")))?;
        Ok(Some(profile))
    }

    /// Persist the profile, replacing any previous one.
    pub fn save(&self, profile: &Profile) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let json = serde_json::to_string_pretty(profile)
            .map_err(|e| ChatError::Profile(format!("serialize profile: {e}")))?;
        fs::write(self.path(), json)?;
        info!(user = %profile.principal.id, "Profile saved");
        Ok(())
    }

    /// Forget the persisted profile. A missing file is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutoria_shared::Role;

    fn profile() -> Profile {
        Profile {
            principal: Principal {
                id: "u-1".into(),
                name: "Ada".to_string(),
                role: Role::Student,
            },
            token: "tok-123".to_string(),
        }
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path());

        store.save(&profile()).unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded, Some(profile()));
    }

    #[test]
    fn test_load_without_profile_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path());
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn test_clear_removes_profile_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path());

        store.save(&profile()).unwrap();
        store.clear().unwrap();
        assert_eq!(store.load().unwrap(), None);
        store.clear().unwrap();
    }

    #[test]
    fn test_corrupt_profile_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = ProfileStore::at(dir.path());

        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join(PROFILE_FILE), "not json").unwrap();

        match store.load() {
            Err(ChatError::Profile(_)) => {}
            other => panic!("expected profile error, got {other:?}"),
        }
    }
}
