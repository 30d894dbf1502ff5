//! Refresh token persistence
//!
//! The saved login is a single file `<cache_dir>/login_data` holding the
//! refresh token on its first line. No file means no saved login.

use std::path::{Path, PathBuf};
use crate::Result;

const LOGIN_FILE: &str = "login_data";

#[derive(Debug, Clone)]
pub struct TokenStore {
    dir: PathBuf,
}

impl TokenStore {
    /// Use `dir` as the cache directory, creating it if absent
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Get the login file path
    pub fn path(&self) -> PathBuf {
        self.dir.join(LOGIN_FILE)
    }

    /// Load the saved refresh token, if any
    pub fn load(&self) -> Result<Option<String>> {
        let path = self.path();

        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        let token = content.lines().next().unwrap_or("").trim();
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(token.to_string()))
    }

    /// Save the refresh token, replacing any previous one
    pub fn save(&self, refresh_token: &str) -> Result<()> {
        let path = self.path();
        std::fs::write(&path, refresh_token)?;

        // Set restrictive permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Delete the saved login
    pub fn clear(&self) -> Result<()> {
        let path = self.path();
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
