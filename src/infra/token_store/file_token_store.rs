use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::core::auth::{AuthError, AuthToken, TokenStore};

/// Keeps the current token as a JSON file on disk.
///
/// Writes replace the whole file; concurrent writers are last-writer-wins.
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TokenStore for FileTokenStore {
    async fn load(&self) -> Result<Option<AuthToken>, AuthError> {
        if !self.path.exists() {
            tracing::warn!(path = %self.path.display(), "Token file not found");
            return Ok(None);
        }

        let text = fs::read_to_string(&self.path)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(None);
        }

        // Older deployments stored the bare refresh token as plain text.
        match serde_json::from_str::<AuthToken>(text) {
            Ok(token) => Ok(Some(token)),
            Err(_) if !text.starts_with('{') => {
                Ok(Some(AuthToken::from_refresh_token(text.to_string())))
            }
            Err(e) => Err(AuthError::Store(e.to_string())),
        }
    }

    async fn save(&self, token: &AuthToken) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;
        }

        let text =
            serde_json::to_string_pretty(token).map_err(|e| AuthError::Store(e.to_string()))?;
        fs::write(&self.path, text)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))
                .await
                .map_err(|e| AuthError::Store(e.to_string()))?;
        }

        Ok(())
    }
}
