use crate::constants::CREDENTIAL_KEY;
use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Persists the API key as a single entry of a small JSON file.
#[derive(Clone, Debug)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        PathBuf::from(tmp)
    }

    /// Reads the stored key, `None` if nothing has been saved yet.
    pub async fn load(&self) -> Result<Option<String>> {
        let res = tokio::fs::read(&self.path).await;

        let bytes = match res {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No stored credential at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        let entries: HashMap<String, String> = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;

        Ok(entries
            .get(CREDENTIAL_KEY)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty()))
    }

    /// Stores `key`, replacing any previous value.
    ///
    /// Written to a temp file first and renamed into place, so a crash never
    /// leaves a half written file behind.
    pub async fn save(&self, key: &str) -> Result<()> {
        let key = key.trim();
        if key.is_empty() {
            bail!("Refusing to store an empty API key");
        }

        let entries = HashMap::from([(CREDENTIAL_KEY.to_string(), key.to_string())]);
        let json = serde_json::to_string_pretty(&entries)?;

        let tmp = self.tmp_path();
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .with_context(|| format!("Failed to move credential into {}", self.path.display()))?;

        info!("Stored API key in {}", self.path.display());
        Ok(())
    }
}
