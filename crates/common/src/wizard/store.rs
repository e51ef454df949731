//! Wizard persistence
//!
//! Layout under the data directory:
//!
//! ```text
//! wizard-token.tmp            bearer token, plaintext
//! wizard-status.json          WizardProgress, pretty JSON
//! wizard-data/<step>.json     per-step payload, pretty JSON
//! ```

use super::{WizardProgress, WizardStep};
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

pub const TOKEN_FILE: &str = "wizard-token.tmp";
pub const STATUS_FILE: &str = "wizard-status.json";
pub const STEP_DATA_DIR: &str = "wizard-data";

/// Repository for wizard progress, step payloads and the session token.
#[async_trait]
pub trait WizardStore: Send + Sync {
    /// `Ok(None)` when no record exists; `CorruptState` when it cannot be parsed.
    async fn load_progress(&self) -> Result<Option<WizardProgress>>;

    async fn save_progress(&self, progress: &WizardProgress) -> Result<()>;

    /// Overwrites any earlier payload for the same step.
    async fn save_step_data(&self, step: WizardStep, data: &Value) -> Result<()>;

    async fn load_step_data(&self, step: WizardStep) -> Result<Option<Value>>;

    /// Stored token, trimmed. `None` means no wizard session.
    async fn read_token(&self) -> Result<Option<String>>;

    async fn write_token(&self, token: &str) -> Result<()>;

    /// Returns whether a token was present.
    async fn remove_token(&self) -> Result<bool>;
}

fn parse_progress(raw: &str) -> Result<WizardProgress> {
    serde_json::from_str(raw).map_err(|e| Error::CorruptState(e.to_string()))
}

/// Stores everything as files under a data directory.
#[derive(Debug, Clone)]
pub struct FileWizardStore {
    root: PathBuf,
}

impl FileWizardStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn token_path(&self) -> PathBuf {
        self.root.join(TOKEN_FILE)
    }

    pub fn status_path(&self) -> PathBuf {
        self.root.join(STATUS_FILE)
    }

    pub fn step_data_path(&self, step: WizardStep) -> PathBuf {
        self.root
            .join(STEP_DATA_DIR)
            .join(format!("{}.json", step.as_str()))
    }

    /// Write via a sibling temp file and rename, so readers never see half a document.
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut staging = path.as_os_str().to_owned();
        staging.push(".new");
        let staging = PathBuf::from(staging);

        fs::write(&staging, contents).await?;
        fs::rename(&staging, path).await?;
        debug!("Wrote {:?}", path);
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(raw) => Ok(Some(raw)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl WizardStore for FileWizardStore {
    async fn load_progress(&self) -> Result<Option<WizardProgress>> {
        match read_optional(&self.status_path()).await? {
            Some(raw) => parse_progress(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn save_progress(&self, progress: &WizardProgress) -> Result<()> {
        let json = serde_json::to_vec_pretty(progress)?;
        self.write_atomic(&self.status_path(), &json).await
    }

    async fn save_step_data(&self, step: WizardStep, data: &Value) -> Result<()> {
        let json = serde_json::to_vec_pretty(data)?;
        self.write_atomic(&self.step_data_path(step), &json).await
    }

    async fn load_step_data(&self, step: WizardStep) -> Result<Option<Value>> {
        match read_optional(&self.step_data_path(step)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn read_token(&self) -> Result<Option<String>> {
        Ok(read_optional(&self.token_path())
            .await?
            .map(|raw| raw.trim().to_string()))
    }

    async fn write_token(&self, token: &str) -> Result<()> {
        self.write_atomic(&self.token_path(), format!("{}\n", token).as_bytes())
            .await
    }

    async fn remove_token(&self) -> Result<bool> {
        match fs::remove_file(self.token_path()).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    /// Raw document, so tests can plant unparseable content.
    progress: Option<String>,
    step_data: HashMap<WizardStep, Value>,
    token: Option<String>,
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryWizardStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryWizardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored progress document with arbitrary text.
    pub async fn set_raw_progress(&self, raw: &str) {
        self.inner.lock().await.progress = Some(raw.to_string());
    }

    pub async fn raw_progress(&self) -> Option<String> {
        self.inner.lock().await.progress.clone()
    }
}

#[async_trait]
impl WizardStore for MemoryWizardStore {
    async fn load_progress(&self) -> Result<Option<WizardProgress>> {
        let inner = self.inner.lock().await;
        inner.progress.as_deref().map(parse_progress).transpose()
    }

    async fn save_progress(&self, progress: &WizardProgress) -> Result<()> {
        let json = serde_json::to_string_pretty(progress)?;
        self.inner.lock().await.progress = Some(json);
        Ok(())
    }

    async fn save_step_data(&self, step: WizardStep, data: &Value) -> Result<()> {
        self.inner.lock().await.step_data.insert(step, data.clone());
        Ok(())
    }

    async fn load_step_data(&self, step: WizardStep) -> Result<Option<Value>> {
        Ok(self.inner.lock().await.step_data.get(&step).cloned())
    }

    async fn read_token(&self) -> Result<Option<String>> {
        Ok(self
            .inner
            .lock()
            .await
            .token
            .as_ref()
            .map(|t| t.trim().to_string()))
    }

    async fn write_token(&self, token: &str) -> Result<()> {
        self.inner.lock().await.token = Some(token.to_string());
        Ok(())
    }

    async fn remove_token(&self) -> Result<bool> {
        Ok(self.inner.lock().await.token.take().is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_missing_files() {
        let tmp = TempDir::new().unwrap();
        let store = FileWizardStore::new(tmp.path());

        assert_eq!(store.load_progress().await.unwrap(), None);
        assert_eq!(store.read_token().await.unwrap(), None);
        assert_eq!(
            store.load_step_data(WizardStep::Welcome).await.unwrap(),
            None
        );
        assert!(!store.remove_token().await.unwrap());
    }

    #[tokio::test]
    async fn test_progress_document_shape() {
        let tmp = TempDir::new().unwrap();
        let store = FileWizardStore::new(tmp.path());

        store.save_progress(&WizardProgress::default()).await.unwrap();

        let raw = std::fs::read_to_string(tmp.path().join(STATUS_FILE)).unwrap();
        // Pretty-printed, field names exactly as the browser client reads them.
        assert!(raw.contains("\n  \"active\": true"));
        let doc: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            doc,
            json!({
                "active": true,
                "current_step": "welcome",
                "completed_steps": [],
                "remaining_steps": [
                    "welcome", "system_check", "configuration",
                    "installation", "network_setup", "complete"
                ],
                "progress_percent": 0
            })
        );
        assert!(!tmp.path().join("wizard-status.json.new").exists());
    }

    #[tokio::test]
    async fn test_corrupt_progress() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(STATUS_FILE), "{\"active\": tru").unwrap();
        let store = FileWizardStore::new(tmp.path());

        let err = store.load_progress().await.unwrap_err();
        assert!(matches!(err, Error::CorruptState(_)));
    }

    #[tokio::test]
    async fn test_unknown_step_in_document_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        let mut doc = serde_json::to_value(WizardProgress::default()).unwrap();
        doc["current_step"] = json!("reboot");
        std::fs::write(tmp.path().join(STATUS_FILE), doc.to_string()).unwrap();

        let store = FileWizardStore::new(tmp.path());
        assert!(matches!(
            store.load_progress().await,
            Err(Error::CorruptState(_))
        ));
    }

    #[tokio::test]
    async fn test_step_data_written_verbatim() {
        let tmp = TempDir::new().unwrap();
        let store = FileWizardStore::new(tmp.path());

        store
            .save_step_data(WizardStep::Configuration, &json!({"disk_space_gb": 50}))
            .await
            .unwrap();

        let path = tmp.path().join("wizard-data").join("configuration.json");
        let doc: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(doc, json!({"disk_space_gb": 50}));
    }

    #[tokio::test]
    async fn test_token_is_trimmed_and_removed_once() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(TOKEN_FILE), "  s3cret-token \n").unwrap();
        let store = FileWizardStore::new(tmp.path());

        assert_eq!(
            store.read_token().await.unwrap().as_deref(),
            Some("s3cret-token")
        );
        assert!(store.remove_token().await.unwrap());
        assert!(!store.remove_token().await.unwrap());
        assert_eq!(store.read_token().await.unwrap(), None);
    }
}
