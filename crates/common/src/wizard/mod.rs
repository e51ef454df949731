//! Installation wizard
//!
//! The wizard is a fixed, linear sequence of steps whose progress lives in a
//! single JSON document on disk. There is no in-memory copy of the record:
//! every operation re-reads the store, mutates, and writes back. The only
//! in-memory state is a writer lock that serializes those read-modify-write
//! cycles inside one process.
//!
//! Transitions trust the step named by the caller. Submitting `installation`
//! while the record still points at `welcome` moves straight to
//! `network_setup`; clients are free to re-enter or skip steps.

pub mod store;
pub mod token;

pub use store::{FileWizardStore, MemoryWizardStore, WizardStore};

use crate::executor::{NodeControl, INITIAL_BACKUP_LABEL};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// One stage of the setup flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Welcome,
    SystemCheck,
    Configuration,
    Installation,
    NetworkSetup,
    Complete,
}

impl WizardStep {
    /// Canonical order. `Complete` is terminal.
    pub const ALL: [WizardStep; 6] = [
        WizardStep::Welcome,
        WizardStep::SystemCheck,
        WizardStep::Configuration,
        WizardStep::Installation,
        WizardStep::NetworkSetup,
        WizardStep::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Welcome => "welcome",
            Self::SystemCheck => "system_check",
            Self::Configuration => "configuration",
            Self::Installation => "installation",
            Self::NetworkSetup => "network_setup",
            Self::Complete => "complete",
        }
    }

    fn position(self) -> usize {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .unwrap_or(Self::ALL.len() - 1)
    }

    /// The step that follows this one. `Complete` is its own successor.
    pub fn next(self) -> WizardStep {
        Self::ALL
            .get(self.position() + 1)
            .copied()
            .unwrap_or(WizardStep::Complete)
    }

    /// Steps strictly after this one in canonical order.
    pub fn following(self) -> &'static [WizardStep] {
        &Self::ALL[self.position() + 1..]
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WizardStep {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| Error::InvalidStep(s.to_string()))
    }
}

/// Persisted wizard progress (`wizard-status.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WizardProgress {
    pub active: bool,
    pub current_step: WizardStep,
    pub completed_steps: Vec<WizardStep>,
    pub remaining_steps: Vec<WizardStep>,
    pub progress_percent: u8,
}

impl Default for WizardProgress {
    fn default() -> Self {
        Self {
            active: true,
            current_step: WizardStep::Welcome,
            completed_steps: Vec::new(),
            remaining_steps: WizardStep::ALL.to_vec(),
            progress_percent: 0,
        }
    }
}

impl WizardProgress {
    /// Terminal record written once the wizard has been completed.
    pub fn finished() -> Self {
        Self {
            active: false,
            current_step: WizardStep::Complete,
            completed_steps: WizardStep::ALL.to_vec(),
            remaining_steps: Vec::new(),
            progress_percent: 100,
        }
    }

    /// Mark `step` done and move to its successor. Returns the new current step.
    pub fn record(&mut self, step: WizardStep) -> WizardStep {
        if !self.completed_steps.contains(&step) {
            self.completed_steps.push(step);
        }
        let next = step.next();
        self.remaining_steps = step.following().to_vec();
        self.current_step = next;
        self.progress_percent = percent_complete(self.completed_steps.len());
        next
    }
}

/// floor(completed / total * 100), using integer arithmetic.
fn percent_complete(completed: usize) -> u8 {
    let pct = completed * 100 / WizardStep::ALL.len();
    pct.min(100) as u8
}

/// Loose truthiness of a client-supplied JSON value.
///
/// `null`, `false`, `0`, `""` and a missing value are false; anything else,
/// including empty objects and arrays, is true.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

/// Options for finishing the wizard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteOptions {
    #[serde(default)]
    pub start_node: bool,
    #[serde(default)]
    pub create_backup: bool,
}

impl CompleteOptions {
    /// Read the flags from a request document using [`is_truthy`].
    ///
    /// Anything but a JSON object is rejected.
    pub fn from_request(doc: &Value) -> Option<Self> {
        let fields = doc.as_object()?;
        Some(Self {
            start_node: is_truthy(fields.get("start_node")),
            create_backup: is_truthy(fields.get("create_backup")),
        })
    }
}

/// Wizard state machine over a [`WizardStore`].
pub struct Wizard {
    store: Arc<dyn WizardStore>,
    node: NodeControl,
    /// Serializes load/mutate/save cycles on the progress record.
    write_lock: Mutex<()>,
}

impl Wizard {
    pub fn new(store: Arc<dyn WizardStore>, node: NodeControl) -> Self {
        Self {
            store,
            node,
            write_lock: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &Arc<dyn WizardStore> {
        &self.store
    }

    /// Check a caller-supplied token against the active session.
    pub async fn authorize(&self, supplied: Option<&str>) -> Result<()> {
        token::verify(self.store.as_ref(), supplied).await
    }

    /// Current progress, creating the default record on first access.
    ///
    /// A corrupt record is answered with a default that is not written back.
    pub async fn status(&self) -> Result<WizardProgress> {
        let _guard = self.write_lock.lock().await;

        match self.store.load_progress().await {
            Ok(Some(progress)) => Ok(progress),
            Ok(None) => {
                let progress = WizardProgress::default();
                self.store.save_progress(&progress).await?;
                info!("Initialized wizard progress");
                Ok(progress)
            }
            Err(Error::CorruptState(reason)) => {
                warn!("Wizard progress unreadable, serving defaults: {}", reason);
                Ok(WizardProgress::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Record `step` as done, storing its payload when truthy. Returns the next step.
    pub async fn advance(
        &self,
        step: &str,
        data: Option<&Value>,
    ) -> Result<WizardStep> {
        let _guard = self.write_lock.lock().await;

        let mut progress = self.store.load_progress().await?.ok_or(Error::NotFound)?;
        let step: WizardStep = step.parse()?;

        let next = progress.record(step);

        // Falsy payloads (null, false, 0, "") are not stored.
        if let Some(data) = data.filter(|d| is_truthy(Some(d))) {
            self.store.save_step_data(step, data).await?;
        }
        self.store.save_progress(&progress).await?;

        info!(
            "Wizard step {} done, next {} ({}%)",
            step, next, progress.progress_percent
        );
        Ok(next)
    }

    /// Run the requested finishing commands, then end the session.
    ///
    /// Token removal and finalization only happen after every requested
    /// command succeeded.
    pub async fn complete(&self, opts: CompleteOptions) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if opts.start_node {
            self.node.start().await.map_err(installation_failed)?;
        }
        if opts.create_backup {
            self.node
                .backup(INITIAL_BACKUP_LABEL)
                .await
                .map_err(installation_failed)?;
        }

        if self.store.remove_token().await? {
            info!("Wizard token removed");
        }
        self.store.save_progress(&WizardProgress::finished()).await?;

        info!(
            "Wizard completed (start_node={}, create_backup={})",
            opts.start_node, opts.create_backup
        );
        Ok(())
    }
}

fn installation_failed(e: Error) -> Error {
    warn!("Wizard completion command failed: {}", e);
    Error::InstallationFailed(e.detail())
}
