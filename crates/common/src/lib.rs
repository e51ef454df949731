//! PoP Console Common Library
//!
//! Node command execution and installation wizard state shared by the web
//! console.

pub mod error;
pub mod executor;
pub mod wizard;

// Re-export commonly used types
pub use error::{Error, Result, UnauthorizedReason};
pub use executor::{
    node_status_from_output, CommandExecutor, CommandOutput, NodeControl, ProcessExecutor,
};
pub use wizard::{
    CompleteOptions, FileWizardStore, MemoryWizardStore, Wizard, WizardProgress, WizardStep,
    WizardStore,
};

/// Console version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default data directory for wizard state and console config
pub fn default_data_dir() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("pipe-pop")
}
