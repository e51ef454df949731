//! PoP Node Web Console
//!
//! HTTP front for the node-management executable plus the first-run
//! installation wizard.

pub mod browser;
pub mod config;
pub mod metrics;
pub mod server;
pub mod static_files;
pub mod system_check;
pub mod wizard_routes;

pub use config::AppConfig;
pub use server::{WebServer, WebServerState};
pub use system_check::{SystemCheckReport, SystemChecker};
