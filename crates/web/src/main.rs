//! PoP Node Web Console
//!
//! Serves the dashboard and wizard API for a local PoP node.

use anyhow::Context;
use clap::Parser;
use popui_common::{wizard::token, FileWizardStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use popui_web::config::{self, AppConfig};
use popui_web::{browser, WebServer};

#[derive(Parser)]
#[command(name = "pop-ui")]
#[command(about = "Web console and installation wizard for a PoP node")]
#[command(version)]
struct Cli {
    /// Configuration file path (defaults to <data-dir>/ui-config.toml)
    #[arg(short, long, env = "POP_UI_CONFIG")]
    config: Option<PathBuf>,

    /// Data directory for wizard state
    #[arg(long, env = "POP_UI_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Listen host
    #[arg(long, env = "POP_UI_HOST")]
    host: Option<String>,

    /// Listen port
    #[arg(short, long, env = "POP_UI_PORT")]
    port: Option<u16>,

    /// Node-management executable
    #[arg(long, env = "POP_UI_POP_COMMAND")]
    pop_command: Option<PathBuf>,

    /// Directory holding the browser UI
    #[arg(long, env = "POP_UI_WEB_ROOT")]
    web_root: Option<PathBuf>,

    /// Open the console in a browser once it is up
    #[arg(long, env = "POP_UI_OPEN")]
    open: bool,

    /// Enable debug logging
    #[arg(short, long, env = "POP_UI_DEBUG")]
    debug: bool,

    /// Emit logs as JSON
    #[arg(long, env = "POP_UI_JSON_LOGS")]
    json_logs: bool,

    /// Start a wizard session with a fresh token before serving
    #[arg(long, env = "POP_UI_ISSUE_WIZARD_TOKEN")]
    issue_wizard_token: bool,
}

impl Cli {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(cmd) = &self.pop_command {
            config.pop_command = cmd.clone();
        }
        if let Some(root) = &self.web_root {
            config.web_root = root.clone();
        }
        if self.open {
            config.open_browser = true;
        }
    }
}

fn init_logging(debug: bool, json: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug, cli.json_logs);

    info!("PoP web console v{}", popui_common::VERSION);

    let data_dir = cli
        .data_dir
        .clone()
        .unwrap_or_else(popui_common::default_data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| config::config_path(&data_dir));
    let mut app_config = AppConfig::load(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    cli.apply(&mut app_config);

    let mut open_url = format!("{}/", app_config.base_url());
    if cli.issue_wizard_token {
        let store = FileWizardStore::new(&data_dir);
        let token = token::issue(&store).await?;
        let url = app_config.wizard_url(&token);
        info!("Wizard session started: {}", url);
        open_url = url;
    }

    let addr: SocketAddr = tokio::net::lookup_host((app_config.host.as_str(), app_config.port))
        .await
        .with_context(|| format!("resolving {}", app_config.host))?
        .next()
        .with_context(|| format!("no address for {}", app_config.host))?;

    if app_config.open_browser {
        tokio::spawn(browser::open_when_ready(addr, open_url));
    }

    info!(
        "Data directory {}, managed executable {}",
        data_dir.display(),
        app_config.pop_command.display()
    );

    WebServer::new(app_config, &data_dir).serve(addr).await
}
