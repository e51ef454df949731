//! Launch a local browser at the console once it is reachable

use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info, warn};

const READY_TIMEOUT: Duration = Duration::from_secs(30);
const READY_POLL: Duration = Duration::from_millis(500);

#[cfg(target_os = "macos")]
const OPENERS: &[&str] = &["open"];

#[cfg(not(target_os = "macos"))]
const OPENERS: &[&str] = &[
    "xdg-open",
    "gnome-open",
    "kde-open",
    "firefox",
    "google-chrome",
    "chromium-browser",
];

/// First opener found on `PATH`.
pub fn detect_opener() -> Option<PathBuf> {
    OPENERS.iter().find_map(|cmd| which::which(cmd).ok())
}

/// Poll until `addr` accepts TCP connections or the deadline passes.
pub async fn wait_until_listening(addr: SocketAddr, timeout: Duration, poll: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if TcpStream::connect(addr).await.is_ok() {
            return true;
        }
        if tokio::time::Instant::now() + poll > deadline {
            return false;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Wait for the server, then open `url`. Never fails the caller; problems are logged.
pub async fn open_when_ready(addr: SocketAddr, url: String) {
    if !wait_until_listening(addr, READY_TIMEOUT, READY_POLL).await {
        warn!("Server on {} not reachable after {:?}, not opening browser", addr, READY_TIMEOUT);
        return;
    }

    let Some(opener) = detect_opener() else {
        warn!("No browser found, open {} manually", url);
        return;
    };

    info!("Opening {} with {}", url, opener.display());
    let spawned = Command::new(&opener)
        .arg(&url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn();

    match spawned {
        Ok(mut child) => {
            // reap
            tokio::spawn(async move {
                let status = child.wait().await;
                debug!("Browser opener exited: {:?}", status);
            });
        }
        Err(e) => warn!("Failed to launch {}: {}", opener.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_until_listening() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        assert!(wait_until_listening(addr, Duration::from_secs(1), Duration::from_millis(50)).await);
    }

    #[tokio::test]
    async fn test_wait_gives_up() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        assert!(
            !wait_until_listening(addr, Duration::from_millis(200), Duration::from_millis(50))
                .await
        );
    }
}
