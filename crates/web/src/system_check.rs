//! Host compatibility checks for the wizard's `system_check` step
//!
//! Parsing is kept in pure functions so it can be tested against canned
//! `/etc/os-release` and `/proc/meminfo` contents on any host.

use chrono::Utc;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, warn};

pub const MIN_MEMORY_MB: u64 = 2048;
pub const MIN_DISK_SPACE_GB: u64 = 20;
pub const REQUIRED_PORTS: [u16; 2] = [4500, 8585];
pub const REQUIRED_COMMANDS: [&str; 4] = ["python3", "curl", "ip", "iptables"];

const TESTED_DISTROS: [&str; 5] = ["ubuntu", "debian", "fedora", "centos", "rhel"];
const HTTP_TIMEOUT: Duration = Duration::from_secs(5);
const PORT_TIMEOUT: Duration = Duration::from_secs(1);

/// Basic host identification
#[derive(Debug, Clone, Serialize)]
pub struct SystemInfo {
    pub hostname: String,
    pub system: String,
    pub release: String,
    pub architecture: String,
}

/// Result of a full check run, shaped for the wizard UI
#[derive(Debug, Clone, Serialize)]
pub struct SystemCheckReport {
    pub checked_at: String,
    pub system_info: SystemInfo,
    pub os: bool,
    pub os_message: String,
    pub memory: bool,
    pub memory_message: String,
    pub disk: bool,
    pub disk_message: String,
    pub network: bool,
    pub network_message: String,
    pub dependencies: bool,
    pub dependencies_message: String,
    pub all_checks_passed: bool,
    pub recommendations: Vec<String>,
}

/// Outcome of one check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub ok: bool,
    pub message: String,
}

impl Check {
    fn pass(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    fn fail(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Runs every check against the local host.
#[derive(Debug, Clone)]
pub struct SystemChecker {
    /// Directory whose filesystem must have room for the node
    pub data_dir: PathBuf,
    pub connectivity_urls: Vec<String>,
    /// Endpoint answering `{"ip": ...}`; `None` skips the lookup
    pub public_ip_url: Option<String>,
    pub required_ports: Vec<u16>,
    /// Port this console listens on, never reported as taken
    pub own_port: Option<u16>,
}

impl SystemChecker {
    pub fn new(data_dir: impl Into<PathBuf>, connectivity_urls: Vec<String>) -> Self {
        Self {
            data_dir: data_dir.into(),
            connectivity_urls,
            public_ip_url: None,
            required_ports: REQUIRED_PORTS.to_vec(),
            own_port: None,
        }
    }

    pub fn with_public_ip_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.public_ip_url = (!url.is_empty()).then_some(url);
        self
    }

    pub fn with_own_port(mut self, port: u16) -> Self {
        self.own_port = Some(port);
        self
    }

    pub async fn run(&self) -> SystemCheckReport {
        let os = check_os().await;
        let memory = check_memory().await;
        let disk = check_disk(&self.data_dir);
        let network = self.check_network().await;
        let dependencies = check_dependencies(&REQUIRED_COMMANDS, |cmd| which::which(cmd).is_ok());

        let mut report = SystemCheckReport {
            checked_at: Utc::now().to_rfc3339(),
            system_info: system_info().await,
            all_checks_passed: os.ok && memory.ok && disk.ok && network.ok && dependencies.ok,
            os: os.ok,
            os_message: os.message,
            memory: memory.ok,
            memory_message: memory.message,
            disk: disk.ok,
            disk_message: disk.message,
            network: network.ok,
            network_message: network.message,
            dependencies: dependencies.ok,
            dependencies_message: dependencies.message,
            recommendations: Vec::new(),
        };
        report.recommendations = recommendations(&report);

        debug!("System check finished, all passed: {}", report.all_checks_passed);
        report
    }

    async fn check_network(&self) -> Check {
        let internet = check_internet(&self.connectivity_urls).await;
        let public_ip = match &self.public_ip_url {
            Some(url) => Some(lookup_public_ip(url).await),
            None => None,
        };

        let mut busy = Vec::new();
        for port in &self.required_ports {
            if Some(*port) != self.own_port && port_in_use(*port).await {
                busy.push(*port);
            }
        }

        combine_network(internet, public_ip, &self.required_ports, &busy)
    }
}

/// `Ok(())` when any URL answered, `Err(reason)` when none did.
/// `None` when the check is disabled.
async fn check_internet(urls: &[String]) -> Option<Result<(), String>> {
    if urls.is_empty() {
        return None;
    }

    let client = match reqwest::Client::builder().timeout(HTTP_TIMEOUT).build() {
        Ok(c) => c,
        Err(e) => return Some(Err(e.to_string())),
    };

    let mut last_err = String::new();
    for url in urls {
        match client.get(url).send().await {
            Ok(_) => return Some(Ok(())),
            Err(e) => {
                debug!("Connectivity check via {} failed: {}", url, e);
                last_err = e.to_string();
            }
        }
    }
    Some(Err(last_err))
}

async fn lookup_public_ip(url: &str) -> Option<String> {
    let client = reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .ok()?;
    let body = match client.get(url).send().await {
        Ok(resp) => resp.text().await.ok()?,
        Err(e) => {
            debug!("Public IP lookup via {} failed: {}", url, e);
            return None;
        }
    };
    parse_public_ip(&body)
}

/// `ip` field of an ipify-style JSON reply
pub fn parse_public_ip(body: &str) -> Option<String> {
    let doc: serde_json::Value = serde_json::from_str(body).ok()?;
    doc.get("ip")?
        .as_str()
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
}

async fn port_in_use(port: u16) -> bool {
    matches!(
        tokio::time::timeout(PORT_TIMEOUT, TcpStream::connect(("127.0.0.1", port))).await,
        Ok(Ok(_))
    )
}

fn join_ports(ports: &[u16]) -> String {
    ports
        .iter()
        .map(|p| p.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `public_ip` is `None` when the lookup is disabled and `Some(None)` when it failed.
fn combine_network(
    internet: Option<Result<(), String>>,
    public_ip: Option<Option<String>>,
    required: &[u16],
    busy: &[u16],
) -> Check {
    let (internet_ok, internet_message) = match internet {
        None => (true, "Internet connectivity: not checked".to_string()),
        Some(Ok(())) => (true, "Internet connectivity: OK".to_string()),
        Some(Err(e)) => (false, format!("No internet connectivity: {}", e)),
    };

    let (ports_ok, port_message) = if busy.is_empty() {
        (
            true,
            format!("Required ports are available: {}", join_ports(required)),
        )
    } else {
        (false, format!("Ports already in use: {}", join_ports(busy)))
    };

    let mut parts = vec![internet_message];
    match public_ip {
        Some(Some(ip)) => parts.push(format!("Public IP: {}", ip)),
        Some(None) => parts.push("Could not determine public IP address".to_string()),
        None => {}
    }
    parts.push(port_message);

    Check {
        ok: internet_ok && ports_ok,
        message: parts.join(". "),
    }
}

async fn check_os() -> Check {
    match std::env::consts::OS {
        "linux" => {
            let contents = tokio::fs::read_to_string("/etc/os-release").await.ok();
            linux_os_check(contents.as_deref())
        }
        "macos" => Check::fail("macOS is not officially supported for production use"),
        "windows" => Check::fail("Windows is not supported for the PoP node"),
        other => Check::fail(format!("Unsupported operating system: {}", other)),
    }
}

/// Distribution id and version from `/etc/os-release`
pub fn parse_os_release(contents: &str) -> Option<(String, String)> {
    let mut id = None;
    let mut version = None;

    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once('=') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            match key.trim() {
                "ID" => id = Some(value.to_string()),
                "VERSION_ID" => version = Some(value.to_string()),
                _ => {}
            }
        }
    }

    id.map(|id| (id, version.unwrap_or_else(|| "unknown".to_string())))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn linux_os_check(os_release: Option<&str>) -> Check {
    match os_release.and_then(parse_os_release) {
        Some((id, version)) if TESTED_DISTROS.contains(&id.as_str()) => Check::pass(format!(
            "Compatible Linux distribution: {} {}",
            capitalize(&id),
            version
        )),
        Some((id, version)) => Check::pass(format!(
            "Linux distribution {} {} should work but is not officially tested",
            capitalize(&id),
            version
        )),
        None => Check::pass("Linux detected, but could not determine distribution"),
    }
}

/// Value in kB of one `/proc/meminfo` field
pub fn meminfo_kb(contents: &str, field: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let (key, rest) = line.split_once(':')?;
        if key.trim() != field {
            return None;
        }
        rest.split_whitespace().next()?.parse().ok()
    })
}

/// `MemTotal` in kB from `/proc/meminfo`
pub fn parse_meminfo_total_kb(contents: &str) -> Option<u64> {
    meminfo_kb(contents, "MemTotal")
}

fn memory_check(total_mb: u64) -> Check {
    if total_mb >= MIN_MEMORY_MB {
        Check::pass(format!(
            "Memory: {} MB (minimum: {} MB)",
            total_mb, MIN_MEMORY_MB
        ))
    } else {
        Check::fail(format!(
            "Insufficient memory: {} MB (minimum: {} MB)",
            total_mb, MIN_MEMORY_MB
        ))
    }
}

async fn check_memory() -> Check {
    let contents = match tokio::fs::read_to_string("/proc/meminfo").await {
        Ok(c) => c,
        Err(e) => {
            warn!("Cannot read /proc/meminfo: {}", e);
            return Check::fail("Could not determine system memory");
        }
    };
    match parse_meminfo_total_kb(&contents) {
        Some(kb) => memory_check(kb / 1024),
        None => Check::fail("Could not determine system memory"),
    }
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

fn disk_check(free_bytes: u64, total_bytes: u64) -> Check {
    let free_gb = free_bytes as f64 / GIB;
    let total_gb = total_bytes as f64 / GIB;
    if free_gb >= MIN_DISK_SPACE_GB as f64 {
        Check::pass(format!(
            "Disk space: {:.1} GB free of {:.1} GB total (minimum: {} GB)",
            free_gb, total_gb, MIN_DISK_SPACE_GB
        ))
    } else {
        Check::fail(format!(
            "Insufficient disk space: {:.1} GB free (minimum: {} GB)",
            free_gb, MIN_DISK_SPACE_GB
        ))
    }
}

fn check_disk(dir: &Path) -> Check {
    match disk_space(dir) {
        Ok((free, total)) => disk_check(free, total),
        Err(e) => {
            warn!("Disk space check on {} failed: {}", dir.display(), e);
            Check::fail(format!("Error checking disk space: {}", e))
        }
    }
}

/// (available, total) bytes on the filesystem holding `dir`
#[cfg(unix)]
pub(crate) fn disk_space(dir: &Path) -> std::io::Result<(u64, u64)> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(dir.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and stat is a valid out-pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error());
    }

    let frsize = stat.f_frsize as u64;
    Ok((
        stat.f_bavail as u64 * frsize,
        stat.f_blocks as u64 * frsize,
    ))
}

#[cfg(not(unix))]
pub(crate) fn disk_space(_dir: &Path) -> std::io::Result<(u64, u64)> {
    Err(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        "disk space query not available on this OS",
    ))
}

fn check_dependencies(commands: &[&str], present: impl Fn(&str) -> bool) -> Check {
    let missing: Vec<&str> = commands.iter().copied().filter(|c| !present(c)).collect();
    if missing.is_empty() {
        Check::pass(format!(
            "All required dependencies are installed: {}",
            commands.join(", ")
        ))
    } else {
        Check::fail(format!("Missing dependencies: {}", missing.join(", ")))
    }
}

async fn system_info() -> SystemInfo {
    let read = |path: &'static str| async move {
        tokio::fs::read_to_string(path)
            .await
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    };

    SystemInfo {
        hostname: read("/proc/sys/kernel/hostname").await,
        system: std::env::consts::OS.to_string(),
        release: read("/proc/sys/kernel/osrelease").await,
        architecture: std::env::consts::ARCH.to_string(),
    }
}

/// Advice for each failed check
pub fn recommendations(report: &SystemCheckReport) -> Vec<String> {
    let mut out = Vec::new();

    if !report.os {
        out.push(
            "Consider using a supported Linux distribution (Ubuntu 20.04+ recommended)".to_string(),
        );
    }
    if !report.memory {
        out.push(format!(
            "Increase system memory to at least {} MB for optimal performance",
            MIN_MEMORY_MB
        ));
    }
    if !report.disk {
        out.push(format!(
            "Ensure at least {} GB of free disk space is available",
            MIN_DISK_SPACE_GB
        ));
    }
    if !report.network {
        if let Some(ports) = report
            .network_message
            .split("Ports already in use: ")
            .nth(1)
        {
            out.push(format!("Free up the following ports: {}", ports));
        }
        if report.network_message.contains("No internet connectivity") {
            out.push("Ensure the system has a working internet connection".to_string());
        }
    }
    if !report.dependencies {
        if let Some(missing) = report
            .dependencies_message
            .strip_prefix("Missing dependencies: ")
        {
            out.push(format!("Install missing dependencies: {}", missing));
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_os_release() {
        let contents = r#"
# comment
NAME="Ubuntu"
ID=ubuntu
VERSION_ID="22.04"
"#;
        assert_eq!(
            parse_os_release(contents),
            Some(("ubuntu".to_string(), "22.04".to_string()))
        );
        assert_eq!(parse_os_release("NAME=whatever\n"), None);
    }

    #[test]
    fn test_linux_os_messages() {
        let tested = linux_os_check(Some("ID=debian\nVERSION_ID=12\n"));
        assert!(tested.ok);
        assert_eq!(tested.message, "Compatible Linux distribution: Debian 12");

        let other = linux_os_check(Some("ID=arch\n"));
        assert!(other.ok);
        assert_eq!(
            other.message,
            "Linux distribution Arch unknown should work but is not officially tested"
        );

        assert!(linux_os_check(None).ok);
    }

    #[test]
    fn test_meminfo() {
        let contents = "MemTotal:       16314336 kB\nMemFree:         1234 kB\n";
        assert_eq!(parse_meminfo_total_kb(contents), Some(16314336));
        assert_eq!(parse_meminfo_total_kb("MemFree: 12 kB\n"), None);

        assert!(memory_check(2048).ok);
        let low = memory_check(1024);
        assert!(!low.ok);
        assert_eq!(low.message, "Insufficient memory: 1024 MB (minimum: 2048 MB)");
    }

    #[test]
    fn test_disk_threshold() {
        let gib = 1024 * 1024 * 1024;
        assert!(disk_check(20 * gib, 100 * gib).ok);
        let low = disk_check(5 * gib, 100 * gib);
        assert!(!low.ok);
        assert_eq!(low.message, "Insufficient disk space: 5.0 GB free (minimum: 20 GB)");
    }

    #[cfg(unix)]
    #[test]
    fn test_disk_space_query() {
        let tmp = tempfile::TempDir::new().unwrap();
        let (free, total) = disk_space(tmp.path()).unwrap();
        assert!(total > 0);
        assert!(free <= total);
    }

    #[test]
    fn test_network_messages() {
        let ok = combine_network(Some(Ok(())), None, &[4500, 8585], &[]);
        assert!(ok.ok);
        assert_eq!(
            ok.message,
            "Internet connectivity: OK. Required ports are available: 4500, 8585"
        );

        let skipped = combine_network(None, None, &[4500], &[]);
        assert!(skipped.ok);

        let busy = combine_network(Some(Err("timeout".into())), None, &[4500, 8585], &[8585]);
        assert!(!busy.ok);
        assert_eq!(
            busy.message,
            "No internet connectivity: timeout. Ports already in use: 8585"
        );
    }

    #[test]
    fn test_public_ip_in_message() {
        let found = combine_network(
            Some(Ok(())),
            Some(Some("203.0.113.7".into())),
            &[4500],
            &[],
        );
        assert!(found.ok);
        assert_eq!(
            found.message,
            "Internet connectivity: OK. Public IP: 203.0.113.7. Required ports are available: 4500"
        );

        let unknown = combine_network(Some(Ok(())), Some(None), &[4500], &[]);
        assert!(unknown.ok);
        assert_eq!(
            unknown.message,
            "Internet connectivity: OK. Could not determine public IP address. \
             Required ports are available: 4500"
        );
    }

    #[test]
    fn test_parse_public_ip() {
        assert_eq!(
            parse_public_ip(r#"{"ip":"198.51.100.20"}"#).as_deref(),
            Some("198.51.100.20")
        );
        assert_eq!(parse_public_ip(r#"{"ip":""}"#), None);
        assert_eq!(parse_public_ip(r#"{"address":"1.2.3.4"}"#), None);
        assert_eq!(parse_public_ip("<html>rate limited</html>"), None);
    }

    #[tokio::test]
    async fn test_unreachable_public_ip_lookup() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert_eq!(lookup_public_ip(&format!("http://127.0.0.1:{port}/")).await, None);
    }

    #[tokio::test]
    async fn test_own_port_is_not_reported_busy() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let tmp = tempfile::TempDir::new().unwrap();

        let mut checker = SystemChecker::new(tmp.path(), Vec::new());
        checker.required_ports = vec![port];
        let foreign = checker.check_network().await;
        assert!(!foreign.ok);
        assert!(foreign.message.ends_with(&format!("Ports already in use: {port}")));

        let own = checker.with_own_port(port).check_network().await;
        assert!(own.ok, "{}", own.message);
        assert!(own.message.ends_with(&format!("Required ports are available: {port}")));
        drop(listener);
    }

    #[test]
    fn test_public_ip_url_builder() {
        let checker = SystemChecker::new("/tmp", Vec::new());
        assert_eq!(checker.public_ip_url, None);
        assert_eq!(checker.clone().with_public_ip_url("").public_ip_url, None);
        assert_eq!(
            checker
                .with_public_ip_url("https://ip.example/json")
                .public_ip_url
                .as_deref(),
            Some("https://ip.example/json")
        );
    }

    #[tokio::test]
    async fn test_port_in_use_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_in_use(port).await);

        drop(listener);
        assert!(!port_in_use(port).await);
    }

    #[test]
    fn test_dependencies() {
        let all = check_dependencies(&["sh", "curl"], |_| true);
        assert!(all.ok);
        assert_eq!(all.message, "All required dependencies are installed: sh, curl");

        let some = check_dependencies(&["python3", "curl", "ip"], |c| c == "curl");
        assert!(!some.ok);
        assert_eq!(some.message, "Missing dependencies: python3, ip");
    }

    #[test]
    fn test_recommendations_follow_failures() {
        let network = combine_network(
            Some(Err("dns".into())),
            Some(None),
            &[4500, 8585],
            &[4500, 8585],
        );
        let deps = check_dependencies(&["iptables"], |_| false);
        let report = SystemCheckReport {
            checked_at: Utc::now().to_rfc3339(),
            system_info: SystemInfo {
                hostname: "pop-1".into(),
                system: "linux".into(),
                release: "6.1".into(),
                architecture: "x86_64".into(),
            },
            os: true,
            os_message: String::new(),
            memory: false,
            memory_message: String::new(),
            disk: true,
            disk_message: String::new(),
            network: network.ok,
            network_message: network.message,
            dependencies: deps.ok,
            dependencies_message: deps.message,
            all_checks_passed: false,
            recommendations: Vec::new(),
        };

        assert_eq!(
            recommendations(&report),
            vec![
                "Increase system memory to at least 2048 MB for optimal performance".to_string(),
                "Free up the following ports: 4500, 8585".to_string(),
                "Ensure the system has a working internet connection".to_string(),
                "Install missing dependencies: iptables".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_full_run_offline() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut checker = SystemChecker::new(tmp.path(), Vec::new());
        checker.required_ports.clear();

        let report = checker.run().await;
        assert!(report.network);
        assert_eq!(
            report.all_checks_passed,
            report.os && report.memory && report.disk && report.dependencies
        );
        let doc = serde_json::to_value(&report).unwrap();
        assert!(doc["system_info"]["architecture"].is_string());
        assert!(doc["recommendations"].is_array());
    }
}
