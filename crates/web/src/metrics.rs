//! Host metrics for the dashboard
//!
//! CPU, memory and uptime come from `/proc`; disk usage is measured on the
//! filesystem holding the data directory. A figure the host cannot provide
//! is reported as `null`.

use crate::system_check::{disk_space, meminfo_kb};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Gap between the two `/proc/stat` samples used for CPU usage
pub const CPU_SAMPLE_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HostMetrics {
    pub cpu_percent: Option<f64>,
    pub memory_percent: Option<f64>,
    pub disk_percent: Option<f64>,
    pub uptime_seconds: Option<u64>,
    /// `uptime -p` style text, e.g. "up 2 days, 3 hours, 4 minutes"
    pub uptime: Option<String>,
}

/// Aggregate jiffies from the `cpu` line of `/proc/stat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    pub idle: u64,
    pub total: u64,
}

/// Parse the aggregate `cpu` line. Guest time is already counted in user
/// time, so only the first eight columns are summed.
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .take(8)
        .map(str::parse::<u64>)
        .collect::<Result<_, _>>()
        .ok()?;
    if fields.len() < 4 {
        return None;
    }

    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some(CpuTimes {
        idle,
        total: fields.iter().sum(),
    })
}

/// Busy share between two samples, in percent.
pub fn cpu_percent(prev: CpuTimes, next: CpuTimes) -> Option<f64> {
    let total = next.total.checked_sub(prev.total)?;
    if total == 0 {
        return None;
    }
    let idle = next.idle.saturating_sub(prev.idle).min(total);
    Some(round1((total - idle) as f64 * 100.0 / total as f64))
}

/// Used memory in percent. Prefers `MemAvailable`, falling back to
/// `MemFree + Buffers + Cached` on kernels without it.
pub fn memory_percent(meminfo: &str) -> Option<f64> {
    let total = meminfo_kb(meminfo, "MemTotal").filter(|t| *t > 0)?;
    let available = meminfo_kb(meminfo, "MemAvailable").or_else(|| {
        let free = meminfo_kb(meminfo, "MemFree")?;
        Some(
            free + meminfo_kb(meminfo, "Buffers").unwrap_or(0)
                + meminfo_kb(meminfo, "Cached").unwrap_or(0),
        )
    })?;
    let used = total.saturating_sub(available);
    Some(round1(used as f64 * 100.0 / total as f64))
}

pub fn disk_percent(available: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    let used = total.saturating_sub(available);
    Some(round1(used as f64 * 100.0 / total as f64))
}

/// Whole seconds since boot from `/proc/uptime`
pub fn parse_uptime(contents: &str) -> Option<u64> {
    let secs: f64 = contents.split_whitespace().next()?.parse().ok()?;
    (secs.is_finite() && secs >= 0.0).then_some(secs as u64)
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;

    let plural = |n: u64, unit: &str| {
        if n == 1 {
            format!("1 {}", unit)
        } else {
            format!("{} {}s", n, unit)
        }
    };

    let mut parts = Vec::new();
    if days > 0 {
        parts.push(plural(days, "day"));
    }
    if hours > 0 {
        parts.push(plural(hours, "hour"));
    }
    if minutes > 0 || parts.is_empty() {
        parts.push(plural(minutes, "minute"));
    }
    format!("up {}", parts.join(", "))
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

async fn read_proc(path: &str) -> Option<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Some(contents),
        Err(e) => {
            debug!("Cannot read {}: {}", path, e);
            None
        }
    }
}

async fn sample_cpu() -> Option<f64> {
    let first = parse_cpu_times(&read_proc("/proc/stat").await?)?;
    tokio::time::sleep(CPU_SAMPLE_INTERVAL).await;
    let second = parse_cpu_times(&read_proc("/proc/stat").await?)?;
    cpu_percent(first, second)
}

/// Take a fresh reading of the local host.
pub async fn collect(data_dir: &Path) -> HostMetrics {
    let cpu_percent = sample_cpu().await;
    let memory_percent = read_proc("/proc/meminfo")
        .await
        .and_then(|m| memory_percent(&m));
    let disk_percent = match disk_space(data_dir) {
        Ok((available, total)) => disk_percent(available, total),
        Err(e) => {
            debug!("Disk usage of {} unavailable: {}", data_dir.display(), e);
            None
        }
    };
    let uptime_seconds = read_proc("/proc/uptime")
        .await
        .and_then(|u| parse_uptime(&u));

    HostMetrics {
        cpu_percent,
        memory_percent,
        disk_percent,
        uptime_seconds,
        uptime: uptime_seconds.map(format_uptime),
    }
}
