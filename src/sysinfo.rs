//! Host snapshot written alongside run results
//!
//! Captured once at run start so results stay interpretable after the
//! fact. Detection is best effort: on Linux the values come from /proc,
//! elsewhere the placeholders make the gap explicit.

use serde::{Deserialize, Serialize};

/// Host description for reproducibility
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name
    pub os: String,
    /// Kernel release string
    pub kernel: String,
    /// CPU model
    pub cpu_model: String,
    /// Logical CPU count
    pub cpu_cores: usize,
    /// Total system memory in GB
    pub total_memory_gb: u64,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            kernel: "Unknown".to_string(),
            cpu_model: "Unknown".to_string(),
            cpu_cores: 0,
            total_memory_gb: 0,
        }
    }
}

impl SystemInfo {
    /// Capture a snapshot of the current host
    #[must_use]
    pub fn capture() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            kernel: kernel_release(),
            cpu_model: cpu_model(),
            cpu_cores: std::thread::available_parallelism().map_or(0, std::num::NonZero::get),
            total_memory_gb: total_memory_gb(),
        }
    }
}

/// Kernel release (best effort)
fn kernel_release() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(release) = std::fs::read_to_string("/proc/sys/kernel/osrelease") {
            return release.trim().to_string();
        }
    }
    "Unknown".to_string()
}

/// CPU model name (best effort)
fn cpu_model() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(content) = std::fs::read_to_string("/proc/cpuinfo") {
            for line in content.lines() {
                if line.starts_with("model name") {
                    if let Some(name) = line.split(':').nth(1) {
                        return name.trim().to_string();
                    }
                }
            }
        }
    }
    "Unknown".to_string()
}

/// Total system memory in GB (best effort)
fn total_memory_gb() -> u64 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(content) = std::fs::read_to_string("/proc/meminfo") {
            for line in content.lines() {
                if line.starts_with("MemTotal:") {
                    // MemTotal is in kB
                    if let Some(kb_str) = line.split_whitespace().nth(1) {
                        if let Ok(kb) = kb_str.parse::<u64>() {
                            return kb / 1_048_576;
                        }
                    }
                }
            }
        }
    }
    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_populates_os() {
        let info = SystemInfo::capture();
        assert!(!info.os.is_empty());
    }

    #[test]
    fn test_default_uses_placeholders() {
        let info = SystemInfo::default();
        assert_eq!(info.cpu_model, "Unknown");
        assert_eq!(info.cpu_cores, 0);
        assert_eq!(info.total_memory_gb, 0);
    }

    #[test]
    fn test_serializes_round_trip() {
        let info = SystemInfo::capture();
        let json = serde_json::to_string(&info).unwrap();
        let back: SystemInfo = serde_json::from_str(&json).unwrap();
        assert_eq!(back.os, info.os);
        assert_eq!(back.cpu_cores, info.cpu_cores);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_capture_reads_proc() {
        let info = SystemInfo::capture();
        assert_ne!(info.kernel, "Unknown");
        assert!(info.cpu_cores > 0);
    }
}
