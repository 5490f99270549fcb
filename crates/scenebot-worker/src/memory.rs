//! Resident memory checkpoints and disk space readings.

use std::path::Path;
use sysinfo::{Disks, Pid, ProcessesToUpdate, System};
use tracing::{debug, info};

const MB: f64 = 1024.0 * 1024.0;

/// Logs process RSS at named points of a job.
pub struct MemoryMonitor {
    system: System,
    pid: Option<Pid>,
    last: Option<u64>,
}

impl MemoryMonitor {
    pub fn new() -> Self {
        let pid = match sysinfo::get_current_pid() {
            Ok(pid) => Some(pid),
            Err(e) => {
                debug!("Memory monitoring unavailable: {}", e);
                None
            }
        };
        Self {
            system: System::new(),
            pid,
            last: None,
        }
    }

    /// Current resident set size in bytes, if the platform reports it.
    pub fn current_rss(&mut self) -> Option<u64> {
        let pid = self.pid?;
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system.process(pid).map(|p| p.memory())
    }

    /// Log current RSS and the change since the previous checkpoint.
    pub fn checkpoint(&mut self, label: &str) -> Option<u64> {
        let Some(rss) = self.current_rss() else {
            debug!("Memory usage [{}]: unavailable", label);
            return None;
        };

        let mb = |bytes: u64| bytes as f64 / MB;
        match self.last {
            Some(previous) => info!(
                "Memory usage [{}]: {:.1} MB ({:+.1} MB)",
                label,
                mb(rss),
                mb(rss) - mb(previous)
            ),
            None => info!("Memory usage [{}]: {:.1} MB", label, mb(rss)),
        }
        self.last = Some(rss);
        Some(rss)
    }
}

impl Default for MemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Space on the volume holding `dir`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiskSpace {
    pub total_bytes: u64,
    pub available_bytes: u64,
}

impl DiskSpace {
    /// Read the volume whose mount point is the longest prefix of `dir`.
    pub fn for_path(dir: &Path) -> Option<Self> {
        let dir = dir.canonicalize().ok()?;
        let disks = Disks::new_with_refreshed_list();
        disks
            .list()
            .iter()
            .filter(|disk| dir.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| Self {
                total_bytes: disk.total_space(),
                available_bytes: disk.available_space(),
            })
    }

    pub fn used_bytes(&self) -> u64 {
        self.total_bytes.saturating_sub(self.available_bytes)
    }
}

/// Log free space on the volume holding `dir`.
pub fn log_disk_space(dir: &Path) -> Option<DiskSpace> {
    let Some(space) = DiskSpace::for_path(dir) else {
        debug!("Disk space for {}: unavailable", dir.display());
        return None;
    };

    let percent = |bytes: u64| match space.total_bytes {
        0 => 0.0,
        total => bytes as f64 / total as f64 * 100.0,
    };
    info!(
        "Disk space for {}: {:.1} MB free ({:.1}%), {:.1} MB used of {:.1} MB",
        dir.display(),
        space.available_bytes as f64 / MB,
        percent(space.available_bytes),
        space.used_bytes() as f64 / MB,
        space.total_bytes as f64 / MB
    );
    Some(space)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_checkpoints_track_previous_reading() {
        let mut monitor = MemoryMonitor::new();
        let first = monitor.checkpoint("start");
        let _buffer = vec![1u8; 8 * 1024 * 1024];
        let second = monitor.checkpoint("after allocation");

        // Platforms without process info report nothing at all
        assert_eq!(first.is_some(), second.is_some());
        assert_eq!(monitor.last, second);
    }

    #[test]
    fn test_disk_space_for_existing_dir() {
        let dir = TempDir::new().unwrap();
        // Sandboxes without a mount table report nothing at all
        if let Some(space) = log_disk_space(dir.path()) {
            assert!(space.available_bytes <= space.total_bytes);
            assert_eq!(
                space.used_bytes(),
                space.total_bytes - space.available_bytes
            );
        }
    }

    #[test]
    fn test_disk_space_for_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert_eq!(log_disk_space(&dir.path().join("missing")), None);
    }
}
