// CPU and memory utilisation from procfs

use crate::types::SystemInfo;
use std::fs;
use std::io;
use std::path::PathBuf;

/// Aggregate jiffies from the first `cpu` line of /proc/stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub active: u64,
    pub total: u64,
}

/// Active = user + nice + system + irq + softirq; total adds idle + iowait
pub fn parse_cpu_times(stat: &str) -> Option<CpuTimes> {
    let line = stat.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .map(|f| f.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    if fields.len() < 7 {
        return None;
    }

    let (user, nice, system, idle, iowait, irq, softirq) = (
        fields[0], fields[1], fields[2], fields[3], fields[4], fields[5], fields[6],
    );
    let active = user + nice + system + irq + softirq;
    Some(CpuTimes {
        active,
        total: active + idle + iowait,
    })
}

/// Used share of memory, `MemTotal - MemAvailable`, as a percentage
pub fn parse_memory_percent(meminfo: &str) -> Option<f64> {
    let field = |name: &str| -> Option<u64> {
        meminfo
            .lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };

    let total = field("MemTotal:")?;
    let available = field("MemAvailable:")?;
    if total == 0 {
        return None;
    }
    Some(total.saturating_sub(available) as f64 * 100.0 / total as f64)
}

pub fn cpu_percent(previous: CpuTimes, current: CpuTimes) -> f64 {
    let total = current.total.saturating_sub(previous.total);
    if total == 0 {
        return 0.0;
    }
    let active = current.active.saturating_sub(previous.active);
    active as f64 * 100.0 / total as f64
}

/// Reports CPU usage since the previous sample
pub struct SystemMonitor {
    proc_root: PathBuf,
    previous: Option<CpuTimes>,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    pub fn with_proc_root(root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: root.into(),
            previous: None,
        }
    }

    fn read_cpu(&self) -> io::Result<CpuTimes> {
        let stat = fs::read_to_string(self.proc_root.join("stat"))?;
        parse_cpu_times(&stat)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unparseable /proc/stat"))
    }

    fn read_memory(&self) -> io::Result<f64> {
        let meminfo = fs::read_to_string(self.proc_root.join("meminfo"))?;
        parse_memory_percent(&meminfo)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "unparseable /proc/meminfo"))
    }

    /// The first sample reports CPU usage since boot
    pub fn sample(&mut self) -> io::Result<SystemInfo> {
        let current = self.read_cpu()?;
        let previous = self.previous.replace(current).unwrap_or_default();
        let memory_percent = self.read_memory()?;

        Ok(SystemInfo {
            cpu_percent: cpu_percent(previous, current),
            memory_percent,
        })
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  100 20 30 800 50 0 0 0 0 0\ncpu0 50 10 15 400 25 0 0 0 0 0\n";
    const MEMINFO: &str = "MemTotal:       1000000 kB\n\
                           MemFree:         100000 kB\n\
                           MemAvailable:    250000 kB\n";

    #[test]
    fn test_parse_cpu_times() {
        let times = parse_cpu_times(STAT).unwrap();
        assert_eq!(times.active, 150);
        assert_eq!(times.total, 1000);
        assert!(parse_cpu_times("intr 1 2 3").is_none());
    }

    #[test]
    fn test_parse_memory_percent() {
        assert_eq!(parse_memory_percent(MEMINFO), Some(75.0));
        assert_eq!(parse_memory_percent("MemTotal: 10 kB\n"), None);
    }

    #[test]
    fn test_cpu_percent_between_samples() {
        let a = CpuTimes { active: 100, total: 1000 };
        let b = CpuTimes { active: 150, total: 1200 };
        assert_eq!(cpu_percent(a, b), 25.0);
        assert_eq!(cpu_percent(b, b), 0.0);
    }

    #[test]
    fn test_sample_from_fake_proc() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("stat"), STAT).unwrap();
        fs::write(dir.path().join("meminfo"), MEMINFO).unwrap();

        let mut monitor = SystemMonitor::with_proc_root(dir.path());
        let first = monitor.sample().unwrap();
        assert_eq!(first.cpu_percent, 15.0);
        assert_eq!(first.memory_percent, 75.0);

        fs::write(
            dir.path().join("stat"),
            "cpu  180 20 30 900 50 0 0 0 0 0\n",
        )
        .unwrap();
        let second = monitor.sample().unwrap();
        assert_eq!(second.cpu_percent, 80.0 * 100.0 / 180.0);
    }

    #[test]
    fn test_missing_proc_is_an_error() {
        let mut monitor = SystemMonitor::with_proc_root("/nonexistent/proc");
        assert!(monitor.sample().is_err());
    }
}
