//! Run statistics and their append-only report file

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;

use fpsi_core::CommStats;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Receiver,
    Sender,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Receiver => write!(f, "Receiver"),
            Role::Sender => write!(f, "Sender"),
        }
    }
}

/// Per-run summary: parameters, wall-clock time and traffic per phase.
#[derive(Debug, Clone)]
pub struct RunStats {
    pub role: Role,
    pub set_size: usize,
    pub d: usize,
    pub delta: usize,
    pub matches: usize,
    pub offline_time: Duration,
    pub online_time: Duration,
    pub offline_comm: CommStats,
    pub online_comm: CommStats,
}

impl RunStats {
    pub fn total_time(&self) -> Duration {
        self.offline_time + self.online_time
    }

    pub fn total_megabytes(&self) -> f64 {
        self.offline_comm.total_megabytes() + self.online_comm.total_megabytes()
    }

    /// Append the human-readable report. The file is a log, not an input
    /// to anything.
    pub fn append_to(&self, path: &Path) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        write!(file, "{self}")
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "========================================")?;
        writeln!(f, "Role: {}", self.role)?;
        writeln!(
            f,
            "Parameters: n={}, d={}, delta={}",
            self.set_size, self.d, self.delta
        )?;
        writeln!(f, "Matches: {}", self.matches)?;
        writeln!(f, "========================================")?;
        writeln!(f)?;

        writeln!(f, "Offline phase:")?;
        writeln!(f, "  time: {:.3} s", self.offline_time.as_secs_f64())?;
        writeln!(f, "  sent: {:.3} MB", self.offline_comm.megabytes_sent())?;
        writeln!(
            f,
            "  received: {:.3} MB",
            self.offline_comm.megabytes_received()
        )?;
        writeln!(f, "  total: {:.3} MB", self.offline_comm.total_megabytes())?;
        writeln!(f)?;

        writeln!(f, "Online phase:")?;
        writeln!(f, "  time: {:.3} s", self.online_time.as_secs_f64())?;
        writeln!(f, "  sent: {:.3} MB", self.online_comm.megabytes_sent())?;
        writeln!(
            f,
            "  received: {:.3} MB",
            self.online_comm.megabytes_received()
        )?;
        writeln!(f, "  total: {:.3} MB", self.online_comm.total_megabytes())?;
        writeln!(f)?;

        writeln!(f, "Total:")?;
        writeln!(f, "  time: {:.3} s", self.total_time().as_secs_f64())?;
        writeln!(f, "  traffic: {:.3} MB", self.total_megabytes())?;
        writeln!(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RunStats {
        RunStats {
            role: Role::Receiver,
            set_size: 256,
            d: 128,
            delta: 10,
            matches: 3,
            offline_time: Duration::from_millis(1500),
            online_time: Duration::from_millis(250),
            offline_comm: CommStats::new(1024 * 1024, 2048),
            online_comm: CommStats::new(4096, 8192),
        }
    }

    #[test]
    fn test_report_contains_sections() {
        let report = sample().to_string();
        assert!(report.contains("Role: Receiver"));
        assert!(report.contains("Parameters: n=256, d=128, delta=10"));
        assert!(report.contains("Offline phase:"));
        assert!(report.contains("Online phase:"));
        assert!(report.contains("Total:"));
    }

    #[test]
    fn test_append_is_cumulative() {
        let path = std::env::temp_dir().join(format!("fpsi_stats_test_{}.txt", std::process::id()));
        let _ = std::fs::remove_file(&path);

        sample().append_to(&path).unwrap();
        sample().append_to(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.matches("Role: Receiver").count(), 2);

        let _ = std::fs::remove_file(&path);
    }
}
