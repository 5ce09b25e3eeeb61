//! Logging configuration
//!
//! Carried by the engine host; the binary feeds this into its
//! tracing-subscriber setup. The engine itself only ever logs through the
//! `tracing` macros.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Log files kept before cleanup removes the oldest
const KEPT_LOG_FILES: usize = 5;

/// Logging switches and paths
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// Default level directive (`error`..`trace`)
    pub level: String,
    /// Mirror logs to stderr
    pub console_output: bool,
    /// Write logs to a file under `log_dir`
    pub file_output: bool,
    /// Directory for log files
    pub log_dir: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl LogConfig {
    /// Parse the configured level, defaulting to INFO on nonsense
    pub fn parse_level(&self) -> tracing::level_filters::LevelFilter {
        self.level
            .parse()
            .unwrap_or(tracing::level_filters::LevelFilter::INFO)
    }

    /// Path of the current log file
    pub fn current_log_path(&self) -> PathBuf {
        self.log_dir.join("soundflow.log")
    }

    /// Create the log directory if needed
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.log_dir)
    }

    /// Delete rotated logs beyond the retention count
    pub fn cleanup_old_logs(&self) -> std::io::Result<()> {
        let mut logs: Vec<PathBuf> = std::fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| is_log_file(p))
            .collect();
        logs.sort();
        while logs.len() > KEPT_LOG_FILES {
            let oldest = logs.remove(0);
            std::fs::remove_file(oldest)?;
        }
        Ok(())
    }
}

fn is_log_file(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == "log")
}
