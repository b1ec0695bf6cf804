//! Logging configuration shared by the binaries.

use std::fs::{self, File};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;

/// Logging settings; serialized as part of the app config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default log level when `RUST_LOG` is not set (trace/debug/info/warn/error).
    pub level: String,
    /// Mirror logs to stderr.
    pub console_output: bool,
    /// Write logs to a file under [`log_dir`](Self::log_dir).
    pub file_output: bool,
    /// Directory for log files.
    pub log_dir: PathBuf,
    /// How many old log files to retain.
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: true,
            log_dir: PathBuf::from("logs"),
            max_files: 5,
        }
    }
}

impl LogConfig {
    /// Parse the configured level, defaulting to INFO on unknown values.
    pub fn parse_level(&self) -> LevelFilter {
        match self.level.to_ascii_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" => LevelFilter::WARN,
            "error" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => LevelFilter::INFO,
        }
    }

    /// Path of the log file for this run.
    pub fn current_log_path(&self) -> PathBuf {
        self.log_dir
            .join(format!("homeglow-{}.log", std::process::id()))
    }

    /// Create the log directory if needed.
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.log_dir)
    }

    /// Open this run's log file, creating the directory and pruning runs
    /// beyond [`max_files`](Self::max_files) first.
    pub fn create_log_file(&self) -> std::io::Result<File> {
        self.ensure_log_directory()?;
        if let Err(e) = self.cleanup_old_logs() {
            // A failed prune must not block startup.
            eprintln!("warning: failed to clean up old log files: {e}");
        }
        File::create(self.current_log_path())
    }

    /// Delete the oldest log files beyond [`max_files`](Self::max_files).
    pub fn cleanup_old_logs(&self) -> std::io::Result<()> {
        let mut logs: Vec<_> = fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("homeglow-")
            })
            .collect();

        if logs.len() <= self.max_files {
            return Ok(());
        }

        // Oldest first by modification time.
        logs.sort_by_key(|entry| {
            entry
                .metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        });

        let excess = logs.len() - self.max_files;
        for entry in logs.into_iter().take(excess) {
            fs::remove_file(entry.path())?;
        }
        Ok(())
    }
}
