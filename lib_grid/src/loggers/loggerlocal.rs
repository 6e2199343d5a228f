use super::logrecord::Logrecord;
use chrono::Local;
use colored::*;
use glob::glob;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
/// # Logger Local Options
///
/// Where and at which levels `LoggerLocal` writes.
pub struct LoggerLocalOptions {
    /// Levels printed to the TTY (console).
    pub use_tty: Option<Vec<i64>>,
    /// Levels appended to the log file.
    pub use_file: Option<Vec<i64>>,
    /// Directory for log files. If `None`, defaults to the executable's directory.
    pub log_dir: Option<PathBuf>,
}

/// Application logger shared (`Arc`) by the source clients.
///
/// Every record is also emitted as a `tracing` event, so an installed
/// subscriber sees feed diagnostics alongside the core's own events.
pub struct LoggerLocal {
    /// The name of the application associated with this logger instance.
    app_name: String,
    options: LoggerLocalOptions,
    /// The path to the currently active log file, if file logging is enabled.
    current_log_file: Option<PathBuf>,
    /// Serialises appends so concurrent fetches do not interleave lines.
    file_lock: Mutex<()>,
}

impl LoggerLocal {
    /// Keeps only the newest `<app_name>-*.log` in `log_dir`.
    ///
    /// File names embed a sortable timestamp, so the lexically greatest name
    /// is the newest.
    fn rotate_logs(app_name: &str, log_dir: &Path) {
        let pattern = format!("{}/{}-*.log", log_dir.display(), app_name);
        let Ok(entries) = glob(&pattern) else {
            eprintln!("Invalid log rotation pattern {}", pattern);
            return;
        };

        let mut log_files: Vec<PathBuf> = entries.filter_map(Result::ok).collect();
        log_files.sort_by(|a, b| b.file_name().cmp(&a.file_name()));

        for old_file in log_files.iter().skip(1) {
            if let Err(e) = std::fs::remove_file(old_file) {
                eprintln!("Error deleting old log file {}: {}", old_file.display(), e);
            }
        }
    }

    /// Creates a new `LoggerLocal`.
    ///
    /// With `None` options, warnings and above go to the TTY and nothing is
    /// written to disk. When file logging is enabled the log directory is
    /// created, older logs are rotated away and a timestamped file is chosen.
    pub fn new(app_name: String, options: Option<LoggerLocalOptions>) -> Self {
        let opts = options.unwrap_or_else(|| LoggerLocalOptions {
            use_tty: Some(vec![6, 5, 4]),
            use_file: None,
            log_dir: None,
        });

        let mut logger = Self {
            app_name: app_name.clone(),
            options: opts,
            current_log_file: None,
            file_lock: Mutex::new(()),
        };

        if logger.options.use_file.is_some() {
            let log_base_dir = logger.options.log_dir.clone().unwrap_or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|p| p.parent().map(Path::to_path_buf))
                    .unwrap_or_else(|| PathBuf::from("."))
            });

            if let Err(e) = std::fs::create_dir_all(&log_base_dir) {
                eprintln!("Error creating log directory {}: {}", log_base_dir.display(), e);
            }

            LoggerLocal::rotate_logs(&app_name, &log_base_dir);

            let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
            let current_log_filename = format!("{}-{}.log", app_name, timestamp);
            logger.current_log_file = Some(log_base_dir.join(current_log_filename));
        }

        logger
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Path of the active log file, when file logging is on.
    pub fn current_log_file(&self) -> Option<&Path> {
        self.current_log_file.as_deref()
    }

    fn emit_tracing(&self, record: &Logrecord) {
        let app = self.app_name.as_str();
        let text = record.message.text.as_str();
        let tags = if record.has_tags() { record.tags.to_string() } else { String::new() };
        match record.loglevel {
            i64::MIN..=1 => tracing::trace!(app, tags = %tags, "{}", text),
            2 => tracing::debug!(app, tags = %tags, "{}", text),
            3 => tracing::info!(app, tags = %tags, "{}", text),
            4 => tracing::warn!(app, tags = %tags, "{}", text),
            _ => tracing::error!(app, tags = %tags, "{}", text),
        }
    }

    fn print_tty(&self, record: &Logrecord) {
        let ts = record.rfc9557.as_str().truecolor(128, 128, 128);
        let app_name_colored = format!("[{}]", self.app_name).truecolor(128, 128, 128);
        let text = record.message.text.as_str();
        let colored_message = match record.loglevel {
            6 => text.bright_white().on_bright_red(),
            5 => text.bright_red(),
            4 => text.bright_yellow(),
            3 => text.bright_green(),
            2 => text.bright_white(),
            1 => text.bright_cyan(),
            _ => text.blue(),
        };

        println!("{}{}\n{}", ts, app_name_colored, colored_message);
        if record.has_tags() {
            if let Ok(tags_str) = serde_json::to_string(&record.tags) {
                println!("{}{}{}", ts, app_name_colored, tags_str.truecolor(128, 128, 128));
            }
        }
    }

    fn append_file(&self, record: &Logrecord) {
        let Some(log_file_path) = &self.current_log_file else {
            return;
        };
        let _guard = self.file_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_file_path)
            .and_then(|mut file| writeln!(file, "{}", record.file_line()));
        if let Err(e) = written {
            eprintln!("Error writing log file {}: {}", log_file_path.display(), e);
        }
    }

    /// Logs `log_message` at `log_level` to every destination enabled for
    /// that level, plus a `tracing` event.
    pub async fn log(&self, log_level: i64, log_message: &str, log_extras: Option<Value>) {
        let record = Logrecord::new(&self.app_name, log_level, log_message, log_extras);

        self.emit_tracing(&record);

        if let Some(tty_levels) = &self.options.use_tty {
            if tty_levels.contains(&log_level) {
                self.print_tty(&record);
            }
        }

        if let Some(file_levels) = &self.options.use_file {
            if file_levels.contains(&log_level) {
                self.append_file(&record);
            }
        }
    }

    pub async fn silly(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(0, log_message, log_extras).await;
    }

    pub async fn trace(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(1, log_message, log_extras).await;
    }

    pub async fn debug(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(2, log_message, log_extras).await;
    }

    pub async fn info(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(3, log_message, log_extras).await;
    }

    /// Logs at "warn" (4): something unusual that does not stop the fetch,
    /// such as CSV parse warnings.
    pub async fn warn(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(4, log_message, log_extras).await;
    }

    /// Logs at "error" (5): a failed request.
    pub async fn error(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(5, log_message, log_extras).await;
    }

    pub async fn fatal(&self, log_message: &str, log_extras: Option<Value>) {
        self.log(6, log_message, log_extras).await;
    }
}

impl std::fmt::Debug for LoggerLocal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggerLocal")
            .field("app_name", &self.app_name)
            .field("current_log_file", &self.current_log_file)
            .finish()
    }
}
