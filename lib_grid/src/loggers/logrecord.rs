use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::misc::utils::current_datetime_rfc9557;

/// Severity names indexed by numeric level (0 = silly .. 6 = fatal).
pub const LEVEL_NAMES: [&str; 7] = ["silly", "trace", "debug", "info", "warn", "error", "fatal"];

/// Name of a numeric level; out-of-range levels clamp to the nearest end.
pub fn level_name(level: i64) -> &'static str {
    LEVEL_NAMES[level.clamp(0, 6) as usize]
}

/// # Logrecord
///
/// One log entry as written to the TTY and to the log file. Feed diagnostics
/// put the endpoint and status into `tags`; payload contents never go here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Logrecord {
    /// Numeric severity, 0 (silly) to 6 (fatal).
    pub loglevel: i64,
    pub message: Message,
    pub app: App,
    /// Structured extras; an empty array when none were supplied.
    pub tags: Value,
    /// RFC 9557 formatted timestamp string.
    pub rfc9557: String,
}

impl Default for Logrecord {
    fn default() -> Self {
        Self {
            loglevel: 0,
            message: Message::default(),
            app: App::default(),
            tags: serde_json::json!([]),
            rfc9557: current_datetime_rfc9557(),
        }
    }
}

impl Logrecord {
    /// Builds a record stamped with the current time.
    pub fn new(app_name: &str, loglevel: i64, text: &str, tags: Option<Value>) -> Self {
        let mut record = Self::default();
        record.app.name = app_name.to_string();
        record.loglevel = loglevel;
        record.message.text = text.to_string();
        if let Some(extras) = tags {
            record.tags = extras;
        }
        record
    }

    /// True when extras were attached.
    pub fn has_tags(&self) -> bool {
        self.tags != serde_json::json!([]) && !self.tags.is_null()
    }

    /// The line written to the log file, extras appended as compact JSON.
    pub fn file_line(&self) -> String {
        let mut line = format!(
            "{} [{}] {} {}",
            self.rfc9557,
            self.app.name,
            level_name(self.loglevel).to_uppercase(),
            self.message.text
        );
        if self.has_tags() {
            if let Ok(tags) = serde_json::to_string(&self.tags) {
                line.push(' ');
                line.push_str(&tags);
            }
        }
        line
    }
}

/// The textual content of a log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub lang: String,
    pub text: String,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            text: String::new(),
            lang: "en".to_string(),
        }
    }
}

/// The process that produced the entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct App {
    pub pid: i64,
    pub name: String,
}

impl Default for App {
    /// Current pid, named after the executable's basename.
    fn default() -> Self {
        let name = std::env::current_exe()
            .ok()
            .and_then(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .unwrap_or_else(|| "lib_grid".to_string());
        Self {
            pid: std::process::id() as i64,
            name,
        }
    }
}
