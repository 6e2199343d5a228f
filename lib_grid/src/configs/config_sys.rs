use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fmt};

use chrono_tz::Tz;
use config::{ext::*, *};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::loggers::loggerlocal::LoggerLocalOptions;

const CONFIG_GLOBAL_NAME: &str = "config.global.json";

/// Prefix of environment variables bound onto configuration keys, with
/// `__` as the section separator (`GRID_freshness__nem_ms`).
pub const ENV_PREFIX: &str = "GRID_";

/// Well-known environment variables and the keys they override.
const ENV_OVERRIDES: [(&str, &str); 3] = [
    ("NEM_API_KEY", "nem_api_key"),
    ("NEM_BASE", "nem_base"),
    ("WEM_BASE", "wem_base"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error occurred: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to build the configuration: {0}")]
    LoadError(String),

    #[error("Configuration defaults cannot be flattened: {0}")]
    ShapeError(#[source] serde_json::Error),

    #[error("Failed to get the process basename")]
    MissingBasename,

    #[error("Unknown market timezone {0}")]
    InvalidTimezone(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Freshness thresholds per dataset family, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FreshnessConfig {
    pub nem_ms: u64,
    pub wem_ms: u64,
    pub wem_generation_ms: u64,
    pub static_ms: u64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            nem_ms: 270_000,
            wem_ms: 25 * 60 * 1000,
            wem_generation_ms: 55 * 60 * 1000,
            static_ms: 60 * 60 * 1000,
        }
    }
}

/// # Grid Config
///
/// Everything the source clients and the feed hub need at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub app_name: String,
    pub nem_base: String,
    pub wem_base: String,
    /// Sent as `x-api-key` on every NEM request.
    pub nem_api_key: String,
    pub request_timeout_ms: u64,
    pub retry_limit: u32,
    pub retry_status_codes: Vec<u16>,
    /// Width of one trading interval.
    pub interval_minutes: i64,
    pub freshness: FreshnessConfig,
    /// IANA name of the market clock.
    pub market_timezone: String,
    pub logger: LoggerLocalOptions,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            app_name: "lib_grid".to_string(),
            nem_base: "https://dashboards.public.aemo.com.au".to_string(),
            wem_base: "https://data.wa.aemo.com.au".to_string(),
            nem_api_key: String::new(),
            request_timeout_ms: 15_000,
            retry_limit: 1,
            retry_status_codes: vec![500, 502, 503, 504],
            interval_minutes: 30,
            freshness: FreshnessConfig::default(),
            market_timezone: "Australia/Brisbane".to_string(),
            logger: LoggerLocalOptions {
                use_tty: Some(vec![6, 5, 4]),
                use_file: None,
                log_dir: None,
            },
        }
    }
}

impl GridConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn interval_width(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.interval_minutes)
    }

    /// The market clock, parsed from `market_timezone`.
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        self.market_timezone
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidTimezone(self.market_timezone.clone()))
    }

    /// Rejects values no client could work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("request_timeout_ms must be positive".into()));
        }
        if self.interval_minutes <= 0 {
            return Err(ConfigError::Invalid("interval_minutes must be positive".into()));
        }
        if self.nem_base.trim().is_empty() || self.wem_base.trim().is_empty() {
            return Err(ConfigError::Invalid("base URLs must not be empty".into()));
        }
        self.timezone().map(|_| ())
    }
}

/// The configuration files considered for one process, in layering order.
/// Files that do not exist are kept as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSources {
    pub running_mode: Option<String>,
    pub config_dir: PathBuf,
    pub global_file: Option<PathBuf>,
    pub common_file: Option<PathBuf>,
    pub mode_file: Option<PathBuf>,
    pub platform_file: Option<PathBuf>,
}

impl ConfigSources {
    /// Resolves the layer files for `basename` inside `config_dir`.
    pub fn for_dir(config_dir: &Path, basename: &str, running_mode: Option<String>) -> Self {
        let existing = |name: String| {
            let path = config_dir.join(name);
            path.is_file().then_some(path)
        };

        let (mode_file, platform_file) = match &running_mode {
            Some(mode) => (
                existing(format!("{}.{}.json", basename, mode)),
                existing(format!("{}.{}.{}.json", basename, mode, env::consts::OS)),
            ),
            None => (None, None),
        };

        Self {
            global_file: existing(CONFIG_GLOBAL_NAME.to_string()),
            common_file: existing(format!("{}.common.json", basename)),
            mode_file,
            platform_file,
            running_mode,
            config_dir: config_dir.to_path_buf(),
        }
    }

    /// Existing layer files, lowest priority first.
    pub fn layers(&self) -> impl Iterator<Item = &PathBuf> {
        [&self.global_file, &self.common_file, &self.mode_file, &self.platform_file]
            .into_iter()
            .flatten()
    }

    /// Defaults overlaid with every existing layer, then the environment.
    pub fn load(&self) -> Result<GridConfig, ConfigError> {
        self.load_with_env(|name| env::var(name).ok())
    }

    /// Like [`ConfigSources::load`], resolving the well-known override
    /// variables through `lookup`.
    pub fn load_with_env<F>(&self, lookup: F) -> Result<GridConfig, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = default_pairs()?;
        let defaults: Vec<(&str, &str)> =
            defaults.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
        let overrides = env_override_pairs(lookup);
        let overrides: Vec<(&str, &str)> =
            overrides.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();

        let config_data: Box<dyn ConfigurationRoot> = DefaultConfigurationBuilder::new()
            .add_in_memory(defaults.as_slice())
            .add_json_file(&layer_path(&self.global_file).is().optional())
            .add_json_file(&layer_path(&self.common_file).is().optional())
            .add_json_file(&layer_path(&self.mode_file).is().optional())
            .add_json_file(&layer_path(&self.platform_file).is().optional())
            .add_env_vars_with_prefix(ENV_PREFIX)
            .add_in_memory(overrides.as_slice())
            .build()
            .map_err(|e| ConfigError::LoadError(format!("{:?}", e)))?;

        Ok(config_data.reify())
    }
}

impl fmt::Display for ConfigSources {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |p: &Option<PathBuf>| {
            p.as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_default()
        };
        write!(
            f,
            "ConfigSources
    Running mode: {},
    Config dir: {},
    Global file: {},
    Common file: {},
    Mode file: {},
    Platform file: {}
",
            self.running_mode.as_deref().unwrap_or(""),
            self.config_dir.display(),
            show(&self.global_file),
            show(&self.common_file),
            show(&self.mode_file),
            show(&self.platform_file),
        )
    }
}

fn layer_path(file: &Option<PathBuf>) -> String {
    file.as_ref()
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_default()
}

/// Scalar defaults of [`GridConfig`] as `section:key` pairs. Lists are left
/// to `#[serde(default)]`, since indexed keys from a lower layer would
/// survive a shorter list in a higher one.
fn default_pairs() -> Result<Vec<(String, String)>, ConfigError> {
    let defaults = serde_json::to_value(GridConfig::default()).map_err(ConfigError::ShapeError)?;
    let mut pairs = Vec::new();
    flatten_scalars("", &defaults, &mut pairs);
    Ok(pairs)
}

fn flatten_scalars(prefix: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{}:{}", prefix, key)
                };
                flatten_scalars(&path, child, pairs);
            }
        }
        Value::String(text) => pairs.push((prefix.to_string(), text.clone())),
        Value::Bool(_) | Value::Number(_) => pairs.push((prefix.to_string(), value.to_string())),
        Value::Null | Value::Array(_) => {}
    }
}

fn env_override_pairs<F>(lookup: F) -> Vec<(String, String)>
where
    F: Fn(&str) -> Option<String>,
{
    ENV_OVERRIDES
        .iter()
        .filter_map(|(var, key)| {
            lookup(var)
                .filter(|value| !value.trim().is_empty())
                .map(|value| (key.to_string(), value))
        })
        .collect()
}

fn get_process_basename(exe_path: &Path) -> Result<String, ConfigError> {
    exe_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or(ConfigError::MissingBasename)
}

fn get_running_mode(basename: &str) -> Option<String> {
    env::var(format!("RUNNING_MODE_{}", basename.to_uppercase()))
        .or_else(|_| env::var("RUNNING_MODE"))
        .ok()
        .filter(|mode| !mode.trim().is_empty())
}

/// Discovers the layer files for the running executable.
pub fn discover_sources() -> Result<ConfigSources, ConfigError> {
    let current_exe = env::current_exe()?;
    let basename = get_process_basename(&current_exe)?;
    let location = current_exe
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let config_dir = env::var("CONFIGS_LOCATION").map(PathBuf::from).unwrap_or(location);
    Ok(ConfigSources::for_dir(&config_dir, &basename, get_running_mode(&basename)))
}

/// Loads the full configuration: layered files, then `.env`, then the
/// process environment.
pub fn load_config() -> Result<GridConfig, ConfigError> {
    dotenvy::dotenv().ok();
    let sources = discover_sources()?;
    let config = sources.load()?;
    config.validate()?;
    Ok(config)
}
