use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default)]
#[clap(about = "Polls REST endpoints and republishes them as topics", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "REST_ADAPTER_CONFIG_PATH", help = "Path to the JSON server configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "REST_ADAPTER_MODEL_PATH", help = "Path to the JSON5 file listing the services to poll.")]
    pub model_path: Option<PathBuf>,

    #[clap(long, env = "REST_ADAPTER_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "REST_ADAPTER_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,

    #[clap(long, env = "REST_ADAPTER_RELOAD_INTERVAL_SECONDS", help = "Seconds between checks of the model file for changes. 0 disables reloading.")]
    pub reload_interval_seconds: Option<u64>,

    #[clap(long, env = "REST_ADAPTER_SWEEP_INTERVAL_SECONDS", help = "Seconds between sweeps of unused topics.")]
    pub sweep_interval_seconds: Option<u64>,

    #[clap(long, env = "REST_ADAPTER_METRICS_INTERVAL_SECONDS", help = "Seconds between metrics summaries in the log.")]
    pub metrics_interval_seconds: Option<u64>,

    #[clap(long, env = "REST_ADAPTER_REQUEST_TIMEOUT_MS", help = "Timeout of each endpoint request in milliseconds.")]
    pub request_timeout_ms: Option<u64>,

    #[clap(long, env = "REST_ADAPTER_MAX_RETRIES", help = "Transient failures retried within one poll.")]
    pub max_retries: Option<u32>,

    #[clap(long, env = "REST_ADAPTER_MAX_TOPICS", help = "Maximum number of topics the local broker accepts.")]
    pub max_topics: Option<usize>,
}

/// Fully resolved settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub model_path: PathBuf,
    pub log_dir: PathBuf,
    pub log_level: String,
    pub reload_interval: Duration,
    pub sweep_interval: Duration,
    pub metrics_interval: Duration,
    pub request_timeout: Duration,
    pub max_retries: u32,
    pub max_topics: Option<usize>,
}

impl Config {
    // Values set in 'other' win over those in 'self'
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            model_path: other.model_path.or(self.model_path),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
            reload_interval_seconds: other.reload_interval_seconds.or(self.reload_interval_seconds),
            sweep_interval_seconds: other.sweep_interval_seconds.or(self.sweep_interval_seconds),
            metrics_interval_seconds: other.metrics_interval_seconds.or(self.metrics_interval_seconds),
            request_timeout_ms: other.request_timeout_ms.or(self.request_timeout_ms),
            max_retries: other.max_retries.or(self.max_retries),
            max_topics: other.max_topics.or(self.max_topics),
        }
    }

    fn defaults() -> Config {
        Config {
            model_path: Some(PathBuf::from("rest_adapter.model.json5")),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
            reload_interval_seconds: Some(30),
            sweep_interval_seconds: Some(60),
            metrics_interval_seconds: Some(300),
            request_timeout_ms: Some(10_000),
            max_retries: Some(0),
            ..Default::default()
        }
    }

    pub fn settings(&self) -> Settings {
        let defaults = Config::defaults().merge(self.clone());
        Settings {
            model_path: defaults.model_path.unwrap_or_default(),
            log_dir: defaults.log_dir.unwrap_or_default(),
            log_level: defaults.log_level.unwrap_or_default(),
            reload_interval: Duration::from_secs(defaults.reload_interval_seconds.unwrap_or_default()),
            sweep_interval: Duration::from_secs(defaults.sweep_interval_seconds.unwrap_or_default()),
            metrics_interval: Duration::from_secs(defaults.metrics_interval_seconds.unwrap_or_default()),
            request_timeout: Duration::from_millis(defaults.request_timeout_ms.unwrap_or_default()),
            max_retries: defaults.max_retries.unwrap_or_default(),
            max_topics: defaults.max_topics,
        }
    }
}

/// A message about the configuration sources, held back until logging is up.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigNote {
    pub level: log::Level,
    pub message: String,
}

impl ConfigNote {
    fn new(level: log::Level, message: String) -> Self {
        Self { level, message }
    }

    /// Sends the note to the logger configured by now.
    pub fn log(&self) {
        log::log!(self.level, "{}", self.message);
    }
}

pub fn load_config() -> (Config, Vec<ConfigNote>) {
    let cli_args = Config::parse();
    merge_sources(cli_args)
}

/// Layers defaults, the server configuration file and the CLI/environment values.
fn merge_sources(cli_args: Config) -> (Config, Vec<ConfigNote>) {
    let config_file_path = cli_args
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from("server_rest_adapter.conf"));

    let mut current_config = Config::defaults();
    let mut notes = Vec::new();

    if config_file_path.exists() {
        match fs::read_to_string(&config_file_path) {
            Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
                Ok(file_config) => current_config = current_config.merge(file_config),
                Err(e) => notes.push(ConfigNote::new(
                    log::Level::Warn,
                    format!(
                        "Failed to parse config file {}: {}. Falling back to other sources.",
                        config_file_path.display(),
                        e
                    ),
                )),
            },
            Err(e) => notes.push(ConfigNote::new(
                log::Level::Warn,
                format!(
                    "Failed to read config file {}: {}. Falling back to other sources.",
                    config_file_path.display(),
                    e
                ),
            )),
        }
    } else {
        notes.push(ConfigNote::new(
            log::Level::Info,
            format!(
                "Config file not found at {}. Using defaults and environment/CLI variables.",
                config_file_path.display()
            ),
        ));
    }

    (current_config.merge(cli_args), notes)
}
