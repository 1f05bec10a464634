use std::path::{Path, PathBuf};

use once_cell::sync::OnceCell;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

static INIT: OnceCell<()> = OnceCell::new();

/// Crates whose events pass the default filter.
const CRATE_TARGETS: [&str; 3] = ["writeflow_ai_harness", "writeflow_core", "writeflow_server"];

const DEFAULT_JSON_FILE: &str = "writeflow.logs.jsonl";

/// Parses the boolean spellings accepted by `WRITEFLOW_*` flags.
pub fn parse_bool_env(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "enabled" => Some(true),
        "0" | "false" | "no" | "off" | "disabled" => Some(false),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogSink {
    /// Compact human-readable lines on stdout.
    Console,
    /// One JSON object per line, appended to the file.
    JsonFile(PathBuf),
}

/// Where run events go and how loud they are.
///
/// Read from the environment:
/// - `WRITEFLOW_OBSERVABILITY_ENABLED` or `WRITEFLOW_OBSERVABILITY`: off switch, default on.
/// - `WRITEFLOW_LOG_LEVEL`: filter directives, e.g. `writeflow_core=debug`.
/// - `RUST_LOG`: used when `WRITEFLOW_LOG_LEVEL` is unset or does not parse.
/// - `WRITEFLOW_JSON_LOG_PATH`: switches the sink to a JSONL file.
///
/// Without an explicit filter only the writeflow crates log at `info`
/// (`debug` in diagnostics mode) and every dependency stays at `warn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    pub enabled: bool,
    pub filter: Option<String>,
    pub sink: LogSink,
    pub diagnostics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            filter: None,
            sink: LogSink::Console,
            diagnostics: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let enabled = ["WRITEFLOW_OBSERVABILITY_ENABLED", "WRITEFLOW_OBSERVABILITY"]
            .into_iter()
            .find_map(&lookup)
            .map(|value| parse_bool_env(&value).unwrap_or(true))
            .unwrap_or(true);
        let filter = ["WRITEFLOW_LOG_LEVEL", "RUST_LOG"]
            .into_iter()
            .filter_map(&lookup)
            .map(|value| value.trim().to_string())
            .find(|value| !value.is_empty() && EnvFilter::try_new(value).is_ok());
        let sink = lookup("WRITEFLOW_JSON_LOG_PATH")
            .map(|path| path.trim().to_string())
            .filter(|path| !path.is_empty())
            .map_or(LogSink::Console, |path| LogSink::JsonFile(PathBuf::from(path)));
        Self {
            enabled,
            filter,
            sink,
            diagnostics: false,
        }
    }

    /// Raises the default writeflow level to `debug`. An explicit filter wins.
    pub fn diagnostics(mut self, on: bool) -> Self {
        self.diagnostics = on;
        self
    }

    pub fn directives(&self) -> String {
        if let Some(filter) = &self.filter {
            return filter.clone();
        }
        let level = if self.diagnostics { "debug" } else { "info" };
        let mut directives = String::from("warn");
        for target in CRATE_TARGETS {
            directives.push_str(&format!(",{target}={level}"));
        }
        directives
    }

    fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_new(self.directives()).unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn split_log_path(path: &Path) -> (&Path, &str) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(DEFAULT_JSON_FILE);
    (dir, file_name)
}

/// Installs the global subscriber once per process; later calls are no-ops.
pub fn init_observability(config: &ObservabilityConfig) {
    INIT.get_or_init(|| {
        if !config.enabled {
            return;
        }
        let env_filter = config.env_filter();
        match &config.sink {
            LogSink::JsonFile(path) => {
                let (dir, file_name) = split_log_path(path);
                let _ = std::fs::create_dir_all(dir);
                let writer = tracing_appender::rolling::never(dir, file_name);
                let json_layer = tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_target(config.diagnostics)
                    .with_writer(writer);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(json_layer)
                    .try_init();
            }
            LogSink::Console => {
                let console_layer = tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.diagnostics)
                    .with_writer(std::io::stdout);
                let _ = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(console_layer)
                    .try_init();
            }
        }
    });
}
