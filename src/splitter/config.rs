//! Key=value configuration file and the resolved run configuration.

use std::fmt;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::level_filters::LevelFilter;

use crate::splitter::credentials::ConsolePrompt;
use crate::splitter::error::{Result, ToolError};
use crate::splitter::session::DEFAULT_MAX_PASSWORD_ATTEMPTS;

/// Log file name used when the configuration does not name one.
pub const DEFAULT_LOG_FILE: &str = "split.log";

/// Verbosity of the run log. Each level admits itself and every level before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error,
    #[default]
    Info,
    Debug,
}

impl FromStr for LogLevel {
    type Err = ToolError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ERROR" => Ok(LogLevel::Error),
            "INFO" => Ok(LogLevel::Info),
            "DEBUG" => Ok(LogLevel::Debug),
            _ => Err(ToolError::InvalidConfig {
                key: "LogLevel".to_string(),
                value: value.to_string(),
            }),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Debug => write!(f, "DEBUG"),
        }
    }
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
        }
    }
}

/// Values read from the configuration file. Every entry is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    pub input_excel_file: Option<String>,
    pub tab_name: Option<String>,
    pub column_name: Option<String>,
    pub password: Option<String>,
    pub log_file_name: Option<String>,
    pub log_level: Option<LogLevel>,
    pub file_prefix: Option<String>,
    /// Non-fatal problems found while parsing, reported once logging is up.
    pub warnings: Vec<String>,
}

impl ConfigFile {
    /// Loads `path`; a missing file yields an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                let mut config = Self::default();
                config
                    .warnings
                    .push(format!("configuration file {} not found", path.display()));
                Ok(config)
            }
            Err(error) => Err(error.into()),
        }
    }

    /// Parses `key=value` lines. Blank lines and `#`/`;` comments are skipped,
    /// keys are case-insensitive, and the value keeps any further `=`.
    pub fn parse(text: &str) -> Result<Self> {
        let mut config = Self::default();

        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                config
                    .warnings
                    .push(format!("line {}: expected key=value, got '{line}'", index + 1));
                continue;
            };
            let key = key.trim();
            let value = value.trim().to_string();

            match key.to_ascii_lowercase().as_str() {
                "inputexcelfile" => config.input_excel_file = non_empty(value),
                "tabname" => config.tab_name = non_empty(value),
                "columnname" => config.column_name = non_empty(value),
                "password" => config.password = non_empty(value),
                "logfilename" => config.log_file_name = non_empty(value),
                "loglevel" => config.log_level = Some(value.parse()?),
                "fileprefix" => config.file_prefix = non_empty(value),
                _ => config
                    .warnings
                    .push(format!("unrecognised configuration key '{key}'")),
            }
        }

        Ok(config)
    }
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() { None } else { Some(value) }
}

/// Fully resolved, immutable settings for one split run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitConfig {
    pub input_path: PathBuf,
    pub worksheet_name: String,
    pub group_column_name: String,
    pub password: Option<String>,
    pub file_prefix: String,
    pub max_password_attempts: u32,
    /// Upper bound on concurrently written output files.
    pub workers: usize,
}

impl SplitConfig {
    pub fn new(
        input_path: impl Into<PathBuf>,
        worksheet_name: impl Into<String>,
        group_column_name: impl Into<String>,
    ) -> Self {
        Self {
            input_path: input_path.into(),
            worksheet_name: worksheet_name.into(),
            group_column_name: group_column_name.into(),
            password: None,
            file_prefix: String::new(),
            max_password_attempts: DEFAULT_MAX_PASSWORD_ATTEMPTS,
            workers: default_workers(),
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_max_password_attempts(mut self, attempts: u32) -> Self {
        self.max_password_attempts = attempts.max(1);
        self
    }
}

/// Available parallelism, or 1 when it cannot be determined.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(usize::from)
        .unwrap_or(1)
}

/// Invocation parameters that may be prompted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parameter {
    Input,
    Worksheet,
    Column,
}

impl Parameter {
    /// Name reported when the parameter cannot be resolved.
    pub fn key(self) -> &'static str {
        match self {
            Parameter::Input => "InputExcelFile",
            Parameter::Worksheet => "TabName",
            Parameter::Column => "ColumnName",
        }
    }

    fn question(self) -> &'static str {
        match self {
            Parameter::Input => "Input workbook",
            Parameter::Worksheet => "Worksheet name",
            Parameter::Column => "Column to split by",
        }
    }
}

/// Resolves one invocation parameter from the command line and configuration.
pub trait ParameterSource {
    fn resolve(
        &mut self,
        parameter: Parameter,
        explicit: Option<String>,
        configured: Option<&str>,
    ) -> Result<String>;
}

/// Takes the explicit value, else the configured one; never prompts.
#[derive(Debug, Default)]
pub struct NonInteractive;

impl ParameterSource for NonInteractive {
    fn resolve(
        &mut self,
        parameter: Parameter,
        explicit: Option<String>,
        configured: Option<&str>,
    ) -> Result<String> {
        explicit
            .or_else(|| configured.map(str::to_string))
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ToolError::MissingParameter(parameter.key()))
    }
}

impl<R: BufRead, W: Write> ParameterSource for ConsolePrompt<R, W> {
    fn resolve(
        &mut self,
        parameter: Parameter,
        explicit: Option<String>,
        configured: Option<&str>,
    ) -> Result<String> {
        if let Some(value) = explicit.filter(|value| !value.trim().is_empty()) {
            return Ok(value.trim().to_string());
        }
        self.ask(parameter.question(), configured)?
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or(ToolError::MissingParameter(parameter.key()))
    }
}
