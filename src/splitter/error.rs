use std::path::PathBuf;

use thiserror::Error;

/// Convenient alias for fallible results returned throughout the crate.
pub type Result<T> = std::result::Result<T, ToolError>;

/// Error type covering the different failure cases that can occur while a
/// workbook is opened, grouped, and split into per-group files.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Wrapper for IO failures such as reading or writing files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Raised when JSON serialization of the run summary fails.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors bubbled up from the Excel writer implementation.
    #[error("Excel write error: {0}")]
    ExcelWrite(#[from] rust_xlsxwriter::XlsxError),

    /// Errors bubbled up from the Excel reader implementation.
    #[error("Excel read error: {0}")]
    ExcelRead(#[from] calamine::Error),

    /// Raised when the user provides a path that does not exist.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    /// Raised when the spreadsheet engine cannot be started.
    #[error("spreadsheet engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Raised when every allowed password attempt was rejected.
    #[error("authentication failed after {attempts} attempt(s) for {path}")]
    AuthenticationFailed { path: PathBuf, attempts: u32 },

    /// Raised when a protected document is opened and no password is available.
    #[error("password required to open {}", .0.display())]
    PasswordRequired(PathBuf),

    /// Raised when the document cannot be opened for reasons other than the password.
    #[error("cannot open {path}: {reason}")]
    OpenFailed { path: PathBuf, reason: String },

    /// Raised when no worksheet matches the requested name.
    #[error("worksheet '{0}' not found")]
    WorksheetNotFound(String),

    /// Raised when the header row has no column with the requested name.
    #[error("column '{column}' not found in worksheet '{worksheet}'")]
    ColumnNotFound { worksheet: String, column: String },

    /// Raised when a required invocation parameter could not be resolved.
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// Raised when a configuration value cannot be interpreted.
    #[error("invalid configuration value for {key}: '{value}'")]
    InvalidConfig { key: String, value: String },

    /// Raised when the write-phase worker pool cannot be built.
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),

    /// Raised when the tracing subscriber fails to initialise.
    #[error("failed to initialise logging: {0}")]
    Logging(String),
}

impl ToolError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            ToolError::MissingInput(_) => 2,
            ToolError::EngineUnavailable(_) => 3,
            ToolError::AuthenticationFailed { .. } | ToolError::PasswordRequired(_) => 4,
            ToolError::WorksheetNotFound(_) => 5,
            ToolError::ColumnNotFound { .. } => 6,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_conditions_have_distinct_exit_codes() {
        let codes = [
            ToolError::MissingInput(PathBuf::from("a.xlsx")).exit_code(),
            ToolError::EngineUnavailable("gone".into()).exit_code(),
            ToolError::AuthenticationFailed {
                path: PathBuf::from("a.xlsx"),
                attempts: 3,
            }
            .exit_code(),
            ToolError::WorksheetNotFound("Tasks".into()).exit_code(),
            ToolError::ColumnNotFound {
                worksheet: "Tasks".into(),
                column: "Owner".into(),
            }
            .exit_code(),
        ];

        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
        assert!(codes.iter().all(|code| *code > 1));
        assert_eq!(ToolError::MissingParameter("sheet").exit_code(), 1);
    }
}
