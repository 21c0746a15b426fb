use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, error, info, instrument};

use crate::splitter::config::SplitConfig;
use crate::splitter::credentials::CredentialProvider;
use crate::splitter::error::{Result, ToolError};
use crate::splitter::group::group_rows;
use crate::splitter::io::SpreadsheetEngine;
use crate::splitter::io::excel_write::GroupWriter;
use crate::splitter::model::{Group, Worksheet};
use crate::splitter::naming::FilenameRegistry;
use crate::splitter::resolve::{resolve, resolve_column};
use crate::splitter::session::SessionManager;

/// A group whose output file could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedGroup {
    pub key: String,
    pub file: String,
    pub error: String,
}

/// Outcome of one split run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub output_dir: PathBuf,
    pub worksheet: String,
    pub source_rows: usize,
    pub total_groups: usize,
    /// Files written, in group order.
    pub written: Vec<String>,
    pub failed: Vec<FailedGroup>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Writes the summary as pretty JSON.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

/// Splits the configured worksheet into one workbook per group under `output_dir`.
///
/// Everything up to and including column resolution is fatal. After that a
/// group that fails to save is logged and recorded in the summary while the
/// remaining groups are still written.
#[instrument(
    level = "info",
    skip_all,
    fields(input = %config.input_path.display(), output = %output_dir.display())
)]
pub fn split_workbook<E, C>(
    engine: E,
    credentials: &mut C,
    config: &SplitConfig,
    output_dir: &Path,
) -> Result<RunSummary>
where
    E: SpreadsheetEngine,
    C: CredentialProvider + ?Sized,
{
    if !config.input_path.is_file() {
        return Err(ToolError::MissingInput(config.input_path.clone()));
    }

    let worksheet = {
        let mut session = SessionManager::new(config.max_password_attempts).open(
            engine,
            &config.input_path,
            config.password.clone(),
            credentials,
        )?;
        resolve(session.document_mut(), &config.worksheet_name)?
    };
    let column = resolve_column(&worksheet, &config.group_column_name)?;

    let Worksheet { name, header, rows } = worksheet;
    let source_rows = rows.len();
    let groups = group_rows(rows, column);
    info!(rows = source_rows, groups = groups.len(), "rows grouped");

    fs::create_dir_all(output_dir)?;
    let registry = FilenameRegistry::new();
    let jobs: Vec<(Group, String)> = groups
        .into_iter()
        .map(|group| {
            let file = registry.allocate(&config.file_prefix, &group.key);
            (group, file)
        })
        .collect();

    let writer = GroupWriter::new(&header, &name);
    debug!(ordinal_column = ?writer.ordinal_column(), "output layout prepared");

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .map_err(|error| ToolError::WorkerPool(error.to_string()))?;

    let total = jobs.len();
    let outcomes: Vec<std::result::Result<String, FailedGroup>> = pool.install(|| {
        jobs.par_iter()
            .enumerate()
            .map(|(index, (group, file))| {
                match writer.write(group, &output_dir.join(file)) {
                    Ok(()) => {
                        info!("[{}/{}] wrote {} ({} rows)", index + 1, total, file, group.len());
                        Ok(file.clone())
                    }
                    Err(err) => {
                        error!("[{}/{}] failed to write {}: {}", index + 1, total, file, err);
                        Err(FailedGroup {
                            key: group.key.clone(),
                            file: file.clone(),
                            error: err.to_string(),
                        })
                    }
                }
            })
            .collect()
    });

    let mut written = Vec::new();
    let mut failed = Vec::new();
    for outcome in outcomes {
        match outcome {
            Ok(file) => written.push(file),
            Err(failure) => failed.push(failure),
        }
    }

    let summary = RunSummary {
        output_dir: output_dir.to_path_buf(),
        worksheet: name,
        source_rows,
        total_groups: total,
        written,
        failed,
    };
    info!(
        total = summary.total_groups,
        written = summary.written.len(),
        failed = summary.failed.len(),
        "split finished"
    );
    Ok(summary)
}
