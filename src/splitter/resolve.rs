//! Locating the target worksheet and columns by name.
//!
//! Names are compared case-insensitively after trimming both sides, and the
//! first match in workbook (or header) order wins.

use tracing::debug;

use crate::splitter::error::{Result, ToolError};
use crate::splitter::io::SourceDocument;
use crate::splitter::model::{DataRow, HeaderRow, Worksheet};

/// Header of the optional ordinal column renumbered in every output file.
pub const ORDINAL_COLUMN: &str = "S.No.";

fn names_match(stored: &str, query: &str) -> bool {
    stored.trim().to_lowercase() == query.trim().to_lowercase()
}

/// Finds the named worksheet and copies its used range into memory.
///
/// Row 1 of the used range is the header; every following row is a data row.
pub fn resolve<D: SourceDocument + ?Sized>(document: &mut D, worksheet: &str) -> Result<Worksheet> {
    let name = document
        .sheet_names()
        .into_iter()
        .find(|candidate| names_match(candidate, worksheet))
        .ok_or_else(|| ToolError::WorksheetNotFound(worksheet.trim().to_string()))?;

    let range = document.used_range(&name)?;
    let first_data_row = range.first_row + 1;
    let mut rows = range.rows.into_iter();

    let header = HeaderRow::new(
        rows.next()
            .unwrap_or_default()
            .into_iter()
            .map(|cell| cell.trim().to_string())
            .collect(),
    );
    let rows: Vec<DataRow> = rows
        .enumerate()
        .map(|(offset, cells)| {
            let cells = cells.into_iter().map(|cell| cell.trim().to_string()).collect();
            DataRow::new(first_data_row + offset as u32, cells)
        })
        .collect();

    debug!(
        worksheet = %name,
        columns = header.len(),
        rows = rows.len(),
        "worksheet resolved"
    );
    Ok(Worksheet { name, header, rows })
}

/// 0-based index of the first header matching `column`.
pub fn find_column(header: &HeaderRow, column: &str) -> Option<usize> {
    header
        .columns
        .iter()
        .position(|candidate| names_match(candidate, column))
}

/// Like [`find_column`], but a missing column is an error.
pub fn resolve_column(worksheet: &Worksheet, column: &str) -> Result<usize> {
    find_column(&worksheet.header, column).ok_or_else(|| ToolError::ColumnNotFound {
        worksheet: worksheet.name.clone(),
        column: column.trim().to_string(),
    })
}

/// 0-based index of the ordinal column, if the header has one.
pub fn ordinal_column(header: &HeaderRow) -> Option<usize> {
    find_column(header, ORDINAL_COLUMN)
}
