use std::io::Cursor;
use std::path::Path;

use calamine::{DataType, Ods, Range, Reader, Sheets, Xls, Xlsb, Xlsx};
use chrono::{Duration, NaiveDate};
use tracing::debug;

use crate::splitter::error::{Result, ToolError};
use crate::splitter::io::crypto::{self, CryptoError};
use crate::splitter::io::{OpenError, SourceDocument, SpreadsheetEngine, UsedRange};

type Workbook = Sheets<Cursor<Vec<u8>>>;

/// Spreadsheet engine reading documents with calamine.
///
/// Documents are loaded fully into memory, so a session never holds an open
/// file handle. Agile-encrypted OOXML packages are decrypted before parsing.
#[derive(Debug, Default)]
pub struct CalamineEngine;

impl CalamineEngine {
    pub fn new() -> Self {
        Self
    }
}

impl SpreadsheetEngine for CalamineEngine {
    type Document = CalamineDocument;

    fn open(
        &mut self,
        path: &Path,
        password: Option<&str>,
    ) -> std::result::Result<CalamineDocument, OpenError> {
        let bytes = std::fs::read(path).map_err(|error| OpenError::Read(error.to_string()))?;

        if crypto::is_encrypted_package(&bytes) {
            let password = password.ok_or(OpenError::PasswordRequired)?;
            debug!(path = %path.display(), "decrypting protected package");
            let package = crypto::decrypt_package(&bytes, password).map_err(|error| match error {
                CryptoError::InvalidPassword => OpenError::WrongPassword,
                CryptoError::Unsupported(reason) => OpenError::Unsupported(reason),
                other => OpenError::Read(other.to_string()),
            })?;
            return open_xlsx(package);
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        let cursor = Cursor::new(bytes);
        let workbook = match extension.as_str() {
            "xlsx" | "xlsm" | "xltx" | "xltm" | "xlam" => return open_xlsx(cursor.into_inner()),
            "xls" | "xla" => Sheets::Xls(Xls::new(cursor).map_err(read_error)?),
            "xlsb" => Sheets::Xlsb(Xlsb::new(cursor).map_err(read_error)?),
            "ods" => Sheets::Ods(Ods::new(cursor).map_err(read_error)?),
            other => {
                return Err(OpenError::Unsupported(format!(
                    "unrecognised spreadsheet extension '{other}'"
                )));
            }
        };
        Ok(CalamineDocument { workbook })
    }
}

fn open_xlsx(bytes: Vec<u8>) -> std::result::Result<CalamineDocument, OpenError> {
    let workbook = Sheets::Xlsx(Xlsx::new(Cursor::new(bytes)).map_err(read_error)?);
    Ok(CalamineDocument { workbook })
}

fn read_error(error: impl std::fmt::Display) -> OpenError {
    OpenError::Read(error.to_string())
}

/// A workbook opened by [`CalamineEngine`].
pub struct CalamineDocument {
    workbook: Workbook,
}

impl SourceDocument for CalamineDocument {
    fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_owned()
    }

    fn used_range(&mut self, sheet: &str) -> Result<UsedRange> {
        let range = self
            .workbook
            .worksheet_range(sheet)
            .ok_or_else(|| ToolError::WorksheetNotFound(sheet.to_string()))??;
        Ok(range_to_text(&range))
    }
}

fn range_to_text(range: &Range<DataType>) -> UsedRange {
    let first_row = range.start().map(|(row, _)| row + 1).unwrap_or(1);
    let rows = range
        .rows()
        .map(|row| row.iter().map(|cell| cell_to_string(Some(cell))).collect())
        .collect();
    UsedRange { first_row, rows }
}

/// Renders a cell the way it reads on screen, trimmed.
pub(crate) fn cell_to_string(cell: Option<&DataType>) -> String {
    let text = match cell {
        Some(DataType::String(value)) => value.clone(),
        Some(DataType::Float(value)) => value.to_string(),
        Some(DataType::Int(value)) => value.to_string(),
        Some(DataType::Bool(value)) => value.to_string().to_uppercase(),
        Some(DataType::DateTime(serial)) => excel_serial_to_string(*serial),
        Some(DataType::Empty) | None => String::new(),
        Some(other) => other.to_string(),
    };
    text.trim().to_string()
}

/// Converts an Excel serial date (1900 system) to `yyyy-mm-dd[ HH:MM:SS]`.
fn excel_serial_to_string(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return serial.to_string();
    };
    let seconds = (serial * 86_400.0).round() as i64;
    match epoch.checked_add_signed(Duration::seconds(seconds)) {
        Some(moment) if seconds % 86_400 == 0 => moment.format("%Y-%m-%d").to_string(),
        Some(moment) => moment.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => serial.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use rust_xlsxwriter::Workbook as XlsxWorkbook;
    use tempfile::tempdir;

    use super::*;
    use crate::splitter::io::crypto::test_support::encrypt_package;

    fn sample_workbook() -> Vec<u8> {
        let mut workbook = XlsxWorkbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("Tasks").unwrap();
        sheet.write_string(0, 0, "  S.No. ").unwrap();
        sheet.write_string(0, 1, "Owner").unwrap();
        sheet.write_number(1, 0, 1).unwrap();
        sheet.write_string(1, 1, " bob ").unwrap();
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn reads_used_range_as_trimmed_text() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("plain.xlsx");
        std::fs::write(&path, sample_workbook()).expect("workbook written");

        let mut engine = CalamineEngine::new();
        let mut document = engine.open(&path, None).expect("opened");
        assert_eq!(document.sheet_names(), vec!["Tasks".to_string()]);

        let range = document.used_range("Tasks").expect("range");
        assert_eq!(range.first_row, 1);
        assert_eq!(
            range.rows,
            vec![
                vec!["S.No.".to_string(), "Owner".to_string()],
                vec!["1".to_string(), "bob".to_string()],
            ]
        );
    }

    #[test]
    fn password_is_ignored_for_unprotected_workbooks() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("plain.xlsx");
        std::fs::write(&path, sample_workbook()).expect("workbook written");

        let mut engine = CalamineEngine::new();
        assert!(engine.open(&path, Some("unused")).is_ok());
    }

    #[test]
    fn opens_encrypted_workbook_only_with_the_right_password() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("protected.xlsx");
        std::fs::write(&path, encrypt_package(&sample_workbook(), "hunter2"))
            .expect("workbook written");

        let mut engine = CalamineEngine::new();
        assert!(matches!(
            engine.open(&path, None),
            Err(OpenError::PasswordRequired)
        ));
        assert!(matches!(
            engine.open(&path, Some("hunter3")),
            Err(OpenError::WrongPassword)
        ));

        let mut document = engine.open(&path, Some("hunter2")).expect("opened");
        let range = document.used_range("Tasks").expect("range");
        assert_eq!(range.rows[1], vec!["1".to_string(), "bob".to_string()]);
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempdir().expect("temporary directory");
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").expect("file written");

        let mut engine = CalamineEngine::new();
        assert!(matches!(
            engine.open(&path, None),
            Err(OpenError::Unsupported(_))
        ));
    }

    #[test]
    fn serial_dates_render_as_iso_text() {
        assert_eq!(excel_serial_to_string(45_000.0), "2023-03-15");
        assert_eq!(excel_serial_to_string(45_000.5), "2023-03-15 12:00:00");
    }
}
