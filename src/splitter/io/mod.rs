//! Spreadsheet IO: the engine seam used to read the source document, the
//! calamine-backed engine, Agile package decryption, and the per-group writer.

pub mod crypto;
pub mod excel_read;
pub mod excel_write;

use std::path::Path;

use thiserror::Error;

/// Reasons an engine can refuse to open a document.
#[derive(Debug, Error)]
pub enum OpenError {
    /// The document is encrypted and no password was supplied.
    #[error("document is password protected")]
    PasswordRequired,

    /// The supplied password did not unlock the document.
    #[error("password rejected")]
    WrongPassword,

    /// The document uses a format or protection scheme the engine cannot read.
    #[error("unsupported document: {0}")]
    Unsupported(String),

    /// Any other failure to read the document.
    #[error("{0}")]
    Read(String),
}

/// The used range of one worksheet, every cell already rendered as trimmed text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UsedRange {
    /// 1-based source row number of the first row in `rows`.
    pub first_row: u32,
    pub rows: Vec<Vec<String>>,
}

/// An opened source document.
pub trait SourceDocument {
    /// Worksheet names in workbook order.
    fn sheet_names(&self) -> Vec<String>;

    /// Reads the used range of the named worksheet.
    fn used_range(&mut self, sheet: &str) -> crate::Result<UsedRange>;

    /// Releases the document. Called once, when the owning session ends.
    fn close(&mut self) {}
}

/// A spreadsheet engine capable of opening source documents.
///
/// `start` is called once per session before the first `open`, and `quit` is
/// called exactly once when the session ends if `start` succeeded.
pub trait SpreadsheetEngine {
    type Document: SourceDocument;

    fn start(&mut self) -> Result<(), String> {
        Ok(())
    }

    fn open(&mut self, path: &Path, password: Option<&str>)
    -> Result<Self::Document, OpenError>;

    fn quit(&mut self) {}
}
