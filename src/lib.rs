//! Core library for the sheet-splitter command line application.
//!
//! A worksheet is opened through a [`splitter::io::SpreadsheetEngine`]
//! (decrypting password-protected packages when needed), its rows are grouped
//! by one column, and each group is written to its own workbook. Engine access
//! and the password retry loop live in [`splitter::session`], grouping in
//! [`splitter::group`], file naming in [`splitter::naming`], and the end-to-end
//! orchestration in [`splitter::split`].

pub mod splitter;

pub use splitter::{
    Result, ToolError, config, credentials, error, group, io, logging, model, naming, resolve,
    session, split,
};
