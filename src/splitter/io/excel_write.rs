use std::path::Path;

use rust_xlsxwriter::{Format, Workbook};

use crate::splitter::error::Result;
use crate::splitter::model::{Group, HeaderRow};
use crate::splitter::resolve::ordinal_column;

const MAX_SHEET_NAME_LEN: usize = 31;

/// Writes one output workbook per group, all sharing the source header.
#[derive(Debug, Clone)]
pub struct GroupWriter<'a> {
    header: &'a HeaderRow,
    sheet_name: String,
    ordinal: Option<usize>,
}

impl<'a> GroupWriter<'a> {
    /// `sheet_name` names the single worksheet of every output file.
    pub fn new(header: &'a HeaderRow, sheet_name: &str) -> Self {
        Self {
            header,
            sheet_name: sanitize_sheet_name(sheet_name),
            ordinal: ordinal_column(header),
        }
    }

    /// 0-based index of the renumbered ordinal column, if any.
    pub fn ordinal_column(&self) -> Option<usize> {
        self.ordinal
    }

    /// Writes `group` to `path`: bold header, member rows in source order, the
    /// ordinal column renumbered from 1, and autofit column widths.
    pub fn write(&self, group: &Group, path: &Path) -> Result<()> {
        let mut workbook = Workbook::new();
        let header_format = Format::new().set_bold();

        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&self.sheet_name)?;

        for (col_idx, name) in self.header.columns.iter().enumerate() {
            worksheet.write_string_with_format(0, col_idx as u16, name, &header_format)?;
        }

        for (row_idx, row) in group.rows.iter().enumerate() {
            let out_row = (row_idx + 1) as u32;
            for (col_idx, cell) in row.cells.iter().enumerate() {
                if Some(col_idx) == self.ordinal || cell.is_empty() {
                    continue;
                }
                worksheet.write_string(out_row, col_idx as u16, cell)?;
            }
            if let Some(col_idx) = self.ordinal {
                worksheet.write_number(out_row, col_idx as u16, (row_idx + 1) as f64)?;
            }
        }

        worksheet.autofit();
        workbook.save(path)?;
        Ok(())
    }
}

fn sanitize_sheet_name(raw: &str) -> String {
    let invalid = [':', '\\', '/', '?', '*', '[', ']'];
    let sanitized: String = raw
        .chars()
        .map(|ch| {
            if invalid.contains(&ch) || ch.is_control() {
                '_'
            } else {
                ch
            }
        })
        .collect();

    let sanitized = sanitized.trim().trim_matches('\'');
    if sanitized.is_empty() {
        return "Sheet1".to_string();
    }
    sanitized.chars().take(MAX_SHEET_NAME_LEN).collect()
}
