//! In-memory representation of the source worksheet and the groups derived
//! from it.
//!
//! Everything here is owned, plain data. Once a [`Worksheet`] has been read the
//! source document is no longer needed to produce the output files.

/// Key assigned to rows whose grouping value is blank or sanitizes to nothing.
pub const UNKNOWN_GROUP: &str = "unknown";

/// Column names of the first row of the used range, trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderRow {
    pub columns: Vec<String>,
}

impl HeaderRow {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A data row with every cell normalized to trimmed text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataRow {
    /// 1-based row number in the source worksheet.
    pub source_row: u32,
    pub cells: Vec<String>,
}

impl DataRow {
    pub fn new(source_row: u32, cells: Vec<String>) -> Self {
        Self { source_row, cells }
    }

    /// Text of the cell at `index`, or the empty string past the end of the row.
    pub fn cell(&self, index: usize) -> &str {
        self.cells.get(index).map(String::as_str).unwrap_or("")
    }
}

/// A resolved worksheet copied out of the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worksheet {
    pub name: String,
    pub header: HeaderRow,
    pub rows: Vec<DataRow>,
}

/// Rows sharing one sanitized grouping value, in source order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub key: String,
    pub rows: Vec<DataRow>,
}

impl Group {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_past_end_of_row_reads_as_empty() {
        let row = DataRow::new(2, vec!["1".into(), "Amy Task".into()]);
        assert_eq!(row.cell(1), "Amy Task");
        assert_eq!(row.cell(5), "");
    }
}
