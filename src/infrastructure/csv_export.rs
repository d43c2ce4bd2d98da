use crate::domain::{Cell, StoreResult, has_separator_row, split_cells};
use std::path::Path;

/// Cell texts of rendered table lines, minus the header separator.
pub fn export_rows<S: AsRef<str>>(lines: &[S]) -> Vec<Vec<String>> {
    let rows: Vec<Vec<String>> = lines.iter().map(|line| split_cells(line.as_ref())).collect();
    let cells: Vec<Vec<Cell>> = rows
        .iter()
        .enumerate()
        .map(|(r, row)| row.iter().enumerate().map(|(c, text)| Cell::new(r, c, text)).collect())
        .collect();
    let separator = has_separator_row(&cells);

    rows.into_iter()
        .enumerate()
        .filter(|(r, _)| !(separator && *r == 1))
        .map(|(_, row)| row)
        .collect()
}

/// Writes rendered table lines to a CSV file.
pub fn export_table<S: AsRef<str>>(lines: &[S], path: &Path) -> StoreResult<()> {
    // Rows can differ in width when a table is ragged.
    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    for row in export_rows(lines) {
        writer.write_record(&row)?;
    }
    writer.flush()?;
    Ok(())
}
