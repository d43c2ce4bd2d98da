//! Read-only rendering of tables for display.
//!
//! Works from cell text alone, the way a rendered view sees a table: no
//! separator row and no access to the engine's caches.

use crate::domain::{
    Cell, FormulaEvaluator, NumberFormatter, Table, VariableLookup, find_tables, has_separator_row,
    parse_leading_number, split_cells,
};

pub struct PreviewRenderer<'a> {
    evaluator: FormulaEvaluator<'a>,
    formatter: &'a NumberFormatter,
}

impl<'a> PreviewRenderer<'a> {
    pub fn new(variables: &'a dyn VariableLookup, formatter: &'a NumberFormatter) -> Self {
        Self {
            evaluator: FormulaEvaluator::new(variables),
            formatter,
        }
    }

    /// Evaluates a grid of cell texts and returns the text to display.
    ///
    /// Row 0 counts as a header, contributing no values, when fewer than
    /// half of its cells are numbers.
    pub fn render_rows(&self, rows: &[Vec<String>]) -> Vec<Vec<String>> {
        let header = rows.first().is_some_and(|row| looks_like_header(row));

        let cells: Vec<Vec<Cell>> = rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                row.iter()
                    .enumerate()
                    .map(|(c, text)| {
                        let mut cell = Cell::new(r, c, text);
                        if header && r == 0 {
                            cell.value = None;
                        }
                        cell
                    })
                    .collect()
            })
            .collect();

        let mut table = Table {
            rows: cells,
            has_separator: false,
        };
        table.evaluate(&self.evaluator);

        table
            .rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| table.display_text(cell, &self.evaluator, self.formatter))
                    .collect()
            })
            .collect()
    }

    /// The document with every table's formula cells replaced by their results.
    ///
    /// Separator rows are kept as written; everything outside tables is untouched.
    pub fn render_document(&self, text: &str) -> String {
        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();

        for span in find_tables(text) {
            let grid: Vec<Vec<Cell>> = span
                .lines
                .iter()
                .enumerate()
                .map(|(r, line)| {
                    split_cells(line)
                        .iter()
                        .enumerate()
                        .map(|(c, content)| Cell::new(r, c, content))
                        .collect()
                })
                .collect();
            let separator = has_separator_row(&grid).then_some(1);

            let body: Vec<Vec<String>> = span
                .lines
                .iter()
                .enumerate()
                .filter(|(r, _)| Some(*r) != separator)
                .map(|(_, line)| split_cells(line))
                .collect();
            let mut rendered = self.render_rows(&body).into_iter();

            for (r, line) in span.lines.iter().enumerate() {
                let target = &mut lines[span.start + r];
                if Some(r) == separator {
                    *target = line.clone();
                } else if let Some(cells) = rendered.next() {
                    *target = format!("| {} |", cells.join(" | "));
                }
            }
        }

        lines.join("\n")
    }
}

fn looks_like_header(row: &[String]) -> bool {
    let numeric = row
        .iter()
        .filter(|text| parse_leading_number(text).is_some())
        .count();
    numeric * 2 < row.len()
}
