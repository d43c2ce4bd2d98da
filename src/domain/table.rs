//! Pipe-delimited tables: locating them in a document, parsing them into a
//! grid, evaluating their formulas and writing them back out.

use super::format::NumberFormatter;
use super::models::{Cell, NamedVariable, VariableSet, has_separator_row, slugify};
use super::services::FormulaEvaluator;

/// A table parsed from consecutive `|`-delimited lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub rows: Vec<Vec<Cell>>,
    pub has_separator: bool,
}

/// Where a table sits in its document.
#[derive(Debug, Clone, PartialEq)]
pub struct TableSpan {
    /// Zero-based index of the first table line.
    pub start: usize,
    /// Zero-based index of the last table line, inclusive.
    pub end: usize,
    pub lines: Vec<String>,
}

/// Whether a line belongs to a table.
pub fn is_table_line(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.ends_with('|')
}

/// The table containing `index`, extended in both directions.
///
/// Fewer than two table lines are not a table.
pub fn extract_table(lines: &[&str], index: usize) -> Option<TableSpan> {
    if !lines.get(index).is_some_and(|line| is_table_line(line)) {
        return None;
    }

    let mut start = index;
    while start > 0 && is_table_line(lines[start - 1]) {
        start -= 1;
    }
    let mut end = index;
    while end + 1 < lines.len() && is_table_line(lines[end + 1]) {
        end += 1;
    }

    if end - start + 1 < 2 {
        return None;
    }

    Some(TableSpan {
        start,
        end,
        lines: lines[start..=end].iter().map(|line| line.to_string()).collect(),
    })
}

/// Every table in a document, in order.
pub fn find_tables(text: &str) -> Vec<TableSpan> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut tables = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        match extract_table(&lines, i) {
            Some(span) => {
                i = span.end + 1;
                tables.push(span);
            }
            None => i += 1,
        }
    }

    tables
}

/// Quick syntactic check for a formula cell: `=` right after a space or pipe.
pub fn has_formulas<S: AsRef<str>>(lines: &[S]) -> bool {
    lines.iter().any(|line| {
        let line = line.as_ref();
        line.char_indices().any(|(i, ch)| {
            ch == '=' && i > 0 && matches!(line[..i].chars().next_back(), Some(' ') | Some('|'))
        })
    })
}

/// Splits one table line into trimmed cell texts.
pub fn split_cells(line: &str) -> Vec<String> {
    let parts: Vec<&str> = line.split('|').collect();
    if parts.len() < 2 {
        return Vec::new();
    }
    parts[1..parts.len() - 1].iter().map(|part| part.trim().to_string()).collect()
}

impl Table {
    pub fn parse<S: AsRef<str>>(lines: &[S]) -> Self {
        let rows: Vec<Vec<Cell>> = lines
            .iter()
            .enumerate()
            .map(|(r, line)| {
                split_cells(line.as_ref())
                    .iter()
                    .enumerate()
                    .map(|(c, content)| Cell::new(r, c, content))
                    .collect()
            })
            .collect();

        Self::from_rows(rows)
    }

    pub fn from_rows(rows: Vec<Vec<Cell>>) -> Self {
        let has_separator = has_separator_row(&rows);
        Self { rows, has_separator }
    }

    fn is_separator(&self, row: usize) -> bool {
        self.has_separator && row == 1
    }

    /// Evaluates formula cells in row-major order.
    ///
    /// A formula sees the results of formulas evaluated before it.
    pub fn evaluate(&mut self, evaluator: &FormulaEvaluator) {
        for r in 0..self.rows.len() {
            if self.is_separator(r) {
                continue;
            }
            for c in 0..self.rows[r].len() {
                if !self.rows[r][c].is_formula {
                    continue;
                }
                let formula = self.rows[r][c].content.clone();
                if let Some(value) = evaluator.evaluate_formula(&formula, &self.rows, r, c) {
                    self.rows[r][c].value = Some(value);
                }
            }
        }
    }

    /// Variables published by rows labelled in their first cell and valued in their last.
    pub fn named_variables(&self, evaluator: &FormulaEvaluator) -> VariableSet {
        let mut variables = VariableSet::new();

        for (r, row) in self.rows.iter().enumerate() {
            if self.is_separator(r) || row.len() < 2 {
                continue;
            }
            let first = &row[0];
            if first.is_formula || first.content.is_empty() {
                continue;
            }
            let last = &row[row.len() - 1];
            let Some(value) = last.value.filter(|value| value.is_finite()) else {
                continue;
            };
            let name = slugify(&first.content);
            if name.is_empty() {
                continue;
            }
            let currency = if last.is_formula {
                evaluator.display_currency(&last.content)
            } else {
                None
            };
            variables.insert(name, NamedVariable { value, currency });
        }

        variables
    }

    /// Text shown for a cell: the formatted result for evaluated formulas,
    /// the original content otherwise.
    pub fn display_text(&self, cell: &Cell, evaluator: &FormulaEvaluator, formatter: &NumberFormatter) -> String {
        match (cell.is_formula, cell.value) {
            (true, Some(value)) => {
                let currency = evaluator.display_currency(&cell.content);
                formatter.format(value, currency.as_deref())
            }
            _ => cell.content.clone(),
        }
    }

    /// Writes the table back as `| a | b |` lines with results substituted.
    pub fn reserialize(&self, evaluator: &FormulaEvaluator, formatter: &NumberFormatter) -> Vec<String> {
        self.rows
            .iter()
            .map(|row| {
                let cells: Vec<String> = row
                    .iter()
                    .map(|cell| self.display_text(cell, evaluator, formatter))
                    .collect();
                format!("| {} |", cells.join(" | "))
            })
            .collect()
    }
}

/// Result of running one table through evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedTable {
    pub lines: Vec<String>,
    pub variables: VariableSet,
    pub table: Table,
}

/// Parses, evaluates, extracts variables and reserializes in one go.
pub fn process_table<S: AsRef<str>>(lines: &[S], evaluator: &FormulaEvaluator, formatter: &NumberFormatter) -> ProcessedTable {
    let mut table = Table::parse(lines);
    table.evaluate(evaluator);
    let variables = table.named_variables(evaluator);
    let lines = table.reserialize(evaluator, formatter);

    ProcessedTable { lines, variables, table }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::VaultIndex;
    use crate::domain::services::NoVariables;
    use pretty_assertions::assert_eq;

    fn process(lines: &[&str]) -> ProcessedTable {
        let evaluator = FormulaEvaluator::new(&NoVariables);
        process_table(lines, &evaluator, &NumberFormatter::default())
    }

    #[test]
    fn test_is_table_line() {
        assert!(is_table_line("| a | b |"));
        assert!(is_table_line("  |x|  "));
        assert!(!is_table_line("| a | b"));
        assert!(!is_table_line("text"));
    }

    #[test]
    fn test_extract_table_needs_two_lines() {
        let lines = vec!["intro", "| a |", "outro"];
        assert_eq!(extract_table(&lines, 1), None);

        let lines = vec!["intro", "| a |", "| b |", "| c |", ""];
        let span = extract_table(&lines, 2).unwrap();
        assert_eq!((span.start, span.end), (1, 3));
        assert_eq!(span.lines, vec!["| a |", "| b |", "| c |"]);
    }

    #[test]
    fn test_find_tables() {
        let text = "# Title\n| a | b |\n|---|---|\n| 1 | 2 |\n\n| lone |\n\n| x |\n| y |";
        let tables = find_tables(text);
        assert_eq!(tables.len(), 2);
        assert_eq!((tables[0].start, tables[0].end), (1, 3));
        assert_eq!((tables[1].start, tables[1].end), (7, 8));
    }

    #[test]
    fn test_has_formulas() {
        assert!(has_formulas(&["| a | =SUM(col) |"]));
        assert!(has_formulas(&["|=SUM(col)|"]));
        assert!(!has_formulas(&["| a==b | c |"]));
        assert!(!has_formulas(&["| a | b |"]));
    }

    #[test]
    fn test_split_cells() {
        assert_eq!(split_cells("| a |  b  | =SUM(row) |"), vec!["a", "b", "=SUM(row)"]);
        assert_eq!(split_cells("|a||c|"), vec!["a", "", "c"]);
    }

    #[test]
    fn test_separator_detection() {
        assert!(Table::parse(&["| a | b |", "| :--- | ---: |", "| 1 | 2 |"]).has_separator);
        assert!(!Table::parse(&["| a | b |", "| 1 | 2 |"]).has_separator);
    }

    #[test]
    fn test_process_row_and_column_sums() {
        let processed = process(&[
            "| Item | Q1 | Q2 | Total |",
            "| --- | --- | --- | --- |",
            "| Rent | 1000 | 1200 | =SUM(row) |",
            "| Food | 300 | 250 | =SUM(row) |",
            "| Total | =SUM(col) | =SUM(col) | =SUM(col) |",
        ]);

        assert_eq!(
            processed.lines,
            vec![
                "| Item | Q1 | Q2 | Total |",
                "| --- | --- | --- | --- |",
                "| Rent | 1000 | 1200 | 2,200 |",
                "| Food | 300 | 250 | 550 |",
                "| Total | 1,300 | 1,450 | 2,750 |",
            ]
        );
        assert_eq!(processed.variables.get("rent").map(|v| v.value), Some(2200.0));
        assert_eq!(processed.variables.get("total").map(|v| v.value), Some(2750.0));
        assert!(!processed.variables.contains_key("item"));
    }

    #[test]
    fn test_currency_formatting_and_variable_currency() {
        let processed = process(&[
            "| Item | Cost |",
            "| --- | --- |",
            "| Laptop | 1200 |",
            "| Mouse | 300 |",
            "| Total | =SUM(col, USD) |",
        ]);
        assert_eq!(processed.lines[4], "| Total | $1,500.00 |");
        assert_eq!(
            processed.variables.get("total"),
            Some(&NamedVariable { value: 1500.0, currency: Some("USD".to_string()) })
        );
    }

    #[test]
    fn test_failed_formula_passes_through() {
        let processed = process(&["| a | =SUM( |", "| b | =1/0 |"]);
        assert_eq!(processed.lines, vec!["| a | =SUM( |", "| b | =1/0 |"]);
        assert!(processed.variables.is_empty());
    }

    #[test]
    fn test_later_formula_sees_earlier_result() {
        let processed = process(&["| 2 | 3 | =SUM(row) |", "| 1 | 1 | =SUM(col) |"]);
        assert_eq!(processed.lines[1], "| 1 | 1 | 5 |");
    }

    #[test]
    fn test_markup_in_labels() {
        let processed = process(&["| **Total Cost** | 42 |", "| ~~x~~ | 1 |"]);
        assert_eq!(processed.variables.get("total_cost").map(|v| v.value), Some(42.0));
        assert_eq!(processed.variables.get("x").map(|v| v.value), Some(1.0));
    }

    #[test]
    fn test_note_reference_in_table() {
        let mut index = VaultIndex::new();
        index.entry("Budget".to_string()).or_default().insert(
            "total".to_string(),
            NamedVariable { value: 1500.0, currency: None },
        );
        let evaluator = FormulaEvaluator::new(&index);
        let processed = process_table(
            &["| Budget | =NOTE(\"Budget\").total |", "| Monthly | =NOTE(\"Budget\").total/12 |"],
            &evaluator,
            &NumberFormatter::default(),
        );
        assert_eq!(processed.lines, vec!["| Budget | 1,500 |", "| Monthly | 125 |"]);
    }

    #[test]
    fn test_non_finite_values_are_not_published() {
        let mut index = VaultIndex::new();
        index.entry("Big".to_string()).or_default().insert(
            "max".to_string(),
            NamedVariable { value: 1e308, currency: None },
        );
        let evaluator = FormulaEvaluator::new(&index);
        let processed = process_table(
            &["| Literal | 1e999 |", "| Overflow | =NOTE(\"Big\").max * 10 |", "| Fine | =2*3 |"],
            &evaluator,
            &NumberFormatter::default(),
        );
        assert_eq!(processed.variables.keys().collect::<Vec<_>>(), vec!["fine"]);
    }
}
