//! Formula evaluation against a table grid and the cross-document index.
//!
//! Function calls are resolved first, each into a plain decimal literal, and
//! the remaining arithmetic goes through the expression parser.

use super::errors::{FormulaError, FormulaResult};
use super::functions::{self, FunctionCall, RangeKind, Segment};
use super::models::{Cell, NamedVariable, VaultIndex, has_separator_row};
use super::parser;
use tracing::trace;

/// Read access to variables other documents have published.
pub trait VariableLookup {
    fn lookup(&self, document: &str, variable: &str) -> Option<NamedVariable>;
}

impl VariableLookup for VaultIndex {
    fn lookup(&self, document: &str, variable: &str) -> Option<NamedVariable> {
        self.get(document)?.get(variable).cloned()
    }
}

/// A lookup with no published variables.
pub struct NoVariables;

impl VariableLookup for NoVariables {
    fn lookup(&self, _document: &str, _variable: &str) -> Option<NamedVariable> {
        None
    }
}

/// Evaluates formula cells of a table.
///
/// # Examples
///
/// ```
/// use tablemath::domain::{Cell, FormulaEvaluator, NoVariables};
///
/// let row = vec![Cell::new(0, 0, "10"), Cell::new(0, 1, "20"), Cell::new(0, 2, "=SUM(row)")];
/// let rows = vec![row];
/// let evaluator = FormulaEvaluator::new(&NoVariables);
///
/// assert_eq!(evaluator.evaluate_formula("=SUM(row)", &rows, 0, 2), Some(30.0));
/// assert_eq!(evaluator.evaluate_formula("=10/0", &rows, 0, 2), None);
/// ```
pub struct FormulaEvaluator<'a> {
    variables: &'a dyn VariableLookup,
}

impl<'a> FormulaEvaluator<'a> {
    pub fn new(variables: &'a dyn VariableLookup) -> Self {
        Self { variables }
    }

    /// Evaluates a formula for the cell at `row`, `col`.
    ///
    /// Every failure collapses to `None`; the caller keeps the formula text.
    pub fn evaluate_formula(&self, formula: &str, rows: &[Vec<Cell>], row: usize, col: usize) -> Option<f64> {
        match self.try_evaluate(formula, rows, row, col) {
            Ok(value) => Some(value),
            Err(err) => {
                trace!(formula, row, col, %err, "formula produced no value");
                None
            }
        }
    }

    /// Like [`evaluate_formula`](Self::evaluate_formula) but keeps the reason for failure.
    pub fn try_evaluate(&self, formula: &str, rows: &[Vec<Cell>], row: usize, col: usize) -> FormulaResult<f64> {
        let body = formula.strip_prefix('=').unwrap_or(formula).trim();

        let mut expression = String::with_capacity(body.len());
        for segment in functions::scan(body)? {
            match segment {
                Segment::Text(text) => expression.push_str(&text),
                Segment::Call(call) => {
                    let value = self.resolve_call(&call, rows, row, col)?;
                    expression.push_str(&decimal_literal(value));
                }
            }
        }

        parser::evaluate_expression(&expression)
    }

    fn resolve_call(&self, call: &FunctionCall, rows: &[Vec<Cell>], row: usize, col: usize) -> FormulaResult<f64> {
        match call {
            FunctionCall::Aggregate { function, range, data_only, .. } => {
                let values = range_values(*range, rows, row, col, *data_only);
                function.apply(&values)
            }
            FunctionCall::Note { document, variable } => self
                .variables
                .lookup(document, variable)
                .map(|found| found.value)
                .ok_or_else(|| FormulaError::UnresolvedNote {
                    document: document.clone(),
                    variable: variable.clone(),
                }),
        }
    }

    /// Currency used when rendering this formula's result.
    ///
    /// An explicit `,CCC` argument wins; a formula that is nothing but a
    /// `NOTE` call inherits the referenced variable's currency.
    pub fn display_currency(&self, formula: &str) -> Option<String> {
        let body = formula.strip_prefix('=').unwrap_or(formula);
        functions::extract_currency(body).or_else(|| {
            let (document, variable) = functions::sole_note_call(body)?;
            self.variables.lookup(&document, &variable)?.currency
        })
    }
}

/// Values of a `row` or `col` range as seen from (`row`, `col`).
///
/// The evaluating cell, the separator row and cells without a value never
/// count; `data_only` also drops formula cells.
pub fn range_values(range: RangeKind, rows: &[Vec<Cell>], row: usize, col: usize, data_only: bool) -> Vec<f64> {
    let eligible = |cell: &Cell| cell.value.filter(|_| !(data_only && cell.is_formula));

    match range {
        RangeKind::Row => rows
            .get(row)
            .map(|cells| {
                cells
                    .iter()
                    .filter(|cell| cell.col != col)
                    .filter_map(eligible)
                    .collect()
            })
            .unwrap_or_default(),
        RangeKind::Col => {
            let separator = has_separator_row(rows);
            rows.iter()
                .enumerate()
                .filter(|(r, _)| *r != row && !(separator && *r == 1))
                .filter_map(|(_, cells)| cells.get(col))
                .filter_map(eligible)
                .collect()
        }
    }
}

/// Positional decimal text for substitution back into an expression.
fn decimal_literal(value: f64) -> String {
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::VariableSet;

    fn grid(lines: &[&[&str]]) -> Vec<Vec<Cell>> {
        lines
            .iter()
            .enumerate()
            .map(|(r, cells)| cells.iter().enumerate().map(|(c, text)| Cell::new(r, c, text)).collect())
            .collect()
    }

    fn budget_index() -> VaultIndex {
        let mut variables = VariableSet::new();
        variables.insert("total".to_string(), NamedVariable { value: 1500.0, currency: Some("USD".to_string()) });
        let mut index = VaultIndex::new();
        index.insert("Budget".to_string(), variables);
        index
    }

    #[test]
    fn test_sum_row_excludes_self() {
        let rows = grid(&[&["10", "20", "=SUM(row)"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=SUM(row)", &rows, 0, 2), Some(30.0));
    }

    #[test]
    fn test_avg_row_data_only_skips_formulas() {
        let mut rows = grid(&[&["10", "=SUM(col)", "20", "=AVG(row,data)"]]);
        rows[0][1].value = Some(999.0);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=AVG(row,data)", &rows, 0, 3), Some(15.0));
        assert_eq!(evaluator.evaluate_formula("=AVG(row)", &rows, 0, 3), Some((10.0 + 999.0 + 20.0) / 3.0));
    }

    #[test]
    fn test_col_range_skips_separator_row() {
        let rows = grid(&[&["=SUM(col)"], &["---"], &["200"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=SUM(col)", &rows, 0, 0), Some(200.0));
    }

    #[test]
    fn test_col_range_without_separator_uses_row_one() {
        let rows = grid(&[&["5"], &["7"], &["=SUM(col)"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=SUM(col)", &rows, 2, 0), Some(12.0));
    }

    #[test]
    fn test_min_max() {
        let rows = grid(&[&["Item", "Cost"], &["---", "---"], &["a", "4"], &["b", "-2"], &["c", "9"], &["", "=MIN(col)"], &["", "=MAX(col)"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=MIN(col)", &rows, 5, 1), Some(-2.0));
        assert_eq!(evaluator.evaluate_formula("=MAX(col, data)", &rows, 6, 1), Some(9.0));
    }

    #[test]
    fn test_col_data_only_skips_evaluated_formulas() {
        let mut rows = grid(&[&["Item", "Cost"], &["---", "---"], &["a", "4"], &["b", "-2"], &["Total", "=SUM(col)"], &["", "=MAX(col, data)"]]);
        rows[4][1].value = Some(2.0);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=MIN(col, data)", &rows, 5, 1), Some(-2.0));
        assert_eq!(evaluator.evaluate_formula("=SUM(col, data)", &rows, 5, 1), Some(2.0));
        assert_eq!(evaluator.evaluate_formula("=AVG(col)", &rows, 5, 1), Some(4.0 / 3.0));
        assert_eq!(evaluator.evaluate_formula("=AVG(col, data)", &rows, 5, 1), Some(1.0));
    }

    #[test]
    fn test_empty_range_fails() {
        let rows = grid(&[&["Label", "=SUM(row)"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(
            evaluator.try_evaluate("=SUM(row)", &rows, 0, 1),
            Err(FormulaError::EmptyRange("SUM"))
        );
    }

    #[test]
    fn test_arithmetic_around_calls() {
        let rows = grid(&[&["10", "20", "=SUM(row) * 2 - 1"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=SUM(row) * 2 - 1", &rows, 0, 2), Some(59.0));
        assert_eq!(evaluator.evaluate_formula("=(SUM(row)+MAX(row))/2", &rows, 0, 2), Some(25.0));
    }

    #[test]
    fn test_negative_results_substitute_cleanly() {
        let rows = grid(&[&["-10", "-20", "=SUM(row)-5"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=SUM(row)-5", &rows, 0, 2), Some(-35.0));
    }

    #[test]
    fn test_large_values_keep_positional_notation() {
        let rows = grid(&[&["1e22", "=SUM(row)+1"]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=SUM(row)+1", &rows, 0, 1), Some(1e22 + 1.0));
    }

    #[test]
    fn test_note_lookup() {
        let index = budget_index();
        let rows = grid(&[&["=NOTE(\"Budget\").total"]]);
        let evaluator = FormulaEvaluator::new(&index);
        assert_eq!(evaluator.evaluate_formula("=NOTE(\"Budget\").total / 12", &rows, 0, 0), Some(125.0));
        assert_eq!(
            evaluator.try_evaluate("=NOTE(\"Budget\").missing", &rows, 0, 0),
            Err(FormulaError::UnresolvedNote { document: "Budget".to_string(), variable: "missing".to_string() })
        );
        assert_eq!(evaluator.evaluate_formula("=NOTE(\"Other\").total", &rows, 0, 0), None);
    }

    #[test]
    fn test_malformed_and_nested_calls_fail() {
        let rows = grid(&[&["10", "=SUM("]]);
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=SUM(", &rows, 0, 1), None);
        assert!(matches!(
            evaluator.try_evaluate("=SUM(SUM(row))", &rows, 0, 1),
            Err(FormulaError::NestedCall(_))
        ));
    }

    #[test]
    fn test_plain_arithmetic_formula() {
        let evaluator = FormulaEvaluator::new(&NoVariables);
        assert_eq!(evaluator.evaluate_formula("=2+3*4", &[], 0, 0), Some(14.0));
    }

    #[test]
    fn test_display_currency() {
        let index = budget_index();
        let evaluator = FormulaEvaluator::new(&index);
        assert_eq!(evaluator.display_currency("=SUM(col,EUR)"), Some("EUR".to_string()));
        assert_eq!(evaluator.display_currency("=NOTE(\"Budget\").total"), Some("USD".to_string()));
        assert_eq!(evaluator.display_currency("=NOTE(\"Budget\").total*2"), None);
        assert_eq!(evaluator.display_currency("=SUM(col)"), None);
    }
}
