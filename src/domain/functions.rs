//! Recognition of the built-in function calls inside a formula.
//!
//! A formula is split into plain text and calls in a single left-to-right
//! scan. Supported calls:
//!
//! ```bnf
//! Aggregate ::= ( "SUM" | "AVG" | "MIN" | "MAX" ) "(" Range ( "," Arg )* ")"
//! Range     ::= "row" | "col"
//! Arg       ::= "data" | Letter Letter Letter
//! Note      ::= "NOTE" "(" '"' [^"]+ '"' ")" "." [A-Za-z0-9_]+
//! ```
//!
//! Keywords are case-insensitive and whitespace is allowed around
//! punctuation inside the parentheses. Calls cannot be nested.

use super::errors::{FormulaError, FormulaResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }

    /// Folds the collected range values; an empty range has no result.
    pub fn apply(self, values: &[f64]) -> FormulaResult<f64> {
        if values.is_empty() {
            return Err(FormulaError::EmptyRange(self.name()));
        }

        let sum: f64 = values.iter().sum();
        Ok(match self {
            Aggregate::Sum => sum,
            Aggregate::Avg => sum / values.len() as f64,
            Aggregate::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Aggregate::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeKind {
    /// Other cells of the evaluating cell's row.
    Row,
    /// Other cells of the evaluating cell's column.
    Col,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionCall {
    Aggregate {
        function: Aggregate,
        range: RangeKind,
        /// Skip cells that are themselves formulas.
        data_only: bool,
        /// Formatting hint only.
        currency: Option<String>,
    },
    Note {
        document: String,
        variable: String,
    },
}

/// One piece of a scanned formula.
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Text(String),
    Call(FunctionCall),
}

const KEYWORDS: [&str; 5] = ["SUM", "AVG", "MIN", "MAX", "NOTE"];

/// Splits a formula body into text and function calls.
pub fn scan(formula: &str) -> FormulaResult<Vec<Segment>> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut cursor = Cursor::new(formula);

    while !cursor.at_end() {
        if let Some(keyword) = cursor.keyword_at() {
            let start = cursor.pos;
            cursor.pos += keyword.len();
            let call = parse_call(&mut cursor, keyword, formula, start)?;
            if !text.is_empty() {
                segments.push(Segment::Text(std::mem::take(&mut text)));
            }
            segments.push(Segment::Call(call));
        } else if let Some(ch) = cursor.bump() {
            text.push(ch);
        }
    }

    if !text.is_empty() {
        segments.push(Segment::Text(text));
    }
    Ok(segments)
}

/// First `,CCC` token followed by `,` or `)`, upper-cased.
///
/// This looks at the raw formula text, independently of call parsing.
pub fn extract_currency(formula: &str) -> Option<String> {
    let chars: Vec<char> = formula.chars().collect();

    for (i, &ch) in chars.iter().enumerate() {
        if ch != ',' {
            continue;
        }
        let mut j = i + 1;
        while j < chars.len() && chars[j].is_whitespace() {
            j += 1;
        }
        if j + 3 > chars.len() || !chars[j..j + 3].iter().all(|c| c.is_ascii_alphabetic()) {
            continue;
        }
        let mut k = j + 3;
        while k < chars.len() && chars[k].is_whitespace() {
            k += 1;
        }
        if matches!(chars.get(k), Some(',') | Some(')')) {
            return Some(chars[j..j + 3].iter().collect::<String>().to_ascii_uppercase());
        }
    }

    None
}

/// The `NOTE` call when it is the whole formula body.
pub fn sole_note_call(formula: &str) -> Option<(String, String)> {
    match scan(formula.trim()).ok()?.as_slice() {
        [Segment::Call(FunctionCall::Note { document, variable })] => {
            Some((document.clone(), variable.clone()))
        }
        _ => None,
    }
}

fn parse_call(cursor: &mut Cursor, keyword: &str, formula: &str, start: usize) -> FormulaResult<FunctionCall> {
    let malformed = |pos: usize| FormulaError::MalformedCall(formula[start..pos.min(formula.len())].to_string());

    cursor.skip_whitespace();
    if !cursor.eat('(') {
        return Err(malformed(cursor.pos));
    }

    if keyword == "NOTE" {
        return parse_note_args(cursor).ok_or_else(|| malformed(cursor.pos));
    }

    let function = match keyword {
        "SUM" => Aggregate::Sum,
        "AVG" => Aggregate::Avg,
        "MIN" => Aggregate::Min,
        _ => Aggregate::Max,
    };

    let mut args = Vec::new();
    loop {
        cursor.skip_whitespace();
        if cursor.keyword_at().is_some() {
            let end = formula[cursor.pos..]
                .find(')')
                .map_or(formula.len(), |offset| cursor.pos + offset + 1);
            return Err(FormulaError::NestedCall(formula[start..end].to_string()));
        }
        let word = cursor.take_word();
        if word.is_empty() {
            return Err(malformed(cursor.pos));
        }
        args.push(word);
        cursor.skip_whitespace();
        if cursor.eat(',') {
            continue;
        }
        if cursor.eat(')') {
            break;
        }
        return Err(malformed(cursor.pos));
    }

    let range = match args[0].to_ascii_lowercase().as_str() {
        "row" => RangeKind::Row,
        "col" => RangeKind::Col,
        _ => return Err(malformed(cursor.pos)),
    };

    let mut data_only = false;
    let mut currency = None;
    for arg in &args[1..] {
        if arg.eq_ignore_ascii_case("data") {
            data_only = true;
        } else if arg.len() == 3 && arg.chars().all(|c| c.is_ascii_alphabetic()) {
            currency.get_or_insert_with(|| arg.to_ascii_uppercase());
        } else {
            return Err(malformed(cursor.pos));
        }
    }

    Ok(FunctionCall::Aggregate {
        function,
        range,
        data_only,
        currency,
    })
}

fn parse_note_args(cursor: &mut Cursor) -> Option<FunctionCall> {
    cursor.skip_whitespace();
    if !cursor.eat('"') {
        return None;
    }
    let document = cursor.take_until('"');
    if document.is_empty() || !cursor.eat('"') {
        return None;
    }
    cursor.skip_whitespace();
    if !cursor.eat(')') || !cursor.eat('.') {
        return None;
    }
    let variable = cursor.take_word();
    if variable.is_empty() {
        return None;
    }

    Some(FunctionCall::Note { document, variable })
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.pos += expected.len_utf8();
            true
        } else {
            false
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn take_word(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_alphanumeric() || c == '_') {
            self.bump();
        }
        self.input[start..self.pos].to_string()
    }

    fn take_until(&mut self, stop: char) -> String {
        let start = self.pos;
        while self.peek().is_some_and(|c| c != stop) {
            self.bump();
        }
        self.input[start..self.pos].to_string()
    }

    /// A keyword starting here, at an identifier boundary and followed by `(`.
    fn keyword_at(&self) -> Option<&'static str> {
        let preceded_by_ident = self.input[..self.pos]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if preceded_by_ident {
            return None;
        }

        let rest = self.rest();
        KEYWORDS.into_iter().find(|keyword| {
            rest.len() >= keyword.len()
                && rest.is_char_boundary(keyword.len())
                && rest[..keyword.len()].eq_ignore_ascii_case(keyword)
                && rest[keyword.len()..].trim_start().starts_with('(')
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aggregate(function: Aggregate, range: RangeKind, data_only: bool, currency: Option<&str>) -> Segment {
        Segment::Call(FunctionCall::Aggregate {
            function,
            range,
            data_only,
            currency: currency.map(str::to_string),
        })
    }

    #[test]
    fn test_scan_single_aggregate() {
        assert_eq!(scan("SUM(row)").unwrap(), vec![aggregate(Aggregate::Sum, RangeKind::Row, false, None)]);
    }

    #[test]
    fn test_scan_arguments() {
        assert_eq!(
            scan("avg( COL , data, usd )").unwrap(),
            vec![aggregate(Aggregate::Avg, RangeKind::Col, true, Some("USD"))]
        );
    }

    #[test]
    fn test_scan_mixed_text_and_calls() {
        let segments = scan("SUM(col) * 2 + MAX(row)").unwrap();
        assert_eq!(
            segments,
            vec![
                aggregate(Aggregate::Sum, RangeKind::Col, false, None),
                Segment::Text(" * 2 + ".to_string()),
                aggregate(Aggregate::Max, RangeKind::Row, false, None),
            ]
        );
    }

    #[test]
    fn test_scan_note() {
        assert_eq!(
            scan("NOTE(\"Budget 2024\").total / 12").unwrap(),
            vec![
                Segment::Call(FunctionCall::Note {
                    document: "Budget 2024".to_string(),
                    variable: "total".to_string(),
                }),
                Segment::Text(" / 12".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_plain_arithmetic() {
        assert_eq!(scan("1+2").unwrap(), vec![Segment::Text("1+2".to_string())]);
    }

    #[test]
    fn test_malformed_calls() {
        assert!(matches!(scan("SUM("), Err(FormulaError::MalformedCall(_))));
        assert!(matches!(scan("SUM(A1:A3)"), Err(FormulaError::MalformedCall(_))));
        assert!(matches!(scan("SUM(row, kg2)"), Err(FormulaError::MalformedCall(_))));
        assert!(matches!(scan("SUM()"), Err(FormulaError::MalformedCall(_))));
        assert!(matches!(scan("NOTE(Budget).total"), Err(FormulaError::MalformedCall(_))));
        assert!(matches!(scan("NOTE(\"Budget\")"), Err(FormulaError::MalformedCall(_))));
    }

    #[test]
    fn test_nested_calls_are_rejected() {
        assert_eq!(
            scan("SUM(SUM(col))"),
            Err(FormulaError::NestedCall("SUM(SUM(col)".to_string()))
        );
        assert!(matches!(scan("MAX(row, AVG(col))"), Err(FormulaError::NestedCall(_))));
    }

    #[test]
    fn test_keyword_needs_identifier_boundary() {
        assert_eq!(scan("XSUM(col)").unwrap(), vec![Segment::Text("XSUM(col)".to_string())]);
    }

    #[test]
    fn test_keyword_without_paren_is_text() {
        assert_eq!(scan("summary").unwrap(), vec![Segment::Text("summary".to_string())]);
    }

    #[test]
    fn test_extract_currency() {
        assert_eq!(extract_currency("=SUM(col,EUR)"), Some("EUR".to_string()));
        assert_eq!(extract_currency("=SUM(row, data, gbp)"), Some("GBP".to_string()));
        assert_eq!(extract_currency("=SUM(col,data)"), None);
        assert_eq!(extract_currency("=SUM(col)*2"), None);
    }

    #[test]
    fn test_sole_note_call() {
        assert_eq!(
            sole_note_call("NOTE(\"Budget\").total"),
            Some(("Budget".to_string(), "total".to_string()))
        );
        assert_eq!(sole_note_call("NOTE(\"Budget\").total*2"), None);
    }

    #[test]
    fn test_aggregate_apply() {
        let values = [10.0, 20.0, 30.0];
        assert_eq!(Aggregate::Sum.apply(&values).unwrap(), 60.0);
        assert_eq!(Aggregate::Avg.apply(&values).unwrap(), 20.0);
        assert_eq!(Aggregate::Min.apply(&values).unwrap(), 10.0);
        assert_eq!(Aggregate::Max.apply(&values).unwrap(), 30.0);
        assert_eq!(Aggregate::Sum.apply(&[]), Err(FormulaError::EmptyRange("SUM")));
    }
}
