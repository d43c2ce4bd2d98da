use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};

/// A single cell of a pipe-delimited table.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    /// Trimmed cell text, formula marker included.
    pub content: String,
    pub is_formula: bool,
    /// Literal value for plain cells, computed result for formula cells.
    pub value: Option<f64>,
}

impl Cell {
    pub fn new(row: usize, col: usize, content: &str) -> Self {
        let content = content.trim().to_string();
        let is_formula = content.starts_with('=');
        let value = if is_formula { None } else { parse_number(&content) };

        Self {
            row,
            col,
            content,
            is_formula,
            value,
        }
    }

    /// Formula text without the leading `=`.
    pub fn formula_body(&self) -> Option<&str> {
        if self.is_formula {
            Some(&self.content[1..])
        } else {
            None
        }
    }
}

/// A value a table row published for cross-document lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedVariable {
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

/// Variables published by one document, keyed by slugified row label.
pub type VariableSet = BTreeMap<String, NamedVariable>;

/// Document name to its published variables.
pub type VaultIndex = BTreeMap<String, VariableSet>;

/// Identifies a cell by absolute document line and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub line: usize,
    pub col: usize,
}

impl CellKey {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

impl fmt::Display for CellKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.line, self.col)
    }
}

/// Numeric display options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Fraction digits, 0 to 10.
    pub precision: u8,
    /// BCP 47 style locale tag.
    pub locale: String,
}

impl Settings {
    pub const MAX_PRECISION: u8 = 10;

    pub fn new(precision: u8, locale: &str) -> Self {
        Self {
            precision: precision.min(Self::MAX_PRECISION),
            locale: locale.to_string(),
        }
    }

    /// Brings loaded values back into range.
    pub fn normalized(mut self) -> Self {
        self.precision = self.precision.min(Self::MAX_PRECISION);
        if self.locale.trim().is_empty() {
            self.locale = Settings::default().locale;
        }
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            precision: 2,
            locale: "en-US".to_string(),
        }
    }
}

/// Whether row 1 of `rows` is a header divider such as `| --- | :-: |`.
pub fn has_separator_row(rows: &[Vec<Cell>]) -> bool {
    rows.get(1).is_some_and(|row| {
        row.iter().all(|cell| {
            cell.content
                .chars()
                .all(|c| matches!(c, '-' | ':' | '|') || c.is_whitespace())
        })
    })
}

const CURRENCY_SYMBOLS: [char; 6] = [',', '$', '€', '£', '¥', '₹'];

/// Parses a literal cell.
///
/// Currency symbols and thousands separators are dropped, then the longest
/// numeric prefix is read, so `"12 kg"` is 12 and `"Total"` has no value.
/// Literals that overflow (`1e999`) have no value either.
pub fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| !CURRENCY_SYMBOLS.contains(c)).collect();
    parse_leading_number(&cleaned)
}

/// Reads the finite numeric prefix of `text` as written, without dropping
/// currency symbols or separators: `"10 kg"` is 10, `"$10"` has no value.
pub fn parse_leading_number(text: &str) -> Option<f64> {
    parse_float_prefix(text.trim()).filter(|value| value.is_finite())
}

fn parse_float_prefix(text: &str) -> Option<f64> {
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end += 1;
    }

    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;

    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        end = frac_end;
    }

    if digits == 0 {
        return None;
    }

    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    let literal = text[..end].trim_end_matches('.');
    literal.parse::<f64>().ok()
}

/// Turns a row label into a variable name.
///
/// Inline markup (`**`, `*`, `_`, `~~…~~`, `==…==`) is removed, the text is
/// lower-cased and every run of non-alphanumerics becomes one underscore.
pub fn slugify(label: &str) -> String {
    let unmarked = strip_markup(label).to_lowercase();

    let mut slug = String::with_capacity(unmarked.len());
    let mut pending_separator = false;
    for ch in unmarked.chars() {
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_separator && !slug.is_empty() {
                slug.push('_');
            }
            pending_separator = false;
            slug.push(ch);
        } else {
            pending_separator = true;
        }
    }

    slug
}

/// One left-to-right pass: emphasis markers are dropped, while the body of a
/// `~~…~~` or `==…==` span is kept verbatim, underscores included.
fn strip_markup(label: &str) -> String {
    let mut out = String::with_capacity(label.len());
    let mut rest = label;

    while let Some(ch) = rest.chars().next() {
        if ch == '*' || ch == '_' {
            rest = &rest[1..];
        } else if let Some((body, after)) = ["~~", "=="].into_iter().find_map(|d| delimited(rest, d)) {
            out.push_str(body);
            rest = after;
        } else {
            out.push(ch);
            rest = &rest[ch.len_utf8()..];
        }
    }
    out
}

/// Splits `text` into the non-empty body of a span opening at its start and
/// the text after the closing delimiter.
fn delimited<'a>(text: &'a str, delimiter: &str) -> Option<(&'a str, &'a str)> {
    let body = text.strip_prefix(delimiter)?;
    let first = body.chars().next()?.len_utf8();
    let close = body[first..].find(delimiter)? + first;
    Some((&body[..close], &body[close + delimiter.len()..]))
}
