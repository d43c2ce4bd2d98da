use thiserror::Error;

/// Reasons a formula produced no value.
///
/// None of these reach the user: the cell keeps its formula text instead of a
/// rendered result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("{0} over an empty range")]
    EmptyRange(&'static str),

    #[error("Unresolved NOTE(\"{document}\").{variable}")]
    UnresolvedNote { document: String, variable: String },

    #[error("Nested function call: {0}")]
    NestedCall(String),

    #[error("Malformed function call: {0}")]
    MalformedCall(String),
}

pub type FormulaResult<T> = Result<T, FormulaError>;

/// Failures reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
