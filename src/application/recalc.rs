//! Incremental recomputation of the tables in a document.
//!
//! A document is skipped outright when a quiet pass sees the same content
//! hash as last time. Otherwise each table with formula cells is recomputed
//! unless its own lines hash to the cached value, and the variables every
//! table published are handed to the cross-document index.

use super::index::CrossDocumentIndex;
use crate::domain::{
    CellKey, FormulaEvaluator, NumberFormatter, Settings, TableSpan, VariableSet, extract_table,
    find_tables, has_formulas, process_table, split_cells,
};
use rustc_hash::{FxHashMap, FxHasher};
use std::hash::{Hash, Hasher};
use tracing::{debug, warn};

/// Cheap digest used only to notice that nothing changed.
pub fn content_hash(text: &str) -> u64 {
    let mut hasher = FxHasher::default();
    text.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TableKey {
    document: String,
    start: usize,
}

#[derive(Debug, Clone)]
struct CachedTable {
    hash: u64,
    lines: Vec<String>,
    variables: VariableSet,
}

/// Summary of one recompute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalcOutcome {
    /// Quiet pass over unchanged content; nothing was looked at.
    pub unchanged: bool,
    pub tables_processed: usize,
    pub tables_reused: usize,
    /// Tables left alone because only the cursor's table was recomputed.
    pub tables_out_of_scope: usize,
    pub variables: usize,
    pub index_changed: bool,
    pub persisted: bool,
}

/// Owns the index and the caches that decide which tables need work.
pub struct Recalculator {
    settings: Settings,
    formatter: NumberFormatter,
    index: CrossDocumentIndex,
    document_hashes: FxHashMap<String, u64>,
    tables: FxHashMap<TableKey, CachedTable>,
}

impl Recalculator {
    pub fn new(settings: Settings, index: CrossDocumentIndex) -> Self {
        Self {
            formatter: NumberFormatter::new(&settings),
            settings,
            index,
            document_hashes: FxHashMap::default(),
            tables: FxHashMap::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn formatter(&self) -> &NumberFormatter {
        &self.formatter
    }

    pub fn index(&self) -> &CrossDocumentIndex {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut CrossDocumentIndex {
        &mut self.index
    }

    /// Applies new display settings; cached output was rendered with the old ones.
    pub fn set_settings(&mut self, settings: Settings) {
        self.formatter = NumberFormatter::new(&settings);
        self.settings = settings;
        self.tables.clear();
        self.document_hashes.clear();
    }

    /// Last rendered lines of the table starting at `start`.
    pub fn processed_table(&self, document: &str, start: usize) -> Option<&[String]> {
        let key = TableKey {
            document: document.to_string(),
            start,
        };
        self.tables.get(&key).map(|cached| cached.lines.as_slice())
    }

    /// Rendered text of a formula cell after the last recompute.
    pub fn computed_value(&self, document: &str, key: CellKey) -> Option<&str> {
        self.index.get_computed_value(document, key)
    }

    /// Recomputes `document`.
    ///
    /// `quiet` marks background passes (edits, bulk indexing): they stop early
    /// on unchanged content, and while the cursor sits in a table only that
    /// table is recomputed.
    pub fn recalculate(&mut self, document: &str, text: &str, cursor_line: Option<usize>, quiet: bool) -> RecalcOutcome {
        let hash = content_hash(text);
        if quiet && self.document_hashes.get(document) == Some(&hash) {
            return RecalcOutcome {
                unchanged: true,
                ..RecalcOutcome::default()
            };
        }
        self.document_hashes.insert(document.to_string(), hash);

        let lines: Vec<&str> = text.split('\n').collect();
        let cursor_table = cursor_line.and_then(|line| extract_table(&lines, line));
        let scope = cursor_table.filter(|_| quiet).map(|span| (span.start, span.end));

        let mut outcome = RecalcOutcome::default();
        let mut collected = VariableSet::new();
        let mut complete = true;
        let mut seen_starts = Vec::new();

        for span in find_tables(text) {
            if !has_formulas(&span.lines) {
                continue;
            }
            seen_starts.push(span.start);

            let key = TableKey {
                document: document.to_string(),
                start: span.start,
            };
            let table_hash = content_hash(&span.lines.join("\n"));

            if let Some((first, last)) = scope {
                if span.start < first || span.start > last {
                    outcome.tables_out_of_scope += 1;
                    match self.tables.get(&key) {
                        Some(cached) if cached.hash == table_hash => {
                            collected.extend(cached.variables.clone());
                        }
                        _ => complete = false,
                    }
                    continue;
                }
            }

            if let Some(cached) = self.tables.get(&key).filter(|cached| cached.hash == table_hash) {
                collected.extend(cached.variables.clone());
                outcome.tables_reused += 1;
                continue;
            }

            let cached = self.process_span(document, &span, table_hash);
            collected.extend(cached.variables.clone());
            self.tables.insert(key, cached);
            outcome.tables_processed += 1;
        }

        if scope.is_none() {
            self.tables
                .retain(|key, _| key.document != document || seen_starts.contains(&key.start));
        }

        outcome.variables = collected.len();
        outcome.index_changed = if complete {
            self.index.set_variables(document, collected)
        } else {
            self.index.merge_variables(document, collected)
        };

        if outcome.index_changed {
            outcome.persisted = self.persist();
        }

        debug!(
            document,
            processed = outcome.tables_processed,
            reused = outcome.tables_reused,
            out_of_scope = outcome.tables_out_of_scope,
            variables = outcome.variables,
            persisted = outcome.persisted,
            "recalculated document"
        );
        outcome
    }

    /// Recomputes `document` and returns its text with every formula table
    /// replaced by its rendered lines.
    pub fn render(&mut self, document: &str, text: &str) -> String {
        self.recalculate(document, text, None, false);

        let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
        for span in find_tables(text) {
            let Some(rendered) = self.processed_table(document, span.start) else {
                continue;
            };
            for (offset, line) in rendered.iter().enumerate() {
                lines[span.start + offset] = line.clone();
            }
        }
        lines.join("\n")
    }

    fn process_span(&mut self, document: &str, span: &TableSpan, hash: u64) -> CachedTable {
        for (r, line) in span.lines.iter().enumerate() {
            for (c, cell) in split_cells(line).iter().enumerate() {
                if cell.starts_with('=') {
                    self.index.store_formula(document, CellKey::new(span.start + r, c), cell);
                }
            }
        }

        let processed = {
            let evaluator = FormulaEvaluator::new(&self.index);
            process_table(&span.lines, &evaluator, &self.formatter)
        };
        debug!(document, start = span.start, rows = processed.lines.len(), "processed table");

        for (r, line) in processed.lines.iter().enumerate() {
            for (c, text) in split_cells(line).iter().enumerate() {
                let key = CellKey::new(span.start + r, c);
                if self.index.get_formula(document, key).is_some() {
                    self.index.store_computed_value(document, key, text);
                }
            }
        }

        CachedTable {
            hash,
            lines: processed.lines,
            variables: processed.variables,
        }
    }

    fn persist(&self) -> bool {
        match self.index.save() {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "could not persist variable index");
                false
            }
        }
    }

    /// Forces the next pass over `document` to recompute every table.
    pub fn invalidate(&mut self, document: &str) {
        self.document_hashes.remove(document);
        self.tables.retain(|key, _| key.document != document);
    }

    /// Drops everything known about a deleted document.
    pub fn forget(&mut self, document: &str) -> bool {
        self.invalidate(document);
        let removed = self.index.remove_document(document);
        if removed {
            self.persist();
        }
        removed
    }

    /// Carries a document's published variables over to its new name and
    /// recomputes it there.
    pub fn rename(&mut self, old: &str, new: &str, text: &str) -> RecalcOutcome {
        self.invalidate(old);
        let moved = self.index.rename_document(old, new);

        let mut outcome = self.recalculate(new, text, None, false);
        if moved && !outcome.persisted {
            outcome.persisted = self.persist();
        }
        outcome
    }
}
