//! Application state for the terminal watcher.
//!
//! The state owns the engine and a document source. The event loop feeds it
//! document changes and clock ticks; rendering only reads from it.

use super::debounce::Debouncer;
use super::documents::{DocumentChange, DocumentId, DocumentSource};
use super::indexer::{BulkIndexer, IndexProgress};
use super::preview::PreviewRenderer;
use super::recalc::{RecalcOutcome, Recalculator};
use crate::domain::{find_tables, has_formulas};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Represents the current mode of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Document list has focus
    Normal,
    /// Help screen is displayed
    Help,
}

/// The most recent recompute, for the status bar.
#[derive(Debug, Clone)]
pub struct LastRecalc {
    pub document: String,
    pub outcome: RecalcOutcome,
}

/// Main application state.
///
/// # Examples
///
/// ```
/// use tablemath::application::{App, CrossDocumentIndex, MemoryDocuments, MemoryStore, Recalculator};
/// use tablemath::domain::Settings;
///
/// let mut documents = MemoryDocuments::new();
/// documents.insert("Budget", "| Rent | 1000 |\n| Total | =SUM(col) |");
/// let index = CrossDocumentIndex::new(Box::new(MemoryStore::new()));
/// let mut app = App::new(Recalculator::new(Settings::default(), index), documents);
///
/// app.run_indexing();
/// assert_eq!(app.documents.len(), 1);
/// assert!(app.preview().contains("| Total | 1,000 |"));
/// ```
pub struct App<S> {
    pub recalc: Recalculator,
    pub source: S,
    /// Documents that contain at least one table, sorted by path.
    pub documents: Vec<DocumentId>,
    /// Index into `documents` of the highlighted entry
    pub selected: usize,
    pub mode: AppMode,
    /// Scroll position in help text
    pub help_scroll: usize,
    /// Scroll position in the preview pane
    pub preview_scroll: usize,
    /// Temporary status message to display
    pub status_message: Option<String>,
    pub last_recalc: Option<LastRecalc>,
    /// Directory CSV exports are written to
    pub export_dir: PathBuf,
    pending: Debouncer<DocumentId>,
    indexer: Option<BulkIndexer>,
}

impl<S: DocumentSource> App<S> {
    /// Lists the source and queues every document for bulk indexing.
    pub fn new(recalc: Recalculator, source: S) -> Self {
        let listing = source.list();
        let documents = listing
            .iter()
            .filter(|id| source.read(id).is_ok_and(|text| !find_tables(&text).is_empty()))
            .cloned()
            .collect();

        Self {
            recalc,
            documents,
            selected: 0,
            mode: AppMode::Normal,
            help_scroll: 0,
            preview_scroll: 0,
            status_message: None,
            last_recalc: None,
            export_dir: PathBuf::from("."),
            pending: Debouncer::default(),
            indexer: Some(BulkIndexer::new(listing)),
            source,
        }
    }

    pub fn with_export_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.export_dir = dir.into();
        self
    }

    pub fn selected_document(&self) -> Option<&DocumentId> {
        self.documents.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.documents.len() {
            self.selected += 1;
            self.preview_scroll = 0;
        }
    }

    pub fn select_previous(&mut self) {
        if self.selected > 0 {
            self.selected -= 1;
            self.preview_scroll = 0;
        }
    }

    pub fn scroll_preview(&mut self, delta: isize) {
        self.preview_scroll = self.preview_scroll.saturating_add_signed(delta);
    }

    pub fn show_help(&mut self) {
        self.mode = AppMode::Help;
        self.help_scroll = 0;
    }

    pub fn hide_help(&mut self) {
        self.mode = AppMode::Normal;
    }

    pub fn indexing_progress(&self) -> Option<IndexProgress> {
        self.indexer.as_ref().map(BulkIndexer::progress)
    }

    /// Advances bulk indexing by one batch.
    pub fn step_indexing(&mut self) {
        let Some(indexer) = self.indexer.as_mut() else {
            return;
        };
        let progress = indexer.step(&self.source, &mut self.recalc);
        if progress.is_finished() {
            self.indexer = None;
            self.status_message = Some(format!(
                "Indexed {} of {} documents",
                progress.indexed, progress.total
            ));
        }
    }

    /// Finishes bulk indexing without yielding.
    pub fn run_indexing(&mut self) {
        while self.indexer.is_some() {
            self.step_indexing();
        }
    }

    /// Applies changes reported by the source.
    ///
    /// Edits are debounced per document; removals and renames take effect
    /// immediately.
    pub fn apply_changes(&mut self, changes: Vec<DocumentChange>, now: Instant) {
        for change in changes {
            match change {
                DocumentChange::Created(id) | DocumentChange::Modified(id) => {
                    self.track(&id);
                    self.pending.touch(id, now);
                }
                DocumentChange::Removed(id) => {
                    self.pending.cancel(&id);
                    self.untrack(&id);
                    self.recalc.forget(&id.name);
                    info!(document = %id.name, "document removed");
                }
                DocumentChange::Renamed { from, to } => {
                    self.pending.cancel(&from);
                    self.untrack(&from);
                    self.track(&to);
                    match self.source.read(&to) {
                        Ok(text) => {
                            let outcome = self.recalc.rename(&from.name, &to.name, &text);
                            self.record(&to.name, outcome);
                        }
                        Err(err) => warn!(path = %to.path.display(), %err, "could not read renamed document"),
                    }
                    self.status_message = Some(format!("Renamed {} to {}", from.name, to.name));
                }
            }
        }
    }

    /// Recomputes documents whose debounce delay has passed, then indexes one batch.
    pub fn tick(&mut self, now: Instant) {
        for id in self.pending.take_due(now) {
            match self.source.read(&id) {
                Ok(text) => {
                    let outcome = self.recalc.recalculate(&id.name, &text, None, true);
                    if !outcome.unchanged {
                        self.record(&id.name, outcome);
                    }
                }
                Err(err) => warn!(path = %id.path.display(), %err, "could not read changed document"),
            }
        }
        self.step_indexing();
    }

    /// Full recompute of the selected document, ignoring every cache.
    pub fn recalculate_selected(&mut self) {
        let Some(id) = self.selected_document().cloned() else {
            return;
        };
        match self.source.read(&id) {
            Ok(text) => {
                self.recalc.invalidate(&id.name);
                let outcome = self.recalc.recalculate(&id.name, &text, None, false);
                self.status_message = Some(format!(
                    "Recalculated {}: {} tables, {} variables",
                    id.name, outcome.tables_processed, outcome.variables
                ));
                self.record(&id.name, outcome);
            }
            Err(err) => self.status_message = Some(format!("Error: {err}")),
        }
    }

    /// The selected document with computed tables.
    pub fn preview(&self) -> String {
        let Some(id) = self.selected_document() else {
            return String::new();
        };
        match self.source.read(id) {
            Ok(text) => PreviewRenderer::new(self.recalc.index(), self.recalc.formatter()).render_document(&text),
            Err(err) => format!("Error reading {}: {err}", id.path.display()),
        }
    }

    /// Rendered lines of the first formula table of the selected document.
    pub fn selected_table(&mut self) -> Option<(String, Vec<String>)> {
        let id = self.selected_document()?.clone();
        let text = self.source.read(&id).ok()?;
        self.recalc.recalculate(&id.name, &text, None, false);

        let span = find_tables(&text)
            .into_iter()
            .find(|span| has_formulas(&span.lines))?;
        let lines = self.recalc.processed_table(&id.name, span.start)?.to_vec();
        Some((id.name, lines))
    }

    /// Sets the status message from the result of a CSV export.
    pub fn set_export_result(&mut self, result: Result<String, String>) {
        self.status_message = Some(match result {
            Ok(filename) => format!("Exported to {filename}"),
            Err(err) => format!("Error: {err}"),
        });
    }

    fn record(&mut self, document: &str, outcome: RecalcOutcome) {
        self.last_recalc = Some(LastRecalc {
            document: document.to_string(),
            outcome,
        });
    }

    fn track(&mut self, id: &DocumentId) {
        let has_tables = self
            .source
            .read(id)
            .is_ok_and(|text| !find_tables(&text).is_empty());
        let known = self.documents.iter().position(|known| known == id);

        match (has_tables, known) {
            (true, None) => {
                self.documents.push(id.clone());
                self.documents.sort();
            }
            (false, Some(_)) => self.untrack(id),
            _ => {}
        }
    }

    fn untrack(&mut self, id: &DocumentId) {
        self.documents.retain(|known| known != id);
        if self.selected >= self.documents.len() {
            self.selected = self.documents.len().saturating_sub(1);
        }
    }
}
