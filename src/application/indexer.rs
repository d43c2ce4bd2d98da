//! Startup indexing of every document, a batch at a time.

use super::documents::{DocumentId, DocumentSource};
use super::recalc::Recalculator;
use tracing::{info, warn};

/// Documents indexed per [`BulkIndexer::step`].
pub const INDEX_BATCH_SIZE: usize = 50;

const FUNCTION_MARKERS: [&str; 5] = ["=SUM(", "=AVG(", "=MIN(", "=MAX(", "=NOTE("];
const NOTE_MARKER: &str = "NOTE(";

/// Cheap text check run before a document is handed to the engine.
pub fn should_index(text: &str) -> bool {
    text.contains('|') && text.contains('=') && FUNCTION_MARKERS.iter().any(|marker| text.contains(marker))
}

/// Counters for a bulk pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexProgress {
    /// Documents looked at so far.
    pub visited: usize,
    pub total: usize,
    /// Documents that passed the text check and were recomputed.
    pub indexed: usize,
    pub failed: usize,
    /// Documents with `NOTE` references queued for a second pass, and how
    /// many of them have been recomputed.
    pub retry_total: usize,
    pub retried: usize,
}

impl IndexProgress {
    pub fn is_finished(&self) -> bool {
        self.visited >= self.total && self.retried >= self.retry_total
    }
}

/// Walks a fixed document listing in batches.
///
/// Each step is a yield point: the caller can redraw or handle input
/// between batches. Documents that read values from other documents are
/// recomputed once more after the listing is done, so a reference to a
/// document later in the listing resolves.
#[derive(Debug)]
pub struct BulkIndexer {
    queue: Vec<DocumentId>,
    retry: Vec<DocumentId>,
    batch_size: usize,
    progress: IndexProgress,
}

impl BulkIndexer {
    pub fn new(queue: Vec<DocumentId>) -> Self {
        let total = queue.len();
        Self {
            queue,
            retry: Vec::new(),
            batch_size: INDEX_BATCH_SIZE,
            progress: IndexProgress {
                total,
                ..IndexProgress::default()
            },
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn progress(&self) -> IndexProgress {
        self.progress
    }

    pub fn is_finished(&self) -> bool {
        self.progress.is_finished()
    }

    /// Indexes the next batch.
    pub fn step(&mut self, source: &dyn DocumentSource, recalc: &mut Recalculator) -> IndexProgress {
        if self.progress.visited < self.progress.total {
            self.index_batch(source, recalc);
        } else {
            self.retry_batch(source, recalc);
        }

        if self.is_finished() {
            info!(
                total = self.progress.total,
                indexed = self.progress.indexed,
                failed = self.progress.failed,
                "bulk indexing finished"
            );
        }
        self.progress
    }

    fn index_batch(&mut self, source: &dyn DocumentSource, recalc: &mut Recalculator) {
        let start = self.progress.visited;
        let end = (start + self.batch_size).min(self.queue.len());

        for id in &self.queue[start..end] {
            match source.read(id) {
                Ok(text) => {
                    if should_index(&text) {
                        recalc.recalculate(&id.name, &text, None, true);
                        self.progress.indexed += 1;
                        if text.contains(NOTE_MARKER) {
                            self.retry.push(id.clone());
                        }
                    }
                }
                Err(err) => {
                    warn!(path = %id.path.display(), %err, "skipping unreadable document");
                    self.progress.failed += 1;
                }
            }
        }
        self.progress.visited = end;
        self.progress.retry_total = self.retry.len();
    }

    fn retry_batch(&mut self, source: &dyn DocumentSource, recalc: &mut Recalculator) {
        let start = self.progress.retried;
        let end = (start + self.batch_size).min(self.retry.len());

        for id in &self.retry[start..end] {
            match source.read(id) {
                Ok(text) => {
                    recalc.invalidate(&id.name);
                    recalc.recalculate(&id.name, &text, None, true);
                }
                Err(err) => warn!(path = %id.path.display(), %err, "skipping unreadable document"),
            }
        }
        self.progress.retried = end;
    }

    /// Steps until every document has been visited.
    pub fn run(&mut self, source: &dyn DocumentSource, recalc: &mut Recalculator) -> IndexProgress {
        while !self.is_finished() {
            self.step(source, recalc);
        }
        self.progress
    }
}
