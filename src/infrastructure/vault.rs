//! A directory of markdown documents and change detection by polling.

use crate::application::{DocumentChange, DocumentId, DocumentSource, content_hash};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

const DOCUMENT_EXTENSION: &str = "md";

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    modified: Option<SystemTime>,
    hash: u64,
}

pub struct VaultDirectory {
    root: PathBuf,
    known: BTreeMap<PathBuf, Snapshot>,
}

impl VaultDirectory {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            known: BTreeMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Records the current state so the next scan only reports later changes.
    pub fn prime(&mut self) {
        self.scan_changes();
    }

    /// Compares the directory against the previous scan.
    ///
    /// A removed and a created document with the same content in one scan
    /// are reported as a rename.
    pub fn scan_changes(&mut self) -> Vec<DocumentChange> {
        let mut current = BTreeMap::new();
        let mut created = Vec::new();
        let mut changes = Vec::new();

        for path in self.markdown_files() {
            let modified = fs::metadata(&path).and_then(|meta| meta.modified()).ok();
            match self.known.get(&path) {
                Some(previous) if previous.modified == modified => {
                    current.insert(path, *previous);
                }
                previous => {
                    let text = match fs::read_to_string(&path) {
                        Ok(text) => text,
                        Err(err) => {
                            // Still on disk; retried on the next scan.
                            debug!(path = %path.display(), error = %err, "skipping unreadable document");
                            if let Some(previous) = previous {
                                current.insert(path, *previous);
                            }
                            continue;
                        }
                    };
                    let snapshot = Snapshot {
                        modified,
                        hash: content_hash(&text),
                    };
                    match previous {
                        Some(_) => changes.push(DocumentChange::Modified(DocumentId::from_path(&path))),
                        None => created.push((path.clone(), snapshot.hash)),
                    }
                    current.insert(path, snapshot);
                }
            }
        }

        let mut removed: Vec<(PathBuf, u64)> = self
            .known
            .iter()
            .filter(|(path, _)| !current.contains_key(*path))
            .map(|(path, snapshot)| (path.clone(), snapshot.hash))
            .collect();

        for (path, hash) in created {
            let to = DocumentId::from_path(&path);
            match removed.iter().position(|(_, old)| *old == hash) {
                Some(i) => {
                    let (old_path, _) = removed.swap_remove(i);
                    changes.push(DocumentChange::Renamed {
                        from: DocumentId::from_path(old_path),
                        to,
                    });
                }
                None => changes.push(DocumentChange::Created(to)),
            }
        }
        changes.extend(
            removed
                .into_iter()
                .map(|(path, _)| DocumentChange::Removed(DocumentId::from_path(path))),
        );

        if !changes.is_empty() {
            debug!(count = changes.len(), "vault changed");
        }
        self.known = current;
        changes
    }

    fn markdown_files(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        collect_markdown(&self.root, &mut files);
        files.sort();
        files
    }
}

fn collect_markdown(dir: &Path, files: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if path.is_dir() {
            if !hidden {
                collect_markdown(&path, files);
            }
        } else if path.extension().is_some_and(|ext| ext == DOCUMENT_EXTENSION) {
            files.push(path);
        }
    }
}

impl DocumentSource for VaultDirectory {
    fn list(&self) -> Vec<DocumentId> {
        self.markdown_files().into_iter().map(DocumentId::from_path).collect()
    }

    fn read(&self, id: &DocumentId) -> io::Result<String> {
        fs::read_to_string(&id.path)
    }
}
