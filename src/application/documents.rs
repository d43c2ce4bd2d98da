//! Documents as the engine sees them: a name, a location and some text.

use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};

/// A document known to a [`DocumentSource`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId {
    pub path: PathBuf,
    /// Name other documents use in `NOTE("...")`: the file stem.
    pub name: String,
}

impl DocumentId {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What changed in a source since it was last looked at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentChange {
    Created(DocumentId),
    Modified(DocumentId),
    Removed(DocumentId),
    Renamed { from: DocumentId, to: DocumentId },
}

/// Where document text comes from.
pub trait DocumentSource {
    fn list(&self) -> Vec<DocumentId>;
    fn read(&self, id: &DocumentId) -> io::Result<String>;
}

/// Documents held in memory, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct MemoryDocuments {
    documents: BTreeMap<String, String>,
}

impl MemoryDocuments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.documents.insert(name.to_string(), text.to_string());
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.documents.remove(name)
    }

    pub fn id(name: &str) -> DocumentId {
        DocumentId::from_path(format!("{name}.md"))
    }
}

impl DocumentSource for MemoryDocuments {
    fn list(&self) -> Vec<DocumentId> {
        self.documents.keys().map(|name| Self::id(name)).collect()
    }

    fn read(&self, id: &DocumentId) -> io::Result<String> {
        self.documents
            .get(&id.name)
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no document {}", id.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_from_path() {
        let id = DocumentId::from_path("notes/Budget 2025.md");
        assert_eq!(id.name, "Budget 2025");
        assert_eq!(id.path(), Path::new("notes/Budget 2025.md"));
    }

    #[test]
    fn test_memory_documents() {
        let mut documents = MemoryDocuments::new();
        documents.insert("Budget", "| a | 1 |");
        assert_eq!(documents.list(), vec![MemoryDocuments::id("Budget")]);
        assert_eq!(documents.read(&MemoryDocuments::id("Budget")).unwrap(), "| a | 1 |");

        documents.remove("Budget");
        assert!(documents.read(&MemoryDocuments::id("Budget")).is_err());
    }
}
