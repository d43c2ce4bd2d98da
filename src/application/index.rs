//! The cross-document variable index and its transient cell caches.

use crate::domain::{CellKey, NamedVariable, StoreResult, VariableLookup, VariableSet, VaultIndex};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{info, warn};

/// Persistence for the variable index.
pub trait IndexStore {
    fn load(&self) -> StoreResult<VaultIndex>;
    fn save(&self, index: &VaultIndex) -> StoreResult<()>;
}

/// Keeps the index in memory; clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    data: Rc<RefCell<VaultIndex>>,
    saves: Rc<RefCell<usize>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_index(index: VaultIndex) -> Self {
        let store = Self::default();
        *store.data.borrow_mut() = index;
        store
    }

    /// Number of completed saves.
    pub fn save_count(&self) -> usize {
        *self.saves.borrow()
    }

    pub fn snapshot(&self) -> VaultIndex {
        self.data.borrow().clone()
    }
}

impl IndexStore for MemoryStore {
    fn load(&self) -> StoreResult<VaultIndex> {
        Ok(self.data.borrow().clone())
    }

    fn save(&self, index: &VaultIndex) -> StoreResult<()> {
        *self.data.borrow_mut() = index.clone();
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

/// What happens to a document entry when a recompute publishes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// An empty set removes the entry.
    #[default]
    ClearOnEmpty,
    /// An empty set leaves the previous entry in place.
    KeepOnEmpty,
}

/// Document name to variables, plus per-cell formula and rendered-text caches.
///
/// Only the variables are persisted. The cell caches record what the last
/// recompute saw and produced; nothing reads them back during evaluation.
pub struct CrossDocumentIndex {
    variables: VaultIndex,
    policy: UpdatePolicy,
    formulas: FxHashMap<String, FxHashMap<CellKey, String>>,
    computed: FxHashMap<String, FxHashMap<CellKey, String>>,
    store: Box<dyn IndexStore>,
}

impl CrossDocumentIndex {
    /// An empty index backed by `store`; call [`load`](Self::load) to read it.
    pub fn new(store: Box<dyn IndexStore>) -> Self {
        Self {
            variables: VaultIndex::new(),
            policy: UpdatePolicy::default(),
            formulas: FxHashMap::default(),
            computed: FxHashMap::default(),
            store,
        }
    }

    pub fn with_policy(mut self, policy: UpdatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replaces the in-memory variables with the stored ones.
    ///
    /// A missing or unreadable store leaves the index empty.
    pub fn load(&mut self) {
        self.variables = match self.store.load() {
            Ok(index) => index,
            Err(err) => {
                warn!(%err, "could not load variable index, starting empty");
                VaultIndex::new()
            }
        };
    }

    pub fn save(&self) -> StoreResult<()> {
        self.store.save(&self.variables)?;
        info!(documents = self.variables.len(), "saved variable index");
        Ok(())
    }

    pub fn get(&self, document: &str, variable: &str) -> Option<&NamedVariable> {
        self.variables.get(document)?.get(variable)
    }

    pub fn variables(&self, document: &str) -> Option<&VariableSet> {
        self.variables.get(document)
    }

    pub fn entries(&self) -> &VaultIndex {
        &self.variables
    }

    pub fn policy(&self) -> UpdatePolicy {
        self.policy
    }

    /// Replaces a document's variables. Returns whether the stored entry changed.
    pub fn set_variables(&mut self, document: &str, variables: VariableSet) -> bool {
        if variables.is_empty() {
            return match self.policy {
                UpdatePolicy::ClearOnEmpty => self.variables.remove(document).is_some(),
                UpdatePolicy::KeepOnEmpty => false,
            };
        }

        if self.variables.get(document) == Some(&variables) {
            return false;
        }
        self.variables.insert(document.to_string(), variables);
        true
    }

    /// Adds or overwrites individual variables, keeping the rest of the entry.
    pub fn merge_variables(&mut self, document: &str, variables: VariableSet) -> bool {
        let mut changed = false;
        for (name, variable) in variables {
            let entry = self.variables.entry(document.to_string()).or_default();
            if entry.get(&name) != Some(&variable) {
                entry.insert(name, variable);
                changed = true;
            }
        }
        changed
    }

    pub fn remove_document(&mut self, document: &str) -> bool {
        self.forget_cells(document);
        self.variables.remove(document).is_some()
    }

    /// Moves a document's entry to its new name.
    pub fn rename_document(&mut self, old: &str, new: &str) -> bool {
        self.forget_cells(old);
        match self.variables.remove(old) {
            Some(variables) => {
                self.variables.insert(new.to_string(), variables);
                true
            }
            None => false,
        }
    }

    pub fn store_formula(&mut self, document: &str, key: CellKey, formula: &str) {
        self.formulas
            .entry(document.to_string())
            .or_default()
            .insert(key, formula.to_string());
    }

    pub fn get_formula(&self, document: &str, key: CellKey) -> Option<&str> {
        self.formulas.get(document)?.get(&key).map(String::as_str)
    }

    pub fn store_computed_value(&mut self, document: &str, key: CellKey, text: &str) {
        self.computed
            .entry(document.to_string())
            .or_default()
            .insert(key, text.to_string());
    }

    pub fn get_computed_value(&self, document: &str, key: CellKey) -> Option<&str> {
        self.computed.get(document)?.get(&key).map(String::as_str)
    }

    /// Drops the cell caches of one document.
    pub fn forget_cells(&mut self, document: &str) {
        self.formulas.remove(document);
        self.computed.remove(document);
    }
}

impl VariableLookup for CrossDocumentIndex {
    fn lookup(&self, document: &str, variable: &str) -> Option<NamedVariable> {
        self.get(document, variable).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(pairs: &[(&str, f64)]) -> VariableSet {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), NamedVariable { value: *value, currency: None }))
            .collect()
    }

    fn index() -> (CrossDocumentIndex, MemoryStore) {
        let store = MemoryStore::new();
        (CrossDocumentIndex::new(Box::new(store.clone())), store)
    }

    #[test]
    fn test_set_and_get() {
        let (mut index, _) = index();
        assert!(index.set_variables("Budget", set(&[("total", 1500.0)])));
        assert_eq!(index.get("Budget", "total").map(|v| v.value), Some(1500.0));
        assert_eq!(index.get("Budget", "other"), None);
        assert_eq!(index.get("Missing", "total"), None);
    }

    #[test]
    fn test_set_identical_reports_no_change() {
        let (mut index, _) = index();
        assert!(index.set_variables("Budget", set(&[("total", 1.0)])));
        assert!(!index.set_variables("Budget", set(&[("total", 1.0)])));
        assert!(index.set_variables("Budget", set(&[("total", 2.0)])));
    }

    #[test]
    fn test_replacement_drops_stale_variables() {
        let (mut index, _) = index();
        index.set_variables("Budget", set(&[("total", 1.0), ("rent", 2.0)]));
        index.set_variables("Budget", set(&[("total", 3.0)]));
        assert_eq!(index.get("Budget", "rent"), None);
    }

    #[test]
    fn test_empty_set_clears_by_default() {
        let (mut index, _) = index();
        index.set_variables("Budget", set(&[("total", 1.0)]));
        assert!(index.set_variables("Budget", VariableSet::new()));
        assert_eq!(index.variables("Budget"), None);
        assert!(!index.set_variables("Budget", VariableSet::new()));
    }

    #[test]
    fn test_empty_set_kept_with_legacy_policy() {
        let (index, _) = index();
        let mut index = index.with_policy(UpdatePolicy::KeepOnEmpty);
        index.set_variables("Budget", set(&[("total", 1.0)]));
        assert!(!index.set_variables("Budget", VariableSet::new()));
        assert_eq!(index.get("Budget", "total").map(|v| v.value), Some(1.0));
    }

    #[test]
    fn test_merge_variables() {
        let (mut index, _) = index();
        index.set_variables("Budget", set(&[("total", 1.0), ("rent", 2.0)]));
        assert!(index.merge_variables("Budget", set(&[("total", 5.0)])));
        assert!(!index.merge_variables("Budget", set(&[("total", 5.0)])));
        assert_eq!(index.get("Budget", "rent").map(|v| v.value), Some(2.0));
        assert_eq!(index.get("Budget", "total").map(|v| v.value), Some(5.0));
    }

    #[test]
    fn test_load_and_save_round_trip_through_store() {
        let (mut index, store) = index();
        index.set_variables("Budget", set(&[("total", 1500.0)]));
        index.save().unwrap();
        assert_eq!(store.save_count(), 1);

        let mut reloaded = CrossDocumentIndex::new(Box::new(store.clone()));
        reloaded.load();
        assert_eq!(reloaded.get("Budget", "total").map(|v| v.value), Some(1500.0));
    }

    #[test]
    fn test_rename_and_remove() {
        let (mut index, _) = index();
        index.set_variables("Old", set(&[("total", 1.0)]));
        assert!(index.rename_document("Old", "New"));
        assert_eq!(index.variables("Old"), None);
        assert_eq!(index.get("New", "total").map(|v| v.value), Some(1.0));
        assert!(index.remove_document("New"));
        assert!(!index.remove_document("New"));
    }

    #[test]
    fn test_cell_caches() {
        let (mut index, _) = index();
        let key = CellKey::new(4, 2);
        index.store_formula("Budget", key, "=SUM(col)");
        index.store_computed_value("Budget", key, "1,500");
        assert_eq!(index.get_formula("Budget", key), Some("=SUM(col)"));
        assert_eq!(index.get_computed_value("Budget", key), Some("1,500"));
        assert_eq!(index.get_formula("Budget", CellKey::new(0, 0)), None);

        index.forget_cells("Budget");
        assert_eq!(index.get_formula("Budget", key), None);
        assert_eq!(index.get_computed_value("Budget", key), None);
    }

    #[test]
    fn test_lookup_trait() {
        let (mut index, _) = index();
        index.set_variables("Budget", set(&[("total", 7.0)]));
        assert_eq!(VariableLookup::lookup(&index, "Budget", "total").map(|v| v.value), Some(7.0));
    }
}
