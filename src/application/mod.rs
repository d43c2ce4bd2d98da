//! Application layer: the recompute workflow around the domain types.
//!
//! Owns the cross-document index, decides which documents and tables need
//! recomputing, and keeps the state the terminal watcher renders.

pub mod debounce;
pub mod documents;
pub mod index;
pub mod indexer;
pub mod preview;
pub mod recalc;
pub mod state;

pub use debounce::*;
pub use documents::*;
pub use index::*;
pub use indexer::*;
pub use preview::*;
pub use recalc::*;
pub use state::*;
