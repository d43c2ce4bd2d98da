//! Infrastructure layer: files on disk.
//!
//! The vault directory, the persisted index and settings, and CSV export.

pub mod csv_export;
pub mod persistence;
pub mod vault;

pub use csv_export::*;
pub use persistence::*;
pub use vault::*;
