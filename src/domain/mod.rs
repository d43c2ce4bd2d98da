pub mod models;
pub mod parser;
pub mod functions;
pub mod services;
pub mod table;
pub mod format;
pub mod errors;

pub use models::*;
pub use services::*;
pub use table::*;
pub use format::*;
pub use errors::*;
