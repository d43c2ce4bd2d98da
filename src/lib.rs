//! tablemath - Computed Markdown Tables
//!
//! Evaluates formula cells in the pipe tables of a folder of markdown
//! documents, publishes labelled row values for cross-document references,
//! and keeps everything current as documents change.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
pub use application::*;
