//! Core business logic - the pipeline from raw spreadsheet bytes to an
//! accepted authority submission, framework-agnostic and injectable.

pub mod aggregate;
pub mod categories;
pub mod categorize;
pub mod file;
pub mod ingest;
pub mod normalize;
pub mod spreadsheet;
pub mod submission;
pub mod transaction;
pub mod verify;
