//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod authority_token;
pub mod file;
pub mod submission;
pub mod transaction;

// Re-export specific types to avoid conflicts
pub use authority_token::{
    Column as AuthorityTokenColumn, Entity as AuthorityToken, Model as AuthorityTokenModel,
};
pub use file::{Column as FileColumn, Entity as File, FileStatus, Model as FileModel};
pub use submission::{
    Column as SubmissionColumn, Entity as Submission, Model as SubmissionModel, SubmissionKind,
    SubmissionStatus,
};
pub use transaction::{
    Column as TransactionColumn, Direction, Entity as Transaction, Model as TransactionModel,
    VerificationStatus,
};
