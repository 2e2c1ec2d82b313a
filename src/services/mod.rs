//! Outbound integrations - the categorization model and the tax authority,
//! each behind an async trait so workflows stay testable offline.

pub mod authority;
pub mod classifier;
pub mod token_manager;
