/// Database configuration and connection management
pub mod database;

/// External service settings from settings.toml or environment variables
pub mod settings;
