#![recursion_limit = "256"]

pub mod config;
pub mod db;
pub mod datasource;
pub mod error;
pub mod extractor;
pub mod http;
pub mod model;
pub mod monitor;
pub mod pipeline;
pub mod reconciler;
pub mod steps;

pub use error::{Error, Result};

pub const MIGRATIONS: diesel_migrations::EmbeddedMigrations = diesel_migrations::embed_migrations!();
