//! Chat backend service.
//!
//! Glues the conversation tree to a generation backend: HTTP routes accept
//! a turn request, the orchestrator grafts placeholder nodes onto the tree
//! and drives one generation pass per assistant, and the update sink turns
//! backend events into tree mutations plus a padded newline-delimited JSON
//! stream for the client.

pub mod assistants;
pub mod config;
pub mod controllers;
pub mod dto;
pub mod error;
pub mod files;
pub mod generation;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod services;

pub use error::{AppError, Result};
pub use server::AppState;
