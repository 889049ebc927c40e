//! Persistence gateway for conversations.
//!
//! The core only needs a handful of operations against an abstract document
//! store: load-by-id and replace-fields-by-id with durable acknowledgement
//! at a few well-defined checkpoints, plus an hourly usage counter per
//! assistant. Two implementations ship here: a file-backed store (one JSON
//! document per conversation) and an in-memory store for tests and
//! embedding.

pub mod error;
pub mod file;
pub mod gateway;
pub mod memory;

pub use error::{Result, StoreError};
pub use file::FileConversationStore;
pub use gateway::{hour_bucket, ConversationStore};
pub use memory::MemoryConversationStore;
