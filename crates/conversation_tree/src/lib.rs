//! Conversation tree data model and pure tree algorithms.
//!
//! A conversation is a tree of messages rather than a flat log: retries and
//! edits graft sibling branches, and the prompt for a generation pass is the
//! path from the root down to one node. This crate owns the persisted shapes
//! (`Conversation`, `Message`, the `MessageUpdate` wire events) and the
//! mutation primitives that keep the tree consistent. No I/O happens here.

pub mod conversation;
pub mod error;
pub mod message;
pub mod tree;
pub mod update;

pub use conversation::{Conversation, MessagePool};
pub use error::{Result, TreeError};
pub use message::{FileKind, Message, MessageFile, MessageFrom, MessageState};
pub use update::{MessageUpdate, ReasoningUpdate, UpdateStatus};
