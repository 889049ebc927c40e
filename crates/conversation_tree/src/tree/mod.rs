//! Tree mutation primitives.
//!
//! Every primitive maintains both adjacency lists (`ancestors` on the new
//! node, `children` on the parent) in the same call; nothing else in the
//! codebase is allowed to touch one without the other.

mod convert;
mod subtree;

use uuid::Uuid;

use crate::conversation::Conversation;
use crate::error::{Result, TreeError};
use crate::message::Message;

impl Conversation {
    /// Validate an externally supplied message id before using it in a
    /// mutation.
    pub fn is_valid_message_id(&self, id: Uuid) -> bool {
        self.messages.contains(&id)
    }

    /// The deepest last-child descendant of the root: where a new message
    /// lands when the caller does not name a parent.
    pub fn latest_leaf(&self) -> Option<Uuid> {
        let mut current = self.root_message_id?;
        loop {
            let node = self.messages.get(&current)?;
            match node.children.last() {
                Some(child) => current = *child,
                None => return Some(current),
            }
        }
    }

    /// Insert `message` as a child of `parent_id`, or of the latest leaf
    /// when no parent is named. Inserting under a node that already has
    /// children is legal and creates a branch.
    pub fn insert_as_child(
        &mut self,
        mut message: Message,
        parent_id: Option<Uuid>,
    ) -> Result<Uuid> {
        let parent_id = match parent_id {
            Some(id) => id,
            None => self.latest_leaf().ok_or_else(|| {
                TreeError::InvalidOperation(
                    "conversation has no message to attach to".to_string(),
                )
            })?,
        };

        let parent = self
            .messages
            .get_mut(&parent_id)
            .ok_or(TreeError::NotFound(parent_id))?;

        let mut ancestors = parent.ancestors.clone();
        ancestors.push(parent_id);
        parent.children.push(message.id);

        message.ancestors = ancestors;
        let id = message.id;

        tracing::debug!(
            conversation_id = %self.id,
            message_id = %id,
            parent_id = %parent_id,
            role = ?message.from,
            "inserting message as child"
        );

        self.messages.insert(message);
        self.touch();
        Ok(id)
    }

    /// Insert `message` as a sibling of `sibling_id`, directly after it in
    /// the parent's child order. The root cannot gain siblings: the tree
    /// keeps exactly one root.
    pub fn insert_as_sibling(&mut self, mut message: Message, sibling_id: Uuid) -> Result<Uuid> {
        let sibling = self
            .messages
            .get(&sibling_id)
            .ok_or(TreeError::NotFound(sibling_id))?;

        let parent_id = sibling.ancestors.last().copied().ok_or_else(|| {
            TreeError::InvalidOperation("cannot add a sibling to the root message".to_string())
        })?;
        let ancestors = sibling.ancestors.clone();

        let parent = self
            .messages
            .get_mut(&parent_id)
            .ok_or(TreeError::NotFound(parent_id))?;

        let position = parent
            .children
            .iter()
            .position(|child| *child == sibling_id)
            .map(|index| index + 1)
            .unwrap_or(parent.children.len());
        parent.children.insert(position, message.id);

        message.ancestors = ancestors;
        let id = message.id;

        tracing::debug!(
            conversation_id = %self.id,
            message_id = %id,
            sibling_id = %sibling_id,
            parent_id = %parent_id,
            role = ?message.from,
            "inserting message as sibling"
        );

        self.messages.insert(message);
        self.touch();
        Ok(id)
    }
}
