//! Prompt-path extraction.

use uuid::Uuid;

use crate::conversation::Conversation;
use crate::error::{Result, TreeError};
use crate::message::Message;

impl Conversation {
    /// The ordered path of messages from the root down to `node_id`,
    /// inclusive. O(depth) thanks to the `ancestors` list.
    pub fn path_to_root(&self, node_id: Uuid) -> Result<Vec<&Message>> {
        let node = self
            .messages
            .get(&node_id)
            .ok_or(TreeError::NotFound(node_id))?;

        let mut path = Vec::with_capacity(node.ancestors.len() + 1);
        for id in &node.ancestors {
            path.push(self.messages.get(id).ok_or(TreeError::NotFound(*id))?);
        }
        path.push(node);
        Ok(path)
    }

    /// Owned copy of the prompt context for a generation pass ending at
    /// `node_id`. Never mutates the tree; callers retrying an assistant
    /// message pop the trailing placeholder themselves.
    pub fn build_subtree(&self, node_id: Uuid) -> Result<Vec<Message>> {
        Ok(self
            .path_to_root(node_id)?
            .into_iter()
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageFrom;

    #[test]
    fn path_runs_from_root_to_node() {
        let mut conv = Conversation::new("m", "pre");
        let root_id = conv.root_message_id.unwrap();
        let user = conv
            .insert_as_child(Message::new(MessageFrom::User, "hi"), Some(root_id))
            .unwrap();
        let assistant = conv
            .insert_as_child(Message::placeholder(), Some(user))
            .unwrap();

        let path = conv.path_to_root(assistant).unwrap();
        assert_eq!(path.len(), 3);
        assert_eq!(path[0].id, root_id);
        assert!(path[0].ancestors.is_empty());
        assert_eq!(path[2].id, assistant);
        assert_eq!(path.len(), path[2].ancestors.len() + 1);
    }

    #[test]
    fn unknown_node_is_rejected() {
        let conv = Conversation::new("m", "");
        let bogus = Uuid::new_v4();
        assert_eq!(
            conv.path_to_root(bogus).unwrap_err(),
            TreeError::NotFound(bogus)
        );
    }

    #[test]
    fn build_subtree_leaves_the_tree_untouched() {
        let mut conv = Conversation::new("m", "");
        let root_id = conv.root_message_id.unwrap();
        let user = conv
            .insert_as_child(Message::new(MessageFrom::User, "hi"), Some(root_id))
            .unwrap();

        let before = serde_json::to_value(&conv).unwrap();
        let subtree = conv.build_subtree(user).unwrap();
        let after = serde_json::to_value(&conv).unwrap();

        assert_eq!(subtree.len(), 2);
        assert_eq!(before, after);
    }
}
