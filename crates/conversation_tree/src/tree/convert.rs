//! Lazy conversion of legacy flat conversations to tree form.
//!
//! Older documents stored messages as an ordered array with no tree fields.
//! Conversion chains them linearly (message *i*'s parent is message *i-1*)
//! and promotes the first message to root. The operation is idempotent:
//! running it on an already-converted conversation is a no-op, so two turns
//! racing on the same document converge on the same shape.

use uuid::Uuid;

use crate::conversation::Conversation;

impl Conversation {
    /// Whether the conversation is already in tree form: a known root, and
    /// every other node chained to a parent that links back to it.
    pub fn is_tree(&self) -> bool {
        let Some(root_id) = self.root_message_id else {
            return false;
        };
        if !self.messages.contains(&root_id) {
            return false;
        }

        self.messages.values().all(|message| {
            if message.id == root_id {
                return message.ancestors.is_empty();
            }
            match message.ancestors.last() {
                Some(parent_id) => self
                    .messages
                    .get(parent_id)
                    .is_some_and(|parent| parent.children.contains(&message.id)),
                None => false,
            }
        })
    }

    /// Convert a legacy flat conversation in place. Returns whether a
    /// conversion was applied.
    pub fn convert_legacy(&mut self) -> bool {
        if self.is_tree() {
            return false;
        }

        // Legacy documents carry their array order; a malformed document
        // without one falls back on creation timestamps.
        let order: Vec<Uuid> = if self.messages.legacy_order().is_empty() {
            let mut messages: Vec<_> = self
                .messages
                .values()
                .map(|m| (m.created_at, m.id))
                .collect();
            messages.sort();
            messages.into_iter().map(|(_, id)| id).collect()
        } else {
            self.messages.legacy_order().to_vec()
        };

        let Some(first) = order.first().copied() else {
            return false;
        };

        let mut previous: Option<(Uuid, Vec<Uuid>)> = None;
        for id in &order {
            let ancestors = match &previous {
                None => Vec::new(),
                Some((parent_id, parent_ancestors)) => {
                    let mut ancestors = parent_ancestors.clone();
                    ancestors.push(*parent_id);
                    ancestors
                }
            };

            if let Some(message) = self.messages.get_mut(id) {
                message.ancestors = ancestors.clone();
                message.children.clear();
            }
            if let Some((parent_id, _)) = &previous {
                if let Some(parent) = self.messages.get_mut(parent_id) {
                    parent.children = vec![*id];
                }
            }
            previous = Some((*id, ancestors));
        }

        self.root_message_id = Some(first);
        self.messages.clear_legacy_order();

        tracing::info!(
            conversation_id = %self.id,
            messages = order.len(),
            "converted legacy conversation to tree form"
        );
        true
    }
}
