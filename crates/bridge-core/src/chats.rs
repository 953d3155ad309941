use std::collections::HashMap;

use crate::types::ChatSummary;

/// Chat list merged from dialogs, group chats and channels.
///
/// Entries keep first-seen order. When the same id arrives twice, the entry
/// with the higher-priority kind wins and missing metadata is backfilled from
/// the other one.
#[derive(Debug, Clone, Default)]
pub struct ChatAggregate {
    items: Vec<ChatSummary>,
    index: HashMap<i64, usize>,
}

impl ChatAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ChatSummary] {
        &self.items
    }

    /// Insert or merge one entry.
    pub fn upsert(&mut self, incoming: ChatSummary) {
        let Some(&idx) = self.index.get(&incoming.id) else {
            self.index.insert(incoming.id, self.items.len());
            self.items.push(incoming);
            return;
        };

        let existing = &mut self.items[idx];
        if incoming.kind > existing.kind {
            let previous = std::mem::replace(existing, incoming);
            backfill(existing, previous);
        } else {
            backfill(existing, incoming);
        }
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = ChatSummary>) {
        for entry in entries {
            self.upsert(entry);
        }
    }

    pub fn into_vec(self) -> Vec<ChatSummary> {
        self.items
    }
}

fn backfill(winner: &mut ChatSummary, loser: ChatSummary) {
    if winner.title.trim().is_empty() && !loser.title.trim().is_empty() {
        winner.title = loser.title;
    }
    if winner.icon_url.is_none() {
        winner.icon_url = loser.icon_url;
    }
    if winner.photo_id.is_none() {
        winner.photo_id = loser.photo_id;
    }
    if winner.cid.is_none() {
        winner.cid = loser.cid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChatKind;

    fn summary(id: i64, kind: ChatKind, title: &str, icon: Option<&str>) -> ChatSummary {
        ChatSummary {
            id,
            title: title.to_owned(),
            kind,
            photo_id: None,
            icon_url: icon.map(str::to_owned),
            unread_count: 0,
            cid: None,
        }
    }

    #[test]
    fn channel_outranks_chat_and_is_backfilled() {
        let mut chats = ChatAggregate::new();
        chats.upsert(summary(10, ChatKind::Chat, "", Some("https://x/icon")));
        chats.upsert(summary(10, ChatKind::Channel, "News", None));

        let merged = chats.into_vec();
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kind, ChatKind::Channel);
        assert_eq!(merged[0].title, "News");
        assert_eq!(merged[0].icon_url.as_deref(), Some("https://x/icon"));
    }

    #[test]
    fn lower_priority_duplicate_only_fills_gaps() {
        let mut chats = ChatAggregate::new();
        chats.upsert(summary(5, ChatKind::Channel, "", None));
        chats.upsert(summary(5, ChatKind::Dialog, "Alice", Some("https://x/a")));

        let merged = &chats.items()[0];
        assert_eq!(merged.kind, ChatKind::Channel);
        assert_eq!(merged.title, "Alice");
        assert_eq!(merged.icon_url.as_deref(), Some("https://x/a"));
    }

    #[test]
    fn keeps_first_seen_order() {
        let mut chats = ChatAggregate::new();
        chats.extend([
            summary(3, ChatKind::Dialog, "c", None),
            summary(1, ChatKind::Chat, "a", None),
            summary(3, ChatKind::Channel, "c2", None),
            summary(2, ChatKind::Channel, "b", None),
        ]);

        let ids: Vec<i64> = chats.items().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(chats.items()[0].title, "c2");
        assert_eq!(chats.len(), 3);
    }
}
