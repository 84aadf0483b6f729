use super::entry::{format_response_time, ConversationEntry};

/// A history row as displayed: newest first, numbered by insertion order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistoryItem<'a> {
    pub ordinal: usize,
    pub entry: &'a ConversationEntry,
}

impl HistoryItem<'_> {
    pub fn label(&self) -> String {
        format!("#{}", self.ordinal)
    }

    pub fn heading(&self) -> String {
        format!("Q&A {} - {}", self.label(), self.entry.timestamp())
    }

    pub fn response_time_caption(&self) -> String {
        format!(
            "Response time: {}",
            format_response_time(self.entry.response_time_seconds())
        )
    }
}

pub fn history_view(entries: &[ConversationEntry]) -> Vec<HistoryItem<'_>> {
    entries
        .iter()
        .enumerate()
        .rev()
        .map(|(idx, entry)| HistoryItem {
            ordinal: idx + 1,
            entry,
        })
        .collect()
}
