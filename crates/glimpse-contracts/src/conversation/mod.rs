mod entry;
mod history;

pub use entry::{format_response_time, ConversationEntry};
pub use history::{history_view, HistoryItem};
