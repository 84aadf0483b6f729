use serde::{Deserialize, Serialize};

/// One answered question. Built once by the query executor and never changed
/// afterwards; the fields are private so a stored entry stays as it was.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationEntry {
    question: String,
    answer: String,
    response_time_seconds: f64,
    timestamp: String,
}

impl ConversationEntry {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        response_time_seconds: f64,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            response_time_seconds: response_time_seconds.max(0.0),
            timestamp: timestamp.into(),
        }
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn response_time_seconds(&self) -> f64 {
        self.response_time_seconds
    }

    /// Wall-clock completion time, `HH:MM:SS`.
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }
}

pub fn format_response_time(seconds: f64) -> String {
    format!("{seconds:.2}s")
}
