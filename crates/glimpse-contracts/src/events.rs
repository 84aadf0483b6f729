use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, bail, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

/// Everything a session records. Serialized with a `type` tag in snake_case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        model: String,
        provider: String,
        requested_model: Option<String>,
        fallback_reason: Option<String>,
        temperature: f32,
        top_k: u32,
    },
    ImageIngested {
        source: Option<String>,
        format: String,
        width: u32,
        height: u32,
        bytes: u64,
        sha256: String,
    },
    ImageRejected {
        source: Option<String>,
        error: String,
    },
    QuestionAnswered {
        model: String,
        question: String,
        answer_chars: usize,
        response_time_s: f64,
        history_len: usize,
    },
    QuestionFailed {
        model: String,
        question: String,
        kind: String,
        error: String,
    },
    /// Snapshot of the settings after a change.
    SettingsChanged {
        model: String,
        temperature: f32,
        top_k: u32,
    },
    SessionCleared {
        had_image: bool,
        dropped_entries: usize,
    },
}

impl SessionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted { .. } => "session_started",
            SessionEvent::ImageIngested { .. } => "image_ingested",
            SessionEvent::ImageRejected { .. } => "image_rejected",
            SessionEvent::QuestionAnswered { .. } => "question_answered",
            SessionEvent::QuestionFailed { .. } => "question_failed",
            SessionEvent::SettingsChanged { .. } => "settings_changed",
            SessionEvent::SessionCleared { .. } => "session_cleared",
        }
    }
}

/// Append-only JSONL log for one session.
///
/// Each line is the event's own fields plus `session_id` and `ts` (RFC 3339,
/// UTC, microseconds). Without a path the record is still built and returned
/// but nothing is written.
#[derive(Debug, Clone)]
pub struct EventWriter {
    shared: Arc<Sink>,
}

#[derive(Debug)]
struct Sink {
    path: Option<PathBuf>,
    session_id: String,
    write_lock: Mutex<()>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self::with_sink(Some(path.into()), session_id.into())
    }

    pub fn disabled(session_id: impl Into<String>) -> Self {
        Self::with_sink(None, session_id.into())
    }

    fn with_sink(path: Option<PathBuf>, session_id: String) -> Self {
        Self {
            shared: Arc::new(Sink {
                path,
                session_id,
                write_lock: Mutex::new(()),
            }),
        }
    }

    pub fn emit(&self, event: &SessionEvent) -> Result<Value> {
        let record = self.record(event)?;
        let Some(path) = self.shared.path.as_deref() else {
            return Ok(record);
        };

        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut line = serde_json::to_string(&record)?;
        line.push('\n');

        let _guard = self
            .shared
            .write_lock
            .lock()
            .map_err(|_| anyhow!("event log lock poisoned"))?;
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?
            .write_all(line.as_bytes())?;
        Ok(record)
    }

    fn record(&self, event: &SessionEvent) -> Result<Value> {
        let Value::Object(mut fields) = serde_json::to_value(event)? else {
            bail!("{} did not serialize to an object", event.event_type());
        };
        fields.insert(
            "session_id".to_string(),
            Value::String(self.shared.session_id.clone()),
        );
        fields.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        Ok(Value::Object(fields))
    }
}
