pub mod config;
pub mod error;
pub mod executor;
pub mod ingest;
pub mod providers;
pub mod session;

use std::path::{Path, PathBuf};

use glimpse_contracts::conversation::ConversationEntry;
use glimpse_contracts::events::{EventWriter, SessionEvent};
use glimpse_contracts::models::{ModelSelection, ModelSpec};
use glimpse_contracts::params::{GenerationParameters, ParamsError};

use crate::config::{build_providers, select_model, AppConfig, API_KEY_VARS};
use crate::error::{ConfigError, IngestError, QueryError};
use crate::executor::{check_question, QueryExecutor, DEFAULT_SYSTEM_PROMPT};
use crate::ingest::{format_label, ingest, ingest_path, IngestedImage};
use crate::providers::VisionProviderRegistry;
use crate::session::SessionHandle;

/// One chat session wired to its providers and event log.
///
/// Every state change goes through here so the matching event is always
/// written; hosts only render results.
pub struct VisionEngine {
    session: SessionHandle,
    providers: VisionProviderRegistry,
    selection: ModelSelection,
    system_prompt: String,
    events: EventWriter,
}

impl VisionEngine {
    pub fn new(
        config: &AppConfig,
        requested_model: Option<&str>,
        params: GenerationParameters,
        events_path: Option<PathBuf>,
    ) -> Result<Self, ConfigError> {
        let selection = select_model(requested_model)?;
        let providers = build_providers(config, &selection.model)?;
        Ok(Self::from_parts(providers, selection, params, events_path))
    }

    pub fn from_parts(
        providers: VisionProviderRegistry,
        selection: ModelSelection,
        params: GenerationParameters,
        events_path: Option<PathBuf>,
    ) -> Self {
        let session = SessionHandle::new(params);
        let events = match events_path {
            Some(path) => EventWriter::new(path, session.id()),
            None => EventWriter::disabled(session.id()),
        };
        let engine = Self {
            session,
            providers,
            selection,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            events,
        };
        engine.emit_event(SessionEvent::SessionStarted {
            model: engine.selection.model.name.clone(),
            provider: engine.selection.model.provider.clone(),
            requested_model: engine.selection.requested.clone(),
            fallback_reason: engine.selection.fallback_reason.clone(),
            temperature: engine.session.params().temperature(),
            top_k: engine.session.params().top_k(),
        });
        tracing::info!(
            session_id = engine.session.id(),
            model = %engine.selection.model.name,
            "session started"
        );
        engine
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn model(&self) -> &ModelSpec {
        &self.selection.model
    }

    pub fn model_selection(&self) -> &ModelSelection {
        &self.selection
    }

    pub fn params(&self) -> GenerationParameters {
        self.session.params()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn upload_path(&mut self, path: &Path) -> Result<&IngestedImage, IngestError> {
        let outcome = ingest_path(path);
        self.record_upload(outcome, Some(path))
    }

    pub fn upload_bytes(
        &mut self,
        raw_bytes: &[u8],
        declared_size_bytes: u64,
    ) -> Result<&IngestedImage, IngestError> {
        let outcome = ingest(raw_bytes, declared_size_bytes);
        self.record_upload(outcome, None)
    }

    fn record_upload(
        &mut self,
        outcome: Result<IngestedImage, IngestError>,
        source: Option<&Path>,
    ) -> Result<&IngestedImage, IngestError> {
        let source = source.map(|path| path.to_string_lossy().to_string());
        match outcome {
            Ok(image) => {
                self.emit_event(SessionEvent::ImageIngested {
                    source,
                    format: format_label(image.source_format()).to_string(),
                    width: image.width(),
                    height: image.height(),
                    bytes: image.byte_len(),
                    sha256: image.fingerprint().to_string(),
                });
                Ok(self.session.state_mut().set_image(image))
            }
            Err(err) => {
                tracing::warn!(error = %err, "upload rejected");
                self.emit_event(SessionEvent::ImageRejected {
                    source,
                    error: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Ok when `ask` would reach the model: the question is not blank and an
    /// image is loaded.
    pub fn check_question(&self, question: &str) -> Result<(), QueryError> {
        check_question(question, self.session.state().current_image()).map(|_| ())
    }

    /// Asks the configured model about the current image. History grows only
    /// on success.
    pub fn ask(&mut self, question: &str) -> Result<ConversationEntry, QueryError> {
        let model = &self.selection.model;
        let outcome = match self.providers.get(&model.provider) {
            Some(provider) => QueryExecutor::new(provider, model.name.as_str())
                .with_system_prompt(self.system_prompt.as_str())
                .ask_in_session(&mut self.session, question),
            None => Err(QueryError::RemoteCallFailed(format!(
                "no provider registered for '{}'",
                model.provider
            ))),
        };
        let model = self.selection.model.name.clone();
        self.emit_event(match &outcome {
            Ok(entry) => SessionEvent::QuestionAnswered {
                model,
                question: entry.question().to_string(),
                answer_chars: entry.answer().chars().count(),
                response_time_s: entry.response_time_seconds(),
                history_len: self.session.state().history().len(),
            },
            Err(err) => SessionEvent::QuestionFailed {
                model,
                question: question.trim().to_string(),
                kind: err.kind().to_string(),
                error: err.to_string(),
            },
        });
        outcome
    }

    pub fn set_temperature(&mut self, value: f32) -> Result<GenerationParameters, ParamsError> {
        let updated = self.session.params().with_temperature(value)?;
        self.apply_params(updated);
        Ok(updated)
    }

    pub fn set_top_k(&mut self, value: u32) -> Result<GenerationParameters, ParamsError> {
        let updated = self.session.params().with_top_k(value)?;
        self.apply_params(updated);
        Ok(updated)
    }

    fn apply_params(&mut self, params: GenerationParameters) {
        *self.session.params_mut() = params;
        self.emit_settings();
    }

    fn emit_settings(&self) {
        let params = self.session.params();
        self.emit_event(SessionEvent::SettingsChanged {
            model: self.selection.model.name.clone(),
            temperature: params.temperature(),
            top_k: params.top_k(),
        });
    }

    /// Switches models for later questions. The new model's provider must
    /// already be registered; a remote one without a credential is refused.
    pub fn set_model(&mut self, name: &str) -> Result<&ModelSelection, ConfigError> {
        let selection = select_model(Some(name))?;
        if self.providers.get(&selection.model.provider).is_none() {
            if selection.model.is_remote() {
                return Err(ConfigError::Missing {
                    key: API_KEY_VARS[0].to_string(),
                });
            }
            return Err(ConfigError::ModelSelection(format!(
                "no provider registered for '{}'",
                selection.model.provider
            )));
        }
        self.selection = selection;
        self.emit_settings();
        Ok(&self.selection)
    }

    pub fn clear(&mut self) {
        let dropped_entries = self.session.state().history().len();
        let had_image = self.session.state().current_image().is_some();
        self.session.state_mut().clear();
        self.emit_event(SessionEvent::SessionCleared {
            had_image,
            dropped_entries,
        });
    }

    /// The event log is diagnostic only; a failed write is logged and the
    /// session carries on.
    fn emit_event(&self, event: SessionEvent) {
        if let Err(err) = self.events.emit(&event) {
            tracing::warn!(
                event = event.event_type(),
                error = %format!("{err:#}"),
                "event log write failed"
            );
        }
    }
}
