use std::time::Instant;

use glimpse_contracts::conversation::ConversationEntry;
use glimpse_contracts::params::GenerationParameters;

use crate::error::{error_chain_text, QueryError};
use crate::ingest::IngestedImage;
use crate::providers::{VisionProvider, VisionRequest};
use crate::session::SessionHandle;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant that can analyze images and answer questions about them. \
Be descriptive, accurate, and helpful in your responses. If you can't see something clearly in the image, \
please say so rather than guessing.";

const REMOTE_ERROR_MAX_CHARS: usize = 1024;

pub fn compose_prompt(system_prompt: &str, question: &str) -> String {
    format!("{system_prompt}\n\nUser Question: {question}")
}

/// The checks `ask` makes before any remote call. Returns the trimmed
/// question and the image to send.
pub fn check_question<'a>(
    question: &'a str,
    image: Option<&'a IngestedImage>,
) -> Result<(&'a str, &'a IngestedImage), QueryError> {
    let question = question.trim();
    if question.is_empty() {
        return Err(QueryError::EmptyQuestion);
    }
    let image = image.ok_or(QueryError::NoImage)?;
    Ok((question, image))
}

/// Runs one question against a vision provider. Holds no session state; the
/// caller appends the returned entry.
pub struct QueryExecutor<'p> {
    provider: &'p dyn VisionProvider,
    model: String,
    system_prompt: String,
}

impl<'p> QueryExecutor<'p> {
    pub fn new(provider: &'p dyn VisionProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn ask(
        &self,
        question: &str,
        image: Option<&IngestedImage>,
        params: GenerationParameters,
    ) -> Result<ConversationEntry, QueryError> {
        let (question, image) = check_question(question, image)?;

        let prompt = compose_prompt(&self.system_prompt, question);
        let request = VisionRequest {
            model: &self.model,
            prompt: &prompt,
            image,
            params,
        };

        let started = Instant::now();
        let outcome = self.provider.invoke(&request);
        let response_time_seconds = started.elapsed().as_secs_f64();

        let answer = match outcome {
            Ok(answer) => answer,
            Err(err) => {
                let message = error_chain_text(&err, REMOTE_ERROR_MAX_CHARS);
                tracing::warn!(
                    provider = self.provider.name(),
                    model = %self.model,
                    elapsed_s = response_time_seconds,
                    error = %message,
                    "remote model call failed"
                );
                return Err(QueryError::RemoteCallFailed(message));
            }
        };
        let Some(answer) = answer.filter(|text| !text.trim().is_empty()) else {
            tracing::warn!(model = %self.model, "remote model returned no text");
            return Err(QueryError::EmptyResponse);
        };

        tracing::info!(
            provider = self.provider.name(),
            model = %self.model,
            elapsed_s = response_time_seconds,
            answer_chars = answer.chars().count(),
            "question answered"
        );

        Ok(ConversationEntry::new(
            question,
            answer,
            response_time_seconds,
            chrono::Local::now().format("%H:%M:%S").to_string(),
        ))
    }

    /// Read the session, ask, and append on success. A failed question leaves
    /// the session exactly as it was.
    pub fn ask_in_session(
        &self,
        session: &mut SessionHandle,
        question: &str,
    ) -> Result<ConversationEntry, QueryError> {
        let entry = self.ask(question, session.state().current_image(), session.params())?;
        session.state_mut().append_entry(entry.clone());
        Ok(entry)
    }
}
