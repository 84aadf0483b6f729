use glimpse_contracts::conversation::ConversationEntry;
use glimpse_contracts::params::GenerationParameters;
use uuid::Uuid;

use crate::ingest::IngestedImage;

/// Mutable state of one interactive session.
#[derive(Debug, Default)]
pub struct SessionState {
    current_image: Option<IngestedImage>,
    conversation_history: Vec<ConversationEntry>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_image(&self) -> Option<&IngestedImage> {
        self.current_image.as_ref()
    }

    /// Chronological order, oldest first.
    pub fn history(&self) -> &[ConversationEntry] {
        &self.conversation_history
    }

    pub fn set_image(&mut self, img: IngestedImage) -> &IngestedImage {
        self.current_image.insert(img)
    }

    pub fn clear(&mut self) {
        self.current_image = None;
        self.conversation_history.clear();
    }

    pub fn append_entry(&mut self, entry: ConversationEntry) {
        self.conversation_history.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.current_image.is_none() && self.conversation_history.is_empty()
    }

    /// Hint for what the user should do next, if anything.
    pub fn next_step_hint(&self) -> Option<&'static str> {
        if self.current_image.is_none() {
            return Some("Please upload an image to get started!");
        }
        if self.conversation_history.is_empty() {
            return Some("Ask a question about the uploaded image to begin the conversation!");
        }
        None
    }
}

/// Explicit owner of one session. Not `Clone`: two hosts can never share the
/// same state by accident.
#[derive(Debug)]
pub struct SessionHandle {
    id: String,
    state: SessionState,
    params: GenerationParameters,
}

impl SessionHandle {
    pub fn new(params: GenerationParameters) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            state: SessionState::new(),
            params,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut SessionState {
        &mut self.state
    }

    pub fn params(&self) -> GenerationParameters {
        self.params
    }

    pub fn params_mut(&mut self) -> &mut GenerationParameters {
        &mut self.params
    }
}
