use std::collections::BTreeMap;

use anyhow::Result;
use glimpse_contracts::params::GenerationParameters;

use crate::ingest::IngestedImage;

mod dryrun;
mod gemini;

pub use dryrun::DryrunProvider;
pub use gemini::{GeminiProvider, DEFAULT_GEMINI_API_BASE};

/// Everything a remote model needs for one question.
#[derive(Debug, Clone, Copy)]
pub struct VisionRequest<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub image: &'a IngestedImage,
    pub params: GenerationParameters,
}

/// Seam to the multimodal model.
///
/// `Ok(None)` means the call went through but produced no text; transport,
/// quota and policy failures are `Err`.
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;
    fn invoke(&self, request: &VisionRequest<'_>) -> Result<Option<String>>;
}

#[derive(Default)]
pub struct VisionProviderRegistry {
    providers: BTreeMap<String, Box<dyn VisionProvider>>,
}

impl VisionProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: VisionProvider + 'static>(&mut self, provider: P) {
        self.providers
            .insert(provider.name().to_string(), Box::new(provider));
    }

    pub fn get(&self, name: &str) -> Option<&dyn VisionProvider> {
        self.providers.get(name).map(|provider| provider.as_ref())
    }

    pub fn names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }
}
