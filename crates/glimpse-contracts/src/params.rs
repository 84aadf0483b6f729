use serde::Serialize;
use thiserror::Error;

pub const TEMPERATURE_MIN: f32 = 0.0;
pub const TEMPERATURE_MAX: f32 = 1.0;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const TOP_K_MIN: u32 = 1;
pub const TOP_K_MAX: u32 = 40;
pub const DEFAULT_TOP_K: u32 = 20;
pub const MAX_OUTPUT_TOKENS: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParamsError {
    #[error("temperature must be between 0.0 and 1.0, got {0}")]
    TemperatureOutOfRange(f32),
    #[error("top_k must be between 1 and 40, got {0}")]
    TopKOutOfRange(u32),
}

/// Sampling options sent with every question.
///
/// Values are validated on the way in, so a constructed value is always in
/// range. `max_output_tokens` is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerationParameters {
    temperature: f32,
    top_k: u32,
}

impl Default for GenerationParameters {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl GenerationParameters {
    pub fn new(temperature: f32, top_k: u32) -> Result<Self, ParamsError> {
        Self::default()
            .with_temperature(temperature)?
            .with_top_k(top_k)
    }

    pub fn with_temperature(self, temperature: f32) -> Result<Self, ParamsError> {
        if !(TEMPERATURE_MIN..=TEMPERATURE_MAX).contains(&temperature) {
            return Err(ParamsError::TemperatureOutOfRange(temperature));
        }
        Ok(Self {
            temperature,
            ..self
        })
    }

    pub fn with_top_k(self, top_k: u32) -> Result<Self, ParamsError> {
        if !(TOP_K_MIN..=TOP_K_MAX).contains(&top_k) {
            return Err(ParamsError::TopKOutOfRange(top_k));
        }
        Ok(Self { top_k, ..self })
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn top_k(&self) -> u32 {
        self.top_k
    }

    pub fn max_output_tokens(&self) -> u32 {
        MAX_OUTPUT_TOKENS
    }
}
