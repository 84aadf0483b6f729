use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};

use glimpse_contracts::models::{ModelSelection, ModelSelector, ModelSpec, VISION};

use crate::error::ConfigError;
use crate::providers::{
    DryrunProvider, GeminiProvider, VisionProviderRegistry, DEFAULT_GEMINI_API_BASE,
};

pub const API_KEY_VARS: &[&str] = &["GEMINI_API_KEY", "GOOGLE_API_KEY"];
pub const API_BASE_VAR: &str = "GEMINI_API_BASE";
pub const LOG_FILTER_VARS: &[&str] = &["GLIMPSE_LOG", "RUST_LOG"];
pub const DEFAULT_LOG_FILTER: &str = "info";
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Settings resolved from the process environment and an optional dotenv file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    api_key: Option<String>,
    api_base: String,
    log_filter: String,
    env_file: Option<PathBuf>,
}

impl AppConfig {
    /// Variables already set in the process win over the file.
    pub fn load(env_file: Option<&Path>) -> Self {
        let dotenv_path = env_file.map(Path::to_path_buf).or_else(|| {
            let default = PathBuf::from(DEFAULT_ENV_FILE);
            default.is_file().then_some(default)
        });
        let dotenv = dotenv_path
            .as_deref()
            .map(parse_dotenv)
            .unwrap_or_default();
        let mut config = Self::from_lookup(|key| {
            non_empty(env::var(key).ok()).or_else(|| non_empty(dotenv.get(key).cloned()))
        });
        config.env_file = dotenv_path.filter(|path| path.is_file());
        config
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let first = |keys: &[&str]| keys.iter().copied().find_map(&lookup);
        Self {
            api_key: first(API_KEY_VARS),
            api_base: lookup(API_BASE_VAR)
                .map(|base| base.trim().to_string())
                .filter(|base| !base.is_empty())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            log_filter: first(LOG_FILTER_VARS)
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            env_file: None,
        }
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Dotenv file that was actually read, if any.
    pub fn env_file(&self) -> Option<&Path> {
        self.env_file.as_deref()
    }

    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key().ok_or_else(|| ConfigError::Missing {
            key: API_KEY_VARS[0].to_string(),
        })
    }
}

/// Picks a vision model, falling back to the registry default when the
/// requested one is unknown.
pub fn select_model(requested: Option<&str>) -> Result<ModelSelection, ConfigError> {
    let requested = requested.map(str::trim).filter(|name| !name.is_empty());
    let selection = ModelSelector::new(None)
        .select(requested, VISION)
        .map_err(ConfigError::ModelSelection)?;
    if selection.fell_back() {
        tracing::warn!(
            model = %selection.model.name,
            reason = selection.fallback_reason.as_deref().unwrap_or_default(),
            "model fallback"
        );
    }
    Ok(selection)
}

/// Registers the offline provider always and the remote one when `model`
/// needs it. A remote model without a credential is a startup failure.
pub fn build_providers(
    config: &AppConfig,
    model: &ModelSpec,
) -> Result<VisionProviderRegistry, ConfigError> {
    let mut registry = VisionProviderRegistry::new();
    registry.register(DryrunProvider);
    if model.is_remote() {
        let api_key = config.require_api_key()?;
        registry.register(GeminiProvider::new(api_key, config.api_base())?);
    } else if let Some(api_key) = config.api_key() {
        registry.register(GeminiProvider::new(api_key, config.api_base())?);
    }
    tracing::debug!(providers = ?registry.names(), model = %model.name, "providers ready");
    Ok(registry)
}

/// Reads `KEY=value` lines. Blank lines and `#` comments are skipped, an
/// `export ` prefix is allowed and one pair of matching quotes is stripped.
/// A missing file yields no variables.
pub fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let content = std::fs::read_to_string(path).unwrap_or_default();
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        vars.insert(key.to_string(), unquote(value.trim()).to_string());
    }
    vars
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|text| !text.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> AppConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn parse_dotenv_handles_comments_exports_and_quotes() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join(".env");
        fs::write(
            &path,
            "# credentials\n\nexport GEMINI_API_KEY=\"abc123\"\nGEMINI_API_BASE='http://localhost:8080'\nnot a pair\n=orphan\nEMPTY=\n",
        )?;
        let vars = parse_dotenv(&path);
        assert_eq!(vars.get("GEMINI_API_KEY").map(String::as_str), Some("abc123"));
        assert_eq!(
            vars.get("GEMINI_API_BASE").map(String::as_str),
            Some("http://localhost:8080")
        );
        assert_eq!(vars.get("EMPTY").map(String::as_str), Some(""));
        assert_eq!(vars.len(), 3);
        Ok(())
    }

    #[test]
    fn parse_dotenv_missing_file_is_empty() -> Result<()> {
        let dir = tempfile::tempdir()?;
        assert!(parse_dotenv(&dir.path().join("absent.env")).is_empty());
        Ok(())
    }

    #[test]
    fn google_key_is_a_fallback() {
        let config = config_from(&[("GOOGLE_API_KEY", "g")]);
        assert_eq!(config.api_key(), Some("g"));
        let config = config_from(&[("GOOGLE_API_KEY", "g"), ("GEMINI_API_KEY", "m")]);
        assert_eq!(config.api_key(), Some("m"));
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[("GEMINI_API_BASE", "  ")]);
        assert_eq!(config.api_key(), None);
        assert_eq!(config.api_base(), DEFAULT_GEMINI_API_BASE);
        assert_eq!(config.log_filter(), "info");
        assert!(matches!(
            config.require_api_key(),
            Err(ConfigError::Missing { key }) if key == "GEMINI_API_KEY"
        ));
    }

    #[test]
    fn log_filter_prefers_glimpse_log() {
        let config = config_from(&[("RUST_LOG", "warn"), ("GLIMPSE_LOG", "glimpse_engine=debug")]);
        assert_eq!(config.log_filter(), "glimpse_engine=debug");
        assert_eq!(config_from(&[("RUST_LOG", "warn")]).log_filter(), "warn");
    }

    #[test]
    fn load_reads_explicit_env_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("glimpse.env");
        fs::write(&path, "GLIMPSE_TEST_ONLY_UNUSED=1\n")?;
        let config = AppConfig::load(Some(&path));
        assert_eq!(config.env_file(), Some(path.as_path()));

        let missing = dir.path().join("missing.env");
        assert_eq!(AppConfig::load(Some(&missing)).env_file(), None);
        Ok(())
    }

    #[test]
    fn remote_model_without_key_fails_fast() -> Result<()> {
        let selection = select_model(None)?;
        assert_eq!(selection.model.name, "gemini-2.0-flash-exp");
        let Err(err) = build_providers(&config_from(&[]), &selection.model) else {
            anyhow::bail!("remote model without a key should not build providers");
        };
        assert!(matches!(err, ConfigError::Missing { key } if key == "GEMINI_API_KEY"));
        Ok(())
    }

    #[test]
    fn dryrun_model_needs_no_key() -> Result<()> {
        let selection = select_model(Some("dryrun-vision-1"))?;
        assert!(selection.fallback_reason.is_none());
        let registry = build_providers(&config_from(&[]), &selection.model)?;
        assert_eq!(registry.names(), vec!["dryrun"]);
        assert!(registry.get(&selection.model.provider).is_some());
        Ok(())
    }

    #[test]
    fn remote_model_with_key_registers_gemini() -> Result<()> {
        let selection = select_model(Some("gemini-1.5-pro"))?;
        let config = config_from(&[("GEMINI_API_KEY", "k")]);
        let registry = build_providers(&config, &selection.model)?;
        assert_eq!(registry.names(), vec!["dryrun", "gemini"]);
        Ok(())
    }

    #[test]
    fn unknown_model_falls_back_with_reason() -> Result<()> {
        let selection = select_model(Some("  gpt-vision  "))?;
        assert_eq!(selection.model.name, "gemini-2.0-flash-exp");
        assert_eq!(selection.requested.as_deref(), Some("gpt-vision"));
        assert!(selection.fallback_reason.is_some());
        Ok(())
    }
}
