use crate::error::AppError;

/// Default conversation model (clarification dialogue and diagram repair).
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
/// Default build model (workflow JSON generation).
pub const DEFAULT_BUILD_MODEL: &str = "claude-sonnet-4-20250514";

const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_ANTHROPIC_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_RELAY_PORT: u16 = 3001;

/// Runtime settings, loaded once at startup from `.env` and the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_endpoint: String,
    pub anthropic_endpoint: String,
    pub chat_model: String,
    pub build_model: String,
    pub relay_port: u16,
}

impl Settings {
    /// Load settings from the environment. `.env` is loaded first if present;
    /// real environment variables win over `.env` entries.
    pub fn load() -> Self {
        // Missing .env is fine — keys may come from the real environment.
        let _ = dotenvy::dotenv();

        Self {
            openai_api_key: read_key("OPENAI_API_KEY"),
            anthropic_api_key: read_key("ANTHROPIC_API_KEY"),
            openai_endpoint: std::env::var("FLOWPLAN_OPENAI_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OPENAI_ENDPOINT.into()),
            anthropic_endpoint: std::env::var("FLOWPLAN_ANTHROPIC_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ANTHROPIC_ENDPOINT.into()),
            chat_model: std::env::var("FLOWPLAN_CHAT_MODEL")
                .unwrap_or_else(|_| DEFAULT_CHAT_MODEL.into()),
            build_model: std::env::var("FLOWPLAN_BUILD_MODEL")
                .unwrap_or_else(|_| DEFAULT_BUILD_MODEL.into()),
            relay_port: std::env::var("FLOWPLAN_RELAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_RELAY_PORT),
        }
    }

    /// Return the OpenAI key or a config error naming the missing variable.
    pub fn require_openai_key(&self) -> Result<&str, AppError> {
        self.openai_api_key
            .as_deref()
            .ok_or_else(|| missing_key("OPENAI_API_KEY"))
    }

    /// Return the Anthropic key or a config error naming the missing variable.
    pub fn require_anthropic_key(&self) -> Result<&str, AppError> {
        self.anthropic_api_key
            .as_deref()
            .ok_or_else(|| missing_key("ANTHROPIC_API_KEY"))
    }
}

/// Read an API key from the environment, treating the documented
/// `your-...-api-key-here` placeholders as unset.
fn read_key(name: &str) -> Option<String> {
    let value = std::env::var(name).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() || is_placeholder(trimmed) {
        return None;
    }
    Some(trimmed.to_string())
}

fn is_placeholder(value: &str) -> bool {
    value.starts_with("your-") && value.ends_with("-api-key-here")
}

fn missing_key(name: &str) -> AppError {
    AppError::Config(format!(
        "{name} not configured. Set {name} in your environment or .env file."
    ))
}
