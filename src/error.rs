use serde::Serialize;

/// App-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes cleanly for HTTP responses so callers get structured error messages.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Network/service failure while asking the model for a diagram fix.
    #[error("Repair request error: {0}")]
    RepairRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Malformed or incomplete response envelope from a generative provider.
    #[error("Provider error: {0}")]
    Provider(String),

    /// Missing or placeholder credential. Surfaced immediately, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// The relay returns errors as `{ error: "...", kind: "..." }` bodies.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field(
            "kind",
            match self {
                AppError::RepairRequest(_) => "repair_request",
                AppError::Validation(_) => "validation",
                AppError::Transport(_) => "transport",
                AppError::Provider(_) => "provider",
                AppError::Config(_) => "config",
                AppError::Serde(_) => "serde",
            },
        )?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_with_kind() {
        let err = AppError::Validation("nodes must be an array".into());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["kind"], "validation");
        assert_eq!(json["error"], "Validation error: nodes must be an array");
    }

    #[test]
    fn test_config_error_message() {
        let err = AppError::Config("ANTHROPIC_API_KEY not configured".into());
        assert!(err.to_string().contains("ANTHROPIC_API_KEY"));
    }
}
