// Configuration structs
//
// All services take their configuration at construction; nothing reads
// global state after startup.

use std::time::Duration;

/// Crate-wide settings, owned by the composition root and passed into each
/// service at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Deadline for a single expression-parse strategy attempt
    pub parse_timeout: Duration,

    /// Wall-clock limit for one sandboxed script execution
    pub sandbox_timeout: Duration,

    /// Captured sandbox output beyond this is middle-truncated
    pub sandbox_max_output: usize,

    /// HTTP timeout for a single LLM provider request
    pub request_timeout: Duration,

    /// Maximum provider round-trips per conversation turn
    pub max_tool_rounds: usize,

    /// LLM model identifier sent to the provider
    pub model: String,

    /// Wolfram-style short-answer API credential (knowledge_query is
    /// disabled when absent)
    pub knowledge_app_id: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parse_timeout: Duration::from_secs(10),
            sandbox_timeout: Duration::from_secs(5),
            sandbox_max_output: 2000,
            request_timeout: Duration::from_secs(120),
            max_tool_rounds: 5,
            model: "gpt-4o".to_string(),
            knowledge_app_id: None,
        }
    }
}

impl Settings {
    /// Read optional overrides from the environment (API credentials and
    /// model choice); everything else keeps its default.
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        if let Ok(model) = std::env::var("MENTAT_MODEL") {
            if !model.is_empty() {
                settings.model = model;
            }
        }
        if let Ok(app_id) = std::env::var("MENTAT_KNOWLEDGE_APP_ID") {
            if !app_id.is_empty() {
                settings.knowledge_app_id = Some(app_id);
            }
        }
        settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.parse_timeout, Duration::from_secs(10));
        assert_eq!(settings.sandbox_timeout, Duration::from_secs(5));
        assert_eq!(settings.max_tool_rounds, 5);
        assert!(settings.knowledge_app_id.is_none());
    }
}
