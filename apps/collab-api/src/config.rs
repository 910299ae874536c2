/// Collab API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Shared secret used to verify editor access tokens (HS256).
    pub auth_secret: String,
    /// Base URL of the identity service that resolves user ids to profiles.
    pub identity_url: String,
    /// Base URL of the OpenAI-compatible completion API used for reviews.
    pub llm_api_url: String,
    /// API key for the completion API.
    pub llm_api_key: String,
    /// Model name sent with review requests.
    pub llm_model: String,
    /// Port the HTTP server binds to.
    pub port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        Self {
            auth_secret: required_var("AUTH_SECRET"),
            identity_url: required_var("IDENTITY_URL"),
            llm_api_url: std::env::var("LLM_API_URL")
                .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
            llm_api_key: required_var("LLM_API_KEY"),
            llm_model: std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(4010),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}
