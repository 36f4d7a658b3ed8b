use config::{Config, ConfigError, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct VivaConfig {
    pub service: ServiceConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub interview: InterviewConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    pub socket_path: String,
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8790,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    /// Primary model identifier, first entry of the fallback chain.
    pub model: String,
    /// Tried in order when the primary is rate-limited or not served.
    pub fallback_models: Vec<String>,
    /// Total attempt budget per generate call.
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    pub max_backoff_seconds: u64,
    pub request_timeout_seconds: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro".to_string(),
            fallback_models: vec![
                "gemini-1.5-flash".to_string(),
                "gemini-1.5-flash-8b".to_string(),
            ],
            max_retries: 4,
            retry_delay_ms: 1000,
            max_backoff_seconds: 30,
            request_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InterviewConfig {
    /// Completion signals from the model are ignored below this floor.
    pub min_questions: u32,
    /// The interview is force-completed at this ceiling.
    pub max_questions: u32,
    pub min_answer_chars: usize,
    pub session_ttl_minutes: u64,
    pub feedback_cache_len: usize,
    pub feedback_cache_ttl_minutes: u64,
}

impl Default for InterviewConfig {
    fn default() -> Self {
        Self {
            min_questions: 12,
            max_questions: 25,
            min_answer_chars: 10,
            session_ttl_minutes: 120,
            feedback_cache_len: 10,
            feedback_cache_ttl_minutes: 30,
        }
    }
}

impl VivaConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path))
            .build()?;
        s.try_deserialize()
    }
}
