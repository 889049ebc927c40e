//! Configuration management for the chat service.
//!
//! Supports loading configuration from environment variables with fallback
//! to defaults.

use std::path::PathBuf;

/// Usage limits enforced as synchronous precondition checks, before any
/// tree mutation. `None` disables a check.
#[derive(Clone, Debug)]
pub struct UsageLimits {
    /// Messages per client per sliding minute.
    pub messages_per_minute: Option<u32>,
    /// Maximum messages in one conversation.
    pub max_messages: Option<usize>,
    /// Maximum length of one prompt, in characters.
    pub max_message_length: Option<usize>,
    /// Maximum stored conversations.
    pub max_conversations: Option<usize>,
    /// Maximum decoded size of one uploaded file.
    pub max_file_bytes: usize,
    /// Maximum attachments per message.
    pub max_files: usize,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            messages_per_minute: None,
            max_messages: None,
            max_message_length: None,
            max_conversations: None,
            max_file_bytes: 10 * 1024 * 1024,
            max_files: 10,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    /// Model offered to new conversations.
    pub default_model: String,
    pub limits: UsageLimits,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("data"),
            default_model: "default".to_string(),
            limits: UsageLimits::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Load [`ServiceConfig`] from environment variables.
///
/// Environment variables:
/// - `CHAT_HOST`: bind address (default: 127.0.0.1)
/// - `CHAT_PORT`: bind port (default: 8080)
/// - `CHAT_DATA_DIR`: storage directory (default: ./data)
/// - `CHAT_DEFAULT_MODEL`: model id for new conversations (default: "default")
/// - `CHAT_MESSAGES_PER_MINUTE`: per-client rate limit (default: off)
/// - `CHAT_MAX_MESSAGES`: per-conversation message cap (default: off)
/// - `CHAT_MAX_MESSAGE_LENGTH`: prompt length cap (default: off)
/// - `CHAT_MAX_CONVERSATIONS`: stored conversation cap (default: off)
/// - `CHAT_MAX_FILE_BYTES`: decoded upload size cap (default: 10 MiB)
/// - `CHAT_MAX_FILES`: attachments per message (default: 10)
pub fn load_service_config() -> ServiceConfig {
    let defaults = ServiceConfig::default();
    ServiceConfig {
        host: std::env::var("CHAT_HOST").unwrap_or(defaults.host),
        port: env_parse("CHAT_PORT").unwrap_or(defaults.port),
        data_dir: std::env::var("CHAT_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir),
        default_model: std::env::var("CHAT_DEFAULT_MODEL").unwrap_or(defaults.default_model),
        limits: UsageLimits {
            messages_per_minute: env_parse("CHAT_MESSAGES_PER_MINUTE"),
            max_messages: env_parse("CHAT_MAX_MESSAGES"),
            max_message_length: env_parse("CHAT_MAX_MESSAGE_LENGTH"),
            max_conversations: env_parse("CHAT_MAX_CONVERSATIONS"),
            max_file_bytes: env_parse("CHAT_MAX_FILE_BYTES")
                .unwrap_or(defaults.limits.max_file_bytes),
            max_files: env_parse("CHAT_MAX_FILES").unwrap_or(defaults.limits.max_files),
        },
    }
}
