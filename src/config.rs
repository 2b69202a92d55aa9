use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use strum::{Display, EnumString};

pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1000;
pub const DEFAULT_TTS_ENDPOINT: &str = "https://api.openai.com/v1/audio/speech";

/// Where a streamed reply carries its thread identity.
///
/// A deployment picks exactly one; the other source is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ThreadIdConvention {
    /// `x-thread-id` response header
    #[default]
    Header,
    /// Text after a 0x1F byte in the reply body
    Separator,
}

/// Widget configuration, read-only for the lifetime of one widget
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WidgetConfig {
    /// Endpoint every user message is POSTed to
    pub url: String,

    pub title: String,

    /// Thread identity known before the first request
    pub thread_id: Option<String>,

    /// Flattened into the request body next to `message` and `threadId`
    pub user: Map<String, Value>,

    /// Read the reply as a byte stream instead of one JSON envelope
    pub response_is_a_stream: bool,

    /// Log pipeline failures without adding an error message
    pub disable_error_alert: bool,

    /// Assistant message shown when the conversation starts
    pub greeting_message: Option<String>,

    pub thread_id_convention: ThreadIdConvention,

    /// Longest accepted user message, in characters
    pub max_message_length: usize,

    /// Bound on each chat request; unbounded when unset
    pub request_timeout_secs: Option<u64>,

    /// Render assistant replies from markdown
    pub render_markdown: bool,

    /// Submit a final voice transcript instead of handing it back as draft
    pub auto_send_audio_message: bool,

    pub speech: SpeechConfig,
}

/// Text-to-speech configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub model: String,
    pub voice: String,
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset
    pub api_key_env: String,
}

impl Default for WidgetConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            title: "Chat".to_string(),
            thread_id: None,
            user: Map::new(),
            response_is_a_stream: false,
            disable_error_alert: false,
            greeting_message: None,
            thread_id_convention: ThreadIdConvention::default(),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
            request_timeout_secs: None,
            render_markdown: true,
            auto_send_audio_message: false,
            speech: SpeechConfig::default(),
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: DEFAULT_TTS_ENDPOINT.to_string(),
            model: "tts-1".to_string(),
            voice: "alloy".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl SpeechConfig {
    /// Get API key from config or environment
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var(&self.api_key_env).ok())
            .filter(|key| !key.is_empty())
    }
}

impl WidgetConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// `~/.chat-widget/config.toml`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".chat-widget").join("config.toml"))
    }

    /// Load configuration from a TOML file, falling back to defaults when it
    /// does not exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject configurations a widget cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            bail!("No endpoint url configured");
        }
        let url = reqwest::Url::parse(&self.url)
            .with_context(|| format!("Invalid endpoint url '{}'", self.url))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("Endpoint url must be http or https, got '{}'", url.scheme());
        }
        if self.max_message_length == 0 {
            bail!("max_message_length must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_full_config() {
        let config: WidgetConfig = toml::from_str(
            r#"
            url = "https://example.com/chat"
            response_is_a_stream = true
            greeting_message = "Hi there"
            thread_id_convention = "separator"

            [user]
            name = "Ada"
            plan = "pro"

            [speech]
            enabled = true
            voice = "nova"
            "#,
        )
        .unwrap();

        assert_eq!(config.url, "https://example.com/chat");
        assert!(config.response_is_a_stream);
        assert_eq!(config.greeting_message.as_deref(), Some("Hi there"));
        assert_eq!(config.thread_id_convention, ThreadIdConvention::Separator);
        assert_eq!(config.user.get("name"), Some(&Value::from("Ada")));
        assert_eq!(config.speech.voice, "nova");
        assert_eq!(config.speech.model, "tts-1");
        assert_eq!(config.max_message_length, DEFAULT_MAX_MESSAGE_LENGTH);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_urls() {
        assert!(WidgetConfig::default().validate().is_err());
        assert!(WidgetConfig::new("not a url").validate().is_err());
        assert!(WidgetConfig::new("ftp://example.com").validate().is_err());
        assert!(WidgetConfig::new("http://localhost:8080/chat").validate().is_ok());
    }

    #[test]
    fn missing_file_loads_defaults_and_save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let loaded = WidgetConfig::load(Some(&path)).unwrap();
        assert!(loaded.url.is_empty());

        let mut config = WidgetConfig::new("https://example.com/chat");
        config.user.insert("id".into(), Value::from(7));
        config.save(&path).unwrap();

        let loaded = WidgetConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.url, "https://example.com/chat");
        assert_eq!(loaded.user.get("id"), Some(&Value::from(7)));
    }

    #[test]
    fn explicit_speech_key_wins_over_environment() {
        let speech = SpeechConfig {
            api_key: Some("sk-test".into()),
            api_key_env: "CHAT_WIDGET_TEST_UNSET_KEY".into(),
            ..SpeechConfig::default()
        };
        assert_eq!(speech.resolve_api_key().as_deref(), Some("sk-test"));

        let speech = SpeechConfig {
            api_key_env: "CHAT_WIDGET_TEST_UNSET_KEY".into(),
            ..SpeechConfig::default()
        };
        assert_eq!(speech.resolve_api_key(), None);
    }
}
