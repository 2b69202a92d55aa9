use crate::config::SpeechConfig;
use crate::error::{WidgetError, WidgetResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error};

/// Playback state published to subscribers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TtsState {
    pub is_playing: bool,
    pub is_paused: bool,
    pub error: Option<TtsFailure>,
    /// 0 to 100
    pub progress: f32,
    pub current_character: usize,
    pub total_characters: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsFailure {
    /// `service` when generating audio failed, `playback` when playing it did
    pub kind: String,
    pub message: String,
}

/// Text-to-speech capability
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak `text`, stopping anything already playing. Resolves once
    /// playback ends.
    async fn speak(&self, text: &str) -> WidgetResult<()>;

    fn stop(&self);

    fn subscribe(&self) -> watch::Receiver<TtsState>;
}

/// Where generated audio goes
#[async_trait]
pub trait AudioSink: Send + Sync {
    /// Play MPEG audio; resolves when playback has ended.
    async fn play(&self, audio: Vec<u8>) -> WidgetResult<()>;

    fn stop(&self) {}
}

/// Synthesizer backed by an OpenAI-compatible `/audio/speech` endpoint
pub struct HttpSpeechSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    voice: String,
    api_key: String,
    sink: Arc<dyn AudioSink>,
    state: watch::Sender<TtsState>,
}

impl HttpSpeechSynthesizer {
    pub fn new(config: &SpeechConfig, api_key: String, sink: Arc<dyn AudioSink>) -> Self {
        let (state, _) = watch::channel(TtsState::default());
        Self {
            client: reqwest::Client::new(),
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            voice: config.voice.clone(),
            api_key,
            sink,
            state,
        }
    }

    pub fn state(&self) -> TtsState {
        self.state.borrow().clone()
    }

    async fn generate_speech(&self, text: &str) -> WidgetResult<Vec<u8>> {
        let payload = serde_json::json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| WidgetError::Speech(e.to_string()))?;

        if !response.status().is_success() {
            let body: serde_json::Value = response.json().await.unwrap_or_default();
            let message = body
                .pointer("/error/message")
                .and_then(|m| m.as_str())
                .unwrap_or("Failed to generate speech");
            return Err(WidgetError::Speech(message.to_string()));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| WidgetError::Speech(e.to_string()))?;
        Ok(audio.to_vec())
    }

    fn fail(&self, kind: &str, err: &WidgetError) {
        error!(kind, error = %err, "Speech synthesis failed");
        self.state.send_modify(|state| {
            state.is_playing = false;
            state.is_paused = false;
            state.error = Some(TtsFailure {
                kind: kind.to_string(),
                message: err.to_string(),
            });
        });
    }
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn speak(&self, text: &str) -> WidgetResult<()> {
        self.stop();

        let total_characters = text.chars().count();
        self.state.send_replace(TtsState {
            is_playing: true,
            total_characters,
            ..TtsState::default()
        });
        debug!(total_characters, "Generating speech");

        let audio = match self.generate_speech(text).await {
            Ok(audio) => audio,
            Err(err) => {
                self.fail("service", &err);
                return Err(err);
            }
        };

        if let Err(err) = self.sink.play(audio).await {
            self.fail("playback", &err);
            return Err(err);
        }

        self.state.send_modify(|state| {
            state.is_playing = false;
            state.is_paused = false;
            state.progress = 100.0;
            state.current_character = total_characters;
        });
        Ok(())
    }

    fn stop(&self) {
        self.sink.stop();
        self.state.send_modify(|state| {
            state.is_playing = false;
            state.is_paused = false;
            state.progress = 0.0;
            state.current_character = 0;
        });
    }

    fn subscribe(&self) -> watch::Receiver<TtsState> {
        self.state.subscribe()
    }
}
