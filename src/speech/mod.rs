//! Optional platform speech capabilities.
//!
//! Each capability is detected once when a widget is constructed and carried
//! as a tagged [`Capability`], so call sites match on availability instead of
//! probing for a backend.

pub mod synthesis;

use crate::config::SpeechConfig;
use crate::error::WidgetResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub use synthesis::{AudioSink, HttpSpeechSynthesizer, SpeechSynthesizer, TtsFailure, TtsState};

/// Either a usable backend or the reason there is none
pub enum Capability<T> {
    Available(T),
    Unavailable { reason: String },
}

impl<T> Capability<T> {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Self::Available(_))
    }

    pub fn available(&self) -> Option<&T> {
        match self {
            Self::Available(inner) => Some(inner),
            Self::Unavailable { .. } => None,
        }
    }
}

impl<T> fmt::Debug for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(_) => f.write_str("Available"),
            Self::Unavailable { reason } => write!(f, "Unavailable({})", reason),
        }
    }
}

impl<T> fmt::Display for Capability<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Available(_) => f.write_str("available"),
            Self::Unavailable { reason } => write!(f, "unavailable ({})", reason),
        }
    }
}

/// One recognition result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub transcript: String,
    pub confidence: f32,
    pub is_final: bool,
}

/// Speech-to-text capability supplied by the host
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen and return the latest transcript, final or interim
    async fn listen(&self) -> WidgetResult<Transcript>;

    fn stop(&self) {}
}

/// Speech capabilities of one widget
#[derive(Debug)]
pub struct Capabilities {
    pub speech_recognition: Capability<Arc<dyn SpeechRecognizer>>,
    pub speech_synthesis: Capability<Arc<dyn SpeechSynthesizer>>,
}

impl Capabilities {
    pub fn none() -> Self {
        Self {
            speech_recognition: Capability::unavailable("no speech recognizer registered"),
            speech_synthesis: Capability::unavailable("speech output disabled"),
        }
    }
}

/// Backends the host can offer the widget
#[derive(Default, Clone)]
pub struct SpeechBackends {
    pub recognizer: Option<Arc<dyn SpeechRecognizer>>,
    pub audio_sink: Option<Arc<dyn AudioSink>>,
}

/// Work out what speech support a widget has
pub fn detect_capabilities(config: &SpeechConfig, backends: &SpeechBackends) -> Capabilities {
    let speech_recognition = match &backends.recognizer {
        Some(recognizer) => Capability::Available(recognizer.clone()),
        None => Capability::unavailable("no speech recognizer registered"),
    };

    let speech_synthesis = if !config.enabled {
        Capability::unavailable("speech output disabled in config")
    } else {
        match (&backends.audio_sink, config.resolve_api_key()) {
            (None, _) => Capability::unavailable("no audio output available"),
            (Some(_), None) => Capability::unavailable(format!(
                "no API key in config or ${}",
                config.api_key_env
            )),
            (Some(sink), Some(api_key)) => {
                let synthesizer: Arc<dyn SpeechSynthesizer> =
                    Arc::new(HttpSpeechSynthesizer::new(config, api_key, sink.clone()));
                Capability::Available(synthesizer)
            }
        }
    };

    tracing::debug!(
        recognition = %speech_recognition,
        synthesis = %speech_synthesis,
        "Detected speech capabilities"
    );

    Capabilities {
        speech_recognition,
        speech_synthesis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SilentSink;

    #[async_trait]
    impl AudioSink for SilentSink {
        async fn play(&self, _audio: Vec<u8>) -> WidgetResult<()> {
            Ok(())
        }
    }

    struct FixedRecognizer;

    #[async_trait]
    impl SpeechRecognizer for FixedRecognizer {
        async fn listen(&self) -> WidgetResult<Transcript> {
            Ok(Transcript {
                transcript: "hello".into(),
                confidence: 0.9,
                is_final: true,
            })
        }
    }

    fn keyed_config() -> SpeechConfig {
        SpeechConfig {
            enabled: true,
            api_key: Some("sk-test".into()),
            ..SpeechConfig::default()
        }
    }

    #[test]
    fn nothing_is_available_without_backends() {
        let caps = detect_capabilities(&keyed_config(), &SpeechBackends::default());
        assert!(!caps.speech_recognition.is_available());
        assert!(!caps.speech_synthesis.is_available());
    }

    #[test]
    fn synthesis_needs_config_key_and_sink() {
        let backends = SpeechBackends {
            recognizer: Some(Arc::new(FixedRecognizer)),
            audio_sink: Some(Arc::new(SilentSink)),
        };

        let caps = detect_capabilities(&keyed_config(), &backends);
        assert!(caps.speech_recognition.is_available());
        assert!(caps.speech_synthesis.is_available());

        let disabled = SpeechConfig {
            enabled: false,
            ..keyed_config()
        };
        let caps = detect_capabilities(&disabled, &backends);
        assert!(matches!(
            caps.speech_synthesis,
            Capability::Unavailable { ref reason } if reason.contains("disabled")
        ));

        let keyless = SpeechConfig {
            api_key: None,
            api_key_env: "CHAT_WIDGET_TEST_UNSET_KEY".into(),
            ..keyed_config()
        };
        let caps = detect_capabilities(&keyless, &backends);
        assert!(!caps.speech_synthesis.is_available());
    }
}
