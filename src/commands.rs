use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chat_widget::speech::{AudioSink, SpeechBackends};
use chat_widget::{ChatWidget, ConversationEvent, SubmitOutcome, WidgetConfig, WidgetError, WidgetResult};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::{self, error::RecvError};

use crate::slash::{SlashCommand, get_help_text, parse_slash_command};
use crate::terminal::TerminalRenderer;

/// Writes each spoken reply to an mp3 file
pub struct FileAudioSink {
    dir: PathBuf,
}

impl FileAudioSink {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl AudioSink for FileAudioSink {
    async fn play(&self, audio: Vec<u8>) -> WidgetResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| WidgetError::Speech(e.to_string()))?;
        let path = self
            .dir
            .join(format!("reply-{}.mp3", chrono::Utc::now().format("%Y%m%d-%H%M%S%3f")));
        tokio::fs::write(&path, audio)
            .await
            .map_err(|e| WidgetError::Speech(e.to_string()))?;
        println!("🔊 Saved speech to {}", path.display());
        Ok(())
    }
}

fn mount(config: WidgetConfig, audio_dir: Option<PathBuf>) -> Result<ChatWidget> {
    let backends = SpeechBackends {
        recognizer: None,
        audio_sink: audio_dir.map(|dir| Arc::new(FileAudioSink::new(dir)) as Arc<dyn AudioSink>),
    };
    ChatWidget::with_backends(config, backends).context("Failed to mount chat widget")
}

/// Render events until the current submission finishes
async fn render_until_idle(
    events: &mut broadcast::Receiver<ConversationEvent>,
    renderer: &mut TerminalRenderer,
) -> Result<()> {
    let mut stdout = io::stdout();
    loop {
        match events.recv().await {
            Ok(ConversationEvent::Processing(false)) => return Ok(()),
            Ok(event) => renderer.render(&event, &mut stdout)?,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Renderer fell behind");
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

/// Interactive chat session
pub async fn run_chat(config: WidgetConfig, audio_dir: Option<PathBuf>) -> Result<()> {
    let widget = mount(config, audio_dir)?;
    println!("💬 {}", widget.config().title);
    println!("Type a message, or /help for commands.");
    println!("{}", "=".repeat(50));

    let mut renderer = TerminalRenderer::new();
    let mut stdout = io::stdout();
    for message in widget.snapshot() {
        renderer.render_message(&message, &mut stdout)?;
    }

    let handle = widget.spawn();
    let mut events = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        stdout.flush()?;

        let Some(line) = lines.next_line().await.context("Failed to read user input")? else {
            break;
        };

        if let Some(command) = parse_slash_command(&line) {
            match command {
                SlashCommand::Bye => break,
                SlashCommand::Help => println!("{}", get_help_text()),
                SlashCommand::Thread => match handle.thread_id().await? {
                    Some(id) => println!("🧵 {}", id),
                    None => println!("🧵 No thread yet"),
                },
                SlashCommand::Reset => {
                    handle.reset().await?;
                    for message in handle.snapshot().await? {
                        renderer.render_message(&message, &mut stdout)?;
                    }
                    // Drop the reset notifications already shown via the snapshot.
                    while events.try_recv().is_ok() {}
                }
                SlashCommand::Speak => {
                    if let Err(err) = handle.speak_last().await {
                        println!("❌ {}", err);
                    }
                }
            }
            continue;
        }

        match handle.submit(&line).await {
            Ok(()) => render_until_idle(&mut events, &mut renderer).await?,
            Err(WidgetError::EmptyMessage) => {}
            Err(err) => println!("❌ {}", err),
        }
    }

    println!("👋 Bye!");
    handle.shutdown().await;
    Ok(())
}

/// Send a single message and print the reply
pub async fn send_once(config: WidgetConfig, message: &str, html: bool) -> Result<()> {
    let mut widget = mount(config, None)?;
    let mut events = widget.subscribe();

    let renderer = tokio::spawn(async move {
        let mut renderer = TerminalRenderer::new();
        render_until_idle(&mut events, &mut renderer).await
    });

    let outcome = match widget.submit(message).await {
        Ok(outcome) => outcome,
        Err(err) => {
            renderer.abort();
            return Err(err.into());
        }
    };
    renderer.await.context("Renderer task failed")??;

    if let Some(id) = widget.thread_id() {
        println!("🧵 {}", id);
    }

    match outcome {
        SubmitOutcome::Replied(reply) => {
            if html {
                println!("{}", widget.render_message(&reply));
            }
            Ok(())
        }
        SubmitOutcome::Failed(err) => Err(anyhow!(err).context("Message was not answered")),
    }
}

/// Write a starter config file
pub fn init_config(path: &Path, url: Option<String>, force: bool) -> Result<()> {
    if path.exists() && !force {
        println!("⚠️  Config already exists at {}", path.display());
        println!("Use --force to overwrite it.");
        return Ok(());
    }

    let config = WidgetConfig {
        url: url.unwrap_or_else(|| "http://localhost:3000/chat".to_string()),
        greeting_message: Some("Hi! How can I help?".to_string()),
        ..WidgetConfig::default()
    };
    config.save(path)?;

    println!("✅ Wrote config to {}", path.display());
    Ok(())
}

/// Report which speech capabilities a widget would get
pub fn show_capabilities(config: WidgetConfig, audio_dir: Option<PathBuf>) -> Result<()> {
    let widget = mount(config, audio_dir)?;
    let capabilities = widget.capabilities();
    println!("🎤 Speech recognition: {}", capabilities.speech_recognition);
    println!("🔊 Speech synthesis:   {}", capabilities.speech_synthesis);
    Ok(())
}
