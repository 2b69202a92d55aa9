//! A mounted chat widget and the handle used to drive it from a task.

use crate::config::{ThreadIdConvention, WidgetConfig};
use crate::conversation::Conversation;
use crate::error::{WidgetError, WidgetResult};
use crate::events::{ConversationEvent, Message, Role, WidgetCommand};
use crate::markdown;
use crate::reconciler::{StreamEvent, resolve_atomic, resolve_stream};
use crate::speech::{Capabilities, Capability, SpeechBackends, detect_capabilities};
use crate::transport::{Transport, header_thread_id};
use futures::{StreamExt, pin_mut};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

/// System message shown when a submission fails
pub const ERROR_ALERT_MESSAGE: &str =
    "Sorry, there was an error processing your request. Please try again.";

const COMMAND_CAPACITY: usize = 32;

/// How a submission that got past input validation ended
#[derive(Debug)]
pub enum SubmitOutcome {
    /// The assistant reply, final
    Replied(Message),
    /// The pipeline failed; the error has already been logged and alerted
    Failed(WidgetError),
}

impl SubmitOutcome {
    pub fn reply(&self) -> Option<&Message> {
        match self {
            Self::Replied(message) => Some(message),
            Self::Failed(_) => None,
        }
    }
}

/// What a voice submission produced
#[derive(Debug)]
pub enum VoiceOutcome {
    /// The transcript went through the pipeline
    Submitted(SubmitOutcome),
    /// The transcript is only a draft for the input; nothing was sent
    Transcribed(String),
}

/// Trim and bound user input
pub fn prepare_input(input: &str, limit: usize) -> WidgetResult<String> {
    let text = input.trim();
    if text.is_empty() {
        return Err(WidgetError::EmptyMessage);
    }
    let length = text.chars().count();
    if length > limit {
        return Err(WidgetError::MessageTooLong { length, limit });
    }
    Ok(text.to_string())
}

/// One widget instance. Owns its configuration, transport and conversation;
/// nothing is shared with other widgets.
pub struct ChatWidget {
    config: WidgetConfig,
    transport: Transport,
    conversation: Conversation,
    capabilities: Capabilities,
    processing: Arc<AtomicBool>,
}

impl ChatWidget {
    pub fn new(config: WidgetConfig) -> WidgetResult<Self> {
        Self::with_backends(config, SpeechBackends::default())
    }

    /// Mount a widget with host-provided speech backends
    pub fn with_backends(config: WidgetConfig, backends: SpeechBackends) -> WidgetResult<Self> {
        config
            .validate()
            .map_err(|e| WidgetError::InvalidConfig(format!("{:#}", e)))?;

        let transport = Transport::new(&config)?;
        let capabilities = detect_capabilities(&config.speech, &backends);
        let conversation = Conversation::new(config.thread_id.clone());

        let mut widget = Self {
            config,
            transport,
            conversation,
            capabilities,
            processing: Arc::new(AtomicBool::new(false)),
        };
        widget.greet();
        info!(url = %widget.transport.url(), stream = widget.config.response_is_a_stream, "Widget mounted");
        Ok(widget)
    }

    fn greet(&mut self) {
        if let Some(greeting) = self.config.greeting_message.as_deref() {
            if !greeting.trim().is_empty() {
                self.conversation.append(Message::assistant(greeting));
            }
        }
    }

    pub fn config(&self) -> &WidgetConfig {
        &self.config
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.conversation.subscribe()
    }

    pub fn snapshot(&self) -> Vec<Message> {
        self.conversation.snapshot()
    }

    pub fn thread_id(&self) -> Option<&str> {
        self.conversation.thread_id()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Clear the conversation, restore the configured thread id and greet
    /// again
    pub fn reset(&mut self) {
        self.conversation.reset(self.config.thread_id.clone());
        self.greet();
        debug!("Widget reset");
    }

    /// Markup for a message, honouring the markdown setting
    pub fn render_message(&self, message: &Message) -> String {
        if self.config.render_markdown {
            markdown::render_message(message)
        } else {
            message.content.clone()
        }
    }

    /// Submit user text.
    ///
    /// Input rejections come back as `Err` and leave the conversation alone.
    /// Once the user message is appended every outcome is `Ok`.
    pub async fn submit(&mut self, input: &str) -> WidgetResult<SubmitOutcome> {
        let text = prepare_input(input, self.config.max_message_length)?;
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WidgetError::Busy);
        }
        Ok(self.process(text).await)
    }

    /// Listen through the speech recognizer.
    ///
    /// A final transcript is submitted when `auto_send_audio_message` is set.
    /// Anything else comes back as draft text and the conversation is left
    /// alone.
    pub async fn submit_voice(&mut self) -> WidgetResult<VoiceOutcome> {
        let recognizer = match &self.capabilities.speech_recognition {
            Capability::Available(recognizer) => recognizer.clone(),
            Capability::Unavailable { reason } => {
                return Err(WidgetError::Speech(format!(
                    "speech recognition unavailable: {}",
                    reason
                )));
            }
        };

        let transcript = recognizer.listen().await?;
        debug!(
            confidence = transcript.confidence,
            is_final = transcript.is_final,
            "Speech recognized"
        );

        if !(self.config.auto_send_audio_message && transcript.is_final) {
            return Ok(VoiceOutcome::Transcribed(transcript.transcript));
        }
        recognizer.stop();
        self.submit(&transcript.transcript)
            .await
            .map(VoiceOutcome::Submitted)
    }

    /// Read the latest assistant message aloud
    pub async fn speak_last(&self) -> WidgetResult<()> {
        let synthesizer = match &self.capabilities.speech_synthesis {
            Capability::Available(synthesizer) => synthesizer.clone(),
            Capability::Unavailable { reason } => {
                return Err(WidgetError::Speech(format!(
                    "speech output unavailable: {}",
                    reason
                )));
            }
        };

        let text = self
            .conversation
            .snapshot()
            .into_iter()
            .rev()
            .find(|m| m.role == Role::Assistant && !m.content.is_empty())
            .map(|m| m.content)
            .ok_or_else(|| WidgetError::Speech("nothing to speak".to_string()))?;

        synthesizer.speak(&text).await
    }

    /// Run one submission with the processing flag already held
    async fn process(&mut self, text: String) -> SubmitOutcome {
        self.conversation.notify(ConversationEvent::Processing(true));
        let outcome = self.exchange(text).await;
        self.processing.store(false, Ordering::SeqCst);
        self.conversation.notify(ConversationEvent::Processing(false));
        outcome
    }

    #[instrument(skip_all, fields(chars = text.chars().count()))]
    async fn exchange(&mut self, text: String) -> SubmitOutcome {
        self.conversation.append(Message::user(text.clone()));

        match self.request_reply(&text).await {
            Ok(reply) => SubmitOutcome::Replied(reply),
            Err(err) => {
                // Partial streamed content stays visible.
                self.conversation.finish_last();
                error!(error = %err, "Error processing message");
                if !self.config.disable_error_alert {
                    self.conversation.append(Message::system(ERROR_ALERT_MESSAGE));
                }
                SubmitOutcome::Failed(err)
            }
        }
    }

    async fn request_reply(&mut self, text: &str) -> WidgetResult<Message> {
        let thread_id = self.conversation.thread_id().map(str::to_string);
        let response = self.transport.send(text, thread_id.as_deref()).await?;

        let header_id = match self.config.thread_id_convention {
            ThreadIdConvention::Header => header_thread_id(&response),
            ThreadIdConvention::Separator => None,
        };

        let (message, body_id) = if self.config.response_is_a_stream {
            self.reconcile_stream(response).await?
        } else {
            self.reconcile_atomic(response).await?
        };

        // Only a reply that reconciled cleanly pins the thread; the header
        // takes precedence over an id carried in the body.
        for id in header_id.into_iter().chain(body_id) {
            self.conversation.adopt_thread_id(&id);
        }
        Ok(message)
    }

    async fn reconcile_atomic(
        &mut self,
        response: reqwest::Response,
    ) -> WidgetResult<(Message, Option<String>)> {
        let body = response.bytes().await.map_err(WidgetError::network)?;
        let reply = resolve_atomic(&body)?;

        let message = Message::assistant(reply.content);
        self.conversation.append(message.clone());
        Ok((message, reply.thread_id))
    }

    async fn reconcile_stream(
        &mut self,
        response: reqwest::Response,
    ) -> WidgetResult<(Message, Option<String>)> {
        self.conversation.begin_assistant();

        let events = resolve_stream(response.bytes_stream(), self.config.thread_id_convention);
        pin_mut!(events);

        let mut thread_id = None;
        while let Some(event) = events.next().await {
            match event? {
                StreamEvent::Snapshot(content) => self.conversation.update_last(content)?,
                StreamEvent::Finished(reply) => {
                    let changed = self
                        .conversation
                        .last()
                        .is_some_and(|last| last.content != reply.content);
                    if changed {
                        self.conversation.update_last(reply.content)?;
                    }
                    thread_id = reply.thread_id;
                }
            }
        }

        let message = self
            .conversation
            .finish_last()
            .ok_or(WidgetError::NoMessageInProgress)?;
        Ok((message, thread_id))
    }

    /// Move the widget onto its own task and drive it through commands
    pub fn spawn(self) -> WidgetHandle {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let events = self.conversation.sender();
        let processing = self.processing.clone();
        let max_message_length = self.config.max_message_length;

        let task = tokio::spawn(self.run(rx));
        WidgetHandle {
            commands,
            events,
            processing,
            max_message_length,
            task: Some(task),
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<WidgetCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                WidgetCommand::Submit(text) => {
                    if let SubmitOutcome::Failed(err) = self.process(text).await {
                        debug!(error = %err, "Submission failed");
                    }
                }
                WidgetCommand::Reset => self.reset(),
                WidgetCommand::Snapshot(reply) => {
                    let _ = reply.send(self.snapshot());
                }
                WidgetCommand::ThreadId(reply) => {
                    let _ = reply.send(self.thread_id().map(str::to_string));
                }
                WidgetCommand::SpeakLast(reply) => {
                    let _ = reply.send(self.speak_last().await);
                }
                WidgetCommand::Shutdown => break,
            }
        }
        debug!("Widget task stopped");
    }
}

/// Cheap handle to a spawned widget.
///
/// Dropping every handle stops the task after the current command; an
/// in-flight request is allowed to finish.
pub struct WidgetHandle {
    commands: mpsc::Sender<WidgetCommand>,
    events: broadcast::Sender<ConversationEvent>,
    processing: Arc<AtomicBool>,
    max_message_length: usize,
    task: Option<JoinHandle<()>>,
}

impl WidgetHandle {
    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    /// Queue a submission. Rejected with `Busy` while another one is
    /// outstanding.
    pub async fn submit(&self, input: &str) -> WidgetResult<()> {
        let text = prepare_input(input, self.max_message_length)?;
        if self
            .processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(WidgetError::Busy);
        }

        if self.commands.send(WidgetCommand::Submit(text)).await.is_err() {
            self.processing.store(false, Ordering::SeqCst);
            return Err(WidgetError::Closed);
        }
        Ok(())
    }

    pub async fn reset(&self) -> WidgetResult<()> {
        self.send(WidgetCommand::Reset).await
    }

    pub async fn snapshot(&self) -> WidgetResult<Vec<Message>> {
        let (tx, rx) = oneshot::channel();
        self.send(WidgetCommand::Snapshot(tx)).await?;
        rx.await.map_err(|_| WidgetError::Closed)
    }

    pub async fn thread_id(&self) -> WidgetResult<Option<String>> {
        let (tx, rx) = oneshot::channel();
        self.send(WidgetCommand::ThreadId(tx)).await?;
        rx.await.map_err(|_| WidgetError::Closed)
    }

    pub async fn speak_last(&self) -> WidgetResult<()> {
        let (tx, rx) = oneshot::channel();
        self.send(WidgetCommand::SpeakLast(tx)).await?;
        rx.await.map_err(|_| WidgetError::Closed)?
    }

    /// Stop the widget task and wait for it to finish its current command
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(WidgetCommand::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    async fn send(&self, command: WidgetCommand) -> WidgetResult<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| WidgetError::Closed)
    }
}
