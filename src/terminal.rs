//! Renders conversation events as styled terminal lines

use chat_widget::{ConversationEvent, Message, Role};
use crossterm::style::Stylize;
use std::io::{self, Write};

/// Presentation sink for a terminal host
#[derive(Default)]
pub struct TerminalRenderer {
    /// Id of the message being streamed and how much of it is on screen
    streaming: Option<(String, usize)>,
}

impl TerminalRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_message(&mut self, message: &Message, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "{} {}", role_label(message.role), message.content)
    }

    pub fn render(&mut self, event: &ConversationEvent, out: &mut impl Write) -> io::Result<()> {
        match event {
            ConversationEvent::Started(message) => {
                write!(out, "{} ", role_label(message.role))?;
                self.streaming = Some((message.id.clone(), 0));
            }
            // The host echoes its own input.
            ConversationEvent::Appended(message) if message.role == Role::User => {}
            ConversationEvent::Appended(message) => self.render_message(message, out)?,
            ConversationEvent::Updated { id, content } => {
                if let Some((streaming_id, printed)) = self.streaming.as_mut() {
                    if streaming_id == id {
                        match content.get(*printed..) {
                            Some(delta) => write!(out, "{}", delta)?,
                            // Earlier text changed; start the line over.
                            None => write!(out, "\n{} {}", role_label(Role::Assistant), content)?,
                        }
                        *printed = content.len();
                    }
                }
            }
            ConversationEvent::Finalized(message) => {
                if self
                    .streaming
                    .as_ref()
                    .is_some_and(|(id, _)| *id == message.id)
                {
                    writeln!(out)?;
                    self.streaming = None;
                }
            }
            ConversationEvent::Cleared => {
                self.streaming = None;
                writeln!(out, "{}", "(conversation cleared)".dim())?;
            }
            ConversationEvent::ThreadIdentified(id) => {
                writeln!(out, "{}", format!("(thread {})", id).dim())?;
            }
            ConversationEvent::Processing(_) => {}
        }
        out.flush()
    }
}

fn role_label(role: Role) -> String {
    match role {
        Role::User => "You:".blue().bold().to_string(),
        Role::Assistant => "Assistant:".green().bold().to_string(),
        Role::System => "System:".yellow().bold().to_string(),
    }
}
