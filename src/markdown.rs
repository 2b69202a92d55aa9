//! Markdown rendering for assistant replies

use once_cell::sync::Lazy;
use pulldown_cmark_escape::escape_html;
use pulldown_cmark::{Event, Options, Parser, html};
use regex::Regex;

use crate::events::{Message, Role};

static SCRIPT_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").expect("script pattern is valid")
});

/// Render markdown to HTML. Soft line breaks become `<br />`.
pub fn parse_markdown(content: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let parser = Parser::new_ext(content, options).map(|event| match event {
        Event::SoftBreak => Event::HardBreak,
        other => other,
    });

    let mut out = String::with_capacity(content.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}

/// Drop `<script>` blocks
pub fn sanitize_html(html: &str) -> String {
    SCRIPT_BLOCK.replace_all(html, "").into_owned()
}

/// Markup for a message. Only assistant content goes through markdown;
/// everything else is escaped text.
pub fn render_message(message: &Message) -> String {
    match message.role {
        Role::Assistant => sanitize_html(&parse_markdown(&message.content)),
        Role::User | Role::System => escape_text(&message.content),
    }
}

fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Writing into a String cannot fail.
    let _ = escape_html(&mut out, text);
    out
}
