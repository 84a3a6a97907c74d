//! Chat transcript rendering for the terminal.

use colored::Colorize;
use std::io::{self, Write};

use crate::documents::IndexedDocument;
use crate::session::{Message, MessageRole, Transcript};

/// Draws transcript entries with their role markers
#[derive(Debug, Clone, Copy)]
pub struct ChatRenderer {
    color: bool,
}

impl ChatRenderer {
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    /// Plain output, no ANSI escapes
    pub fn plain() -> Self {
        Self::new(false)
    }

    /// Write every message in append order. Rendering does not change the
    /// transcript, so repeated calls print the same thing.
    pub fn render<W: Write>(&self, transcript: &Transcript, out: &mut W) -> io::Result<()> {
        for message in transcript.messages() {
            self.render_message(message, out)?;
        }
        Ok(())
    }

    pub fn render_message<W: Write>(&self, message: &Message, out: &mut W) -> io::Result<()> {
        let mut lines = message.content.lines();
        let first = lines.next().unwrap_or("");
        writeln!(out, "{} {}", message.marker, self.paint(message.role, first))?;

        // Continuation lines line up under the text, not the marker
        for line in lines {
            writeln!(out, "   {}", self.paint(message.role, line))?;
        }
        writeln!(out)
    }

    /// One-line notice (upload prompt, status, confirmations)
    pub fn render_notice<W: Write>(&self, text: &str, out: &mut W) -> io::Result<()> {
        if self.color {
            writeln!(out, "{}", text.bright_black())
        } else {
            writeln!(out, "{}", text)
        }
    }

    pub fn render_error<W: Write>(&self, text: &str, out: &mut W) -> io::Result<()> {
        if self.color {
            writeln!(out, "{}", format!("Error: {}", text).red())
        } else {
            writeln!(out, "Error: {}", text)
        }
    }

    pub fn render_document<W: Write>(&self, document: &IndexedDocument, out: &mut W) -> io::Result<()> {
        let line = format!(
            "Indexed {} ({} chunks, {} tokens)",
            document.filename, document.chunk_count, document.total_tokens
        );
        if self.color {
            writeln!(out, "{}", line.bright_green())
        } else {
            writeln!(out, "{}", line)
        }
    }

    fn paint(&self, role: MessageRole, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        match role {
            MessageRole::User => text.green().to_string(),
            MessageRole::Assistant => text.bright_blue().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Transcript {
        let mut t = Transcript::new();
        t.append(Message::user("What is the summary?"));
        t.append(Message::assistant("It is short.\nVery short."));
        t
    }

    fn render_to_string(renderer: &ChatRenderer, transcript: &Transcript) -> String {
        let mut buf = Vec::new();
        renderer.render(transcript, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_render_order_and_markers() {
        let out = render_to_string(&ChatRenderer::plain(), &transcript());
        assert_eq!(out, "👨🏻 What is the summary?\n\n🤖 It is short.\n   Very short.\n\n");
    }

    #[test]
    fn test_render_is_idempotent() {
        let renderer = ChatRenderer::plain();
        let t = transcript();
        assert_eq!(render_to_string(&renderer, &t), render_to_string(&renderer, &t));
        assert_eq!(t.len(), 2);
    }

    #[test]
    fn test_empty_transcript_renders_nothing() {
        assert_eq!(render_to_string(&ChatRenderer::plain(), &Transcript::new()), "");
    }

    #[test]
    fn test_empty_message_still_shows_marker() {
        let mut buf = Vec::new();
        ChatRenderer::plain().render_message(&Message::assistant(""), &mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "🤖 \n\n");
    }
}
