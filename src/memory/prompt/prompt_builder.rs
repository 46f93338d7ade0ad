//! Prompt builder for conversation context.

use crate::memory::core::message::Message;

const SHORT_TERM_HEADER: &str = "[SHORT_TERM]\n";
const RELEVANT_HEADER: &str = "[MEMORY_RELEVANT]\n";
const USER_HEADER: &str = "[USER_MESSAGE]\n";

/// Inputs of a generation prompt.
#[derive(Clone, Debug, Default)]
pub struct PromptParts {
    /// Instruction text placed first; empty omits it.
    pub preamble: String,
    /// Most recent messages, oldest first.
    pub short_term: Vec<Message>,
    /// Similarity-retrieved messages, nearest first.
    pub relevant: Vec<Message>,
    /// The new user query.
    pub user_message: String,
    /// Render the retrieved section before the short-term section.
    pub relevant_first: bool,
}

impl PromptParts {
    /// Rough output length used to size the buffer.
    #[must_use]
    pub fn estimate_len(&self) -> usize {
        let lines: usize = self
            .short_term
            .iter()
            .chain(&self.relevant)
            .map(|m| m.content.len() + 12)
            .sum();
        self.preamble.len() + lines + self.user_message.len() + 64
    }
}

/// Build a deterministic prompt from prepared parts.
///
/// Identical parts always produce byte-identical output. Empty sections are
/// omitted together with their header.
#[must_use]
pub fn build_prompt_block(parts: &PromptParts) -> String {
    let mut out = String::with_capacity(parts.estimate_len());

    if !parts.preamble.is_empty() {
        out.push_str(&parts.preamble);
        out.push_str("\n\n");
    }

    if parts.relevant_first {
        render_section(&mut out, RELEVANT_HEADER, &parts.relevant);
        render_section(&mut out, SHORT_TERM_HEADER, &parts.short_term);
    } else {
        render_section(&mut out, SHORT_TERM_HEADER, &parts.short_term);
        render_section(&mut out, RELEVANT_HEADER, &parts.relevant);
    }

    out.push_str(USER_HEADER);
    out.push_str("User: ");
    out.push_str(&parts.user_message);
    out.push_str("\nAssistant:");

    out
}

/// Render a raw `(role, content)` transcript as a prompt.
///
/// Used when context assembly is unavailable.
#[must_use]
pub fn build_transcript_prompt<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut out = String::new();
    for (role, content) in entries {
        render_line(&mut out, role, content);
    }
    out.push_str("\nAssistant:");
    out
}

fn render_section(out: &mut String, header: &str, messages: &[Message]) {
    if messages.is_empty() {
        return;
    }

    out.push_str(header);
    for message in messages {
        render_line(out, message.role.as_str(), &message.content);
    }
    out.push('\n');
}

fn render_line(out: &mut String, role: &str, content: &str) {
    out.push_str(role);
    out.push_str(": ");
    out.push_str(content);
    out.push('\n');
}
