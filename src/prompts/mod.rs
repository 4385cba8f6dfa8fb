//! Prompts and prompt composition
//!
//! System instructions for text chat and the voice assistant, the greeting
//! shown at the top of every transcript, and the helper that turns a user
//! message plus its attachments into the prompt sent to the model.

pub mod chat_prompt;
pub mod voice_prompt;

pub use chat_prompt::{greeting, system_instruction};
pub use voice_prompt::voice_instruction;

use crate::attachments::ChatAttachment;

/// Prompt text used when a message carries only attachments
pub const ATTACHMENTS_ONLY_PROMPT: &str = "Please look at the attached files.";

/// Builds the prompt sent to the chat model
///
/// The literal text (or [`ATTACHMENTS_ONLY_PROMPT`] when it is blank) is
/// followed by one summary line per attachment.
///
/// # Examples
///
/// ```
/// use studymate::prompts::compose_prompt;
///
/// assert_eq!(compose_prompt("Explain mitosis", &[]), "Explain mitosis");
/// ```
pub fn compose_prompt(text: &str, attachments: &[ChatAttachment]) -> String {
    let text = text.trim();
    let mut prompt = if text.is_empty() && !attachments.is_empty() {
        ATTACHMENTS_ONLY_PROMPT.to_string()
    } else {
        text.to_string()
    };

    if !attachments.is_empty() {
        prompt.push('\n');
        for attachment in attachments {
            prompt.push_str(&format!(
                "\n[Attached file: {} ({}, {})]",
                attachment.name,
                attachment.mime_type,
                format_size(attachment.size)
            ));
        }
    }
    prompt
}

/// Human-readable byte size
///
/// # Examples
///
/// ```
/// use studymate::prompts::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1536), "1.5 KB");
/// assert_eq!(format_size(3 * 1024 * 1024), "3.0 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, UNITS[unit])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attachment(name: &str, mime: &str, size: u64) -> ChatAttachment {
        ChatAttachment {
            name: name.to_string(),
            mime_type: mime.to_string(),
            size,
            path: format!("u/{}", name),
            url: Some("https://example.com/signed".to_string()),
        }
    }

    #[test]
    fn test_compose_prompt_with_attachments() {
        let prompt = compose_prompt(
            "Summarize these",
            &[
                attachment("notes.txt", "text/plain", 2048),
                attachment("chart.png", "image/png", 100),
            ],
        );
        assert_eq!(
            prompt,
            "Summarize these\n\n[Attached file: notes.txt (text/plain, 2.0 KB)]\n[Attached file: chart.png (image/png, 100 B)]"
        );
    }

    #[test]
    fn test_compose_prompt_uses_fallback_for_attachments_only() {
        let prompt = compose_prompt("   ", &[attachment("a.pdf", "application/pdf", 10)]);
        assert!(prompt.starts_with(ATTACHMENTS_ONLY_PROMPT));
        assert!(prompt.contains("[Attached file: a.pdf (application/pdf, 10 B)]"));
    }

    #[test]
    fn test_format_size_caps_at_gigabytes() {
        assert_eq!(format_size(5 * 1024 * 1024 * 1024 * 1024), "5120.0 GB");
    }
}
