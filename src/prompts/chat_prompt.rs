//! Text chat system instruction and greeting

const TUTOR_ROLE: &str = r#"You are StudyMate, a friendly and patient study assistant for students.

## How to help

- Explain concepts step by step, starting from what the student already knows
- Prefer short paragraphs, lists and worked examples over long essays
- When the student shares files, read them carefully and refer to them by name
- Ask a clarifying question when a request is ambiguous
- Never invent citations; say so when you are unsure
- Encourage the student to attempt problems before giving full solutions"#;

/// Builds the system instruction for a chat session
///
/// # Examples
///
/// ```
/// use studymate::prompts::system_instruction;
///
/// let prompt = system_instruction(true, Some("Ada"));
/// assert!(prompt.contains("Ada"));
/// assert!(prompt.contains("saved"));
/// ```
pub fn system_instruction(memory_enabled: bool, user_name: Option<&str>) -> String {
    let mut prompt = String::from(TUTOR_ROLE);

    prompt.push_str("\n\n## Session\n\n");
    match user_name {
        Some(name) if !name.trim().is_empty() => {
            prompt.push_str(&format!("You are talking with {}. Use their name now and then.\n", name.trim()));
        }
        _ => prompt.push_str("The student has not signed in.\n"),
    }

    if memory_enabled {
        prompt.push_str(
            "This conversation is saved. Earlier turns may be replayed to you; build on them instead of repeating yourself.\n",
        );
    } else {
        prompt.push_str(
            "Memory is off. Nothing from this conversation is kept after the session ends.\n",
        );
    }
    prompt
}

/// Greeting shown as the first transcript entry
pub fn greeting(user_name: Option<&str>) -> String {
    match user_name {
        Some(name) if !name.trim().is_empty() => format!(
            "Hi {}! I'm StudyMate. What are we studying today?",
            name.trim()
        ),
        _ => "Hi! I'm StudyMate. What are we studying today?".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_instruction_memory_off() {
        let prompt = system_instruction(false, None);
        assert!(prompt.contains("Memory is off"));
        assert!(prompt.contains("has not signed in"));
    }

    #[test]
    fn test_greeting_with_and_without_name() {
        assert!(greeting(Some("Sam")).starts_with("Hi Sam!"));
        assert!(greeting(Some("  ")).starts_with("Hi!"));
        assert!(greeting(None).starts_with("Hi!"));
    }
}
