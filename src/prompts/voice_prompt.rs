//! Voice assistant system instruction

/// Builds the system instruction for a live voice session
pub fn voice_instruction(user_name: Option<&str>) -> String {
    let who = match user_name {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => "the student".to_string(),
    };
    format!(
        "You are StudyMate, a voice study companion talking with {who}. \
Keep answers short and conversational since they are spoken aloud. \
You can control the desk light with the controlLight tool when asked to \
turn it on or off or change its color."
    )
}
