//! Conversation title derivation

/// Words kept from the first user message
///
/// Seven words turn "Can you help me study for my biology exam tomorrow
/// please" into "Can you help me study for my…".
pub const TITLE_MAX_WORDS: usize = 7;

/// Derives a conversation title from the first user message
///
/// Keeps the leading words, capitalizes the first letter and appends `…`
/// when words were dropped. Returns `None` for blank input.
///
/// # Examples
///
/// ```
/// use studymate::chat::derive_title;
///
/// assert_eq!(
///     derive_title("Can you help me study for my biology exam tomorrow please").as_deref(),
///     Some("Can you help me study for my…")
/// );
/// assert_eq!(derive_title("photosynthesis").as_deref(), Some("Photosynthesis"));
/// ```
pub fn derive_title(text: &str) -> Option<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    let kept = &words[..words.len().min(TITLE_MAX_WORDS)];
    let joined = kept.join(" ");
    let mut chars = joined.chars();
    let mut title = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => return None,
    };
    if words.len() > TITLE_MAX_WORDS {
        title.push('…');
    }
    Some(title)
}
