//! Shared utility functions

/// Mask a sender identifier (phone number / wa_id) for logging.
///
/// Keeps the first three and last three characters and replaces the
/// middle with `*`. Identifiers of six characters or fewer only keep
/// their last two characters.
///
/// # Examples
///
/// ```
/// use aurora_server::util::mask_id;
///
/// assert_eq!(mask_id("5511987654321"), "551*******321");
/// assert_eq!(mask_id("555"), "*55");
/// ```
pub fn mask_id(id: &str) -> String {
    let chars: Vec<char> = id.chars().collect();
    let len = chars.len();

    if len <= 6 {
        let keep = len.min(2);
        return std::iter::repeat('*')
            .take(len - keep)
            .chain(chars[len - keep..].iter().copied())
            .collect();
    }

    chars
        .iter()
        .enumerate()
        .map(|(i, c)| if i < 3 || i >= len - 3 { *c } else { '*' })
        .collect()
}

/// Truncate text for log previews without splitting a character.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut out: String = text.chars().take(max_chars).collect();
    if text.chars().count() > max_chars {
        out.push('…');
    }
    out
}
