use crate::playlist::scoring::PLAYLIST_NAME_MAX_LENGTH;

/// Helper trait for string formatting
pub trait ToTitleCase {
    fn to_title_case(&self) -> String;
}

impl ToTitleCase for str {
    fn to_title_case(&self) -> String {
        self.split_whitespace()
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    None => String::new(),
                    Some(first) => {
                        first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                    }
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Derive a playlist name suggestion from the prompt: title-cased and
/// truncated to the catalog's name limit.
pub fn suggested_playlist_name(prompt: &str) -> String {
    let trimmed = prompt.trim();
    if trimmed.is_empty() {
        return "AI Playlist".to_string();
    }
    trimmed
        .to_title_case()
        .chars()
        .take(PLAYLIST_NAME_MAX_LENGTH)
        .collect()
}
