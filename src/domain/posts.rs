use time::{format_description::FormatItem, macros::format_description};

/// Number of characters a post or comment contributes to its display name.
pub const HEADLINE_CHARS: usize = 15;

pub const HUMAN_DATE_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year]");
pub const HUMAN_DATETIME_FORMAT: &[FormatItem<'static>] =
    format_description!("[day padding:none] [month repr:long] [year], [hour]:[minute]");

/// Leading slice of `text` limited to [`HEADLINE_CHARS`] characters.
pub fn headline(text: &str) -> &str {
    match text.char_indices().nth(HEADLINE_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headline_counts_characters_not_bytes() {
        assert_eq!(headline("Тестовый пост для проверки"), "Тестовый пост д");
    }

    #[test]
    fn short_text_is_returned_whole() {
        assert_eq!(headline("hello"), "hello");
        assert_eq!(headline(""), "");
    }
}
