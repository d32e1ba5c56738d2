const MAX_TITLE_CHARS: usize = 50;
const TRUNCATED_TITLE_CHARS: usize = 47;
const DEFAULT_TITLE: &str = "Nouvelle conversation";

/// Derive a conversation title from the first user message: cut at the
/// first sentence delimiter, then cap at 50 chars with an ellipsis.
/// Char-based throughout, so accented text never splits a codepoint.
pub fn conversation_title(first_message: &str) -> String {
    let mut title = first_message.trim();

    if let Some(end) = title.find(['.', '?', '!', '\n']) {
        title = title[..end].trim_end();
    }

    if title.is_empty() {
        return DEFAULT_TITLE.to_string();
    }

    if title.chars().count() > MAX_TITLE_CHARS {
        let truncated: String = title.chars().take(TRUNCATED_TITLE_CHARS).collect();
        format!("{}...", truncated)
    } else {
        title.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_message_is_kept_verbatim() {
        assert_eq!(conversation_title("Bonjour"), "Bonjour");
    }

    #[test]
    fn cuts_at_first_sentence_delimiter() {
        assert_eq!(
            conversation_title("Ma vanne fuit. J'ai déjà changé le joint."),
            "Ma vanne fuit"
        );
        assert_eq!(
            conversation_title("Que faire ?\nJ'ai tout essayé"),
            "Que faire"
        );
    }

    #[test]
    fn long_first_clause_is_truncated_to_47_chars_plus_ellipsis() {
        let message = "Fuite sur la vanne V-12 vérifiée, toujours présente. Que faire?";
        let title = conversation_title(message);

        let expected: String = "Fuite sur la vanne V-12 vérifiée, toujours présente"
            .chars()
            .take(47)
            .collect();
        assert_eq!(title, format!("{}...", expected));
        assert_eq!(title.chars().count(), 50);
    }

    #[test]
    fn accented_text_truncates_on_char_boundaries() {
        let message = "é".repeat(80);
        let title = conversation_title(&message);
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn empty_or_delimiter_only_message_falls_back() {
        assert_eq!(conversation_title("   "), DEFAULT_TITLE);
        assert_eq!(conversation_title("..."), DEFAULT_TITLE);
    }
}
