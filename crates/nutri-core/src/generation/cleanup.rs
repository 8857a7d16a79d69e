//! Post-hoc cleanup of raw model continuations.
//!
//! Small models tend to loop. Cleanup keeps the first few distinct sentences
//! and drops verbatim repeats.

use std::collections::HashSet;

/// Split `text` into sentences.
///
/// A boundary is a `.`, `!` or `?` followed by one or more whitespace
/// characters; the punctuation stays with its sentence and the whitespace run
/// is consumed. Pieces are returned untrimmed except for the consumed
/// separators.
pub fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, ch)) = chars.next() {
        if prev_terminal && ch.is_whitespace() {
            sentences.push(&text[start..idx]);
            let mut next_start = idx + ch.len_utf8();
            while let Some(&(j, c)) = chars.peek() {
                if !c.is_whitespace() {
                    break;
                }
                next_start = j + c.len_utf8();
                chars.next();
            }
            start = next_start;
            prev_terminal = false;
            continue;
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }

    if start < text.len() {
        sentences.push(&text[start..]);
    }
    sentences
}

/// Keep at most `max_sentences` distinct sentences of `completion`.
///
/// Sentences are compared by their trimmed, lowercased form; later
/// duplicates are dropped and empty sentences are skipped without counting
/// toward the limit. Kept sentences are joined with single spaces.
///
/// Applying this to its own output returns the same text.
pub fn clean_completion(completion: &str, max_sentences: usize) -> String {
    let mut seen = HashSet::new();
    let mut kept: Vec<&str> = Vec::new();

    for sentence in split_sentences(completion.trim()) {
        if kept.len() >= max_sentences {
            break;
        }
        let trimmed = sentence.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !seen.insert(trimmed.to_lowercase()) {
            continue;
        }
        kept.push(trimmed);
    }

    kept.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation_followed_by_whitespace() {
        assert_eq!(
            split_sentences("Eat dal. Avoid salt!  Drink water? ok"),
            vec!["Eat dal.", "Avoid salt!", "Drink water?", "ok"]
        );
    }

    #[test]
    fn punctuation_without_whitespace_does_not_split() {
        assert_eq!(
            split_sentences("Use 2.5 cups of rice.Then rest."),
            vec!["Use 2.5 cups of rice.Then rest."]
        );
    }

    #[test]
    fn newlines_count_as_whitespace() {
        assert_eq!(
            split_sentences("Breakfast: idli.\n- Lunch: dal."),
            vec!["Breakfast: idli.", "- Lunch: dal."]
        );
    }

    #[test]
    fn drops_case_insensitive_duplicates_in_order() {
        let cleaned = clean_completion("Eat dal. EAT DAL. Avoid salt.", 6);
        assert_eq!(cleaned, "Eat dal. Avoid salt.");
        assert!(!cleaned.contains("EAT DAL."));
    }

    #[test]
    fn caps_sentence_count() {
        let text = "One. Two. Three. Four. Five. Six. Seven. Eight.";
        assert_eq!(clean_completion(text, 6), "One. Two. Three. Four. Five. Six.");
        assert_eq!(clean_completion(text, 2), "One. Two.");
    }

    #[test]
    fn duplicates_do_not_count_toward_limit() {
        let text = "A. A. A. B. C.";
        assert_eq!(clean_completion(text, 3), "A. B. C.");
    }

    #[test]
    fn whitespace_only_input_is_empty() {
        assert_eq!(clean_completion("   \n\t ", 6), "");
    }

    #[test]
    fn cleanup_is_idempotent() {
        let inputs = [
            "Eat dal. EAT DAL. Avoid salt.",
            "  Lots   of   space.   Here!\n\nAnd here?  trailing",
            "One. Two. Three. Four. Five. Six. Seven.",
            "No terminal punctuation at all",
            "Mixed. mixed. MIXED! Mixed?",
        ];
        for input in inputs {
            let once = clean_completion(input, 6);
            let twice = clean_completion(&once, 6);
            assert_eq!(once, twice, "not idempotent for {input:?}");
        }
    }
}
