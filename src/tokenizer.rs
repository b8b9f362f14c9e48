//! Token counting with the `cl100k_base` encoding.
//!
//! The encoder is loaded once and cached for the life of the process. If the
//! vocabulary cannot be initialized, counting degrades to a whitespace-word
//! estimate rather than failing the pipeline.

use std::sync::OnceLock;

use tiktoken_rs::CoreBPE;

fn encoder() -> Option<&'static CoreBPE> {
    static ENCODER: OnceLock<Option<CoreBPE>> = OnceLock::new();
    ENCODER
        .get_or_init(|| tiktoken_rs::cl100k_base().ok())
        .as_ref()
}

/// Count tokens in `text`.
pub fn count_tokens(text: &str) -> usize {
    if let Some(enc) = encoder() {
        return enc.encode_with_special_tokens(text).len();
    }
    fallback_count(text)
}

fn fallback_count(text: &str) -> usize {
    let words = text.split_whitespace().count();
    if words == 0 && !text.is_empty() {
        1
    } else {
        words
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_has_zero_tokens() {
        assert_eq!(count_tokens(""), 0);
    }

    #[test]
    fn counting_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog.";
        assert_eq!(count_tokens(text), count_tokens(text));
        assert!(count_tokens(text) > 0);
    }

    #[test]
    fn longer_text_has_more_tokens() {
        let short = "one two three";
        let long = short.repeat(20);
        assert!(count_tokens(&long) > count_tokens(short));
    }
}
