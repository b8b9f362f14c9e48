//! Token-bounded text chunker with overlap.
//!
//! Splits document text on blank-line paragraph boundaries, accumulating
//! paragraphs until the token budget would overflow. Each new chunk is seeded
//! with a trailing window of the previous chunk's parts so adjacent chunks
//! share context. Paragraphs that are themselves over budget are re-split at
//! sentence boundaries with the same accumulate/overlap logic.
//!
//! Guarantees:
//! - every paragraph's text appears verbatim, in order, across the chunks
//! - no chunk is empty or whitespace-only
//! - every chunk stays within `max_tokens`, except a single indivisible
//!   sentence over the budget, which is emitted whole
//!
//! Budget checks measure the joined candidate chunk, not the sum of part
//! counts, so separator tokens are accounted for.

use crate::tokenizer::count_tokens;

const PARA_SEP: &str = "\n\n";
const SENT_SEP: &str = " ";

/// Split `text` into overlapping chunks of at most `max_tokens` tokens.
///
/// Text that already fits the budget is returned as a single chunk,
/// including the empty string.
pub fn chunk_text(text: &str, max_tokens: usize, overlap_tokens: usize) -> Vec<String> {
    if count_tokens(text) <= max_tokens {
        return vec![text.to_string()];
    }

    let paragraphs: Vec<&str> = text
        .split(PARA_SEP)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let mut chunks: Vec<String> = Vec::new();
    let mut parts: Vec<String> = Vec::new();

    for para in paragraphs {
        // Oversized paragraph: flush what we have, then accumulate its
        // sentences under the same budget.
        if count_tokens(para) > max_tokens {
            if !parts.is_empty() {
                chunks.push(parts.join(PARA_SEP));
                parts = overlap_window(&parts, overlap_tokens);
            }
            for sent in split_sentences(para) {
                push_part(&mut chunks, &mut parts, sent, SENT_SEP, max_tokens, overlap_tokens);
            }
            continue;
        }

        push_part(&mut chunks, &mut parts, para, PARA_SEP, max_tokens, overlap_tokens);
    }

    if !parts.is_empty() {
        chunks.push(parts.join(PARA_SEP));
    }

    chunks
}

/// Append `unit` to the running chunk, flushing first when it would not fit.
///
/// After a flush the running chunk is reseeded with the overlap window; if
/// even the seeded window cannot accommodate the unit, the seed is dropped so
/// the size bound holds. A unit that exceeds the budget on its own is kept
/// whole and becomes its own chunk on the next flush.
fn push_part(
    chunks: &mut Vec<String>,
    parts: &mut Vec<String>,
    unit: &str,
    sep: &str,
    max_tokens: usize,
    overlap_tokens: usize,
) {
    if !parts.is_empty() && !fits(parts, unit, sep, max_tokens) {
        chunks.push(parts.join(sep));
        *parts = overlap_window(parts, overlap_tokens);
        if !parts.is_empty() && !fits(parts, unit, sep, max_tokens) {
            parts.clear();
        }
    }
    parts.push(unit.to_string());
}

/// Whether `parts + sep + unit` stays within the token budget, measured on
/// the joined string.
fn fits(parts: &[String], unit: &str, sep: &str, max_tokens: usize) -> bool {
    let mut candidate = parts.join(sep);
    if !candidate.is_empty() {
        candidate.push_str(sep);
    }
    candidate.push_str(unit);
    count_tokens(&candidate) <= max_tokens
}

/// Split a paragraph into sentences: terminal punctuation followed by
/// whitespace ends a sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;

    for (i, ch) in text.char_indices() {
        if prev_terminal && ch.is_whitespace() {
            let sent = text[start..i].trim();
            if !sent.is_empty() {
                sentences.push(sent);
            }
            start = i;
        }
        prev_terminal = matches!(ch, '.' | '!' | '?');
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }
    sentences
}

/// Trailing suffix of `parts` whose cumulative token count fits within
/// `overlap_tokens`. Walks backward and keeps whole parts only.
fn overlap_window(parts: &[String], overlap_tokens: usize) -> Vec<String> {
    if parts.is_empty() || overlap_tokens == 0 {
        return Vec::new();
    }
    let mut window: Vec<String> = Vec::new();
    let mut tokens = 0usize;
    for part in parts.iter().rev() {
        let t = count_tokens(part);
        if tokens + t > overlap_tokens {
            break;
        }
        window.insert(0, part.clone());
        tokens += t;
    }
    window
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Paragraph of `n_sents` short sentences, each roughly ten tokens.
    fn para(n: usize, n_sents: usize) -> String {
        (0..n_sents)
            .map(|s| format!("This is sentence {s} of test paragraph number {n}."))
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunks = chunk_text("Hello, world!", 512, 64);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn empty_text_is_one_empty_chunk() {
        let chunks = chunk_text("", 512, 64);
        assert_eq!(chunks, vec![String::new()]);
    }

    #[test]
    fn paragraphs_are_preserved_in_order() {
        let paragraphs: Vec<String> = (0..12).map(|n| para(n, 2)).collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunk_text(&text, 60, 0);
        assert!(chunks.len() > 1);

        let joined = chunks.join("\n\n");
        let mut cursor = 0;
        for p in &paragraphs {
            let pos = joined[cursor..]
                .find(p.as_str())
                .unwrap_or_else(|| panic!("paragraph missing or out of order: {p}"));
            cursor += pos;
        }
    }

    #[test]
    fn chunks_respect_token_budget() {
        let text = (0..20).map(|n| para(n, 2)).collect::<Vec<_>>().join("\n\n");
        let max = 80;
        for chunk in chunk_text(&text, max, 16) {
            let tokens = count_tokens(&chunk);
            assert!(tokens <= max, "chunk over budget: {tokens} tokens");
        }
    }

    #[test]
    fn no_chunk_is_blank() {
        let text = "First.\n\n\n\n   \n\nSecond paragraph here with quite a few words in it.\n\nThird one follows right after the second.";
        for chunk in chunk_text(text, 8, 0) {
            assert!(!chunk.trim().is_empty());
        }
    }

    #[test]
    fn oversized_paragraph_splits_on_sentences() {
        let sentences: Vec<String> = (0..15)
            .map(|s| format!("Sentence number {s} carries several words of filler text."))
            .collect();
        let text = sentences.join(" ");
        let max = 30;
        let chunks = chunk_text(&text, max, 0);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(count_tokens(chunk) <= max);
        }
        // All sentence text survives, in order.
        let joined = chunks.join(" ");
        let mut cursor = 0;
        for s in &sentences {
            let pos = joined[cursor..].find(s.as_str()).expect("sentence missing");
            cursor += pos;
        }
    }

    #[test]
    fn single_indivisible_sentence_is_emitted_whole() {
        let long_sentence = (0..100)
            .map(|w| format!("word{w}"))
            .collect::<Vec<_>>()
            .join(" ");
        let chunks = chunk_text(&long_sentence, 10, 0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0], long_sentence);
    }

    #[test]
    fn overlap_repeats_trailing_parts() {
        let paragraphs: Vec<String> = (0..8).map(|n| para(n, 1)).collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunk_text(&text, 40, 20);
        assert!(chunks.len() > 1);

        // The head of a later chunk should repeat text from its predecessor.
        let mut overlapped = false;
        for pair in chunks.windows(2) {
            let first_part = pair[1].split("\n\n").next().unwrap();
            if pair[0].contains(first_part) {
                overlapped = true;
            }
        }
        assert!(overlapped, "expected at least one overlapping boundary");
    }

    #[test]
    fn zero_overlap_produces_no_repeats() {
        let paragraphs: Vec<String> = (0..6).map(|n| para(n, 1)).collect();
        let text = paragraphs.join("\n\n");
        let chunks = chunk_text(&text, 30, 0);
        assert!(chunks.len() > 1);
        for pair in chunks.windows(2) {
            let first_part = pair[1].split("\n\n").next().unwrap();
            assert!(!pair[0].contains(first_part));
        }
    }

    #[test]
    fn chunking_is_deterministic() {
        let text = (0..10).map(|n| para(n, 3)).collect::<Vec<_>>().join("\n\n");
        assert_eq!(chunk_text(&text, 64, 16), chunk_text(&text, 64, 16));
    }
}
