//! Selection of the sentence of a chunk that best matches a question.

use std::collections::HashSet;

use crate::document::TextSpan;

/// Lowercased alphanumeric terms of `text`.
fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Shrink `span` so it excludes surrounding whitespace.
fn trim_span(text: &str, span: TextSpan) -> TextSpan {
    let slice = &text[span.start..span.end];
    let leading = slice.len() - slice.trim_start().len();
    let trailing = slice.len() - slice.trim_end().len();
    if leading == slice.len() {
        return TextSpan { start: span.start, end: span.start };
    }
    TextSpan { start: span.start + leading, end: span.end - trailing }
}

/// Split `text` into sentences ending at `.`, `!` or `?` followed by whitespace.
pub fn sentence_spans(text: &str) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        if !chars.peek().is_some_and(|(_, next)| next.is_whitespace()) {
            continue;
        }
        spans.push(TextSpan { start, end: i + c.len_utf8() });
        start = text.len();
        while let Some(&(j, next)) = chars.peek() {
            if !next.is_whitespace() {
                start = j;
                break;
            }
            chars.next();
        }
    }
    if start < text.len() {
        spans.push(TextSpan { start, end: text.len() });
    }

    spans.into_iter().map(|span| trim_span(text, span)).filter(|s| s.start < s.end).collect()
}

/// Pick the sentence of `text` sharing the largest fraction of the
/// question's terms. Ties go to the earlier sentence.
///
/// Without question terms the whole trimmed text is selected. Returns `None`
/// only for blank text.
pub fn select_highlight(text: &str, question: &str) -> Option<TextSpan> {
    let whole = trim_span(text, TextSpan { start: 0, end: text.len() });
    if whole.start == whole.end {
        return None;
    }

    let question_terms = terms(question);
    if question_terms.is_empty() {
        return Some(whole);
    }

    let sentences = sentence_spans(text);
    let mut best = sentences.first().copied().unwrap_or(whole);
    let mut best_score = -1.0f32;
    for span in sentences {
        let sentence_terms = terms(&text[span.start..span.end]);
        if sentence_terms.is_empty() {
            continue;
        }
        let overlap = question_terms.intersection(&sentence_terms).count();
        let score = overlap as f32 / question_terms.len() as f32;
        if score > best_score {
            best_score = score;
            best = span;
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight<'a>(text: &'a str, question: &str) -> &'a str {
        let span = select_highlight(text, question).unwrap();
        &text[span.start..span.end]
    }

    #[test]
    fn picks_sentence_with_most_question_terms() {
        let text = "The office opens at nine. Employees are entitled to 15 days of paid vacation per year. Parking is free.";
        assert_eq!(
            highlight(text, "How many vacation days do I get?"),
            "Employees are entitled to 15 days of paid vacation per year."
        );
    }

    #[test]
    fn without_terms_highlights_whole_text() {
        assert_eq!(highlight("  One. Two.  ", "???"), "One. Two.");
    }

    #[test]
    fn blank_text_has_no_highlight() {
        assert!(select_highlight("   ", "anything").is_none());
    }

    #[test]
    fn sentences_keep_terminal_punctuation() {
        let text = "First one! Second one?  Third";
        let spans: Vec<&str> =
            sentence_spans(text).into_iter().map(|s| &text[s.start..s.end]).collect();
        assert_eq!(spans, vec!["First one!", "Second one?", "Third"]);
    }

    #[test]
    fn abbreviations_without_whitespace_do_not_split() {
        let text = "Version 1.5 ships today.";
        assert_eq!(sentence_spans(text).len(), 1);
    }
}
