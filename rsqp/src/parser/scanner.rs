//! Linear boundary scanner shared by the numbered grammars.
//!
//! A scan walks the text once, left to right, and records every marker that
//! starts a new segment. Markers never overlap, a marker must be followed by
//! at least one character, and a body always keeps its first character, so
//! `1. 2. 3.` yields one question whose text is `2. 3.`.

use crate::models::BoundaryMode;

/// A labelled slice of the scanned text.
///
/// # Fields
///
/// * `label` - What the marker carried (question number or option letter).
/// * `body` - Text from after the marker (and its trailing whitespace) up to the next marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a, T> {
    pub label: T,
    pub body: &'a str,
}

#[derive(Debug, Clone, Copy)]
struct Marker<T> {
    start: usize,
    body_start: usize,
    label: T,
}

fn skip_whitespace(bytes: &[u8], mut idx: usize) -> usize {
    while idx < bytes.len() && bytes[idx].is_ascii_whitespace() {
        idx += 1;
    }
    idx
}

/// `<digits>.` or `<digits>)`, the digit run not continuing an earlier one.
fn question_marker(bytes: &[u8], idx: usize) -> Option<(u32, usize)> {
    if !bytes[idx].is_ascii_digit() || (idx > 0 && bytes[idx - 1].is_ascii_digit()) {
        return None;
    }
    let mut end = idx;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end >= bytes.len() || !matches!(bytes[end], b'.' | b')') {
        return None;
    }
    // the digit run is pure ASCII
    let number = std::str::from_utf8(&bytes[idx..end]).ok()?.parse::<u32>().ok()?;
    Some((number, end + 1))
}

/// `<A-Z>.` or `<A-Z>)`.
fn option_marker(bytes: &[u8], idx: usize) -> Option<(char, usize)> {
    let letter = bytes[idx];
    if !letter.is_ascii_uppercase() {
        return None;
    }
    match bytes.get(idx + 1) {
        Some(b'.') | Some(b')') => Some((letter as char, idx + 2)),
        _ => None,
    }
}

fn scan<T: Copy>(
    text: &str,
    mode: BoundaryMode,
    marker_at: fn(&[u8], usize) -> Option<(T, usize)>,
) -> Vec<Segment<'_, T>> {
    let bytes = text.as_bytes();
    let mut markers: Vec<Marker<T>> = Vec::new();
    let mut earliest = 0;
    let mut idx = 0;
    // only spaces or tabs since the last newline
    let mut at_line_start = true;

    while idx < bytes.len() {
        let allowed = match mode {
            BoundaryMode::Permissive => true,
            BoundaryMode::LineAnchored => at_line_start,
        };
        if idx >= earliest && allowed {
            if let Some((label, end)) = marker_at(bytes, idx).filter(|(_, end)| *end < bytes.len()) {
                let body_start = skip_whitespace(bytes, end);
                markers.push(Marker {
                    start: idx,
                    body_start,
                    label,
                });
                earliest = body_start + 1;
                idx = end;
                at_line_start = false;
                continue;
            }
        }
        at_line_start = match bytes[idx] {
            b'\n' => true,
            b' ' | b'\t' => at_line_start,
            _ => false,
        };
        idx += 1;
    }

    let mut segments = Vec::with_capacity(markers.len());
    for (i, marker) in markers.iter().enumerate() {
        let end = markers.get(i + 1).map(|next| next.start).unwrap_or(bytes.len());
        segments.push(Segment {
            label: marker.label,
            body: &text[marker.body_start.min(end)..end],
        });
    }
    segments
}

/// Splits text into numbered question spans.
///
/// # Arguments
///
/// * `text` - The whole extracted document.
/// * `mode` - Whether markers must start a line.
///
/// # Returns
///
/// One segment per question marker, labelled with the printed number. Text
/// before the first marker is not part of any segment.
pub fn question_segments(text: &str, mode: BoundaryMode) -> Vec<Segment<'_, u32>> {
    scan(text, mode, question_marker)
}

/// Splits a question span into lettered option spans.
pub fn option_segments(text: &str, mode: BoundaryMode) -> Vec<Segment<'_, char>> {
    scan(text, mode, option_marker)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels<T: Copy>(segments: &[Segment<'_, T>]) -> Vec<T> {
        segments.iter().map(|s| s.label).collect()
    }

    #[test]
    fn test_question_segments_basic() {
        let text = "Intro line\n1. First?\nA) a\n2) Second?\nB) b\n";
        let segments = question_segments(text, BoundaryMode::LineAnchored);
        assert_eq!(labels(&segments), vec![1, 2]);
        assert_eq!(segments[0].body, "First?\nA) a\n");
        assert_eq!(segments[1].body, "Second?\nB) b\n");
    }

    #[test]
    fn test_digit_run_must_not_continue_a_number() {
        let text = "12. Twelve\n";
        let segments = question_segments(text, BoundaryMode::Permissive);
        assert_eq!(labels(&segments), vec![12]);
        assert_eq!(segments[0].body, "Twelve\n");
    }

    #[test]
    fn test_line_anchored_ignores_inline_numbers() {
        let text = "1. Pick 3. or 4)\nA) x\n  2. Indented\nA) y";
        let segments = question_segments(text, BoundaryMode::LineAnchored);
        assert_eq!(labels(&segments), vec![1, 2]);
        assert_eq!(segments[0].body, "Pick 3. or 4)\nA) x\n  ");
    }

    #[test]
    fn test_permissive_splits_inline_numbers() {
        let text = "1. Pick 3. or 4)\nA) x";
        let segments = question_segments(text, BoundaryMode::Permissive);
        assert_eq!(labels(&segments), vec![1, 3, 4]);
    }

    #[test]
    fn test_body_needs_one_character() {
        let segments = question_segments("1. 2. 3.", BoundaryMode::Permissive);
        assert_eq!(labels(&segments), vec![1]);
        assert_eq!(segments[0].body, "2. 3.");
    }

    #[test]
    fn test_trailing_marker_is_not_a_boundary() {
        let segments = question_segments("1. Q\n2.", BoundaryMode::LineAnchored);
        assert_eq!(labels(&segments), vec![1]);
        assert_eq!(segments[0].body, "Q\n2.");

        let segments = question_segments("1. Q\n2. \n", BoundaryMode::LineAnchored);
        assert_eq!(labels(&segments), vec![1, 2]);
        assert_eq!(segments[1].body, "");
    }

    #[test]
    fn test_overflowing_number_is_not_a_marker() {
        let segments = question_segments("99999999999. Q", BoundaryMode::Permissive);
        assert!(segments.is_empty());
    }

    #[test]
    fn test_option_segments() {
        let span = "What is 2+2?\nA) 3\nB. 4+++\n\tC) 5";
        let segments = option_segments(span, BoundaryMode::LineAnchored);
        assert_eq!(labels(&segments), vec!['A', 'B', 'C']);
        assert_eq!(segments[0].body, "3\n");
        assert_eq!(segments[1].body, "4+++\n\t");
        assert_eq!(segments[2].body, "5");
    }

    #[test]
    fn test_option_segments_permissive_same_line() {
        let span = "Pick one: A) red B) blue";
        let segments = option_segments(span, BoundaryMode::Permissive);
        assert_eq!(labels(&segments), vec!['A', 'B']);
        assert_eq!(segments[0].body, "red ");
        assert_eq!(segments[1].body, "blue");
        assert!(option_segments(span, BoundaryMode::LineAnchored).is_empty());
    }

    #[test]
    fn test_long_indentation_before_markers() {
        let padding = " \t".repeat(100_000);
        let text = format!("1. Q\n{padding}A) x\n{padding}2. R\n{padding}B) y");
        let questions = question_segments(&text, BoundaryMode::LineAnchored);
        assert_eq!(labels(&questions), vec![1, 2]);
        assert_eq!(questions[0].body, format!("Q\n{padding}A) x\n{padding}"));
        assert_eq!(questions[1].body, format!("R\n{padding}B) y"));

        let options = option_segments(questions[0].body, BoundaryMode::LineAnchored);
        assert_eq!(labels(&options), vec!['A']);
        assert_eq!(options[0].body, format!("x\n{padding}"));
    }

    #[test]
    fn test_multibyte_text_is_sliced_safely() {
        let text = "1. Qu'est-ce que « π » ?\nA) ○ trois\nB) quatre";
        let questions = question_segments(text, BoundaryMode::LineAnchored);
        assert_eq!(questions.len(), 1);
        let options = option_segments(questions[0].body, BoundaryMode::LineAnchored);
        assert_eq!(options[0].body, "○ trois\n");
    }
}
