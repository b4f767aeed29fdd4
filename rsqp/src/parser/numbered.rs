use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::models::{BoundaryMode, ParsedOption, ParsedQuestion};
use crate::parser::scanner::{option_segments, question_segments};

/// Substring marking the correct option in the `plus_end` convention.
pub const CORRECT_MARKER: &str = "+++";

/// Bullet glyph some exports put in front of option text.
pub const OPTION_BULLET: char = '○';

static PLUS_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\+{3,}").unwrap());

/// How correctness is read from numbered option text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionMarking {
    /// A `+++` run anywhere in the option marks it correct.
    TrailingPlus,
    /// No markers; options carry their letter for a later merge.
    Unmarked,
}

fn strip_bullet(text: &str) -> &str {
    text.trim().trim_start_matches(OPTION_BULLET).trim()
}

fn build_option(body: &str, letter: char, marking: OptionMarking) -> Option<(String, bool)> {
    let (text, is_correct) = match marking {
        OptionMarking::TrailingPlus => {
            let is_correct = body.contains(CORRECT_MARKER);
            let stripped = PLUS_RUN.replace_all(body, "");
            (strip_bullet(&stripped).to_string(), is_correct)
        }
        OptionMarking::Unmarked => (strip_bullet(body).to_string(), false),
    };
    if text.is_empty() {
        tracing::debug!("Option {}: dropped, no text", letter);
        return None;
    }
    Some((text, is_correct))
}

/// Parses numbered questions with lettered options.
///
/// Used for the `plus_end` convention (`OptionMarking::TrailingPlus`) and the
/// `separate_file` convention (`OptionMarking::Unmarked`).
///
/// # Arguments
///
/// * `text` - Extracted document text.
/// * `mode` - Whether question and option markers must start a line.
/// * `marking` - How correctness is encoded in option text.
///
/// # Returns
///
/// Questions in source order, numbered as printed. Questions without text or
/// options are dropped, and so is any question repeating an earlier number.
pub fn parse_numbered(
    text: &str,
    mode: BoundaryMode,
    marking: OptionMarking,
) -> Vec<ParsedQuestion> {
    let mut questions: Vec<ParsedQuestion> = Vec::new();
    let mut seen: HashSet<u32> = HashSet::new();

    for segment in question_segments(text, mode) {
        let span = segment.body.trim();
        let question_text = span.lines().next().unwrap_or_default().trim();
        if question_text.is_empty() {
            tracing::debug!("Question {}: dropped, no text", segment.label);
            continue;
        }

        let mut options: Vec<ParsedOption> = Vec::new();
        for option in option_segments(span, mode) {
            let Some((option_text, marked)) = build_option(option.body, option.label, marking)
            else {
                continue;
            };
            let is_correct = marked && options.iter().all(|o| !o.is_correct);
            if marked && !is_correct {
                tracing::warn!(
                    "Question {}: option {} is marked correct but an earlier option already is",
                    segment.label,
                    option.label
                );
            }
            let mut parsed = ParsedOption::new(option_text, is_correct, options.len());
            if marking == OptionMarking::Unmarked {
                parsed = parsed.with_letter(option.label);
            }
            options.push(parsed);
        }

        if options.is_empty() {
            tracing::debug!("Question {}: dropped, no options", segment.label);
            continue;
        }
        if !seen.insert(segment.label) {
            tracing::warn!("Question {}: dropped, number already used", segment.label);
            continue;
        }

        questions.push(ParsedQuestion {
            order: segment.label,
            text: question_text.to_string(),
            options,
        });
    }

    questions
}
