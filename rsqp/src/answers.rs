use regex::Regex;
use std::sync::LazyLock;

use crate::models::{AnswerKey, ParsedQuestion};

/// `1. B`, `1.B`, `1) B`
static ANSWER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)[.)]\s*([A-Z])").unwrap());

/// Reads a question-number to letter mapping from answer-key text.
///
/// Never fails: text without any `<number>. <letter>` pair yields an empty key,
/// and for a number listed twice the later entry wins.
pub fn parse_answer_key(text: &str) -> AnswerKey {
    let mut key = AnswerKey::new();
    for caps in ANSWER_PATTERN.captures_iter(text) {
        let Ok(question) = caps[1].parse::<u32>() else {
            tracing::debug!("Answer key: skipped out-of-range number {}", &caps[1]);
            continue;
        };
        if let Some(letter) = caps[2].chars().next() {
            key.insert(question, letter);
        }
    }
    key
}

/// Applies an answer key to letter-tagged questions.
///
/// Every option's `is_correct` is recomputed from the key, so merging the same
/// questions with another key fully replaces the earlier result. A question the
/// key does not mention ends up with no correct option; key entries without a
/// matching question or option are ignored. When a letter occurs twice in one
/// question only its first option is marked.
///
/// # Arguments
///
/// * `questions` - Output of the unmarked numbered grammar.
/// * `key` - The parsed answer key.
///
/// # Returns
///
/// The same questions with correctness rewritten.
pub fn merge_answers(mut questions: Vec<ParsedQuestion>, key: &AnswerKey) -> Vec<ParsedQuestion> {
    for question in questions.iter_mut() {
        let answer = key.get(question.order);
        let mut matched = false;
        for option in question.options.iter_mut() {
            option.is_correct = !matched && answer.is_some() && option.letter == answer;
            matched |= option.is_correct;
        }
        if let (Some(letter), false) = (answer, matched) {
            tracing::debug!(
                "Answer key: question {} has no option {}",
                question.order,
                letter
            );
        }
    }
    questions
}
