use crate::models::{ParsedOption, ParsedQuestion};

/// Separates question blocks.
pub const QUESTION_SEPARATOR: &str = "++++";
/// Separates the fields (question text, options) of one block.
pub const OPTION_SEPARATOR: &str = "====";
/// Prefix marking the correct option.
pub const CORRECT_SIGIL: char = '#';

/// Parses block-delimited questions (`hash_start` convention).
///
/// ```text
/// Question text?
/// ====
/// #Correct answer
/// ====
/// Wrong answer
/// ++++
/// ```
///
/// # Arguments
///
/// * `text` - Extracted document text.
///
/// # Returns
///
/// One question per non-empty block that keeps at least one option. A question's
/// order is the 1-based index of its block, counting discarded blocks too. Only
/// the first `#` option of a block is marked correct.
pub fn parse_blocks(text: &str) -> Vec<ParsedQuestion> {
    let mut questions = Vec::new();

    for (idx, block) in text.split(QUESTION_SEPARATOR).enumerate() {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }

        let fields: Vec<&str> = block
            .split(OPTION_SEPARATOR)
            .map(|field| field.trim())
            .filter(|field| !field.is_empty())
            .collect();
        let Some((question_text, option_fields)) = fields.split_first() else {
            continue;
        };

        let mut options: Vec<ParsedOption> = Vec::new();
        for field in option_fields {
            let marked = field.starts_with(CORRECT_SIGIL);
            let option_text = field.trim_start_matches(CORRECT_SIGIL).trim();
            if option_text.is_empty() {
                tracing::debug!("Block {}: dropped an option with no text", idx + 1);
                continue;
            }
            let is_correct = marked && options.iter().all(|option| !option.is_correct);
            if marked && !is_correct {
                tracing::warn!(
                    "Block {}: option {:?} is marked correct but an earlier option already is",
                    idx + 1,
                    option_text
                );
            }
            options.push(ParsedOption::new(option_text, is_correct, options.len()));
        }

        if options.is_empty() {
            tracing::debug!("Block {}: dropped, no options", idx + 1);
            continue;
        }

        questions.push(ParsedQuestion {
            order: idx as u32 + 1,
            text: question_text.to_string(),
            options,
        });
    }

    questions
}
