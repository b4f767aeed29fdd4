use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use strum::{Display, EnumString};

use crate::error::ExtractError;

/// How the correct option is encoded in a quiz document.
///
/// # Variants
///
/// * `HashStart` - Block-delimited questions, the correct option starts with `#`.
/// * `PlusEnd` - Numbered questions, the correct option contains `+++`.
/// * `SeparateFile` - Numbered questions without markers; answers come from a second document.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnswerMarking {
    #[default]
    HashStart,
    PlusEnd,
    SeparateFile,
}

impl AnswerMarking {
    /// Human readable description of the marker, embedded in model prompts.
    pub fn marker_description(&self) -> &'static str {
        match self {
            AnswerMarking::HashStart => {
                "Questions are separated by ++++ and options by ====. \
                 Correct answers are marked with # at the start of the option."
            }
            AnswerMarking::PlusEnd => {
                "Questions are numbered (1. or 1)) and options are lettered (A) or A.). \
                 Correct answers are marked with +++ or ++++ at the end of the option."
            }
            AnswerMarking::SeparateFile => {
                "Questions are numbered and options are lettered. \
                 The text carries no correctness markers."
            }
        }
    }
}

/// Where question and option markers may appear for the numbered grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BoundaryMode {
    /// Markers must start a line (indentation allowed).
    #[default]
    LineAnchored,
    /// Markers are recognized anywhere in the text. Tolerates broken line
    /// wrapping but splits questions whose body contains `3.` or `B)`.
    Permissive,
}

/// Which strategy produced the questions of a [`ParseReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ParseStrategy {
    Regex,
    Model,
    ModelFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DocumentFormat {
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Maps a file extension (with or without the leading dot) to a format.
    /// `.doc` is routed to the DOCX reader, which rejects legacy binary files.
    pub fn from_extension(extension: &str) -> Option<DocumentFormat> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "pdf" => Some(DocumentFormat::Pdf),
            "docx" | "doc" => Some(DocumentFormat::Docx),
            _ => None,
        }
    }
}

/// A source document as handed over by the caller.
///
/// # Fields
///
/// * `name` - Display name used in logs and reports (usually the file path).
/// * `format` - The declared format.
/// * `bytes` - Raw file contents.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub name: String,
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

impl RawDocument {
    /// Reads a document from disk, deriving its format from the extension.
    ///
    /// # Errors
    ///
    /// Returns `ExtractError::UnsupportedFormat` for unknown extensions (before
    /// touching the file) and `ExtractError::Io` if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<RawDocument, ExtractError> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or_default();
        let format = DocumentFormat::from_extension(extension)
            .ok_or_else(|| ExtractError::UnsupportedFormat(path.display().to_string()))?;
        let bytes = std::fs::read(path)?;
        Ok(RawDocument {
            name: path.display().to_string(),
            format,
            bytes,
        })
    }

    pub fn from_bytes(name: impl Into<String>, format: DocumentFormat, bytes: Vec<u8>) -> Self {
        RawDocument {
            name: name.into(),
            format,
            bytes,
        }
    }
}

/// One answer option of a question.
///
/// # Fields
///
/// * `text` - Option text with correctness sigils removed.
/// * `is_correct` - Whether this option is the designated answer.
/// * `order` - 0-based position within the question.
/// * `letter` - Option letter as printed in the source. Only set by the unmarked
///   numbered grammar, where it is the join key against an answer key. Never serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedOption {
    pub text: String,
    pub is_correct: bool,
    pub order: usize,
    #[serde(skip)]
    pub letter: Option<char>,
}

impl ParsedOption {
    pub fn new(text: impl Into<String>, is_correct: bool, order: usize) -> ParsedOption {
        ParsedOption {
            text: text.into(),
            is_correct,
            order,
            letter: None,
        }
    }

    pub fn with_letter(mut self, letter: char) -> ParsedOption {
        self.letter = Some(letter);
        self
    }
}

/// A question with its ordered options.
///
/// # Fields
///
/// * `order` - 1-based order, either the printed question number or the block index.
/// * `text` - Question text, never empty.
/// * `options` - Options in source order, never empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedQuestion {
    pub order: u32,
    pub text: String,
    pub options: Vec<ParsedOption>,
}

impl ParsedQuestion {
    pub fn correct_option(&self) -> Option<&ParsedOption> {
        self.options.iter().find(|option| option.is_correct)
    }

    pub fn correct_count(&self) -> usize {
        self.options.iter().filter(|option| option.is_correct).count()
    }
}

/// Sparse mapping from question number to the letter of its correct option.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnswerKey(BTreeMap<u32, char>);

impl AnswerKey {
    pub fn new() -> AnswerKey {
        AnswerKey(BTreeMap::new())
    }

    /// Inserts an entry; an existing entry for the same question is replaced.
    pub fn insert(&mut self, question: u32, letter: char) {
        self.0.insert(question, letter);
    }

    pub fn get(&self, question: u32) -> Option<char> {
        self.0.get(&question).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, char)> + '_ {
        self.0.iter().map(|(question, letter)| (*question, *letter))
    }
}

impl FromIterator<(u32, char)> for AnswerKey {
    fn from_iter<T: IntoIterator<Item = (u32, char)>>(iter: T) -> Self {
        AnswerKey(iter.into_iter().collect())
    }
}

/// Result of one parse invocation, ready for a persistence layer.
///
/// # Fields
///
/// * `source` - Name of the question document.
/// * `convention` - The marking convention the document was parsed with.
/// * `strategy` - Which strategy produced `questions`.
/// * `parsed_at` - RFC 3339 timestamp.
/// * `questions` - The normalized questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParseReport {
    pub source: String,
    pub convention: AnswerMarking,
    pub strategy: ParseStrategy,
    pub parsed_at: String,
    pub questions: Vec<ParsedQuestion>,
}

impl ParseReport {
    pub fn new(
        source: impl Into<String>,
        convention: AnswerMarking,
        strategy: ParseStrategy,
        questions: Vec<ParsedQuestion>,
    ) -> ParseReport {
        ParseReport {
            source: source.into(),
            convention,
            strategy,
            parsed_at: chrono::Utc::now().to_rfc3339(),
            questions,
        }
    }

    /// A parse succeeds when it found at least one question.
    pub fn is_success(&self) -> bool {
        !self.questions.is_empty()
    }

    /// Number of questions with a designated correct option.
    pub fn correct_count(&self) -> usize {
        self.questions.iter().filter(|q| q.correct_option().is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_answer_marking_tags() {
        assert_eq!(AnswerMarking::from_str("hash_start").unwrap(), AnswerMarking::HashStart);
        assert_eq!(AnswerMarking::from_str("plus_end").unwrap(), AnswerMarking::PlusEnd);
        assert_eq!(
            AnswerMarking::from_str("separate_file").unwrap(),
            AnswerMarking::SeparateFile
        );
        assert!(AnswerMarking::from_str("star_middle").is_err());
        assert_eq!(AnswerMarking::SeparateFile.to_string(), "separate_file");
        assert_eq!(
            serde_json::to_string(&AnswerMarking::PlusEnd).unwrap(),
            "\"plus_end\""
        );
    }

    #[test]
    fn test_document_format_from_extension() {
        assert_eq!(DocumentFormat::from_extension("pdf"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension(".PDF"), Some(DocumentFormat::Pdf));
        assert_eq!(DocumentFormat::from_extension("docx"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension(".doc"), Some(DocumentFormat::Docx));
        assert_eq!(DocumentFormat::from_extension("txt"), None);
        assert_eq!(DocumentFormat::from_extension(""), None);
    }

    #[test]
    fn test_raw_document_rejects_unknown_extension() {
        let err = RawDocument::from_path("/nonexistent/quiz.odt").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_option_letter_is_not_serialized() {
        let option = ParsedOption::new("Paris", true, 0).with_letter('B');
        let json = serde_json::to_value(&option).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"text": "Paris", "is_correct": true, "order": 0})
        );
    }

    #[test]
    fn test_answer_key_last_insert_wins() {
        let mut key = AnswerKey::new();
        key.insert(3, 'A');
        key.insert(3, 'C');
        assert_eq!(key.get(3), Some('C'));
        assert_eq!(key.len(), 1);
        assert_eq!(key.get(4), None);
    }

    #[test]
    fn test_report_success_and_counts() {
        let questions = vec![
            ParsedQuestion {
                order: 1,
                text: "Q".to_string(),
                options: vec![ParsedOption::new("a", true, 0), ParsedOption::new("b", false, 1)],
            },
            ParsedQuestion {
                order: 2,
                text: "R".to_string(),
                options: vec![ParsedOption::new("c", false, 0)],
            },
        ];
        let report =
            ParseReport::new("quiz.pdf", AnswerMarking::PlusEnd, ParseStrategy::Regex, questions);
        assert!(report.is_success());
        assert_eq!(report.correct_count(), 1);

        let empty =
            ParseReport::new("quiz.pdf", AnswerMarking::PlusEnd, ParseStrategy::Regex, Vec::new());
        assert!(!empty.is_success());
    }
}
