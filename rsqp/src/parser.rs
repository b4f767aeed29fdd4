use anyhow::Result;
use std::path::Path;

use crate::answers::{merge_answers, parse_answer_key};
use crate::cleaner::normalize_math;
use crate::config::ParserConfig;
use crate::converter::extract;
use crate::llm::{parse_with_model_or_fallback, OpenAiClient};
use crate::models::{
    AnswerMarking, BoundaryMode, ParseReport, ParseStrategy, ParsedQuestion, RawDocument,
};

pub mod blocks;
pub mod numbered;
pub mod scanner;

use blocks::parse_blocks;
use numbered::{parse_numbered, OptionMarking};

/// Applies the grammar selected by `marking` to extracted text.
///
/// * `hash_start` - block-delimited questions (`++++` / `====`, `#` sigil).
/// * `plus_end` - numbered questions, `+++` sigil.
/// * `separate_file` - numbered questions, unmarked and letter-tagged.
pub fn parse_text(text: &str, marking: AnswerMarking, mode: BoundaryMode) -> Vec<ParsedQuestion> {
    match marking {
        AnswerMarking::HashStart => parse_blocks(text),
        AnswerMarking::PlusEnd => parse_numbered(text, mode, OptionMarking::TrailingPlus),
        AnswerMarking::SeparateFile => parse_numbered(text, mode, OptionMarking::Unmarked),
    }
}

/// The regex pipeline: grammar selection, segmentation and answer-key merge.
///
/// # Arguments
///
/// * `question_text` - Extracted question document text.
/// * `marking` - The document's marking convention.
/// * `answer_text` - Extracted answer key text. When present and non-empty the
///   questions are parsed unmarked and merged with the key, whatever `marking` says.
/// * `mode` - Boundary strictness for the numbered grammars.
///
/// # Returns
///
/// The questions; an empty vector when nothing matched.
pub fn parse_with_regex(
    question_text: &str,
    marking: AnswerMarking,
    answer_text: Option<&str>,
    mode: BoundaryMode,
) -> Vec<ParsedQuestion> {
    match answer_text.filter(|text| !text.trim().is_empty()) {
        Some(answer_text) => {
            let questions = parse_text(question_text, AnswerMarking::SeparateFile, mode);
            let key = parse_answer_key(answer_text);
            merge_answers(questions, &key)
        }
        None => parse_text(question_text, marking, mode),
    }
}

/// Parses a quiz document into questions.
///
/// # Arguments
///
/// * `question_doc` - The question document.
/// * `answer_doc` - The answer key document; only read for `separate_file`.
/// * `config` - Parser configuration.
/// * `verbose` - Log every pipeline step.
///
/// # Returns
///
/// A [`ParseReport`]. A document in which nothing matched gives an empty
/// report, not an error.
///
/// # Errors
///
/// Extraction errors (unsupported format, unreadable file, every PDF backend
/// failing). Model failures never surface; they fall back to the regex grammars.
pub async fn parse(
    question_doc: &RawDocument,
    answer_doc: Option<&RawDocument>,
    config: &ParserConfig,
    verbose: bool,
) -> Result<ParseReport> {
    let time = std::time::Instant::now();
    if verbose {
        tracing::info!(
            "Parsing {} ({}, {})",
            question_doc.name,
            question_doc.format,
            config.answer_marking
        );
    }

    let mut question_text = extract(question_doc, config)?;
    if verbose {
        tracing::info!(
            "Extracted {} chars in {:.2}s",
            question_text.len(),
            time.elapsed().as_secs_f64()
        );
    }

    let answer_text = match (config.answer_marking, answer_doc) {
        (AnswerMarking::SeparateFile, Some(doc)) => {
            let text = extract(doc, config)?;
            if verbose {
                tracing::info!("Extracted answer key {} ({} chars)", doc.name, text.len());
            }
            Some(text)
        }
        (AnswerMarking::SeparateFile, None) => {
            tracing::warn!(
                "No answer document for {}, questions will have no correct option",
                question_doc.name
            );
            None
        }
        (marking, Some(doc)) => {
            tracing::warn!("Ignoring answer document {} for convention {}", doc.name, marking);
            None
        }
        (_, None) => None,
    };

    if config.normalize_math {
        question_text = normalize_math(&question_text);
        if verbose {
            tracing::info!("Normalized math notation in {:.2}s", time.elapsed().as_secs_f64());
        }
    }

    let (questions, strategy) = if config.use_llm {
        match OpenAiClient::from_config(config) {
            Ok(client) => {
                parse_with_model_or_fallback(&client, &question_text, answer_text.as_deref(), config)
                    .await
            }
            Err(e) => {
                tracing::warn!("{}, falling back to regex grammars", e);
                let questions = parse_with_regex(
                    &question_text,
                    config.answer_marking,
                    answer_text.as_deref(),
                    config.boundary_mode,
                );
                (questions, ParseStrategy::ModelFallback)
            }
        }
    } else {
        let questions = parse_with_regex(
            &question_text,
            config.answer_marking,
            answer_text.as_deref(),
            config.boundary_mode,
        );
        (questions, ParseStrategy::Regex)
    };

    let report = ParseReport::new(&question_doc.name, config.answer_marking, strategy, questions);
    if verbose {
        tracing::info!(
            "Finished Parsing in {:.2}s: {} questions, {} with a correct option ({})",
            time.elapsed().as_secs_f64(),
            report.questions.len(),
            report.correct_count(),
            report.strategy
        );
    }
    if !report.is_success() {
        tracing::warn!("No questions found in {}", question_doc.name);
    }

    return Ok(report);
}

/// Reads the documents from disk and calls [`parse`].
pub async fn parse_path(
    question_path: impl AsRef<Path>,
    answer_path: Option<&Path>,
    config: &ParserConfig,
    verbose: bool,
) -> Result<ParseReport> {
    let question_doc = RawDocument::from_path(question_path)?;
    let answer_doc = match answer_path {
        Some(path) => Some(RawDocument::from_path(path)?),
        None => None,
    };
    parse(&question_doc, answer_doc.as_ref(), config, verbose).await
}
