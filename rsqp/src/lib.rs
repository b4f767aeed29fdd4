//! # RuSt Quiz Parser (rsqp)
//!
//! The `rsqp` library turns quiz documents (PDF, DOCX) into structured
//! questions with ordered options and at most one correct option each.
//!
//! Three marking conventions are supported:
//!
//! - `hash_start`: questions separated by `++++`, options by `====`, the correct option starts with `#`.
//! - `plus_end`: numbered questions (`1.`/`1)`), lettered options (`A)`/`A.`), the correct option contains `+++`.
//! - `separate_file`: numbered questions without markers, answers read from a second document (`1. B`).
//!
//! ## Quick Start
//!
//! ### Pre-requirements
//! - Poppler (optional, preferred PDF backend): `sudo apt install poppler-utils`
//! - `OPENAI_API_KEY` (optional) for the model-backed parser
//!
//! ### Installation
//! To start using the `rsqp` library, add it to your project's dependencies in the `Cargo.toml` file:
//!
//! ```bash
//! cargo add rsqp
//! ```
//!
//! ## Examples
//!
//! ```rust
//! # use rsqp::models::{AnswerMarking, BoundaryMode};
//! # use rsqp::parser::parse_with_regex;
//! let text = "1. What is 2+2?\nA) 3\nB) 4+++\nC) 5\n";
//! let questions = parse_with_regex(text, AnswerMarking::PlusEnd, None, BoundaryMode::LineAnchored);
//! assert_eq!(questions[0].correct_option().unwrap().text, "4");
//! ```
//!
//! Parsing a document from disk:
//!
//! ```rust,no_run
//! # use rsqp::config::ParserConfig;
//! # use rsqp::models::AnswerMarking;
//! # use rsqp::parser::parse_path;
//! # async fn try_main() -> anyhow::Result<()> {
//! let config = ParserConfig::new().with_answer_marking(AnswerMarking::PlusEnd);
//! let report = parse_path("quiz.pdf", None, &config, true).await?;
//! println!("{}", serde_json::to_string_pretty(&report)?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Tests
//!
//! No network access or poppler install is needed to run the tests:
//!
//! ```sh
//! cargo test
//! ```

pub mod answers;
pub mod cleaner;
pub mod config;
pub mod converter;
pub mod error;
pub mod llm;
pub mod models;
pub mod parser;
pub mod test_utils;
