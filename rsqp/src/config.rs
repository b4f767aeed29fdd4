use rand::Rng;
use std::path::PathBuf;
use std::time::Duration;

use crate::models::{AnswerMarking, BoundaryMode};

/// Default model to use when OPENAI_API_MODEL is not set
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default endpoint root when OPENAI_API_BASE is not set
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default timeout for one completion request
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// `ParserConfig` is the configuration for one parse invocation.
///
/// # Fields
///
/// * `answer_marking` - The convention deciding which grammar runs.
/// * `boundary_mode` - Marker strictness for the numbered grammars.
/// * `normalize_math` - Rewrite equation-script markup into LaTeX before segmenting.
/// * `math_aware_docx` - Recover text (or a placeholder) from DOCX equation regions.
/// * `use_llm` - Try the model-backed parser before the regex grammars.
/// * `model_id` - Chat model used when `use_llm` is set.
/// * `api_base` - Root URL of the chat completions API.
/// * `llm_timeout` - Upper bound for one completion request.
/// * `temp_dir` - Where the poppler backend writes its temporary PDF copies.
///
/// # Methods
///
/// * `new` - Creates a configuration with defaults and model settings from the environment.
/// * `temp_pdf_path` - Returns a fresh random path for a temporary PDF copy.
#[derive(Debug, Clone, PartialEq)]
pub struct ParserConfig {
    pub answer_marking: AnswerMarking,
    pub boundary_mode: BoundaryMode,
    pub normalize_math: bool,
    pub math_aware_docx: bool,
    pub use_llm: bool,
    pub model_id: String,
    pub api_base: String,
    pub llm_timeout: Duration,
    pub temp_dir: PathBuf,
}

impl ParserConfig {
    /// Creates a new `ParserConfig` instance with default values.
    ///
    /// `model_id` and `api_base` are read from `OPENAI_API_MODEL` and
    /// `OPENAI_API_BASE`, falling back to [`DEFAULT_MODEL`] and [`DEFAULT_API_BASE`].
    pub fn new() -> ParserConfig {
        ParserConfig {
            answer_marking: AnswerMarking::default(),
            boundary_mode: BoundaryMode::default(),
            normalize_math: true,
            math_aware_docx: true,
            use_llm: false,
            model_id: get_model_id(),
            api_base: get_api_base(),
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            temp_dir: std::env::temp_dir(),
        }
    }

    pub fn with_answer_marking(mut self, answer_marking: AnswerMarking) -> ParserConfig {
        self.answer_marking = answer_marking;
        self
    }

    pub fn with_boundary_mode(mut self, boundary_mode: BoundaryMode) -> ParserConfig {
        self.boundary_mode = boundary_mode;
        self
    }

    pub fn with_llm(mut self, use_llm: bool) -> ParserConfig {
        self.use_llm = use_llm;
        self
    }

    pub fn with_normalize_math(mut self, normalize_math: bool) -> ParserConfig {
        self.normalize_math = normalize_math;
        self
    }

    /// Returns a random, not yet existing path for a temporary PDF copy,
    /// e.g. `/tmp/rsqp_48213.pdf`.
    pub fn temp_pdf_path(&self) -> PathBuf {
        let mut rng = rand::rng();
        loop {
            let random_value = rng.random_range(10000..99999);
            let path = self.temp_dir.join(format!("rsqp_{}.pdf", random_value));
            if !path.exists() {
                return path;
            }
        }
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig::new()
    }
}

/// Check if LLM processing is available (OPENAI_API_KEY is set)
pub fn is_llm_available() -> bool {
    std::env::var("OPENAI_API_KEY").map(|key| !key.trim().is_empty()).unwrap_or(false)
}

/// Get the model ID to use for LLM calls.
/// Returns the value of OPENAI_API_MODEL environment variable, or DEFAULT_MODEL if not set.
pub fn get_model_id() -> String {
    model_id_or_default(std::env::var("OPENAI_API_MODEL").ok())
}

/// Get the API root for LLM calls, without a trailing slash.
pub fn get_api_base() -> String {
    api_base_or_default(std::env::var("OPENAI_API_BASE").ok())
}

fn model_id_or_default(value: Option<String>) -> String {
    value
        .filter(|model| !model.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_MODEL.to_string())
}

fn api_base_or_default(value: Option<String>) -> String {
    value
        .map(|base| base.trim().trim_end_matches('/').to_string())
        .filter(|base| !base.is_empty())
        .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
}
