use openai_tools::chat::request::ChatCompletion;
use openai_tools::common::errors::OpenAIToolError;
use openai_tools::common::message::Message;
use openai_tools::common::models::ChatModel;
use openai_tools::common::role::Role;
use openai_tools::common::structured_output::Schema;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::time::Duration;

use crate::config::ParserConfig;
use crate::error::ModelError;
use crate::models::{AnswerMarking, ParseStrategy, ParsedOption, ParsedQuestion};
use crate::parser::parse_with_regex;

/// Sampling temperature for question extraction
pub const TEMPERATURE: f32 = 0.1;

const SYSTEM_PROMPT: &str =
    "You are a precise question parser. Extract questions exactly as they appear, ensuring completeness.";

const OUTPUT_RULES: &str = r#"FORMULAS:
- Copy mathematical expressions exactly as written, including LaTeX such as \frac{a}{b}, \sqrt{x} or \begin{pmatrix} 1 & 2 \end{pmatrix}.
- Do not evaluate, simplify or re-typeset formulas.
- Keep [formula] placeholders unchanged.

OUTPUT:
Return one JSON object and nothing else, in this EXACT format:
{
  "questions": [
    {
      "order": 1,
      "text": "Complete question text?",
      "options": [
        {"text": "Option A", "is_correct": false, "order": 0},
        {"text": "Option B", "is_correct": true, "order": 1},
        {"text": "Option C", "is_correct": false, "order": 2}
      ]
    }
  ]
}
Mark at most one option per question as correct."#;

/// Name of the structured-output schema sent with every request
pub const RESPONSE_SCHEMA_NAME: &str = "quiz_questions";

fn answer_key_prompt(questions: &str, answers: &str) -> String {
    format!(
        r#"Extract ALL questions and their options from the question text below, then mark the correct options using the answer key.

QUESTION TEXT:
{questions}

ANSWER KEY (format like: 1. B, 2. C, 3. D):
{answers}

INSTRUCTIONS:
1. Extract EVERY question, do not skip any.
2. Extract ALL options of each question (A, B, C, D, ...) in order.
3. The question number in the answer key is the question order; the letter names the correct option.
4. Keep question text complete.
5. Remove option letters (A), B. ...) from the option text."#
    )
}

fn marker_prompt(questions: &str, marking: &str) -> String {
    format!(
        r#"Extract ALL questions and their options from the text below.

TEXT:
{questions}

ANSWER MARKING: {marking}

INSTRUCTIONS:
1. Extract EVERY question, do not skip any.
2. Extract ALL options of each question in order.
3. Identify the correct option by its marker.
4. Keep question text complete.
5. Remove the markers (# or +++) and option letters from the option text."#
    )
}

/// One extraction request, independent of the transport.
///
/// # Fields
///
/// * `model` - Model identifier.
/// * `system` - The parser persona message.
/// * `prompt` - The extraction prompt built by [`build_prompt`].
/// * `temperature` - Always [`TEMPERATURE`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub system: String,
    pub prompt: String,
    pub temperature: f32,
}

impl ChatRequest {
    pub fn new(model: &str, prompt: String) -> Self {
        Self {
            model: model.to_string(),
            system: SYSTEM_PROMPT.to_string(),
            prompt,
            temperature: TEMPERATURE,
        }
    }

    /// The system message followed by the extraction prompt.
    pub fn messages(&self) -> Vec<Message> {
        vec![
            Message::from_string(Role::System, &self.system),
            Message::from_string(Role::User, &self.prompt),
        ]
    }
}

/// Structured-output schema of `{"questions": [{order, text, options: [{text, is_correct, order}]}]}`.
pub fn response_schema() -> Result<Schema, ModelError> {
    let option = json!({
        "type": "object",
        "properties": {
            "text": {"type": "string"},
            "is_correct": {"type": "boolean"},
            "order": {"type": "integer"}
        },
        "required": ["text", "is_correct", "order"],
        "additionalProperties": false
    });
    let question = json!({
        "type": "object",
        "properties": {
            "order": {"type": "integer"},
            "text": {"type": "string"},
            "options": {"type": "array", "items": option}
        },
        "required": ["order", "text", "options"],
        "additionalProperties": false
    });
    let schema = json!({
        "name": RESPONSE_SCHEMA_NAME,
        "schema": {
            "type": "object",
            "properties": {
                "questions": {"type": "array", "items": question}
            },
            "required": ["questions"],
            "additionalProperties": false
        }
    });
    serde_json::from_value(schema).map_err(|e| ModelError::Schema(e.to_string()))
}

/// Anything able to answer a chat completion request with the raw message content.
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError>;
}

/// Chat completions through `openai-tools` (OpenAI-compatible endpoints).
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    api_key: String,
    api_base: String,
    timeout: Duration,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, api_base: impl Into<String>, timeout: Duration) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: api_base.into(),
            timeout,
        }
    }

    /// Builds a client from `OPENAI_API_KEY` and the endpoint settings of `config`.
    pub fn from_config(config: &ParserConfig) -> Result<Self, ModelError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or(ModelError::MissingApiKey)?;
        Ok(Self::new(api_key, config.api_base.clone(), config.llm_timeout))
    }

    fn map_error(&self, e: OpenAIToolError) -> ModelError {
        match e {
            OpenAIToolError::RequestError(e) if e.is_timeout() => ModelError::Timeout(self.timeout),
            OpenAIToolError::RequestError(e) => e.into(),
            e => ModelError::Transport(e.to_string()),
        }
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let mut chat = ChatCompletion::with_url(self.api_base.clone(), self.api_key.clone());
        chat.model(ChatModel::from(request.model.as_str()))
            .messages(request.messages())
            .temperature(request.temperature)
            .json_schema(response_schema()?)
            .timeout(self.timeout);

        let response = match tokio::time::timeout(self.timeout, chat.chat()).await {
            Ok(result) => result.map_err(|e| self.map_error(e))?,
            Err(_) => return Err(ModelError::Timeout(self.timeout)),
        };
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .and_then(|content| content.text)
            .ok_or(ModelError::Empty)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelResponse {
    questions: Vec<ModelQuestion>,
}

#[derive(Debug, Deserialize)]
struct ModelQuestion {
    order: u32,
    text: String,
    options: Vec<ModelOption>,
}

// `order` is required by the schema; options are renumbered after filtering.
#[derive(Debug, Deserialize)]
struct ModelOption {
    text: String,
    is_correct: bool,
    #[serde(rename = "order")]
    _order: usize,
}

/// Builds the extraction prompt.
///
/// With a non-empty `answer_text` the prompt embeds the answer key and asks the
/// model to apply it; otherwise it describes the convention's markers. Document
/// text is inserted as is and never scanned for placeholders.
pub fn build_prompt(question_text: &str, marking: AnswerMarking, answer_text: Option<&str>) -> String {
    let body = match answer_text {
        Some(answers) => answer_key_prompt(question_text, answers),
        None => marker_prompt(question_text, marking.marker_description()),
    };
    format!("{}\n\n{}", body, OUTPUT_RULES)
}

/// Validates a model response against the question schema.
///
/// # Arguments
///
/// * `content` - The raw message content returned by the model.
///
/// # Returns
///
/// The questions, with option orders renumbered from 0. Questions without text,
/// without non-empty options, or repeating an earlier order are dropped.
///
/// # Errors
///
/// * `ModelError::InvalidJson` - The content is not JSON.
/// * `ModelError::Schema` - Any shape other than `{"questions": [...]}`, a
///   question numbered 0, or a question with more than one correct option.
/// * `ModelError::Empty` - No question survived.
pub fn validate_response(content: &str) -> Result<Vec<ParsedQuestion>, ModelError> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    if !value.is_object() {
        return Err(ModelError::Schema("expected a JSON object".to_string()));
    }
    let response: ModelResponse =
        serde_json::from_value(value).map_err(|e| ModelError::Schema(e.to_string()))?;

    let mut questions = Vec::new();
    let mut seen: HashSet<u32> = HashSet::new();
    for question in response.questions {
        if question.order == 0 {
            return Err(ModelError::Schema("question order must start at 1".to_string()));
        }
        let text = question.text.trim();
        if text.is_empty() {
            tracing::debug!("Model question {}: dropped, no text", question.order);
            continue;
        }

        let options: Vec<ParsedOption> = question
            .options
            .iter()
            .map(|option| (option.text.trim(), option.is_correct))
            .filter(|(text, _)| !text.is_empty())
            .enumerate()
            .map(|(idx, (text, is_correct))| ParsedOption::new(text, is_correct, idx))
            .collect();
        if options.is_empty() {
            tracing::debug!("Model question {}: dropped, no options", question.order);
            continue;
        }

        let correct = options.iter().filter(|option| option.is_correct).count();
        if correct > 1 {
            return Err(ModelError::Schema(format!(
                "question {} has {} correct options",
                question.order, correct
            )));
        }
        if !seen.insert(question.order) {
            tracing::warn!("Model question {}: dropped, order already used", question.order);
            continue;
        }

        questions.push(ParsedQuestion {
            order: question.order,
            text: text.to_string(),
            options,
        });
    }

    if questions.is_empty() {
        return Err(ModelError::Empty);
    }
    Ok(questions)
}

/// Segments a quiz with the model.
///
/// # Arguments
///
/// * `client` - Completion backend.
/// * `question_text` - Extracted question document text.
/// * `marking` - The document's marking convention.
/// * `answer_text` - Extracted answer key text, if any.
/// * `model_id` - Model identifier sent with the request.
pub async fn parse_with_model<C: CompletionClient>(
    client: &C,
    question_text: &str,
    marking: AnswerMarking,
    answer_text: Option<&str>,
    model_id: &str,
) -> Result<Vec<ParsedQuestion>, ModelError> {
    let answer_text = answer_text.filter(|text| !text.trim().is_empty());
    let request = ChatRequest::new(model_id, build_prompt(question_text, marking, answer_text));
    let content = client.complete(&request).await?;
    validate_response(&content)
}

/// Segments a quiz with the model, falling back to the regex grammars on any
/// model failure.
///
/// # Returns
///
/// The questions and the strategy that produced them (`Model` or `ModelFallback`).
pub async fn parse_with_model_or_fallback<C: CompletionClient>(
    client: &C,
    question_text: &str,
    answer_text: Option<&str>,
    config: &ParserConfig,
) -> (Vec<ParsedQuestion>, ParseStrategy) {
    match parse_with_model(
        client,
        question_text,
        config.answer_marking,
        answer_text,
        &config.model_id,
    )
    .await
    {
        Ok(questions) => (questions, ParseStrategy::Model),
        Err(e) => {
            tracing::warn!("Model parse failed, falling back to regex grammars: {}", e);
            let questions = parse_with_regex(
                question_text,
                config.answer_marking,
                answer_text,
                config.boundary_mode,
            );
            (questions, ParseStrategy::ModelFallback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BoundaryMode;
    use crate::test_utils::{
        ScriptedCompletion, HASH_START_QUIZ, PLUS_END_QUIZ, SEPARATE_FILE_ANSWERS,
        SEPARATE_FILE_QUIZ,
    };

    const VALID_RESPONSE: &str = r#"{"questions": [
        {"order": 1, "text": "What is 2+2?", "options": [
            {"text": "3", "is_correct": false, "order": 0},
            {"text": "4", "is_correct": true, "order": 1}
        ]}
    ]}"#;

    fn config(marking: AnswerMarking) -> ParserConfig {
        ParserConfig::new().with_answer_marking(marking).with_llm(true)
    }

    async fn assert_falls_back(client: ScriptedCompletion, marking: AnswerMarking, text: &str) {
        let config = config(marking);
        let (questions, strategy) =
            parse_with_model_or_fallback(&client, text, None, &config).await;
        assert_eq!(strategy, ParseStrategy::ModelFallback);
        assert_eq!(
            questions,
            parse_with_regex(text, marking, None, BoundaryMode::LineAnchored)
        );
        assert!(!questions.is_empty());
    }

    #[test_log::test(tokio::test)]
    async fn test_model_result_is_used() {
        let client = ScriptedCompletion::replying(VALID_RESPONSE);
        let config = config(AnswerMarking::PlusEnd);
        let (questions, strategy) =
            parse_with_model_or_fallback(&client, PLUS_END_QUIZ, None, &config).await;
        assert_eq!(strategy, ParseStrategy::Model);
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].correct_option().unwrap().text, "4");
    }

    #[test_log::test(tokio::test)]
    async fn test_request_shape() {
        let client = ScriptedCompletion::replying(VALID_RESPONSE);
        parse_with_model(&client, PLUS_END_QUIZ, AnswerMarking::PlusEnd, None, "gpt-4o-mini")
            .await
            .unwrap();
        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        let request = &requests[0];
        assert_eq!(request.model, "gpt-4o-mini");
        assert_eq!(request.temperature, TEMPERATURE);
        assert!(request.prompt.contains("Select the noble gas."));
        assert!(request.prompt.contains("+++"));
        assert!(request.prompt.contains("\"questions\""));

        let messages = request.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role.to_string(), "system");
        assert_eq!(messages[1].role.to_string(), "user");
        let user_text = messages[1].content.as_ref().and_then(|c| c.text.as_deref());
        assert_eq!(user_text, Some(request.prompt.as_str()));
    }

    #[test]
    fn test_response_schema() {
        let json = serde_json::to_value(response_schema().unwrap()).unwrap();
        assert_eq!(json["name"], RESPONSE_SCHEMA_NAME);
        let questions = &json["schema"]["properties"]["questions"];
        assert_eq!(questions["type"], "array");
        assert_eq!(questions["items"]["required"], json!(["order", "text", "options"]));
        let options = &questions["items"]["properties"]["options"];
        assert_eq!(options["type"], "array");
        assert_eq!(options["items"]["required"], json!(["text", "is_correct", "order"]));
        assert_eq!(options["items"]["additionalProperties"], false);
    }

    #[test]
    fn test_prompt_keeps_placeholder_text_literal() {
        let questions = "1. Which {answers} tag?\nA) x+++\nB) y";
        let answers = "1. A {questions}";
        let prompt = build_prompt(questions, AnswerMarking::SeparateFile, Some(answers));
        assert_eq!(prompt.matches("Which {answers} tag?").count(), 1);
        assert_eq!(prompt.matches("1. A {questions}").count(), 1);
        assert_eq!(prompt.matches("Which").count(), 1);

        let prompt = build_prompt("1. {marking} or {questions}?\nA) a", AnswerMarking::PlusEnd, None);
        assert!(prompt.contains("1. {marking} or {questions}?"));
        assert_eq!(prompt.matches("ANSWER MARKING: ").count(), 1);
    }

    #[test_log::test(tokio::test)]
    async fn test_answer_key_prompt() {
        let client = ScriptedCompletion::replying(VALID_RESPONSE);
        parse_with_model(
            &client,
            SEPARATE_FILE_QUIZ,
            AnswerMarking::SeparateFile,
            Some(SEPARATE_FILE_ANSWERS),
            "gpt-4o-mini",
        )
        .await
        .unwrap();
        let prompt = &client.requests()[0].prompt;
        assert!(prompt.contains("ANSWER KEY"));
        assert!(prompt.contains("3.B"));
        assert!(prompt.contains("Largest planet?"));
    }

    #[test_log::test(tokio::test)]
    async fn test_fallback_on_transport_error() {
        let client = ScriptedCompletion::failing(ModelError::Transport("refused".to_string()));
        assert_falls_back(client, AnswerMarking::PlusEnd, PLUS_END_QUIZ).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_fallback_on_timeout() {
        let client = ScriptedCompletion::failing(ModelError::Timeout(Duration::from_secs(1)));
        assert_falls_back(client, AnswerMarking::HashStart, HASH_START_QUIZ).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_fallback_on_invalid_json() {
        let client = ScriptedCompletion::replying("Sure! Here are your questions:");
        assert_falls_back(client, AnswerMarking::PlusEnd, PLUS_END_QUIZ).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_fallback_on_bare_array() {
        let client = ScriptedCompletion::replying(
            r#"[{"order": 1, "text": "Q", "options": [{"text": "a", "is_correct": true, "order": 0}]}]"#,
        );
        assert_falls_back(client, AnswerMarking::HashStart, HASH_START_QUIZ).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_fallback_on_unrecognized_schema() {
        let client = ScriptedCompletion::replying(r#"{"items": [], "questions": []}"#);
        assert_falls_back(client, AnswerMarking::PlusEnd, PLUS_END_QUIZ).await;
    }

    #[test_log::test(tokio::test)]
    async fn test_fallback_with_answer_key_uses_merge() {
        let client = ScriptedCompletion::failing(ModelError::MissingApiKey);
        let config = config(AnswerMarking::SeparateFile);
        let (questions, strategy) = parse_with_model_or_fallback(
            &client,
            SEPARATE_FILE_QUIZ,
            Some(SEPARATE_FILE_ANSWERS),
            &config,
        )
        .await;
        assert_eq!(strategy, ParseStrategy::ModelFallback);
        assert_eq!(questions.len(), 3);
        assert!(questions.iter().all(|q| q.correct_count() == 1));
    }

    #[test]
    fn test_validate_rejects_multiple_correct() {
        let content = r#"{"questions": [{"order": 1, "text": "Q", "options": [
            {"text": "a", "is_correct": true, "order": 0},
            {"text": "b", "is_correct": true, "order": 1}
        ]}]}"#;
        assert!(matches!(validate_response(content), Err(ModelError::Schema(_))));
    }

    #[test]
    fn test_validate_drops_empty_entries() {
        let content = r#"{"questions": [
            {"order": 1, "text": "  ", "options": [{"text": "a", "is_correct": false, "order": 0}]},
            {"order": 2, "text": "No options", "options": [{"text": " ", "is_correct": true, "order": 0}]},
            {"order": 3, "text": "Kept", "options": [
                {"text": "", "is_correct": false, "order": 0},
                {"text": "x", "is_correct": true, "order": 1}
            ]}
        ]}"#;
        let questions = validate_response(content).unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].order, 3);
        assert_eq!(questions[0].options, vec![ParsedOption::new("x", true, 0)]);
    }

    #[test]
    fn test_validate_rejects_zero_order() {
        let content = r#"{"questions": [
            {"order": 0, "text": "Q", "options": [{"text": "a", "is_correct": true, "order": 0}]},
            {"order": 1, "text": "R", "options": [{"text": "b", "is_correct": true, "order": 0}]}
        ]}"#;
        assert!(matches!(validate_response(content), Err(ModelError::Schema(_))));
    }

    #[test_log::test(tokio::test)]
    async fn test_fallback_on_zero_order() {
        let client = ScriptedCompletion::replying(
            r#"{"questions": [{"order": 0, "text": "Q", "options": [{"text": "a", "is_correct": true, "order": 0}]}]}"#,
        );
        assert_falls_back(client, AnswerMarking::PlusEnd, PLUS_END_QUIZ).await;
    }

    #[test]
    fn test_validate_error_kinds() {
        assert!(matches!(validate_response("not json"), Err(ModelError::InvalidJson(_))));
        assert!(matches!(validate_response("[]"), Err(ModelError::Schema(_))));
        assert!(matches!(
            validate_response(r#"{"questions": [{"text": "Q"}]}"#),
            Err(ModelError::Schema(_))
        ));
        assert!(matches!(validate_response(r#"{"questions": []}"#), Err(ModelError::Empty)));
    }

    #[test_log::test(tokio::test)]
    async fn test_openai_client_unreachable_endpoint() {
        let client = OpenAiClient::new("sk-test", "http://127.0.0.1:9/v1", Duration::from_secs(5));
        let request = ChatRequest::new("gpt-4o-mini", "prompt".to_string());
        let err = client.complete(&request).await.unwrap_err();
        assert!(matches!(err, ModelError::Transport(_) | ModelError::Timeout(_)));
    }
}
