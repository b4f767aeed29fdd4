use std::collections::VecDeque;
use std::fs;
use std::io::{Cursor, Write};
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Result;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::ModelError;
use crate::llm::{ChatRequest, CompletionClient};

/// Block-delimited quiz, correct options start with `#`.
pub const HASH_START_QUIZ: &str = "What is the capital of France?
====
London
====
#Paris
====
Berlin
++++
Which number is prime?
====
#7
====
8
";

/// Numbered quiz, correct options carry a trailing `+++` run.
pub const PLUS_END_QUIZ: &str = "1. What is 2+2?
A) 3
B) 4+++
C) 5
2) Select the noble gas.
A. Oxygen
B. Nitrogen
C. Neon ++++
";

/// Numbered quiz without correctness markers.
pub const SEPARATE_FILE_QUIZ: &str = "1. Largest planet?
A) Earth
B) Jupiter
C) Mars
2. Smallest prime?
A) 1
B) 2
3. Boiling point of water at sea level?
A) 90 C
B) 100 C
";

/// Answer key matching [`SEPARATE_FILE_QUIZ`].
pub const SEPARATE_FILE_ANSWERS: &str = "Answer key
1. B
2) B
3.B
";

const DOCUMENT_NAMESPACES: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:m="http://schemas.openxmlformats.org/officeDocument/2006/math""#
);

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" "#,
    r#"ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// A single-run paragraph holding `text`.
pub fn paragraph(text: &str) -> String {
    format!(
        r#"<w:p><w:r><w:t xml:space="preserve">{}</w:t></w:r></w:p>"#,
        escape_xml(text)
    )
}

/// Wraps body XML into a complete `word/document.xml`.
pub fn document_xml(body: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<w:document {}>
  <w:body>{}</w:body>
</w:document>"#,
        DOCUMENT_NAMESPACES, body
    )
}

/// Builds an in-memory DOCX package with a single XML part.
///
/// # Arguments
///
/// * `part_name` - Archive path of the part, normally `word/document.xml`.
/// * `xml` - The part contents.
pub fn build_docx(part_name: &str, xml: &str) -> zip::result::ZipResult<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    writer.start_file("[Content_Types].xml", options)?;
    writer.write_all(CONTENT_TYPES.as_bytes())?;
    writer.start_file(part_name, options)?;
    writer.write_all(xml.as_bytes())?;
    Ok(writer.finish()?.into_inner())
}

/// Builds a DOCX with one paragraph per line.
pub fn docx_from_lines(lines: &[&str]) -> zip::result::ZipResult<Vec<u8>> {
    let body: String = lines.iter().map(|line| paragraph(line)).collect();
    build_docx("word/document.xml", &document_xml(&body))
}

/// Builds a DOCX whose paragraphs are the lines of `text`.
pub fn docx_from_text(text: &str) -> zip::result::ZipResult<Vec<u8>> {
    let lines: Vec<&str> = text.lines().collect();
    docx_from_lines(&lines)
}

/// Sample quiz documents written to a private temp directory.
#[derive(Debug, Clone)]
pub struct TestDocuments {
    pub tmp_dir: PathBuf,
}

impl TestDocuments {
    pub fn setup() -> Result<Self> {
        let mut tmp_dir = std::env::temp_dir();
        tmp_dir.push(format!(
            "rsqp_test_{}_{}",
            std::process::id(),
            SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos()
        ));
        fs::create_dir_all(&tmp_dir)?;
        Ok(Self { tmp_dir })
    }

    /// Writes `text` as a DOCX named `filename` and returns its path.
    pub fn write_docx(&self, filename: &str, text: &str) -> Result<PathBuf> {
        let path = self.tmp_dir.join(filename);
        let bytes = docx_from_text(text)?;
        fs::write(&path, bytes)?;
        info!("✓ {} - {}", filename, path.display());
        Ok(path)
    }

    /// Writes raw bytes under `filename` and returns its path.
    pub fn write_bytes(&self, filename: &str, bytes: &[u8]) -> Result<PathBuf> {
        let path = self.tmp_dir.join(filename);
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn cleanup(&self) -> Result<()> {
        if self.tmp_dir.exists() {
            fs::remove_dir_all(&self.tmp_dir)?;
        }
        Ok(())
    }
}

/// A completion client replaying canned responses in order.
///
/// Every request is recorded. Once the script is exhausted further calls
/// fail with a transport error.
#[derive(Debug, Default)]
pub struct ScriptedCompletion {
    responses: Mutex<VecDeque<Result<String, ModelError>>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedCompletion {
    pub fn new(responses: Vec<Result<String, ModelError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A client answering every call with `body`.
    pub fn replying(body: &str) -> Self {
        Self::new(vec![Ok(body.to_string())])
    }

    /// A client failing every call with `error`.
    pub fn failing(error: ModelError) -> Self {
        Self::new(vec![Err(error)])
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|requests| requests.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self
            .responses
            .lock()
            .map_err(|e| ModelError::Transport(e.to_string()))?
            .pop_front();
        next.unwrap_or_else(|| Err(ModelError::Transport("script exhausted".to_string())))
    }
}
