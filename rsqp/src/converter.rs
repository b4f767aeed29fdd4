use quick_xml::events::Event;
use std::io::{Cursor, Read};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::config::ParserConfig;
use crate::error::ExtractError;
use crate::models::{DocumentFormat, RawDocument};

/// Text substituted for an equation whose structure cannot be written as plain text.
pub const FORMULA_PLACEHOLDER: &str = "[formula]";

const DOCUMENT_XML: &str = "word/document.xml";

/// OMML elements that make an equation non-linear (fractions, radicals, scripts, ...).
const MATH_STRUCTURE_TAGS: &[&[u8]] = &[
    b"m:acc",
    b"m:bar",
    b"m:borderBox",
    b"m:box",
    b"m:d",
    b"m:eqArr",
    b"m:f",
    b"m:func",
    b"m:groupChr",
    b"m:limLow",
    b"m:limUpp",
    b"m:m",
    b"m:nary",
    b"m:phant",
    b"m:rad",
    b"m:sPre",
    b"m:sSub",
    b"m:sSubSup",
    b"m:sSup",
];

/// A PDF text extraction backend.
///
/// Backends report their own failures as [`ExtractError::Backend`]; any other
/// error is treated as unexpected and stops the fallback chain.
pub trait PdfBackend {
    fn name(&self) -> &'static str;

    /// Returns the text of every page, in page order.
    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError>;
}

/// Poppler's `pdftotext`, run on a temporary copy of the document.
pub struct PopplerBackend {
    temp_path: PathBuf,
}

impl PopplerBackend {
    pub fn new(temp_path: PathBuf) -> PopplerBackend {
        PopplerBackend { temp_path }
    }
}

impl PdfBackend for PopplerBackend {
    fn name(&self) -> &'static str {
        "pdftotext"
    }

    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        std::fs::write(&self.temp_path, bytes)
            .map_err(|e| ExtractError::backend(self.name(), e))?;

        let output = Command::new("pdftotext")
            .args(["-enc", "UTF-8"])
            .arg(&self.temp_path)
            .arg("-")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output();
        let _ = std::fs::remove_file(&self.temp_path);

        let output = output.map_err(|e| ExtractError::backend(self.name(), e))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractError::backend(
                self.name(),
                format!("{} ({})", stderr.trim(), output.status),
            ));
        }

        // pdftotext ends every page with a form feed
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.split('\u{c}').map(|page| page.to_string()).collect())
    }
}

/// The pure-Rust `pdf-extract` crate.
pub struct PdfExtractBackend;

impl PdfBackend for PdfExtractBackend {
    fn name(&self) -> &'static str {
        "pdf-extract"
    }

    fn extract_pages(&self, bytes: &[u8]) -> Result<Vec<String>, ExtractError> {
        pdf_extract::extract_text_from_mem_by_pages(bytes)
            .map_err(|e| ExtractError::backend(self.name(), format!("{:?}", e)))
    }
}

/// The backend chain used for PDFs: poppler first, `pdf-extract` second.
pub fn default_pdf_backends(config: &ParserConfig) -> Vec<Box<dyn PdfBackend>> {
    vec![
        Box::new(PopplerBackend::new(config.temp_pdf_path())),
        Box::new(PdfExtractBackend),
    ]
}

/// Concatenates page texts, each non-empty page followed by a single newline.
fn join_pages(pages: &[String]) -> String {
    let mut text = String::new();
    for page in pages {
        let page = page.trim_end_matches(['\n', '\r']);
        if page.trim().is_empty() {
            continue;
        }
        text.push_str(page);
        text.push('\n');
    }
    text
}

/// Extracts the text of a PDF by trying each backend in order.
///
/// # Arguments
///
/// * `bytes` - The PDF file contents.
/// * `backends` - Backends in order of preference.
///
/// # Returns
///
/// The text of the first backend that succeeds with non-empty output. If some
/// backend succeeded but every successful backend produced only empty pages,
/// an empty string is returned.
///
/// # Errors
///
/// `ExtractError::AllBackendsFailed` when every backend reported a backend
/// error; any non-backend error is returned as soon as it occurs.
pub fn extract_pdf_text(
    bytes: &[u8],
    backends: &[Box<dyn PdfBackend>],
) -> Result<String, ExtractError> {
    let mut failures: Vec<String> = Vec::new();
    let mut readable = false;

    for backend in backends {
        match backend.extract_pages(bytes) {
            Ok(pages) => {
                let text = join_pages(&pages);
                if !text.trim().is_empty() {
                    tracing::info!(
                        "Extracted {} pages ({} chars) with {}",
                        pages.len(),
                        text.len(),
                        backend.name()
                    );
                    return Ok(text);
                }
                readable = true;
                tracing::warn!("{} produced no text, trying next backend", backend.name());
            }
            Err(e @ ExtractError::Backend { .. }) => {
                tracing::warn!("{}, trying next backend", e);
                failures.push(e.to_string());
            }
            Err(e) => return Err(e),
        }
    }

    if readable {
        return Ok(String::new());
    }
    if failures.is_empty() {
        failures.push("no backends configured".to_string());
    }
    Err(ExtractError::AllBackendsFailed(failures.join("; ")))
}

#[derive(Debug, Default)]
struct Paragraph {
    text: String,
    equations: Vec<String>,
}

impl Paragraph {
    fn into_line(self, math_aware: bool) -> String {
        let mut line = self.text;
        if !math_aware {
            return line;
        }
        for equation in self.equations {
            if line.contains(&equation) {
                continue;
            }
            if !line.is_empty() && !line.ends_with(char::is_whitespace) {
                line.push(' ');
            }
            line.push_str(&equation);
        }
        line
    }
}

#[derive(Debug, Default)]
struct Equation {
    text: String,
    structured: bool,
}

impl Equation {
    fn render(self) -> String {
        let text = self.text.trim();
        if self.structured || text.is_empty() {
            FORMULA_PLACEHOLDER.to_string()
        } else {
            text.to_string()
        }
    }
}

fn push_text(paragraphs: &mut [Paragraph], equation: &mut Option<Equation>, s: &str) {
    if let Some(eq) = equation.as_mut() {
        eq.text.push_str(s);
    } else if let Some(paragraph) = paragraphs.last_mut() {
        paragraph.text.push_str(s);
    }
}

fn is_math_structure(name: &[u8]) -> bool {
    MATH_STRUCTURE_TAGS.iter().any(|tag| *tag == name)
}

fn resolve_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = name.strip_prefix("#x").or(name.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()
            } else {
                name.strip_prefix('#').and_then(|dec| dec.parse::<u32>().ok())
            };
            code.and_then(char::from_u32)
        }
    }
}

/// Converts the `word/document.xml` part of a DOCX into text, one line per paragraph.
///
/// With `math_aware`, each equation region is appended to its paragraph line as
/// either its literal text (flat runs only) or [`FORMULA_PLACEHOLDER`], unless
/// that text already appears in the line.
pub fn document_xml_to_text(xml: &str, math_aware: bool) -> Result<String, ExtractError> {
    let mut lines: Vec<String> = Vec::new();
    let mut paragraphs: Vec<Paragraph> = Vec::new();
    let mut equation: Option<Equation> = None;
    let mut in_text = false;

    let mut reader = quick_xml::Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"w:p" => paragraphs.push(Paragraph::default()),
                b"m:oMath" => equation = Some(Equation::default()),
                b"w:t" | b"m:t" => in_text = true,
                name => {
                    if let Some(eq) = equation.as_mut() {
                        if is_math_structure(name) {
                            eq.structured = true;
                        }
                    }
                }
            },
            Ok(Event::Empty(e)) => match e.name().as_ref() {
                b"w:p" => lines.push(String::new()),
                b"w:tab" => push_text(&mut paragraphs, &mut equation, "\t"),
                b"w:br" | b"w:cr" => push_text(&mut paragraphs, &mut equation, "\n"),
                name => {
                    if let Some(eq) = equation.as_mut() {
                        if is_math_structure(name) {
                            eq.structured = true;
                        }
                    }
                }
            },
            Ok(Event::Text(e)) => {
                if in_text {
                    let text = String::from_utf8_lossy(&e);
                    push_text(&mut paragraphs, &mut equation, &text);
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if in_text {
                    let name = String::from_utf8_lossy(&e);
                    if let Some(c) = resolve_entity(&name) {
                        push_text(&mut paragraphs, &mut equation, c.encode_utf8(&mut [0u8; 4]));
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"w:t" | b"m:t" => in_text = false,
                b"m:oMath" => {
                    if let Some(eq) = equation.take() {
                        let rendered = eq.render();
                        match paragraphs.last_mut() {
                            Some(paragraph) => paragraph.equations.push(rendered),
                            None if math_aware => lines.push(rendered),
                            None => {}
                        }
                    }
                }
                b"w:p" => {
                    if let Some(paragraph) = paragraphs.pop() {
                        lines.push(paragraph.into_line(math_aware));
                    }
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::Docx(format!(
                    "{} at position {}",
                    e,
                    reader.error_position()
                )));
            }
            _ => {}
        }
    }

    Ok(lines.join("\n"))
}

/// Extracts the paragraph text of a DOCX file.
///
/// # Errors
///
/// `ExtractError::Docx` if the bytes are not a zip archive, lack
/// `word/document.xml`, or contain malformed XML.
pub fn extract_docx_text(bytes: &[u8], math_aware: bool) -> Result<String, ExtractError> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| ExtractError::Docx(e.to_string()))?;
    let mut xml = String::new();
    {
        let mut entry = archive
            .by_name(DOCUMENT_XML)
            .map_err(|e| ExtractError::Docx(format!("{}: {}", DOCUMENT_XML, e)))?;
        entry.read_to_string(&mut xml).map_err(|e| ExtractError::Docx(e.to_string()))?;
    }
    document_xml_to_text(&xml, math_aware)
}

/// Extracts the linear text stream of a document.
///
/// # Arguments
///
/// * `document` - The source document.
/// * `config` - Supplies the temp location for poppler and the DOCX math switch.
///
/// # Returns
///
/// The extracted text, untouched apart from page/paragraph joining.
pub fn extract(document: &RawDocument, config: &ParserConfig) -> Result<String, ExtractError> {
    match document.format {
        DocumentFormat::Pdf => {
            extract_pdf_text(&document.bytes, &default_pdf_backends(config))
        }
        DocumentFormat::Docx => extract_docx_text(&document.bytes, config.math_aware_docx),
    }
}
