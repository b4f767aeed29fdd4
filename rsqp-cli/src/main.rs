pub mod loggers;

use crate::loggers::init_logger;
use anyhow::{bail, Context, Result};
use clap::Parser;
use glob::glob;
use indicatif::ProgressBar;
use rsqp::config::{is_llm_available, ParserConfig};
use rsqp::models::{AnswerMarking, BoundaryMode, ParseReport};
use rsqp::parser::parse_path;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(version, about, long_about=None)]
struct Args {
    /// Question document (.pdf, .docx) or a glob pattern such as "quizzes/*.pdf"
    #[arg(short, long)]
    questions: String,

    /// Answer key document, used with the separate_file convention
    #[arg(short, long)]
    answers: Option<PathBuf>,

    /// How correct options are marked: hash_start, plus_end or separate_file
    #[arg(short, long, default_value_t = AnswerMarking::HashStart)]
    convention: AnswerMarking,

    #[arg(short, long)]
    out: Option<String>,

    /// Try the chat model first (needs OPENAI_API_KEY)
    #[arg(long, default_value_t = false)]
    use_llm: bool,

    /// Accept question and option markers anywhere, not only at line starts
    #[arg(long, default_value_t = false)]
    permissive: bool,

    /// Keep equation-script markup as extracted
    #[arg(long, default_value_t = false)]
    no_math: bool,

    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

impl Args {
    fn config(&self) -> ParserConfig {
        let boundary_mode = if self.permissive {
            BoundaryMode::Permissive
        } else {
            BoundaryMode::LineAnchored
        };
        ParserConfig::new()
            .with_answer_marking(self.convention)
            .with_boundary_mode(boundary_mode)
            .with_llm(self.use_llm)
            .with_normalize_math(!self.no_math)
    }
}

/// A path that exists is taken as is; anything else is expanded as a glob.
fn resolve_inputs(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    if path.exists() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut paths = Vec::new();
    for entry in glob(pattern).with_context(|| format!("Invalid pattern: {}", pattern))? {
        paths.push(entry?);
    }
    paths.sort();
    if paths.is_empty() {
        bail!("File not found: {}", pattern);
    }
    Ok(paths)
}

async fn run_batch(paths: &[PathBuf], config: &ParserConfig, verbose: bool) -> Vec<ParseReport> {
    let pb = ProgressBar::new(paths.len() as u64);
    pb.set_style(
        indicatif::ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.green/blue} {pos:>7}/{len:7} {msg}")
            .unwrap_or_else(|_| indicatif::ProgressStyle::default_bar())
            .progress_chars("█▓▒░"),
    );

    let mut reports = Vec::new();
    let mut failed = 0;
    for path in paths {
        pb.set_message(path.display().to_string());
        match parse_path(path, None, config, verbose).await {
            Ok(report) => {
                if !report.is_success() {
                    tracing::warn!("{}: no questions found", path.display());
                }
                reports.push(report);
            }
            Err(e) => {
                tracing::error!("{}: {:#}", path.display(), e);
                failed += 1;
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    let questions: usize = reports.iter().map(|r| r.questions.len()).sum();
    tracing::info!(
        "Parsed {}/{} documents ({} failed), {} questions in total",
        reports.len(),
        paths.len(),
        failed,
        questions
    );
    reports
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.verbose)?;

    let outfile = args.out.clone().unwrap_or("output.json".to_string());
    if !outfile.ends_with(".json") {
        bail!("Output file must be a JSON file: {}", outfile);
    }

    let config = args.config();
    if config.use_llm && !is_llm_available() {
        tracing::warn!("OPENAI_API_KEY not set, the regex grammars will be used");
    }
    if args.answers.is_some() && config.answer_marking != AnswerMarking::SeparateFile {
        tracing::warn!("--answers is only read with --convention separate_file");
    }

    let inputs = resolve_inputs(&args.questions)?;
    let json = if inputs.len() == 1 {
        let report = parse_path(&inputs[0], args.answers.as_deref(), &config, args.verbose)
            .await
            .with_context(|| format!("Failed to parse {}", inputs[0].display()))?;
        if !report.is_success() {
            tracing::warn!("No questions found in {}", report.source);
        }
        serde_json::to_string_pretty(&report)?
    } else {
        if args.answers.is_some() {
            bail!("--answers cannot be combined with several question documents");
        }
        let reports = run_batch(&inputs, &config, args.verbose).await;
        if reports.is_empty() {
            bail!("None of the {} documents could be parsed", inputs.len());
        }
        serde_json::to_string_pretty(&reports)?
    };

    std::fs::write(&outfile, json).with_context(|| format!("Failed to write {}", outfile))?;
    tracing::info!("Wrote {}", outfile);
    Ok(())
}
