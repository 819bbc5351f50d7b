//! Evaluation run: answers a test set and records what the quality scorer needs.
//!
//! Scoring itself (faithfulness, relevancy) is done by an external tool that
//! reads the JSON Lines output.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{AnswerRequest, Orchestrator, Stage};
use anyhow::{Context, Result};
use console::style;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::warn;

/// One test-set entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub question: String,
    #[serde(default)]
    pub ground_truth: String,
}

/// One output row per question.
#[derive(Debug, Clone, Serialize)]
pub struct EvalRow {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
    pub timings: BTreeMap<String, f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Latency statistics for one timing key.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencyStats {
    pub count: usize,
    pub mean: f64,
    pub p50: f64,
    pub max: f64,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<f64>) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by(|a, b| a.total_cmp(b));

        let count = samples.len();
        let mid = count / 2;
        let p50 = if count % 2 == 0 {
            (samples[mid - 1] + samples[mid]) / 2.0
        } else {
            samples[mid]
        };

        Some(Self {
            count,
            mean: samples.iter().sum::<f64>() / count as f64,
            p50,
            max: samples[count - 1],
        })
    }
}

/// Per-stage latency summary over all successful rows, in pipeline order.
pub fn latency_summary(rows: &[EvalRow]) -> Vec<(&'static str, LatencyStats)> {
    [
        Stage::Done,
        Stage::Rewriting,
        Stage::Embedding,
        Stage::Searching,
        Stage::Hydrating,
        Stage::Reranking,
        Stage::TitleResolving,
        Stage::Generating,
    ]
    .into_iter()
    .filter_map(|stage| {
        let key = stage.timing_key();
        let samples = rows.iter().filter_map(|r| r.timings.get(key).copied()).collect();
        LatencyStats::from_samples(samples).map(|stats| (key, stats))
    })
    .collect()
}

/// Load a `[{question, ground_truth}]` test set.
pub fn load_testset(path: &Path) -> Result<Vec<TestCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read test set {}", path.display()))?;
    let cases: Vec<TestCase> = serde_json::from_str(&content)
        .with_context(|| format!("Test set {} is not a JSON array of questions", path.display()))?;

    if cases.is_empty() {
        anyhow::bail!("Test set {} is empty", path.display());
    }
    Ok(cases)
}

/// Run the eval command.
pub async fn run_eval(
    testset: &str,
    output: Option<String>,
    namespace: Option<String>,
    settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Ask, &settings)?;

    let cases = load_testset(&Settings::expand_path(testset))?;
    let orchestrator = Orchestrator::new(settings)?;

    Output::info(&format!("Running evaluation on {} questions", cases.len()));
    let pb = Output::progress_bar(cases.len() as u64, "answering");

    let mut rows = Vec::with_capacity(cases.len());
    for case in cases {
        let mut request = AnswerRequest::new(case.question.as_str());
        request.namespace = namespace.clone();

        let row = match orchestrator.answer(&request).await {
            Ok(result) => EvalRow {
                question: case.question,
                answer: result.answer,
                contexts: result.contexts_used,
                ground_truth: case.ground_truth,
                timings: result.timings,
                error: None,
            },
            Err(e) => {
                warn!("Question {:?} failed: {}", case.question, e);
                EvalRow {
                    question: case.question,
                    answer: String::new(),
                    contexts: Vec::new(),
                    ground_truth: case.ground_truth,
                    timings: BTreeMap::new(),
                    error: Some(format!("{}: {}", e.kind(), e)),
                }
            }
        };
        rows.push(row);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let failed = rows.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        Output::warning(&format!("{} of {} questions failed", failed, rows.len()));
    }

    if let Some(path) = output {
        let path = Settings::expand_path(&path);
        write_rows(&path, &rows)?;
        Output::success(&format!("Wrote {} rows to {}", rows.len(), path.display()));
    }

    Output::header("Latency summary (ms)");
    println!(
        "  {:<16} {:>6} {:>10} {:>10} {:>10}",
        style("stage").dim(),
        "count",
        "mean",
        "p50",
        "max"
    );
    for (key, stats) in latency_summary(&rows) {
        println!(
            "  {:<16} {:>6} {:>10.1} {:>10.1} {:>10.1}",
            key, stats.count, stats.mean, stats.p50, stats.max
        );
    }

    Ok(())
}

fn write_rows(path: &Path, rows: &[EvalRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = std::io::BufWriter::new(std::fs::File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut file, row)?;
        writeln!(file)?;
    }
    file.flush()?;
    Ok(())
}
