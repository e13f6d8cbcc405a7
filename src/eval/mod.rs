//! Provider comparison harness
//!
//! Reads a CSV of cases, sends every case to every configured provider
//! with the suite's system prompt, and writes one result row per
//! (case, provider) pair. Provider failures are recorded in the row and
//! never stop the run.

pub mod parse;
pub mod prompts;
pub mod providers;

use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;
use tracing::{info, info_span, warn, Instrument};

use crate::metrics::EVAL_REQUESTS;

pub use prompts::{Row, Suite};
pub use providers::{build_providers, ChatProvider, ProviderError, PROVIDER_NAMES};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("csv error in {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("{suite} input is missing required column(s): {}", .missing.join(", "))]
    MissingColumns { suite: Suite, missing: Vec<String> },
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// One input case
#[derive(Debug, Clone)]
pub struct EvalCase {
    pub id: String,
    pub row: Row,
}

/// One output row
#[derive(Debug, Clone)]
pub struct EvalRow {
    pub id: String,
    pub provider: String,
    pub model: String,
    /// Seconds, rounded to 2 places; `-1` when the call failed
    pub response_time_sec: f64,
    pub raw_response: String,
    pub extracted: String,
}

impl EvalRow {
    pub fn is_error(&self) -> bool {
        self.response_time_sec < 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalSummary {
    pub rows: usize,
    pub errors: usize,
    /// Mean over successful calls only
    pub mean_latency_sec: Option<f64>,
    /// Successful calls whose reply yielded an extracted answer
    pub parsed: usize,
}

/// Read cases for `suite`, rejecting input without the required columns
pub fn load_cases(path: &Path, suite: Suite) -> Result<Vec<EvalCase>, EvalError> {
    let csv_err = |source| EvalError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::Reader::from_path(path).map_err(csv_err)?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let missing: Vec<String> = suite
        .required_columns()
        .iter()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(EvalError::MissingColumns { suite, missing });
    }

    let mut cases = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let row: Row = headers
            .iter()
            .cloned()
            .zip(record.iter().map(str::to_string))
            .collect();
        let id = row
            .get(suite.id_column())
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| index.to_string());
        cases.push(EvalCase { id, row });
    }
    Ok(cases)
}

/// Runs a suite against a set of providers
pub struct Evaluator {
    suite: Suite,
    system_prompt: String,
    providers: Vec<Box<dyn ChatProvider>>,
}

impl Evaluator {
    pub fn new(suite: Suite, providers: Vec<Box<dyn ChatProvider>>) -> Self {
        Self {
            suite,
            system_prompt: suite.system_prompt(),
            providers,
        }
    }

    /// Every case against every provider, provider-major like the
    /// per-model result files this replaces
    pub async fn run(&self, cases: &[EvalCase]) -> Vec<EvalRow> {
        let mut rows = Vec::with_capacity(cases.len() * self.providers.len());
        for provider in &self.providers {
            let span = info_span!("eval_provider", suite = %self.suite, provider = provider.name(), model = provider.model());
            async {
                info!(cases = cases.len(), "Evaluating");
                for case in cases {
                    rows.push(self.run_case(provider.as_ref(), case).await);
                }
            }
            .instrument(span)
            .await;
        }
        rows
    }

    async fn run_case(&self, provider: &dyn ChatProvider, case: &EvalCase) -> EvalRow {
        let prompt = self.suite.user_prompt(&case.row);
        let started = Instant::now();
        let result = provider.complete(&self.system_prompt, &prompt).await;
        let elapsed = round2(started.elapsed().as_secs_f64());

        let (response_time_sec, raw_response, extracted) = match result {
            Ok(text) => {
                EVAL_REQUESTS.with_label_values(&[provider.name(), "ok"]).inc();
                let extracted = self.suite.extract(&text).unwrap_or_default();
                (elapsed, text, extracted)
            }
            Err(e) => {
                EVAL_REQUESTS.with_label_values(&[provider.name(), "error"]).inc();
                warn!(case = %case.id, error = %e, "Provider call failed");
                (-1.0, format!("Error: {}", e), String::new())
            }
        };

        EvalRow {
            id: case.id.clone(),
            provider: provider.name().to_string(),
            model: provider.model().to_string(),
            response_time_sec,
            raw_response,
            extracted,
        }
    }
}

const BASE_COLUMNS: [&str; 6] = [
    "id",
    "provider",
    "model",
    "response_time_sec",
    "raw_response",
    "extracted",
];

/// Write result rows, followed by any columns the suite derives from
/// the extracted answer
pub fn write_results(path: &Path, suite: Suite, rows: &[EvalRow]) -> Result<(), EvalError> {
    let csv_err = |source| EvalError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer
        .write_record(BASE_COLUMNS.iter().chain(suite.extra_columns()))
        .map_err(csv_err)?;
    for row in rows {
        let mut record = vec![
            row.id.clone(),
            row.provider.clone(),
            row.model.clone(),
            format!("{:?}", row.response_time_sec),
            row.raw_response.clone(),
            row.extracted.clone(),
        ];
        record.extend(suite.extra_values(&row.extracted));
        writer.write_record(&record).map_err(csv_err)?;
    }
    writer.flush().map_err(|source| EvalError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn summarize(rows: &[EvalRow]) -> EvalSummary {
    let ok: Vec<&EvalRow> = rows.iter().filter(|r| !r.is_error()).collect();
    let mean_latency_sec = if ok.is_empty() {
        None
    } else {
        Some(round2(
            ok.iter().map(|r| r.response_time_sec).sum::<f64>() / ok.len() as f64,
        ))
    };
    EvalSummary {
        rows: rows.len(),
        errors: rows.len() - ok.len(),
        mean_latency_sec,
        parsed: ok.iter().filter(|r| !r.extracted.is_empty()).count(),
    }
}

fn round2(secs: f64) -> f64 {
    (secs * 100.0).round() / 100.0
}
