//! One-shot snapshot of the dashboard data.
//!
//! Writes into the output directory:
//!
//! - `financial_ratios.json`: the current ratio report
//! - `executive_summary_es.json` and `executive_summary_en.json`
//! - `executive_summary.json`: a copy of the Spanish summary
//!
//! Each file is attempted independently; a failure is logged and counted.

use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::mcp::NotebookClient;
use crate::report::{self, Language};

/// File name of the ratio snapshot.
pub const RATIOS_SNAPSHOT: &str = "financial_ratios.json";

/// File name of the language-neutral summary copy.
pub const DEFAULT_SUMMARY: &str = "executive_summary.json";

/// Language whose summary is also written as [`DEFAULT_SUMMARY`].
pub const DEFAULT_LANGUAGE: Language = Language::Es;

/// What a publish run produced.
#[derive(Debug, Default)]
pub struct PublishOutcome {
    /// Files written, in order.
    pub written: Vec<PathBuf>,
    /// Steps that failed.
    pub failures: usize,
}

impl PublishOutcome {
    /// Whether every step succeeded.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failures == 0
    }

    fn record(&mut self, path: PathBuf, result: Result<(), ReportError>) {
        match result {
            Ok(()) => {
                tracing::info!(path = %path.display(), "Snapshot written");
                self.written.push(path);
            }
            Err(e) => {
                tracing::error!(error = %e, "Snapshot step failed");
                self.failures += 1;
            }
        }
    }
}

/// File name of the summary for `language`.
#[must_use]
pub fn summary_file_name(language: Language) -> String {
    format!("executive_summary_{}.json", language.code())
}

/// Writes the ratio and summary snapshots into `out_dir`.
///
/// # Errors
///
/// Returns an error only if `out_dir` cannot be created; individual snapshot
/// failures are reported in the [`PublishOutcome`].
pub async fn publish(
    client: &NotebookClient,
    data_dir: Option<&Path>,
    out_dir: &Path,
) -> Result<PublishOutcome, ReportError> {
    std::fs::create_dir_all(out_dir).map_err(|e| ReportError::Write {
        path: out_dir.to_path_buf(),
        source: e,
    })?;

    let mut outcome = PublishOutcome::default();

    let ratios = match data_dir.map(report::load_ratios).transpose() {
        Ok(ratios) => ratios.flatten(),
        Err(e) => {
            tracing::error!(error = %e, "Could not read ratio report");
            outcome.failures += 1;
            None
        }
    };

    match &ratios {
        Some(report) => {
            let path = out_dir.join(RATIOS_SNAPSHOT);
            let result = report::write_snapshot(&path, report);
            outcome.record(path, result);
        }
        None => tracing::warn!("No ratio report to publish"),
    }

    for language in Language::ALL {
        tracing::info!(%language, "Generating executive summary snapshot");
        let document = match report::generate_summary(client, ratios.as_ref(), language).await {
            Ok(document) => document,
            Err(e) => {
                tracing::error!(error = %e, %language, "Executive summary failed");
                outcome.failures += 1;
                continue;
            }
        };
        tracing::info!(%language, source = ?document.source, "Executive summary ready");

        let path = out_dir.join(summary_file_name(language));
        let result = report::write_snapshot(&path, &document);
        outcome.record(path, result);

        if language == DEFAULT_LANGUAGE {
            let path = out_dir.join(DEFAULT_SUMMARY);
            let result = report::write_snapshot(&path, &document);
            outcome.record(path, result);
        }
    }

    Ok(outcome)
}
