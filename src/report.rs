//! Financial ratio report and executive summaries.
//!
//! The ratio report lives in `dynamic_ratios.json` inside the data directory.
//! Summaries are produced by asking the notebook with a language-specific
//! prompt, or computed locally from ratio statuses when no notebook is
//! available.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ClientResult, ReportError};
use crate::mcp::NotebookClient;

/// File name of the ratio report inside the data directory.
pub const RATIOS_FILE: &str = "dynamic_ratios.json";

/// One financial ratio. Fields other than `name` and `status` are kept as-is.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ratio {
    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// One of `excellent`, `good`, `warning`, `danger`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Everything else (value, benchmark, explanation, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Ratio {
    fn is_healthy(&self) -> bool {
        matches!(self.status.as_deref(), Some("good" | "excellent"))
    }

    fn has_status(&self, status: &str) -> bool {
        self.status.as_deref() == Some(status)
    }
}

/// Contents of `dynamic_ratios.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RatiosReport {
    /// Company name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    /// Reporting date, as written by the extractor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub as_of: Option<String>,
    /// Solvency group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solvency_ratios: Option<Vec<Ratio>>,
    /// Safety group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_ratios: Option<Vec<Ratio>>,
    /// Profitability group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profitability_ratios: Option<Vec<Ratio>>,
    /// Asset management group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub asset_management_ratios: Option<Vec<Ratio>>,
    /// Leading indicators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leading_indicators: Option<Vec<Ratio>>,
    /// Any other top-level fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn group(ratios: Option<&Vec<Ratio>>) -> &[Ratio] {
    ratios.map_or(&[], Vec::as_slice)
}

impl RatiosReport {
    /// All ratios across every group, leading indicators included.
    pub fn all_ratios(&self) -> impl Iterator<Item = &Ratio> {
        [
            &self.solvency_ratios,
            &self.profitability_ratios,
            &self.safety_ratios,
            &self.asset_management_ratios,
            &self.leading_indicators,
        ]
        .into_iter()
        .flat_map(|ratios| group(ratios.as_ref()))
    }

    /// Counts ratios by status.
    #[must_use]
    pub fn status_counts(&self) -> StatusCounts {
        let mut counts = StatusCounts::default();
        for ratio in self.all_ratios() {
            counts.total += 1;
            if ratio.is_healthy() {
                counts.good += 1;
            } else if ratio.has_status("warning") {
                counts.warning += 1;
            } else if ratio.has_status("danger") {
                counts.danger += 1;
            }
        }
        counts
    }

    fn as_of_label(&self) -> &str {
        self.as_of.as_deref().unwrap_or("unknown date")
    }
}

/// Ratio counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    /// `good` or `excellent`.
    pub good: usize,
    /// `warning`.
    pub warning: usize,
    /// `danger`.
    pub danger: usize,
    /// Every ratio, whatever its status.
    pub total: usize,
}

/// Path of the ratio report inside `dir`.
#[must_use]
pub fn ratios_path(dir: &Path) -> PathBuf {
    dir.join(RATIOS_FILE)
}

/// Reads the ratio report from `dir`.
///
/// Returns `Ok(None)` if the file does not exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_ratios(dir: &Path) -> Result<Option<RatiosReport>, ReportError> {
    let path = ratios_path(dir);
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No ratio report found");
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path).map_err(|e| ReportError::Read {
        path: path.clone(),
        source: e,
    })?;
    let report = serde_json::from_str(&contents).map_err(|e| ReportError::Parse {
        path: path.clone(),
        source: e,
    })?;

    tracing::debug!(path = %path.display(), "Loaded ratio report");
    Ok(Some(report))
}

/// Writes `value` as pretty-printed JSON to `path`.
///
/// # Errors
///
/// Returns an error if serialisation or writing fails.
pub fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<(), ReportError> {
    let write_error = |source: std::io::Error| ReportError::Write {
        path: path.to_path_buf(),
        source,
    };

    let json = serde_json::to_string_pretty(value).map_err(|e| write_error(e.into()))?;
    std::fs::write(path, json).map_err(write_error)
}

/// Summary language.
///
/// Anything other than `es` is treated as English.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Language {
    /// English.
    #[default]
    En,
    /// Spanish.
    Es,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Self; 2] = [Self::Es, Self::En];

    /// Two-letter code.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Es => "es",
        }
    }
}

impl From<String> for Language {
    fn from(code: String) -> Self {
        if code.trim().eq_ignore_ascii_case("es") {
            Self::Es
        } else {
            Self::En
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

fn compact(ratios: Option<&Vec<Ratio>>) -> String {
    serde_json::to_string(group(ratios)).unwrap_or_else(|_| "[]".to_string())
}

fn ratio_context(report: Option<&RatiosReport>) -> String {
    let Some(report) = report else {
        return "No ratio data available".to_string();
    };

    format!(
        "\nFinancial Ratios for {} as of {}:\n\
         Solvency: {}\n\
         Safety: {}\n\
         Profitability: {}\n\
         Asset Management: {}\n",
        report.company.as_deref().unwrap_or("the company"),
        report.as_of_label(),
        compact(report.solvency_ratios.as_ref()),
        compact(report.safety_ratios.as_ref()),
        compact(report.profitability_ratios.as_ref()),
        compact(report.asset_management_ratios.as_ref()),
    )
}

/// Builds the question that asks the notebook for an executive summary.
#[must_use]
pub fn summary_prompt(report: Option<&RatiosReport>, language: Language) -> String {
    let context = ratio_context(report);
    match language {
        Language::Es => format!(
            "[IDIOMA: ESPAÑOL] INSTRUCCIÓN CRÍTICA: TODA tu respuesta DEBE estar COMPLETAMENTE \
             en ESPAÑOL. NO uses inglés bajo ninguna circunstancia.\n\n\
             Genera un Resumen Ejecutivo profesional para los siguientes datos financieros. \
             Incluye: 1) Hallazgos Clave, 2) Análisis de Liquidez, 3) Estructura de Capital, \
             4) Eficiencia Operativa, 5) Conclusiones y Recomendaciones.\n\n\
             Datos: {context}"
        ),
        Language::En => format!(
            "[LANGUAGE: ENGLISH] CRITICAL INSTRUCTION: Your ENTIRE response MUST be COMPLETELY \
             in ENGLISH. DO NOT use Spanish under any circumstances.\n\n\
             Generate a professional Executive Summary for the following financial data. \
             Include: 1) Key Findings, 2) Liquidity Analysis, 3) Capital Structure, \
             4) Operational Efficiency, 5) Conclusions and Recommendations.\n\n\
             Data: {context}"
        ),
    }
}

/// Computes a summary from ratio statuses, without the notebook.
#[must_use]
pub fn fallback_summary(report: Option<&RatiosReport>, language: Language) -> String {
    let Some(report) = report else {
        return match language {
            Language::Es => {
                "⚠️ No hay datos de ratios disponibles. Por favor, sincronice primero.".to_string()
            }
            Language::En => "⚠️ No ratio data available. Please sync first.".to_string(),
        };
    };

    let counts = report.status_counts();
    let len = |ratios: &Option<Vec<Ratio>>| group(ratios.as_ref()).len();
    let solvency = len(&report.solvency_ratios);
    let safety = len(&report.safety_ratios);
    let profitability = len(&report.profitability_ratios);
    let assets = len(&report.asset_management_ratios);
    let leading = len(&report.leading_indicators);
    let as_of = report.as_of_label();

    match language {
        Language::Es => format!(
            "## 📊 Resumen Ejecutivo ({as_of})\n\n\
             ### Estado General\n\
             - ✅ **{}** ratios en buen estado\n\
             - ⚠️ **{}** ratios con advertencias\n\
             - ❌ **{}** ratios críticos\n\
             - 📈 **{}** ratios totales evaluados\n\n\
             ### Análisis por Categoría\n\
             - **Solvencia:** {solvency} ratios evaluados\n\
             - **Seguridad:** {safety} ratios evaluados\n\
             - **Rentabilidad:** {profitability} ratios evaluados\n\
             - **Gestión de Activos:** {assets} ratios evaluados\n\
             - **Indicadores Líderes:** {leading} indicadores evaluados\n\n\
             *Generado automáticamente. Para un análisis más profundo, conecte NotebookLM.*",
            counts.good, counts.warning, counts.danger, counts.total,
        ),
        Language::En => format!(
            "## 📊 Executive Summary ({as_of})\n\n\
             ### Overall Status\n\
             - ✅ **{}** ratios in good standing\n\
             - ⚠️ **{}** ratios with warnings\n\
             - ❌ **{}** critical ratios\n\
             - 📈 **{}** total ratios evaluated\n\n\
             ### Analysis by Category\n\
             - **Solvency:** {solvency} ratios evaluated\n\
             - **Safety:** {safety} ratios evaluated\n\
             - **Profitability:** {profitability} ratios evaluated\n\
             - **Asset Management:** {assets} ratios evaluated\n\
             - **Leading Indicators:** {leading} indicators evaluated\n\n\
             *Auto-generated. For deeper analysis, connect NotebookLM.*",
            counts.good, counts.warning, counts.danger, counts.total,
        ),
    }
}

/// Where a summary came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummarySource {
    /// Answered by the notebook.
    Notebooklm,
    /// Computed locally.
    Fallback,
}

/// An executive summary, as returned over HTTP and written by `publish`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDocument {
    /// Always `true`; failures are reported as error bodies.
    pub success: bool,
    /// Whether the notebook produced the content.
    pub generated: bool,
    /// Producer of the content.
    pub source: SummarySource,
    /// Language the summary was requested in.
    pub language: Language,
    /// Markdown text.
    pub content: String,
    /// RFC 3339 timestamp, set for notebook answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_at: Option<String>,
}

impl SummaryDocument {
    /// A locally computed summary.
    #[must_use]
    pub fn fallback(report: Option<&RatiosReport>, language: Language) -> Self {
        Self {
            success: true,
            generated: false,
            source: SummarySource::Fallback,
            language,
            content: fallback_summary(report, language),
            generated_at: None,
        }
    }

    /// A summary answered by the notebook, stamped with the current time.
    #[must_use]
    pub fn generated(content: String, language: Language) -> Self {
        Self {
            success: true,
            generated: true,
            source: SummarySource::Notebooklm,
            language,
            content,
            generated_at: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        }
    }
}

/// Produces an executive summary, falling back to local counts when no
/// notebook can be used.
///
/// # Errors
///
/// Returns an error if a notebook is available but the query itself fails.
pub async fn generate_summary(
    client: &NotebookClient,
    report: Option<&RatiosReport>,
    language: Language,
) -> ClientResult<SummaryDocument> {
    if let Err(e) = client.ensure_notebook().await {
        tracing::warn!(error = %e, %language, "Notebook unavailable, using fallback summary");
        return Ok(SummaryDocument::fallback(report, language));
    }

    tracing::info!(%language, "Generating executive summary");
    let content = client.ask(&summary_prompt(report, language)).await?;
    Ok(SummaryDocument::generated(content, language))
}
