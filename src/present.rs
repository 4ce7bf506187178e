//! View-model assembly for a finished training run.
//!
//! [`present`] is a pure function of the payload, the derived metrics, the
//! playback state and the workflow. Every metric resolves to the payload
//! value if present, else the client-derived value, else [`NOT_AVAILABLE`].

use serde::Serialize;

use crate::catalog::{self, IconKind, Workflow};
use crate::metrics::DerivedMetrics;
use crate::playback::PlaybackState;
use crate::result::{
    coerce_number, ClassificationResult, ClusteringResult, Label, RawResult, RegressionResult,
    ReportRow,
};

/// Display sentinel for any value that could not be resolved.
pub const NOT_AVAILABLE: &str = "N/A";

const SERIES_POINTS: usize = 100;
const SAMPLE_ROWS: usize = 10;
const PREVIEW_LABELS: usize = 5;
/// Counts at or above this saturate the heat-map cell.
const INTENSITY_SCALE: f64 = 5.0;
const INTENSITY_CAP: f64 = 0.8;
const CLOSE_ENOUGH: f64 = 0.5;

const CLASSIFICATION_FORMULAS: &[&str] = &[
    "Accuracy = (TP + TN) / (TP + TN + FP + FN)",
    "Precision = TP / (TP + FP)",
    "Recall = TP / (TP + FN)",
    "F1 = 2 * (Precision * Recall) / (Precision + Recall)",
];
const REGRESSION_FORMULAS: &[&str] = &[
    "MSE = (1/n) * Σ(ŷ - y)²",
    "RMSE = sqrt(MSE)",
    "MAE = (1/n) * Σ|ŷ - y|",
    "R² = 1 - (Σ(ŷ - y)² / Σ(ȳ - y)²)",
];
const CLUSTERING_FORMULAS: &[&str] = &[
    "Silhouette = (b - a) / max(a, b)",
    "a = average intra-cluster distance",
    "b = minimum average distance to other clusters",
];

/// Context about the run that is not part of the payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunInfo {
    pub algorithm: String,
    pub dataset_name: Option<String>,
    pub target_column: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewModel {
    pub algorithm: String,
    pub task: &'static str,
    pub details: Vec<Detail>,
    pub step: StepView,
    pub progress: Progress,
    pub timeline: Vec<TimelineEntry>,
    pub metric_cards: Vec<MetricCard>,
    pub performance: String,
    pub formulas: &'static [&'static str],
    pub evaluation: Table,
    pub chart: Chart,
    /// Empty for clustering.
    pub prediction_sample: Vec<SampleRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detail {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepView {
    pub index: usize,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: IconKind,
    pub glyph: &'static str,
}

impl StepView {
    fn placeholder() -> Self {
        Self {
            index: 0,
            title: "",
            description: "",
            icon: IconKind::Generic,
            glyph: IconKind::Generic.glyph(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Progress {
    /// 1-based position shown to the user; 0 when there are no steps.
    pub position: usize,
    pub total: usize,
    /// Rounded percentage complete; 0 when there are no steps.
    pub percent: u32,
    pub is_playing: bool,
}

impl Progress {
    pub fn label(&self) -> String {
        format!("Step {} / {}", self.position, self.total)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Done,
    Current,
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub title: &'static str,
    pub status: StepStatus,
}

/// Where a displayed metric came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    Payload,
    /// The report's `weighted avg` entry.
    Report,
    Derived,
    Missing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCard {
    pub label: &'static str,
    pub value: Option<f64>,
    pub source: Source,
    pub display: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HeatCell {
    pub count: u64,
    pub intensity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub idx: usize,
    pub predicted: Option<f64>,
    pub actual: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bar {
    pub cluster: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Chart {
    /// Rows are actual labels, columns predicted labels.
    Confusion { labels: Vec<String>, cells: Vec<Vec<HeatCell>> },
    Series { points: Vec<SeriesPoint> },
    Clusters { bars: Vec<Bar> },
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleStatus {
    Match,
    Mismatch,
    Close,
    Far,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SampleRow {
    pub actual: String,
    pub predicted: String,
    pub status: SampleStatus,
}

// =============================================================================
// Entry point
// =============================================================================

pub fn present(
    result: &RawResult,
    derived: &DerivedMetrics,
    playback: PlaybackState,
    workflow: Workflow,
    info: &RunInfo,
) -> ViewModel {
    let (metric_cards, performance, evaluation, chart, prediction_sample) = match result {
        RawResult::Classification(c) => (
            classification_cards(c),
            classification_performance(c),
            report_table(c),
            confusion_chart(derived),
            classification_sample(c),
        ),
        RawResult::Regression(r) => {
            let cards = regression_cards(r, derived);
            let performance = format!("RMSE: {}", cards[1].display);
            (cards, performance, regression_table(r, derived), series_chart(r), regression_sample(r))
        }
        RawResult::Clustering(c) => (
            clustering_cards(c),
            clustering_performance(c),
            cluster_table(c),
            cluster_chart(c),
            Vec::new(),
        ),
    };

    ViewModel {
        algorithm: info.algorithm.clone(),
        task: result.task_label(),
        details: details(result, info),
        step: current_step(playback, workflow),
        progress: progress(playback),
        timeline: timeline(playback, workflow),
        metric_cards,
        performance,
        formulas: formulas(result),
        evaluation,
        chart,
        prediction_sample,
    }
}

// =============================================================================
// Playback
// =============================================================================

fn current_step(playback: PlaybackState, workflow: Workflow) -> StepView {
    match workflow.get(playback.current_step) {
        Some(step) if playback.total_steps > 0 => StepView {
            index: playback.current_step,
            title: step.title,
            description: step.description,
            icon: step.icon(),
            glyph: step.icon().glyph(),
        },
        _ => StepView::placeholder(),
    }
}

/// `round(100 × (i + 1) / n)`, or 0 when there are no steps.
pub fn percent_complete(current_step: usize, total_steps: usize) -> u32 {
    if total_steps == 0 {
        return 0;
    }
    let pct = 100.0 * (current_step + 1) as f64 / total_steps as f64;
    pct.round().min(100.0) as u32
}

fn progress(playback: PlaybackState) -> Progress {
    let empty = playback.total_steps == 0;
    Progress {
        position: if empty { 0 } else { playback.current_step + 1 },
        total: playback.total_steps,
        percent: percent_complete(playback.current_step, playback.total_steps),
        is_playing: playback.is_playing,
    }
}

fn timeline(playback: PlaybackState, workflow: Workflow) -> Vec<TimelineEntry> {
    workflow
        .iter()
        .enumerate()
        .map(|(idx, step)| TimelineEntry {
            title: step.title,
            status: match idx.cmp(&playback.current_step) {
                std::cmp::Ordering::Less => StepStatus::Done,
                std::cmp::Ordering::Equal => StepStatus::Current,
                std::cmp::Ordering::Greater => StepStatus::Pending,
            },
        })
        .collect()
}

// =============================================================================
// Formatting
// =============================================================================

fn fixed(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value)
}

fn percent(value: f64, decimals: usize) -> String {
    format!("{}%", fixed(value * 100.0, decimals))
}

fn or_na(value: Option<String>) -> String {
    value.unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

fn number_text(value: &serde_json::Value, decimals: usize) -> String {
    match value {
        serde_json::Value::Number(n) => n.as_f64().map(|v| fixed(v, decimals)).unwrap_or_else(|| n.to_string()),
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn card(label: &'static str, value: Option<f64>, source: Source, display: impl FnOnce(f64) -> String) -> MetricCard {
    match value.filter(|v| v.is_finite()) {
        Some(v) => MetricCard { label, value: Some(v), source, display: display(v) },
        None => MetricCard {
            label,
            value: None,
            source: Source::Missing,
            display: NOT_AVAILABLE.to_string(),
        },
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Payload value at 2 decimals, else the weighted-average report value at 1.
fn class_card(
    label: &'static str,
    top: Option<f64>,
    c: &ClassificationResult,
    from_report: fn(&ReportRow) -> Option<f64>,
) -> MetricCard {
    if top.is_some_and(f64::is_finite) {
        return card(label, top, Source::Payload, |v| percent(v, 2));
    }
    let report = c.report.as_ref().and_then(|r| r.weighted_avg()).and_then(|row| from_report(&row));
    card(label, report, Source::Report, |v| percent(v, 1))
}

fn classification_cards(c: &ClassificationResult) -> Vec<MetricCard> {
    vec![
        card("Accuracy", c.accuracy, Source::Payload, |v| percent(v, 2)),
        class_card("Precision", c.precision, c, |r| r.precision),
        class_card("Recall", c.recall, c, |r| r.recall),
        class_card("F1-Score", c.f1_score, c, |r| r.f1_score),
    ]
}

fn classification_performance(c: &ClassificationResult) -> String {
    or_na(c.accuracy.filter(|v| v.is_finite()).map(|v| percent(v, 1)))
}

fn report_table(c: &ClassificationResult) -> Table {
    let pct = |v: Option<f64>| or_na(v.filter(|x| x.is_finite()).map(|x| percent(x, 2)));
    let count = |v: Option<f64>| or_na(v.filter(|x| x.is_finite()).map(|x| fixed(x, 0)));
    let rows = c
        .report
        .as_ref()
        .map(|report| {
            report
                .rows()
                .into_iter()
                .map(|(label, row)| {
                    vec![
                        label.to_string(),
                        pct(row.precision),
                        pct(row.recall),
                        pct(row.f1_score),
                        count(row.support),
                    ]
                })
                .collect()
        })
        .unwrap_or_default();
    Table {
        columns: vec!["Class", "Precision", "Recall", "F1-Score", "Support"],
        rows,
    }
}

fn confusion_chart(derived: &DerivedMetrics) -> Chart {
    let Some(cm) = derived.confusion() else {
        return Chart::Empty;
    };
    let cells = cm
        .rows()
        .map(|(_, row)| {
            row.iter()
                .map(|&count| HeatCell {
                    count,
                    intensity: (count as f64 / INTENSITY_SCALE).min(INTENSITY_CAP),
                })
                .collect()
        })
        .collect();
    Chart::Confusion {
        labels: cm.labels().iter().map(Label::to_string).collect(),
        cells,
    }
}

fn classification_sample(c: &ClassificationResult) -> Vec<SampleRow> {
    let (Some(preds), actual) = (c.predictions.as_ref(), c.actual.as_deref().unwrap_or(&[])) else {
        return Vec::new();
    };
    preds
        .iter()
        .take(SAMPLE_ROWS)
        .enumerate()
        .map(|(idx, pred)| {
            let act = actual.get(idx);
            SampleRow {
                actual: or_na(act.map(Label::to_string)),
                predicted: pred.to_string(),
                status: if act.is_some_and(|a| pred.loosely_eq(a)) {
                    SampleStatus::Match
                } else {
                    SampleStatus::Mismatch
                },
            }
        })
        .collect()
}

// =============================================================================
// Regression
// =============================================================================

fn resolve(raw: Option<f64>, derived: Option<f64>) -> (Option<f64>, Source) {
    match (raw.filter(|v| v.is_finite()), derived.filter(|v| v.is_finite())) {
        (Some(v), _) => (Some(v), Source::Payload),
        (None, Some(v)) => (Some(v), Source::Derived),
        (None, None) => (None, Source::Missing),
    }
}

fn regression_cards(r: &RegressionResult, derived: &DerivedMetrics) -> Vec<MetricCard> {
    let fallback = derived.regression_fallback();
    let (mse, mse_src) = resolve(r.mse, fallback.map(|f| f.mse));
    let (rmse, rmse_src) = resolve(r.rmse, fallback.map(|f| f.rmse));
    vec![
        card("MSE", mse, mse_src, |v| fixed(v, 4)),
        card("RMSE", rmse, rmse_src, |v| fixed(v, 4)),
        card("MAE", r.mae, Source::Payload, |v| fixed(v, 4)),
        card("R² Score", r.r2_score, Source::Payload, |v| fixed(v, 4)),
    ]
}

fn regression_table(r: &RegressionResult, derived: &DerivedMetrics) -> Table {
    let mut rows: Vec<Vec<String>> = regression_cards(r, derived)
        .into_iter()
        .map(|c| vec![c.label.to_string(), c.display])
        .collect();
    if let Some(coef) = r.coefficients.as_ref().filter(|c| !c.is_empty()) {
        let joined = coef.iter().map(|v| number_text(v, 4)).collect::<Vec<_>>().join(", ");
        rows.push(vec!["Coefficients".to_string(), joined]);
    }
    if let Some(intercept) = &r.intercept {
        rows.push(vec!["Intercept".to_string(), number_text(intercept, 4)]);
    }
    Table {
        columns: vec!["Metric", "Value"],
        rows,
    }
}

fn series_chart(r: &RegressionResult) -> Chart {
    let actual = r.actual.as_deref().unwrap_or(&[]);
    let points = r
        .predictions
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .take(SERIES_POINTS)
        .enumerate()
        .map(|(idx, p)| SeriesPoint {
            idx,
            predicted: coerce_number(p),
            actual: actual.get(idx).and_then(coerce_number),
        })
        .collect();
    Chart::Series { points }
}

fn regression_sample(r: &RegressionResult) -> Vec<SampleRow> {
    let actual = r.actual.as_deref().unwrap_or(&[]);
    r.predictions
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .take(SAMPLE_ROWS)
        .enumerate()
        .map(|(idx, pred)| {
            let act = actual.get(idx);
            let close = match (coerce_number(pred), act.and_then(coerce_number)) {
                (Some(p), Some(a)) => (p - a).abs() < CLOSE_ENOUGH,
                _ => false,
            };
            SampleRow {
                actual: or_na(act.map(|a| number_text(a, 2))),
                predicted: number_text(pred, 2),
                status: if close { SampleStatus::Close } else { SampleStatus::Far },
            }
        })
        .collect()
}

// =============================================================================
// Clustering
// =============================================================================

fn clustering_cards(c: &ClusteringResult) -> Vec<MetricCard> {
    let preview = c
        .labels_preview
        .as_deref()
        .unwrap_or(&[])
        .iter()
        .take(PREVIEW_LABELS)
        .map(Label::to_string)
        .collect::<Vec<_>>();
    vec![
        card("Clusters", c.n_clusters.map(|n| n as f64), Source::Payload, |v| fixed(v, 0)),
        card("Silhouette", c.silhouette, Source::Payload, |v| fixed(v, 3)),
        MetricCard {
            label: "Preview Labels",
            value: None,
            source: if preview.is_empty() { Source::Missing } else { Source::Payload },
            display: if preview.is_empty() { NOT_AVAILABLE.to_string() } else { preview.join(", ") },
        },
    ]
}

fn clustering_performance(c: &ClusteringResult) -> String {
    match c.silhouette.filter(|v| v.is_finite()) {
        Some(s) => format!("Silhouette: {}", fixed(s, 3)),
        None => format!("{} clusters", c.n_clusters.unwrap_or(0)),
    }
}

fn cluster_table(c: &ClusteringResult) -> Table {
    let rows = c
        .cluster_counts
        .as_ref()
        .map(|counts| counts.iter().map(|(k, n)| vec![k.to_string(), n.to_string()]).collect())
        .unwrap_or_default();
    Table {
        columns: vec!["Cluster", "Count"],
        rows,
    }
}

fn cluster_chart(c: &ClusteringResult) -> Chart {
    match c.cluster_counts.as_ref().filter(|m| !m.is_empty()) {
        Some(counts) => Chart::Clusters {
            bars: counts
                .iter()
                .map(|(k, n)| Bar { cluster: k.to_string(), count: *n })
                .collect(),
        },
        None => Chart::Empty,
    }
}

// =============================================================================
// Shared
// =============================================================================

fn formulas(result: &RawResult) -> &'static [&'static str] {
    match result {
        RawResult::Classification(_) => CLASSIFICATION_FORMULAS,
        RawResult::Regression(_) => REGRESSION_FORMULAS,
        RawResult::Clustering(_) => CLUSTERING_FORMULAS,
    }
}

fn details(result: &RawResult, info: &RunInfo) -> Vec<Detail> {
    let technique = catalog::algorithm(&info.algorithm).map(|a| a.kind.technique().to_string());
    vec![
        Detail { label: "Model", value: or_na(Some(info.algorithm.clone()).filter(|a| !a.is_empty())) },
        Detail { label: "Technique", value: or_na(technique) },
        Detail { label: "Dataset", value: or_na(info.dataset_name.clone()) },
        Detail { label: "Target Column", value: or_na(info.target_column.clone().filter(|t| !t.is_empty())) },
        Detail {
            label: "Samples Used",
            value: or_na(result.samples_used().map(|n| format!("{} test samples", n))),
        },
        Detail { label: "Task Type", value: result.task_label().to_string() },
    ]
}
