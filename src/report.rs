//! CSV exports and the plain-text analysis report

use chrono::{DateTime, Local};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

use crate::batch::{
    BatchResult, CLUSTER_LABEL_COLUMN, INTENT_COLUMN, PROBABILITY_COLUMN, TIMESTAMP_COLUMN,
};
use crate::error::Result;
use crate::gateway::PredictionResult;
use crate::features::SUBSET_FEATURE_NAMES;
use crate::session::{ResultLog, Session};

/// Currency prefix for page values.
pub const CURRENCY_SYMBOL: &str = "R";

const REPORT_TITLE: &str = "CUSTOMER ANALYTICS REPORT";
const REPORT_FOOTER: &str = "Generated by Customer Analytics Dashboard";

/// Columns of the single-prediction export after the clustering features.
pub const LOG_OUTCOME_COLUMNS: [&str; 5] = [
    "Cluster",
    "ClusterID",
    "PurchaseIntent",
    "PurchaseProbability",
    "Timestamp",
];

/// Header of the batch export when no batch has been run.
pub const EMPTY_BATCH_COLUMNS: [&str; 6] = [
    CLUSTER_LABEL_COLUMN,
    INTENT_COLUMN,
    PROBABILITY_COLUMN,
    "Administrative_Duration",
    "ProductRelated_Duration",
    TIMESTAMP_COLUMN,
];

/// The three downloadable artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    Predictions,
    BatchResults,
    AnalysisReport,
}

impl ExportKind {
    pub const ALL: [ExportKind; 3] = [
        ExportKind::Predictions,
        ExportKind::BatchResults,
        ExportKind::AnalysisReport,
    ];
}

/// File name for an export, suffixed with `YYYYmmdd_HHMMSS`.
pub fn export_file_name(kind: ExportKind, now: &DateTime<Local>) -> String {
    let (stem, extension) = match kind {
        ExportKind::Predictions => ("predictions", "csv"),
        ExportKind::BatchResults => ("batch_results", "csv"),
        ExportKind::AnalysisReport => ("analysis_report", "txt"),
    };
    format!("{}_{}.{}", stem, now.format("%Y%m%d_%H%M%S"), extension)
}

fn frame_to_csv(df: &mut DataFrame) -> Result<String> {
    let mut buffer = Vec::new();
    CsvWriter::new(&mut buffer).include_header(true).finish(df)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn empty_frame(names: &[&str]) -> Result<DataFrame> {
    let columns = names
        .iter()
        .map(|name| Column::from(Series::new_empty((*name).into(), &DataType::String)))
        .collect();
    Ok(DataFrame::new(columns)?)
}

/// Dump of the single-prediction log. An empty log yields the header only.
pub fn predictions_csv(log: &ResultLog) -> Result<String> {
    let records = log.records();
    if records.is_empty() {
        let header: Vec<&str> = SUBSET_FEATURE_NAMES
            .iter()
            .chain(LOG_OUTCOME_COLUMNS.iter())
            .copied()
            .collect();
        return frame_to_csv(&mut empty_frame(&header)?);
    }

    let mut columns: Vec<Column> = SUBSET_FEATURE_NAMES
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let values: Vec<f64> = records.iter().map(|r| r.features.to_array()[i]).collect();
            Column::from(Series::new((*name).into(), values))
        })
        .collect();

    let labels: Vec<&str> = records.iter().map(|r| r.cluster_label.as_str()).collect();
    let ids: Vec<i64> = records.iter().map(|r| r.cluster_id as i64).collect();
    let intents: Vec<&str> = records.iter().map(|r| r.purchase_label.as_str()).collect();
    let probabilities: Vec<&str> = records
        .iter()
        .map(|r| r.purchase_probability.as_str())
        .collect();
    let timestamps: Vec<String> = records.iter().map(|r| r.timestamp.to_rfc3339()).collect();

    columns.push(Column::from(Series::new(LOG_OUTCOME_COLUMNS[0].into(), labels)));
    columns.push(Column::from(Series::new(LOG_OUTCOME_COLUMNS[1].into(), ids)));
    columns.push(Column::from(Series::new(LOG_OUTCOME_COLUMNS[2].into(), intents)));
    columns.push(Column::from(Series::new(LOG_OUTCOME_COLUMNS[3].into(), probabilities)));
    columns.push(Column::from(Series::new(LOG_OUTCOME_COLUMNS[4].into(), timestamps)));

    frame_to_csv(&mut DataFrame::new(columns)?)
}

/// Dump of the active batch result, or a header-only CSV when there is none.
pub fn batch_csv(batch: Option<&BatchResult>) -> Result<String> {
    match batch {
        Some(result) => frame_to_csv(&mut result.frame.clone()),
        None => frame_to_csv(&mut empty_frame(&EMPTY_BATCH_COLUMNS)?),
    }
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

fn placeholder_report(generated_at: &DateTime<Local>) -> String {
    format!(
        "{title}
Generated: {generated}

=== STATUS ===
No analysis results available.
Please run a customer analysis first by:
1. Entering customer behavior data
2. Running the 'predict' command
3. Exporting the report again

=== INSTRUCTIONS ===
This report will contain:
- Customer behavior profile
- Segmentation results (High-Intent vs Casual Browser)
- Purchase intent prediction
- Feature importance analysis (SHAP values)
- Insights and recommendations

{footer}
",
        title = REPORT_TITLE,
        generated = generated_at.format("%Y-%m-%d %H:%M:%S"),
        footer = REPORT_FOOTER,
    )
}

/// Plain-text analysis report. Without a result an explanatory placeholder
/// is produced instead.
pub fn analysis_report(result: Option<&PredictionResult>, generated_at: &DateTime<Local>) -> String {
    let Some(result) = result else {
        return placeholder_report(generated_at);
    };

    let f = &result.source_features;
    let mut lines = vec![
        REPORT_TITLE.to_string(),
        format!("Generated: {}", generated_at.format("%Y-%m-%d %H:%M:%S")),
        String::new(),
        "=== CUSTOMER PROFILE ===".to_string(),
        format!("Administrative Duration: {:.1} seconds", f.administrative_duration),
        format!("Product Browsing Duration: {:.1} seconds", f.product_related_duration),
        format!("Informational Duration: {:.1} seconds", f.informational_duration),
        format!("Bounce Rate: {:.3}", f.bounce_rates),
        format!("Exit Rate: {:.3}", f.exit_rates),
        format!("Page Value: {}{:.2}", CURRENCY_SYMBOL, f.page_values),
        format!("Special Day: {:.1}", f.special_day),
        format!("Weekend: {}", if f.weekend == 1.0 { "Yes" } else { "No" }),
        format!("Interaction Intensity: {:.2}", f.interaction_intensity),
        String::new(),
        "=== ANALYSIS RESULTS ===".to_string(),
        format!(
            "Customer Segment: {} (Cluster {})",
            result.cluster_label, result.cluster_id
        ),
        format!("Purchase Intent: {}", result.purchase_label),
        format!("Purchase Probability: {}", percent(result.purchase_probability)),
        String::new(),
        "=== FEATURE IMPORTANCE (SHAP VALUES) ===".to_string(),
    ];

    for (name, value) in &result.attributions {
        let impact = if *value > 0.0 { "Positive" } else { "Negative" };
        lines.push(format!("{}: {:.4} ({} impact)", name, value, impact));
    }

    lines.extend([
        String::new(),
        "=== SUMMARY ===".to_string(),
        format!(
            "This customer belongs to the {} segment and is {}.",
            result.cluster_label,
            result.purchase_label.to_lowercase()
        ),
        format!(
            "The model confidence is {}.",
            percent(result.purchase_probability)
        ),
        String::new(),
        REPORT_FOOTER.to_string(),
    ]);

    lines.join("\n")
}

/// Write all three exports into `dir`, returning the written paths.
pub fn write_exports(session: &Session, dir: &Path, now: &DateTime<Local>) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)?;

    let mut written = Vec::with_capacity(ExportKind::ALL.len());
    for kind in ExportKind::ALL {
        let contents = match kind {
            ExportKind::Predictions => predictions_csv(session.results_log())?,
            ExportKind::BatchResults => batch_csv(session.batch_result())?,
            ExportKind::AnalysisReport => analysis_report(session.last_prediction(), now),
        };
        let path = dir.join(export_file_name(kind, now));
        fs::write(&path, contents)?;
        tracing::info!(path = %path.display(), "export written");
        written.push(path);
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{derive_features, RawSessionInput};
    use crate::gateway::test_support::stub_gateway;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 17, 9, 30, 5).unwrap()
    }

    fn sample_result() -> PredictionResult {
        let input = RawSessionInput {
            page_value: 80.0,
            ..RawSessionInput::default()
        };
        let (full, subset) = derive_features(&input);
        stub_gateway().predict(&full, &subset).unwrap()
    }

    #[test]
    fn test_empty_log_is_header_only() {
        let csv = predictions_csv(&ResultLog::default()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(
            lines[0],
            "Administrative_Duration,ProductRelated_Duration,Informational_Duration,\
             BounceRates,ExitRates,PageValues,SpecialDay,Weekend,Interaction_Intensity,\
             Cluster,ClusterID,PurchaseIntent,PurchaseProbability,Timestamp"
        );
    }

    #[test]
    fn test_log_rows_exported() {
        let mut session = Session::new(Arc::new(stub_gateway()));
        session.analyze(&RawSessionInput::default()).unwrap();
        session
            .analyze(&RawSessionInput {
                page_value: 90.0,
                ..RawSessionInput::default()
            })
            .unwrap();

        let csv = predictions_csv(session.results_log()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("High-Intent Shoppers"));
        assert!(lines[1].contains("0.400"));
        assert!(lines[2].contains("Likely to Purchase"));
        assert!(lines[2].contains("0.900"));
    }

    #[test]
    fn test_absent_batch_is_header_only() {
        let csv = batch_csv(None).unwrap();
        assert_eq!(
            csv.trim_end(),
            "ClusterLabel,PurchaseIntent,PurchaseProbability,Administrative_Duration,ProductRelated_Duration,Timestamp"
        );
    }

    #[test]
    fn test_placeholder_report() {
        let report = analysis_report(None, &fixed_time());
        assert!(report.starts_with("CUSTOMER ANALYTICS REPORT\nGenerated: 2026-10-17 09:30:05"));
        assert!(report.contains("No analysis results available"));
        assert!(report.contains("=== STATUS ==="));
    }

    #[test]
    fn test_full_report_sections() {
        let result = sample_result();
        let report = analysis_report(Some(&result), &fixed_time());

        assert!(report.contains("=== CUSTOMER PROFILE ==="));
        assert!(report.contains("Administrative Duration: 30.0 seconds"));
        assert!(report.contains("Product Browsing Duration: 150.0 seconds"));
        assert!(report.contains("Bounce Rate: 0.010"));
        assert!(report.contains("Page Value: R80.00"));
        assert!(report.contains("Weekend: No"));
        assert!(report.contains("Interaction Intensity: 0.80"));
        assert!(report.contains("Customer Segment: High-Intent Shoppers (Cluster 0)"));
        assert!(report.contains("Purchase Intent: Likely to Purchase"));
        assert!(report.contains("Purchase Probability: 80.0%"));
        assert!(report.contains("PageValues: 0.3000 (Positive impact)"));
        assert!(report.contains("BounceRates: -0.0100 (Negative impact)"));
        assert!(report.contains("Month: 0.0000 (Negative impact)"));
        assert!(report.contains(
            "This customer belongs to the High-Intent Shoppers segment and is likely to purchase."
        ));
        assert!(report.contains("The model confidence is 80.0%."));

        let attribution_lines = report
            .lines()
            .filter(|l| l.ends_with("impact)"))
            .count();
        assert_eq!(attribution_lines, 20);
    }

    #[test]
    fn test_export_file_names() {
        let now = fixed_time();
        assert_eq!(
            export_file_name(ExportKind::Predictions, &now),
            "predictions_20261017_093005.csv"
        );
        assert_eq!(
            export_file_name(ExportKind::BatchResults, &now),
            "batch_results_20261017_093005.csv"
        );
        assert_eq!(
            export_file_name(ExportKind::AnalysisReport, &now),
            "analysis_report_20261017_093005.txt"
        );
    }

    #[test]
    fn test_write_exports() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(Arc::new(stub_gateway()));
        let written = write_exports(&session, dir.path(), &fixed_time()).unwrap();

        assert_eq!(written.len(), 3);
        for path in &written {
            assert!(path.exists());
        }
        let report = fs::read_to_string(&written[2]).unwrap();
        assert!(report.contains("No analysis results available"));
    }
}
