//! Batch scoring of a tabular dataset

use chrono::{DateTime, Utc};
use polars::prelude::*;

use crate::data::{feature_matrix, missing_columns, sample_rows};
use crate::error::{Error, Result};
use crate::features::{FullFeatureVector, SubsetFeatureVector};
use crate::gateway::{ModelGateway, Score};

pub const CLUSTER_COLUMN: &str = "Cluster";
pub const CLUSTER_LABEL_COLUMN: &str = "ClusterLabel";
pub const PROBABILITY_COLUMN: &str = "PurchaseProbability";
pub const INTENT_COLUMN: &str = "PurchaseIntent";
pub const TIMESTAMP_COLUMN: &str = "Timestamp";

/// Columns shown by [`BatchResult::preview`].
pub const PREVIEW_COLUMNS: [&str; 5] = [
    CLUSTER_LABEL_COLUMN,
    INTENT_COLUMN,
    PROBABILITY_COLUMN,
    "Administrative_Duration",
    "ProductRelated_Duration",
];

/// Headline numbers of one batch run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub total_rows: usize,
    pub high_intent: usize,
    pub likely_purchase: usize,
    pub average_probability: f64,
}

impl BatchSummary {
    fn from_scores(scores: &[Score]) -> Self {
        let total_rows = scores.len();
        let high_intent = scores.iter().filter(|s| s.cluster_id == 0).count();
        let likely_purchase = scores.iter().filter(|s| s.hard_label == 1).count();
        let average_probability = if total_rows == 0 {
            0.0
        } else {
            scores.iter().map(|s| s.purchase_probability).sum::<f64>() / total_rows as f64
        };

        Self {
            total_rows,
            high_intent,
            likely_purchase,
            average_probability,
        }
    }

    pub fn high_intent_share(&self) -> f64 {
        share(self.high_intent, self.total_rows)
    }

    pub fn likely_purchase_share(&self) -> f64 {
        share(self.likely_purchase, self.total_rows)
    }
}

fn share(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

/// Scored dataset: the evaluated rows plus cluster and intent columns.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub frame: DataFrame,
    pub summary: BatchSummary,
    pub created_at: DateTime<Utc>,
}

impl BatchResult {
    pub fn rows(&self) -> usize {
        self.frame.height()
    }

    /// Outcome columns and two duration columns of the first `rows` rows.
    pub fn preview(&self, rows: usize) -> Result<DataFrame> {
        Ok(self.frame.select(PREVIEW_COLUMNS)?.head(Some(rows)))
    }
}

/// Score every row of `df` (or a seeded sample of `sample_size` rows).
///
/// The dataset columns are used directly as both feature vectors; nothing is
/// re-derived. Fails without evaluating anything when the gateway is
/// disabled or required columns are missing, and fails as a whole if any
/// row cannot be scored.
pub fn evaluate_batch(
    gateway: &ModelGateway,
    df: &DataFrame,
    sample_size: usize,
) -> Result<BatchResult> {
    if let Some(reason) = gateway.status().reason {
        return Err(Error::ModelsUnavailable(reason));
    }

    let missing = missing_columns(df);
    if !missing.is_empty() {
        return Err(Error::MissingColumns(missing));
    }

    let mut frame = sample_rows(df, sample_size)?;
    let features = feature_matrix(&frame)?;

    let scores = features
        .outer_iter()
        .enumerate()
        .map(|(row, values)| {
            let full = FullFeatureVector::from_slice(&values.to_vec()).map_err(|e| e.at_row(row))?;
            let subset = SubsetFeatureVector::project(&full);
            gateway.score(&full, &subset).map_err(|e| e.at_row(row))
        })
        .collect::<Result<Vec<Score>>>()?;

    let created_at = Utc::now();
    let timestamp = created_at.to_rfc3339();

    let clusters: Vec<i64> = scores.iter().map(|s| s.cluster_id as i64).collect();
    let cluster_labels: Vec<&str> = scores.iter().map(Score::cluster_label).collect();
    let probabilities: Vec<f64> = scores.iter().map(|s| s.purchase_probability).collect();
    let intents: Vec<&str> = scores.iter().map(Score::purchase_label).collect();
    let timestamps: Vec<&str> = vec![timestamp.as_str(); scores.len()];

    frame.with_column(Series::new(CLUSTER_COLUMN.into(), clusters))?;
    frame.with_column(Series::new(CLUSTER_LABEL_COLUMN.into(), cluster_labels))?;
    frame.with_column(Series::new(PROBABILITY_COLUMN.into(), probabilities))?;
    frame.with_column(Series::new(INTENT_COLUMN.into(), intents))?;
    frame.with_column(Series::new(TIMESTAMP_COLUMN.into(), timestamps))?;

    let summary = BatchSummary::from_scores(&scores);
    tracing::info!(
        rows = summary.total_rows,
        high_intent = summary.high_intent,
        likely_purchase = summary.likely_purchase,
        "batch evaluated"
    );

    Ok(BatchResult {
        frame,
        summary,
        created_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_NAMES;
    use crate::gateway::test_support::*;
    use crate::model::SegmentModel;
    use std::sync::Arc;

    fn dataset(page_values: &[f64]) -> DataFrame {
        let n = page_values.len();
        let columns: Vec<Column> = FEATURE_NAMES
            .iter()
            .map(|name| {
                let values = if *name == "PageValues" {
                    page_values.to_vec()
                } else {
                    vec![1.0; n]
                };
                Column::from(Series::new((*name).into(), values))
            })
            .collect();
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn test_full_dataset_in_order() {
        let gateway = stub_gateway();
        let df = dataset(&[10.0, 90.0, 30.0, 60.0]);

        let result = evaluate_batch(&gateway, &df, 0).unwrap();
        assert_eq!(result.rows(), 4);

        let clusters: Vec<i64> = result
            .frame
            .column(CLUSTER_COLUMN)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(clusters, vec![1, 0, 0, 0]);

        let page_values: Vec<f64> = result
            .frame
            .column("PageValues")
            .unwrap()
            .f64()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(page_values, vec![10.0, 90.0, 30.0, 60.0]);

        assert_eq!(result.summary.total_rows, 4);
        assert_eq!(result.summary.high_intent, 3);
        assert_eq!(result.summary.likely_purchase, 2);
        assert!((result.summary.average_probability - 0.475).abs() < 1e-12);
        assert!((result.summary.high_intent_share() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_sample_size_at_least_rows_uses_everything() {
        let gateway = stub_gateway();
        let df = dataset(&[10.0, 20.0, 30.0]);
        assert_eq!(evaluate_batch(&gateway, &df, 3).unwrap().rows(), 3);
        assert_eq!(evaluate_batch(&gateway, &df, 50).unwrap().rows(), 3);
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let gateway = stub_gateway();
        let values: Vec<f64> = (0..50).map(|i| i as f64 * 2.0).collect();
        let df = dataset(&values);

        let first = evaluate_batch(&gateway, &df, 10).unwrap();
        let second = evaluate_batch(&gateway, &df, 10).unwrap();
        assert_eq!(first.rows(), 10);

        let pick = |r: &BatchResult| -> Vec<f64> {
            r.frame
                .column("PageValues")
                .unwrap()
                .f64()
                .unwrap()
                .into_no_null_iter()
                .collect()
        };
        assert_eq!(pick(&first), pick(&second));
    }

    #[test]
    fn test_missing_columns_abort() {
        let gateway = stub_gateway();
        let df = dataset(&[10.0]).drop("Region").unwrap();

        match evaluate_batch(&gateway, &df, 0) {
            Err(Error::MissingColumns(names)) => assert_eq!(names, vec!["Region"]),
            other => panic!("expected MissingColumns, got {:?}", other.map(|r| r.rows())),
        }
    }

    #[test]
    fn test_disabled_gateway() {
        let gateway = ModelGateway::disabled("no artifacts");
        let df = dataset(&[10.0]);
        assert!(matches!(
            evaluate_batch(&gateway, &df, 0),
            Err(Error::ModelsUnavailable(_))
        ));
    }

    struct MismatchedSegments;

    impl SegmentModel for MismatchedSegments {
        fn assign(&self, _features: &SubsetFeatureVector) -> Result<usize> {
            Err(Error::schema("centroids have 3 dimensions, expected 9"))
        }
    }

    #[test]
    fn test_row_errors_keep_their_kind() {
        let gateway = ModelGateway::from_parts(
            Arc::new(MismatchedSegments),
            Arc::new(PageValueIntent),
            Arc::new(PageValueAttributor),
        );
        let df = dataset(&[10.0, 20.0]);

        match evaluate_batch(&gateway, &df, 0) {
            Err(Error::SchemaMismatch(msg)) => assert!(msg.starts_with("row 0: ")),
            other => panic!("expected SchemaMismatch, got {:?}", other.map(|r| r.rows())),
        }

        let failing = ModelGateway::from_parts(
            Arc::new(PageValueSegments),
            Arc::new(FailingIntent),
            Arc::new(PageValueAttributor),
        );
        assert!(matches!(
            evaluate_batch(&failing, &df, 0),
            Err(Error::Inference(_))
        ));
    }

    #[test]
    fn test_preview_rows_and_columns() {
        let gateway = stub_gateway();
        let values: Vec<f64> = (0..12).map(|i| i as f64 * 10.0).collect();
        let result = evaluate_batch(&gateway, &dataset(&values), 0).unwrap();

        let preview = result.preview(crate::data::PREVIEW_ROWS).unwrap();
        assert_eq!(preview.height(), 10);
        let names: Vec<&str> = preview.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, PREVIEW_COLUMNS.to_vec());
        assert_eq!(result.preview(3).unwrap().height(), 3);
    }

    #[test]
    fn test_labels_and_timestamp_columns() {
        let gateway = stub_gateway();
        let df = dataset(&[90.0, 5.0]);
        let result = evaluate_batch(&gateway, &df, 0).unwrap();

        let labels: Vec<&str> = result
            .frame
            .column(CLUSTER_LABEL_COLUMN)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(labels, vec!["High-Intent Shoppers", "Casual Browsers"]);

        let intents: Vec<&str> = result
            .frame
            .column(INTENT_COLUMN)
            .unwrap()
            .str()
            .unwrap()
            .into_no_null_iter()
            .collect();
        assert_eq!(intents, vec!["Likely to Purchase", "Unlikely to Purchase"]);
        assert!(result.frame.column(TIMESTAMP_COLUMN).is_ok());
    }
}
