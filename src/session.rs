//! Analysis session state
//!
//! A [`Session`] is the single owner of everything that accumulates while
//! analysing: the log of single predictions, the active batch result and the
//! memo of the last analysed input.

use chrono::{DateTime, Utc};
use polars::prelude::DataFrame;
use std::sync::Arc;

use crate::batch::{evaluate_batch, BatchResult};
use crate::error::Result;
use crate::features::{derive_features, RawSessionInput, SubsetFeatureVector};
use crate::gateway::{ModelGateway, PredictionResult};

/// One logged single prediction.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub features: SubsetFeatureVector,
    pub cluster_label: String,
    pub cluster_id: usize,
    pub purchase_label: String,
    /// Probability rendered with three decimals
    pub purchase_probability: String,
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    fn from_prediction(result: &PredictionResult, timestamp: DateTime<Utc>) -> Self {
        Self {
            features: result.subset_features,
            cluster_label: result.cluster_label.clone(),
            cluster_id: result.cluster_id,
            purchase_label: result.purchase_label.clone(),
            purchase_probability: format!("{:.3}", result.purchase_probability),
            timestamp,
        }
    }
}

/// Append-only log of single predictions.
#[derive(Debug, Clone, Default)]
pub struct ResultLog {
    records: Vec<LogRecord>,
}

impl ResultLog {
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Counts shown on the export screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SummaryStats {
    pub single_predictions: usize,
    pub batch_predictions: usize,
    pub total: usize,
}

pub struct Session {
    gateway: Arc<ModelGateway>,
    log: ResultLog,
    batch: Option<BatchResult>,
    memo: Option<(RawSessionInput, Arc<PredictionResult>)>,
    /// Outcome of the latest `analyze` call; cleared when it fails
    last: Option<Arc<PredictionResult>>,
}

impl Session {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self {
            gateway,
            log: ResultLog::default(),
            batch: None,
            memo: None,
            last: None,
        }
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Derive features and predict for one input, logging the outcome.
    ///
    /// Derivation and prediction are cached on input equality: repeating the
    /// last input reuses its result without calling the models again. Every
    /// successful call appends to the log. A failed call leaves no current
    /// prediction behind.
    pub fn analyze(&mut self, input: &RawSessionInput) -> Result<Arc<PredictionResult>> {
        let result = match &self.memo {
            Some((cached_input, cached)) if cached_input == input => {
                tracing::debug!("reusing cached prediction");
                Arc::clone(cached)
            }
            _ => {
                let (full, subset) = derive_features(input);
                match self.gateway.predict(&full, &subset) {
                    Ok(result) => {
                        let result = Arc::new(result);
                        self.memo = Some((input.clone(), Arc::clone(&result)));
                        result
                    }
                    Err(e) => {
                        self.last = None;
                        return Err(e);
                    }
                }
            }
        };

        self.log.push(LogRecord::from_prediction(&result, Utc::now()));
        self.last = Some(Arc::clone(&result));
        Ok(result)
    }

    /// Score a dataset and make it the active batch result. The previous
    /// result is kept if the run fails.
    pub fn run_batch(&mut self, df: &DataFrame, sample_size: usize) -> Result<&BatchResult> {
        let result = evaluate_batch(&self.gateway, df, sample_size)?;
        Ok(&*self.batch.insert(result))
    }

    pub fn last_prediction(&self) -> Option<&PredictionResult> {
        self.last.as_deref()
    }

    pub fn results_log(&self) -> &ResultLog {
        &self.log
    }

    pub fn batch_result(&self) -> Option<&BatchResult> {
        self.batch.as_ref()
    }

    pub fn summary_stats(&self) -> SummaryStats {
        let single_predictions = self.log.len();
        let batch_predictions = self.batch.as_ref().map_or(0, BatchResult::rows);
        SummaryStats {
            single_predictions,
            batch_predictions,
            total: single_predictions + batch_predictions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::features::{FullFeatureVector, FEATURE_NAMES};
    use crate::gateway::test_support::*;
    use crate::model::{IntentModel, SegmentModel};
    use crate::report::analysis_report;
    use chrono::Local;
    use polars::prelude::{Column, NamedFrom, Series};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session() -> Session {
        Session::new(Arc::new(stub_gateway()))
    }

    #[test]
    fn test_analyze_appends_log() {
        let mut session = session();
        assert!(session.results_log().is_empty());
        assert!(session.last_prediction().is_none());

        let input = RawSessionInput {
            page_value: 75.0,
            ..RawSessionInput::default()
        };
        let result = session.analyze(&input).unwrap();
        assert_eq!(result.cluster_id, 0);

        let records = session.results_log().records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].purchase_probability, "0.750");
        assert_eq!(records[0].cluster_label, "High-Intent Shoppers");
        assert_eq!(records[0].features.page_values, 75.0);

        session.analyze(&RawSessionInput::default()).unwrap();
        assert_eq!(session.results_log().len(), 2);
        assert_eq!(session.summary_stats().single_predictions, 2);
    }

    struct CountingIntent(AtomicUsize);

    impl IntentModel for CountingIntent {
        fn class_probability(&self, _features: &FullFeatureVector) -> Result<f64> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(0.25)
        }

        fn predict(&self, _features: &FullFeatureVector) -> Result<u8> {
            Ok(0)
        }
    }

    struct ZeroSegments;

    impl SegmentModel for ZeroSegments {
        fn assign(&self, _features: &SubsetFeatureVector) -> Result<usize> {
            Ok(0)
        }
    }

    #[test]
    fn test_identical_input_reuses_cached_prediction() {
        let intent = Arc::new(CountingIntent(AtomicUsize::new(0)));
        let gateway = ModelGateway::from_parts(
            Arc::new(ZeroSegments),
            intent.clone(),
            Arc::new(PageValueAttributor),
        );
        let mut session = Session::new(Arc::new(gateway));

        let input = RawSessionInput::default();
        let first = session.analyze(&input).unwrap();
        let second = session.analyze(&input).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(intent.0.load(Ordering::SeqCst), 1);
        assert_eq!(session.results_log().len(), 2);

        let changed = RawSessionInput {
            weekend: true,
            ..input
        };
        session.analyze(&changed).unwrap();
        assert_eq!(intent.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_failed_analysis_not_logged() {
        let mut session = Session::new(Arc::new(ModelGateway::disabled("missing")));
        let err = session.analyze(&RawSessionInput::default()).unwrap_err();
        assert!(matches!(err, Error::ModelsUnavailable(_)));
        assert!(session.results_log().is_empty());
        assert!(session.last_prediction().is_none());
    }

    /// Refuses weekend sessions.
    struct WeekdaySegments;

    impl SegmentModel for WeekdaySegments {
        fn assign(&self, features: &SubsetFeatureVector) -> Result<usize> {
            if features.weekend == 1.0 {
                Err(Error::inference("weekend sessions not supported"))
            } else {
                Ok(0)
            }
        }
    }

    #[test]
    fn test_failed_analysis_clears_last_prediction() {
        let gateway = ModelGateway::from_parts(
            Arc::new(WeekdaySegments),
            Arc::new(PageValueIntent),
            Arc::new(PageValueAttributor),
        );
        let mut session = Session::new(Arc::new(gateway));

        session.analyze(&RawSessionInput::default()).unwrap();
        assert!(session.last_prediction().is_some());

        let weekend = RawSessionInput {
            weekend: true,
            page_value: 5.0,
            ..RawSessionInput::default()
        };
        assert!(session.analyze(&weekend).is_err());
        assert!(session.last_prediction().is_none());
        assert_eq!(session.results_log().len(), 1);

        let report = analysis_report(session.last_prediction(), &Local::now());
        assert!(report.contains("No analysis results available."));
        assert!(!report.contains("Page Value: R40.00"));

        // the earlier input is still served from the memo
        session.analyze(&RawSessionInput::default()).unwrap();
        assert_eq!(session.last_prediction().unwrap().source_features.page_values, 40.0);
    }

    fn dataset(rows: usize) -> DataFrame {
        let columns: Vec<Column> = FEATURE_NAMES
            .iter()
            .map(|name| Column::from(Series::new((*name).into(), vec![30.0; rows])))
            .collect();
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn test_batch_last_run_wins_and_failure_keeps_previous() {
        let mut session = session();
        session.run_batch(&dataset(3), 0).unwrap();
        assert_eq!(session.batch_result().unwrap().rows(), 3);

        session.run_batch(&dataset(5), 0).unwrap();
        assert_eq!(session.batch_result().unwrap().rows(), 5);

        let broken = dataset(2).drop("Month").unwrap();
        assert!(session.run_batch(&broken, 0).is_err());
        assert_eq!(session.batch_result().unwrap().rows(), 5);

        let stats = session.summary_stats();
        assert_eq!(stats.batch_predictions, 5);
        assert_eq!(stats.total, 5);
    }
}
