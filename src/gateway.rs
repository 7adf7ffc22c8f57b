//! Model gateway owning the segmentation model, the intent classifier and
//! the attribution explainer.
//!
//! Artifacts are loaded once. If any of them fails to load the gateway is
//! disabled for the rest of the process and every request fails fast with
//! [`Error::ModelsUnavailable`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ensemble::{TreeEnsemble, TreeShapExplainer};
use crate::error::{Error, Result};
use crate::features::{
    layout_hash, FullFeatureVector, SubsetFeatureVector, FEATURE_NAMES, FULL_FEATURE_COUNT,
};
use crate::model::{Attributor, IntentModel, KMeansModel, SegmentModel};

pub const HIGH_INTENT_LABEL: &str = "High-Intent Shoppers";
pub const CASUAL_LABEL: &str = "Casual Browsers";
pub const LIKELY_LABEL: &str = "Likely to Purchase";
pub const UNLIKELY_LABEL: &str = "Unlikely to Purchase";

/// Segment name for a cluster id. Cluster 0 is the high-intent segment by
/// training convention.
pub fn cluster_label(cluster_id: usize) -> &'static str {
    if cluster_id == 0 {
        HIGH_INTENT_LABEL
    } else {
        CASUAL_LABEL
    }
}

/// Intent name for a hard classifier label.
pub fn purchase_label(hard_label: u8) -> &'static str {
    if hard_label == 1 {
        LIKELY_LABEL
    } else {
        UNLIKELY_LABEL
    }
}

/// Locations of the model artifacts.
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub segment_model: PathBuf,
    pub intent_model: PathBuf,
}

impl ModelPaths {
    pub const SEGMENT_FILE: &'static str = "kmeans_model.json";
    pub const INTENT_FILE: &'static str = "intent_model.json";

    pub fn in_dir(dir: &Path) -> Self {
        Self {
            segment_model: dir.join(Self::SEGMENT_FILE),
            intent_model: dir.join(Self::INTENT_FILE),
        }
    }
}

/// Cluster and intent outcome without attributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Score {
    pub cluster_id: usize,
    pub purchase_probability: f64,
    pub hard_label: u8,
}

impl Score {
    pub fn cluster_label(&self) -> &'static str {
        cluster_label(self.cluster_id)
    }

    pub fn purchase_label(&self) -> &'static str {
        purchase_label(self.hard_label)
    }
}

/// Full outcome of analysing one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    pub cluster_id: usize,
    pub cluster_label: String,
    pub purchase_probability: f64,
    pub purchase_label: String,
    /// Feature contributions in full-vector order
    pub attributions: Vec<(String, f64)>,
    /// Explainer output when no feature is known
    pub expected_value: f64,
    pub source_features: FullFeatureVector,
    pub subset_features: SubsetFeatureVector,
    pub generated_at: DateTime<Utc>,
}

impl PredictionResult {
    pub fn is_high_intent(&self) -> bool {
        self.cluster_id == 0
    }
}

struct LoadedModels {
    segment: Arc<dyn SegmentModel>,
    intent: Arc<dyn IntentModel>,
    explainer: Arc<dyn Attributor>,
}

enum GatewayState {
    Ready(LoadedModels),
    Disabled { reason: String },
}

/// Ready/disabled summary for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayStatus {
    pub models_loaded: bool,
    pub reason: Option<String>,
}

pub struct ModelGateway {
    state: GatewayState,
}

impl std::fmt::Debug for ModelGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelGateway")
            .field("status", &self.status())
            .finish()
    }
}

impl ModelGateway {
    /// Load both artifacts and bind a TreeSHAP explainer to the classifier.
    /// Never fails: a load error yields a disabled gateway.
    pub fn load(paths: &ModelPaths) -> Self {
        match Self::try_load(paths) {
            Ok(gateway) => {
                tracing::info!(
                    segment = %paths.segment_model.display(),
                    intent = %paths.intent_model.display(),
                    layout = %format!("{:08x}", layout_hash()),
                    "models loaded"
                );
                gateway
            }
            Err(e) => {
                tracing::warn!(error = %e, "model loading failed, predictions disabled");
                Self::disabled(e.to_string())
            }
        }
    }

    fn try_load(paths: &ModelPaths) -> Result<Self> {
        let segment = KMeansModel::load(&paths.segment_model)?;
        let intent = Arc::new(TreeEnsemble::load(&paths.intent_model)?);
        let explainer = TreeShapExplainer::new(intent.clone());
        Ok(Self::from_parts(Arc::new(segment), intent, Arc::new(explainer)))
    }

    /// Build a ready gateway from any model implementations.
    pub fn from_parts(
        segment: Arc<dyn SegmentModel>,
        intent: Arc<dyn IntentModel>,
        explainer: Arc<dyn Attributor>,
    ) -> Self {
        Self {
            state: GatewayState::Ready(LoadedModels {
                segment,
                intent,
                explainer,
            }),
        }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            state: GatewayState::Disabled {
                reason: reason.into(),
            },
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, GatewayState::Ready(_))
    }

    pub fn status(&self) -> GatewayStatus {
        match &self.state {
            GatewayState::Ready(_) => GatewayStatus {
                models_loaded: true,
                reason: None,
            },
            GatewayState::Disabled { reason } => GatewayStatus {
                models_loaded: false,
                reason: Some(reason.clone()),
            },
        }
    }

    fn models(&self) -> Result<&LoadedModels> {
        match &self.state {
            GatewayState::Ready(models) => Ok(models),
            GatewayState::Disabled { reason } => Err(Error::ModelsUnavailable(reason.clone())),
        }
    }

    /// Segment and intent for one session, without attributions.
    pub fn score(&self, full: &FullFeatureVector, subset: &SubsetFeatureVector) -> Result<Score> {
        let models = self.models()?;

        let cluster_id = models.segment.assign(subset)?;
        let purchase_probability = models.intent.class_probability(full)?;
        if !(0.0..=1.0).contains(&purchase_probability) {
            return Err(Error::inference(format!(
                "classifier returned probability {} outside [0, 1]",
                purchase_probability
            )));
        }
        let hard_label = models.intent.predict(full)?;

        Ok(Score {
            cluster_id,
            purchase_probability,
            hard_label,
        })
    }

    /// Segment, intent and attributions for one session. Either every step
    /// succeeds or nothing is returned.
    pub fn predict(
        &self,
        full: &FullFeatureVector,
        subset: &SubsetFeatureVector,
    ) -> Result<PredictionResult> {
        let score = self.score(full, subset)?;
        let attribution = self.models()?.explainer.attribute(full)?;

        if attribution.values.len() != FULL_FEATURE_COUNT {
            return Err(Error::schema(format!(
                "explainer returned {} attributions for {} features",
                attribution.values.len(),
                FULL_FEATURE_COUNT
            )));
        }

        tracing::debug!(
            cluster = score.cluster_id,
            probability = score.purchase_probability,
            "session scored"
        );

        Ok(PredictionResult {
            cluster_id: score.cluster_id,
            cluster_label: score.cluster_label().to_string(),
            purchase_probability: score.purchase_probability,
            purchase_label: score.purchase_label().to_string(),
            attributions: FEATURE_NAMES
                .iter()
                .map(|name| name.to_string())
                .zip(attribution.values)
                .collect(),
            expected_value: attribution.expected_value,
            source_features: *full,
            subset_features: *subset,
            generated_at: Utc::now(),
        })
    }
}
