//! Model capabilities and the nearest-centroid segmentation model

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::features::{
    FullFeatureVector, SubsetFeatureVector, SUBSET_FEATURE_COUNT, SUBSET_FEATURE_NAMES,
};

/// Assigns a session to a customer segment.
pub trait SegmentModel: Send + Sync {
    fn assign(&self, features: &SubsetFeatureVector) -> Result<usize>;
}

/// Binary purchase-intent classifier.
pub trait IntentModel: Send + Sync {
    /// Probability of the positive (purchase) class.
    fn class_probability(&self, features: &FullFeatureVector) -> Result<f64>;

    /// Hard class label, 0 or 1.
    fn predict(&self, features: &FullFeatureVector) -> Result<u8>;
}

/// Per-feature attribution of one classifier output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribution {
    /// Model output when no feature is known
    pub expected_value: f64,
    /// One contribution per feature, in full-vector order
    pub values: Vec<f64>,
}

/// Explains classifier outputs feature by feature.
pub trait Attributor: Send + Sync {
    fn attribute(&self, features: &FullFeatureVector) -> Result<Attribution>;
}

/// Serialized form of [`KMeansModel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansArtifact {
    #[serde(default)]
    pub feature_names: Vec<String>,
    pub centroids: Vec<Vec<f64>>,
}

/// K-Means model reduced to its fitted centroids
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Cluster centroids in feature space, one row per cluster
    pub centroids: Array2<f64>,
}

impl KMeansModel {
    pub fn new(centroids: Array2<f64>) -> Result<Self> {
        if centroids.nrows() == 0 {
            return Err(Error::schema("clustering model has no centroids"));
        }
        if centroids.ncols() != SUBSET_FEATURE_COUNT {
            return Err(Error::schema(format!(
                "centroids have {} dimensions, expected {}",
                centroids.ncols(),
                SUBSET_FEATURE_COUNT
            )));
        }

        Ok(Self {
            n_clusters: centroids.nrows(),
            centroids,
        })
    }

    pub fn from_artifact(artifact: KMeansArtifact) -> Result<Self> {
        if !artifact.feature_names.is_empty() && artifact.feature_names != SUBSET_FEATURE_NAMES {
            return Err(Error::schema(format!(
                "clustering model was trained on {:?}, expected {:?}",
                artifact.feature_names, SUBSET_FEATURE_NAMES
            )));
        }

        let rows = artifact.centroids.len();
        let cols = artifact.centroids.first().map_or(0, Vec::len);
        if artifact.centroids.iter().any(|row| row.len() != cols) {
            return Err(Error::schema("centroid rows have differing lengths"));
        }

        let flat: Vec<f64> = artifact.centroids.into_iter().flatten().collect();
        let centroids = Array2::from_shape_vec((rows, cols), flat)
            .map_err(|e| Error::schema(e.to_string()))?;
        Self::new(centroids)
    }

    /// Load a JSON artifact from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::ArtifactLoad {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let artifact: KMeansArtifact =
            serde_json::from_str(&raw).map_err(|e| Error::ArtifactLoad {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
        Self::from_artifact(artifact)
    }

    /// Index of the nearest centroid
    pub fn predict(&self, features: &Array1<f64>) -> Result<usize> {
        if features.len() != self.centroids.ncols() {
            return Err(Error::schema(format!(
                "feature vector must have exactly {} dimensions, got {}",
                self.centroids.ncols(),
                features.len()
            )));
        }

        let mut min_distance = f64::INFINITY;
        let mut closest_cluster = 0;

        for (cluster_idx, centroid) in self.centroids.outer_iter().enumerate() {
            let distance = euclidean_distance(&features.view(), &centroid);
            if distance < min_distance {
                min_distance = distance;
                closest_cluster = cluster_idx;
            }
        }

        if !min_distance.is_finite() {
            return Err(Error::inference("non-finite distance to every centroid"));
        }

        Ok(closest_cluster)
    }
}

impl SegmentModel for KMeansModel {
    fn assign(&self, features: &SubsetFeatureVector) -> Result<usize> {
        self.predict(&Array1::from(features.to_array().to_vec()))
    }
}

/// Calculate Euclidean distance between two points
fn euclidean_distance(point1: &ArrayView1<f64>, point2: &ArrayView1<f64>) -> f64 {
    point1
        .iter()
        .zip(point2.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        .sqrt()
}
