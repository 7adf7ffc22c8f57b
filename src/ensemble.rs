//! Gradient-boosted tree classifier and its TreeSHAP explainer
//!
//! The artifact is a JSON dump of a binary logistic tree ensemble:
//!
//! ```json
//! {
//!   "feature_names": ["Administrative", "..."],
//!   "layout_hash": 1234567890,
//!   "base_margin": -1.2,
//!   "threshold": 0.5,
//!   "trees": [
//!     { "nodes": [
//!         { "feature": 8, "threshold": 12.5, "left": 1, "right": 2, "cover": 100.0 },
//!         { "value": -0.4, "cover": 70.0 },
//!         { "value": 0.9, "cover": 30.0 }
//!     ] }
//!   ]
//! }
//! ```
//!
//! Split nodes send a sample left when `x < threshold`; a missing (NaN)
//! value follows `default_left`. Node 0 is the root and children always have
//! a larger index than their parent.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::features::{layout_hash, FullFeatureVector, FEATURE_NAMES, FULL_FEATURE_COUNT};
use crate::model::{Attribution, Attributor, IntentModel};

/// Relative tolerance when checking that child covers add up to the parent.
const COVER_TOLERANCE: f64 = 1e-3;

fn default_true() -> bool {
    true
}

fn default_threshold() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default = "default_true")]
        default_left: bool,
        cover: f64,
    },
    Leaf {
        value: f64,
        cover: f64,
    },
}

impl Node {
    /// Number of training samples (or hessian mass) that reached the node.
    pub fn cover(&self) -> f64 {
        match self {
            Node::Split { cover, .. } | Node::Leaf { cover, .. } => *cover,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn validate(&self, tree_idx: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(Error::schema(format!("tree {} has no nodes", tree_idx)));
        }

        for (idx, node) in self.nodes.iter().enumerate() {
            if !(node.cover() > 0.0) {
                return Err(Error::schema(format!(
                    "tree {} node {} has non-positive cover",
                    tree_idx, idx
                )));
            }

            if let Node::Split {
                feature,
                left,
                right,
                cover,
                ..
            } = node
            {
                if *feature >= FULL_FEATURE_COUNT {
                    return Err(Error::schema(format!(
                        "tree {} node {} splits on feature {} of {}",
                        tree_idx, idx, feature, FULL_FEATURE_COUNT
                    )));
                }
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(Error::schema(format!(
                            "tree {} node {} has invalid child index {}",
                            tree_idx, idx, child
                        )));
                    }
                }
                let children = self.nodes[*left].cover() + self.nodes[*right].cover();
                if (children - cover).abs() > COVER_TOLERANCE * cover {
                    return Err(Error::schema(format!(
                        "tree {} node {} cover {} does not match children {}",
                        tree_idx, idx, cover, children
                    )));
                }
            }
        }

        Ok(())
    }

    fn goes_left(x: f64, threshold: f64, default_left: bool) -> bool {
        if x.is_nan() {
            default_left
        } else {
            x < threshold
        }
    }

    /// Value of the leaf a sample lands in.
    pub fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value, .. } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                    ..
                } => {
                    idx = if Self::goes_left(x[*feature], *threshold, *default_left) {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Cover-weighted mean leaf value below `idx`.
    fn expected_value(&self, idx: usize) -> f64 {
        match &self.nodes[idx] {
            Node::Leaf { value, .. } => *value,
            Node::Split {
                left, right, cover, ..
            } => {
                let l = self.nodes[*left].cover() * self.expected_value(*left);
                let r = self.nodes[*right].cover() * self.expected_value(*right);
                (l + r) / cover
            }
        }
    }
}

/// Binary logistic tree ensemble
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub feature_names: Vec<String>,
    /// [`layout_hash`] of the feature layout the ensemble was trained on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_hash: Option<u32>,
    /// Margin (log-odds) added before any tree
    #[serde(default)]
    pub base_margin: f64,
    /// Probability at or above which the hard label is 1
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn validate(&self) -> Result<()> {
        if !self.feature_names.is_empty() && self.feature_names != FEATURE_NAMES {
            return Err(Error::schema(format!(
                "classifier was trained on {:?}, expected {:?}",
                self.feature_names, FEATURE_NAMES
            )));
        }
        if let Some(hash) = self.layout_hash {
            if hash != layout_hash() {
                return Err(Error::schema(format!(
                    "classifier layout hash {:08x} does not match {:08x}",
                    hash,
                    layout_hash()
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::schema(format!(
                "decision threshold {} outside [0, 1]",
                self.threshold
            )));
        }
        for (idx, tree) in self.trees.iter().enumerate() {
            tree.validate(idx)?;
        }
        Ok(())
    }

    /// Load and validate a JSON artifact.
    pub fn load(path: &Path) -> Result<Self> {
        let artifact_error = |reason: String| Error::ArtifactLoad {
            path: path.display().to_string(),
            reason,
        };

        let raw = fs::read_to_string(path).map_err(|e| artifact_error(e.to_string()))?;
        let ensemble: TreeEnsemble =
            serde_json::from_str(&raw).map_err(|e| artifact_error(e.to_string()))?;
        ensemble.validate()?;
        Ok(ensemble)
    }

    /// Raw log-odds output.
    pub fn margin(&self, features: &FullFeatureVector) -> f64 {
        let x = features.to_array();
        self.base_margin + self.trees.iter().map(|t| t.leaf_value(&x)).sum::<f64>()
    }

    /// Mean margin over the training distribution, as seen through covers.
    pub fn expected_margin(&self) -> f64 {
        self.base_margin + self.trees.iter().map(|t| t.expected_value(0)).sum::<f64>()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

impl IntentModel for TreeEnsemble {
    fn class_probability(&self, features: &FullFeatureVector) -> Result<f64> {
        let margin = self.margin(features);
        if !margin.is_finite() {
            return Err(Error::inference(format!("non-finite margin {}", margin)));
        }
        Ok(sigmoid(margin))
    }

    fn predict(&self, features: &FullFeatureVector) -> Result<u8> {
        let probability = self.class_probability(features)?;
        Ok(u8::from(probability >= self.threshold))
    }
}

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero_fraction: f64,
    one_fraction: f64,
    weight: f64,
}

fn extend_path(path: &mut Vec<PathElement>, zero_fraction: f64, one_fraction: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero_fraction,
        one_fraction,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });

    let scale = depth as f64 + 1.0;
    for i in (0..depth).rev() {
        path[i + 1].weight += one_fraction * path[i].weight * (i as f64 + 1.0) / scale;
        path[i].weight = zero_fraction * path[i].weight * (depth - i) as f64 / scale;
    }
}

fn unwind_path(path: &mut Vec<PathElement>, index: usize) {
    let depth = path.len() - 1;
    let one_fraction = path[index].one_fraction;
    let zero_fraction = path[index].zero_fraction;
    let scale = depth as f64 + 1.0;

    let mut next = path[depth].weight;
    for j in (0..depth).rev() {
        if one_fraction != 0.0 {
            let tmp = path[j].weight;
            path[j].weight = next * scale / ((j as f64 + 1.0) * one_fraction);
            next = tmp - path[j].weight * zero_fraction * (depth - j) as f64 / scale;
        } else {
            path[j].weight = path[j].weight * scale / (zero_fraction * (depth - j) as f64);
        }
    }

    // weights stay in place; only the feature data shifts down
    for j in index..depth {
        path[j].feature = path[j + 1].feature;
        path[j].zero_fraction = path[j + 1].zero_fraction;
        path[j].one_fraction = path[j + 1].one_fraction;
    }
    path.pop();
}

fn unwound_sum(path: &[PathElement], index: usize) -> f64 {
    let mut scratch = path.to_vec();
    unwind_path(&mut scratch, index);
    scratch.iter().map(|e| e.weight).sum()
}

/// Exact path-dependent TreeSHAP values for a [`TreeEnsemble`], in margin
/// (log-odds) space. For every input the values satisfy
/// `expected_value + sum(values) == margin`.
#[derive(Debug, Clone)]
pub struct TreeShapExplainer {
    ensemble: Arc<TreeEnsemble>,
    expected_value: f64,
}

impl TreeShapExplainer {
    pub fn new(ensemble: Arc<TreeEnsemble>) -> Self {
        let expected_value = ensemble.expected_margin();
        Self {
            ensemble,
            expected_value,
        }
    }

    pub fn expected_value(&self) -> f64 {
        self.expected_value
    }

    pub fn shap_values(&self, x: &[f64]) -> Vec<f64> {
        let mut phi = vec![0.0; FULL_FEATURE_COUNT];
        for tree in &self.ensemble.trees {
            let path = Vec::with_capacity(16);
            recurse(tree, 0, x, &mut phi, path, 1.0, 1.0, None);
        }
        phi
    }
}

#[allow(clippy::too_many_arguments)]
fn recurse(
    tree: &Tree,
    idx: usize,
    x: &[f64],
    phi: &mut [f64],
    mut path: Vec<PathElement>,
    zero_fraction: f64,
    one_fraction: f64,
    feature: Option<usize>,
) {
    extend_path(&mut path, zero_fraction, one_fraction, feature);

    match &tree.nodes[idx] {
        Node::Leaf { value, .. } => {
            for i in 1..path.len() {
                let element = path[i];
                if let Some(f) = element.feature {
                    let weight = unwound_sum(&path, i);
                    phi[f] += weight * (element.one_fraction - element.zero_fraction) * value;
                }
            }
        }
        Node::Split {
            feature: split_feature,
            threshold,
            left,
            right,
            default_left,
            cover,
        } => {
            let (hot, cold) = if Tree::goes_left(x[*split_feature], *threshold, *default_left) {
                (*left, *right)
            } else {
                (*right, *left)
            };

            let mut incoming_zero = 1.0;
            let mut incoming_one = 1.0;
            if let Some(k) = path.iter().position(|e| e.feature == Some(*split_feature)) {
                incoming_zero = path[k].zero_fraction;
                incoming_one = path[k].one_fraction;
                unwind_path(&mut path, k);
            }

            let hot_zero = incoming_zero * tree.nodes[hot].cover() / cover;
            let cold_zero = incoming_zero * tree.nodes[cold].cover() / cover;
            recurse(tree, hot, x, phi, path.clone(), hot_zero, incoming_one, Some(*split_feature));
            recurse(tree, cold, x, phi, path, cold_zero, 0.0, Some(*split_feature));
        }
    }
}

impl Attributor for TreeShapExplainer {
    fn attribute(&self, features: &FullFeatureVector) -> Result<Attribution> {
        let values = self.shap_values(&features.to_array());
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::inference("attribution produced non-finite values"));
        }
        Ok(Attribution {
            expected_value: self.expected_value,
            values,
        })
    }
}
