//! SessionForge: customer session analytics
//!
//! Turns raw browsing-session metrics into the feature vectors expected by a
//! pretrained segmentation model and a pretrained purchase-intent classifier,
//! explains the classifier with exact TreeSHAP attributions, scores tabular
//! datasets in batch, and renders CSV and text exports.

pub mod batch;
pub mod cli;
pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod features;
pub mod gateway;
pub mod insights;
pub mod model;
pub mod report;
pub mod session;
pub mod viz;

// Re-export public items for easier access
pub use batch::{evaluate_batch, BatchResult, BatchSummary};
pub use config::Config;
pub use data::{load_dataset, DatasetInfo};
pub use ensemble::{TreeEnsemble, TreeShapExplainer};
pub use error::{Error, Result};
pub use features::{derive_features, FullFeatureVector, RawSessionInput, SubsetFeatureVector, VisitorType};
pub use gateway::{ModelGateway, ModelPaths, PredictionResult};
pub use insights::{generate_insights, normalized_profile};
pub use model::KMeansModel;
pub use session::Session;
