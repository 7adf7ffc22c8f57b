//! Command-line interface definitions and argument parsing

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::features::{RawSessionInput, VisitorType};

/// Customer session analytics: segment a browsing session, estimate its
/// purchase intent and explain the estimate
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "SESSIONFORGE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding kmeans_model.json and intent_model.json
    #[arg(long, global = true, env = "SESSIONFORGE_MODELS_DIR")]
    pub models_dir: Option<PathBuf>,

    /// Directory exports are written to
    #[arg(long, global = true, env = "SESSIONFORGE_EXPORT_DIR")]
    pub export_dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyse one session entered on the command line
    Predict {
        #[command(flatten)]
        session: SessionArgs,

        /// Write an SVG chart of the feature attributions
        #[arg(long)]
        chart: Option<PathBuf>,

        /// Write the predictions, batch and report exports
        #[arg(long)]
        export: bool,
    },

    /// Score a CSV dataset
    Batch {
        #[command(flatten)]
        dataset: DatasetArgs,

        /// Write an SVG chart of segment and intent counts
        #[arg(long)]
        chart: Option<PathBuf>,

        #[arg(long)]
        export: bool,
    },

    /// Analyse a JSON array of sessions, optionally score a dataset, and
    /// export everything
    Session {
        /// JSON file containing an array of session objects
        #[arg(short, long)]
        inputs: PathBuf,

        /// Also score the configured dataset
        #[arg(long)]
        with_batch: bool,

        #[command(flatten)]
        dataset: DatasetArgs,
    },
}

#[derive(clap::Args, Debug, Clone, Default)]
pub struct DatasetArgs {
    /// CSV dataset to score
    #[arg(short, long, env = "SESSIONFORGE_DATASET")]
    pub dataset: Option<PathBuf>,

    /// Rows to sample; 0 scores every row
    #[arg(short = 'n', long, env = "SESSIONFORGE_SAMPLE_SIZE")]
    pub sample_size: Option<usize>,
}

/// Session metrics as entered on the command line
#[derive(clap::Args, Debug, Clone)]
pub struct SessionArgs {
    /// Seconds on administrative pages
    #[arg(long, default_value_t = 30.0)]
    pub admin_duration: f64,

    /// Seconds on product pages
    #[arg(long, default_value_t = 150.0)]
    pub product_duration: f64,

    /// Seconds on informational pages
    #[arg(long, default_value_t = 60.0)]
    pub info_duration: f64,

    #[arg(long, default_value_t = 0.01)]
    pub bounce_rate: f64,

    #[arg(long, default_value_t = 0.03)]
    pub exit_rate: f64,

    /// Average page value
    #[arg(long, default_value_t = 40.0)]
    pub page_value: f64,

    /// Proximity to a special day, 0 to 1
    #[arg(long, default_value_t = 0.0)]
    pub special_day: f64,

    #[arg(long)]
    pub weekend: bool,

    /// Month, 1-12
    #[arg(long, default_value_t = 6)]
    pub month: u8,

    /// new, returning or other
    #[arg(long, default_value = "new")]
    pub visitor_type: VisitorType,

    #[arg(long, default_value_t = 2)]
    pub traffic_type: u32,

    /// Engagement score, 0 to 1
    #[arg(long, default_value_t = 0.8)]
    pub interaction_intensity: f64,
}

impl SessionArgs {
    /// Convert to a validated session input
    pub fn to_input(&self) -> crate::Result<RawSessionInput> {
        let input = RawSessionInput {
            admin_duration: self.admin_duration,
            product_duration: self.product_duration,
            info_duration: self.info_duration,
            bounce_rate: self.bounce_rate,
            exit_rate: self.exit_rate,
            page_value: self.page_value,
            special_day: self.special_day,
            weekend: self.weekend,
            month: self.month,
            visitor_type: self.visitor_type,
            traffic_type: self.traffic_type,
            interaction_intensity: self.interaction_intensity,
        };
        input.validate()?;
        Ok(input)
    }
}

impl Args {
    /// Configuration file (or defaults) with command-line and environment
    /// overrides applied.
    pub fn resolve_config(&self) -> crate::Result<Config> {
        let mut config = Config::load_or_default(self.config.as_deref())?;

        if let Some(dir) = &self.models_dir {
            config.models_dir = dir.clone();
        }
        if let Some(dir) = &self.export_dir {
            config.export_dir = dir.clone();
        }

        let dataset = match &self.command {
            Command::Batch { dataset, .. } | Command::Session { dataset, .. } => Some(dataset),
            Command::Predict { .. } => None,
        };
        if let Some(dataset) = dataset {
            if let Some(path) = &dataset.dataset {
                config.dataset_path = path.clone();
            }
            if let Some(n) = dataset.sample_size {
                config.sample_size = n;
            }
        }

        Ok(config)
    }
}
