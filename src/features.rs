//! Feature derivation from raw session metrics
//!
//! A raw session is turned into two model-specific views: the 20-field
//! [`FullFeatureVector`] consumed by the purchase-intent classifier and its
//! explainer, and the 9-field [`SubsetFeatureVector`] consumed by the
//! clustering model. The subset is always a projection of the full vector
//! computed in the same call, so both models see the same session.

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Column names of the full feature vector, in the order the classifier
/// was trained with. The classifier is order-sensitive.
pub const FEATURE_NAMES: [&str; FULL_FEATURE_COUNT] = [
    "Administrative",
    "Administrative_Duration",
    "Informational",
    "Informational_Duration",
    "ProductRelated",
    "ProductRelated_Duration",
    "BounceRates",
    "ExitRates",
    "PageValues",
    "SpecialDay",
    "Month",
    "OperatingSystems",
    "Browser",
    "Region",
    "TrafficType",
    "Weekend",
    "VisitorType_Other",
    "VisitorType_Returning_Visitor",
    "Total_Duration",
    "Interaction_Intensity",
];

/// Column names of the clustering subset, in clustering-model order.
pub const SUBSET_FEATURE_NAMES: [&str; SUBSET_FEATURE_COUNT] = [
    "Administrative_Duration",
    "ProductRelated_Duration",
    "Informational_Duration",
    "BounceRates",
    "ExitRates",
    "PageValues",
    "SpecialDay",
    "Weekend",
    "Interaction_Intensity",
];

pub const FULL_FEATURE_COUNT: usize = 20;
pub const SUBSET_FEATURE_COUNT: usize = 9;

/// Approximate dwell time per administrative page, in seconds.
pub const ADMIN_SECONDS_PER_PAGE: f64 = 30.0;
/// Approximate dwell time per product page, in seconds.
pub const PRODUCT_SECONDS_PER_PAGE: f64 = 45.0;
/// Approximate dwell time per informational page, in seconds.
pub const INFO_SECONDS_PER_PAGE: f64 = 60.0;

// Training-schema placeholders for attributes the form never collects.
pub const DEFAULT_OPERATING_SYSTEM: f64 = 2.0;
pub const DEFAULT_BROWSER: f64 = 1.0;
pub const DEFAULT_REGION: f64 = 3.0;

/// CRC32 of the full feature layout. Two artifacts trained on the same
/// layout report the same hash.
pub fn layout_hash() -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(&[FULL_FEATURE_COUNT as u8]);
    for name in FEATURE_NAMES {
        hasher.update(name.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize()
}

/// Visitor category; `New` is the implicit one-hot baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisitorType {
    #[default]
    New,
    Returning,
    Other,
}

impl fmt::Display for VisitorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VisitorType::New => "new",
            VisitorType::Returning => "returning",
            VisitorType::Other => "other",
        };
        f.write_str(name)
    }
}

impl FromStr for VisitorType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "new" => Ok(VisitorType::New),
            "returning" => Ok(VisitorType::Returning),
            "other" => Ok(VisitorType::Other),
            other => Err(Error::invalid_input(format!(
                "unknown visitor type '{}' (expected new, returning or other)",
                other
            ))),
        }
    }
}

/// One manually entered browsing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawSessionInput {
    /// Seconds on administrative pages (account, checkout)
    pub admin_duration: f64,
    /// Seconds on product pages
    pub product_duration: f64,
    /// Seconds on informational pages
    pub info_duration: f64,
    pub bounce_rate: f64,
    pub exit_rate: f64,
    /// Average page value in currency units
    pub page_value: f64,
    /// Proximity to a special day, 0 (far) to 1 (close)
    pub special_day: f64,
    pub weekend: bool,
    /// Month of the session, 1-12
    pub month: u8,
    pub visitor_type: VisitorType,
    /// Traffic source code
    pub traffic_type: u32,
    /// Engagement score, 0-1
    pub interaction_intensity: f64,
}

impl Default for RawSessionInput {
    fn default() -> Self {
        Self {
            admin_duration: 30.0,
            product_duration: 150.0,
            info_duration: 60.0,
            bounce_rate: 0.01,
            exit_rate: 0.03,
            page_value: 40.0,
            special_day: 0.0,
            weekend: false,
            month: 6,
            visitor_type: VisitorType::New,
            traffic_type: 2,
            interaction_intensity: 0.8,
        }
    }
}

impl RawSessionInput {
    /// Check the ranges the input form enforces. [`derive_features`] does
    /// not re-check them.
    pub fn validate(&self) -> Result<()> {
        let durations = [
            ("admin_duration", self.admin_duration),
            ("product_duration", self.product_duration),
            ("info_duration", self.info_duration),
            ("page_value", self.page_value),
        ];
        for (name, value) in durations {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::invalid_input(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }

        let unit_interval = [
            ("bounce_rate", self.bounce_rate),
            ("exit_rate", self.exit_rate),
            ("special_day", self.special_day),
            ("interaction_intensity", self.interaction_intensity),
        ];
        for (name, value) in unit_interval {
            if !(0.0..=1.0).contains(&value) {
                return Err(Error::invalid_input(format!(
                    "{} must be between 0 and 1, got {}",
                    name, value
                )));
            }
        }

        if !(1..=12).contains(&self.month) {
            return Err(Error::invalid_input(format!(
                "month must be between 1 and 12, got {}",
                self.month
            )));
        }

        Ok(())
    }
}

/// Classifier view of a session. Field order matches [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FullFeatureVector {
    pub administrative: f64,
    pub administrative_duration: f64,
    pub informational: f64,
    pub informational_duration: f64,
    pub product_related: f64,
    pub product_related_duration: f64,
    pub bounce_rates: f64,
    pub exit_rates: f64,
    pub page_values: f64,
    pub special_day: f64,
    pub month: f64,
    pub operating_systems: f64,
    pub browser: f64,
    pub region: f64,
    pub traffic_type: f64,
    pub weekend: f64,
    pub visitor_type_other: f64,
    pub visitor_type_returning: f64,
    pub total_duration: f64,
    pub interaction_intensity: f64,
}

impl FullFeatureVector {
    pub fn to_array(&self) -> [f64; FULL_FEATURE_COUNT] {
        [
            self.administrative,
            self.administrative_duration,
            self.informational,
            self.informational_duration,
            self.product_related,
            self.product_related_duration,
            self.bounce_rates,
            self.exit_rates,
            self.page_values,
            self.special_day,
            self.month,
            self.operating_systems,
            self.browser,
            self.region,
            self.traffic_type,
            self.weekend,
            self.visitor_type_other,
            self.visitor_type_returning,
            self.total_duration,
            self.interaction_intensity,
        ]
    }

    /// Rebuild a vector from values laid out in [`FEATURE_NAMES`] order,
    /// e.g. one row of a batch dataset.
    pub fn from_slice(values: &[f64]) -> Result<Self> {
        if values.len() != FULL_FEATURE_COUNT {
            return Err(Error::schema(format!(
                "expected {} features, got {}",
                FULL_FEATURE_COUNT,
                values.len()
            )));
        }

        Ok(Self {
            administrative: values[0],
            administrative_duration: values[1],
            informational: values[2],
            informational_duration: values[3],
            product_related: values[4],
            product_related_duration: values[5],
            bounce_rates: values[6],
            exit_rates: values[7],
            page_values: values[8],
            special_day: values[9],
            month: values[10],
            operating_systems: values[11],
            browser: values[12],
            region: values[13],
            traffic_type: values[14],
            weekend: values[15],
            visitor_type_other: values[16],
            visitor_type_returning: values[17],
            total_duration: values[18],
            interaction_intensity: values[19],
        })
    }

    /// Feature names paired with their values, in classifier order.
    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        FEATURE_NAMES.iter().copied().zip(self.to_array()).collect()
    }
}

/// Clustering view of a session. Field order matches [`SUBSET_FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubsetFeatureVector {
    pub administrative_duration: f64,
    pub product_related_duration: f64,
    pub informational_duration: f64,
    pub bounce_rates: f64,
    pub exit_rates: f64,
    pub page_values: f64,
    pub special_day: f64,
    pub weekend: f64,
    pub interaction_intensity: f64,
}

impl SubsetFeatureVector {
    /// Project the clustering fields out of an already computed full vector.
    pub fn project(full: &FullFeatureVector) -> Self {
        Self {
            administrative_duration: full.administrative_duration,
            product_related_duration: full.product_related_duration,
            informational_duration: full.informational_duration,
            bounce_rates: full.bounce_rates,
            exit_rates: full.exit_rates,
            page_values: full.page_values,
            special_day: full.special_day,
            weekend: full.weekend,
            interaction_intensity: full.interaction_intensity,
        }
    }

    pub fn to_array(&self) -> [f64; SUBSET_FEATURE_COUNT] {
        [
            self.administrative_duration,
            self.product_related_duration,
            self.informational_duration,
            self.bounce_rates,
            self.exit_rates,
            self.page_values,
            self.special_day,
            self.weekend,
            self.interaction_intensity,
        ]
    }
}

/// Page-count proxy from dwell time. Approximate: navigation depth is not
/// measured, only estimated from a fixed seconds-per-page heuristic.
pub fn estimate_pages(duration: f64, seconds_per_page: f64) -> f64 {
    (duration / seconds_per_page).floor().max(1.0)
}

/// Derive both model views of a session.
pub fn derive_features(input: &RawSessionInput) -> (FullFeatureVector, SubsetFeatureVector) {
    let full = FullFeatureVector {
        administrative: estimate_pages(input.admin_duration, ADMIN_SECONDS_PER_PAGE),
        administrative_duration: input.admin_duration,
        informational: estimate_pages(input.info_duration, INFO_SECONDS_PER_PAGE),
        informational_duration: input.info_duration,
        product_related: estimate_pages(input.product_duration, PRODUCT_SECONDS_PER_PAGE),
        product_related_duration: input.product_duration,
        bounce_rates: input.bounce_rate,
        exit_rates: input.exit_rate,
        page_values: input.page_value,
        special_day: input.special_day,
        month: f64::from(input.month),
        operating_systems: DEFAULT_OPERATING_SYSTEM,
        browser: DEFAULT_BROWSER,
        region: DEFAULT_REGION,
        traffic_type: f64::from(input.traffic_type),
        weekend: if input.weekend { 1.0 } else { 0.0 },
        visitor_type_other: if input.visitor_type == VisitorType::Other { 1.0 } else { 0.0 },
        visitor_type_returning: if input.visitor_type == VisitorType::Returning {
            1.0
        } else {
            0.0
        },
        total_duration: input.admin_duration + input.product_duration + input.info_duration,
        interaction_intensity: input.interaction_intensity,
    };

    let subset = SubsetFeatureVector::project(&full);
    (full, subset)
}
