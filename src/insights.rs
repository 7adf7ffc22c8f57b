//! Rule-based insights and the normalized behaviour profile

use crate::features::{FullFeatureVector, FEATURE_NAMES};
use crate::gateway::PredictionResult;

/// Display maxima used to scale each feature into [0, 1], in
/// [`FEATURE_NAMES`] order.
pub const PROFILE_MAXIMA: [f64; 20] = [
    10.0,   // Administrative
    300.0,  // Administrative_Duration
    15.0,   // Informational
    500.0,  // Informational_Duration
    30.0,   // ProductRelated
    1000.0, // ProductRelated_Duration
    0.2,    // BounceRates
    0.2,    // ExitRates
    100.0,  // PageValues
    1.0,    // SpecialDay
    12.0,   // Month
    8.0,    // OperatingSystems
    13.0,   // Browser
    9.0,    // Region
    20.0,   // TrafficType
    1.0,    // Weekend
    1.0,    // VisitorType_Other
    1.0,    // VisitorType_Returning_Visitor
    2000.0, // Total_Duration
    1.0,    // Interaction_Intensity
];

/// Natural-language observations about an analysed session followed by two
/// segment-specific recommendations.
pub fn generate_insights(result: &PredictionResult) -> Vec<String> {
    let f = &result.source_features;
    let mut insights = Vec::new();

    if f.product_related_duration > 300.0 {
        insights.push("High product engagement - customer is actively researching");
    } else if f.product_related_duration < 60.0 {
        insights.push("Quick browsing pattern - may need targeted recommendations");
    }

    if f.page_values > 50.0 {
        insights.push("High-value page interactions - strong commercial intent");
    } else if f.page_values < 10.0 {
        insights.push("Low commercial engagement - consider promotional offers");
    }

    if f.exit_rates > 0.1 {
        insights.push("High exit rate - potential UX issues or price sensitivity");
    } else if f.exit_rates < 0.02 {
        insights.push("Low exit rate - engaged customer journey");
    }

    if f.bounce_rates > 0.1 {
        insights.push("High bounce rate - improve landing page experience");
    } else if f.bounce_rates < 0.01 {
        insights.push("Low bounce rate - excellent page engagement");
    }

    if f.weekend == 1.0 {
        insights.push("Weekend session - leisure browsing pattern detected");
    } else {
        insights.push("Weekday session - work-time browsing behavior");
    }

    if f.special_day > 0.5 {
        insights.push("Shopping near special day - holiday influence detected");
    }

    if result.is_high_intent() {
        insights.push("Recommendation: Send targeted product offers and limited-time discounts");
        insights.push("Consider email retargeting with abandoned cart reminders");
    } else {
        insights.push("Recommendation: Focus on brand awareness and educational content");
        insights.push("Consider welcome offers or loyalty program enrollment");
    }

    insights.into_iter().map(str::to_string).collect()
}

/// Each feature scaled by its display maximum and capped at 1.0. Labels use
/// spaces instead of underscores.
pub fn normalized_profile(features: &FullFeatureVector) -> Vec<(String, f64)> {
    FEATURE_NAMES
        .iter()
        .zip(features.to_array())
        .zip(PROFILE_MAXIMA)
        .map(|((name, value), max)| (name.replace('_', " "), (value / max).min(1.0)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{derive_features, RawSessionInput};
    use crate::gateway::test_support::stub_gateway;

    fn analyse(input: RawSessionInput) -> PredictionResult {
        let (full, subset) = derive_features(&input);
        stub_gateway().predict(&full, &subset).unwrap()
    }

    #[test]
    fn test_engaged_high_intent_session() {
        let result = analyse(RawSessionInput {
            product_duration: 600.0,
            page_value: 80.0,
            exit_rate: 0.01,
            bounce_rate: 0.005,
            weekend: true,
            special_day: 0.8,
            ..RawSessionInput::default()
        });

        let insights = generate_insights(&result);
        assert_eq!(
            insights,
            vec![
                "High product engagement - customer is actively researching",
                "High-value page interactions - strong commercial intent",
                "Low exit rate - engaged customer journey",
                "Low bounce rate - excellent page engagement",
                "Weekend session - leisure browsing pattern detected",
                "Shopping near special day - holiday influence detected",
                "Recommendation: Send targeted product offers and limited-time discounts",
                "Consider email retargeting with abandoned cart reminders",
            ]
        );
    }

    #[test]
    fn test_casual_session() {
        let result = analyse(RawSessionInput {
            product_duration: 30.0,
            page_value: 5.0,
            exit_rate: 0.2,
            bounce_rate: 0.15,
            ..RawSessionInput::default()
        });

        let insights = generate_insights(&result);
        assert!(insights.contains(&"Quick browsing pattern - may need targeted recommendations".to_string()));
        assert!(insights.contains(&"High bounce rate - improve landing page experience".to_string()));
        assert!(insights.contains(&"Weekday session - work-time browsing behavior".to_string()));
        assert_eq!(
            insights.last().map(String::as_str),
            Some("Consider welcome offers or loyalty program enrollment")
        );
    }

    #[test]
    fn test_middle_values_fire_no_behaviour_rules() {
        // default: product 150, page value 40, exit 0.03, bounce 0.01
        let insights = generate_insights(&analyse(RawSessionInput::default()));
        assert_eq!(insights.len(), 3);
        assert_eq!(insights[0], "Weekday session - work-time browsing behavior");
    }

    #[test]
    fn test_normalized_profile_capped() {
        let (full, _) = derive_features(&RawSessionInput {
            product_duration: 5000.0,
            ..RawSessionInput::default()
        });
        let profile = normalized_profile(&full);

        assert_eq!(profile.len(), 20);
        assert_eq!(profile[0].0, "Administrative");
        assert_eq!(profile[5], ("ProductRelated Duration".to_string(), 1.0));
        assert!((profile[1].1 - 0.1).abs() < 1e-12);
        assert!((profile[8].1 - 0.4).abs() < 1e-12);
        assert!(profile.iter().all(|(_, v)| *v <= 1.0));
    }
}
