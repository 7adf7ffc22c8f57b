//! SVG charts using Plotters for attributions and batch outcomes

use plotters::prelude::*;
use std::path::Path;

use crate::batch::BatchResult;
use crate::error::{Error, Result};
use crate::gateway::PredictionResult;

const POSITIVE_COLOR: RGBColor = RGBColor(74, 222, 128);
const NEGATIVE_COLOR: RGBColor = RGBColor(255, 107, 107);

/// Segment and intent bar colors for the batch chart
const BATCH_COLORS: [RGBColor; 4] = [
    RGBColor(102, 126, 234),
    RGBColor(160, 174, 192),
    POSITIVE_COLOR,
    NEGATIVE_COLOR,
];

type DrawResult = std::result::Result<(), Box<dyn std::error::Error>>;

fn chart_error(e: Box<dyn std::error::Error>) -> Error {
    Error::Chart(e.to_string())
}

/// Label for a tick that falls on a category index, blank otherwise.
fn category_label(labels: &[String], position: f64) -> String {
    let index = position.round();
    if (position - index).abs() > 1e-6 || index < 0.0 {
        return String::new();
    }
    labels.get(index as usize).cloned().unwrap_or_default()
}

/// Horizontal bar per feature attribution, green when it pushes towards a
/// purchase and red otherwise, with a vertical zero line.
///
/// # Arguments
/// * `result` - Analysed session whose attributions are drawn
/// * `output_path` - Path of the SVG file to write
pub fn render_attribution_chart(result: &PredictionResult, output_path: &Path) -> Result<()> {
    draw_attributions(result, output_path).map_err(chart_error)?;
    tracing::info!(path = %output_path.display(), "attribution chart saved");
    Ok(())
}

fn draw_attributions(result: &PredictionResult, output_path: &Path) -> DrawResult {
    let labels: Vec<String> = result
        .attributions
        .iter()
        .map(|(name, _)| name.replace('_', " "))
        .collect();
    let n = labels.len().max(1) as f64;

    let extent = result
        .attributions
        .iter()
        .map(|(_, value)| value.abs())
        .fold(0.0_f64, f64::max);
    let extent = if extent > 0.0 { extent * 1.15 } else { 1.0 };

    let root = SVGBackend::new(output_path, (900, 650)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Feature Importance Analysis", ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(45)
        .y_label_area_size(210)
        .build_cartesian_2d(-extent..extent, -0.5..(n - 0.5))?;

    chart
        .configure_mesh()
        .x_desc("SHAP Value (Impact on Purchase Intent)")
        .y_labels(labels.len())
        .y_label_formatter(&|y| category_label(&labels, *y))
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    chart.draw_series(result.attributions.iter().enumerate().map(|(i, (_, value))| {
        let y = i as f64;
        let color = if *value < 0.0 { NEGATIVE_COLOR } else { POSITIVE_COLOR };
        Rectangle::new([(0.0, y - 0.35), (*value, y + 0.35)], color.filled())
    }))?;

    chart.draw_series(LineSeries::new(
        vec![(0.0, -0.5), (0.0, n - 0.5)],
        BLACK.stroke_width(1),
    ))?;

    root.present()?;
    Ok(())
}

/// Bar chart of segment and intent counts of one batch run.
pub fn render_batch_chart(batch: &BatchResult, output_path: &Path) -> Result<()> {
    draw_batch(batch, output_path).map_err(chart_error)?;
    tracing::info!(path = %output_path.display(), "batch chart saved");
    Ok(())
}

fn draw_batch(batch: &BatchResult, output_path: &Path) -> DrawResult {
    let summary = &batch.summary;
    let counts = [
        ("High-Intent", summary.high_intent),
        ("Casual", summary.total_rows - summary.high_intent),
        ("Likely", summary.likely_purchase),
        ("Unlikely", summary.total_rows - summary.likely_purchase),
    ];
    let labels: Vec<String> = counts.iter().map(|(name, _)| name.to_string()).collect();
    let max_count = counts.iter().map(|(_, c)| *c).max().unwrap_or(0).max(1) as f64;

    let root = SVGBackend::new(output_path, (700, 450)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Batch Outcomes ({} sessions)", summary.total_rows),
            ("sans-serif", 24),
        )
        .margin(15)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(-0.5..(counts.len() as f64 - 0.5), 0.0..(max_count * 1.1))?;

    chart
        .configure_mesh()
        .x_labels(counts.len())
        .x_label_formatter(&|x| category_label(&labels, *x))
        .y_desc("Sessions")
        .axis_desc_style(("sans-serif", 14))
        .draw()?;

    chart.draw_series(counts.iter().enumerate().map(|(i, (_, count))| {
        let x = i as f64;
        Rectangle::new(
            [(x - 0.35, 0.0), (x + 0.35, *count as f64)],
            BATCH_COLORS[i].filled(),
        )
    }))?;

    root.present()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::evaluate_batch;
    use crate::features::{derive_features, RawSessionInput, FEATURE_NAMES};
    use crate::gateway::test_support::stub_gateway;
    use polars::prelude::{Column, DataFrame, NamedFrom, Series};
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_category_label() {
        let labels = vec!["a".to_string(), "b".to_string()];
        assert_eq!(category_label(&labels, 0.0), "a");
        assert_eq!(category_label(&labels, 1.0), "b");
        assert_eq!(category_label(&labels, 0.5), "");
        assert_eq!(category_label(&labels, 2.0), "");
        assert_eq!(category_label(&labels, -1.0), "");
    }

    #[test]
    fn test_render_attribution_chart() {
        let (full, subset) = derive_features(&RawSessionInput {
            page_value: 90.0,
            bounce_rate: 0.2,
            ..RawSessionInput::default()
        });
        let result = stub_gateway().predict(&full, &subset).unwrap();

        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("attributions.svg");
        render_attribution_chart(&result, &output_path).unwrap();

        let svg = fs::read_to_string(&output_path).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn test_render_batch_chart() {
        let columns: Vec<Column> = FEATURE_NAMES
            .iter()
            .map(|name| {
                let values = if *name == "PageValues" {
                    vec![5.0, 60.0, 90.0]
                } else {
                    vec![1.0; 3]
                };
                Column::from(Series::new((*name).into(), values))
            })
            .collect();
        let df = DataFrame::new(columns).unwrap();
        let batch = evaluate_batch(&stub_gateway(), &df, 0).unwrap();

        let temp_dir = tempdir().unwrap();
        let output_path = temp_dir.path().join("batch.svg");
        render_batch_chart(&batch, &output_path).unwrap();
        assert!(output_path.exists());
    }
}
