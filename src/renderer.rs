// src/renderer.rs

//! Report output for a finished matrix.
//!
//! - `html`: standalone page with one line series per language, drawn by
//!   ECharts. Commits without data are gaps in every line.
//! - `json`: the matrix itself.

use crate::error::{ArborError, Result};
use crate::model::SeriesMatrix;
use palette::{Lch, Srgb, FromColor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fs;
use std::path::Path;

const ECHARTS_URL: &str = "https://cdn.jsdelivr.net/npm/echarts@5/dist/echarts.min.js";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Interactive line chart
    #[default]
    Html,
    /// Raw series matrix
    Json,
}

/// Render `matrix` and write it to `path`
pub fn write_report(matrix: &SeriesMatrix, format: ReportFormat, path: &Path) -> Result<()> {
    let body = match format {
        ReportFormat::Html => render_html(matrix),
        ReportFormat::Json => render_json(matrix),
    };
    fs::write(path, body).map_err(|source| ArborError::Report {
        path: path.to_path_buf(),
        source,
    })
}

pub fn render_json(matrix: &SeriesMatrix) -> String {
    // Plain data with string keys; serialization can't fail
    serde_json::to_string_pretty(matrix).unwrap_or_default()
}

pub fn render_html(matrix: &SeriesMatrix) -> String {
    let colors = language_colors(matrix.languages.len());
    let series: Vec<_> = matrix
        .languages
        .iter()
        .zip(&colors)
        .map(|(lang, color)| {
            json!({
                "name": lang,
                "type": "line",
                "smooth": true,
                "connectNulls": false,
                "itemStyle": { "color": color },
                "data": matrix.series(lang).unwrap_or_default(),
            })
        })
        .collect();

    let option = json!({
        "title": {
            "text": "Lines of Code Evolution",
            "subtext": "Language breakdown across commits",
            "top": "5%",
            "left": "5%",
        },
        "tooltip": { "show": true, "trigger": "axis" },
        "legend": { "show": true, "top": "5%", "right": "5%", "type": "scroll" },
        "grid": { "top": "15%", "bottom": "15%", "left": "10%", "right": "20%" },
        "xAxis": { "name": "Commits", "type": "category", "data": matrix.x_axis() },
        "yAxis": { "name": "Lines of Code", "type": "value" },
        "series": series,
    });
    // Keep the payload from closing the <script> element early
    let option = option.to_string().replace("</", "<\\/");

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Lines of Code Evolution</title>
    <script src="{ECHARTS_URL}"></script>
</head>
<body>
<div id="chart" style="width:1200px;height:800px;"></div>
<p class="summary">{measured} of {total} commits measured across {languages} languages</p>
<script>
    var chart = echarts.init(document.getElementById("chart"));
    chart.setOption({option});
</script>
</body>
</html>
"#,
        measured = matrix.measured_rows(),
        total = matrix.rows.len(),
        languages = matrix.languages.len(),
    )
}

/// One colour per language column. The columns are sorted, so the same
/// language set always gets the same colours.
pub fn language_colors(count: usize) -> Vec<String> {
    let mut rng = StdRng::seed_from_u64(42);
    (0..count)
        .map(|_| {
            let hue = rng.gen_range(0.0f32..360.0f32);
            let color = Lch::new(65.0f32, 70.0f32, hue);
            let srgb: Srgb<f32> = Srgb::from_color(color);
            let (r, g, b) = srgb.into_components();
            format!(
                "#{:02x}{:02x}{:02x}",
                (r.clamp(0.0, 1.0) * 255.0) as u8,
                (g.clamp(0.0, 1.0) * 255.0) as u8,
                (b.clamp(0.0, 1.0) * 255.0) as u8
            )
        })
        .collect()
}
