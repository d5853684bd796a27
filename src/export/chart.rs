//! Chart rendering
//!
//! Draws bar, horizontal bar and line charts as RGB rasters and PNG images.
//!
//! # Limitations
//!
//! **No text is drawn on charts.** Titles, axis labels and values live in the
//! caption and the surrounding report text, which keeps the renderer free of
//! font handling.

use std::collections::BTreeMap;
use std::cmp::Ordering;

use image::{ImageEncoder, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::{ExportError, ExportResult};
use super::is_money_column;
use crate::catalog::{ChartKind, ChartSource, ChartSpec, ReportSchema};
use crate::models::{AnalysisResult, ChartImage, NormalizedTable, Value, round2};

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);

/// Chart size and colors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartStyle {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Series color in hex format (e.g., "#0066CC")
    #[serde(default = "default_color")]
    pub color: String,
}

fn default_width() -> u32 {
    480
}

fn default_height() -> u32 {
    240
}

fn default_color() -> String {
    "#0066CC".to_string()
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            color: default_color(),
        }
    }
}

/// Result of rendering one configured chart
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOutcome {
    Rendered { image: ChartImage, caption: String },
    /// Not enough data; the report notes the reason instead
    Skipped { id: String, title: String, reason: String },
}

impl ChartOutcome {
    pub fn id(&self) -> &str {
        match self {
            ChartOutcome::Rendered { image, .. } => &image.id,
            ChartOutcome::Skipped { id, .. } => id,
        }
    }
}

/// One labelled data point
#[derive(Debug, Clone, PartialEq)]
pub struct DataPoint {
    pub label: String,
    pub value: f64,
}

/// Renders the charts a schema configures
#[derive(Debug, Clone, Default)]
pub struct ChartRenderer {
    style: ChartStyle,
}

impl ChartRenderer {
    pub fn new(style: ChartStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &ChartStyle {
        &self.style
    }

    /// Render every chart of `schema` in declaration order
    pub fn render_all(
        &self,
        schema: &ReportSchema,
        table: &NormalizedTable,
        analysis: &AnalysisResult,
    ) -> ExportResult<Vec<ChartOutcome>> {
        schema
            .charts
            .iter()
            .map(|spec| self.render(schema, spec, table, analysis))
            .collect()
    }

    /// Render one chart, or explain why it was skipped
    pub fn render(
        &self,
        schema: &ReportSchema,
        spec: &ChartSpec,
        table: &NormalizedTable,
        analysis: &AnalysisResult,
    ) -> ExportResult<ChartOutcome> {
        let points = match chart_points(spec, table, analysis) {
            Ok(points) => points,
            Err(reason) => {
                debug!(chart = %spec.id, reason = %reason, "Skipping chart");
                return Ok(ChartOutcome::Skipped {
                    id: spec.id.clone(),
                    title: spec.title.clone(),
                    reason,
                });
            }
        };

        let rgb = self.draw(spec.kind, &points)?;
        let png = encode_png(&rgb)?;
        let image = ChartImage {
            id: spec.id.clone(),
            title: spec.title.clone(),
            width: rgb.width(),
            height: rgb.height(),
            rgb: rgb.into_raw(),
            png,
        };
        Ok(ChartOutcome::Rendered {
            caption: caption(schema, spec, &points, &table.base_currency),
            image,
        })
    }

    fn draw(&self, kind: ChartKind, points: &[DataPoint]) -> ExportResult<RgbImage> {
        let (width, height) = (self.style.width, self.style.height);
        if width < 64 || height < 64 {
            return Err(ExportError::Chart(format!(
                "chart size {width}x{height} is too small"
            )));
        }
        let color = parse_hex_color(&self.style.color).unwrap_or(Rgb([0, 102, 204]));

        let mut img = RgbImage::from_pixel(width, height, WHITE);
        let plot = PlotArea::new(width, height);
        let max = points.iter().map(|p| p.value).fold(0.0_f64, f64::max);

        match kind {
            ChartKind::Bar => {
                plot.draw_grid(&mut img, false);
                let slot = plot.width() / points.len() as f32;
                let bar = (slot * 0.7).max(1.0);
                for (i, point) in points.iter().enumerate() {
                    let h = scaled(point.value, max, plot.height());
                    if h >= 1.0 {
                        let x = plot.left + i as f32 * slot + (slot - bar) / 2.0;
                        fill(&mut img, x, plot.bottom - h, bar, h, color);
                    }
                }
            }
            ChartKind::HorizontalBar => {
                plot.draw_grid(&mut img, true);
                let slot = plot.height() / points.len() as f32;
                let bar = (slot * 0.7).max(1.0);
                for (i, point) in points.iter().enumerate() {
                    let w = scaled(point.value, max, plot.width());
                    if w >= 1.0 {
                        let y = plot.top + i as f32 * slot + (slot - bar) / 2.0;
                        fill(&mut img, plot.left, y, w, bar, color);
                    }
                }
            }
            ChartKind::Line => {
                plot.draw_grid(&mut img, false);
                let step = plot.width() / (points.len().max(2) - 1) as f32;
                let coords: Vec<(f32, f32)> = points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        (
                            plot.left + i as f32 * step,
                            plot.bottom - scaled(p.value, max, plot.height()),
                        )
                    })
                    .collect();
                for pair in coords.windows(2) {
                    draw_line_segment_mut(&mut img, pair[0], pair[1], color);
                    // Second pass one pixel lower thickens the line
                    draw_line_segment_mut(
                        &mut img,
                        (pair[0].0, pair[0].1 + 1.0),
                        (pair[1].0, pair[1].1 + 1.0),
                        color,
                    );
                }
                for &(x, y) in &coords {
                    fill(&mut img, x - 3.0, y - 3.0, 7.0, 7.0, color);
                }
            }
        }

        plot.draw_axes(&mut img);
        Ok(img)
    }
}

/// Pixel bounds of the plotting area
struct PlotArea {
    left: f32,
    right: f32,
    top: f32,
    bottom: f32,
}

impl PlotArea {
    fn new(width: u32, height: u32) -> Self {
        Self {
            left: 36.0,
            right: width as f32 - 16.0,
            top: 16.0,
            bottom: height as f32 - 28.0,
        }
    }

    fn width(&self) -> f32 {
        self.right - self.left
    }

    fn height(&self) -> f32 {
        self.bottom - self.top
    }

    fn draw_grid(&self, img: &mut RgbImage, vertical: bool) {
        for step in 1..=4 {
            let f = step as f32 / 4.0;
            if vertical {
                let x = self.left + self.width() * f;
                draw_line_segment_mut(img, (x, self.top), (x, self.bottom), GRID);
            } else {
                let y = self.bottom - self.height() * f;
                draw_line_segment_mut(img, (self.left, y), (self.right, y), GRID);
            }
        }
    }

    fn draw_axes(&self, img: &mut RgbImage) {
        draw_line_segment_mut(img, (self.left, self.top), (self.left, self.bottom), AXIS);
        draw_line_segment_mut(img, (self.left, self.bottom), (self.right, self.bottom), AXIS);
        draw_hollow_rect_mut(
            img,
            Rect::at(0, 0).of_size(img.width(), img.height()),
            GRID,
        );
    }
}

fn scaled(value: f64, max: f64, extent: f32) -> f32 {
    if max <= 0.0 || value <= 0.0 {
        0.0
    } else {
        (value / max) as f32 * extent
    }
}

fn fill(img: &mut RgbImage, x: f32, y: f32, w: f32, h: f32, color: Rgb<u8>) {
    let (w, h) = (w.round().max(1.0) as u32, h.round().max(1.0) as u32);
    draw_filled_rect_mut(img, Rect::at(x.round() as i32, y.round() as i32).of_size(w, h), color);
}

fn encode_png(img: &RgbImage) -> ExportResult<Vec<u8>> {
    let mut buffer = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buffer);
    encoder
        .write_image(img.as_raw(), img.width(), img.height(), image::ColorType::Rgb8)
        .map_err(|e| ExportError::Chart(e.to_string()))?;
    Ok(buffer)
}

/// Collect the data behind a chart, or the reason it cannot be drawn
pub fn chart_points(
    spec: &ChartSpec,
    table: &NormalizedTable,
    analysis: &AnalysisResult,
) -> Result<Vec<DataPoint>, String> {
    let points = match &spec.source {
        ChartSource::GroupSum {
            group_by,
            value,
            top,
        } => {
            let group_idx = column(table, group_by)?;
            let value_idx = column(table, value)?;
            let mut sums: BTreeMap<String, f64> = BTreeMap::new();
            for row in &table.rows {
                let (Some(group), Some(amount)) = (row.values.get(group_idx), row.values.get(value_idx))
                else {
                    continue;
                };
                if let (false, Some(amount)) = (group.is_null(), amount.as_f64()) {
                    *sums.entry(group.to_string()).or_default() += amount;
                }
            }
            let mut points: Vec<DataPoint> = sums
                .into_iter()
                .map(|(label, value)| DataPoint {
                    label,
                    value: round2(value),
                })
                .collect();
            // BTreeMap order breaks ties alphabetically
            points.sort_by(|a, b| b.value.partial_cmp(&a.value).unwrap_or(Ordering::Equal));
            points.truncate((*top).max(1));
            points
        }
        ChartSource::Series { x, value } => {
            let x_idx = column(table, x)?;
            let value_idx = column(table, value)?;
            let mut series: Vec<(Value, f64)> = Vec::new();
            for row in &table.rows {
                let (Some(key), Some(amount)) = (row.values.get(x_idx), row.values.get(value_idx))
                else {
                    continue;
                };
                let Some(amount) = amount.as_f64() else {
                    continue;
                };
                if key.is_null() {
                    continue;
                }
                match series.iter_mut().find(|(k, _)| k == key) {
                    Some((_, total)) => *total += amount,
                    None => series.push((key.clone(), amount)),
                }
            }
            series.sort_by(|a, b| compare_values(&a.0, &b.0));
            if series.len() < 2 && spec.kind == ChartKind::Line {
                return Err(format!("a line chart needs at least two distinct '{x}' values"));
            }
            series
                .into_iter()
                .map(|(key, total)| DataPoint {
                    label: key.to_string(),
                    value: round2(total),
                })
                .collect()
        }
        ChartSource::Metrics { names } => names
            .iter()
            .filter_map(|name| {
                analysis.metrics.get(name).map(|&value| DataPoint {
                    label: crate::catalog::humanize(name),
                    value,
                })
            })
            .collect(),
    };

    if points.is_empty() {
        return Err("no data available".to_string());
    }
    if points.iter().all(|p| p.value <= 0.0) {
        return Err("no positive values to plot".to_string());
    }
    Ok(points)
}

fn column(table: &NormalizedTable, name: &str) -> Result<usize, String> {
    table
        .column_index(name)
        .ok_or_else(|| format!("column '{name}' is not in the table"))
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Date(x), Value::Date(y)) => x.cmp(y),
        (Value::Integer(x), Value::Integer(y)) => x.cmp(y),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => a.to_string().cmp(&b.to_string()),
        },
    }
}

/// Text describing what a chart shows
fn caption(schema: &ReportSchema, spec: &ChartSpec, points: &[DataPoint], currency: &str) -> String {
    let kind = match spec.kind {
        ChartKind::Bar => "Bar chart",
        ChartKind::HorizontalBar => "Horizontal bar chart",
        ChartKind::Line => "Line chart",
    };
    let (what, money) = match &spec.source {
        ChartSource::GroupSum {
            group_by, value, ..
        } => (
            format!("{} by {}", schema.label_for(value), schema.label_for(group_by)),
            is_money_column(schema, value),
        ),
        ChartSource::Series { x, value } => (
            format!("{} over {}", schema.label_for(value), schema.label_for(x)),
            is_money_column(schema, value),
        ),
        ChartSource::Metrics { .. } => ("analysis metrics".to_string(), false),
    };

    let mut text = format!("{kind} of {what}. Bars and points, in order:");
    for point in points {
        let value = if money {
            format!("{} {}", currency, super::format_amount(point.value))
        } else {
            super::format_amount(point.value)
        };
        text.push_str(&format!("\n- {}: {}", point.label, value));
    }
    text
}

/// Parse `#RRGGBB`
pub fn parse_hex_color(hex: &str) -> Option<Rgb<u8>> {
    let hex = hex.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    Some(Rgb([channel(0)?, channel(2)?, channel(4)?]))
}
