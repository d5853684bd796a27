//! Report document model shared by the composer and the PDF emitter

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A rendered chart raster
///
/// `rgb` holds raw 8-bit RGB pixels (row-major, `width * height * 3` bytes),
/// which the PDF emitter embeds directly. `png` is the same image encoded for
/// attachments and previews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartImage {
    pub id: String,
    pub title: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub rgb: Vec<u8>,
    #[serde(skip)]
    pub png: Vec<u8>,
}

impl ChartImage {
    /// PNG bytes as standard base64
    pub fn png_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.png)
    }

    /// True when the raw buffer matches the declared dimensions
    pub fn is_well_formed(&self) -> bool {
        self.width > 0
            && self.height > 0
            && self.rgb.len() == (self.width as usize) * (self.height as usize) * 3
    }
}

/// One report section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub heading: String,
    /// Paragraphs separated by blank lines; lines starting with "- " are bullets
    pub body_text: String,
    /// Id of a chart in `ReportDocument::charts`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart_ref: Option<String>,
}

impl Section {
    pub fn new(heading: impl Into<String>, body_text: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body_text: body_text.into(),
            chart_ref: None,
        }
    }

    pub fn with_chart(mut self, chart_id: impl Into<String>) -> Self {
        self.chart_ref = Some(chart_id.into());
        self
    }
}

/// A composed report ready for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub title: String,
    pub subtitle: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<Section>,
    pub charts: Vec<ChartImage>,
    /// Notes about things left out of the report (skipped charts, truncation)
    pub notes: Vec<String>,
}

impl ReportDocument {
    pub fn chart(&self, id: &str) -> Option<&ChartImage> {
        self.charts.iter().find(|c| c.id == id)
    }
}
