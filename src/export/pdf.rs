//! PDF emitter with branding support
//!
//! Serializes a [`ReportDocument`] into PDF 1.4 bytes. Layout is done here,
//! with no external PDF library: text is set in the standard Helvetica faces
//! and charts are embedded as uncompressed RGB image XObjects.
//!
//! ## Features
//!
//! - Multi-page layout with word wrapping and page breaks
//! - Customizable header and footer
//! - Brand color for headings
//! - Page numbering ("Page 1 of 3")
//!
//! Output is a pure function of the document and the branding: the creation
//! date comes from `ReportDocument::generated_at`, never from the clock.

use base64::{Engine as _, engine::general_purpose};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::chart::parse_hex_color;
use super::error::{ExportError, ExportResult};
use crate::models::{ChartImage, ReportDocument};

const MM_TO_PT: f64 = 2.83465;
const MARGIN: f64 = 50.0;
const BULLET_INDENT: f64 = 14.0;

/// Branding configuration for PDF output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrandingConfig {
    /// Header text (appears at top of each page)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,

    /// Footer text (appears at bottom of each page)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,

    /// Primary brand color in hex format (e.g., "#0066CC")
    #[serde(default = "default_brand_color")]
    pub brand_color: String,

    /// Organization name shown under the title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,

    /// Include page numbers
    #[serde(default = "default_true")]
    pub show_page_numbers: bool,

    /// Include generation timestamp
    #[serde(default = "default_true")]
    pub show_timestamp: bool,

    /// Font size for body text (in points)
    #[serde(default = "default_font_size")]
    pub font_size: u8,

    /// Page size (A4 or Letter)
    #[serde(default)]
    pub page_size: PageSize,
}

fn default_brand_color() -> String {
    "#0066CC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_font_size() -> u8 {
    10
}

impl Default for BrandingConfig {
    fn default() -> Self {
        Self {
            header: None,
            footer: None,
            brand_color: default_brand_color(),
            company_name: None,
            show_page_numbers: default_true(),
            show_timestamp: default_true(),
            font_size: default_font_size(),
            page_size: PageSize::default(),
        }
    }
}

/// Page size options
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum PageSize {
    /// A4 paper size (210 x 297 mm)
    #[default]
    A4,
    /// US Letter size (8.5 x 11 inches)
    Letter,
}

impl PageSize {
    /// Get page dimensions in millimeters (width, height)
    pub fn dimensions_mm(&self) -> (f64, f64) {
        match self {
            PageSize::A4 => (210.0, 297.0),
            PageSize::Letter => (215.9, 279.4),
        }
    }

    /// Page dimensions in points
    pub fn dimensions_pt(&self) -> (f64, f64) {
        let (w, h) = self.dimensions_mm();
        (w * MM_TO_PT, h * MM_TO_PT)
    }
}

/// A rendered PDF
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOutput {
    pub bytes: Vec<u8>,
    pub page_count: u32,
    pub title: String,
}

impl PdfOutput {
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }

    /// Filename suggestion derived from the title
    pub fn filename(&self) -> String {
        let stem: String = self
            .title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        let stem = stem.trim_matches('_');
        if stem.is_empty() {
            "report.pdf".to_string()
        } else {
            format!("{stem}.pdf")
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Font {
    Regular,
    Bold,
}

impl Font {
    fn resource(self) -> &'static str {
        match self {
            Font::Regular => "F1",
            Font::Bold => "F2",
        }
    }
}

type Color = (f64, f64, f64);

const BLACK: Color = (0.0, 0.0, 0.0);
const GREY: Color = (0.4, 0.4, 0.4);

#[derive(Debug, Default)]
struct Page {
    ops: String,
    images: BTreeSet<usize>,
}

/// Lays blocks out top to bottom, breaking pages as needed
struct Layout {
    width: f64,
    top: f64,
    bottom: f64,
    pages: Vec<Page>,
    y: f64,
}

impl Layout {
    fn new(width: f64, top: f64, bottom: f64) -> Self {
        Self {
            width,
            top,
            bottom,
            pages: vec![Page::default()],
            y: top,
        }
    }

    fn content_width(&self) -> f64 {
        self.width - 2.0 * MARGIN
    }

    fn page(&mut self) -> &mut Page {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn at_page_top(&self) -> bool {
        (self.y - self.top).abs() < f64::EPSILON
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = self.top;
    }

    /// Make room for `height` points, breaking the page if it does not fit
    fn reserve(&mut self, height: f64) {
        if self.y - height < self.bottom && !self.at_page_top() {
            self.new_page();
        }
    }

    fn gap(&mut self, height: f64) {
        if !self.at_page_top() {
            self.y -= height;
        }
    }

    fn line(&mut self, text: &str, font: Font, size: f64, indent: f64, color: Color) {
        let leading = size * 1.3;
        self.reserve(leading);
        self.y -= leading;
        let (x, y) = (MARGIN + indent, self.y + size * 0.25);
        let op = text_op(text, font, size, x, y, color);
        self.page().ops.push_str(&op);
    }

    fn paragraph(&mut self, text: &str, font: Font, size: f64, indent: f64, color: Color) {
        let max_chars = ((self.content_width() - indent) / (size * 0.5)).max(8.0) as usize;
        for line in word_wrap(text, max_chars) {
            self.line(&line, font, size, indent, color);
        }
    }

    fn bullet(&mut self, text: &str, size: f64) {
        let max_chars = ((self.content_width() - BULLET_INDENT) / (size * 0.5)).max(8.0) as usize;
        for (i, line) in word_wrap(text, max_chars).into_iter().enumerate() {
            if i == 0 {
                let leading = size * 1.3;
                self.reserve(leading);
                let y = self.y - leading + size * 0.25;
                let op = text_op("\u{2022}", Font::Regular, size, MARGIN + 4.0, y, BLACK);
                self.page().ops.push_str(&op);
            }
            self.line(&line, Font::Regular, size, BULLET_INDENT, BLACK);
        }
    }

    fn image(&mut self, index: usize, image: &ChartImage) {
        let mut w = image.width as f64 * 0.75;
        let mut h = image.height as f64 * 0.75;
        let max_w = self.content_width();
        if w > max_w {
            h *= max_w / w;
            w = max_w;
        }
        let max_h = self.top - self.bottom;
        if h > max_h {
            w *= max_h / h;
            h = max_h;
        }

        self.reserve(h);
        self.y -= h;
        let x = MARGIN + (max_w - w) / 2.0;
        let op = format!(
            "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im{} Do Q\n",
            w, h, x, self.y, index
        );
        let page = self.page();
        page.ops.push_str(&op);
        page.images.insert(index);
    }
}

fn text_op(text: &str, font: Font, size: f64, x: f64, y: f64, color: Color) -> String {
    format!(
        "BT /{} {:.1} Tf {:.3} {:.3} {:.3} rg {:.2} {:.2} Td ({}) Tj ET\n",
        font.resource(),
        size,
        color.0,
        color.1,
        color.2,
        x,
        y,
        escape_pdf_string(text)
    )
}

/// PDF emitter with branding support
#[derive(Debug, Clone, Default)]
pub struct PdfEmitter {
    branding: BrandingConfig,
}

impl PdfEmitter {
    /// Create a new PDF emitter with default branding
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new PDF emitter with custom branding
    pub fn with_branding(branding: BrandingConfig) -> Self {
        Self { branding }
    }

    /// Get current branding configuration
    pub fn branding(&self) -> &BrandingConfig {
        &self.branding
    }

    /// Render a report document
    pub fn render(&self, doc: &ReportDocument) -> ExportResult<PdfOutput> {
        check_document(doc)?;

        let (width, height) = self.branding.page_size.dimensions_pt();
        let pages = self.layout(doc, width, height);
        let page_count = pages.len() as u32;
        let bytes = self.write_document(doc, pages, width, height)?;

        tracing::debug!(
            title = %doc.title,
            pages = page_count,
            bytes = bytes.len(),
            "Rendered PDF"
        );

        Ok(PdfOutput {
            bytes,
            page_count,
            title: doc.title.clone(),
        })
    }

    fn brand_color(&self) -> Color {
        let rgb = parse_hex_color(&self.branding.brand_color)
            .or_else(|| parse_hex_color(&default_brand_color()))
            .map(|c| c.0)
            .unwrap_or([0, 102, 204]);
        (
            rgb[0] as f64 / 255.0,
            rgb[1] as f64 / 255.0,
            rgb[2] as f64 / 255.0,
        )
    }

    fn layout(&self, doc: &ReportDocument, width: f64, height: f64) -> Vec<Page> {
        let size = self.branding.font_size.max(6) as f64;
        let brand = self.brand_color();
        let top = height - MARGIN - if self.branding.header.is_some() { 14.0 } else { 0.0 };
        let bottom = MARGIN + 14.0;
        let mut layout = Layout::new(width, top, bottom);

        // Title block
        layout.paragraph(&doc.title, Font::Bold, size * 1.8, 0.0, brand);
        if !doc.subtitle.trim().is_empty() {
            layout.paragraph(&doc.subtitle, Font::Regular, size * 1.3, 0.0, GREY);
        }
        if let Some(company) = &self.branding.company_name {
            layout.paragraph(company, Font::Regular, size, 0.0, GREY);
        }
        if self.branding.show_timestamp {
            let stamp = format!(
                "Generated {}",
                doc.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            layout.paragraph(&stamp, Font::Regular, size * 0.9, 0.0, GREY);
        }
        layout.gap(size * 1.5);

        for section in &doc.sections {
            // Keep a heading together with at least two body lines
            layout.reserve(size * 1.4 * 1.3 + size * 2.6);
            layout.paragraph(&section.heading, Font::Bold, size * 1.4, 0.0, brand);
            layout.gap(size * 0.3);

            if let Some(chart_id) = &section.chart_ref
                && let Some(index) = doc.charts.iter().position(|c| &c.id == chart_id)
            {
                layout.image(index, &doc.charts[index]);
                layout.gap(size * 0.6);
            }

            for line in section.body_text.lines() {
                let trimmed = line.trim_end();
                if trimmed.trim().is_empty() {
                    layout.gap(size * 0.6);
                } else if let Some(item) = trimmed.strip_prefix("- ") {
                    layout.bullet(item, size);
                } else {
                    layout.paragraph(trimmed, Font::Regular, size, 0.0, BLACK);
                }
            }
            layout.gap(size * 1.2);
        }

        if !doc.notes.is_empty() {
            layout.paragraph("Notes", Font::Bold, size * 1.2, 0.0, GREY);
            for note in &doc.notes {
                layout.bullet(note, size * 0.9);
            }
        }

        let mut pages = layout.pages;
        self.decorate(&mut pages, width, height, size);
        pages
    }

    /// Header, footer and page numbers, added once the page count is known
    fn decorate(&self, pages: &mut [Page], width: f64, height: f64, size: f64) {
        let total = pages.len();
        let small = (size * 0.8).max(6.0);
        for (i, page) in pages.iter_mut().enumerate() {
            if let Some(header) = &self.branding.header {
                let op = text_op(header, Font::Regular, small, MARGIN, height - MARGIN + 4.0, GREY);
                page.ops.push_str(&op);
            }
            if let Some(footer) = &self.branding.footer {
                page.ops
                    .push_str(&text_op(footer, Font::Regular, small, MARGIN, MARGIN - 16.0, GREY));
            }
            if self.branding.show_page_numbers {
                let label = format!("Page {} of {}", i + 1, total);
                // Right-aligned using the average Helvetica glyph width
                let x = width - MARGIN - label.len() as f64 * small * 0.5;
                page.ops
                    .push_str(&text_op(&label, Font::Regular, small, x, MARGIN - 16.0, GREY));
            }
        }
    }

    /// Serialize laid-out pages into a PDF 1.4 file
    fn write_document(
        &self,
        doc: &ReportDocument,
        pages: Vec<Page>,
        width: f64,
        height: f64,
    ) -> ExportResult<Vec<u8>> {
        let mut pdf = Vec::new();

        // PDF Header
        pdf.extend_from_slice(b"%PDF-1.4\n");
        pdf.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n"); // Binary marker

        // Object numbers: 1 catalog, 2 pages, 3-4 fonts, 5 info, then one per
        // image, then a page and a content stream per page
        let first_image = 6;
        let first_page = first_image + doc.charts.len();
        let page_obj = |i: usize| first_page + 2 * i;

        // Track object positions for xref
        let mut xref_positions: Vec<usize> = Vec::new();

        xref_positions.push(pdf.len());
        pdf.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");

        xref_positions.push(pdf.len());
        let kids = (0..pages.len())
            .map(|i| format!("{} 0 R", page_obj(i)))
            .collect::<Vec<_>>()
            .join(" ");
        pdf.extend_from_slice(
            format!(
                "2 0 obj\n<< /Type /Pages /Kids [{}] /Count {} >>\nendobj\n",
                kids,
                pages.len()
            )
            .as_bytes(),
        );

        xref_positions.push(pdf.len());
        pdf.extend_from_slice(
            b"3 0 obj\n<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>\nendobj\n",
        );
        xref_positions.push(pdf.len());
        pdf.extend_from_slice(
            b"4 0 obj\n<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold /Encoding /WinAnsiEncoding >>\nendobj\n",
        );

        // Info dictionary
        xref_positions.push(pdf.len());
        let creator = self
            .branding
            .company_name
            .as_deref()
            .unwrap_or("Report Pipeline");
        let mut info = format!(
            "5 0 obj\n<< /Title ({}) /Producer (report-pipeline {}) /Creator ({})",
            escape_pdf_string(&doc.title),
            env!("CARGO_PKG_VERSION"),
            escape_pdf_string(creator)
        );
        if self.branding.show_timestamp {
            info.push_str(&format!(
                " /CreationDate (D:{}Z)",
                doc.generated_at.format("%Y%m%d%H%M%S")
            ));
        }
        info.push_str(" >>\nendobj\n");
        pdf.extend_from_slice(info.as_bytes());

        for (i, chart) in doc.charts.iter().enumerate() {
            xref_positions.push(pdf.len());
            pdf.extend_from_slice(
                format!(
                    "{} 0 obj\n<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Length {} >>\nstream\n",
                    first_image + i,
                    chart.width,
                    chart.height,
                    chart.rgb.len()
                )
                .as_bytes(),
            );
            pdf.extend_from_slice(&chart.rgb);
            pdf.extend_from_slice(b"\nendstream\nendobj\n");
        }

        for (i, page) in pages.iter().enumerate() {
            let xobjects = if page.images.is_empty() {
                String::new()
            } else {
                let refs = page
                    .images
                    .iter()
                    .map(|&img| format!("/Im{} {} 0 R", img, first_image + img))
                    .collect::<Vec<_>>()
                    .join(" ");
                format!(" /XObject << {refs} >>")
            };

            xref_positions.push(pdf.len());
            pdf.extend_from_slice(
                format!(
                    "{} 0 obj\n<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.2} {:.2}] /Contents {} 0 R /Resources << /Font << /F1 3 0 R /F2 4 0 R >>{} >> >>\nendobj\n",
                    page_obj(i),
                    width,
                    height,
                    page_obj(i) + 1,
                    xobjects
                )
                .as_bytes(),
            );

            xref_positions.push(pdf.len());
            pdf.extend_from_slice(
                format!(
                    "{} 0 obj\n<< /Length {} >>\nstream\n{}endstream\nendobj\n",
                    page_obj(i) + 1,
                    page.ops.len(),
                    page.ops
                )
                .as_bytes(),
            );
        }

        if xref_positions.len() != first_page + 2 * pages.len() - 1 {
            return Err(ExportError::Encode(format!(
                "wrote {} objects, expected {}",
                xref_positions.len(),
                first_page + 2 * pages.len() - 1
            )));
        }

        // Cross-reference table
        let xref_start = pdf.len();
        pdf.extend_from_slice(b"xref\n");
        pdf.extend_from_slice(format!("0 {}\n", xref_positions.len() + 1).as_bytes());
        pdf.extend_from_slice(b"0000000000 65535 f \n");
        for pos in &xref_positions {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", pos).as_bytes());
        }

        // Trailer
        pdf.extend_from_slice(b"trailer\n");
        pdf.extend_from_slice(
            format!(
                "<< /Size {} /Root 1 0 R /Info 5 0 R >>\n",
                xref_positions.len() + 1
            )
            .as_bytes(),
        );
        pdf.extend_from_slice(b"startxref\n");
        pdf.extend_from_slice(format!("{}\n", xref_start).as_bytes());
        pdf.extend_from_slice(b"%%EOF\n");

        Ok(pdf)
    }
}

/// Reject documents the emitter cannot render faithfully
fn check_document(doc: &ReportDocument) -> ExportResult<()> {
    if doc.title.trim().is_empty() {
        return Err(ExportError::MalformedDocument("title is empty".to_string()));
    }
    if doc.sections.is_empty() {
        return Err(ExportError::MalformedDocument(
            "document has no sections".to_string(),
        ));
    }
    for section in &doc.sections {
        if let Some(chart_id) = &section.chart_ref
            && doc.chart(chart_id).is_none()
        {
            return Err(ExportError::MalformedDocument(format!(
                "section '{}' refers to missing chart '{}'",
                section.heading, chart_id
            )));
        }
    }
    if let Some(chart) = doc.charts.iter().find(|c| !c.is_well_formed()) {
        return Err(ExportError::MalformedDocument(format!(
            "chart '{}' has {} bytes for a {}x{} image",
            chart.id,
            chart.rgb.len(),
            chart.width,
            chart.height
        )));
    }
    Ok(())
}

/// Escape text for a PDF literal string in WinAnsiEncoding
///
/// Characters outside the encoding become `?`, except the rupee sign which
/// is spelled out as "INR ".
pub fn escape_pdf_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{20B9}' => out.push_str("INR "),
            ' '..='~' => out.push(c),
            '\u{A0}'..='\u{FF}' => out.push_str(&format!("\\{:03o}", c as u32)),
            other => match win_ansi_code(other) {
                Some(code) => out.push_str(&format!("\\{:03o}", code)),
                None if other.is_control() => {}
                None => out.push('?'),
            },
        }
    }
    out
}

/// WinAnsi codes for the punctuation that lives in 0x80-0x9F
fn win_ansi_code(c: char) -> Option<u8> {
    Some(match c {
        '\u{20AC}' => 0x80,
        '\u{2026}' => 0x85,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{2122}' => 0x99,
        _ => return None,
    })
}

/// Word wrap text to fit within max characters per line
///
/// Words longer than a line are split.
pub fn word_wrap(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();
    let mut current_line = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > max_chars {
            if !current_line.is_empty() {
                lines.push(std::mem::take(&mut current_line));
            }
            let rest = word.split_off(max_chars);
            lines.push(word.into_iter().collect());
            word = rest;
            current_len = 0;
        }
        let word: String = word.into_iter().collect();
        let len = word.chars().count();

        if current_line.is_empty() {
            current_line = word;
            current_len = len;
        } else if current_len + 1 + len <= max_chars {
            current_line.push(' ');
            current_line.push_str(&word);
            current_len += 1 + len;
        } else {
            lines.push(std::mem::replace(&mut current_line, word));
            current_len = len;
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(String::new());
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Section;
    use chrono::{TimeZone, Utc};

    fn document() -> ReportDocument {
        ReportDocument {
            title: "Campus Assets Management System".to_string(),
            subtitle: "Resource Inventory Report".to_string(),
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            sections: vec![
                Section::new("Summary", "Total records: 3\n\nAll good (mostly)."),
                Section::new("Key Findings", "- Lab 1 holds most value\n- Costs \u{20B9}100"),
            ],
            charts: vec![],
            notes: vec![],
        }
    }

    fn chart(id: &str) -> ChartImage {
        ChartImage {
            id: id.to_string(),
            title: "Value".to_string(),
            width: 4,
            height: 2,
            rgb: vec![200; 4 * 2 * 3],
            png: vec![],
        }
    }

    /// Check that every xref entry points at its object header
    fn assert_xref_consistent(bytes: &[u8]) {
        let text = String::from_utf8_lossy(bytes);
        let start: usize = text
            .rsplit("startxref\n")
            .next()
            .and_then(|rest| rest.lines().next())
            .unwrap()
            .parse()
            .unwrap();
        assert!(bytes[start..].starts_with(b"xref\n"));

        let table = String::from_utf8_lossy(&bytes[start..]).to_string();
        for (n, entry) in table.lines().skip(3).take_while(|l| l.ends_with(" n ")).enumerate() {
            let offset: usize = entry[..10].parse().unwrap();
            let header = format!("{} 0 obj", n + 1);
            assert!(bytes[offset..].starts_with(header.as_bytes()), "object {}", n + 1);
        }
    }

    #[test]
    fn test_branding_config_default() {
        let config = BrandingConfig::default();
        assert_eq!(config.brand_color, "#0066CC");
        assert!(config.show_page_numbers);
        assert!(config.show_timestamp);
        assert_eq!(config.font_size, 10);
        assert_eq!(config.page_size, PageSize::A4);
    }

    #[test]
    fn test_page_size_dimensions() {
        let (w, h) = PageSize::A4.dimensions_mm();
        assert_eq!(w, 210.0);
        assert_eq!(h, 297.0);

        let (w, h) = PageSize::Letter.dimensions_pt();
        assert!((w - 612.0).abs() < 0.5);
        assert!((h - 792.0).abs() < 0.5);
    }

    #[test]
    fn test_render_structure() {
        let output = PdfEmitter::new().render(&document()).unwrap();
        assert!(output.bytes.starts_with(b"%PDF-1.4\n"));
        assert!(output.bytes.ends_with(b"%%EOF\n"));
        assert_eq!(output.page_count, 1);
        assert_eq!(output.filename(), "Campus_Assets_Management_System.pdf");
        assert!(!output.to_base64().is_empty());

        let text = String::from_utf8_lossy(&output.bytes);
        assert!(text.contains("/BaseFont /Helvetica-Bold"));
        assert!(text.contains("(All good \\(mostly\\).)"));
        assert!(text.contains("(Costs INR 100)"));
        assert!(text.contains("/CreationDate (D:20240501120000Z)"));
        assert!(text.contains("(Page 1 of 1)"));
        assert_xref_consistent(&output.bytes);
    }

    #[test]
    fn test_render_is_deterministic() {
        let emitter = PdfEmitter::new();
        let a = emitter.render(&document()).unwrap();
        let b = emitter.render(&document()).unwrap();
        assert_eq!(a.bytes, b.bytes);
    }

    #[test]
    fn test_long_document_breaks_pages() {
        let mut doc = document();
        let body = (0..200)
            .map(|i| format!("Row {i}: Laptop | Lab 1 | 2023-01-10"))
            .collect::<Vec<_>>()
            .join("\n");
        doc.sections.push(Section::new("Record Details", body));

        let output = PdfEmitter::new().render(&doc).unwrap();
        assert!(output.page_count > 1);
        let text = String::from_utf8_lossy(&output.bytes);
        assert!(text.contains(&format!("/Count {}", output.page_count)));
        assert!(text.contains(&format!("(Page 2 of {})", output.page_count)));
        assert_xref_consistent(&output.bytes);
    }

    #[test]
    fn test_chart_embedded_as_image() {
        let mut doc = document();
        doc.charts.push(chart("by_location"));
        doc.sections
            .push(Section::new("Value by location", "Bar chart").with_chart("by_location"));

        let output = PdfEmitter::new().render(&doc).unwrap();
        let text = String::from_utf8_lossy(&output.bytes);
        assert!(text.contains("/Subtype /Image /Width 4 /Height 2"));
        assert!(text.contains("/Im0 Do"));
        assert!(text.contains("/XObject << /Im0 6 0 R >>"));
        assert_xref_consistent(&output.bytes);
    }

    #[test]
    fn test_malformed_documents_rejected() {
        let emitter = PdfEmitter::new();

        let mut doc = document();
        doc.title = "  ".to_string();
        assert!(matches!(emitter.render(&doc), Err(ExportError::MalformedDocument(_))));

        let mut doc = document();
        doc.sections.clear();
        assert!(matches!(emitter.render(&doc), Err(ExportError::MalformedDocument(_))));

        let mut doc = document();
        doc.sections[0].chart_ref = Some("missing".to_string());
        let err = emitter.render(&doc).unwrap_err();
        assert!(err.to_string().contains("missing"));

        let mut doc = document();
        let mut broken = chart("c");
        broken.rgb.pop();
        doc.charts.push(broken);
        assert!(matches!(emitter.render(&doc), Err(ExportError::MalformedDocument(_))));
    }

    #[test]
    fn test_branding_header_footer_and_no_timestamp() {
        let branding = BrandingConfig {
            header: Some("Campus Operations".to_string()),
            footer: Some("Confidential".to_string()),
            show_timestamp: false,
            show_page_numbers: false,
            ..Default::default()
        };
        let output = PdfEmitter::with_branding(branding).render(&document()).unwrap();
        let text = String::from_utf8_lossy(&output.bytes);
        assert!(text.contains("(Campus Operations)"));
        assert!(text.contains("(Confidential)"));
        assert!(!text.contains("CreationDate"));
        assert!(!text.contains("Page 1 of"));
    }

    #[test]
    fn test_escape_pdf_string() {
        assert_eq!(
            escape_pdf_string("Test (with) special\\chars"),
            "Test \\(with\\) special\\\\chars"
        );
        assert_eq!(escape_pdf_string("caf\u{E9}"), "caf\\351");
        assert_eq!(escape_pdf_string("\u{2022} \u{4E2D}"), "\\225 ?");
        assert_eq!(escape_pdf_string("\u{20B9}500"), "INR 500");
    }

    #[test]
    fn test_word_wrap() {
        let text = "This is a long line that should be wrapped properly";
        let wrapped = word_wrap(text, 20);
        assert!(wrapped.len() > 1);
        for line in &wrapped {
            assert!(line.chars().count() <= 20);
        }
        assert_eq!(word_wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(word_wrap("", 10), vec![String::new()]);
    }
}
