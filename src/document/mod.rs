//! PDF rendering of the report.
//!
//! Layout is a pure pass over the text producing positioned lines per page;
//! `printpdf` only draws what the layout decided. Metadata (document id,
//! dates) is pinned so the same text always yields the same bytes.

use printpdf::lopdf::{self, Object, StringFormat};
use printpdf::{
    BuiltinFont, CustomPdfConformance, Mm, PdfConformance, PdfDocument, PdfDocumentReference,
};
use std::io::BufWriter;
use time::OffsetDateTime;
use tracing::debug;

use crate::config::DocumentConfig;
use crate::error::RenderError;

pub const MEDIA_TYPE: &str = "application/pdf";
pub const FILE_NAME: &str = "healthcare_report.pdf";

/// Page geometry in PDF points (1/72 inch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f32,
    pub height: f32,
    pub margin: f32,
    pub title_size: f32,
    pub body_size: f32,
    pub leading: f32,
    /// Distance from the title baseline to the first body baseline.
    pub title_gap: f32,
}

impl PageGeometry {
    /// US Letter, 50pt margins.
    pub const LETTER: PageGeometry = PageGeometry {
        width: 612.0,
        height: 792.0,
        margin: 50.0,
        title_size: 20.0,
        body_size: 12.0,
        leading: 15.0,
        title_gap: 30.0,
    };

    pub fn printable_width(&self) -> f32 {
        self.width - 2.0 * self.margin
    }

    fn top(&self) -> f32 {
        self.height - self.margin
    }
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self::LETTER
    }
}

/// Glyph advance widths, in thousandths of an em.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FontMetrics {
    /// Standard 14 Helvetica, WinAnsi encoded.
    Helvetica,
    /// External TrueType font; advances are estimated conservatively.
    Embedded,
}

// Helvetica AFM widths for 0x20..=0x7E.
const HELVETICA_ASCII: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // '0'..'9'
    278, 278, 584, 584, 584, 556, 1015, // ':'..'@'
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, // 'A'..'M'
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, // 'N'..'Z'
    278, 278, 278, 469, 556, 333, // '['..'`'
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, // 'a'..'m'
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, // 'n'..'z'
    334, 260, 334, 584, // '{'..'~'
];

// Windows-1252 characters outside Latin-1.
const WINANSI_EXTRAS: &str = "€‚ƒ„…†‡ˆ‰Š‹ŒŽ‘’“”•–—˜™š›œžŸ";

impl FontMetrics {
    pub fn supports(&self, ch: char) -> bool {
        match self {
            FontMetrics::Helvetica => {
                (' '..='~').contains(&ch)
                    || ('\u{A0}'..='\u{FF}').contains(&ch)
                    || WINANSI_EXTRAS.contains(ch)
            }
            FontMetrics::Embedded => !ch.is_control(),
        }
    }

    fn advance(&self, ch: char) -> u16 {
        match self {
            FontMetrics::Helvetica => match ch {
                ' '..='~' => HELVETICA_ASCII[ch as usize - 0x20],
                '\u{A0}' => 278,
                '…' | '—' | '‰' | 'Œ' | 'œ' => 1000,
                _ => 556,
            },
            FontMetrics::Embedded => {
                if is_wide(ch) {
                    1000
                } else {
                    600
                }
            }
        }
    }

    pub fn text_width(&self, text: &str, size: f32) -> f32 {
        let units: u32 = text.chars().map(|c| u32::from(self.advance(c))).sum();
        units as f32 * size / 1000.0
    }
}

fn is_wide(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineRole {
    Title,
    Body,
}

/// One line of text with its baseline position in points.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub text: String,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub role: LineRole,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageLayout {
    pub lines: Vec<PlacedLine>,
}

fn normalize(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n").replace('\t', "    ")
}

fn check_supported(text: &str, metrics: FontMetrics) -> Result<(), RenderError> {
    for (idx, line) in text.lines().enumerate() {
        if let Some(ch) = line.chars().find(|&c| !metrics.supports(c)) {
            return Err(RenderError::UnsupportedCharacter {
                character: ch,
                code: ch as u32,
                line: idx + 1,
            });
        }
    }
    Ok(())
}

/// Split one paragraph into lines no wider than `max_width`.
pub fn wrap_paragraph(paragraph: &str, max_width: f32, size: f32, metrics: FontMetrics) -> Vec<String> {
    let space = metrics.text_width(" ", size);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_width = 0.0;

    for word in paragraph.split_whitespace() {
        let mut word = word.to_string();
        let mut word_width = metrics.text_width(&word, size);

        // Hard-split words that cannot fit on a line of their own.
        while word_width > max_width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
                current_width = 0.0;
            }
            let mut head = String::new();
            let mut head_width = 0.0;
            let mut split_at = word.len();
            for (pos, ch) in word.char_indices() {
                let w = metrics.text_width(ch.encode_utf8(&mut [0; 4]), size);
                if head_width + w > max_width && !head.is_empty() {
                    split_at = pos;
                    break;
                }
                head.push(ch);
                head_width += w;
            }
            word = word.split_off(split_at);
            lines.push(head);
            word_width = metrics.text_width(&word, size);
        }
        if word.is_empty() {
            continue;
        }

        if !current.is_empty() && current_width + space + word_width > max_width {
            lines.push(std::mem::take(&mut current));
            current_width = 0.0;
        }
        if !current.is_empty() {
            current.push(' ');
            current_width += space;
        }
        current.push_str(&word);
        current_width += word_width;
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Lay out `title` and `body` over as many pages as needed.
pub fn layout(
    title: &str,
    body: &str,
    geometry: &PageGeometry,
    metrics: FontMetrics,
) -> Result<Vec<PageLayout>, RenderError> {
    let title = normalize(title);
    let body = normalize(body);
    check_supported(&title, metrics)?;
    check_supported(&body, metrics)?;

    let width = geometry.printable_width();
    let mut pages = vec![PageLayout::default()];
    let mut y = geometry.top();

    for line in wrap_paragraph(title.trim(), width, geometry.title_size, metrics) {
        if y < geometry.margin {
            pages.push(PageLayout::default());
            y = geometry.top();
        }
        if let Some(page) = pages.last_mut() {
            page.lines.push(PlacedLine {
                text: line,
                x: geometry.margin,
                y,
                size: geometry.title_size,
                role: LineRole::Title,
            });
        }
        y -= geometry.title_size * 1.2;
    }
    y -= geometry.title_gap - geometry.title_size * 1.2;

    for paragraph in body.trim().lines() {
        if paragraph.trim().is_empty() {
            y -= geometry.leading;
            continue;
        }
        for line in wrap_paragraph(paragraph, width, geometry.body_size, metrics) {
            if y < geometry.margin {
                pages.push(PageLayout::default());
                y = geometry.top();
            }
            if let Some(page) = pages.last_mut() {
                page.lines.push(PlacedLine {
                    text: line,
                    x: geometry.margin,
                    y,
                    size: geometry.body_size,
                    role: LineRole::Body,
                });
            }
            y -= geometry.leading;
        }
    }

    Ok(pages)
}

/// A finished, downloadable document.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedDocument {
    pub bytes: Vec<u8>,
    pub media_type: &'static str,
    pub file_name: &'static str,
    pub pages: usize,
}

enum FontSource {
    Builtin,
    External(Vec<u8>),
}

pub struct DocumentRenderer {
    title: String,
    geometry: PageGeometry,
    font: FontSource,
}

impl DocumentRenderer {
    pub fn new(config: &DocumentConfig) -> Result<Self, RenderError> {
        let font = match &config.font_path {
            Some(path) => FontSource::External(std::fs::read(path).map_err(|e| {
                RenderError::Font(format!("cannot read {}: {}", path.display(), e))
            })?),
            None => FontSource::Builtin,
        };
        Ok(Self {
            title: config.title.clone(),
            geometry: PageGeometry::default(),
            font,
        })
    }

    pub fn metrics(&self) -> FontMetrics {
        match self.font {
            FontSource::Builtin => FontMetrics::Helvetica,
            FontSource::External(_) => FontMetrics::Embedded,
        }
    }

    pub fn render(&self, body: &str) -> Result<RenderedDocument, RenderError> {
        let pages = layout(&self.title, body, &self.geometry, self.metrics())?;
        let bytes = self.draw(&pages, body)?;
        debug!(pages = pages.len(), bytes = bytes.len(), "report document rendered");
        Ok(RenderedDocument {
            bytes,
            media_type: MEDIA_TYPE,
            file_name: FILE_NAME,
            pages: pages.len(),
        })
    }

    fn draw(&self, pages: &[PageLayout], body: &str) -> Result<Vec<u8>, RenderError> {
        let width = pt_to_mm(self.geometry.width);
        let height = pt_to_mm(self.geometry.height);
        let (doc, first_page, first_layer) = PdfDocument::new(&self.title, width, height, "Layer 1");
        let doc = pin_metadata(doc);

        let font = match &self.font {
            FontSource::Builtin => doc.add_builtin_font(BuiltinFont::Helvetica),
            FontSource::External(bytes) => doc.add_external_font(bytes.as_slice()),
        }
        .map_err(|e| RenderError::Font(e.to_string()))?;

        for (idx, page) in pages.iter().enumerate() {
            let (page_idx, layer_idx) = if idx == 0 {
                (first_page, first_layer)
            } else {
                doc.add_page(width, height, "Layer 1")
            };
            let layer = doc.get_page(page_idx).get_layer(layer_idx);
            for line in &page.lines {
                layer.use_text(line.text.as_str(), line.size, pt_to_mm(line.x), pt_to_mm(line.y), &font);
            }
        }

        save(doc, &content_id(&self.title, body))
    }
}

fn pin_metadata(doc: PdfDocumentReference) -> PdfDocumentReference {
    doc.with_conformance(PdfConformance::Custom(CustomPdfConformance {
        requires_icc_profile: false,
        requires_xmp_metadata: false,
        ..Default::default()
    }))
    .with_creation_date(OffsetDateTime::UNIX_EPOCH)
    .with_mod_date(OffsetDateTime::UNIX_EPOCH)
    .with_metadata_date(OffsetDateTime::UNIX_EPOCH)
}

/// printpdf writes a random trailer `/ID` on every save, so the saved file
/// is reloaded and the pair is replaced with `id`.
fn save(doc: PdfDocumentReference, id: &str) -> Result<Vec<u8>, RenderError> {
    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf).map_err(|e| RenderError::Pdf(e.to_string()))?;
    let raw = buf.into_inner().map_err(|e| RenderError::Pdf(e.to_string()))?;

    let mut pdf = lopdf::Document::load_mem(&raw).map_err(|e| RenderError::Pdf(e.to_string()))?;
    let id = Object::String(id.as_bytes().to_vec(), StringFormat::Literal);
    pdf.trailer.set("ID", Object::Array(vec![id.clone(), id]));

    let mut bytes = Vec::new();
    pdf.save_to(&mut bytes).map_err(|e| RenderError::Pdf(e.to_string()))?;
    Ok(bytes)
}

/// FNV-1a over title and body, as 32 hex digits.
fn content_id(title: &str, body: &str) -> String {
    fn fnv1a(seed: u64, data: &[u8]) -> u64 {
        data.iter().fold(seed, |hash, &b| (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3))
    }
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    let a = fnv1a(OFFSET, title.as_bytes());
    let b = fnv1a(a, body.as_bytes());
    format!("{:016x}{:016x}", a, b)
}

fn pt_to_mm(pt: f32) -> Mm {
    Mm(pt * 25.4 / 72.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_body(paragraphs: usize) -> String {
        (0..paragraphs)
            .map(|i| {
                format!(
                    "{}. Drink plenty of fluids, rest as much as possible and monitor your temperature twice a day; \
                     contact a doctor if symptoms persist beyond three days or breathing becomes difficult.",
                    i + 1
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_helvetica_widths() {
        let m = FontMetrics::Helvetica;
        assert_eq!(m.text_width("i", 1000.0), 222.0);
        assert_eq!(m.text_width("W", 1000.0), 944.0);
        assert_eq!(m.text_width("~", 1000.0), 584.0);
        assert!((m.text_width("Hello", 12.0) - 27.336).abs() < 1e-3);
    }

    #[test]
    fn test_lines_fit_printable_width() {
        let geometry = PageGeometry::default();
        let pages = layout("Healthcare Report", &long_body(10), &geometry, FontMetrics::Helvetica).unwrap();
        for line in pages.iter().flat_map(|p| &p.lines).filter(|l| l.role == LineRole::Body) {
            let width = FontMetrics::Helvetica.text_width(&line.text, line.size);
            assert!(width <= geometry.printable_width(), "line too wide: {}", line.text);
        }
    }

    #[test]
    fn test_wrapping_keeps_every_word() {
        let body = long_body(3);
        let pages = layout("T", &body, &PageGeometry::default(), FontMetrics::Helvetica).unwrap();
        let laid_out: Vec<&str> = pages
            .iter()
            .flat_map(|p| &p.lines)
            .filter(|l| l.role == LineRole::Body)
            .flat_map(|l| l.text.split_whitespace())
            .collect();
        let original: Vec<&str> = body.split_whitespace().collect();
        assert_eq!(laid_out, original);
    }

    #[test]
    fn test_long_text_paginates_within_margins() {
        let geometry = PageGeometry::default();
        let pages = layout("Healthcare Report", &long_body(60), &geometry, FontMetrics::Helvetica).unwrap();
        assert!(pages.len() > 1);
        for page in &pages {
            for line in &page.lines {
                assert!(line.y >= geometry.margin);
                assert!(line.y <= geometry.height - geometry.margin);
            }
        }
        let titles = pages
            .iter()
            .flat_map(|p| &p.lines)
            .filter(|l| l.role == LineRole::Title)
            .count();
        assert_eq!(titles, 1);
        assert_eq!(pages[0].lines[0].role, LineRole::Title);
    }

    #[test]
    fn test_blank_line_adds_vertical_space() {
        let geometry = PageGeometry::default();
        let pages = layout("T", "one\n\ntwo", &geometry, FontMetrics::Helvetica).unwrap();
        let body: Vec<_> = pages[0].lines.iter().filter(|l| l.role == LineRole::Body).collect();
        assert_eq!(body.len(), 2);
        assert_eq!(body[0].y - body[1].y, 2.0 * geometry.leading);
    }

    #[test]
    fn test_overlong_word_is_split() {
        let word = "x".repeat(400);
        let lines = wrap_paragraph(&word, 100.0, 12.0, FontMetrics::Helvetica);
        assert!(lines.len() > 1);
        assert_eq!(lines.concat(), word);
        for line in &lines {
            assert!(FontMetrics::Helvetica.text_width(line, 12.0) <= 100.0);
        }
    }

    #[test]
    fn test_non_latin_text_fails_with_builtin_font() {
        let err = layout(
            "Healthcare Report",
            "Conditions:\nबुखार और खांसी",
            &PageGeometry::default(),
            FontMetrics::Helvetica,
        )
        .unwrap_err();
        match err {
            RenderError::UnsupportedCharacter { character, line, .. } => {
                assert_eq!(character, 'ब');
                assert_eq!(line, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_winansi_punctuation_is_accepted() {
        let body = "Fièvre – “repos” • 38,5 °C … naïve €";
        assert!(layout("Rapport", body, &PageGeometry::default(), FontMetrics::Helvetica).is_ok());
    }

    #[test]
    fn test_embedded_metrics_accept_any_script() {
        let pages = layout(
            "स्वास्थ्य रिपोर्ट",
            "बुखार और खांसी\n发烧和咳嗽",
            &PageGeometry::default(),
            FontMetrics::Embedded,
        )
        .unwrap();
        assert_eq!(pages[0].lines.len(), 3);
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = DocumentRenderer::new(&DocumentConfig::default()).unwrap();
        let body = long_body(5);

        let first = renderer.render(&body).unwrap();
        let second = renderer.render(&body).unwrap();
        assert_eq!(first.bytes, second.bytes);
        assert!(first.bytes.starts_with(b"%PDF"));
        assert_eq!(first.media_type, "application/pdf");
        assert_eq!(first.file_name, "healthcare_report.pdf");
    }

    #[test]
    fn test_trailer_id_follows_content() {
        let renderer = DocumentRenderer::new(&DocumentConfig::default()).unwrap();
        let trailer_id = |body: &str| {
            let doc = renderer.render(body).unwrap();
            let pdf = lopdf::Document::load_mem(&doc.bytes).unwrap();
            let ids = pdf.trailer.get(b"ID").unwrap().as_array().unwrap().clone();
            ids.iter()
                .map(|id| match id {
                    Object::String(bytes, _) => bytes.clone(),
                    other => panic!("unexpected id object: {other:?}"),
                })
                .collect::<Vec<_>>()
        };

        let fever = trailer_id("fever");
        let expected = content_id("Healthcare Report", "fever").into_bytes();
        assert_eq!(fever, vec![expected.clone(), expected]);
        assert_eq!(trailer_id("fever"), fever);
        assert_ne!(trailer_id("cough"), fever);
    }

    #[test]
    fn test_long_title_paginates_within_margins() {
        let geometry = PageGeometry {
            height: 200.0,
            ..PageGeometry::default()
        };
        let title = "Healthcare Report ".repeat(30);
        let pages = layout(&title, "Rest.", &geometry, FontMetrics::Helvetica).unwrap();
        assert!(pages.len() > 1);
        for line in pages.iter().flat_map(|p| &p.lines) {
            assert!(line.y >= geometry.margin, "{:?} below margin", line.role);
        }
        assert_eq!(pages[0].lines[0].role, LineRole::Title);
    }

    #[test]
    fn test_render_reports_page_count() {
        let renderer = DocumentRenderer::new(&DocumentConfig::default()).unwrap();
        let doc = renderer.render(&long_body(60)).unwrap();
        assert!(doc.pages > 1);
    }

    #[test]
    fn test_missing_font_file_is_font_error() {
        let config = DocumentConfig {
            font_path: Some("/nonexistent/NotoSans-Regular.ttf".into()),
            ..DocumentConfig::default()
        };
        assert!(matches!(DocumentRenderer::new(&config), Err(RenderError::Font(_))));
    }

    #[test]
    fn test_content_id_depends_on_text() {
        assert_eq!(content_id("a", "b"), content_id("a", "b"));
        assert_ne!(content_id("a", "b"), content_id("a", "c"));
        assert_eq!(content_id("a", "b").len(), 32);
    }
}
