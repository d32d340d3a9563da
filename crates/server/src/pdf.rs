//! PDF rendering for quotes.
//!
//! Rendering runs in two passes. [`layout_quote`] turns a quote request into pages of
//! positioned drawing elements (points, measured from the top-left corner of an A4 page), and
//! the encoder replays those elements onto a `printpdf` document using the built-in Helvetica
//! faces. Tests assert on the layout rather than on PDF bytes.

use std::io;
use std::path::{Path, PathBuf};

use printpdf::image_crate::{self, DynamicImage, RgbImage};
use printpdf::{
    BuiltinFont, Color, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument,
    PdfLayerReference, Rect, Rgb,
};
use quotedesk_core::domain::quote::{
    format_amount, parse_amount_or_zero, LineItem, QuoteRequest, QuoteSubmission,
};

pub const PAGE_WIDTH: f32 = 595.28;
pub const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 40.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;
const FOOTER_RESERVE: f32 = 28.0;
const FOOTER_BASELINE: f32 = PAGE_HEIGHT - 20.0;

const LOGO_BOX_WIDTH: f32 = 180.0;
const LOGO_BOX_HEIGHT: f32 = 50.0;
const LOGO_DPI: f32 = 300.0;

const CELL_PADDING: f32 = 12.0;
const ROW_LINE_HEIGHT: f32 = 12.0;
const BULLET_INDENT: f32 = 12.0;
const BULLET: char = '•';

pub const REMARKS_TITLE: &str = "Remarks / Payment Instructions:";
pub const REMARKS_TEXT: &str =
    "A 50% deposit is required upfront with the remainder to be paid at the projects completion.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Shade(pub u8, pub u8, pub u8);

impl Shade {
    pub const ACCENT: Shade = Shade(0x4A, 0x90, 0xE2);
    pub const INK: Shade = Shade(0x33, 0x33, 0x33);
    pub const MUTED: Shade = Shade(0x88, 0x88, 0x88);
    pub const WHITE: Shade = Shade(0xFF, 0xFF, 0xFF);
    pub const RULE: Shade = Shade(0xE0, 0xE0, 0xE0);
    pub const ROW_BASE: Shade = Shade(0xFF, 0xFF, 0xFF);
    pub const ROW_ALT: Shade = Shade(0xF9, 0xF9, 0xF9);
    pub const TOTAL_BAND: Shade = Shade(0xF5, 0xF5, 0xF5);

    fn to_color(self) -> Color {
        let channel = |value: u8| f32::from(value) / 255.0;
        Color::Rgb(Rgb::new(channel(self.0), channel(self.1), channel(self.2), None))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FontWeight {
    Regular,
    Bold,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextRun {
    pub x: f32,
    pub baseline: f32,
    pub size: f32,
    pub weight: FontWeight,
    pub color: Shade,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub color: Shade,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Element {
    Text(TextRun),
    Rect(Block),
    Logo(Block),
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayoutPage {
    pub elements: Vec<Element>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QuoteLayout {
    pub pages: Vec<LayoutPage>,
}

impl QuoteLayout {
    pub fn texts(&self) -> impl Iterator<Item = &TextRun> {
        self.pages.iter().flat_map(|page| page.elements.iter()).filter_map(|element| {
            match element {
                Element::Text(run) => Some(run),
                _ => None,
            }
        })
    }
}

/// Inputs the renderer takes from outside the quote itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderOptions {
    pub year: i32,
    pub company_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("logo asset {path} is unavailable: {source}")]
    LogoUnavailable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("logo asset could not be decoded: {0}")]
    LogoDecode(String),
    #[error("pdf encoding failed: {0}")]
    Encode(String),
    #[error("render task did not complete: {0}")]
    Interrupted(String),
}

/// Rendered document bytes, owned by the request that produced them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderedQuote {
    bytes: Vec<u8>,
    pages: usize,
}

impl RenderedQuote {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn page_count(&self) -> usize {
        self.pages
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Where the logo lives on disk. Read on every render so a replaced asset takes effect
/// without a restart.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogoSource {
    path: PathBuf,
}

impl LogoSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Result<LogoImage, RenderError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| RenderError::LogoUnavailable { path: self.path.clone(), source })?;
        LogoImage::decode(bytes)
    }

    pub async fn is_readable(&self) -> bool {
        tokio::fs::File::open(&self.path).await.is_ok()
    }
}

/// A decoded logo, flattened onto white, plus the original file bytes for reuse in email.
#[derive(Clone, Debug)]
pub struct LogoImage {
    raw: Vec<u8>,
    mime: &'static str,
    pixels: RgbImage,
}

impl LogoImage {
    pub fn decode(raw: Vec<u8>) -> Result<Self, RenderError> {
        let mime = match image_crate::guess_format(&raw) {
            Ok(image_crate::ImageFormat::Png) => "image/png",
            Ok(image_crate::ImageFormat::Jpeg) => "image/jpeg",
            Ok(other) => {
                return Err(RenderError::LogoDecode(format!("unsupported image format {other:?}")))
            }
            Err(error) => return Err(RenderError::LogoDecode(error.to_string())),
        };
        let decoded = image_crate::load_from_memory(&raw)
            .map_err(|error| RenderError::LogoDecode(error.to_string()))?;
        let rgba = decoded.to_rgba8();
        if rgba.width() == 0 || rgba.height() == 0 {
            return Err(RenderError::LogoDecode("logo has no pixels".to_string()));
        }
        let pixels = RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
            let [r, g, b, alpha] = rgba.get_pixel(x, y).0;
            let blend = |channel: u8| {
                let alpha = u16::from(alpha);
                ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
            };
            image_crate::Rgb([blend(r), blend(g), blend(b)])
        });

        Ok(Self { raw, mime, pixels })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn mime(&self) -> &'static str {
        self.mime
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw
    }
}

pub fn render(
    submission: &QuoteSubmission,
    logo: &LogoImage,
    options: &RenderOptions,
) -> Result<RenderedQuote, RenderError> {
    render_request(submission.request(), logo, options)
}

fn render_request(
    request: &QuoteRequest,
    logo: &LogoImage,
    options: &RenderOptions,
) -> Result<RenderedQuote, RenderError> {
    let layout = layout_quote(request, options, logo.dimensions());
    let title = format!("Quote {}", request.quote.number);
    let bytes = encode(&layout, logo, &title)?;
    Ok(RenderedQuote { bytes, pages: layout.pages.len() })
}

pub fn layout_quote(
    request: &QuoteRequest,
    options: &RenderOptions,
    logo_dimensions: (u32, u32),
) -> QuoteLayout {
    let mut composer = Composer::new();
    composer.header(request, logo_dimensions);
    composer.quote_for(request);
    for section in &request.tables {
        composer.table(&section.line_items);
    }
    composer.total_row(&format_amount(request.total));
    composer.remarks();
    composer.finish(options)
}

struct RowLine {
    text: String,
    weight: FontWeight,
    indent: f32,
    gap_before: f32,
}

struct Composer {
    pages: Vec<LayoutPage>,
    cursor: f32,
}

impl Composer {
    fn new() -> Self {
        Self { pages: vec![LayoutPage::default()], cursor: MARGIN }
    }

    fn push(&mut self, element: Element) {
        if let Some(page) = self.pages.last_mut() {
            page.elements.push(element);
        }
    }

    fn text(
        &mut self,
        x: f32,
        baseline: f32,
        size: f32,
        weight: FontWeight,
        color: Shade,
        content: &str,
    ) {
        if content.is_empty() {
            return;
        }
        self.push(Element::Text(TextRun {
            x,
            baseline,
            size,
            weight,
            color,
            content: content.to_string(),
        }));
    }

    fn rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Shade) {
        self.push(Element::Rect(Block { x, y, width, height, color }));
    }

    fn limit() -> f32 {
        PAGE_HEIGHT - MARGIN - FOOTER_RESERVE
    }

    /// Starts a new page when `height` does not fit below the cursor. Returns whether it did.
    fn ensure_room(&mut self, height: f32) -> bool {
        let at_top = (self.cursor - MARGIN).abs() < f32::EPSILON;
        if at_top || self.cursor + height <= Self::limit() {
            return false;
        }
        self.pages.push(LayoutPage::default());
        self.cursor = MARGIN;
        true
    }

    fn header(&mut self, request: &QuoteRequest, (logo_width, logo_height): (u32, u32)) {
        let top = self.cursor;

        let scale = (LOGO_BOX_WIDTH / logo_width.max(1) as f32)
            .min(LOGO_BOX_HEIGHT / logo_height.max(1) as f32);
        let width = logo_width as f32 * scale;
        let height = logo_height as f32 * scale;
        self.push(Element::Logo(Block {
            x: MARGIN,
            y: top + (LOGO_BOX_HEIGHT - height) / 2.0,
            width,
            height,
            color: Shade::WHITE,
        }));

        let company = &request.company;
        let mut info: Vec<&str> = company.address_lines().take(2).collect();
        info.extend([company.phone.trim(), company.email.trim()]);
        let mut left_bottom = top + LOGO_BOX_HEIGHT + 15.0;
        for line in info.into_iter().filter(|line| !line.is_empty()) {
            self.text(MARGIN, left_bottom + 11.0, 9.0, FontWeight::Regular, Shade::INK, line);
            left_bottom += 14.4;
        }

        let right = PAGE_WIDTH - MARGIN;
        let banner_width = text_width("QUOTE", FontWeight::Bold, 18.0) + 80.0;
        let banner_height = 18.0 + 20.0;
        self.rect(right - banner_width, top, banner_width, banner_height, Shade::ACCENT);
        self.text(
            right - banner_width + 40.0,
            top + 10.0 + 14.5,
            18.0,
            FontWeight::Bold,
            Shade::WHITE,
            "QUOTE",
        );

        let mut right_bottom = top + banner_height + 15.0;
        for (label, value) in
            [("REFERENCE NO.    ", request.quote.number.as_str()), ("DATE:    ", request.quote.date.as_str())]
        {
            let value_x = right - text_width(value, FontWeight::Regular, 9.0);
            let label_x = value_x - text_width(label, FontWeight::Bold, 9.0);
            let baseline = right_bottom + 11.0;
            self.text(label_x, baseline, 9.0, FontWeight::Bold, Shade::INK, label);
            self.text(value_x, baseline, 9.0, FontWeight::Regular, Shade::INK, value);
            right_bottom += 14.4;
        }

        let rule_y = left_bottom.max(right_bottom) + 20.0;
        self.rect(MARGIN, rule_y, CONTENT_WIDTH, 1.0, Shade::RULE);
        self.cursor = rule_y + 1.0 + 40.0;
    }

    fn quote_for(&mut self, request: &QuoteRequest) {
        self.text(MARGIN, self.cursor + 10.0, 11.0, FontWeight::Bold, Shade::INK, "Quote for");
        self.cursor += 13.2 + 8.0;

        let client = &request.client;
        let lines = [client.name.as_str(), client.company.as_str()]
            .into_iter()
            .chain(client.address.lines())
            .chain([client.phone.as_str()])
            .map(str::trim)
            .filter(|line| !line.is_empty());
        for line in lines {
            for wrapped in wrap(line, FontWeight::Regular, 10.0, CONTENT_WIDTH) {
                self.ensure_room(16.0);
                self.text(MARGIN, self.cursor + 12.0, 10.0, FontWeight::Regular, Shade::INK, &wrapped);
                self.cursor += 16.0;
            }
        }
        self.cursor += 25.0;
    }

    fn columns() -> (f32, f32, f32) {
        let inner = CONTENT_WIDTH - 2.0 * CELL_PADDING;
        (inner * 0.65, inner * 0.15, inner * 0.20)
    }

    fn table_header(&mut self) {
        let (description, qty, total) = Self::columns();
        let height = Self::header_height();
        let x = MARGIN + CELL_PADDING;
        let baseline = self.cursor + CELL_PADDING + 9.0;

        self.rect(MARGIN, self.cursor, CONTENT_WIDTH, height, Shade::ACCENT);
        self.text(x, baseline, 10.0, FontWeight::Bold, Shade::WHITE, "DESCRIPTION");
        let qty_x = x + description + (qty - text_width("QTY", FontWeight::Bold, 10.0)) / 2.0;
        self.text(qty_x, baseline, 10.0, FontWeight::Bold, Shade::WHITE, "QTY");
        let total_x = x + description + qty + total - text_width("TOTAL", FontWeight::Bold, 10.0);
        self.text(total_x, baseline, 10.0, FontWeight::Bold, Shade::WHITE, "TOTAL");
        self.cursor += height;
    }

    fn row_lines(item: &LineItem) -> Vec<RowLine> {
        let (description, _, _) = Self::columns();
        let wrap_width = description - 15.0;
        let mut lines = Vec::new();

        if let Some(project) = item.project_name() {
            for text in wrap(project, FontWeight::Bold, 9.0, wrap_width) {
                lines.push(RowLine { text, weight: FontWeight::Bold, indent: 0.0, gap_before: 0.0 });
            }
        }
        let project_lines = lines.len();

        for raw in item.description.split('\n') {
            let trimmed = raw.trim();
            let bulleted = trimmed.starts_with(BULLET);
            let (indent, gap) = if bulleted { (BULLET_INDENT, 2.0) } else { (0.0, 0.0) };
            for (index, text) in
                wrap(trimmed, FontWeight::Regular, 9.0, wrap_width - indent).into_iter().enumerate()
            {
                let mut gap_before = if index == 0 { gap } else { 0.0 };
                if lines.len() == project_lines && project_lines > 0 {
                    gap_before += 3.0;
                }
                lines.push(RowLine { text, weight: FontWeight::Regular, indent, gap_before });
            }
        }
        lines
    }

    fn row_height(lines: &[RowLine]) -> f32 {
        let content: f32 = lines.iter().map(|line| ROW_LINE_HEIGHT + line.gap_before).sum();
        2.0 * CELL_PADDING + content.max(ROW_LINE_HEIGHT) + 1.0
    }

    fn header_height() -> f32 {
        2.0 * CELL_PADDING + 12.0
    }

    /// Number of leading `lines` whose row segment fits in `available` points.
    fn lines_that_fit(lines: &[RowLine], available: f32) -> usize {
        (1..=lines.len())
            .take_while(|&count| Self::row_height(&lines[..count]) <= available)
            .last()
            .unwrap_or(0)
    }

    fn continue_table_on_new_page(&mut self) {
        self.pages.push(LayoutPage::default());
        self.cursor = MARGIN;
        self.table_header();
    }

    fn table(&mut self, items: &[LineItem]) {
        self.cursor += 20.0;
        let page_room = Self::limit() - MARGIN - Self::header_height();
        let first_row = items
            .first()
            .map(|item| {
                let lines = Self::row_lines(item);
                let height = Self::row_height(&lines);
                if height <= page_room { height } else { Self::row_height(&lines[..1]) }
            })
            .unwrap_or(0.0);
        self.ensure_room(Self::header_height() + first_row);
        self.table_header();

        for (index, item) in items.iter().enumerate() {
            let lines = Self::row_lines(item);
            let height = Self::row_height(&lines);
            if self.cursor + height > Self::limit() && height <= page_room {
                self.continue_table_on_new_page();
            }

            // Rows taller than a page continue on the next one with the same shade.
            let shade = if index % 2 == 0 { Shade::ROW_BASE } else { Shade::ROW_ALT };
            let mut remaining: &[RowLine] = &lines;
            let mut amounts = Some(item);
            loop {
                let mut fit = Self::lines_that_fit(remaining, Self::limit() - self.cursor);
                if fit == 0 && !remaining.is_empty() {
                    self.continue_table_on_new_page();
                    fit = Self::lines_that_fit(remaining, Self::limit() - self.cursor).max(1);
                }
                let (segment, rest) = remaining.split_at(fit);
                self.row_segment(segment, shade, amounts.take());
                if rest.is_empty() {
                    break;
                }
                remaining = rest;
                self.continue_table_on_new_page();
            }
        }
    }

    /// Draws one page's worth of a row. Quantity and total only accompany the first segment.
    fn row_segment(&mut self, lines: &[RowLine], shade: Shade, amounts: Option<&LineItem>) {
        let (description, qty, total) = Self::columns();
        let x = MARGIN + CELL_PADDING;
        let height = Self::row_height(lines);
        let top = self.cursor;
        self.rect(MARGIN, top, CONTENT_WIDTH, height - 1.0, shade);
        self.rect(MARGIN, top + height - 1.0, CONTENT_WIDTH, 1.0, Shade::RULE);

        let mut baseline = top + CELL_PADDING;
        for line in lines {
            baseline += line.gap_before;
            self.text(x + line.indent, baseline + 9.0, 9.0, line.weight, Shade::INK, &line.text);
            baseline += ROW_LINE_HEIGHT;
        }

        if let Some(item) = amounts {
            let first_baseline = top + CELL_PADDING + 9.0;
            let qty_text = item.qty.trim();
            let qty_x = x + description + (qty - text_width(qty_text, FontWeight::Regular, 9.0)) / 2.0;
            self.text(qty_x, first_baseline, 9.0, FontWeight::Regular, Shade::INK, qty_text);

            let amount = format_amount(parse_amount_or_zero(&item.total));
            let total_x =
                x + description + qty + total - text_width(&amount, FontWeight::Regular, 9.0);
            self.text(total_x, first_baseline, 9.0, FontWeight::Regular, Shade::INK, &amount);
        }

        self.cursor += height;
    }

    fn total_row(&mut self, amount: &str) {
        let height = 2.0 * CELL_PADDING + 13.2;
        self.ensure_room(height + 1.0);
        let top = self.cursor;
        let baseline = top + CELL_PADDING + 10.0;

        self.rect(MARGIN, top, CONTENT_WIDTH, height, Shade::TOTAL_BAND);
        self.rect(MARGIN, top + height, CONTENT_WIDTH, 1.0, Shade::INK);
        self.text(MARGIN + CELL_PADDING, baseline, 11.0, FontWeight::Bold, Shade::INK, "Total");
        let amount_x = PAGE_WIDTH - MARGIN - CELL_PADDING - text_width(amount, FontWeight::Bold, 11.0);
        self.text(amount_x, baseline, 11.0, FontWeight::Bold, Shade::INK, amount);
        self.cursor += height + 1.0;
    }

    fn remarks(&mut self) {
        let body = wrap(REMARKS_TEXT, FontWeight::Regular, 9.0, CONTENT_WIDTH);
        let height = 40.0 + 12.0 + 8.0 + body.len() as f32 * 14.4;
        if !self.ensure_room(height) {
            self.cursor += 40.0;
        }

        self.text(MARGIN, self.cursor + 9.0, 10.0, FontWeight::Bold, Shade::INK, REMARKS_TITLE);
        self.cursor += 12.0 + 8.0;
        for line in body {
            self.text(MARGIN, self.cursor + 11.0, 9.0, FontWeight::Regular, Shade::INK, &line);
            self.cursor += 14.4;
        }
    }

    fn finish(mut self, options: &RenderOptions) -> QuoteLayout {
        let footer = format!("© {} {}. All rights reserved.", options.year, options.company_name);
        let x = (PAGE_WIDTH - text_width(&footer, FontWeight::Regular, 8.0)) / 2.0;
        for page in &mut self.pages {
            page.elements.push(Element::Text(TextRun {
                x,
                baseline: FOOTER_BASELINE,
                size: 8.0,
                weight: FontWeight::Regular,
                color: Shade::MUTED,
                content: footer.clone(),
            }));
        }
        QuoteLayout { pages: self.pages }
    }
}

fn encode(layout: &QuoteLayout, logo: &LogoImage, title: &str) -> Result<Vec<u8>, RenderError> {
    let encode_error = |error: printpdf::Error| RenderError::Encode(error.to_string());

    let (document, first_page, first_layer) =
        PdfDocument::new(title, mm(PAGE_WIDTH), mm(PAGE_HEIGHT), "Layer 1");
    let regular = document.add_builtin_font(BuiltinFont::Helvetica).map_err(encode_error)?;
    let bold = document.add_builtin_font(BuiltinFont::HelveticaBold).map_err(encode_error)?;

    for (index, page) in layout.pages.iter().enumerate() {
        let (page_index, layer_index) = if index == 0 {
            (first_page, first_layer)
        } else {
            document.add_page(mm(PAGE_WIDTH), mm(PAGE_HEIGHT), "Layer 1")
        };
        let layer = document.get_page(page_index).get_layer(layer_index);
        for element in &page.elements {
            draw(&layer, element, logo, &regular, &bold);
        }
    }

    document.save_to_bytes().map_err(encode_error)
}

fn draw(
    layer: &PdfLayerReference,
    element: &Element,
    logo: &LogoImage,
    regular: &IndirectFontRef,
    bold: &IndirectFontRef,
) {
    match element {
        Element::Rect(block) => {
            layer.set_fill_color(block.color.to_color());
            layer.add_rect(Rect::new(
                mm(block.x),
                mm(PAGE_HEIGHT - block.y - block.height),
                mm(block.x + block.width),
                mm(PAGE_HEIGHT - block.y),
            ));
        }
        Element::Text(run) => {
            let font = match run.weight {
                FontWeight::Regular => regular,
                FontWeight::Bold => bold,
            };
            layer.set_fill_color(run.color.to_color());
            layer.use_text(
                run.content.as_str(),
                run.size,
                mm(run.x),
                mm(PAGE_HEIGHT - run.baseline),
                font,
            );
        }
        Element::Logo(block) => {
            let (width, height) = logo.dimensions();
            let natural_width = width as f32 * 72.0 / LOGO_DPI;
            let natural_height = height as f32 * 72.0 / LOGO_DPI;
            let image = Image::from_dynamic_image(&DynamicImage::ImageRgb8(logo.pixels.clone()));
            image.add_to_layer(
                layer.clone(),
                ImageTransform {
                    translate_x: Some(mm(block.x)),
                    translate_y: Some(mm(PAGE_HEIGHT - block.y - block.height)),
                    scale_x: Some(block.width / natural_width),
                    scale_y: Some(block.height / natural_height),
                    dpi: Some(LOGO_DPI),
                    ..Default::default()
                },
            );
        }
    }
}

fn mm(points: f32) -> Mm {
    Mm(points * 25.4 / 72.0)
}

/// Greedy word wrap against Helvetica advance widths. Words wider than the line are split.
fn wrap(text: &str, weight: FontWeight, size: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let candidate =
            if current.is_empty() { word.to_string() } else { format!("{current} {word}") };
        if text_width(&candidate, weight, size) <= max_width {
            current = candidate;
            continue;
        }
        if !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        for ch in word.chars() {
            current.push(ch);
            if text_width(&current, weight, size) > max_width && current.chars().count() > 1 {
                current.pop();
                lines.push(std::mem::replace(&mut current, ch.to_string()));
            }
        }
    }

    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

pub fn text_width(text: &str, weight: FontWeight, size: f32) -> f32 {
    let units: u32 = text.chars().map(|ch| u32::from(glyph_width(ch, weight))).sum();
    units as f32 * size / 1000.0
}

fn glyph_width(ch: char, weight: FontWeight) -> u16 {
    let table = match weight {
        FontWeight::Regular => &HELVETICA_WIDTHS,
        FontWeight::Bold => &HELVETICA_BOLD_WIDTHS,
    };
    match ch {
        ' '..='~' => table[ch as usize - 32],
        '•' => 350,
        '©' => 737,
        _ => 556,
    }
}

// Advance widths for ASCII 32..=126, from the Adobe core font metrics.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, //
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, //
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, //
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584,
];

const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, //
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, //
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, //
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, //
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, //
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584,
];

#[cfg(test)]
pub(crate) mod tests {
    use quotedesk_core::domain::quote::{
        ClientInfo, CompanyInfo, DepartmentSection, LineItem, QuoteMeta, QuoteRequest,
    };
    use rust_decimal::Decimal;

    use super::{
        layout_quote, render_request, text_width, wrap, Element, FontWeight, LogoImage,
        LogoSource, RenderError, RenderOptions, Shade, MARGIN, PAGE_HEIGHT, REMARKS_TITLE,
    };

    pub(crate) const LOGO_PNG: &[u8] = include_bytes!("../../../assets/logo.png");

    pub(crate) fn logo() -> LogoImage {
        LogoImage::decode(LOGO_PNG.to_vec()).expect("fixture logo decodes")
    }

    fn options() -> RenderOptions {
        RenderOptions { year: 2026, company_name: "Split Road Media".to_string() }
    }

    fn item(project: Option<&str>, description: &str, qty: &str, total: &str) -> LineItem {
        LineItem {
            project: project.map(str::to_string),
            description: description.to_string(),
            qty: qty.to_string(),
            total: total.to_string(),
        }
    }

    pub(crate) fn quote_request() -> QuoteRequest {
        QuoteRequest {
            company: CompanyInfo {
                address: "824 1/2 Main Street\nRochester, IN 46975".to_string(),
                phone: "844-775-4873".to_string(),
                email: "hello@splitroadmedia.com".to_string(),
            },
            client: ClientInfo {
                name: "Acme Corp".to_string(),
                company: "Acme".to_string(),
                address: "1 Road".to_string(),
                phone: "555-0100".to_string(),
                email: "buyer@acme.test".to_string(),
            },
            quote: QuoteMeta { number: "ACM46312".to_string(), date: "10/19/2026".to_string() },
            tables: vec![DepartmentSection {
                department: "Video".to_string(),
                line_items: vec![
                    item(Some("Launch"), "Shoot day\n• b-roll", "1", "1200.5"),
                    item(None, "Edit", "2", "300"),
                    item(None, "Color", "1", ""),
                ],
            }],
            cc_emails: None,
            total: Decimal::new(15005, 1),
        }
    }

    fn description_x() -> f32 {
        MARGIN + 12.0
    }

    #[test]
    fn total_row_uses_declared_total_even_when_items_disagree() {
        let mut request = quote_request();
        request.total = Decimal::new(999, 0);

        let layout = layout_quote(&request, &options(), (4, 2));
        let total = layout
            .texts()
            .find(|run| run.content == "999.00")
            .expect("declared total is rendered");

        assert_eq!(total.weight, FontWeight::Bold);
        assert_eq!(total.size, 11.0);
        assert!(layout.texts().all(|run| run.content != "1500.50"));
    }

    #[test]
    fn non_numeric_line_totals_render_as_zero() {
        let mut request = quote_request();
        request.tables[0].line_items[2].total = "abc".to_string();
        let layout = layout_quote(&request, &options(), (4, 2));
        let cells: Vec<&str> = layout
            .texts()
            .filter(|run| run.size == 9.0 && run.content.contains('.'))
            .map(|run| run.content.as_str())
            .collect();

        assert!(cells.contains(&"1200.50"));
        assert!(cells.contains(&"300.00"));
        assert!(cells.contains(&"0.00"));
    }

    #[test]
    fn rows_alternate_shading_by_parity() {
        let layout = layout_quote(&quote_request(), &options(), (4, 2));
        let shades: Vec<Shade> = layout.pages[0]
            .elements
            .iter()
            .filter_map(|element| match element {
                Element::Rect(block) if block.height > 1.0 => Some(block.color),
                _ => None,
            })
            .filter(|shade| matches!(*shade, Shade::ROW_BASE | Shade::ROW_ALT))
            .collect();

        assert_eq!(shades, vec![Shade::ROW_BASE, Shade::ROW_ALT, Shade::ROW_BASE]);
    }

    #[test]
    fn bullet_lines_are_indented_and_project_is_bold() {
        let layout = layout_quote(&quote_request(), &options(), (4, 2));
        let find = |content: &str| {
            layout.texts().find(|run| run.content == content).expect("text is laid out").clone()
        };

        assert_eq!(find("Launch").weight, FontWeight::Bold);
        assert_eq!(find("Shoot day").x, description_x());
        assert_eq!(find("• b-roll").x, description_x() + 12.0);
    }

    #[test]
    fn client_email_is_not_printed_in_quote_for_block() {
        let layout = layout_quote(&quote_request(), &options(), (4, 2));

        assert!(layout.texts().any(|run| run.content == "Acme Corp"));
        assert!(layout.texts().all(|run| run.content != "buyer@acme.test"));
    }

    #[test]
    fn single_address_line_is_not_repeated() {
        let mut request = quote_request();
        request.company.address = "824 1/2 Main Street".to_string();

        let layout = layout_quote(&request, &options(), (4, 2));
        let count = layout.texts().filter(|run| run.content == "824 1/2 Main Street").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn long_tables_continue_on_new_pages_with_repeated_header() {
        let mut request = quote_request();
        request.tables[0].line_items =
            (0..60).map(|index| item(None, &format!("Item {index}"), "1", "10")).collect();

        let layout = layout_quote(&request, &options(), (4, 2));

        assert!(layout.pages.len() >= 2);
        let pages_with_rows = layout.pages.iter().filter(|page| {
            page.elements
                .iter()
                .any(|element| matches!(element, Element::Text(run) if run.content.starts_with("Item ")))
        });
        for page in pages_with_rows {
            let has_header = page.elements.iter().any(|element| {
                matches!(element, Element::Text(run) if run.content == "DESCRIPTION")
            });
            assert!(has_header);
        }
        let footers = layout
            .texts()
            .filter(|run| run.content == "© 2026 Split Road Media. All rights reserved.")
            .count();
        assert_eq!(footers, layout.pages.len());
        assert!(layout.texts().any(|run| run.content == REMARKS_TITLE));
    }

    #[test]
    fn rows_taller_than_a_page_are_split_across_pages() {
        let description: Vec<String> =
            (0..120).map(|index| format!("• deliverable line {index}")).collect();
        let mut request = quote_request();
        request.tables[0].line_items = vec![item(Some("Retainer"), &description.join("\n"), "1", "4800")];

        let layout = layout_quote(&request, &options(), (4, 2));

        assert!(layout.pages.len() >= 3);
        let footer = "© 2026 Split Road Media. All rights reserved.";
        for run in layout.texts().filter(|run| run.content != footer) {
            assert!(run.baseline <= PAGE_HEIGHT - MARGIN, "{} overflows at {}", run.content, run.baseline);
        }
        for line in &description {
            assert_eq!(layout.texts().filter(|run| &run.content == line).count(), 1);
        }
        assert_eq!(layout.texts().filter(|run| run.content == "4800.00").count(), 1);

        for page in &layout.pages {
            let texts = || {
                page.elements.iter().filter_map(|element| match element {
                    Element::Text(run) => Some(run),
                    _ => None,
                })
            };
            if !texts().any(|run| run.content.starts_with("• deliverable line")) {
                continue;
            }
            assert!(texts().any(|run| run.content == "DESCRIPTION"));
            assert!(page
                .elements
                .iter()
                .any(|element| matches!(element, Element::Rect(block) if block.color == Shade::ROW_BASE)));
        }
    }

    #[test]
    fn wrap_respects_column_width() {
        let text = "Full day shoot with two camera operators and a dedicated audio engineer";
        let lines = wrap(text, FontWeight::Regular, 9.0, 120.0);

        assert!(lines.len() > 1);
        for line in &lines {
            assert!(text_width(line, FontWeight::Regular, 9.0) <= 120.0);
        }
        assert_eq!(lines.join(" "), text);
    }

    #[test]
    fn empty_tables_still_produce_a_pdf() {
        let mut request = quote_request();
        request.tables.clear();

        let rendered = render_request(&request, &logo(), &options()).expect("renders");

        assert!(rendered.as_bytes().starts_with(b"%PDF"));
        assert_eq!(rendered.page_count(), 1);
    }

    #[test]
    fn logo_fixture_is_png() {
        assert_eq!(logo().mime(), "image/png");
    }

    #[test]
    fn undecodable_logo_is_a_render_error() {
        let error = LogoImage::decode(b"not an image".to_vec()).expect_err("garbage logo");
        assert!(matches!(error, RenderError::LogoDecode(_)));
    }

    #[tokio::test]
    async fn missing_logo_fails_the_render() {
        let source = LogoSource::new("/nonexistent/quotedesk/logo.png");

        let error = source.load().await.expect_err("missing logo");

        assert!(matches!(error, RenderError::LogoUnavailable { .. }));
        assert!(!source.is_readable().await);
    }
}
