//! Grayscale page composition.
//!
//! Pages are drawn in 8-bit grayscale: decoded, decorated with outlined
//! speech-bubble ellipses at the template's bubble boxes, lettered with the
//! dialogue when a font is loaded, and encoded as JPEG.

use std::path::Path;

use ab_glyph::{Font, FontArc, InvalidFont, PxScale, ScaleFont};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{GrayImage, ImageError, Luma};
use imageproc::drawing::{draw_text_mut, text_size};
use thiserror::Error;

use crate::template::{Bubble, DIALOGUE, PanelLayout, Rect, TextFit};

const WHITE: Luma<u8> = Luma([255]);
const BLACK: Luma<u8> = Luma([0]);

/// Outline width of a bubble drawn on a generated meme page.
pub const BUBBLE_BORDER: u32 = 3;

/// Outline width of a bubble on an assembled page.
pub const PANEL_BUBBLE_BORDER: u32 = 5;

/// Frame width around each panel of an assembled page.
pub const PANEL_BORDER: u32 = 8;

/// Distance between wrapped lines, relative to the font's line height.
const LINE_SPACING: f32 = 1.18;

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] ImageError),

    #[error("image has no pixels")]
    Empty,

    #[error("failed to encode image: {0}")]
    Encode(#[source] ImageError),

    #[error("failed to read font: {0}")]
    FontRead(#[source] std::io::Error),

    #[error("not a usable font: {0}")]
    FontInvalid(#[source] InvalidFont),
}

/// Loads a TrueType or OpenType font.
pub fn load_font(path: &Path) -> Result<FontArc, ComposeError> {
    let data = std::fs::read(path).map_err(ComposeError::FontRead)?;
    FontArc::try_from_vec(data).map_err(ComposeError::FontInvalid)
}

/// Decodes any supported format into grayscale.
pub fn decode_gray(data: &[u8]) -> Result<GrayImage, ComposeError> {
    let image = image::load_from_memory(data)
        .map_err(ComposeError::Decode)?
        .to_luma8();
    if image.width() == 0 || image.height() == 0 {
        return Err(ComposeError::Empty);
    }
    Ok(image)
}

pub fn encode_jpeg(image: &GrayImage, quality: u8) -> Result<Vec<u8>, ComposeError> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(image)
        .map_err(ComposeError::Encode)?;
    Ok(out)
}

/// Fills the ellipse inscribed in `rect` with white and outlines it.
pub fn draw_bubble(image: &mut GrayImage, rect: Rect, border: u32) {
    if rect.width == 0 || rect.height == 0 {
        return;
    }
    let a = rect.width as f64 / 2.0;
    let b = rect.height as f64 / 2.0;
    let cx = rect.x as f64 + a;
    let cy = rect.y as f64 + b;
    let inner_a = a - border as f64;
    let inner_b = b - border as f64;

    let x_end = rect.x.saturating_add(rect.width).min(image.width());
    let y_end = rect.y.saturating_add(rect.height).min(image.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if (dx / a).powi(2) + (dy / b).powi(2) > 1.0 {
                continue;
            }
            let interior = inner_a > 0.0
                && inner_b > 0.0
                && (dx / inner_a).powi(2) + (dy / inner_b).powi(2) <= 1.0;
            image.put_pixel(x, y, if interior { WHITE } else { BLACK });
        }
    }
}

/// Centres `text` inside `rect`, wrapping per character and shrinking the font
/// from `fit.max_size` in steps of two until the block fits. Text that does
/// not fit at `fit.min_size` is drawn at that size anyway.
pub fn letter_bubble(image: &mut GrayImage, rect: Rect, text: &str, font: &FontArc, fit: TextFit) {
    let content_w = rect.width.saturating_sub(2 * fit.padding);
    let content_h = rect.height.saturating_sub(2 * fit.padding) as f32;

    let mut size = fit.max_size.max(1);
    let (scale, lines) = loop {
        let scale = PxScale::from(size as f32);
        let lines = wrap(font, scale, text, content_w);
        if block_height(font, scale, lines.len()) <= content_h || size <= fit.min_size.max(1) {
            break (scale, lines);
        }
        size = size.saturating_sub(2).max(fit.min_size.max(1));
    };

    let step = font.as_scaled(scale).height() * LINE_SPACING;
    let top = rect.y as f32 + (rect.height as f32 - block_height(font, scale, lines.len())) / 2.0;
    for (index, line) in lines.iter().enumerate() {
        let (width, _) = text_size(scale, font, line);
        let x = rect.x as i32 + (rect.width as i32 - width as i32) / 2;
        let y = (top + index as f32 * step) as i32;
        draw_text_mut(image, BLACK, x, y, scale, font, line);
    }
}

/// Greedy per-character wrap; a line always keeps at least one character.
fn wrap(font: &FontArc, scale: PxScale, text: &str, max_width: u32) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if current.chars().count() > 1 && text_size(scale, font, &current).0 > max_width {
            current.pop();
            lines.push(std::mem::take(&mut current));
            current.push(ch);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn block_height(font: &FontArc, scale: PxScale, lines: usize) -> f32 {
    lines as f32 * font.as_scaled(scale).height() * LINE_SPACING
}

/// Draws a frame of `border` pixels along the inside of `rect`.
pub fn draw_frame(image: &mut GrayImage, rect: Rect, border: u32) {
    let x_end = rect.x.saturating_add(rect.width).min(image.width());
    let y_end = rect.y.saturating_add(rect.height).min(image.height());
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            let edge = x < rect.x + border
                || y < rect.y + border
                || x + border >= rect.x + rect.width
                || y + border >= rect.y + rect.height;
            if edge {
                image.put_pixel(x, y, BLACK);
            }
        }
    }
}

/// Scales `image` to fit `width`×`height` and centres it on white.
pub fn letterbox(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let scale = f64::min(
        width as f64 / image.width() as f64,
        height as f64 / image.height() as f64,
    );
    let fit_w = ((image.width() as f64 * scale) as u32).clamp(1, width);
    let fit_h = ((image.height() as f64 * scale) as u32).clamp(1, height);
    let resized = imageops::resize(image, fit_w, fit_h, FilterType::Lanczos3);

    let mut canvas = GrayImage::from_pixel(width, height, WHITE);
    imageops::replace(
        &mut canvas,
        &resized,
        ((width - fit_w) / 2) as i64,
        ((height - fit_h) / 2) as i64,
    );
    canvas
}

/// Shrinks `image` so neither side exceeds `max_side`.
pub fn fit_within(image: GrayImage, max_side: u32) -> GrayImage {
    let longest = image.width().max(image.height());
    if longest <= max_side {
        return image;
    }
    let scale = max_side as f64 / longest as f64;
    let width = ((image.width() as f64 * scale).round() as u32).clamp(1, max_side);
    let height = ((image.height() as f64 * scale).round() as u32).clamp(1, max_side);
    imageops::resize(&image, width, height, FilterType::Lanczos3)
}

// =============================================================================
// Pages
// =============================================================================

/// Draws one bubble per panel, lettered with the dialogue when `font` is set.
fn draw_bubbles(
    image: &mut GrayImage,
    panels: &[Rect; 3],
    bubbles: &[Bubble; 3],
    border: u32,
    font: Option<&FontArc>,
) {
    for ((panel, bubble), line) in panels.iter().zip(bubbles).zip(DIALOGUE) {
        let rect = panel.relative(bubble.area);
        draw_bubble(image, rect, border);
        if let Some(font) = font {
            letter_bubble(image, rect, line, font, bubble.fit);
        }
    }
}

/// Draws the bubbles of `layout` onto a generated page of any size.
pub fn decorate_page(
    page: &mut GrayImage,
    layout: &PanelLayout,
    bubbles: &[Bubble; 3],
    font: Option<&FontArc>,
) {
    let panels = layout.panels_on(page.width(), page.height());
    draw_bubbles(page, &panels, bubbles, BUBBLE_BORDER, font);
}

/// Turns a generated meme page into the JPEG that is sent back.
pub fn render_meme(
    generated: &[u8],
    layout: &PanelLayout,
    bubbles: &[Bubble; 3],
    font: Option<&FontArc>,
) -> Result<Vec<u8>, ComposeError> {
    let mut page = decode_gray(generated)?;
    decorate_page(&mut page, layout, bubbles, font);
    encode_jpeg(&page, 92)
}

/// Places three separately generated panels on a white template canvas.
pub fn assemble_panels(
    panels: &[GrayImage; 3],
    layout: &PanelLayout,
    bubbles: &[Bubble; 3],
    font: Option<&FontArc>,
) -> GrayImage {
    let (width, height) = layout.canvas_size();
    let mut canvas = GrayImage::from_pixel(width, height, WHITE);

    let boxes = layout.panels();
    for (panel, rect) in panels.iter().zip(boxes) {
        let fitted = letterbox(panel, rect.width, rect.height);
        imageops::replace(&mut canvas, &fitted, rect.x as i64, rect.y as i64);
        draw_frame(&mut canvas, rect, PANEL_BORDER);
    }
    draw_bubbles(&mut canvas, &boxes, bubbles, PANEL_BUBBLE_BORDER, font);
    canvas
}
