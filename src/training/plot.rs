//! Confusion matrix heatmap rendering
//!
//! Draws the matrix as a PNG with a blue color ramp, the count in every
//! cell and the class names along both axes. Text uses a built-in 3x5
//! bitmap font (lowercase letters, digits, a little punctuation).

use std::fs;
use std::path::Path;

use image::{ImageFormat, Rgb, RgbImage};
use tracing::debug;

use super::metrics::ConfusionMatrix;
use crate::error::{IrisError, Result};

const CELL: u32 = 100;
const MARGIN: u32 = 20;
const LABEL_SCALE: u32 = 2;
const TITLE_SCALE: u32 = 3;
const COUNT_SCALE: u32 = 5;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const INK: Rgb<u8> = Rgb([33, 33, 33]);
const LIGHT: [f64; 3] = [247.0, 251.0, 255.0];
const DARK: [f64; 3] = [8.0, 48.0, 107.0];

fn glyph(c: char) -> Option<[u8; 5]> {
    let rows = match c {
        '0' => [0b111, 0b101, 0b101, 0b101, 0b111],
        '1' => [0b010, 0b110, 0b010, 0b010, 0b111],
        '2' => [0b111, 0b001, 0b111, 0b100, 0b111],
        '3' => [0b111, 0b001, 0b111, 0b001, 0b111],
        '4' => [0b101, 0b101, 0b111, 0b001, 0b001],
        '5' => [0b111, 0b100, 0b111, 0b001, 0b111],
        '6' => [0b111, 0b100, 0b111, 0b101, 0b111],
        '7' => [0b111, 0b001, 0b001, 0b001, 0b001],
        '8' => [0b111, 0b101, 0b111, 0b101, 0b111],
        '9' => [0b111, 0b101, 0b111, 0b001, 0b111],
        'a' => [0b010, 0b101, 0b111, 0b101, 0b101],
        'b' => [0b110, 0b101, 0b110, 0b101, 0b110],
        'c' => [0b011, 0b100, 0b100, 0b100, 0b011],
        'd' => [0b110, 0b101, 0b101, 0b101, 0b110],
        'e' => [0b111, 0b100, 0b110, 0b100, 0b111],
        'f' => [0b111, 0b100, 0b110, 0b100, 0b100],
        'g' => [0b011, 0b100, 0b101, 0b101, 0b011],
        'h' => [0b101, 0b101, 0b111, 0b101, 0b101],
        'i' => [0b111, 0b010, 0b010, 0b010, 0b111],
        'j' => [0b001, 0b001, 0b001, 0b101, 0b010],
        'k' => [0b101, 0b101, 0b110, 0b101, 0b101],
        'l' => [0b100, 0b100, 0b100, 0b100, 0b111],
        'm' => [0b101, 0b111, 0b111, 0b101, 0b101],
        'n' => [0b110, 0b101, 0b101, 0b101, 0b101],
        'o' => [0b010, 0b101, 0b101, 0b101, 0b010],
        'p' => [0b110, 0b101, 0b110, 0b100, 0b100],
        'q' => [0b010, 0b101, 0b101, 0b110, 0b011],
        'r' => [0b110, 0b101, 0b110, 0b101, 0b101],
        's' => [0b011, 0b100, 0b010, 0b001, 0b110],
        't' => [0b111, 0b010, 0b010, 0b010, 0b010],
        'u' => [0b101, 0b101, 0b101, 0b101, 0b111],
        'v' => [0b101, 0b101, 0b101, 0b101, 0b010],
        'w' => [0b101, 0b101, 0b111, 0b111, 0b101],
        'x' => [0b101, 0b101, 0b010, 0b101, 0b101],
        'y' => [0b101, 0b101, 0b010, 0b010, 0b010],
        'z' => [0b111, 0b001, 0b010, 0b100, 0b111],
        '.' => [0b000, 0b000, 0b000, 0b000, 0b010],
        '=' => [0b000, 0b111, 0b000, 0b111, 0b000],
        '(' => [0b001, 0b010, 0b010, 0b010, 0b001],
        ')' => [0b100, 0b010, 0b010, 0b010, 0b100],
        '_' => [0b000, 0b000, 0b000, 0b000, 0b111],
        '-' => [0b000, 0b000, 0b111, 0b000, 0b000],
        _ => return None,
    };
    Some(rows)
}

/// Horizontal advance per character at `scale`
fn advance(scale: u32) -> u32 {
    4 * scale
}

fn text_width(text: &str, scale: u32) -> u32 {
    (text.chars().count() as u32 * advance(scale)).saturating_sub(scale)
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, text: &str, scale: u32, color: Rgb<u8>) {
    for (n, c) in text.chars().enumerate() {
        let Some(rows) = glyph(c.to_ascii_lowercase()) else {
            continue;
        };
        let origin_x = x + n as u32 * advance(scale);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..3u32 {
                if bits & (0b100 >> col) != 0 {
                    fill_rect(
                        img,
                        origin_x + col * scale,
                        y + row as u32 * scale,
                        scale,
                        scale,
                        color,
                    );
                }
            }
        }
    }
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = (x + w).min(img.width());
    let y_end = (y + h).min(img.height());
    for py in y..y_end {
        for px in x..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

fn blues(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let mix = |i: usize| (LIGHT[i] + (DARK[i] - LIGHT[i]) * t).round() as u8;
    Rgb([mix(0), mix(1), mix(2)])
}

/// Render the heatmap into an in-memory image
pub fn confusion_matrix_image(cm: &ConfusionMatrix, title: &str) -> RgbImage {
    let n = cm.n_classes() as u32;
    let longest = cm.labels.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;

    let left = MARGIN + longest * advance(LABEL_SCALE) + MARGIN;
    let top = MARGIN + 5 * TITLE_SCALE + 2 * MARGIN;
    let grid = n * CELL;
    let width = (left + grid + MARGIN).max(text_width(title, TITLE_SCALE) + 2 * MARGIN);
    let height = top + grid + 5 * LABEL_SCALE * 2 + 3 * MARGIN;

    let mut img = RgbImage::from_pixel(width, height, BACKGROUND);
    draw_text(&mut img, MARGIN, MARGIN, title, TITLE_SCALE, INK);
    draw_text(&mut img, MARGIN, top - 5 * LABEL_SCALE - 6, "true", LABEL_SCALE, INK);

    let max = cm.max_count().max(1) as f64;
    for (row, label) in cm.labels.iter().enumerate() {
        let y = top + row as u32 * CELL;
        draw_text(
            &mut img,
            left - MARGIN - text_width(label, LABEL_SCALE),
            y + (CELL - 5 * LABEL_SCALE) / 2,
            label,
            LABEL_SCALE,
            INK,
        );

        for col in 0..cm.n_classes() {
            let x = left + col as u32 * CELL;
            let count = cm.counts[[row, col]];
            let intensity = count as f64 / max;
            fill_rect(&mut img, x, y, CELL, CELL, blues(intensity));

            let text = count.to_string();
            let text_color = if intensity > 0.5 { BACKGROUND } else { INK };
            draw_text(
                &mut img,
                x + (CELL.saturating_sub(text_width(&text, COUNT_SCALE))) / 2,
                y + (CELL - 5 * COUNT_SCALE) / 2,
                &text,
                COUNT_SCALE,
                text_color,
            );
        }
    }

    let below = top + grid + MARGIN / 2;
    for (col, label) in cm.labels.iter().enumerate() {
        let x = left + col as u32 * CELL;
        let w = text_width(label, LABEL_SCALE);
        draw_text(&mut img, x + CELL.saturating_sub(w) / 2, below, label, LABEL_SCALE, INK);
    }
    let caption = "predicted";
    draw_text(
        &mut img,
        left + grid.saturating_sub(text_width(caption, LABEL_SCALE)) / 2,
        below + 5 * LABEL_SCALE + MARGIN / 2,
        caption,
        LABEL_SCALE,
        INK,
    );

    img
}

/// Render the heatmap and write it to `path` as PNG.
pub fn render_confusion_matrix(
    cm: &ConfusionMatrix,
    title: &str,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    if cm.n_classes() == 0 {
        return Err(IrisError::PlotError("confusion matrix has no classes".to_string()));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let img = confusion_matrix_image(cm, title);
    img.save_with_format(path, ImageFormat::Png)?;
    debug!(path = %path.display(), width = img.width(), height = img.height(), "Confusion matrix saved");
    Ok(())
}
