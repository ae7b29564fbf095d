use std::io::Cursor;

use image::{DynamicImage, ImageOutputFormat, Rgb, RgbImage};

use crate::error::ReportError;
use crate::metrics::classification::ConfusionMatrix;
use crate::train::epoch_stats::TrainingHistory;

const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([60, 60, 60]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const TRAIN: Rgb<u8> = Rgb([31, 119, 180]);
const VAL: Rgb<u8> = Rgb([255, 127, 14]);

const CELL: u32 = 48;
const PANEL_W: u32 = 480;
const PANEL_H: u32 = 320;
const MARGIN: u32 = 32;

/// Heatmap of the confusion matrix: one square per cell, shaded from white
/// (zero) to dark blue (the largest count), true classes top to bottom.
pub fn confusion_matrix_png(cm: &ConfusionMatrix) -> Result<Vec<u8>, ReportError> {
    let k = cm.num_classes() as u32;
    if k == 0 {
        return Err(ReportError::Empty("confusion matrix has no classes"));
    }
    let max = cm.max_count().max(1) as f64;
    let side = k * CELL + 2 * MARGIN;
    let mut img = RgbImage::from_pixel(side, side, WHITE);

    for (row, counts) in cm.counts.iter().enumerate() {
        for (col, &count) in counts.iter().enumerate() {
            let colour = blues(count as f64 / max);
            let x0 = MARGIN + col as u32 * CELL;
            let y0 = MARGIN + row as u32 * CELL;
            fill_rect(&mut img, x0 + 1, y0 + 1, CELL - 2, CELL - 2, colour);
        }
    }
    draw_rect(&mut img, MARGIN, MARGIN, k * CELL, k * CELL, AXIS);
    encode(img)
}

/// Two panels side by side: loss (left) and accuracy (right), each with a
/// train (blue) and validation (orange) line over the epochs.
pub fn training_history_png(history: &TrainingHistory) -> Result<Vec<u8>, ReportError> {
    if history.is_empty() {
        return Err(ReportError::Empty("training history is empty"));
    }
    let mut img = RgbImage::from_pixel(2 * PANEL_W, PANEL_H, WHITE);

    let train_loss: Vec<f64> = history.iter().map(|e| e.train_loss).collect();
    let val_loss: Vec<f64> = history.iter().map(|e| e.val_loss).collect();
    let train_acc: Vec<f64> = history.iter().map(|e| e.train_accuracy).collect();
    let val_acc: Vec<f64> = history.iter().map(|e| e.val_accuracy).collect();

    let (lo, hi) = range(train_loss.iter().chain(&val_loss));
    draw_panel(&mut img, 0, &[(&train_loss, TRAIN), (&val_loss, VAL)], lo, hi);
    draw_panel(&mut img, PANEL_W, &[(&train_acc, TRAIN), (&val_acc, VAL)], 0.0, 1.0);
    encode(img)
}

fn draw_panel(img: &mut RgbImage, x_off: u32, series: &[(&Vec<f64>, Rgb<u8>)], lo: f64, hi: f64) {
    let left = x_off + MARGIN;
    let top = MARGIN;
    let width = PANEL_W - 2 * MARGIN;
    let height = PANEL_H - 2 * MARGIN;

    for i in 1..4 {
        let y = top + height * i / 4;
        draw_line(img, (left as i64, y as i64), ((left + width) as i64, y as i64), GRID);
    }
    draw_rect(img, left, top, width, height, AXIS);

    let span = if hi > lo { hi - lo } else { 1.0 };
    for (values, colour) in series {
        let n = values.len();
        let point = |i: usize, v: f64| -> (i64, i64) {
            let fx = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.5 };
            let fy = ((v - lo) / span).clamp(0.0, 1.0);
            (
                left as i64 + (fx * width as f64).round() as i64,
                (top + height) as i64 - (fy * height as f64).round() as i64,
            )
        };
        let points: Vec<(i64, i64)> = values
            .iter()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .map(|(i, &v)| point(i, v))
            .collect();
        for pair in points.windows(2) {
            draw_line(img, pair[0], pair[1], *colour);
        }
        for &(x, y) in &points {
            fill_rect(img, (x - 2).max(0) as u32, (y - 2).max(0) as u32, 5, 5, *colour);
        }
    }
}

fn range<'a>(values: impl Iterator<Item = &'a f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    if lo.is_finite() { (lo.min(0.0), hi) } else { (0.0, 1.0) }
}

/// White → dark blue ramp for `t` in [0, 1].
fn blues(t: f64) -> Rgb<u8> {
    let t = t.clamp(0.0, 1.0);
    let lerp = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    Rgb([lerp(247.0, 8.0), lerp(251.0, 48.0), lerp(255.0, 107.0)])
}

fn put(img: &mut RgbImage, x: i64, y: i64, colour: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < img.width() && (y as u32) < img.height() {
        img.put_pixel(x as u32, y as u32, colour);
    }
}

fn fill_rect(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, colour: Rgb<u8>) {
    for y in y0..y0 + h {
        for x in x0..x0 + w {
            put(img, x as i64, y as i64, colour);
        }
    }
}

fn draw_rect(img: &mut RgbImage, x0: u32, y0: u32, w: u32, h: u32, colour: Rgb<u8>) {
    let (x0, y0, x1, y1) = (x0 as i64, y0 as i64, (x0 + w) as i64, (y0 + h) as i64);
    draw_line(img, (x0, y0), (x1, y0), colour);
    draw_line(img, (x1, y0), (x1, y1), colour);
    draw_line(img, (x1, y1), (x0, y1), colour);
    draw_line(img, (x0, y1), (x0, y0), colour);
}

// Bresenham
fn draw_line(img: &mut RgbImage, (mut x, mut y): (i64, i64), (x1, y1): (i64, i64), colour: Rgb<u8>) {
    let dx = (x1 - x).abs();
    let dy = -(y1 - y).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        put(img, x, y, colour);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

fn encode(img: RgbImage) -> Result<Vec<u8>, ReportError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img).write_to(&mut Cursor::new(&mut buf), ImageOutputFormat::Png)?;
    Ok(buf)
}
