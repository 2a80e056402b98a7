use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use tracing::debug;

use crate::{
    error::{Result, TrainError},
    training::{
        identity::RunIdentity,
        metrics::{MetricsHistory, Phase},
    },
};

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
const MARGIN_LEFT: i64 = 56;
const MARGIN_RIGHT: i64 = 24;
const MARGIN_TOP: i64 = 24;
const MARGIN_BOTTOM: i64 = 40;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([0, 0, 0]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const TRAIN: Rgb<u8> = Rgb([31, 64, 220]);
const VAL: Rgb<u8> = Rgb([220, 40, 40]);

/// Which pair of series a chart shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurveKind {
    Loss,
    Accuracy,
}

impl CurveKind {
    pub const ALL: [CurveKind; 2] = [CurveKind::Loss, CurveKind::Accuracy];

    fn file_prefix(&self) -> &'static str {
        match self {
            CurveKind::Loss => "train_loss",
            CurveKind::Accuracy => "train_acc",
        }
    }

    fn series<'a>(&self, history: &'a MetricsHistory, phase: Phase) -> &'a [f64] {
        match self {
            CurveKind::Loss => history.loss(phase),
            CurveKind::Accuracy => history.accuracy(phase),
        }
    }
}

/// Draws train/val line charts of a run's history to JPEG files.
///
/// The legend is drawn the first time each kind is rendered by this
/// renderer and left off afterwards.
#[derive(Debug)]
pub struct CurveRenderer {
    dir: PathBuf,
    legend_drawn: HashSet<CurveKind>,
}

impl CurveRenderer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            legend_drawn: HashSet::new(),
        }
    }

    pub fn path(&self, kind: CurveKind, identity: &RunIdentity) -> PathBuf {
        self.dir.join(identity.curve_file_name(kind.file_prefix()))
    }

    pub fn legend_drawn(&self, kind: CurveKind) -> bool {
        self.legend_drawn.contains(&kind)
    }

    /// Plots epochs `1..=epoch` of both phases and overwrites the image.
    pub fn render(
        &mut self,
        kind: CurveKind,
        epoch: usize,
        identity: &RunIdentity,
        history: &MetricsHistory,
    ) -> Result<PathBuf> {
        let train = kind.series(history, Phase::Train);
        let val = kind.series(history, Phase::Val);
        let n = epoch.min(train.len()).min(val.len());
        let (train, val) = (&train[..n], &val[..n]);

        let mut canvas = Canvas::new(WIDTH, HEIGHT);
        let frame = Frame::fit(n, train.iter().chain(val).copied());
        canvas.draw_frame(&frame);
        canvas.draw_series(&frame, train, TRAIN);
        canvas.draw_series(&frame, val, VAL);
        if self.legend_drawn.insert(kind) {
            canvas.draw_legend();
        }

        fs::create_dir_all(&self.dir).map_err(|e| TrainError::io(&self.dir, e))?;
        let path = self.path(kind, identity);
        canvas.save(&path)?;
        debug!("Rendered {:?} curve to {}", kind, path.display());
        Ok(path)
    }
}

/// Maps epoch/value pairs into the plot area.
struct Frame {
    epochs: usize,
    y_min: f64,
    y_max: f64,
}

impl Frame {
    fn fit(epochs: usize, values: impl Iterator<Item = f64>) -> Self {
        let (mut lo, mut hi) = values
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        if !lo.is_finite() {
            lo = 0.0;
            hi = 1.0;
        }
        if hi - lo < 1e-12 {
            lo -= 0.5;
            hi += 0.5;
        }
        let pad = (hi - lo) * 0.05;
        Self {
            epochs,
            y_min: lo - pad,
            y_max: hi + pad,
        }
    }

    fn x(&self, epoch: usize) -> i64 {
        let left = MARGIN_LEFT;
        let right = WIDTH as i64 - MARGIN_RIGHT;
        if self.epochs <= 1 {
            return (left + right) / 2;
        }
        let t = (epoch - 1) as f64 / (self.epochs - 1) as f64;
        left + ((right - left) as f64 * t).round() as i64
    }

    fn y(&self, value: f64) -> i64 {
        let top = MARGIN_TOP;
        let bottom = HEIGHT as i64 - MARGIN_BOTTOM;
        let value = if value.is_finite() { value } else { self.y_max };
        let t = (value - self.y_min) / (self.y_max - self.y_min);
        bottom - ((bottom - top) as f64 * t).round() as i64
    }
}

struct Canvas {
    image: RgbImage,
}

impl Canvas {
    fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::from_pixel(width, height, BACKGROUND),
        }
    }

    fn put(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        if x >= 0 && y >= 0 && (x as u32) < self.image.width() && (y as u32) < self.image.height() {
            self.image.put_pixel(x as u32, y as u32, color);
        }
    }

    fn line(&mut self, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>, thick: bool) {
        let (dx, dy) = ((x1 - x0).abs(), -(y1 - y0).abs());
        let (sx, sy) = (if x0 < x1 { 1 } else { -1 }, if y0 < y1 { 1 } else { -1 });
        let (mut x, mut y, mut err) = (x0, y0, dx + dy);
        loop {
            self.put(x, y, color);
            if thick {
                self.put(x + 1, y, color);
                self.put(x, y + 1, color);
            }
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

    fn dot(&mut self, cx: i64, cy: i64, radius: i64, color: Rgb<u8>) {
        for y in -radius..=radius {
            for x in -radius..=radius {
                if x * x + y * y <= radius * radius {
                    self.put(cx + x, cy + y, color);
                }
            }
        }
    }

    fn draw_frame(&mut self, frame: &Frame) {
        let left = MARGIN_LEFT;
        let right = WIDTH as i64 - MARGIN_RIGHT;
        let top = MARGIN_TOP;
        let bottom = HEIGHT as i64 - MARGIN_BOTTOM;

        for i in 0..=4 {
            let y = top + (bottom - top) * i / 4;
            self.line((left, y), (right, y), GRID, false);
        }
        self.line((left, top), (left, bottom), AXIS, false);
        self.line((left, bottom), (right, bottom), AXIS, false);

        let step = (frame.epochs / 10).max(1);
        for epoch in (1..=frame.epochs).step_by(step) {
            let x = frame.x(epoch);
            self.line((x, bottom), (x, bottom + 5), AXIS, false);
        }
    }

    fn draw_series(&mut self, frame: &Frame, values: &[f64], color: Rgb<u8>) {
        let points: Vec<(i64, i64)> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (frame.x(i + 1), frame.y(v)))
            .collect();
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color, true);
        }
        for &(x, y) in &points {
            self.dot(x, y, 4, color);
        }
    }

    fn draw_legend(&mut self) {
        let right = WIDTH as i64 - MARGIN_RIGHT;
        let (x0, y0) = (right - 96, MARGIN_TOP + 8);
        let (x1, y1) = (right - 8, MARGIN_TOP + 56);
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.put(x, y, BACKGROUND);
            }
        }
        self.line((x0, y0), (x1, y0), AXIS, false);
        self.line((x0, y1), (x1, y1), AXIS, false);
        self.line((x0, y0), (x0, y1), AXIS, false);
        self.line((x1, y0), (x1, y1), AXIS, false);

        for (row, (label, color)) in [("train", TRAIN), ("val", VAL)].into_iter().enumerate() {
            let y = y0 + 14 + row as i64 * 22;
            self.line((x0 + 8, y), (x0 + 32, y), color, true);
            self.dot(x0 + 20, y, 4, color);
            self.text(x0 + 42, y - 5, label, AXIS);
        }
    }

    fn text(&mut self, x: i64, y: i64, text: &str, color: Rgb<u8>) {
        const SCALE: i64 = 2;
        let mut cursor = x;
        for ch in text.chars() {
            if let Some(rows) = glyph(ch) {
                for (ry, bits) in rows.iter().enumerate() {
                    for rx in 0..3 {
                        if bits & (0b100 >> rx) != 0 {
                            for sy in 0..SCALE {
                                for sx in 0..SCALE {
                                    self.put(
                                        cursor + rx * SCALE + sx,
                                        y + ry as i64 * SCALE + sy,
                                        color,
                                    );
                                }
                            }
                        }
                    }
                }
            }
            cursor += 4 * SCALE;
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        self.image
            .save_with_format(path, ImageFormat::Jpeg)
            .map_err(|source| TrainError::Render {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// 3x5 bitmaps for the legend labels.
fn glyph(ch: char) -> Option<[u8; 5]> {
    Some(match ch {
        't' => [0b010, 0b111, 0b010, 0b010, 0b011],
        'r' => [0b000, 0b110, 0b101, 0b100, 0b100],
        'a' => [0b000, 0b011, 0b101, 0b101, 0b011],
        'i' => [0b010, 0b000, 0b010, 0b010, 0b010],
        'n' => [0b000, 0b110, 0b101, 0b101, 0b101],
        'v' => [0b000, 0b101, 0b101, 0b101, 0b010],
        'l' => [0b010, 0b010, 0b010, 0b010, 0b011],
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(epochs: usize) -> MetricsHistory {
        let mut history = MetricsHistory::new();
        for e in 1..=epochs {
            history.record(Phase::Train, 1.0 / e as f64, 40.0 + e as f64);
            history.record(Phase::Val, 1.2 / e as f64, 35.0 + e as f64);
            history.epoch = e;
        }
        history
    }

    #[test]
    fn writes_both_curves_under_identity_names() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = CurveRenderer::new(dir.path().join("loss_graphs"));
        let id = RunIdentity::new("Net", "Adam", "Ce");
        let history = history(3);
        let loss = renderer.render(CurveKind::Loss, 3, &id, &history).unwrap();
        let acc = renderer.render(CurveKind::Accuracy, 3, &id, &history).unwrap();
        assert!(loss.ends_with("train_loss_Net-Adam_Ce.jpg"));
        assert!(acc.ends_with("train_acc_Net-Adam_Ce.jpg"));

        let decoded = image::open(&loss).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (WIDTH, HEIGHT));
    }

    #[test]
    fn legend_is_only_drawn_on_first_render_per_kind() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = CurveRenderer::new(dir.path());
        let id = RunIdentity::default();
        assert!(!renderer.legend_drawn(CurveKind::Loss));
        renderer.render(CurveKind::Loss, 1, &id, &history(1)).unwrap();
        assert!(renderer.legend_drawn(CurveKind::Loss));
        assert!(!renderer.legend_drawn(CurveKind::Accuracy));

        // a fresh renderer starts without a legend again
        let other = CurveRenderer::new(dir.path());
        assert!(!other.legend_drawn(CurveKind::Loss));
    }

    #[test]
    fn flat_series_and_single_epoch_still_render() {
        let dir = tempfile::tempdir().unwrap();
        let mut renderer = CurveRenderer::new(dir.path());
        let mut flat = MetricsHistory::new();
        flat.record(Phase::Train, 0.5, 50.0);
        flat.record(Phase::Val, 0.5, 50.0);
        flat.epoch = 1;
        renderer
            .render(CurveKind::Accuracy, 1, &RunIdentity::default(), &flat)
            .unwrap();
    }
}
