//! Grouped bar charts.
//!
//! Charts are drawn with plotters. The same drawing code runs twice: once
//! on an `SVGBackend` for the chart store, and once on [`PrimitiveBackend`],
//! which records the drawing calls so PDF documents can replay them as
//! vector graphics.

use super::layout;
use crate::models::{Distribution, SCALE_MAX, SCALE_MIN};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use plotters::style::Color as _;
use plotters_backend::{
    BackendColor, BackendCoord, BackendStyle, BackendTextStyle, DrawingBackend, DrawingErrorKind,
    FontStyle,
};
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use tracing::warn;

pub const CANVAS_WIDTH: u32 = 1200;
pub const CANVAS_HEIGHT: u32 = 500;

const FONT: &str = "sans-serif";
const LEGEND_WIDTH: u32 = 110;
const LABEL_LINE_HEIGHT: u32 = 16;
const BAR_FILL: f64 = 0.8;

/// RGB colour of a recorded primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color(pub u8, pub u8, pub u8);

impl Color {
    /// Composite a translucent backend colour over white.
    fn over_white(color: BackendColor) -> Self {
        let alpha = color.alpha.clamp(0.0, 1.0);
        let blend = |c: u8| (c as f64 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        Color(blend(color.rgb.0), blend(color.rgb.1), blend(color.rgb.2))
    }
}

/// Bar colour for a rating, red (1) through green (5).
pub fn rating_color(rating: u8) -> RGBColor {
    match rating {
        5 => RGBColor(46, 125, 50),
        4 => RGBColor(124, 179, 66),
        3 => RGBColor(253, 216, 53),
        2 => RGBColor(251, 140, 0),
        _ => RGBColor(229, 57, 53),
    }
}

/// One recorded drawing call in canvas pixels, origin top-left.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        fill: Color,
    },
    Line {
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        stroke: Color,
    },
    /// Left-aligned; `y` is the text baseline.
    Text {
        x: f64,
        y: f64,
        size: f64,
        text: String,
        bold: bool,
    },
}

/// A rendered chart, addressable by its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartArtifact {
    pub name: String,
    pub title: String,
    pub width: f64,
    pub height: f64,
    pub primitives: Vec<Primitive>,
    svg: String,
}

impl ChartArtifact {
    /// The chart as a standalone SVG document.
    pub fn to_svg(&self) -> &str {
        &self.svg
    }
}

/// Plotters backend that records drawing calls as [`Primitive`]s.
///
/// Text is measured with the same Helvetica metrics the page layout uses,
/// so labels placed by plotters line up once drawn in a PDF.
pub struct PrimitiveBackend<'a> {
    size: (u32, u32),
    out: &'a mut Vec<Primitive>,
}

impl<'a> PrimitiveBackend<'a> {
    pub fn new(size: (u32, u32), out: &'a mut Vec<Primitive>) -> Self {
        Self { size, out }
    }

    fn line(&mut self, from: BackendCoord, to: BackendCoord, color: BackendColor) {
        self.out.push(Primitive::Line {
            x1: from.0 as f64,
            y1: from.1 as f64,
            x2: to.0 as f64,
            y2: to.1 as f64,
            stroke: Color::over_white(color),
        });
    }
}

impl DrawingBackend for PrimitiveBackend<'_> {
    type ErrorType = Infallible;

    fn get_size(&self) -> (u32, u32) {
        self.size
    }

    fn ensure_prepared(&mut self) -> Result<(), DrawingErrorKind<Infallible>> {
        Ok(())
    }

    fn present(&mut self) -> Result<(), DrawingErrorKind<Infallible>> {
        Ok(())
    }

    fn draw_pixel(
        &mut self,
        point: BackendCoord,
        color: BackendColor,
    ) -> Result<(), DrawingErrorKind<Infallible>> {
        if color.alpha > 0.0 {
            self.out.push(Primitive::Rect {
                x: point.0 as f64,
                y: point.1 as f64,
                w: 1.0,
                h: 1.0,
                fill: Color::over_white(color),
            });
        }
        Ok(())
    }

    fn draw_line<S: BackendStyle>(
        &mut self,
        from: BackendCoord,
        to: BackendCoord,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Infallible>> {
        let color = style.color();
        if color.alpha > 0.0 {
            self.line(from, to, color);
        }
        Ok(())
    }

    fn draw_rect<S: BackendStyle>(
        &mut self,
        upper_left: BackendCoord,
        bottom_right: BackendCoord,
        style: &S,
        fill: bool,
    ) -> Result<(), DrawingErrorKind<Infallible>> {
        let color = style.color();
        if color.alpha <= 0.0 {
            return Ok(());
        }

        let (left, top) = upper_left;
        let (right, bottom) = bottom_right;
        if fill {
            self.out.push(Primitive::Rect {
                x: left as f64,
                y: top as f64,
                w: (right - left) as f64,
                h: (bottom - top) as f64,
                fill: Color::over_white(color),
            });
        } else {
            self.line((left, top), (right, top), color);
            self.line((right, top), (right, bottom), color);
            self.line((right, bottom), (left, bottom), color);
            self.line((left, bottom), (left, top), color);
        }
        Ok(())
    }

    fn draw_path<S: BackendStyle, I: IntoIterator<Item = BackendCoord>>(
        &mut self,
        path: I,
        style: &S,
    ) -> Result<(), DrawingErrorKind<Infallible>> {
        let color = style.color();
        if color.alpha <= 0.0 {
            return Ok(());
        }
        let points: Vec<BackendCoord> = path.into_iter().collect();
        for pair in points.windows(2) {
            self.line(pair[0], pair[1], color);
        }
        Ok(())
    }

    fn draw_text<TStyle: BackendTextStyle>(
        &mut self,
        text: &str,
        style: &TStyle,
        pos: BackendCoord,
    ) -> Result<(), DrawingErrorKind<Infallible>> {
        if text.trim().is_empty() {
            return Ok(());
        }

        let size = style.size();
        let bold = matches!(style.style(), FontStyle::Bold);
        let width = layout::text_advance(text, size, bold);
        let anchor = style.anchor();

        let x = match anchor.h_pos {
            HPos::Left => pos.0 as f64,
            HPos::Center => pos.0 as f64 - width / 2.0,
            HPos::Right => pos.0 as f64 - width,
        };
        // Baseline offsets for Helvetica: cap height ~0.72 em, descent ~0.21 em.
        let y = match anchor.v_pos {
            VPos::Top => pos.1 as f64 + size * 0.72,
            VPos::Center => pos.1 as f64 + size * 0.36,
            VPos::Bottom => pos.1 as f64 - size * 0.21,
        };

        self.out.push(Primitive::Text {
            x,
            y,
            size,
            text: text.to_string(),
            bold,
        });
        Ok(())
    }

    fn estimate_text_size<TStyle: BackendTextStyle>(
        &self,
        text: &str,
        style: &TStyle,
    ) -> Result<(u32, u32), DrawingErrorKind<Infallible>> {
        let size = style.size();
        let bold = matches!(style.style(), FontStyle::Bold);
        let width = layout::text_advance(text, size, bold);
        Ok((width.ceil() as u32, size.ceil() as u32))
    }
}

/// Axis label wrapping limits.
#[derive(Debug, Clone, Copy)]
pub struct LabelWrap {
    pub width: usize,
    pub max_lines: usize,
}

impl Default for LabelWrap {
    fn default() -> Self {
        Self {
            width: 15,
            max_lines: 3,
        }
    }
}

/// Wrap a label into at most `max_lines` lines of `width` characters.
/// Overlong labels end in "...".
pub fn wrap_label(label: &str, wrap: LabelWrap) -> Vec<String> {
    let width = wrap.width.max(4);
    let max_lines = wrap.max_lines.max(1);

    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in label.split_whitespace() {
        let mut word: Vec<char> = word.chars().collect();
        while word.len() > width {
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            lines.push(word.drain(..width).collect());
        }
        let word: String = word.into_iter().collect();

        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };
        if needed > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(&word);
    }
    if !current.is_empty() {
        lines.push(current);
    }

    if lines.len() > max_lines {
        lines.truncate(max_lines);
        if let Some(last) = lines.last_mut() {
            let keep: String = last.chars().take(width.saturating_sub(3)).collect();
            *last = format!("{}...", keep.trim_end());
        }
    }

    lines
}

/// Draw one grouped bar chart: a group per distribution row, a bar per
/// rating from 5 down to 1, a legend to the right of the plot.
fn draw_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    distribution: &Distribution,
    title: &str,
    wrap: LabelWrap,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let labels: Vec<Vec<String>> = distribution
        .rows
        .iter()
        .map(|r| wrap_label(&r.label, wrap))
        .collect();
    let label_lines = labels.iter().map(Vec::len).max().unwrap_or(1) as u32;

    let max_count = distribution
        .rows
        .iter()
        .flat_map(|r| r.counts.iter().copied())
        .max()
        .unwrap_or(0);
    let y_max = max_count + (max_count / 8).max(1);
    let groups = distribution.rows.len() as f64;

    let mut chart = ChartBuilder::on(root)
        .caption(title, (FONT, 22).into_font().style(FontStyle::Bold))
        .margin(10)
        .margin_top(30)
        .margin_right(LEGEND_WIDTH)
        .x_label_area_size(12 + label_lines * LABEL_LINE_HEIGHT)
        .y_label_area_size(50)
        .build_cartesian_2d(0f64..groups, 0u32..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(distribution.rows.len())
        .x_label_formatter(&|_: &f64| String::new())
        .y_labels(6)
        .label_style((FONT, 12))
        .draw()?;

    let bar_width = BAR_FILL / (SCALE_MAX - SCALE_MIN + 1) as f64;
    let value_style =
        TextStyle::from((FONT, 11).into_font()).pos(Pos::new(HPos::Center, VPos::Bottom));

    for (slot, rating) in (SCALE_MIN..=SCALE_MAX).rev().enumerate() {
        let color = rating_color(rating);
        let bars: Vec<(f64, u32)> = distribution
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let left = i as f64 + (1.0 - BAR_FILL) / 2.0 + bar_width * slot as f64;
                (left, row.count(rating))
            })
            .filter(|&(_, count)| count > 0)
            .collect();

        chart
            .draw_series(bars.iter().map(|&(left, count)| {
                Rectangle::new([(left, 0), (left + bar_width, count)], color.filled())
            }))?
            .label(rating.to_string())
            .legend(move |(x, y)| Rectangle::new([(x, y - 7), (x + 14, y + 7)], color.filled()));

        chart.draw_series(bars.iter().map(|&(left, count)| {
            Text::new(count.to_string(), (left + bar_width / 2.0, count), value_style.clone())
        }))?;
    }

    let (plot_width, _) = chart.plotting_area().dim_in_pixel();
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::Coordinate(plot_width as i32 + 16, 0))
        .label_font((FONT, 13))
        .background_style(&WHITE)
        .border_style(&BLACK)
        .draw()?;

    let (axis_left, axis_top) = chart.backend_coord(&(0.0, y_max));
    root.draw(&Text::new(
        "No. of Responses",
        (axis_left, axis_top - 6),
        TextStyle::from((FONT, 13).into_font()).pos(Pos::new(HPos::Left, VPos::Bottom)),
    ))?;

    let label_style =
        TextStyle::from((FONT, 13).into_font()).pos(Pos::new(HPos::Center, VPos::Top));
    for (i, lines) in labels.iter().enumerate() {
        let (x, y) = chart.backend_coord(&(i as f64 + 0.5, 0));
        for (line_no, line) in lines.iter().enumerate() {
            let y = y + 8 + (LABEL_LINE_HEIGHT * line_no as u32) as i32;
            root.draw(&Text::new(line.as_str(), (x, y), label_style.clone()))?;
        }
    }

    Ok(())
}

fn draw_on<DB: DrawingBackend>(
    backend: DB,
    distribution: &Distribution,
    title: &str,
    wrap: LabelWrap,
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    let root = backend.into_drawing_area();
    draw_chart(&root, distribution, title, wrap)?;
    root.present()
}

/// Render a distribution as a grouped bar chart.
///
/// Returns `None` when the distribution has no valid responses, or when
/// drawing fails (logged).
pub fn render(
    distribution: &Distribution,
    title: &str,
    name: impl Into<String>,
    wrap: LabelWrap,
) -> Option<ChartArtifact> {
    if distribution.is_empty() {
        return None;
    }
    let name = name.into();
    let size = (CANVAS_WIDTH, CANVAS_HEIGHT);

    let mut primitives = Vec::new();
    if let Err(e) = draw_on(PrimitiveBackend::new(size, &mut primitives), distribution, title, wrap) {
        warn!("Chart '{}' could not be drawn: {}", name, e);
        return None;
    }

    let mut svg = String::new();
    if let Err(e) = draw_on(SVGBackend::with_string(&mut svg, size), distribution, title, wrap) {
        warn!("Chart '{}' could not be written as SVG: {}", name, e);
        return None;
    }

    Some(ChartArtifact {
        name,
        title: title.to_string(),
        width: CANVAS_WIDTH as f64,
        height: CANVAS_HEIGHT as f64,
        primitives,
        svg,
    })
}

fn slug(text: &str, max: usize) -> String {
    let mut out = String::new();
    for c in text.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    let out: String = out.trim_end_matches('_').chars().take(max).collect();
    if out.is_empty() {
        "x".to_string()
    } else {
        out
    }
}

/// Deterministic chart file name for a (run, document, cohort, category)
/// tuple.
///
/// The readable slugs are truncated, so a hash of the full triple keeps
/// distinct charts apart; the run id keeps different uploads apart.
pub fn chart_file_name(run_id: &str, document: &str, cohort: &str, category: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document.as_bytes());
    hasher.update([0x1f]);
    hasher.update(cohort.as_bytes());
    hasher.update([0x1f]);
    hasher.update(category.as_bytes());
    let hash: String = hasher
        .finalize()
        .iter()
        .take(4)
        .map(|b| format!("{:02x}", b))
        .collect();

    format!(
        "{}_{}_{}_{}_{}.svg",
        slug(run_id, 16),
        slug(document, 24),
        slug(cohort, 24),
        slug(category, 32),
        hash
    )
}
