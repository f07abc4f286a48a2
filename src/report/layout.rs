//! Page layout for report documents.
//!
//! Works in millimetres on A4 with the origin at the top-left corner. The
//! output is a list of pages of absolute drawing operations, ready for a
//! document writer.
//!
//! Tables are the tricky part: every row's height is measured from its
//! wrapped label before it is placed, a row that would overflow the page
//! starts a new page with the header row repeated, and a header row is never
//! left at the bottom of a page without a data row under it.

use super::chart::{ChartArtifact, Color};
use crate::models::{Distribution, ReportDocument, Section, SummaryBlock, SCALE_MAX, SCALE_MIN};

pub const PAGE_WIDTH: f64 = 210.0;
pub const PAGE_HEIGHT: f64 = 297.0;
pub const MARGIN: f64 = 10.0;

const PT_TO_MM: f64 = 25.4 / 72.0;
const LINE_SPACING: f64 = 1.25;

const CONTENT_TOP: f64 = MARGIN + 10.0;
const CONTENT_BOTTOM: f64 = PAGE_HEIGHT - MARGIN - 8.0;
const CONTENT_WIDTH: f64 = PAGE_WIDTH - 2.0 * MARGIN;

const TITLE_SIZE: f64 = 18.0;
const HEADING_SIZE: f64 = 13.0;
const BODY_SIZE: f64 = 10.0;
const TABLE_SIZE: f64 = 8.0;
const RUNNING_SIZE: f64 = 8.0;

const ITEM_COLUMN_WIDTH: f64 = 60.0;
const CELL_PADDING: f64 = 1.2;
const SECTION_GAP: f64 = 5.0;

const HEADER_FILL: Color = Color(220, 230, 241);

/// Helvetica advance widths for ASCII 32..=126, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '../
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, // 0-9
    278, 278, 584, 584, 584, 556, 1015, // :..@
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, 667, 778, 722,
    667, 611, 722, 667, 944, 667, 667, 611, // A-Z
    278, 278, 278, 469, 556, 333, // [..`
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, 556, 556, 333,
    500, 278, 556, 500, 722, 500, 500, 500, // a-z
    334, 260, 334, 584, // {..~
];

/// Approximate advance width of `text`, in the same unit as `size`.
pub fn text_advance(text: &str, size: f64, bold: bool) -> f64 {
    let units: u32 = text
        .chars()
        .map(|c| {
            let code = c as u32;
            if (32..=126).contains(&code) {
                HELVETICA_WIDTHS[(code - 32) as usize] as u32
            } else {
                556
            }
        })
        .sum();
    let factor = if bold { 1.06 } else { 1.0 };
    units as f64 / 1000.0 * size * factor
}

/// Approximate rendered width of `text` at `size` points, in millimetres.
pub fn text_width(text: &str, size: f64, bold: bool) -> f64 {
    text_advance(text, size, bold) * PT_TO_MM
}

/// Height of one line of text at `size` points, in millimetres.
pub fn line_height(size: f64) -> f64 {
    size * PT_TO_MM * LINE_SPACING
}

/// Greedy word wrap to a width in millimetres. Words wider than the line are
/// broken between characters.
pub fn wrap_text(text: &str, width: f64, size: f64, bold: bool) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if text_width(&candidate, size, bold) <= width {
                current = candidate;
                continue;
            }

            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            for c in word.chars() {
                current.push(c);
                if text_width(&current, size, bold) > width && current.chars().count() > 1 {
                    current.pop();
                    lines.push(std::mem::take(&mut current));
                    current.push(c);
                }
            }
        }
        lines.push(current);
    }

    while lines.len() > 1 && lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }
    lines
}

/// An absolute drawing operation on a page.
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    /// `y` is the baseline.
    Text {
        x: f64,
        y: f64,
        size: f64,
        bold: bool,
        text: String,
    },
    Rect {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        fill: Option<Color>,
        stroke: bool,
    },
    Chart {
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        artifact: ChartArtifact,
    },
}

/// Kind of table row placed on a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Header,
    Data,
}

#[derive(Debug, Clone, Default)]
pub struct Page {
    pub ops: Vec<DrawOp>,
    /// Table rows placed on this page, in order.
    pub rows: Vec<RowKind>,
}

fn table_column_widths() -> Vec<f64> {
    let others = 2 * (SCALE_MAX - SCALE_MIN + 1) as usize + 1;
    let other_width = (CONTENT_WIDTH - ITEM_COLUMN_WIDTH) / others as f64;
    std::iter::once(ITEM_COLUMN_WIDTH)
        .chain(std::iter::repeat(other_width).take(others))
        .collect()
}

fn table_header_cells() -> Vec<String> {
    let mut cells = vec!["Item".to_string(), "Total".to_string()];
    for rating in (SCALE_MIN..=SCALE_MAX).rev() {
        cells.push(rating.to_string());
        cells.push(format!("% of {}", rating));
    }
    cells
}

fn table_row_cells(row: &crate::models::DistributionRow) -> Vec<String> {
    let mut cells = vec![row.label.clone(), row.total.to_string()];
    for rating in (SCALE_MIN..=SCALE_MAX).rev() {
        cells.push(row.count(rating).to_string());
        cells.push(format!("{:.2}", row.percent(rating)));
    }
    cells
}

struct MeasuredRow {
    cells: Vec<Vec<String>>,
    height: f64,
}

/// Wrap every cell and measure the row before it is placed.
fn measure_row(cells: &[String], widths: &[f64], bold: bool) -> MeasuredRow {
    let wrapped: Vec<Vec<String>> = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| wrap_text(cell, width - 2.0 * CELL_PADDING, TABLE_SIZE, bold))
        .collect();

    let max_height = CONTENT_BOTTOM - CONTENT_TOP - line_height(HEADING_SIZE) - 20.0;
    let lines = wrapped.iter().map(Vec::len).max().unwrap_or(1).max(1);
    let height = (lines as f64 * line_height(TABLE_SIZE) + 2.0 * CELL_PADDING).min(max_height);

    MeasuredRow {
        cells: wrapped,
        height,
    }
}

struct Layout<'a> {
    doc: &'a ReportDocument,
    pages: Vec<Page>,
    y: f64,
}

impl<'a> Layout<'a> {
    fn new(doc: &'a ReportDocument) -> Self {
        let mut layout = Self {
            doc,
            pages: Vec::new(),
            y: CONTENT_TOP,
        };
        layout.new_page();
        layout
    }

    fn page(&mut self) -> &mut Page {
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = CONTENT_TOP;
    }

    fn remaining(&self) -> f64 {
        CONTENT_BOTTOM - self.y
    }

    fn at_page_top(&self) -> bool {
        self.y <= CONTENT_TOP
    }

    /// Start a new page unless `height` fits in what is left of this one.
    fn ensure(&mut self, height: f64) {
        if height > self.remaining() && !self.at_page_top() {
            self.new_page();
        }
    }

    fn text(&mut self, x: f64, size: f64, bold: bool, text: impl Into<String>) {
        let baseline = self.y + size * PT_TO_MM;
        self.page().ops.push(DrawOp::Text {
            x,
            y: baseline,
            size,
            bold,
            text: text.into(),
        });
        self.y += line_height(size);
    }

    fn paragraph(&mut self, text: &str, size: f64, bold: bool) {
        for line in wrap_text(text, CONTENT_WIDTH, size, bold) {
            self.ensure(line_height(size));
            self.text(MARGIN, size, bold, line);
        }
    }

    fn gap(&mut self, height: f64) {
        self.y = (self.y + height).min(CONTENT_BOTTOM);
    }

    fn title(&mut self, text: &str, subtitle: Option<&str>) {
        for line in wrap_text(text, CONTENT_WIDTH, TITLE_SIZE, true) {
            self.ensure(line_height(TITLE_SIZE));
            let x = MARGIN + (CONTENT_WIDTH - text_width(&line, TITLE_SIZE, true)).max(0.0) / 2.0;
            self.text(x, TITLE_SIZE, true, line);
        }
        if let Some(subtitle) = subtitle {
            let x = MARGIN + (CONTENT_WIDTH - text_width(subtitle, BODY_SIZE, false)).max(0.0) / 2.0;
            self.text(x, BODY_SIZE, false, subtitle);
        }
        self.gap(SECTION_GAP * 2.0);
    }

    fn place_row(&mut self, row: &MeasuredRow, widths: &[f64], kind: RowKind) {
        let bold = kind == RowKind::Header;
        let fill = if bold { Some(HEADER_FILL) } else { None };
        let max_lines = ((row.height - 2.0 * CELL_PADDING) / line_height(TABLE_SIZE)).round() as usize;
        let top = self.y;
        let mut x = MARGIN;

        for (cell, &width) in row.cells.iter().zip(widths) {
            let page = self.page();
            page.ops.push(DrawOp::Rect {
                x,
                y: top,
                w: width,
                h: row.height,
                fill,
                stroke: true,
            });
            for (i, line) in cell.iter().take(max_lines.max(1)).enumerate() {
                page.ops.push(DrawOp::Text {
                    x: x + CELL_PADDING,
                    y: top + CELL_PADDING + TABLE_SIZE * PT_TO_MM + i as f64 * line_height(TABLE_SIZE),
                    size: TABLE_SIZE,
                    bold,
                    text: line.clone(),
                });
            }
            x += width;
        }

        self.page().rows.push(kind);
        self.y = top + row.height;
    }

    fn table(&mut self, category: &str, distribution: &Distribution) {
        let widths = table_column_widths();
        let header = measure_row(&table_header_cells(), &widths, true);
        let rows: Vec<MeasuredRow> = distribution
            .rows
            .iter()
            .map(|r| measure_row(&table_row_cells(r), &widths, false))
            .collect();

        let Some(first) = rows.first() else {
            return;
        };

        // Heading, header row and first data row stay together.
        let heading_height = line_height(HEADING_SIZE) + 1.0;
        self.ensure(heading_height + header.height + first.height);
        self.text(MARGIN, HEADING_SIZE, true, category);
        self.gap(1.0);
        self.place_row(&header, &widths, RowKind::Header);

        for row in &rows {
            if row.height > self.remaining() {
                self.new_page();
                self.place_row(&header, &widths, RowKind::Header);
            }
            self.place_row(row, &widths, RowKind::Data);
        }

        self.gap(SECTION_GAP);
    }

    fn chart(&mut self, artifact: &ChartArtifact) {
        let w = CONTENT_WIDTH;
        let h = w * artifact.height / artifact.width;
        self.ensure(h);
        let y = self.y;
        self.page().ops.push(DrawOp::Chart {
            x: MARGIN,
            y,
            w,
            h,
            artifact: artifact.clone(),
        });
        self.y += h;
        self.gap(SECTION_GAP);
    }

    fn summary(&mut self, heading: &str, blocks: &[SummaryBlock]) {
        self.ensure(line_height(HEADING_SIZE) + 2.0 * line_height(BODY_SIZE));
        self.text(MARGIN, HEADING_SIZE, true, heading);
        self.gap(1.0);

        for block in blocks {
            if !block.source.is_empty() {
                self.ensure(2.0 * line_height(BODY_SIZE));
                self.paragraph(&block.source, BODY_SIZE, true);
            }
            self.paragraph(&block.text, BODY_SIZE, false);
            self.gap(3.0);
        }
        self.gap(SECTION_GAP);
    }

    /// Running header and "Page n of N" footer, once the page count is known.
    fn decorate(&mut self) {
        let total = self.pages.len();
        let header = self.doc.header.clone();
        for (i, page) in self.pages.iter_mut().enumerate() {
            page.ops.push(DrawOp::Text {
                x: MARGIN,
                y: MARGIN + RUNNING_SIZE * PT_TO_MM,
                size: RUNNING_SIZE,
                bold: false,
                text: header.clone(),
            });
            let footer = format!("Page {} of {}", i + 1, total);
            page.ops.push(DrawOp::Text {
                x: PAGE_WIDTH - MARGIN - text_width(&footer, RUNNING_SIZE, false),
                y: PAGE_HEIGHT - MARGIN,
                size: RUNNING_SIZE,
                bold: false,
                text: footer,
            });
        }
    }
}

/// Lay out a document into pages.
pub fn layout(doc: &ReportDocument) -> Vec<Page> {
    let mut layout = Layout::new(doc);

    for section in &doc.sections {
        match section {
            Section::Title { text, subtitle } => layout.title(text, subtitle.as_deref()),
            Section::Table {
                category,
                distribution,
            } => layout.table(category, distribution),
            Section::Chart { artifact, .. } => layout.chart(artifact),
            Section::Summary { heading, blocks } => layout.summary(heading, blocks),
            Section::Notice(text) => {
                layout.paragraph(text, BODY_SIZE, false);
                layout.gap(SECTION_GAP);
            }
        }
    }

    layout.decorate();
    layout.pages
}
