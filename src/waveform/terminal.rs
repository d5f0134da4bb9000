// src/waveform/terminal.rs

use super::canvas::{Canvas, Paint, Rgba, Segment, Stroke};
use crossterm::cursor::MoveTo;
use crossterm::style::{Color, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};
use std::fmt::Write as FmtWrite;

const BLANK: char = ' ';
const WAVE: char = '█';
const PLAYHEAD: char = '┃';
const MARKER: char = '┆';
const BAR: char = '│';
const BEAT: char = '·';
const SHADE: char = '░';

#[derive(Debug, Clone, Copy, PartialEq)]
struct Cell {
    glyph: char,
    color: Option<Rgba>,
}

const EMPTY: Cell = Cell { glyph: BLANK, color: None };

/// Character-cell canvas: one column per horizontal pixel, one row per vertical unit.
#[derive(Debug, Clone)]
pub struct TerminalCanvas {
    cols: usize,
    rows: usize,
    cells: Vec<Cell>,
}

impl TerminalCanvas {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(4);
        Self {
            cols,
            rows,
            cells: vec![EMPTY; cols * rows],
        }
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Resize, dropping the current contents.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        *self = Self::new(cols, rows);
    }

    pub fn glyph(&self, col: usize, row: usize) -> Option<char> {
        self.cell(col, row).map(|c| c.glyph)
    }

    pub fn color(&self, col: usize, row: usize) -> Option<Rgba> {
        self.cell(col, row).and_then(|c| c.color)
    }

    fn cell(&self, col: usize, row: usize) -> Option<&Cell> {
        (col < self.cols && row < self.rows).then(|| &self.cells[row * self.cols + col])
    }

    pub fn lines(&self) -> Vec<String> {
        self.cells
            .chunks(self.cols)
            .map(|row| row.iter().map(|c| c.glyph).collect())
            .collect()
    }

    /// Append the grid to `buf` as colored terminal output starting at `(0, top)`.
    pub fn write_into(&self, buf: &mut String, top: u16) {
        for (r, row) in self.cells.chunks(self.cols).enumerate() {
            let _ = write!(buf, "{}", MoveTo(0, top + r as u16));
            let mut current: Option<Rgba> = None;
            for cell in row {
                if cell.color != current {
                    match cell.color {
                        Some(c) => {
                            let _ = write!(buf, "{}", SetForegroundColor(to_terminal_color(c)));
                        }
                        None => {
                            let _ = write!(buf, "{}", ResetColor);
                        }
                    }
                    current = cell.color;
                }
                buf.push(cell.glyph);
            }
            let _ = write!(buf, "{}{}", ResetColor, Clear(ClearType::UntilNewLine));
        }
    }

    fn col_of(&self, x: f32) -> Option<usize> {
        let col = x.floor();
        (col >= 0.0 && col < self.cols as f32).then_some(col as usize)
    }

    /// Rows covered by `[y0, y1]`, at least one.
    fn row_span(&self, y0: f32, y1: f32) -> Option<(usize, usize)> {
        let (a, b) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        let rows = self.rows as f32;
        if b < 0.0 || a >= rows {
            return None;
        }
        let top = a.max(0.0).floor();
        let bottom = (b.ceil() - 1.0).max(top).min(rows - 1.0);
        Some((top as usize, bottom as usize))
    }

    fn put(&mut self, col: usize, row: usize, glyph: char, color: Option<Rgba>) {
        let idx = row * self.cols + col;
        self.cells[idx] = Cell { glyph, color };
    }
}

fn to_terminal_color(c: Rgba) -> Color {
    // Composite over a black background.
    let a = c.a.clamp(0.0, 1.0);
    let scale = |v: u8| (v as f32 * a).round() as u8;
    Color::Rgb {
        r: scale(c.r),
        g: scale(c.g),
        b: scale(c.b),
    }
}

fn glyph_for(stroke: &Stroke) -> char {
    if stroke.dash.is_some() {
        return MARKER;
    }
    match &stroke.paint {
        Paint::Gradient(_) => WAVE,
        Paint::Solid(_) if stroke.width >= 2.0 => PLAYHEAD,
        Paint::Solid(c) if c.a >= 0.25 => BAR,
        Paint::Solid(_) => BEAT,
    }
}

impl Canvas for TerminalCanvas {
    fn size(&self) -> (f32, f32) {
        (self.cols as f32, self.rows as f32)
    }

    fn clear(&mut self) {
        self.cells.fill(EMPTY);
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba) {
        let x0 = x.max(0.0).floor() as usize;
        let x1 = (x + width).min(self.cols as f32).ceil().max(0.0) as usize;
        let Some((top, bottom)) = self.row_span(y, y + height) else {
            return;
        };
        for row in top..=bottom {
            for col in x0..x1.min(self.cols) {
                // Shade only empty cells so earlier lines stay visible.
                if self.cells[row * self.cols + col].glyph == BLANK {
                    self.put(col, row, SHADE, Some(color));
                }
            }
        }
    }

    fn stroke_path(&mut self, segments: &[Segment], stroke: &Stroke) {
        let glyph = glyph_for(stroke);
        for seg in segments {
            let Some(col) = self.col_of(seg.x0) else {
                continue;
            };
            let Some((top, bottom)) = self.row_span(seg.y0, seg.y1) else {
                continue;
            };
            for row in top..=bottom {
                let color = match &stroke.paint {
                    Paint::Solid(c) => Some(*c),
                    Paint::Gradient(g) => g.color_at(row as f32 + 0.5),
                };
                self.put(col, row, glyph, color);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertical_strokes_map_to_rows() {
        let mut canvas = TerminalCanvas::new(8, 10);
        let stroke = Stroke::solid(Rgba::opaque(255, 0, 0), 2.0);
        canvas.stroke_path(&[Segment::vertical(4.0, 0.0, 10.0)], &stroke);
        let lines = canvas.lines();
        assert!(lines.iter().all(|l| l.chars().nth(4) == Some(PLAYHEAD)));
        assert_eq!(canvas.color(4, 9), Some(Rgba::opaque(255, 0, 0)));
    }

    #[test]
    fn fill_keeps_existing_lines() {
        let mut canvas = TerminalCanvas::new(6, 4);
        let faint = Stroke::solid(Rgba::new(255, 255, 255, 0.1), 1.0);
        canvas.stroke_path(&[Segment::vertical(2.0, 0.0, 4.0)], &faint);
        canvas.fill_rect(1.0, 0.0, 3.0, 4.0, Rgba::new(34, 197, 94, 0.2));
        assert_eq!(canvas.lines()[0], " ░·░  ");
    }

    #[test]
    fn off_canvas_segments_are_ignored() {
        let mut canvas = TerminalCanvas::new(4, 4);
        let stroke = Stroke::solid(Rgba::opaque(1, 1, 1), 1.0);
        canvas.stroke_path(&[Segment::vertical(-1.0, 0.0, 4.0), Segment::vertical(9.0, 0.0, 4.0)], &stroke);
        assert!(canvas.lines().iter().all(|l| l.trim().is_empty()));
    }
}
