// src/waveform/canvas.rs

/// Straight-alpha color.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 1.0)
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Rgba,
}

/// Vertical gradient from `y0` to `y1`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearGradient {
    pub y0: f32,
    pub y1: f32,
    pub stops: Vec<GradientStop>,
}

impl LinearGradient {
    /// Color at `y`, linearly interpolated between the surrounding stops.
    pub fn color_at(&self, y: f32) -> Option<Rgba> {
        let first = self.stops.first()?;
        let span = self.y1 - self.y0;
        let t = if span.abs() < f32::EPSILON { 0.0 } else { ((y - self.y0) / span).clamp(0.0, 1.0) };
        if t <= first.offset {
            return Some(first.color);
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if t <= b.offset {
                let k = if b.offset > a.offset { (t - a.offset) / (b.offset - a.offset) } else { 1.0 };
                let mix = |x: u8, y: u8| (x as f32 + (y as f32 - x as f32) * k).round() as u8;
                return Some(Rgba {
                    r: mix(a.color.r, b.color.r),
                    g: mix(a.color.g, b.color.g),
                    b: mix(a.color.b, b.color.b),
                    a: a.color.a + (b.color.a - a.color.a) * k,
                });
            }
        }
        self.stops.last().map(|s| s.color)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Paint {
    Solid(Rgba),
    Gradient(LinearGradient),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineCap {
    Butt,
    Round,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shadow {
    pub color: Rgba,
    pub blur: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stroke {
    pub paint: Paint,
    pub width: f32,
    /// `[on, off]` lengths; `None` draws solid.
    pub dash: Option<[f32; 2]>,
    pub cap: LineCap,
    pub shadow: Option<Shadow>,
}

impl Stroke {
    pub fn solid(color: Rgba, width: f32) -> Self {
        Self {
            paint: Paint::Solid(color),
            width,
            dash: None,
            cap: LineCap::Butt,
            shadow: None,
        }
    }

    pub fn dashed(mut self, on: f32, off: f32) -> Self {
        self.dash = Some([on, off]);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    pub fn vertical(x: f32, y0: f32, y1: f32) -> Self {
        Self { x0: x, y0, x1: x, y1 }
    }
}

/// The drawing surface a renderer targets.
pub trait Canvas {
    /// Logical size in pixels.
    fn size(&self) -> (f32, f32);
    fn clear(&mut self);
    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba);
    /// Stroke several segments as one path with a shared style.
    fn stroke_path(&mut self, segments: &[Segment], stroke: &Stroke);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Clear,
    FillRect {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        color: Rgba,
    },
    Stroke {
        segments: Vec<Segment>,
        stroke: Stroke,
    },
}

/// Canvas that records what was drawn, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawList {
    width: f32,
    height: f32,
    ops: Vec<DrawOp>,
}

impl DrawList {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    /// Drop recorded ops, keeping the size.
    pub fn reset(&mut self) {
        self.ops.clear();
    }

    pub fn strokes(&self) -> impl Iterator<Item = (&[Segment], &Stroke)> {
        self.ops.iter().filter_map(|op| match op {
            DrawOp::Stroke { segments, stroke } => Some((segments.as_slice(), stroke)),
            _ => None,
        })
    }

    pub fn fills(&self) -> impl Iterator<Item = &DrawOp> {
        self.ops.iter().filter(|op| matches!(op, DrawOp::FillRect { .. }))
    }
}

impl Canvas for DrawList {
    fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    fn clear(&mut self) {
        self.ops.clear();
        self.ops.push(DrawOp::Clear);
    }

    fn fill_rect(&mut self, x: f32, y: f32, width: f32, height: f32, color: Rgba) {
        self.ops.push(DrawOp::FillRect { x, y, width, height, color });
    }

    fn stroke_path(&mut self, segments: &[Segment], stroke: &Stroke) {
        if segments.is_empty() {
            return;
        }
        self.ops.push(DrawOp::Stroke {
            segments: segments.to_vec(),
            stroke: stroke.clone(),
        });
    }
}
