//! An off-screen RGBA drawing surface with a canvas-style state stack.
//!
//! Coordinates go through the current `kurbo::Affine`; the same affine is
//! used for hit testing, so what is drawn and what is clickable agree.

use image::{DynamicImage, ImageOutputFormat, RgbaImage};
use kurbo::{Affine, BezPath, PathEl};
use std::io::Cursor;
use tiny_skia::{
    Color, FillRule, FilterQuality, IntSize, Paint, PathBuilder, Pixmap, PixmapPaint, Stroke, Transform,
};

use crate::error::{Result, StudioError};
use crate::types::Rgba;

#[derive(Clone, Copy, Debug)]
struct State {
    transform: Affine,
    alpha: f64,
}

pub struct Surface {
    pixmap: Pixmap,
    stack: Vec<State>,
    state: State,
}

impl Surface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        let pixmap = Pixmap::new(width, height).ok_or(StudioError::Surface { width, height })?;
        Ok(Surface { pixmap, stack: Vec::new(), state: State { transform: Affine::IDENTITY, alpha: 1.0 } })
    }

    pub fn width(&self) -> u32 {
        self.pixmap.width()
    }

    pub fn height(&self) -> u32 {
        self.pixmap.height()
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }

    pub fn into_pixmap(self) -> Pixmap {
        self.pixmap
    }

    /// Fills the whole surface, ignoring transform and alpha.
    pub fn clear(&mut self, color: Rgba) {
        self.pixmap.fill(Color::from_rgba8(color.r, color.g, color.b, color.a));
    }

    pub fn save(&mut self) {
        self.stack.push(self.state);
    }

    pub fn restore(&mut self) {
        if let Some(state) = self.stack.pop() {
            self.state = state;
        }
    }

    pub fn transform(&self) -> Affine {
        self.state.transform
    }

    pub fn concat(&mut self, affine: Affine) {
        self.state.transform = self.state.transform * affine;
    }

    pub fn translate(&mut self, dx: f64, dy: f64) {
        self.concat(Affine::translate((dx, dy)));
    }

    pub fn scale(&mut self, sx: f64, sy: f64) {
        self.concat(Affine::scale_non_uniform(sx, sy));
    }

    pub fn rotate_degrees(&mut self, degrees: f64) {
        self.concat(Affine::rotate(degrees.to_radians()));
    }

    /// Multiplies into the current global alpha.
    pub fn set_alpha(&mut self, alpha: f64) {
        self.state.alpha = (self.state.alpha * alpha).clamp(0.0, 1.0);
    }

    fn skia_transform(&self) -> Transform {
        let [a, b, c, d, e, f] = self.state.transform.as_coeffs();
        Transform::from_row(a as f32, b as f32, c as f32, d as f32, e as f32, f as f32)
    }

    fn paint(&self, color: Rgba) -> Paint<'static> {
        let mut paint = Paint::default();
        let alpha = (color.a as f64 * self.state.alpha).round().clamp(0.0, 255.0) as u8;
        paint.set_color_rgba8(color.r, color.g, color.b, alpha);
        paint.anti_alias = true;
        paint
    }

    pub fn fill_path(&mut self, path: &BezPath, color: Rgba) {
        if color.a == 0 || self.state.alpha <= 0.0 {
            return;
        }
        if let Some(path) = to_skia_path(path) {
            let paint = self.paint(color);
            let transform = self.skia_transform();
            self.pixmap.fill_path(&path, &paint, FillRule::Winding, transform, None);
        }
    }

    pub fn stroke_path(&mut self, path: &BezPath, color: Rgba, width: f64) {
        if color.a == 0 || self.state.alpha <= 0.0 {
            return;
        }
        if let Some(path) = to_skia_path(path) {
            let paint = self.paint(color);
            let stroke = Stroke { width: width as f32, ..Default::default() };
            let transform = self.skia_transform();
            self.pixmap.stroke_path(&path, &paint, &stroke, transform, None);
        }
    }

    pub fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba) {
        let rect = kurbo::Rect::new(x, y, x + width, y + height);
        self.fill_path(&kurbo::Shape::to_path(&rect, 0.1), color);
    }

    /// Draws `image` stretched into the box `(0, 0)-(width, height)` of the
    /// current coordinate space.
    pub fn draw_image(&mut self, image: &Pixmap, width: f64, height: f64) {
        if image.width() == 0 || image.height() == 0 || self.state.alpha <= 0.0 {
            return;
        }
        let sx = width / image.width() as f64;
        let sy = height / image.height() as f64;
        self.save();
        self.scale(sx, sy);
        let paint = PixmapPaint {
            opacity: self.state.alpha as f32,
            quality: FilterQuality::Bilinear,
            ..Default::default()
        };
        let transform = self.skia_transform();
        self.pixmap.draw_pixmap(0, 0, image.as_ref(), &paint, transform, None);
        self.restore();
    }

    /// Straight-alpha colour of one device pixel.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        let c = self.pixmap.pixel(x, y)?.demultiply();
        Some(Rgba { r: c.red(), g: c.green(), b: c.blue(), a: c.alpha() })
    }

    pub fn to_rgba_image(&self) -> RgbaImage {
        let mut data = Vec::with_capacity(self.pixmap.data().len());
        for px in self.pixmap.pixels() {
            let c = px.demultiply();
            data.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
        }
        RgbaImage::from_raw(self.width(), self.height(), data)
            .unwrap_or_else(|| RgbaImage::new(self.width(), self.height()))
    }

    /// Lossless PNG encoding of the current contents.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(self.to_rgba_image())
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .map_err(|e| StudioError::Encode(e.to_string()))?;
        Ok(bytes)
    }
}

/// Converts a decoded straight-alpha image into a premultiplied pixmap.
pub fn pixmap_from_rgba(image: &RgbaImage) -> Option<Pixmap> {
    let size = IntSize::from_wh(image.width(), image.height())?;
    let mut data = image.as_raw().clone();
    for px in data.chunks_exact_mut(4) {
        let a = px[3] as u16;
        for c in &mut px[..3] {
            *c = ((*c as u16 * a + 127) / 255) as u8;
        }
    }
    Pixmap::from_vec(data, size)
}

fn to_skia_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(c, p) => pb.quad_to(c.x as f32, c.y as f32, p.x as f32, p.y as f32),
            PathEl::CurveTo(c1, c2, p) => {
                pb.cubic_to(c1.x as f32, c1.y as f32, c2.x as f32, c2.y as f32, p.x as f32, p.y as f32)
            }
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}
