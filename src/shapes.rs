//! Path constructions for the nine shape kinds.
//!
//! Every shape is built inside its own `width × height` box with the origin
//! at the box's top-left corner, centred on the box. Callers position and
//! transform the box.

use kurbo::{BezPath, Circle, Point, Rect, Shape};
use std::f64::consts::PI;

use crate::surface::Surface;
use crate::types::{Rgba, ShapeKind, Size};

/// How the constructed outline is painted.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum ShapePaint {
    Fill,
    Stroke(f64),
}

pub const STAR_POINTS: u32 = 5;
pub const STAR_INNER_RATIO: f64 = 0.4;

/// Builds the outline for `kind`. Polygon paths are always closed.
pub fn shape_path(kind: ShapeKind, size: Size) -> BezPath {
    let (w, h) = (size.width, size.height);
    let center = Point::new(w / 2.0, h / 2.0);
    let radius = w / 2.0;
    match kind {
        ShapeKind::Rectangle => Rect::new(0.0, 0.0, w, h).to_path(0.1),
        ShapeKind::Circle => Circle::new(center, radius).to_path(0.1),
        ShapeKind::Triangle => closed(&[Point::new(center.x, 0.0), Point::new(w, h), Point::new(0.0, h)]),
        ShapeKind::Star => star(center, radius, radius * STAR_INNER_RATIO, STAR_POINTS),
        ShapeKind::Hexagon => regular_polygon(center, radius, 6, 0.0),
        ShapeKind::Pentagon => regular_polygon(center, radius, 5, -PI / 2.0),
        ShapeKind::Octagon => regular_polygon(center, radius, 8, 0.0),
        ShapeKind::Diamond => closed(&[
            Point::new(center.x, 0.0),
            Point::new(w, center.y),
            Point::new(center.x, h),
            Point::new(0.0, center.y),
        ]),
        ShapeKind::Line => {
            let mut path = BezPath::new();
            path.move_to((0.0, center.y));
            path.line_to((w, center.y));
            path
        }
    }
}

pub fn shape_paint(kind: ShapeKind, line_width: f64) -> ShapePaint {
    match kind {
        ShapeKind::Line => ShapePaint::Stroke(line_width),
        _ => ShapePaint::Fill,
    }
}

/// Draws `kind` into the surface's current coordinate space.
pub fn draw_shape(surface: &mut Surface, kind: ShapeKind, size: Size, color: Rgba, line_width: f64) {
    let path = shape_path(kind, size);
    match shape_paint(kind, line_width) {
        ShapePaint::Fill => surface.fill_path(&path, color),
        ShapePaint::Stroke(width) => surface.stroke_path(&path, color, width),
    }
}

fn closed(points: &[Point]) -> BezPath {
    let mut path = BezPath::new();
    for (i, p) in points.iter().enumerate() {
        if i == 0 {
            path.move_to(*p);
        } else {
            path.line_to(*p);
        }
    }
    path.close_path();
    path
}

fn regular_polygon(center: Point, radius: f64, sides: u32, start_angle: f64) -> BezPath {
    let points: Vec<Point> = (0..sides)
        .map(|i| {
            let angle = start_angle + i as f64 * 2.0 * PI / sides as f64;
            Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin())
        })
        .collect();
    closed(&points)
}

fn star(center: Point, outer: f64, inner: f64, points: u32) -> BezPath {
    let vertices: Vec<Point> = (0..points * 2)
        .map(|i| {
            let r = if i % 2 == 0 { outer } else { inner };
            let angle = (i as f64 * PI / points as f64) - (PI / 2.0);
            Point::new(center.x + r * angle.cos(), center.y + r * angle.sin())
        })
        .collect();
    closed(&vertices)
}
