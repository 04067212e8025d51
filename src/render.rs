//! Scene compositor.
//!
//! `paint_scene` is the single painter behind both the interactive preview
//! and the export pipeline: background, then elements in list order, then
//! watermarks in list order. The preview adds the selection highlight and
//! the grid on top; neither is ever part of an export.

use kurbo::{Affine, BezPath, Point as KPoint, Rect};
use log::{debug, warn};
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::Pixmap;

use crate::canvas::{Canvas, Target};
use crate::config::EngineConfig;
use crate::error::{ResourceError, Result};
use crate::fonts::{layout_text, FontBook};
use crate::objects::{ElementBody, Placement, TextProps, WatermarkBody};
use crate::selection::Selection;
use crate::shapes::draw_shape;
use crate::surface::{pixmap_from_rgba, Surface};
use crate::types::{Point, Rgba, Size};

pub const ZOOM_MIN: u32 = 50;
pub const ZOOM_MAX: u32 = 200;
pub const ZOOM_STEP: u32 = 10;
pub const HIGHLIGHT_COLOR: Rgba = Rgba::rgb(0x3B, 0x82, 0xF6);
pub const GRID_COLOR: Rgba = Rgba::rgb(0xCB, 0xD5, 0xE1);
/// Placeholder box for an image watermark whose pixels are not loaded yet.
const UNLOADED_IMAGE_SIZE: f64 = 100.0;

pub fn clamp_zoom(percent: u32) -> u32 {
    percent.clamp(ZOOM_MIN, ZOOM_MAX)
}

pub fn zoom_in(percent: u32) -> u32 {
    clamp_zoom(percent.saturating_add(ZOOM_STEP))
}

pub fn zoom_out(percent: u32) -> u32 {
    clamp_zoom(percent.saturating_sub(ZOOM_STEP))
}

/// Decodes PNG/JPEG/GIF bytes into a premultiplied pixmap.
pub fn decode_pixmap(url: &str, bytes: &[u8]) -> std::result::Result<Pixmap, ResourceError> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| ResourceError::Decode { url: url.to_string(), reason: e.to_string() })?;
    pixmap_from_rgba(&decoded.to_rgba8())
        .ok_or_else(|| ResourceError::Decode { url: url.to_string(), reason: "image has no pixels".into() })
}

/// Decoded images keyed by URL, plus the URLs that failed to load.
#[derive(Clone, Debug, Default)]
pub struct ImageCache {
    images: HashMap<String, Arc<Pixmap>>,
    failed: HashMap<String, ResourceError>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, pixmap: Pixmap) {
        let url = url.into();
        self.failed.remove(&url);
        self.images.insert(url, Arc::new(pixmap));
    }

    /// Decodes and stores `bytes`; on failure the URL is remembered as failed.
    pub fn insert_bytes(&mut self, url: &str, bytes: &[u8]) -> std::result::Result<(), ResourceError> {
        match decode_pixmap(url, bytes) {
            Ok(pixmap) => {
                self.insert(url, pixmap);
                Ok(())
            }
            Err(err) => {
                self.mark_failed(err.clone());
                Err(err)
            }
        }
    }

    pub fn mark_failed(&mut self, err: ResourceError) {
        self.images.remove(err.url());
        self.failed.insert(err.url().to_string(), err);
    }

    pub fn get(&self, url: &str) -> Option<&Arc<Pixmap>> {
        self.images.get(url)
    }

    pub fn failure(&self, url: &str) -> Option<&ResourceError> {
        self.failed.get(url)
    }

    pub fn remove(&mut self, url: &str) {
        self.images.remove(url);
        self.failed.remove(url);
    }

    fn lookup(&self, url: &str) -> std::result::Result<&Arc<Pixmap>, ResourceError> {
        self.get(url)
            .ok_or_else(|| self.failure(url).cloned().unwrap_or_else(|| ResourceError::Missing(url.to_string())))
    }
}

/// Every image URL a canvas needs drawn, background first, without repeats.
pub fn image_urls(canvas: &Canvas) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    let wanted = canvas
        .main_image
        .iter()
        .map(|m| m.url.as_str())
        .chain(canvas.watermarks.iter().filter_map(|w| w.image().map(|i| i.url.as_str())));
    for url in wanted {
        if !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls
}

/// Read-only inputs shared by every paint.
#[derive(Clone, Copy)]
pub struct PaintContext<'a> {
    pub images: &'a ImageCache,
    pub fonts: &'a FontBook,
    pub config: &'a EngineConfig,
}

/// Logical-to-device affine for one entity: translate to the scaled
/// position, scale by entity scale times the output scale, then rotate
/// around the entity's own origin.
pub fn entity_transform(placement: &Placement, sx: f64, sy: f64) -> Affine {
    Affine::translate((placement.position.x * sx, placement.position.y * sy))
        * Affine::scale_non_uniform(placement.scale * sx, placement.scale * sy)
        * Affine::rotate(placement.rotation.to_radians())
}

/// Fits `(w, h)` inside a `max × max` box keeping aspect; never enlarges.
pub fn fit_within(width: f64, height: f64, max: f64) -> Size {
    if width <= 0.0 || height <= 0.0 {
        return Size::new(0.0, 0.0);
    }
    let ratio = (max / width).min(max / height).min(1.0);
    Size::new(width * ratio, height * ratio)
}

fn color_or(value: &str, fallback: &str) -> Rgba {
    Rgba::parse(value).or_else(|| Rgba::parse(fallback)).unwrap_or(Rgba::BLACK)
}

fn paint_text(surface: &mut Surface, text: &TextProps, ctx: PaintContext) -> std::result::Result<(), ResourceError> {
    let block = layout_text(ctx.fonts, text);
    match block.path {
        Some(path) => {
            surface.fill_path(&path, color_or(&text.color, &ctx.config.default_text_color));
            Ok(())
        }
        None => Err(ResourceError::Missing(format!("font:{}", text.font_family))),
    }
}

/// Paints `canvas` onto `surface` at output scale `(sx, sy)`. Entities whose
/// resources are unavailable are skipped and returned; nothing here fails
/// the paint as a whole.
pub fn paint_scene(surface: &mut Surface, canvas: &Canvas, sx: f64, sy: f64, ctx: PaintContext) -> Vec<ResourceError> {
    let mut skipped = Vec::new();
    surface.clear(color_or(&canvas.background_color, "#ffffff"));

    if let Some(main) = &canvas.main_image {
        match ctx.images.lookup(&main.url) {
            Ok(pixmap) => {
                let (w, h) = (surface.width() as f64, surface.height() as f64);
                surface.draw_image(pixmap, w, h);
            }
            Err(err) => {
                warn!("canvas {}: background image skipped: {}", canvas.id, err);
                skipped.push(err);
            }
        }
    }

    for element in &canvas.elements {
        surface.save();
        surface.concat(entity_transform(&element.placement, sx, sy));
        surface.set_alpha(element.placement.opacity);
        let result = match &element.body {
            ElementBody::Shape(shape) => {
                let color = color_or(&shape.color, &ctx.config.default_shape_color);
                draw_shape(surface, shape.shape, shape.size, color, ctx.config.line_stroke_width);
                Ok(())
            }
            ElementBody::Text(text) => paint_text(surface, text, ctx),
        };
        surface.restore();
        if let Err(err) = result {
            warn!("canvas {}: element {} skipped: {}", canvas.id, element.id, err);
            skipped.push(err);
        }
    }

    for watermark in &canvas.watermarks {
        surface.save();
        surface.concat(entity_transform(&watermark.placement, sx, sy));
        surface.set_alpha(watermark.placement.opacity);
        let result = match &watermark.body {
            WatermarkBody::Image(image) => ctx.images.lookup(&image.url).map(|pixmap| {
                let fit = fit_within(pixmap.width() as f64, pixmap.height() as f64, ctx.config.image_watermark_max);
                surface.draw_image(pixmap, fit.width, fit.height);
            }),
            WatermarkBody::Text(text) => paint_text(surface, text, ctx),
        };
        surface.restore();
        if let Err(err) = result {
            warn!("canvas {}: watermark {} skipped: {}", canvas.id, watermark.id, err);
            skipped.push(err);
        }
    }
    skipped
}

/// One hit-testable layer in logical space.
#[derive(Clone, Debug, PartialEq)]
pub struct SceneNode {
    pub target: Target,
    pub transform: Affine,
    /// Local-space box the entity occupies before its transform.
    pub bounds: Rect,
}

fn local_bounds(body: LocalBody, ctx: PaintContext) -> Rect {
    match body {
        LocalBody::Shape(size) => Rect::new(0.0, 0.0, size.width, size.height),
        LocalBody::Text(text) => {
            let block = layout_text(ctx.fonts, text);
            Rect::new(0.0, 0.0, block.width, block.height)
        }
        LocalBody::Image(url) => match ctx.images.get(url) {
            Some(p) => {
                let fit = fit_within(p.width() as f64, p.height() as f64, ctx.config.image_watermark_max);
                Rect::new(0.0, 0.0, fit.width, fit.height)
            }
            None => Rect::new(0.0, 0.0, UNLOADED_IMAGE_SIZE, UNLOADED_IMAGE_SIZE),
        },
    }
}

enum LocalBody<'a> {
    Shape(Size),
    Text(&'a TextProps),
    Image(&'a str),
}

/// Layers in paint order (elements, then watermarks).
pub fn scene_nodes(canvas: &Canvas, ctx: PaintContext) -> Vec<SceneNode> {
    let elements = canvas.elements.iter().map(|e| {
        let body = match &e.body {
            ElementBody::Shape(s) => LocalBody::Shape(s.size),
            ElementBody::Text(t) => LocalBody::Text(t),
        };
        (Target::Element(e.id), &e.placement, body)
    });
    let watermarks = canvas.watermarks.iter().map(|w| {
        let body = match &w.body {
            WatermarkBody::Image(i) => LocalBody::Image(&i.url),
            WatermarkBody::Text(t) => LocalBody::Text(t),
        };
        (Target::Watermark(w.id), &w.placement, body)
    });
    elements
        .chain(watermarks)
        .map(|(target, placement, body)| SceneNode {
            target,
            transform: entity_transform(placement, 1.0, 1.0),
            bounds: local_bounds(body, ctx),
        })
        .collect()
}

/// Topmost layer under a logical-space point.
pub fn hit_test(nodes: &[SceneNode], point: Point) -> Option<Target> {
    let p = KPoint::new(point.x, point.y);
    nodes.iter().rev().find_map(|node| {
        if node.transform.determinant().abs() < 1e-12 {
            return None;
        }
        let local = node.transform.inverse() * p;
        node.bounds.contains(local).then_some(node.target)
    })
}

/// Preview-only display options.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PreviewOptions {
    pub zoom_percent: u32,
    pub show_grid: bool,
}

impl Default for PreviewOptions {
    fn default() -> Self {
        PreviewOptions { zoom_percent: 100, show_grid: false }
    }
}

/// Renders the on-screen view of `canvas` at the preview zoom.
pub fn render_preview(canvas: &Canvas, selection: Selection, options: PreviewOptions, ctx: PaintContext) -> Result<Surface> {
    let zoom = clamp_zoom(options.zoom_percent) as f64 / 100.0;
    let logical = ctx.config.logical_size;
    let width = (logical.width * zoom).round().max(1.0) as u32;
    let height = (logical.height * zoom).round().max(1.0) as u32;
    let mut surface = Surface::new(width, height)?;
    let skipped = paint_scene(&mut surface, canvas, zoom, zoom, ctx);
    if !skipped.is_empty() {
        debug!("preview of canvas {} drew without {} resource(s)", canvas.id, skipped.len());
    }

    if options.show_grid && ctx.config.grid_spacing > 0.0 {
        draw_grid(&mut surface, logical, ctx.config.grid_spacing, zoom);
    }
    if let Some(target) = selection.target() {
        if let Some(node) = scene_nodes(canvas, ctx).into_iter().find(|n| n.target == target) {
            draw_highlight(&mut surface, &node, zoom);
        }
    }
    Ok(surface)
}

fn draw_grid(surface: &mut Surface, logical: Size, spacing: f64, zoom: f64) {
    let dot = 1.5;
    let mut y = spacing;
    while y < logical.height {
        let mut x = spacing;
        while x < logical.width {
            surface.fill_rect(x * zoom - dot / 2.0, y * zoom - dot / 2.0, dot, dot, GRID_COLOR);
            x += spacing;
        }
        y += spacing;
    }
}

/// Outline of the node's box mapped to device space up front, so the ring
/// keeps a constant width whatever the entity scale. Expects an identity
/// surface transform.
fn draw_highlight(surface: &mut Surface, node: &SceneNode, zoom: f64) {
    let to_device = Affine::scale(zoom) * node.transform;
    let b = node.bounds.inflate(2.0, 2.0);
    let corners = [KPoint::new(b.x0, b.y0), KPoint::new(b.x1, b.y0), KPoint::new(b.x1, b.y1), KPoint::new(b.x0, b.y1)];
    let mut path = BezPath::new();
    for (i, corner) in corners.iter().enumerate() {
        let p = to_device * *corner;
        if i == 0 {
            path.move_to(p);
        } else {
            path.line_to(p);
        }
    }
    path.close_path();
    surface.stroke_path(&path, HIGHLIGHT_COLOR, 2.0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ElementDraft, PropertyPatch, TextDraft, WatermarkDraft};
    use crate::types::ShapeKind;

    fn solid(w: u32, h: u32, color: Rgba) -> Pixmap {
        let mut p = Pixmap::new(w, h).unwrap();
        p.fill(tiny_skia::Color::from_rgba8(color.r, color.g, color.b, color.a));
        p
    }

    #[test]
    fn zoom_steps_and_clamps() {
        assert_eq!(zoom_in(100), 110);
        assert_eq!(zoom_in(200), 200);
        assert_eq!(zoom_out(50), 50);
        assert_eq!(zoom_out(55), 50);
        assert_eq!(clamp_zoom(5), 50);
    }

    #[test]
    fn fit_keeps_aspect_and_never_upscales() {
        assert_eq!(fit_within(400.0, 100.0, 200.0), Size::new(200.0, 50.0));
        assert_eq!(fit_within(50.0, 80.0, 200.0), Size::new(50.0, 80.0));
    }

    #[test]
    fn entity_transform_scales_position_and_size() {
        let placement = Placement { position: Point::new(100.0, 50.0), scale: 1.5, rotation: 0.0, opacity: 1.0 };
        let t = entity_transform(&placement, 2.0, 2.0);
        assert_eq!(t * KPoint::new(0.0, 0.0), KPoint::new(200.0, 100.0));
        assert_eq!(t * KPoint::new(10.0, 0.0), KPoint::new(230.0, 100.0));
    }

    #[test]
    fn watermark_paints_over_later_element() {
        let config = EngineConfig::default();
        let mut canvas = Canvas::new(1);
        let mut images = ImageCache::new();
        images.insert("mem:red", solid(100, 100, Rgba::rgb(255, 0, 0)));
        canvas.add_watermark(WatermarkDraft::image("mem:red", None, None).at(Point::new(100.0, 100.0)), &config);
        // added after the watermark, still painted below it
        canvas.add_element(ElementDraft::shape(ShapeKind::Rectangle, Point::new(100.0, 100.0)), &config);

        let fonts = FontBook::new();
        let ctx = PaintContext { images: &images, fonts: &fonts, config: &config };
        let mut surface = Surface::new(800, 600).unwrap();
        assert!(paint_scene(&mut surface, &canvas, 1.0, 1.0, ctx).is_empty());
        assert_eq!(surface.pixel(150, 150), Some(Rgba::rgb(255, 0, 0)));
    }

    #[test]
    fn missing_background_is_reported_not_fatal() {
        let config = EngineConfig::default();
        let mut canvas = Canvas::new(1);
        canvas.set_background_image(Some(crate::canvas::MainImage {
            id: "bg".into(),
            name: "bg.png".into(),
            url: "mem:nowhere".into(),
        }));
        canvas.add_element(ElementDraft::shape(ShapeKind::Rectangle, Point::new(0.0, 0.0)), &config);
        let images = ImageCache::new();
        let fonts = FontBook::new();
        let ctx = PaintContext { images: &images, fonts: &fonts, config: &config };
        let mut surface = Surface::new(800, 600).unwrap();
        let skipped = paint_scene(&mut surface, &canvas, 1.0, 1.0, ctx);
        assert_eq!(skipped, vec![ResourceError::Missing("mem:nowhere".into())]);
        assert_eq!(surface.pixel(50, 50), Some(Rgba::rgb(0x3B, 0x82, 0xF6)));
        assert_eq!(surface.pixel(500, 500), Some(Rgba::WHITE));
    }

    #[test]
    fn hit_test_prefers_watermarks_and_respects_rotation() {
        let config = EngineConfig::default();
        let mut canvas = Canvas::new(1);
        let e = canvas.add_element(ElementDraft::shape(ShapeKind::Rectangle, Point::new(100.0, 100.0)), &config).id();
        let w = canvas
            .add_watermark(WatermarkDraft::image("mem:x", None, None).at(Point::new(150.0, 150.0)), &config)
            .id();
        let images = ImageCache::new();
        let fonts = FontBook::new();
        let ctx = PaintContext { images: &images, fonts: &fonts, config: &config };
        let nodes = scene_nodes(&canvas, ctx);
        assert_eq!(hit_test(&nodes, Point::new(160.0, 160.0)), Some(Target::Watermark(w)));
        assert_eq!(hit_test(&nodes, Point::new(110.0, 110.0)), Some(Target::Element(e)));
        assert_eq!(hit_test(&nodes, Point::new(700.0, 10.0)), None);

        canvas.update_element_properties(e, &PropertyPatch::rotation(90.0));
        let nodes = scene_nodes(&canvas, ctx);
        // rotated 90 degrees about (100, 100) the box now spans x in [0, 100]
        assert_eq!(hit_test(&nodes, Point::new(50.0, 110.0)), Some(Target::Element(e)));
        assert_eq!(hit_test(&nodes, Point::new(140.0, 110.0)), None);
    }

    #[test]
    fn preview_size_follows_zoom_and_draws_highlight() {
        let config = EngineConfig::default();
        let mut canvas = Canvas::new(1);
        let id = canvas.add_element(ElementDraft::text(TextDraft::new("hi"), Point::new(10.0, 10.0)), &config).id();
        let images = ImageCache::new();
        let fonts = FontBook::new();
        let ctx = PaintContext { images: &images, fonts: &fonts, config: &config };
        let options = PreviewOptions { zoom_percent: 50, show_grid: true };
        let surface = render_preview(&canvas, Selection::Element(id), options, ctx).unwrap();
        assert_eq!((surface.width(), surface.height()), (400, 300));
        // top-left corner of the highlight ring: (10 - 2) * 0.5
        let px = surface.pixel(4, 4).unwrap();
        assert!(px.b > px.r, "expected highlight colour, got {:?}", px);
    }
}
