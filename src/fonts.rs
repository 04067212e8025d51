//! Font registry and text layout.
//!
//! Text is turned into glyph outlines so it goes through the same transform
//! and fill path as shapes. Hosts register font bytes by family name; CSS
//! family lists (`"Open Sans, sans-serif"`) resolve to the first registered
//! match, then to the first registered face overall.

use ab_glyph::{Font, FontArc, GlyphId, OutlineCurve, ScaleFont};
use kurbo::{Affine, BezPath, Point, Rect, Shape};
use log::warn;

use crate::error::{Result, StudioError};
use crate::objects::TextProps;
use crate::types::TextAlign;

pub const LINE_HEIGHT: f64 = 1.2;
const FALLBACK_ADVANCE: f64 = 0.6;
const OBLIQUE_SKEW: f64 = 0.2;

/// DejaVu Sans, used when the host has not registered a matching family.
pub const FALLBACK_FAMILY: &str = "DejaVu Sans";
static FALLBACK_FACE: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");

#[derive(Clone, Default)]
pub struct FontBook {
    faces: Vec<(String, FontArc)>,
}

impl std::fmt::Debug for FontBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.faces.iter().map(|(name, _)| name)).finish()
    }
}

fn family_key(name: &str) -> String {
    name.trim().trim_matches(|c| c == '"' || c == '\'').to_ascii_lowercase()
}

impl FontBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A book holding the bundled face, so text always has glyphs.
    pub fn with_fallback() -> Self {
        let mut book = Self::new();
        if let Err(e) = book.register(FALLBACK_FAMILY, FALLBACK_FACE.to_vec()) {
            warn!("bundled font unusable: {}", e);
        }
        book
    }

    /// Registers a TTF/OTF face. Style variants are registered under their
    /// own names, e.g. `"Arial Bold"`.
    pub fn register(&mut self, family: &str, bytes: Vec<u8>) -> Result<()> {
        let font = FontArc::try_from_vec(bytes)
            .map_err(|e| StudioError::Validation(format!("font {}: {}", family, e)))?;
        let key = family_key(family);
        self.faces.retain(|(name, _)| *name != key);
        // host faces stay ahead of the bundled one for the last-resort lookup
        let at = self.faces.iter().position(|(name, _)| name == &family_key(FALLBACK_FAMILY));
        match at {
            Some(i) if key != family_key(FALLBACK_FAMILY) => self.faces.insert(i, (key, font)),
            _ => self.faces.push((key, font)),
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }

    fn lookup(&self, key: &str) -> Option<&FontArc> {
        self.faces.iter().find(|(name, _)| name == key).map(|(_, f)| f)
    }

    /// Picks a face for `props`; the flag says whether it is a true italic.
    pub fn resolve(&self, props: &TextProps) -> Option<(&FontArc, bool)> {
        for family in props.font_family.split(',').map(family_key) {
            let mut variants = Vec::new();
            match (props.is_bold(), props.italic) {
                (true, true) => variants.push((format!("{} bold italic", family), true)),
                (false, true) => variants.push((format!("{} italic", family), true)),
                (true, false) => variants.push((format!("{} bold", family), false)),
                (false, false) => {}
            }
            variants.push((family.clone(), false));
            for (key, italic) in variants {
                if let Some(font) = self.lookup(&key) {
                    return Some((font, italic));
                }
            }
        }
        self.faces.first().map(|(_, f)| (f, false))
    }
}

/// A laid-out text block in its own coordinate space: origin at the block's
/// top-left, first baseline at `y = font_size`.
#[derive(Clone, Debug)]
pub struct TextBlock {
    pub width: f64,
    pub height: f64,
    /// `None` when no font is available to outline glyphs.
    pub path: Option<BezPath>,
}

struct Line<'a> {
    text: &'a str,
    width: f64,
}

fn measure(font: Option<&FontArc>, text: &str, size: f64) -> f64 {
    let Some(font) = font else {
        return text.chars().count() as f64 * size * FALLBACK_ADVANCE;
    };
    let scaled = font.as_scaled(px_scale(font, size));
    let mut width = 0.0f32;
    let mut prev: Option<GlyphId> = None;
    for ch in text.chars() {
        let gid = font.glyph_id(ch);
        if let Some(p) = prev {
            width += scaled.kern(p, gid);
        }
        width += scaled.h_advance(gid);
        prev = Some(gid);
    }
    width as f64
}

/// ab_glyph scales by ascent-descent height; CSS sizes are em sizes.
fn px_scale(font: &FontArc, size: f64) -> ab_glyph::PxScale {
    let units_per_em = font.units_per_em().unwrap_or(1000.0);
    ab_glyph::PxScale::from((size as f32) * font.height_unscaled() / units_per_em)
}

pub fn layout_text(fonts: &FontBook, props: &TextProps) -> TextBlock {
    let resolved = fonts.resolve(props);
    let font = resolved.map(|(f, _)| f);
    let size = props.font_size;
    let lines: Vec<Line> =
        props.text.split('\n').map(|text| Line { text, width: measure(font, text, size) }).collect();
    let width = lines.iter().map(|l| l.width).fold(0.0, f64::max);
    let height = lines.len() as f64 * size * LINE_HEIGHT;

    let path = resolved.map(|(font, true_italic)| {
        let mut path = BezPath::new();
        for (i, line) in lines.iter().enumerate() {
            let baseline = size + i as f64 * size * LINE_HEIGHT;
            let x = match props.text_align {
                TextAlign::Left => 0.0,
                TextAlign::Center => (width - line.width) / 2.0,
                TextAlign::Right => width - line.width,
            };
            let mut line_path = outline_line(font, line.text, size, Point::new(x, baseline));
            if props.italic && !true_italic {
                line_path.apply_affine(Affine::new([1.0, 0.0, -OBLIQUE_SKEW, 1.0, OBLIQUE_SKEW * baseline, 0.0]));
            }
            path.extend(line_path.elements().iter().copied());
            if props.underline && line.width > 0.0 {
                let thickness = (size / 15.0).max(1.0);
                let top = baseline + size * 0.08;
                path.extend(Rect::new(x, top, x + line.width, top + thickness).path_elements(0.1));
            }
        }
        path
    });
    TextBlock { width, height, path }
}

fn outline_line(font: &FontArc, text: &str, size: f64, origin: Point) -> BezPath {
    let scaled = font.as_scaled(px_scale(font, size));
    let factor = scaled.scale_factor();
    let (fx, fy) = (factor.horizontal as f64, factor.vertical as f64);
    let mut path = BezPath::new();
    let mut pen = origin.x;
    let mut prev: Option<GlyphId> = None;
    for ch in text.chars() {
        let gid = font.glyph_id(ch);
        if let Some(p) = prev {
            pen += scaled.kern(p, gid) as f64;
        }
        if let Some(outline) = font.outline(gid) {
            let map = |p: ab_glyph::Point| Point::new(pen + p.x as f64 * fx, origin.y - p.y as f64 * fy);
            let mut current: Option<Point> = None;
            for curve in &outline.curves {
                let (start, end) = match curve {
                    OutlineCurve::Line(a, b) => (map(*a), map(*b)),
                    OutlineCurve::Quad(a, _, b) => (map(*a), map(*b)),
                    OutlineCurve::Cubic(a, _, _, b) => (map(*a), map(*b)),
                };
                if current.map_or(true, |c| c.distance(start) > 1e-6) {
                    if current.is_some() {
                        path.close_path();
                    }
                    path.move_to(start);
                }
                match curve {
                    OutlineCurve::Line(_, _) => path.line_to(end),
                    OutlineCurve::Quad(_, c, _) => path.quad_to(map(*c), end),
                    OutlineCurve::Cubic(_, c1, c2, _) => path.curve_to(map(*c1), map(*c2), end),
                }
                current = Some(end);
            }
            if current.is_some() {
                path.close_path();
            }
        }
        pen += scaled.h_advance(gid) as f64;
        prev = Some(gid);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::objects::TextDraft;

    #[test]
    fn without_fonts_layout_still_measures() {
        let props = TextDraft::new("abcd\nab").into_props(&EngineConfig::default());
        let block = layout_text(&FontBook::new(), &props);
        assert!(block.path.is_none());
        assert!((block.width - 4.0 * 24.0 * FALLBACK_ADVANCE).abs() < 1e-9);
        assert!((block.height - 2.0 * 24.0 * LINE_HEIGHT).abs() < 1e-9);
    }

    #[test]
    fn rejects_garbage_font_bytes() {
        let mut book = FontBook::new();
        assert!(book.register("Broken", vec![0, 1, 2, 3]).is_err());
        assert!(book.is_empty());
    }

    fn dejavu() -> FontBook {
        let mut book = FontBook::new();
        book.register("Arial", FALLBACK_FACE.to_vec()).unwrap();
        book
    }

    fn props(text: &str) -> TextProps {
        TextDraft::new(text).into_props(&EngineConfig::default())
    }

    #[test]
    fn fallback_book_resolves_any_family() {
        let book = FontBook::with_fallback();
        assert!(!book.is_empty());
        let mut p = props("x");
        p.font_family = "Nonexistent, serif".into();
        assert!(book.resolve(&p).is_some());
    }

    #[test]
    fn outlines_sit_between_top_and_baseline_band() {
        let block = layout_text(&dejavu(), &props("Sample"));
        let bbox = block.path.as_ref().unwrap().bounding_box();
        assert!(block.width > 24.0 * 2.0);
        assert!(bbox.y0 >= 0.0, "glyphs start above the block: {:?}", bbox);
        // descender of 'p' goes below the baseline at y = font size
        assert!(bbox.y1 > 24.0 && bbox.y1 < 24.0 * 1.4);
    }

    #[test]
    fn underline_and_oblique_change_the_outline() {
        let book = dejavu();
        let plain = layout_text(&book, &props("ace")).path.unwrap().bounding_box();

        let mut underlined = props("ace");
        underlined.underline = true;
        let u = layout_text(&book, &underlined).path.unwrap().bounding_box();
        assert!(u.y1 > plain.y1 + 1.0);

        let upright = layout_text(&book, &props("H")).path.unwrap().bounding_box();
        let mut italic = props("H");
        italic.italic = true;
        let i = layout_text(&book, &italic).path.unwrap().bounding_box();
        // sheared right above the baseline, anchored on it
        assert!(i.x1 > upright.x1 + 2.0);
        assert!((i.y1 - upright.y1).abs() < 1e-6);
    }

    #[test]
    fn lines_align_inside_the_block() {
        let book = dejavu();
        let mut p = props("a much wider line\nab");
        let left_edge = |p: &TextProps| {
            let block = layout_text(&book, p);
            let path = block.path.unwrap();
            path.elements()
                .iter()
                .filter_map(|el| match *el {
                    kurbo::PathEl::MoveTo(p) | kurbo::PathEl::LineTo(p) => Some(p),
                    kurbo::PathEl::QuadTo(_, p) | kurbo::PathEl::CurveTo(_, _, p) => Some(p),
                    kurbo::PathEl::ClosePath => None,
                })
                .filter(|pt| pt.y > 24.0 * LINE_HEIGHT)
                .map(|pt| pt.x)
                .fold(f64::INFINITY, f64::min)
        };
        let left = left_edge(&p);
        p.text_align = TextAlign::Center;
        let center = left_edge(&p);
        p.text_align = TextAlign::Right;
        let right = left_edge(&p);
        assert!(left < 5.0);
        assert!(center > left + 20.0);
        assert!(right > center + 20.0);
    }

    #[test]
    fn family_keys_ignore_case_and_quotes() {
        assert_eq!(family_key(" 'Open Sans' "), "open sans");
        assert_eq!(family_key("Arial"), "arial");
    }
}
