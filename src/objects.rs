use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::types::{Point, ShapeKind, Size, TextAlign};

pub const MIN_SCALE: f64 = 0.1;
pub const MAX_SCALE: f64 = 2.0;
pub const MIN_FONT_SIZE: f64 = 8.0;
pub const MAX_FONT_SIZE: f64 = 72.0;
pub const MIN_WATERMARK_OPACITY: f64 = 0.1;

/// Folds any angle in degrees into `[0, 360)`.
pub fn normalize_rotation(degrees: f64) -> f64 {
    let r = ((degrees % 360.0) + 360.0) % 360.0;
    // -1e-14 % 360 + 360 rounds to exactly 360.0
    if r >= 360.0 { 0.0 } else { r }
}

pub fn clamp_scale(scale: f64) -> f64 {
    scale.clamp(MIN_SCALE, MAX_SCALE)
}

pub fn clamp_font_size(size: f64) -> f64 {
    size.clamp(MIN_FONT_SIZE, MAX_FONT_SIZE)
}

fn one() -> f64 {
    1.0
}

/// Where an entity sits and how it is transformed around its own origin.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug)]
pub struct Placement {
    pub position: Point,
    #[serde(default = "one")]
    pub scale: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "one")]
    pub opacity: f64,
}

impl Placement {
    pub fn at(position: Point) -> Self {
        Placement { position, scale: 1.0, rotation: 0.0, opacity: 1.0 }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ShapeProps {
    pub shape: ShapeKind,
    pub size: Size,
    pub color: String,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct TextProps {
    pub text: String,
    pub font_family: String,
    pub font_size: f64,
    pub font_weight: String,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub underline: bool,
    pub color: String,
    #[serde(default)]
    pub text_align: TextAlign,
}

impl TextProps {
    pub fn is_bold(&self) -> bool {
        match self.font_weight.as_str() {
            "bold" | "bolder" | "semibold" => true,
            w => w.parse::<u32>().map(|n| n >= 600).unwrap_or(false),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub url: String,
    pub name: String,
    /// Back-reference to the uploaded asset this watermark was made from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementBody {
    Shape(ShapeProps),
    Text(TextProps),
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatermarkBody {
    Image(ImageRef),
    Text(TextProps),
}

/// A shape or text layer of the base design.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Element {
    pub id: u32,
    #[serde(flatten)]
    pub placement: Placement,
    #[serde(flatten)]
    pub body: ElementBody,
}

/// An image or text overlay, always painted above every element.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
pub struct Watermark {
    pub id: u32,
    #[serde(flatten)]
    pub placement: Placement,
    #[serde(flatten)]
    pub body: WatermarkBody,
}

impl Element {
    pub fn text(&self) -> Option<&TextProps> {
        match &self.body {
            ElementBody::Text(t) => Some(t),
            ElementBody::Shape(_) => None,
        }
    }

    /// Same kind, same shape or text, same position. Used to absorb repeated
    /// drop events.
    pub fn duplicates(&self, draft: &ElementDraft) -> bool {
        if self.placement.position != draft.position {
            return false;
        }
        match (&self.body, &draft.kind) {
            (ElementBody::Shape(s), ElementDraftKind::Shape { shape, .. }) => s.shape == *shape,
            (ElementBody::Text(t), ElementDraftKind::Text(d)) => t.text == d.text,
            _ => false,
        }
    }

    pub fn apply(&mut self, patch: &PropertyPatch) {
        patch.apply_placement(&mut self.placement);
        match &mut self.body {
            ElementBody::Shape(shape) => {
                if let Some(kind) = patch.shape {
                    shape.shape = kind;
                }
                if let Some(size) = patch.size.filter(|s| s.width.is_finite() && s.height.is_finite()) {
                    shape.size = size;
                }
                if let Some(color) = &patch.color {
                    shape.color = color.clone();
                }
            }
            ElementBody::Text(text) => patch.apply_text(text),
        }
    }
}

impl Watermark {
    pub fn text(&self) -> Option<&TextProps> {
        match &self.body {
            WatermarkBody::Text(t) => Some(t),
            WatermarkBody::Image(_) => None,
        }
    }

    pub fn image(&self) -> Option<&ImageRef> {
        match &self.body {
            WatermarkBody::Image(i) => Some(i),
            WatermarkBody::Text(_) => None,
        }
    }

    pub fn asset_id(&self) -> Option<&str> {
        self.image().and_then(|i| i.image_id.as_deref())
    }

    pub fn apply(&mut self, patch: &PropertyPatch) {
        patch.apply_placement(&mut self.placement);
        match &mut self.body {
            WatermarkBody::Image(image) => {
                if let Some(url) = &patch.url {
                    image.url = url.clone();
                }
                if let Some(name) = &patch.name {
                    image.name = name.clone();
                }
            }
            WatermarkBody::Text(text) => patch.apply_text(text),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct TextDraft {
    pub text: String,
    pub font_family: Option<String>,
    pub font_size: Option<f64>,
    pub font_weight: Option<String>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub color: Option<String>,
    pub text_align: Option<TextAlign>,
}

impl TextDraft {
    pub fn new(text: impl Into<String>) -> Self {
        TextDraft { text: text.into(), ..Default::default() }
    }

    pub fn into_props(self, config: &EngineConfig) -> TextProps {
        TextProps {
            text: self.text,
            font_family: self.font_family.unwrap_or_else(|| config.default_font_family.clone()),
            font_size: clamp_font_size(self.font_size.unwrap_or(config.default_font_size)),
            font_weight: self.font_weight.unwrap_or_else(|| "normal".to_string()),
            italic: self.italic.unwrap_or(false),
            underline: self.underline.unwrap_or(false),
            color: self.color.unwrap_or_else(|| config.default_text_color.clone()),
            text_align: self.text_align.unwrap_or_default(),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ElementDraftKind {
    Shape {
        shape: ShapeKind,
        #[serde(default)]
        size: Option<Size>,
        #[serde(default)]
        color: Option<String>,
    },
    Text(TextDraft),
}

/// What a palette drop or toolbar action asks to add.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ElementDraft {
    pub position: Point,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(flatten)]
    pub kind: ElementDraftKind,
}

impl ElementDraft {
    pub fn shape(shape: ShapeKind, position: Point) -> Self {
        ElementDraft {
            position,
            scale: None,
            rotation: None,
            opacity: None,
            kind: ElementDraftKind::Shape { shape, size: None, color: None },
        }
    }

    pub fn text(text: TextDraft, position: Point) -> Self {
        ElementDraft { position, scale: None, rotation: None, opacity: None, kind: ElementDraftKind::Text(text) }
    }

    pub fn into_element(self, id: u32, config: &EngineConfig) -> Element {
        let placement = Placement {
            position: self.position,
            scale: clamp_scale(self.scale.unwrap_or(1.0)),
            rotation: normalize_rotation(self.rotation.unwrap_or(0.0)),
            opacity: self.opacity.unwrap_or(config.default_element_opacity).clamp(0.0, 1.0),
        };
        let body = match self.kind {
            ElementDraftKind::Shape { shape, size, color } => ElementBody::Shape(ShapeProps {
                shape,
                size: size.unwrap_or(config.default_shape_size),
                color: color.unwrap_or_else(|| config.default_shape_color.clone()),
            }),
            ElementDraftKind::Text(text) => ElementBody::Text(text.into_props(config)),
        };
        Element { id, placement, body }
    }
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WatermarkDraftKind {
    Image {
        url: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(default, rename = "imageId")]
        image_id: Option<String>,
    },
    Text(TextDraft),
}

#[derive(Serialize, Deserialize, Clone, PartialEq, Debug)]
#[serde(rename_all = "camelCase")]
pub struct WatermarkDraft {
    /// Image watermarks default to the canvas centre less (50, 50); text
    /// watermarks to (50, 50).
    #[serde(default)]
    pub position: Option<Point>,
    #[serde(default)]
    pub scale: Option<f64>,
    #[serde(default)]
    pub rotation: Option<f64>,
    #[serde(default)]
    pub opacity: Option<f64>,
    #[serde(flatten)]
    pub kind: WatermarkDraftKind,
}

impl WatermarkDraft {
    pub fn image(url: impl Into<String>, name: Option<String>, image_id: Option<String>) -> Self {
        WatermarkDraft {
            position: None,
            scale: None,
            rotation: None,
            opacity: None,
            kind: WatermarkDraftKind::Image { url: url.into(), name, image_id },
        }
    }

    pub fn text(text: TextDraft) -> Self {
        WatermarkDraft { position: None, scale: None, rotation: None, opacity: None, kind: WatermarkDraftKind::Text(text) }
    }

    pub fn at(mut self, position: Point) -> Self {
        self.position = Some(position);
        self
    }

    pub fn asset_id(&self) -> Option<&str> {
        match &self.kind {
            WatermarkDraftKind::Image { image_id, .. } => image_id.as_deref(),
            WatermarkDraftKind::Text(_) => None,
        }
    }

    pub fn default_position(&self, config: &EngineConfig) -> Point {
        match self.kind {
            WatermarkDraftKind::Image { .. } => config.center().offset(Point::new(-50.0, -50.0)),
            WatermarkDraftKind::Text(_) => Point::new(50.0, 50.0),
        }
    }

    pub fn into_watermark(self, id: u32, position: Point, config: &EngineConfig) -> Watermark {
        let placement = Placement {
            position,
            scale: clamp_scale(self.scale.unwrap_or(1.0)),
            rotation: normalize_rotation(self.rotation.unwrap_or(0.0)),
            opacity: self.opacity.unwrap_or(config.default_watermark_opacity).clamp(0.0, 1.0),
        };
        let body = match self.kind {
            WatermarkDraftKind::Image { url, name, image_id } => WatermarkBody::Image(ImageRef {
                url,
                name: name.unwrap_or_else(|| "Watermark Image".to_string()),
                image_id,
            }),
            WatermarkDraftKind::Text(text) => WatermarkBody::Text(text.into_props(config)),
        };
        Watermark { id, placement, body }
    }
}

/// A partial property update. Fields that do not apply to the target's kind
/// are ignored, as are non-finite numbers.
#[derive(Serialize, Deserialize, Clone, PartialEq, Debug, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct PropertyPatch {
    pub position: Option<Point>,
    pub scale: Option<f64>,
    pub rotation: Option<f64>,
    pub opacity: Option<f64>,
    pub color: Option<String>,
    pub size: Option<Size>,
    pub shape: Option<ShapeKind>,
    pub text: Option<String>,
    pub font_family: Option<String>,
    pub font_size: Option<f64>,
    pub font_weight: Option<String>,
    pub italic: Option<bool>,
    pub underline: Option<bool>,
    pub text_align: Option<TextAlign>,
    pub url: Option<String>,
    pub name: Option<String>,
}

impl PropertyPatch {
    pub fn rotation(degrees: f64) -> Self {
        PropertyPatch { rotation: Some(degrees), ..Default::default() }
    }

    fn apply_placement(&self, placement: &mut Placement) {
        if let Some(position) = self.position.filter(|p| p.x.is_finite() && p.y.is_finite()) {
            placement.position = position;
        }
        if let Some(scale) = self.scale.filter(|v| v.is_finite()) {
            placement.scale = scale;
        }
        if let Some(opacity) = self.opacity.filter(|v| v.is_finite()) {
            placement.opacity = opacity;
        }
        if let Some(rotation) = self.rotation.filter(|v| v.is_finite()) {
            placement.rotation = normalize_rotation(rotation);
        }
    }

    fn apply_text(&self, text: &mut TextProps) {
        if let Some(content) = &self.text {
            text.text = content.clone();
        }
        if let Some(family) = &self.font_family {
            text.font_family = family.clone();
        }
        if let Some(size) = self.font_size.filter(|v| v.is_finite()) {
            text.font_size = size;
        }
        if let Some(weight) = &self.font_weight {
            text.font_weight = weight.clone();
        }
        if let Some(italic) = self.italic {
            text.italic = italic;
        }
        if let Some(underline) = self.underline {
            text.underline = underline;
        }
        if let Some(color) = &self.color {
            text.color = color.clone();
        }
        if let Some(align) = self.text_align {
            text.text_align = align;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_folds_into_range() {
        assert_eq!(normalize_rotation(370.0), 10.0);
        assert_eq!(normalize_rotation(-15.0), 345.0);
        assert_eq!(normalize_rotation(720.0), 0.0);
        assert_eq!(normalize_rotation(-1e-14), 0.0);
        for r in [-1000.5, -360.0, -0.25, 0.0, 359.99, 1e6] {
            let once = normalize_rotation(r);
            assert!((0.0..360.0).contains(&once));
            assert_eq!(normalize_rotation(once), once);
        }
    }

    #[test]
    fn element_json_is_flat() {
        let config = EngineConfig::default();
        let element = ElementDraft::shape(ShapeKind::Star, Point::new(1.0, 2.0)).into_element(7, &config);
        let json = serde_json::to_value(&element).unwrap();
        assert_eq!(json["type"], "shape");
        assert_eq!(json["shape"], "star");
        assert_eq!(json["position"]["x"], 1.0);
        assert_eq!(json["color"], "#3B82F6");
        let back: Element = serde_json::from_value(json).unwrap();
        assert_eq!(back, element);
    }

    #[test]
    fn text_draft_defaults_and_clamps() {
        let config = EngineConfig::default();
        let mut draft = TextDraft::new("Sample");
        draft.font_size = Some(200.0);
        let props = draft.into_props(&config);
        assert_eq!(props.font_size, 72.0);
        assert_eq!(props.color, "#000000");
        assert_eq!(props.font_family, "Arial, sans-serif");
    }

    #[test]
    fn patch_ignores_fields_of_other_kinds() {
        let config = EngineConfig::default();
        let mut text = ElementDraft::text(TextDraft::new("a"), Point::default()).into_element(1, &config);
        let patch = PropertyPatch { size: Some(Size::new(5.0, 5.0)), text: Some("b".into()), ..Default::default() };
        text.apply(&patch);
        assert_eq!(text.text().unwrap().text, "b");
    }

    #[test]
    fn patch_skips_non_finite_numbers() {
        let config = EngineConfig::default();
        let mut el = ElementDraft::shape(ShapeKind::Circle, Point::default()).into_element(1, &config);
        el.apply(&PropertyPatch { scale: Some(f64::NAN), rotation: Some(f64::INFINITY), ..Default::default() });
        assert_eq!(el.placement.scale, 1.0);
        assert_eq!(el.placement.rotation, 0.0);
    }
}
