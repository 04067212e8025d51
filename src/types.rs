use serde::{Deserialize, Serialize};

/// A position in logical canvas coordinates.
#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn offset(self, delta: Point) -> Self {
        Point::new(self.x + delta.x, self.y + delta.y)
    }
}

impl std::ops::Sub for Point {
    type Output = Point;
    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Debug, Default)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Size { width, height }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Triangle,
    Star,
    Hexagon,
    Pentagon,
    Octagon,
    Diamond,
    Line,
}

impl ShapeKind {
    pub const ALL: [ShapeKind; 9] = [
        ShapeKind::Rectangle,
        ShapeKind::Circle,
        ShapeKind::Triangle,
        ShapeKind::Star,
        ShapeKind::Hexagon,
        ShapeKind::Pentagon,
        ShapeKind::Octagon,
        ShapeKind::Diamond,
        ShapeKind::Line,
    ];
}

#[derive(Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

/// Straight (non-premultiplied) 8-bit colour.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const TRANSPARENT: Rgba = Rgba { r: 0, g: 0, b: 0, a: 0 };

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Rgba { r, g, b, a: 255 }
    }

    /// Parses the CSS colour forms the editor produces: `#rgb`, `#rrggbb`,
    /// `#rrggbbaa`, `rgb()`, `rgba()`, `transparent` and a few names.
    pub fn parse(input: &str) -> Option<Rgba> {
        let s = input.trim().to_ascii_lowercase();
        if let Some(hex) = s.strip_prefix('#') {
            return parse_hex(hex);
        }
        if let Some(args) = s.strip_prefix("rgba(").or_else(|| s.strip_prefix("rgb(")) {
            return parse_rgb_args(args.strip_suffix(')')?);
        }
        match s.as_str() {
            "transparent" => Some(Rgba::TRANSPARENT),
            "black" => Some(Rgba::BLACK),
            "white" => Some(Rgba::WHITE),
            "red" => Some(Rgba::rgb(255, 0, 0)),
            "green" => Some(Rgba::rgb(0, 128, 0)),
            "blue" => Some(Rgba::rgb(0, 0, 255)),
            "gray" | "grey" => Some(Rgba::rgb(128, 128, 128)),
            _ => None,
        }
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok().map(|v| v * 17);
    let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 => Some(Rgba::rgb(nibble(0)?, nibble(1)?, nibble(2)?)),
        6 => Some(Rgba::rgb(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Rgba { r: byte(0)?, g: byte(2)?, b: byte(4)?, a: byte(6)? }),
        _ => None,
    }
}

fn parse_rgb_args(args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |p: &str| p.parse::<f64>().ok().map(|v| v.clamp(0.0, 255.0).round() as u8);
    let alpha = match parts.get(3) {
        Some(a) => (a.parse::<f64>().ok()?.clamp(0.0, 1.0) * 255.0).round() as u8,
        None => 255,
    };
    Some(Rgba { r: channel(parts[0])?, g: channel(parts[1])?, b: channel(parts[2])?, a: alpha })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_forms() {
        assert_eq!(Rgba::parse("#3B82F6"), Some(Rgba::rgb(0x3b, 0x82, 0xf6)));
        assert_eq!(Rgba::parse("#fff"), Some(Rgba::WHITE));
        assert_eq!(Rgba::parse("#00000080").map(|c| c.a), Some(0x80));
        assert_eq!(Rgba::parse("#12345"), None);
    }

    #[test]
    fn parses_functional_forms() {
        assert_eq!(Rgba::parse("rgba(79, 172, 254, 0.3)"), Some(Rgba { r: 79, g: 172, b: 254, a: 77 }));
        assert_eq!(Rgba::parse("rgb(1,2,3)"), Some(Rgba::rgb(1, 2, 3)));
        assert_eq!(Rgba::parse("rgb(1,2)"), None);
    }

    #[test]
    fn shape_kinds_use_lowercase_names() {
        assert_eq!(serde_json::to_string(&ShapeKind::Hexagon).unwrap(), "\"hexagon\"");
        let kind: ShapeKind = serde_json::from_str("\"diamond\"").unwrap();
        assert_eq!(kind, ShapeKind::Diamond);
    }
}
