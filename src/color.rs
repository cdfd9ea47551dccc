//! CSS colour handling for dark terminals.
//!
//! Card templates are written for light backgrounds, so colours coming out
//! of the HTML are parsed into terminal colours and, in high-contrast mode,
//! pushed towards legibility on a dark background.

use std::fmt;

use once_cell::sync::Lazy;
use ratatui::style::Color;
use regex::Regex;

static RGB_FUNCTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^rgb\(\s*(\d+)\s*,\s*(\d+)\s*,\s*(\d+)\s*\)$").unwrap());
static COMPOUND_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(light|dark|medium|pale|deep)(.+)$").unwrap());

/// Values that name no colour at all
const NON_COLOR_KEYWORDS: &[&str] = &["transparent", "inherit", "initial", "unset", "currentcolor"];

/// Foreground luminance below which a colour is brightened
const MIN_FOREGROUND_LUMINANCE: f64 = 140.0;
/// Luminance a dim foreground is scaled up to
const TARGET_FOREGROUND_LUMINANCE: f64 = 190.0;
/// Background luminance above which the background is dropped
const MAX_BACKGROUND_LUMINANCE: f64 = 130.0;
/// Stand-in for pure black text
const BLACK_FALLBACK: Rgb = Rgb::new(0xb0, 0xb0, 0xb0);

/// A 24-bit colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    const fn from_u32(value: u32) -> Self {
        Self::new((value >> 16) as u8, (value >> 8) as u8, value as u8)
    }

    /// Parse `#rgb`, `#rrggbb` or `rgb(r, g, b)`
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            if !hex.is_ascii() {
                return None;
            }
            return match hex.len() {
                3 => {
                    let mut channels = hex
                        .chars()
                        .map(|c| c.to_digit(16).map(|d| (d * 17) as u8));
                    Some(Self::new(channels.next()??, channels.next()??, channels.next()??))
                }
                6 => {
                    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
                    Some(Self::new(channel(0)?, channel(2)?, channel(4)?))
                }
                _ => None,
            };
        }

        let caps = RGB_FUNCTION.captures(value)?;
        let channel = |i: usize| -> Option<u8> {
            let n: u32 = caps[i].parse().ok()?;
            Some(n.min(255) as u8)
        };
        Some(Self::new(channel(1)?, channel(2)?, channel(3)?))
    }

    /// Perceived brightness, 0 to 255
    pub fn luminance(&self) -> f64 {
        0.299 * f64::from(self.r) + 0.587 * f64::from(self.g) + 0.114 * f64::from(self.b)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl From<Rgb> for Color {
    fn from(rgb: Rgb) -> Self {
        Color::Rgb(rgb.r, rgb.g, rgb.b)
    }
}

/// Named colours the terminal palette provides directly
fn native_color(name: &str) -> Option<Color> {
    let color = match name {
        "black" => Color::Black,
        "red" => Color::Red,
        "green" => Color::Green,
        "yellow" => Color::Yellow,
        "blue" => Color::Blue,
        "magenta" => Color::Magenta,
        "cyan" => Color::Cyan,
        "gray" => Color::Gray,
        "white" => Color::White,
        "dark_gray" => Color::DarkGray,
        "light_red" => Color::LightRed,
        "light_green" => Color::LightGreen,
        "light_yellow" => Color::LightYellow,
        "light_blue" => Color::LightBlue,
        "light_magenta" => Color::LightMagenta,
        "light_cyan" => Color::LightCyan,
        _ => return None,
    };
    Some(color)
}

/// Look up a CSS named colour
pub fn named_color(name: &str) -> Option<Rgb> {
    CSS_NAMED_COLORS
        .binary_search_by_key(&name, |(n, _)| *n)
        .ok()
        .map(|idx| Rgb::from_u32(CSS_NAMED_COLORS[idx].1))
}

/// Parse a CSS colour value into a terminal colour
///
/// Names resolve against the terminal palette first (`red`), then with the
/// compound prefix split off (`lightblue` -> `light_blue`), then through the
/// CSS name table. Keywords like `transparent` yield `None`.
pub fn parse_color(value: &str) -> Option<Color> {
    let value = value.trim().to_ascii_lowercase();
    if value.is_empty() || NON_COLOR_KEYWORDS.contains(&value.as_str()) {
        return None;
    }
    if let Some(rgb) = Rgb::parse(&value) {
        return Some(rgb.into());
    }
    if let Some(color) = native_color(&value) {
        return Some(color);
    }
    if let Some(caps) = COMPOUND_NAME.captures(&value) {
        if let Some(color) = native_color(&format!("{}_{}", &caps[1], &caps[2])) {
            return Some(color);
        }
    }
    named_color(&value).map(Color::from)
}

/// Resolve a CSS colour value to RGB, including named colours
pub fn css_to_rgb(value: &str) -> Option<Rgb> {
    let value = value.trim().to_ascii_lowercase();
    if NON_COLOR_KEYWORDS.contains(&value.as_str()) {
        return None;
    }
    Rgb::parse(&value).or_else(|| named_color(&value))
}

/// Adapt a colour for a dark terminal
///
/// Foregrounds darker than the threshold are scaled up keeping their hue;
/// pure black becomes a light gray. Backgrounds that are not clearly dark
/// are dropped (`None`).
pub fn adjust_for_contrast(color: Rgb, is_background: bool) -> Option<Rgb> {
    let luminance = color.luminance();

    if is_background {
        return (luminance <= MAX_BACKGROUND_LUMINANCE).then_some(color);
    }
    if luminance >= MIN_FOREGROUND_LUMINANCE {
        return Some(color);
    }
    if color.r.max(color.g).max(color.b) == 0 {
        return Some(BLACK_FALLBACK);
    }

    let scale = TARGET_FOREGROUND_LUMINANCE / luminance;
    let channel = |c: u8| (f64::from(c) * scale).min(255.0) as u8;
    Some(Rgb::new(channel(color.r), channel(color.g), channel(color.b)))
}

/// CSS named colours, sorted by name
static CSS_NAMED_COLORS: &[(&str, u32)] = &[
    ("aliceblue", 0xF0F8FF),
    ("antiquewhite", 0xFAEBD7),
    ("aqua", 0x00FFFF),
    ("aquamarine", 0x7FFFD4),
    ("azure", 0xF0FFFF),
    ("beige", 0xF5F5DC),
    ("bisque", 0xFFE4C4),
    ("black", 0x000000),
    ("blanchedalmond", 0xFFEBCD),
    ("blue", 0x0000FF),
    ("blueviolet", 0x8A2BE2),
    ("brown", 0xA52A2A),
    ("burlywood", 0xDEB887),
    ("cadetblue", 0x5F9EA0),
    ("chartreuse", 0x7FFF00),
    ("chocolate", 0xD2691E),
    ("coral", 0xFF7F50),
    ("cornflowerblue", 0x6495ED),
    ("cornsilk", 0xFFF8DC),
    ("crimson", 0xDC143C),
    ("cyan", 0x00FFFF),
    ("darkblue", 0x00008B),
    ("darkcyan", 0x008B8B),
    ("darkgoldenrod", 0xB8860B),
    ("darkgray", 0xA9A9A9),
    ("darkgreen", 0x006400),
    ("darkgrey", 0xA9A9A9),
    ("darkkhaki", 0xBDB76B),
    ("darkmagenta", 0x8B008B),
    ("darkolivegreen", 0x556B2F),
    ("darkorange", 0xFF8C00),
    ("darkorchid", 0x9932CC),
    ("darkred", 0x8B0000),
    ("darksalmon", 0xE9967A),
    ("darkseagreen", 0x8FBC8F),
    ("darkslateblue", 0x483D8B),
    ("darkslategray", 0x2F4F4F),
    ("darkslategrey", 0x2F4F4F),
    ("darkturquoise", 0x00CED1),
    ("darkviolet", 0x9400D3),
    ("deeppink", 0xFF1493),
    ("deepskyblue", 0x00BFFF),
    ("dimgray", 0x696969),
    ("dimgrey", 0x696969),
    ("dodgerblue", 0x1E90FF),
    ("firebrick", 0xB22222),
    ("floralwhite", 0xFFFAF0),
    ("forestgreen", 0x228B22),
    ("fuchsia", 0xFF00FF),
    ("gainsboro", 0xDCDCDC),
    ("ghostwhite", 0xF8F8FF),
    ("gold", 0xFFD700),
    ("goldenrod", 0xDAA520),
    ("gray", 0x808080),
    ("green", 0x008000),
    ("greenyellow", 0xADFF2F),
    ("grey", 0x808080),
    ("honeydew", 0xF0FFF0),
    ("hotpink", 0xFF69B4),
    ("indianred", 0xCD5C5C),
    ("indigo", 0x4B0082),
    ("ivory", 0xFFFFF0),
    ("khaki", 0xF0E68C),
    ("lavender", 0xE6E6FA),
    ("lavenderblush", 0xFFF0F5),
    ("lawngreen", 0x7CFC00),
    ("lemonchiffon", 0xFFFACD),
    ("lightblue", 0xADD8E6),
    ("lightcoral", 0xF08080),
    ("lightcyan", 0xE0FFFF),
    ("lightgoldenrodyellow", 0xFAFAD2),
    ("lightgray", 0xD3D3D3),
    ("lightgreen", 0x90EE90),
    ("lightgrey", 0xD3D3D3),
    ("lightpink", 0xFFB6C1),
    ("lightsalmon", 0xFFA07A),
    ("lightseagreen", 0x20B2AA),
    ("lightskyblue", 0x87CEFA),
    ("lightslategray", 0x778899),
    ("lightslategrey", 0x778899),
    ("lightsteelblue", 0xB0C4DE),
    ("lightyellow", 0xFFFFE0),
    ("lime", 0x00FF00),
    ("limegreen", 0x32CD32),
    ("linen", 0xFAF0E6),
    ("magenta", 0xFF00FF),
    ("maroon", 0x800000),
    ("mediumaquamarine", 0x66CDAA),
    ("mediumblue", 0x0000CD),
    ("mediumorchid", 0xBA55D3),
    ("mediumpurple", 0x9370DB),
    ("mediumseagreen", 0x3CB371),
    ("mediumslateblue", 0x7B68EE),
    ("mediumspringgreen", 0x00FA9A),
    ("mediumturquoise", 0x48D1CC),
    ("mediumvioletred", 0xC71585),
    ("midnightblue", 0x191970),
    ("mintcream", 0xF5FFFA),
    ("mistyrose", 0xFFE4E1),
    ("moccasin", 0xFFE4B5),
    ("navajowhite", 0xFFDEAD),
    ("navy", 0x000080),
    ("oldlace", 0xFDF5E6),
    ("olive", 0x808000),
    ("olivedrab", 0x6B8E23),
    ("orange", 0xFFA500),
    ("orangered", 0xFF4500),
    ("orchid", 0xDA70D6),
    ("palegoldenrod", 0xEEE8AA),
    ("palegreen", 0x98FB98),
    ("paleturquoise", 0xAFEEEE),
    ("palevioletred", 0xDB7093),
    ("papayawhip", 0xFFEFD5),
    ("peachpuff", 0xFFDAB9),
    ("peru", 0xCD853F),
    ("pink", 0xFFC0CB),
    ("plum", 0xDDA0DD),
    ("powderblue", 0xB0E0E6),
    ("purple", 0x800080),
    ("rebeccapurple", 0x663399),
    ("red", 0xFF0000),
    ("rosybrown", 0xBC8F8F),
    ("royalblue", 0x4169E1),
    ("saddlebrown", 0x8B4513),
    ("salmon", 0xFA8072),
    ("sandybrown", 0xF4A460),
    ("seagreen", 0x2E8B57),
    ("seashell", 0xFFF5EE),
    ("sienna", 0xA0522D),
    ("silver", 0xC0C0C0),
    ("skyblue", 0x87CEEB),
    ("slateblue", 0x6A5ACD),
    ("slategray", 0x708090),
    ("slategrey", 0x708090),
    ("snow", 0xFFFAFA),
    ("springgreen", 0x00FF7F),
    ("steelblue", 0x4682B4),
    ("tan", 0xD2B48C),
    ("teal", 0x008080),
    ("thistle", 0xD8BFD8),
    ("tomato", 0xFF6347),
    ("turquoise", 0x40E0D0),
    ("violet", 0xEE82EE),
    ("wheat", 0xF5DEB3),
    ("white", 0xFFFFFF),
    ("whitesmoke", 0xF5F5F5),
    ("yellow", 0xFFFF00),
    ("yellowgreen", 0x9ACD32),
];
