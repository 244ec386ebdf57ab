//! Styling colors for vector overlays.

use serde::{Deserialize, Serialize};

/// An RGBA color with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    pub red: f32,
    pub green: f32,
    pub blue: f32,
    pub alpha: f32,
}

impl Color {
    pub const WHITE: Self = Self::rgb8(255, 255, 255);
    pub const BLACK: Self = Self::rgb8(0, 0, 0);

    /// Builds an opaque color from 8-bit channels.
    pub const fn rgb8(r: u8, g: u8, b: u8) -> Self {
        Self::rgba8(r, g, b, 255)
    }

    /// Builds a color from 8-bit channels.
    pub const fn rgba8(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self {
            red: r as f32 / 255.0,
            green: g as f32 / 255.0,
            blue: b as f32 / 255.0,
            alpha: a as f32 / 255.0,
        }
    }

    /// Parses a descriptor color.
    ///
    /// `#`-prefixed values are CSS hex (`#rgb`, `#rgba`, `#rrggbb`,
    /// `#rrggbbaa`) and yield `None` when malformed. Anything else is looked
    /// up as a named color, case-insensitively, falling back to white.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Some(hex) = value.strip_prefix('#') {
            return Self::from_hex(hex);
        }
        Some(Self::named(value).unwrap_or(Self::WHITE))
    }

    fn from_hex(hex: &str) -> Option<Self> {
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).ok().map(|n| n * 17);
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();

        match hex.len() {
            3 => Some(Self::rgb8(nibble(0)?, nibble(1)?, nibble(2)?)),
            4 => Some(Self::rgba8(nibble(0)?, nibble(1)?, nibble(2)?, nibble(3)?)),
            6 => Some(Self::rgb8(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Self::rgba8(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    fn named(name: &str) -> Option<Self> {
        let color = match name.to_ascii_uppercase().as_str() {
            "WHITE" => Self::WHITE,
            "BLACK" => Self::BLACK,
            "RED" => Self::rgb8(255, 0, 0),
            "LIME" => Self::rgb8(0, 255, 0),
            "GREEN" => Self::rgb8(0, 128, 0),
            "BLUE" => Self::rgb8(0, 0, 255),
            "YELLOW" => Self::rgb8(255, 255, 0),
            "CYAN" | "AQUA" => Self::rgb8(0, 255, 255),
            "MAGENTA" | "FUCHSIA" => Self::rgb8(255, 0, 255),
            "ORANGE" => Self::rgb8(255, 165, 0),
            "PURPLE" => Self::rgb8(128, 0, 128),
            "GRAY" | "GREY" => Self::rgb8(128, 128, 128),
            "SILVER" => Self::rgb8(192, 192, 192),
            "NAVY" => Self::rgb8(0, 0, 128),
            "TEAL" => Self::rgb8(0, 128, 128),
            "MAROON" => Self::rgb8(128, 0, 0),
            "OLIVE" => Self::rgb8(128, 128, 0),
            "BROWN" => Self::rgb8(165, 42, 42),
            "PINK" => Self::rgb8(255, 192, 203),
            "GOLD" => Self::rgb8(255, 215, 0),
            "TRANSPARENT" => Self::rgba8(0, 0, 0, 0),
            _ => return None,
        };
        Some(color)
    }
}
