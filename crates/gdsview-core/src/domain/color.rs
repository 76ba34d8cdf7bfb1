//! RGBA colors and the fixed palettes used for layers and marker categories.
//!
//! Colors arrive from configuration and RDB files as strings: either a CSS-ish
//! name (`"red"`, `"orange"`) or a hex literal (`"#ff8000"`, `"#ff800080"`).
//! Everything downstream works with the resolved [`Rgba`] value.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while parsing a color string.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ColorError {
    /// The string is neither a known color name nor a hex literal.
    #[error("unrecognised color: '{0}'")]
    Unrecognised(String),
}

/// An 8-bit-per-channel color with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

/// Named colors accepted in configuration.
const NAMED: &[(&str, Rgba)] = &[
    ("black", Rgba::opaque(0x00, 0x00, 0x00)),
    ("white", Rgba::opaque(0xff, 0xff, 0xff)),
    ("red", Rgba::opaque(0xff, 0x00, 0x00)),
    ("green", Rgba::opaque(0x00, 0x80, 0x00)),
    ("lime", Rgba::opaque(0x00, 0xff, 0x00)),
    ("blue", Rgba::opaque(0x00, 0x00, 0xff)),
    ("yellow", Rgba::opaque(0xff, 0xff, 0x00)),
    ("cyan", Rgba::opaque(0x00, 0xff, 0xff)),
    ("magenta", Rgba::opaque(0xff, 0x00, 0xff)),
    ("orange", Rgba::opaque(0xff, 0xa5, 0x00)),
    ("purple", Rgba::opaque(0x80, 0x00, 0x80)),
    ("pink", Rgba::opaque(0xff, 0xc0, 0xcb)),
    ("brown", Rgba::opaque(0xa5, 0x2a, 0x2a)),
    ("gray", Rgba::opaque(0x80, 0x80, 0x80)),
    ("grey", Rgba::opaque(0x80, 0x80, 0x80)),
];

/// Palette for synthesized layers and marker categories.
///
/// Order matters: indices are derived from stable hashes, so reordering this
/// table changes the color every existing rule or layer is drawn in.
const PALETTE: &[Rgba] = &[
    Rgba::opaque(0xff, 0x80, 0xa8),
    Rgba::opaque(0xc0, 0x80, 0xff),
    Rgba::opaque(0x96, 0x80, 0xff),
    Rgba::opaque(0x80, 0x80, 0xff),
    Rgba::opaque(0x80, 0xa8, 0xff),
    Rgba::opaque(0x80, 0xff, 0xff),
    Rgba::opaque(0x80, 0xff, 0xa8),
    Rgba::opaque(0x80, 0xff, 0x80),
    Rgba::opaque(0xa8, 0xff, 0x80),
    Rgba::opaque(0xff, 0xff, 0x80),
    Rgba::opaque(0xff, 0xc0, 0x80),
    Rgba::opaque(0xff, 0x80, 0x80),
    Rgba::opaque(0xff, 0x00, 0x00),
    Rgba::opaque(0x00, 0x80, 0xff),
    Rgba::opaque(0x00, 0xc0, 0x40),
    Rgba::opaque(0xff, 0x80, 0x00),
];

impl Rgba {
    /// Builds a fully opaque color.
    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 0xff }
    }

    /// Returns the same color with a different alpha.
    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Parses a color name or a `#rrggbb` / `#rrggbbaa` literal.
    ///
    /// # Errors
    ///
    /// Returns [`ColorError::Unrecognised`] for anything else.
    pub fn parse(input: &str) -> Result<Self, ColorError> {
        let trimmed = input.trim();
        if let Some(hex) = trimmed.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| ColorError::Unrecognised(input.to_string()));
        }
        let lower = trimmed.to_ascii_lowercase();
        NAMED
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, c)| *c)
            .ok_or_else(|| ColorError::Unrecognised(input.to_string()))
    }

    /// Formats as `#rrggbb`, or `#rrggbbaa` when not fully opaque.
    pub fn to_hex(&self) -> String {
        if self.a == 0xff {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    match hex.len() {
        6 => Some(Rgba::opaque(byte(0)?, byte(2)?, byte(4)?)),
        8 => Some(Rgba {
            r: byte(0)?,
            g: byte(2)?,
            b: byte(4)?,
            a: byte(6)?,
        }),
        _ => None,
    }
}

/// 64-bit FNV-1a hash.
///
/// Used instead of `std::hash` so palette picks never change between Rust
/// releases or process runs.
pub fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes.iter().fold(OFFSET, |hash, b| (hash ^ u64::from(*b)).wrapping_mul(PRIME))
}

/// Picks a palette entry for an arbitrary stable key.
pub fn palette_color(key: &[u8]) -> Rgba {
    PALETTE[(fnv1a(key) % PALETTE.len() as u64) as usize]
}

// ── Tests ─────────────────────────────────────────────────────────────────────
