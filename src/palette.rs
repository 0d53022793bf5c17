//! Fixed color palette and nearest-color matching.
//!
//! A [`Palette`] is an ordered list of colors split at its midpoint: the first
//! half is unrestricted (always available), the second half restricted.
//! Declaration order matters: [`Palette::nearest`] resolves ties in favour of
//! the earlier-declared color.

use std::fmt;
use std::str::FromStr;
use std::sync::{LazyLock, OnceLock};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// The standard 64-color palette. Entries 0..32 are unrestricted.
pub const STANDARD_PALETTE: [&str; 64] = [
    "#FFFFFF", "#C4C4C4", "#888888", "#555555", "#000000", // grays
    "#FF0000", "#FF8888", "#FFAAAA", "#FFDDDD", // reds
    "#00FF00", "#88FF88", "#AAFFAA", "#DDFFDD", // greens
    "#0000FF", "#8888FF", "#AAAAFF", "#DDDDFF", // blues
    "#FFFF00", "#FFFF88", "#FFFFAA", "#FFFFDD", // yellows
    "#FF00FF", "#FF88FF", "#FFAAFF", "#FFDDFF", // magentas
    "#00FFFF", "#88FFFF", "#AAFFFF", "#DDFFFF", // cyans
    "#FFA500", "#FFAA88", "#FFCCAA", // oranges
    "#8B4513", "#A0522D", "#D2B48C", "#F4A460", // browns
    "#800080", "#9370DB", "#BA55D3", "#DDA0DD", // purples
    "#008000", "#228B22", "#32CD32", "#90EE90", // dark greens
    "#000080", "#191970", "#4169E1", "#87CEEB", // navy blues
    "#800000", "#B22222", "#DC143C", "#F08080", // dark reds
    "#808000", "#BDB76B", "#F0E68C", "#FFFFE0", // olives
    "#008080", "#20B2AA", "#48D1CC", "#AFEEEE", // teals
    "#FFB6C1", "#FFC0CB", "#FFE4E1", "#FFF0F5", // pinks
];

/// `#RRGGBB` with optional leading `#`, case-insensitive.
static HEX_COLOR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^#?([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})([0-9A-Fa-f]{2})$").unwrap()
});

/// An 8-bit RGB color.
///
/// Displays and serializes as uppercase `#RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const WHITE: Rgb = Rgb::new(255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn channels(&self) -> [u8; 3] {
        [self.r, self.g, self.b]
    }

    pub fn to_hex(&self) -> String {
        format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }

    /// Squared Euclidean distance in RGB space.
    ///
    /// Differences are taken in `i32`; the largest possible result is
    /// 3 * 255^2, which fits comfortably in `u32`.
    pub fn distance_sq(&self, other: &Rgb) -> u32 {
        let dr = self.r as i32 - other.r as i32;
        let dg = self.g as i32 - other.g as i32;
        let db = self.b as i32 - other.b as i32;
        (dr * dr + dg * dg + db * db) as u32
    }

    /// Build a color from possibly out-of-range channels, clamping each to [0, 255].
    pub fn clamped(channels: [i32; 3]) -> Self {
        let c = |v: i32| v.clamp(0, 255) as u8;
        Self::new(c(channels[0]), c(channels[1]), c(channels[2]))
    }
}

impl From<[u8; 3]> for Rgb {
    fn from(c: [u8; 3]) -> Self {
        Self::new(c[0], c[1], c[2])
    }
}

impl From<Rgb> for [u8; 3] {
    fn from(c: Rgb) -> Self {
        c.channels()
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgb {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let caps = HEX_COLOR_RE
            .captures(s.trim())
            .ok_or_else(|| Error::InvalidColor(s.to_string()))?;
        let channel = |i: usize| {
            u8::from_str_radix(&caps[i], 16).map_err(|_| Error::InvalidColor(s.to_string()))
        };
        Ok(Self::new(channel(1)?, channel(2)?, channel(3)?))
    }
}

impl Serialize for Rgb {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Rgb {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Which half of the palette a color belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Unrestricted,
    Restricted,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Unrestricted => write!(f, "unrestricted"),
            Tier::Restricted => write!(f, "restricted"),
        }
    }
}

/// Candidate set used for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subset {
    #[default]
    Full,
    Unrestricted,
}

impl fmt::Display for Subset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subset::Full => write!(f, "full"),
            Subset::Unrestricted => write!(f, "unrestricted"),
        }
    }
}

/// Lookup information about a single palette entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColorInfo {
    pub hex: String,
    pub rgb: [u8; 3],
    pub tier: Tier,
    pub index: usize,
}

/// Serializable listing of both palette halves, for front-ends.
#[derive(Debug, Clone, Serialize)]
pub struct PaletteDescription {
    pub unrestricted: Vec<ColorInfo>,
    pub restricted: Vec<ColorInfo>,
}

/// Ordered, immutable palette split at its midpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<Rgb>,
    split: usize,
}

impl Palette {
    /// Build a palette from colors in declared order.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidPalette` if `colors` has fewer than two entries,
    /// since both halves must be non-empty.
    pub fn new(colors: Vec<Rgb>) -> Result<Self> {
        if colors.len() < 2 {
            return Err(Error::InvalidPalette(format!(
                "palette needs at least 2 colors, got {}",
                colors.len()
            )));
        }
        let split = colors.len() / 2;
        Ok(Self { colors, split })
    }

    /// Parse a palette from hex strings.
    pub fn from_hex<S: AsRef<str>>(hex: &[S]) -> Result<Self> {
        let colors = hex
            .iter()
            .map(|h| h.as_ref().parse())
            .collect::<Result<Vec<Rgb>>>()?;
        Self::new(colors)
    }

    /// The standard 64-color palette.
    pub fn standard() -> Self {
        static STANDARD: OnceLock<Palette> = OnceLock::new();
        STANDARD
            .get_or_init(|| {
                let colors = STANDARD_PALETTE
                    .iter()
                    .filter_map(|h| h.parse().ok())
                    .collect();
                Palette { colors, split: STANDARD_PALETTE.len() / 2 }
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    pub fn colors(&self) -> &[Rgb] {
        &self.colors
    }

    pub fn unrestricted(&self) -> &[Rgb] {
        &self.colors[..self.split]
    }

    pub fn restricted(&self) -> &[Rgb] {
        &self.colors[self.split..]
    }

    /// Colors eligible under `subset`, in declared order.
    pub fn subset(&self, subset: Subset) -> &[Rgb] {
        match subset {
            Subset::Full => self.colors(),
            Subset::Unrestricted => self.unrestricted(),
        }
    }

    /// Position of the first entry equal to `color`.
    pub fn index_of(&self, color: Rgb) -> Option<usize> {
        self.colors.iter().position(|c| *c == color)
    }

    pub fn tier_of(&self, color: Rgb) -> Option<Tier> {
        self.index_of(color).map(|i| self.tier_at(i))
    }

    fn tier_at(&self, index: usize) -> Tier {
        if index < self.split {
            Tier::Unrestricted
        } else {
            Tier::Restricted
        }
    }

    pub fn info(&self, color: Rgb) -> Option<ColorInfo> {
        self.index_of(color).map(|index| self.info_at(index))
    }

    fn info_at(&self, index: usize) -> ColorInfo {
        let color = self.colors[index];
        ColorInfo {
            hex: color.to_hex(),
            rgb: color.channels(),
            tier: self.tier_at(index),
            index,
        }
    }

    pub fn describe(&self) -> PaletteDescription {
        PaletteDescription {
            unrestricted: (0..self.split).map(|i| self.info_at(i)).collect(),
            restricted: (self.split..self.len()).map(|i| self.info_at(i)).collect(),
        }
    }

    /// Nearest color to `target` within `subset`.
    ///
    /// Candidates are scanned in declared order and the incumbent is only
    /// replaced by a strictly closer color, so the first-declared color wins
    /// among equidistant matches.
    pub fn nearest(&self, target: Rgb, subset: Subset) -> Rgb {
        let candidates = self.subset(subset);
        let mut best = candidates[0];
        let mut best_distance = target.distance_sq(&best);
        for candidate in &candidates[1..] {
            let distance = target.distance_sq(candidate);
            if distance < best_distance {
                best = *candidate;
                best_distance = distance;
            }
        }
        best
    }

    /// Like [`Palette::nearest`] but accepts unclamped channel values.
    pub fn nearest_clamped(&self, channels: [i32; 3], subset: Subset) -> Rgb {
        self.nearest(Rgb::clamped(channels), subset)
    }
}

impl Default for Palette {
    fn default() -> Self {
        Self::standard()
    }
}
