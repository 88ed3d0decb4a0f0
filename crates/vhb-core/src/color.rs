#![forbid(unsafe_code)]

//! Packed RGBA colors.

use serde::{Deserialize, Serialize};

/// A color packed as `0xRRGGBBAA`.
///
/// This is the wire form the host receives: a single unsigned integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Self = Self(0x0000_0000);
    pub const BLACK: Self = Self(0x0000_00FF);
    pub const WHITE: Self = Self(0xFFFF_FFFF);

    /// Pack individual channels.
    #[inline]
    pub const fn from_rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self(((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | a as u32)
    }

    /// Unpack into `(r, g, b, a)`.
    #[inline]
    pub const fn rgba(self) -> (u8, u8, u8, u8) {
        (
            (self.0 >> 24) as u8,
            (self.0 >> 16) as u8,
            (self.0 >> 8) as u8,
            self.0 as u8,
        )
    }

    #[inline]
    pub const fn alpha(self) -> u8 {
        self.0 as u8
    }

    /// Packed integer form.
    #[inline]
    pub const fn packed(self) -> u32 {
        self.0
    }

    /// Parse `#RGB`, `#RRGGBB` or `#RRGGBBAA`.
    pub fn parse_hex(text: &str) -> Option<Self> {
        let hex = text.strip_prefix('#')?;
        let nibble = |c: u8| -> Option<u8> { (c as char).to_digit(16).map(|d| d as u8) };
        let bytes = hex.as_bytes();
        match bytes.len() {
            3 => {
                let r = nibble(bytes[0])?;
                let g = nibble(bytes[1])?;
                let b = nibble(bytes[2])?;
                Some(Self::from_rgba(r * 17, g * 17, b * 17, 0xFF))
            }
            6 | 8 => {
                let mut channels = [0xFFu8; 4];
                for (i, pair) in bytes.chunks(2).enumerate() {
                    channels[i] = nibble(pair[0])? * 16 + nibble(pair[1])?;
                }
                Some(Self::from_rgba(
                    channels[0],
                    channels[1],
                    channels[2],
                    channels[3],
                ))
            }
            _ => None,
        }
    }
}

impl From<u32> for Color {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_and_unpack() {
        let c = Color::from_rgba(0x12, 0x34, 0x56, 0x78);
        assert_eq!(c.packed(), 0x1234_5678);
        assert_eq!(c.rgba(), (0x12, 0x34, 0x56, 0x78));
        assert_eq!(c.alpha(), 0x78);
    }

    #[test]
    fn parse_hex_forms() {
        assert_eq!(Color::parse_hex("#fff"), Some(Color::WHITE));
        assert_eq!(Color::parse_hex("#000000"), Some(Color::BLACK));
        assert_eq!(Color::parse_hex("#11223344"), Some(Color(0x1122_3344)));
        assert_eq!(Color::parse_hex("123456"), None);
        assert_eq!(Color::parse_hex("#12345"), None);
        assert_eq!(Color::parse_hex("#zzzzzz"), None);
    }
}
