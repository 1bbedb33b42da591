use std::fmt;

/// A 24-bit `0xRRGGBB` colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rgb(u32);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0x000000);
    pub const WHITE: Rgb = Rgb(0xFFFFFF);
    /// Stand-in for white: the board treats pure white as unpainted.
    pub const PLACEHOLDER: Rgb = Rgb(0xAAAAAA);

    pub const fn new(value: u32) -> Self {
        Rgb(value & 0xFF_FFFF)
    }

    pub const fn from_channels(r: u8, g: u8, b: u8) -> Self {
        Rgb(((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }

    pub const fn value(self) -> u32 {
        self.0
    }

    pub const fn channels(self) -> (u8, u8, u8) {
        ((self.0 >> 16) as u8, (self.0 >> 8) as u8, self.0 as u8)
    }

    /// The colour that is actually compared against and sent to the board.
    pub fn paintable(self) -> Self {
        if self == Rgb::WHITE {
            Rgb::PLACEHOLDER
        } else {
            self
        }
    }

    pub fn to_hex(self) -> String {
        format!("{:06x}", self.0)
    }

    /// Decodes exactly six hex digits.
    pub fn from_hex(raw: &[u8]) -> Option<Self> {
        if raw.len() != 6 {
            return None;
        }
        let mut value = 0u32;
        for byte in raw {
            let digit = (*byte as char).to_digit(16)?;
            value = (value << 4) | digit;
        }
        Some(Rgb(value))
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#08X}", self.0)
    }
}
