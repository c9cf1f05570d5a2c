//! Report colours, as RGB bytes and as PDF fill fractions.

pub type Rgb = [u8; 3];

pub const NAVY: Rgb = [0x1E, 0x3A, 0x5F];
pub const BLUE: Rgb = [0x25, 0x63, 0xEB];
pub const PURPLE: Rgb = [0x7C, 0x3A, 0xED];
pub const TEXT: Rgb = [0x1F, 0x29, 0x37];
pub const MUTED: Rgb = [0x6B, 0x72, 0x80];
pub const BORDER: Rgb = [0xE2, 0xE8, 0xF0];
pub const ROW_ALT: Rgb = [0xF8, 0xFA, 0xFC];
pub const CODE_BG: Rgb = [0xF1, 0xF5, 0xF9];
pub const WHITE: Rgb = [0xFF, 0xFF, 0xFF];
pub const BAR: Rgb = [0x93, 0xB4, 0xE0];

/// `RRGGBB` for office formats.
pub fn hex(color: Rgb) -> String {
    format!("{:02X}{:02X}{:02X}", color[0], color[1], color[2])
}

/// Components in 0..=1 for PDF colour operators.
pub fn fractions(color: Rgb) -> [f32; 3] {
    [
        color[0] as f32 / 255.0,
        color[1] as f32 / 255.0,
        color[2] as f32 / 255.0,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex() {
        assert_eq!(hex(NAVY), "1E3A5F");
        assert_eq!(hex(ROW_ALT), "F8FAFC");
    }
}
