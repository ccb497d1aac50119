// Packed 8-bit colors

/// 8-bit RGBA color. Packs with red in the most significant byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const WHITE: Self = Self::new(255, 255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::new(r, g, b, 255)
    }

    /// From normalized components; values are clamped to [0, 1].
    pub fn from_f32(rgba: [f32; 4]) -> Self {
        let q = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self::new(q(rgba[0]), q(rgba[1]), q(rgba[2]), q(rgba[3]))
    }

    pub const fn packed(self) -> u32 {
        pack_rgba(self.r, self.g, self.b, self.a)
    }
}

impl Default for Rgba8 {
    fn default() -> Self {
        Self::WHITE
    }
}

/// `(r << 24) | (g << 16) | (b << 8) | a`, as the shaders unpack it.
pub const fn pack_rgba(r: u8, g: u8, b: u8, a: u8) -> u32 {
    ((r as u32) << 24) | ((g as u32) << 16) | ((b as u32) << 8) | a as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_occupies_the_high_byte() {
        assert_eq!(pack_rgba(0x11, 0x22, 0x33, 0x44), 0x1122_3344);
        assert_eq!(Rgba8::rgb(255, 0, 0).packed(), 0xFF00_00FF);
    }

    #[test]
    fn float_colors_are_clamped_and_rounded() {
        assert_eq!(Rgba8::from_f32([1.5, 0.5, -1.0, 1.0]), Rgba8::new(255, 128, 0, 255));
    }
}
