use serde::{Deserialize, Serialize};

/// Six-bit display colour selector laid out as `0b00RRGGBB`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorCode(pub u8);

impl ColorCode {
    pub const RED: ColorCode = ColorCode(48);
    pub const WHITE: ColorCode = ColorCode(63);
    pub const MAX: u8 = 63;

    /// Each two-bit channel mapped onto `[0, 1]`.
    pub fn to_rgb(self) -> [f32; 3] {
        let channel = |shift: u8| ((self.0 >> shift) & 0x03) as f32 / 3.0;
        [channel(4), channel(2), channel(0)]
    }

    /// Nearest code for an RGB triple in `[0, 1]`.
    pub fn from_rgb(rgb: [f32; 3]) -> Self {
        let quantize = |v: f32| (v.clamp(0.0, 1.0) * 3.0).round() as u8;
        ColorCode((quantize(rgb[0]) << 4) | (quantize(rgb[1]) << 2) | quantize(rgb[2]))
    }
}

impl Default for ColorCode {
    fn default() -> Self {
        Self::WHITE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_channels() {
        assert_eq!(ColorCode::WHITE.to_rgb(), [1.0, 1.0, 1.0]);
        assert_eq!(ColorCode::RED.to_rgb(), [1.0, 0.0, 0.0]);
        let [r, g, b] = ColorCode(0b00_01_10_11).to_rgb();
        assert!((r - 1.0 / 3.0).abs() < 1e-6);
        assert!((g - 2.0 / 3.0).abs() < 1e-6);
        assert_eq!(b, 1.0);
    }

    #[test]
    fn quantizes_rgb() {
        assert_eq!(ColorCode::from_rgb([1.0, 0.0, 0.0]), ColorCode::RED);
        assert_eq!(ColorCode::from_rgb([0.9, 0.95, 2.0]), ColorCode::WHITE);
        assert_eq!(ColorCode::from_rgb([0.3, 0.0, 0.0]), ColorCode(0b01_00_00));
    }
}
