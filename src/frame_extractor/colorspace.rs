//! RGB → CIE L*u*v* (8-bit encoding, D65 white point)
//!
//! Output channels are scaled the same way common vision libraries store
//! 8-bit Luv: `L * 255/100`, `(u + 134) * 255/354`, `(v + 140) * 255/262`.

use once_cell::sync::Lazy;

const REF_U: f32 = 0.197_939_43;
const REF_V: f32 = 0.468_310_96;

/// sRGB 8 位值 → 线性光
static SRGB_TO_LINEAR: Lazy<[f32; 256]> = Lazy::new(|| {
    let mut table = [0f32; 256];
    for (i, slot) in table.iter_mut().enumerate() {
        let v = i as f32 / 255.0;
        *slot = if v <= 0.04045 {
            v / 12.92
        } else {
            ((v + 0.055) / 1.055).powf(2.4)
        };
    }
    table
});

pub fn rgb_pixel_to_luv(r: u8, g: u8, b: u8) -> [u8; 3] {
    let lut = &*SRGB_TO_LINEAR;
    let (r, g, b) = (lut[r as usize], lut[g as usize], lut[b as usize]);

    let x = 0.412_453 * r + 0.357_580 * g + 0.180_423 * b;
    let y = 0.212_671 * r + 0.715_160 * g + 0.072_169 * b;
    let z = 0.019_334 * r + 0.119_193 * g + 0.950_227 * b;

    let l = if y > 0.008_856 {
        116.0 * y.cbrt() - 16.0
    } else {
        903.3 * y
    };

    let denom = x + 15.0 * y + 3.0 * z;
    let (u, v) = if denom > f32::EPSILON {
        let up = 4.0 * x / denom;
        let vp = 9.0 * y / denom;
        (13.0 * l * (up - REF_U), 13.0 * l * (vp - REF_V))
    } else {
        (0.0, 0.0)
    };

    [
        to_u8(l * 255.0 / 100.0),
        to_u8((u + 134.0) * 255.0 / 354.0),
        to_u8((v + 140.0) * 255.0 / 262.0),
    ]
}

/// 整帧转换，输入为紧凑 RGB
pub fn rgb_to_luv(rgb: &[u8]) -> Vec<u8> {
    let mut luv = Vec::with_capacity(rgb.len());
    for px in rgb.chunks_exact(3) {
        luv.extend_from_slice(&rgb_pixel_to_luv(px[0], px[1], px[2]));
    }
    luv
}

/// Σ|a - b| over every channel value. Buffers must be the same length.
pub fn abs_diff_sum(a: &[u8], b: &[u8]) -> u64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| x.abs_diff(y) as u64)
        .sum()
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_and_white() {
        assert_eq!(rgb_pixel_to_luv(0, 0, 0), [0, 97, 136]);

        let white = rgb_pixel_to_luv(255, 255, 255);
        assert_eq!(white[0], 255);
        // D65 white is achromatic
        assert!((white[1] as i32 - 97).abs() <= 1);
        assert!((white[2] as i32 - 136).abs() <= 1);
    }

    #[test]
    fn test_lightness_is_monotonic_in_gray() {
        let mut last = 0u8;
        for g in (0..=255u8).step_by(15) {
            let l = rgb_pixel_to_luv(g, g, g)[0];
            assert!(l >= last);
            last = l;
        }
    }

    #[test]
    fn test_red_has_positive_u() {
        let red = rgb_pixel_to_luv(255, 0, 0);
        assert!(red[1] > 200);
    }

    #[test]
    fn test_abs_diff_sum() {
        assert_eq!(abs_diff_sum(&[0, 10, 255], &[5, 0, 250]), 20);
        assert_eq!(abs_diff_sum(&[1, 2, 3], &[1, 2, 3]), 0);
    }

    #[test]
    fn test_frame_conversion_preserves_length() {
        let rgb = vec![12u8; 7 * 3];
        assert_eq!(rgb_to_luv(&rgb).len(), rgb.len());
    }
}
