//! HSV color math for the show modes.

/// Convert HSV to an RGB triple.
///
/// `h` is the hue position in `[0, 1)` and wraps; `s` and `v` are in
/// `[0, 1]`. Zero saturation yields an achromatic gray.
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let h = h.rem_euclid(1.0);
    if s <= 0.0 {
        let gray = (v * 255.0).round() as u8;
        return (gray, gray, gray);
    }

    let sector = (h * 6.0) as u32 % 6;
    let f = h * 6.0 - (h * 6.0).floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));

    let (r, g, b) = match sector {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };

    (
        (r * 255.0).round() as u8,
        (g * 255.0).round() as u8,
        (b * 255.0).round() as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_sectors() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), (255, 0, 0));
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), (0, 255, 0));
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), (0, 0, 255));
    }

    #[test]
    fn zero_saturation_is_achromatic() {
        assert_eq!(hsv_to_rgb(0.37, 0.0, 1.0), (255, 255, 255));
        assert_eq!(hsv_to_rgb(0.9, 0.0, 0.5), (128, 128, 128));
    }

    #[test]
    fn hue_wraps_around() {
        assert_eq!(hsv_to_rgb(1.25, 0.8, 1.0), hsv_to_rgb(0.25, 0.8, 1.0));
        assert_eq!(hsv_to_rgb(-0.75, 0.8, 1.0), hsv_to_rgb(0.25, 0.8, 1.0));
    }

    #[test]
    fn conversion_is_pure() {
        let a = hsv_to_rgb(0.61, 0.7, 0.9);
        let b = hsv_to_rgb(0.61, 0.7, 0.9);
        assert_eq!(a, b);
    }

    #[test]
    fn value_scales_brightness() {
        let (r, g, b) = hsv_to_rgb(0.0, 1.0, 0.5);
        assert_eq!((r, g, b), (128, 0, 0));
    }
}
