// THEORY (single-pixel colorimetry):
// The cost provider classifies plant pixels by how green they are, measured
// on the CIE Lab a* axis (negative = green, positive = magenta). Everything in
// this module is a function of one pixel alone; neighbourhood operations such
// as gradients live in `costs`.
//
// The sRGB → linear conversion uses a 256-entry `OnceLock` LUT so the hot path
// is a table lookup instead of a `powf` per channel.

pub mod color {
    use std::sync::OnceLock;

    /// sRGB D65 → XYZ, rows X, Y, Z.
    const RGB_TO_XYZ: [[f32; 3]; 3] = [
        [0.412453, 0.357580, 0.180423],
        [0.212671, 0.715160, 0.072169],
        [0.019334, 0.119193, 0.950227],
    ];
    /// D65 reference white.
    const WHITE_X: f32 = 0.95047;
    const WHITE_Y: f32 = 1.0;

    static SRGB_TO_LINEAR_LUT: OnceLock<[f32; 256]> = OnceLock::new();

    fn srgb_to_linear_lut() -> &'static [f32; 256] {
        SRGB_TO_LINEAR_LUT.get_or_init(|| {
            let mut lut = [0.0f32; 256];
            for (i, v) in lut.iter_mut().enumerate() {
                let c = i as f32 / 255.0;
                *v = if c > 0.04045 {
                    ((c + 0.055) / 1.055).powf(2.4)
                } else {
                    c / 12.92
                };
            }
            lut
        })
    }

    #[inline]
    fn lab_f(t: f32) -> f32 {
        if t > 0.008856 {
            t.cbrt()
        } else {
            7.787 * t + 16.0 / 116.0
        }
    }

    /// The CIE Lab a* (green–magenta) coordinate of an 8-bit sRGB pixel.
    pub fn lab_a(rgb: [u8; 3]) -> f32 {
        let lut = srgb_to_linear_lut();
        let lin = [lut[rgb[0] as usize], lut[rgb[1] as usize], lut[rgb[2] as usize]];
        let x = RGB_TO_XYZ[0][0] * lin[0] + RGB_TO_XYZ[0][1] * lin[1] + RGB_TO_XYZ[0][2] * lin[2];
        let y = RGB_TO_XYZ[1][0] * lin[0] + RGB_TO_XYZ[1][1] * lin[1] + RGB_TO_XYZ[1][2] * lin[2];
        500.0 * (lab_f(x / WHITE_X) - lab_f(y / WHITE_Y))
    }

    /// Unweighted mean of the three channels, as used for gradient estimation.
    pub fn grey(rgb: [u8; 3]) -> f32 {
        (rgb[0] as f32 + rgb[1] as f32 + rgb[2] as f32) / 3.0
    }
}
