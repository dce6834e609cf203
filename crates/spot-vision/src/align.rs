use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Deserialize;

/// Fixed affine calibration mapping thermal pixel space into visible pixel
/// space. The two sensors sit at a fixed mechanical offset, so this is a
/// per-device constant measured once, not a per-frame registration.
/// Rotation and shear are zero for the supported hardware.
///
/// Known limitation: a translation-only calibration cannot compensate for
/// parallax when the scene distance changes substantially.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Calibration {
    /// Thermal content covers this fraction of the visible field of view.
    pub scale: f32,
    /// Placement offset of the scaled thermal image, in visible pixels.
    pub dx: i64,
    pub dy: i64,
}

impl Default for Calibration {
    /// Reference calibration for the shipped dual-sensor module.
    fn default() -> Self {
        Self { scale: 0.81, dx: 120, dy: 185 }
    }
}

/// Warp the thermal frame into the visible frame's coordinate system:
/// resize by the calibration scale, then place at the calibration offset on
/// a zero-filled canvas of the visible frame's size.
pub fn align_thermal(thermal: &RgbImage, cal: &Calibration, out_w: u32, out_h: u32) -> RgbImage {
    let scaled_w = ((out_w as f32 * cal.scale) as u32).max(1);
    let scaled_h = ((out_h as f32 * cal.scale) as u32).max(1);
    let scaled = imageops::resize(thermal, scaled_w, scaled_h, FilterType::Triangle);

    let mut canvas = RgbImage::new(out_w, out_h);
    imageops::replace(&mut canvas, &scaled, cal.dx, cal.dy);
    canvas
}
