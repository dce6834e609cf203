use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::{DeviceState, PixelBox};

/// One-hot class label fed to the state classifier alongside the thermal
/// patch.
pub fn one_hot(class_id: usize, num_classes: usize) -> Vec<f32> {
    let mut v = vec![0.0; num_classes];
    if class_id < num_classes {
        v[class_id] = 1.0;
    }
    v
}

/// Crop the detection box out of the aligned thermal frame, resize it to the
/// classifier's patch resolution, and flatten it to a single [0,1] intensity
/// channel by averaging the three stored channels. Row-major, length
/// `patch_w * patch_h`.
pub fn thermal_patch(
    aligned_thermal: &RgbImage,
    box_px: PixelBox,
    patch_w: u32,
    patch_h: u32,
) -> Result<Vec<f32>> {
    anyhow::ensure!(
        box_px.left >= 0 && box_px.top >= 0 && box_px.width > 0 && box_px.height > 0,
        "state patch: degenerate box {:?}",
        box_px
    );
    let (w, h) = aligned_thermal.dimensions();
    anyhow::ensure!(
        box_px.right() as u32 <= w && box_px.bottom() as u32 <= h,
        "state patch: box {:?} outside {}x{} frame",
        box_px,
        w,
        h
    );

    let crop = imageops::crop_imm(
        aligned_thermal,
        box_px.left as u32,
        box_px.top as u32,
        box_px.width as u32,
        box_px.height as u32,
    )
    .to_image();
    let resized = imageops::resize(&crop, patch_w, patch_h, FilterType::Triangle);

    let mut out = Vec::with_capacity((patch_w * patch_h) as usize);
    for px in resized.pixels() {
        let mean = (px.0[0] as f32 + px.0[1] as f32 + px.0[2] as f32) / 3.0;
        out.push(mean / 255.0);
    }
    Ok(out)
}

/// Fold the classifier probability into the flat label space: `On` classes
/// sit one `num_base_classes` offset above their `Off` counterparts.
/// Exactly 0.5 maps to `Off`.
pub fn apply_state(base_class: usize, prob: f32, num_base_classes: usize) -> (usize, DeviceState) {
    if prob > 0.5 {
        (base_class + num_base_classes, DeviceState::On)
    } else {
        (base_class, DeviceState::Off)
    }
}
