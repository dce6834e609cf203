use anyhow::Result;
use image::RgbImage;

/// Training-time channel mixing constants. These are baked into the detector
/// weights; changing the ratio silently degrades accuracy rather than
/// failing loudly.
const MIX_R: f32 = 0.33;
const MIX_GB: f32 = 0.66;

/// Build the detector input. Channel 0 is the Rec.601 grayscale of the
/// aligned thermal frame; channels 1 and 2 are fixed linear blends of the
/// visible R/G and R/B channels.
pub fn fuse(aligned_thermal: &RgbImage, visible: &RgbImage) -> Result<RgbImage> {
    anyhow::ensure!(
        aligned_thermal.dimensions() == visible.dimensions(),
        "fuse: thermal {:?} != visible {:?}",
        aligned_thermal.dimensions(),
        visible.dimensions()
    );

    let (w, h) = visible.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, px) in out.enumerate_pixels_mut() {
        let t = aligned_thermal.get_pixel(x, y).0;
        let v = visible.get_pixel(x, y).0;

        let gray = 0.299 * t[0] as f32 + 0.587 * t[1] as f32 + 0.114 * t[2] as f32;
        let rg = MIX_R * v[0] as f32 + MIX_GB * v[1] as f32;
        let rb = MIX_R * v[0] as f32 + MIX_GB * v[2] as f32;

        px.0 = [quantize(gray), quantize(rg), quantize(rb)];
    }
    Ok(out)
}

fn quantize(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}
