use image::{GrayImage, RgbImage};

use crate::PixelBox;

/// Binarize the aligned thermal channel against a heat threshold derived
/// from its own statistics: the channel mean scaled by the ratio of frame
/// area to non-zero pixel count (i.e. the mean over the warped thermal
/// content only, since the canvas border is zero-filled). Threshold-to-zero:
/// pixels at or below the threshold become 0, others keep their value.
pub fn heat_mask(aligned_thermal: &RgbImage) -> GrayImage {
    let (w, h) = aligned_thermal.dimensions();
    let total = (w as u64) * (h as u64);

    let mut sum: u64 = 0;
    let mut nonzero: u64 = 0;
    for px in aligned_thermal.pixels() {
        let v = px.0[0];
        sum += v as u64;
        if v != 0 {
            nonzero += 1;
        }
    }

    let mut mask = GrayImage::new(w, h);
    if nonzero == 0 {
        return mask;
    }
    let mean = sum as f64 / total as f64;
    let thresh = mean * (total as f64 / nonzero as f64);

    for (x, y, px) in mask.enumerate_pixels_mut() {
        let v = aligned_thermal.get_pixel(x, y).0[0];
        px.0[0] = if (v as f64) > thresh { v } else { 0 };
    }
    mask
}

/// Composite per-detection mask crops into the visible frame's red channel.
///
/// Each retained box's mask region is accumulated (saturating add) into a
/// shared overlay buffer first; the buffer is merged into the output frame
/// exactly once afterwards. Merging per detection instead would double-blend
/// wherever boxes overlap.
pub fn composite_mask(mask: &GrayImage, boxes: &[PixelBox], visible: &mut RgbImage) {
    if boxes.is_empty() {
        return;
    }
    let (w, h) = visible.dimensions();

    let mut overlay: Vec<u8> = Vec::with_capacity((w * h) as usize);
    for px in visible.pixels() {
        overlay.push(px.0[0]);
    }

    for b in boxes {
        let x0 = b.left.max(0) as u32;
        let y0 = b.top.max(0) as u32;
        let x1 = (b.right().max(0) as u32).min(w);
        let y1 = (b.bottom().max(0) as u32).min(h);
        for y in y0..y1 {
            for x in x0..x1 {
                let i = (y * w + x) as usize;
                overlay[i] = overlay[i].saturating_add(mask.get_pixel(x, y).0[0]);
            }
        }
    }

    for (i, px) in visible.pixels_mut().enumerate() {
        px.0[0] = overlay[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn mask_zeroes_cool_pixels_and_keeps_hot_values() {
        // Half the frame at 40, half at 200: content mean is 120, and the
        // whole frame is non-zero so the area ratio is 1.
        let mut thermal = RgbImage::from_pixel(10, 10, Rgb([40, 40, 40]));
        for y in 0..10 {
            for x in 0..5 {
                thermal.put_pixel(x, y, Rgb([200, 200, 200]));
            }
        }
        let mask = heat_mask(&thermal);
        assert_eq!(mask.get_pixel(0, 0).0[0], 200);
        assert_eq!(mask.get_pixel(9, 9).0[0], 0);
    }

    #[test]
    fn zero_border_raises_the_threshold() {
        // 200-valued content on a mostly zero canvas: threshold becomes the
        // mean over non-zero pixels (200), so nothing survives tozero.
        let mut thermal = RgbImage::new(10, 10);
        thermal.put_pixel(0, 0, Rgb([200, 0, 0]));
        thermal.put_pixel(1, 0, Rgb([200, 0, 0]));
        let mask = heat_mask(&thermal);
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn all_zero_channel_yields_empty_mask() {
        let mask = heat_mask(&RgbImage::new(8, 8));
        assert!(mask.pixels().all(|p| p.0[0] == 0));
    }

    #[test]
    fn overlapping_boxes_accumulate_before_the_single_merge() {
        let mut mask = GrayImage::new(10, 10);
        for px in mask.pixels_mut() {
            px.0[0] = 100;
        }
        let mut visible = RgbImage::from_pixel(10, 10, Rgb([10, 20, 30]));
        let a = PixelBox { left: 0, top: 0, width: 6, height: 6 };
        let b = PixelBox { left: 4, top: 4, width: 6, height: 6 };
        composite_mask(&mask, &[a, b], &mut visible);

        // Covered by one box: 10 + 100.
        assert_eq!(visible.get_pixel(1, 1).0, [110, 20, 30]);
        // Covered by both: 10 + 100 + 100.
        assert_eq!(visible.get_pixel(5, 5).0, [210, 20, 30]);
        // Covered by none: untouched.
        assert_eq!(visible.get_pixel(9, 0).0, [10, 20, 30]);
    }

    #[test]
    fn no_boxes_means_no_writes() {
        let mask = GrayImage::from_pixel(4, 4, image::Luma([255]));
        let mut visible = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let before = visible.clone();
        composite_mask(&mask, &[], &mut visible);
        assert_eq!(before.as_raw(), visible.as_raw());
    }
}
