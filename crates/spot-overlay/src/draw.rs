use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use spot_vision::PixelBox;

const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const BOX_THICKNESS: i32 = 4;

const PANEL_W: i32 = 200;
const PANEL_H: i32 = 400;
const PANEL_GRAY: u8 = 150;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const TEXT_SCALE: f32 = 28.0;

/// Bounding rectangle layer: red, 4 px, grown outward from the box so the
/// box interior stays unobscured. Out-of-frame bands clip.
pub fn draw_box(frame: &mut RgbImage, b: &PixelBox) {
    for i in 0..BOX_THICKNESS {
        let rect = Rect::at(b.left - i, b.top - i)
            .of_size((b.width + 2 * i) as u32, (b.height + 2 * i) as u32);
        draw_hollow_rect_mut(frame, rect, BOX_COLOR);
    }
}

/// Label panel layer: a 200x400 semi-transparent gray panel anchored above
/// the detection, centered on its midline, with the device name and what it
/// is able to track.
pub fn draw_label_panel(
    frame: &mut RgbImage,
    b: &PixelBox,
    display_name: &str,
    mic_only: bool,
    font: Option<&FontVec>,
) {
    let cx = (b.left + b.right()) / 2;
    let px0 = cx - PANEL_W / 2;
    let py0 = b.top - PANEL_H;
    blend_gray_panel(frame, px0, py0, PANEL_W, PANEL_H);

    let Some(font) = font else { return };
    let scale = PxScale::from(TEXT_SCALE);
    let mut line = |text: &str, x: i32, dy: i32| {
        draw_text_mut(frame, TEXT_COLOR, x, py0 + dy, scale, font, text);
    };
    line("Device:", px0, 50);
    line(display_name, px0, 100);
    line("Tracking:", px0, 200);
    line("Microphone", px0, 250);
    if !mic_only {
        line("& Camera", px0, 300);
    }
    line("V", cx, 380);
}

/// Halo layer (decorative icon A): the icon scaled to 1.3x the box's larger
/// dimension, blended at half weight slightly above and left of the box.
pub fn draw_halo(frame: &mut RgbImage, b: &PixelBox, icon: &RgbImage) {
    let dim = (b.larger_dim() as f32 * 1.3).max(1.0);
    let scaled = imageops::resize(icon, dim as u32, dim as u32, FilterType::Triangle);
    let x0 = b.left as f32 - dim * 0.1;
    let y0 = b.top as f32 - dim * 0.25;
    blend_add(frame, &scaled, x0 as i64, y0 as i64, 0.5);
}

/// Badge layer (decorative icon B): mic or mic+camera glyph at 0.3x the
/// box's larger dimension, added at full weight inside the box's top-left
/// region.
pub fn draw_badge(frame: &mut RgbImage, b: &PixelBox, icon: &RgbImage) {
    let dim = (b.larger_dim() as f32 * 0.3).max(1.0);
    let scaled = imageops::resize(icon, dim as u32, dim as u32, FilterType::Triangle);
    let x0 = b.left as f32 + dim * 1.2;
    let y0 = b.top as f32 + dim * 0.8;
    blend_add(frame, &scaled, x0 as i64, y0 as i64, 1.0);
}

/// 50/50 blend of a flat gray panel into the frame, clipped to the frame.
fn blend_gray_panel(frame: &mut RgbImage, x0: i32, y0: i32, w: i32, h: i32) {
    let (fw, fh) = frame.dimensions();
    let xa = x0.max(0);
    let ya = y0.max(0);
    let xb = (x0 + w).clamp(0, fw as i32);
    let yb = (y0 + h).clamp(0, fh as i32);
    for y in ya..yb {
        for x in xa..xb {
            let px = frame.get_pixel_mut(x as u32, y as u32);
            for c in &mut px.0 {
                *c = ((*c as u16 + PANEL_GRAY as u16) / 2) as u8;
            }
        }
    }
}

/// Weighted additive paste: `frame += weight * icon` with saturation,
/// clipped to the frame. Matches compositing via a zero-filled warp canvas.
fn blend_add(frame: &mut RgbImage, icon: &RgbImage, x0: i64, y0: i64, weight: f32) {
    let (fw, fh) = frame.dimensions();
    for (ix, iy, ip) in icon.enumerate_pixels() {
        let x = x0 + ix as i64;
        let y = y0 + iy as i64;
        if x < 0 || y < 0 || x >= fw as i64 || y >= fh as i64 {
            continue;
        }
        let px = frame.get_pixel_mut(x as u32, y as u32);
        for c in 0..3 {
            let add = (ip.0[c] as f32 * weight).round() as u16;
            px.0[c] = (px.0[c] as u16 + add).min(255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(w: u32, h: u32) -> RgbImage {
        RgbImage::new(w, h)
    }

    #[test]
    fn box_layer_paints_red_border() {
        let mut f = frame(200, 200);
        let b = PixelBox { left: 50, top: 50, width: 80, height: 80 };
        draw_box(&mut f, &b);
        assert_eq!(f.get_pixel(50, 50), &BOX_COLOR);
        assert_eq!(f.get_pixel(47, 47), &BOX_COLOR);
        // Interior untouched.
        assert_eq!(f.get_pixel(90, 90), &Rgb([0, 0, 0]));
    }

    #[test]
    fn box_layer_clips_at_frame_edges() {
        let mut f = frame(100, 100);
        let b = PixelBox { left: 0, top: 0, width: 100, height: 100 };
        draw_box(&mut f, &b); // must not panic
        assert_eq!(f.get_pixel(0, 0), &BOX_COLOR);
    }

    #[test]
    fn panel_blends_toward_gray() {
        let mut f = frame(400, 600);
        let b = PixelBox { left: 100, top: 500, width: 200, height: 80 };
        draw_label_panel(&mut f, &b, "Speaker On", true, None);
        // Panel spans x 100..300, y 100..500 on a black frame: 50/50 with
        // gray 150 gives 75.
        assert_eq!(f.get_pixel(200, 300).0, [75, 75, 75]);
        assert_eq!(f.get_pixel(50, 300).0, [0, 0, 0]);
    }

    #[test]
    fn panel_above_top_edge_clips() {
        let mut f = frame(400, 300);
        let b = PixelBox { left: 100, top: 50, width: 200, height: 80 };
        draw_label_panel(&mut f, &b, "Mobile Off", false, None);
        assert_eq!(f.get_pixel(200, 20).0, [75, 75, 75]);
    }

    #[test]
    fn additive_blend_saturates() {
        let mut f = RgbImage::from_pixel(10, 10, Rgb([200, 200, 200]));
        let icon = RgbImage::from_pixel(4, 4, Rgb([200, 200, 200]));
        blend_add(&mut f, &icon, 0, 0, 1.0);
        assert_eq!(f.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(f.get_pixel(5, 5).0, [200, 200, 200]);
    }

    #[test]
    fn halo_lands_at_fractional_anchor() {
        let mut f = frame(400, 400);
        let icon = RgbImage::from_pixel(8, 8, Rgb([100, 100, 100]));
        let b = PixelBox { left: 100, top: 100, width: 100, height: 100 };
        draw_halo(&mut f, &b, &icon);
        // dim = 130, anchor = (100 - 13, 100 - 32.5) -> (87, 67).
        assert_eq!(f.get_pixel(87, 68).0, [50, 50, 50]);
        assert_eq!(f.get_pixel(86, 68).0, [0, 0, 0]);
        // Half weight of a flat 100 icon.
        assert_eq!(f.get_pixel(150, 150).0, [50, 50, 50]);
    }

    #[test]
    fn badge_offsets_into_the_box() {
        let mut f = frame(400, 400);
        let icon = RgbImage::from_pixel(8, 8, Rgb([40, 40, 40]));
        let b = PixelBox { left: 100, top: 100, width: 100, height: 100 };
        draw_badge(&mut f, &b, &icon);
        // dim = 30, anchor = (100 + 36, 100 + 24).
        assert_eq!(f.get_pixel(136, 124).0, [40, 40, 40]);
        assert_eq!(f.get_pixel(135, 124).0, [0, 0, 0]);
    }
}
