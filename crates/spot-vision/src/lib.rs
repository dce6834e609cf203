pub mod align;
pub mod doctor;
pub mod fuse;
pub mod nms;
pub mod segment;
pub mod state;
#[cfg(feature = "vision-tflite")]
pub mod tflite;

use anyhow::Result;
use image::RgbImage;
use serde::{Deserialize, Serialize};

/// One pair of raw sensor frames as delivered by the camera collaborator.
/// Consumed synchronously by the pipeline; never retained across frames.
#[derive(Debug, Clone)]
pub struct FramePair {
    pub visible: RgbImage,
    pub thermal: RgbImage,
    pub ts_unix_ms: i64,
}

/// Axis-aligned box in visible-frame pixel coordinates, post-clamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
}

impl PixelBox {
    pub fn right(&self) -> i32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height
    }

    /// Larger of the two side lengths, used to scale decorative overlays.
    pub fn larger_dim(&self) -> i32 {
        self.width.max(self.height)
    }
}

/// Raw detector output before suppression.
#[derive(Debug, Clone, Copy)]
pub struct CandidateDetection {
    pub class_id: usize,
    pub conf: f32,
    pub box_px: PixelBox,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Off,
    On,
}

/// Final per-frame output: a retained candidate with its power state.
/// `class_id` is in the flat label space: "on" classes sit one
/// `num_base_classes` offset above their "off" counterparts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub conf: f32,
    pub box_px: PixelBox,
    pub state: DeviceState,
}

/// Active detector weight set. Both variants share one architecture and one
/// decode path; LowLight is trained on near-black imagery for use when the
/// visible sensor has nothing to offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelVariant {
    Regular,
    LowLight,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VisionConfig {
    pub model_path_regular: String,
    pub model_path_lowlight: String,
    pub state_model_path: String,

    /// Detector input resolution (square, 416 for the shipped models).
    pub input_w: u32,
    pub input_h: u32,

    /// Base device classes; the on/off label space is twice this long.
    pub num_base_classes: usize,
    pub class_names: Vec<String>,

    pub nms_iou_threshold: f32,

    /// State-classifier thermal patch resolution.
    pub state_patch_w: u32,
    pub state_patch_h: u32,
}

/// Seam between the pipeline and the loaded networks, so the pipeline can be
/// exercised without the TFLite runtime.
pub trait DeviceNets: Send {
    /// Forward the fused frame through the active detector variant and
    /// decode both output heads into pixel-space candidates.
    fn detect(&mut self, fused: &RgbImage, conf_threshold: f32) -> Result<Vec<CandidateDetection>>;

    /// Power-state probability for one detection, from its one-hot class
    /// label and normalized thermal patch.
    fn state_prob(&mut self, one_hot: &[f32], patch: &[f32]) -> Result<f32>;

    fn set_variant(&mut self, variant: ModelVariant);
    fn variant(&self) -> ModelVariant;
}

/// Decode one detector output head.
///
/// Row layout is `[cx, cy, w, h, obj, cls0..clsN]`, all normalized to the
/// network input. Confidence is the max class score; the objectness column
/// is not folded in (the shipped weights were calibrated that way). Boxes
/// are decoded into visible-frame pixels and clamped. Note the width clamp
/// uses the height bound; the trained models expect this exact chain.
pub fn decode_head(
    raw: &[f32],
    num_preds: usize,
    num_classes: usize,
    conf_threshold: f32,
    frame_w: u32,
    frame_h: u32,
) -> Vec<CandidateDetection> {
    let stride = 5 + num_classes;
    let max_w = frame_w as i32;
    let max_h = frame_h as i32;
    let mut out = Vec::new();

    for i in 0..num_preds {
        let base = i * stride;
        if base + stride > raw.len() {
            break;
        }

        let mut best_c = 0usize;
        let mut best_p = 0.0f32;
        for c in 0..num_classes {
            let p = raw[base + 5 + c];
            if p > best_p {
                best_p = p;
                best_c = c;
            }
        }
        if best_p <= conf_threshold {
            continue;
        }

        let center_x = (raw[base] * frame_w as f32) as i32;
        let center_y = (raw[base + 1] * frame_h as f32) as i32;
        let mut width = (raw[base + 2] * frame_w as f32) as i32;
        let mut height = (raw[base + 3] * frame_h as f32) as i32;
        let mut left = center_x - width / 2;
        let mut top = center_y - height / 2;

        left = left.clamp(0, max_w);
        top = top.clamp(0, max_h);
        width = width.clamp(0, max_h); // width shares the height bound
        height = height.clamp(0, max_h);
        width = width.min(max_w - left);
        height = height.min(max_h - top);

        // Zero-area boxes would produce empty crops downstream.
        if width <= 0 || height <= 0 {
            continue;
        }

        out.push(CandidateDetection {
            class_id: best_c,
            conf: best_p,
            box_px: PixelBox { left, top, width, height },
        });
    }
    out
}
