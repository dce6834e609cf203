pub mod relay;

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::RgbImage;
use tracing::warn;

use spot_overlay::{draw, is_mic_only, label_table, OverlayAssets, OverlayConfig};
use spot_vision::{
    align::{align_thermal, Calibration},
    fuse::fuse,
    nms, segment, state, Detection, DeviceNets, FramePair, ModelVariant, VisionConfig,
};

/// Debug thermal view resolution.
const DEBUG_THERMAL_W: u32 = 480;
const DEBUG_THERMAL_H: u32 = 640;

/// The pipeline's per-frame output, owned by the relay until the display
/// consumer drains it.
pub struct AnnotatedFramePair {
    pub visible_out: RgbImage,
    pub thermal_out: RgbImage,
    pub detections: Vec<Detection>,
    pub ts_unix_ms: i64,
}

/// The whole per-frame sequence: align, fuse, detect, suppress, classify
/// state, composite the heat mask, draw overlays. One configurable pipeline;
/// a plain synchronous method with no thread affinity, so the caller decides
/// the execution context.
pub struct FramePipeline {
    calibration: Calibration,
    vision: VisionConfig,
    nets: Option<Box<dyn DeviceNets>>,
    assets: OverlayAssets,
    labels: Vec<String>,
}

impl FramePipeline {
    /// `nets: None` puts the whole session in inference-disabled mode:
    /// frames are still aligned, fused and relayed, with no detections.
    pub fn new(
        calibration: Calibration,
        vision: VisionConfig,
        nets: Option<Box<dyn DeviceNets>>,
        assets: OverlayAssets,
    ) -> Self {
        if nets.is_none() {
            warn!("pipeline: no networks loaded, running with inference disabled");
        }
        let labels = label_table(&vision.class_names);
        Self { calibration, vision, nets, assets, labels }
    }

    /// Select the active detector weight set. Takes effect on the next
    /// frame; never called mid-frame.
    pub fn set_variant(&mut self, variant: ModelVariant) {
        if let Some(nets) = self.nets.as_mut() {
            nets.set_variant(variant);
        }
    }

    pub fn variant(&self) -> Option<ModelVariant> {
        self.nets.as_deref().map(|n| n.variant())
    }

    /// Process one frame pair. `view` is this frame's immutable snapshot of
    /// the UI toggles. Never fails: any error inside the frame is logged and
    /// the frame is relayed unannotated, so a bad frame cannot stall the
    /// frame-arrival context.
    pub fn process(&mut self, pair: FramePair, view: &OverlayConfig) -> AnnotatedFramePair {
        let (vw, vh) = pair.visible.dimensions();
        let aligned = align_thermal(&pair.thermal, &self.calibration, vw, vh);
        let mut visible_out = pair.visible;

        let detections = match self.detect_frame(&aligned, &visible_out, view.conf_threshold) {
            Ok(d) => d,
            Err(e) => {
                warn!("pipeline: frame at {} dropped from inference: {:#}", pair.ts_unix_ms, e);
                Vec::new()
            }
        };

        // The debug view samples the visible channels before any overlay
        // touches them.
        let thermal_out = debug_thermal(&aligned, &visible_out);

        if view.segmentation {
            let mask = segment::heat_mask(&aligned);
            let boxes: Vec<_> = detections.iter().map(|d| d.box_px).collect();
            segment::composite_mask(&mask, &boxes, &mut visible_out);
        }

        for det in &detections {
            self.draw_detection(&mut visible_out, det, view);
        }
        AnnotatedFramePair { visible_out, thermal_out, detections, ts_unix_ms: pair.ts_unix_ms }
    }

    fn detect_frame(
        &mut self,
        aligned: &RgbImage,
        visible: &RgbImage,
        conf_threshold: f32,
    ) -> Result<Vec<Detection>> {
        let fused = fuse(aligned, visible)?;
        let Some(nets) = self.nets.as_mut() else {
            return Ok(Vec::new());
        };

        let cands = nets.detect(&fused, conf_threshold)?;
        let kept = nms::retain_indices(&cands, conf_threshold, self.vision.nms_iou_threshold);

        let mut out = Vec::with_capacity(kept.len());
        for idx in kept {
            let c = cands[idx];
            let patch = state::thermal_patch(
                aligned,
                c.box_px,
                self.vision.state_patch_w,
                self.vision.state_patch_h,
            )?;
            let labels = state::one_hot(c.class_id, self.vision.num_base_classes);
            let prob = nets.state_prob(&labels, &patch)?;
            let (class_id, dev_state) = state::apply_state(c.class_id, prob, self.vision.num_base_classes);
            out.push(Detection { class_id, conf: c.conf, box_px: c.box_px, state: dev_state });
        }
        Ok(out)
    }

    fn draw_detection(&self, frame: &mut RgbImage, det: &Detection, view: &OverlayConfig) {
        let mic_only = is_mic_only(det.class_id, self.vision.num_base_classes);

        if view.labels {
            let name = self
                .labels
                .get(det.class_id)
                .map(String::as_str)
                .unwrap_or("Unknown");
            draw::draw_label_panel(frame, &det.box_px, name, mic_only, self.assets.font.as_ref());
        }
        if view.halo {
            if let Some(icon) = &self.assets.halo {
                draw::draw_halo(frame, &det.box_px, icon);
            }
        }
        if view.badge {
            let icon = if mic_only { &self.assets.badge_mic } else { &self.assets.badge_mic_cam };
            if let Some(icon) = icon {
                draw::draw_badge(frame, &det.box_px, icon);
            }
        }
        if view.bounding_box {
            draw::draw_box(frame, &det.box_px);
        }
    }
}

/// Side-channel view for the operator: aligned thermal intensity recombined
/// with the visible G/B channels, shrunk to the preview resolution.
fn debug_thermal(aligned: &RgbImage, visible: &RgbImage) -> RgbImage {
    let (w, h) = aligned.dimensions();
    let mut merged = RgbImage::new(w, h);
    for (x, y, px) in merged.enumerate_pixels_mut() {
        let t = aligned.get_pixel(x, y).0;
        let v = visible.get_pixel(x, y).0;
        px.0 = [t[0], v[1], v[2]];
    }
    imageops::resize(&merged, DEBUG_THERMAL_W, DEBUG_THERMAL_H, FilterType::Triangle)
}
