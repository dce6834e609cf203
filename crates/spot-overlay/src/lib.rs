pub mod draw;

use ab_glyph::FontVec;
use anyhow::{Context, Result};
use image::RgbImage;
use serde::Deserialize;
use tracing::warn;

/// Per-frame snapshot of the overlay toggles and confidence threshold.
/// Owned by the UI collaborator; the pipeline receives it by value so a
/// mid-frame toggle can never race the processing thread.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct OverlayConfig {
    pub bounding_box: bool,
    pub labels: bool,
    pub halo: bool,
    pub badge: bool,
    pub segmentation: bool,
    /// In [0,1]. 0 disables nothing, 1 keeps nothing.
    pub conf_threshold: f32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            bounding_box: false,
            labels: false,
            halo: false,
            badge: false,
            segmentation: false,
            conf_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssetPaths {
    pub halo: String,
    pub badge_mic: String,
    pub badge_mic_cam: String,
    pub font: String,
}

/// Pre-rendered icon images and the label font, loaded once at startup.
/// A missing file disables only the layer that needs it.
pub struct OverlayAssets {
    pub halo: Option<RgbImage>,
    pub badge_mic: Option<RgbImage>,
    pub badge_mic_cam: Option<RgbImage>,
    pub font: Option<FontVec>,
}

impl OverlayAssets {
    pub fn load(paths: &AssetPaths) -> Self {
        Self {
            halo: load_icon(&paths.halo, "halo"),
            badge_mic: load_icon(&paths.badge_mic, "badge-mic"),
            badge_mic_cam: load_icon(&paths.badge_mic_cam, "badge-mic-cam"),
            font: load_font(&paths.font),
        }
    }

    /// No assets at all: every decorated layer becomes a no-op.
    pub fn none() -> Self {
        Self { halo: None, badge_mic: None, badge_mic_cam: None, font: None }
    }
}

fn load_icon(path: &str, name: &str) -> Option<RgbImage> {
    match image::open(path) {
        Ok(img) => Some(img.to_rgb8()),
        Err(e) => {
            warn!("overlay: {} icon unavailable ({}): {:#}", name, path, e);
            None
        }
    }
}

fn load_font(path: &str) -> Option<FontVec> {
    let load = || -> Result<FontVec> {
        let bytes = std::fs::read(path).with_context(|| format!("read font {}", path))?;
        FontVec::try_from_vec(bytes).context("parse font")
    };
    match load() {
        Ok(f) => Some(f),
        Err(e) => {
            warn!("overlay: label font unavailable: {:#}", e);
            None
        }
    }
}

/// Static ordered display-name table over the flat label space: all Off
/// names first, then the On names at `num_base_classes` offset.
pub fn label_table(base_names: &[String]) -> Vec<String> {
    let mut table: Vec<String> = base_names.iter().map(|n| format!("{} Off", n)).collect();
    table.extend(base_names.iter().map(|n| format!("{} On", n)));
    table
}

/// Speaker and smart-speaker devices carry a microphone but no camera; the
/// label panel advertises "& Camera" for everything else.
const MIC_ONLY_BASE: [usize; 2] = [2, 3];

pub fn is_mic_only(final_class: usize, num_base_classes: usize) -> bool {
    if num_base_classes == 0 {
        return false;
    }
    MIC_ONLY_BASE.contains(&(final_class % num_base_classes))
}
