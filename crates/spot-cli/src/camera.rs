use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use time::OffsetDateTime;
use tracing::{debug, info};

use spot_vision::FramePair;

/// Pragmatic frame delivery: live camera discovery/permission negotiation
/// belongs to an external collaborator, so the CLI replays recorded session
/// stills instead. A pair is `<stem>.visible.<ext>` + `<stem>.thermal.<ext>`
/// (png or jpg), replayed in stem order.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CameraConfig {
    pub mode: String, // "replay"
    pub replay_dir: String,
}

pub struct FrameSource {
    pairs: Vec<(PathBuf, PathBuf)>,
    next: usize,
}

impl FrameSource {
    pub fn open(cfg: &CameraConfig) -> Result<Self> {
        match cfg.mode.as_str() {
            "replay" => Self::replay_dir(&cfg.replay_dir),
            other => anyhow::bail!("unknown camera.mode: {}", other),
        }
    }

    pub fn replay_dir(dir: &str) -> Result<Self> {
        let mut visible: BTreeMap<String, PathBuf> = BTreeMap::new();
        let mut thermal: BTreeMap<String, PathBuf> = BTreeMap::new();

        for entry in std::fs::read_dir(dir).with_context(|| format!("read replay dir {}", dir))? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            if !(name.ends_with(".png") || name.ends_with(".jpg") || name.ends_with(".jpeg")) {
                continue;
            }
            if let Some(stem) = name.split(".visible.").next().filter(|_| name.contains(".visible.")) {
                visible.insert(stem.to_string(), path);
            } else if let Some(stem) = name.split(".thermal.").next().filter(|_| name.contains(".thermal.")) {
                thermal.insert(stem.to_string(), path);
            }
        }

        let mut pairs = Vec::new();
        for (stem, vis) in &visible {
            if let Some(th) = thermal.get(stem) {
                pairs.push((vis.clone(), th.clone()));
            } else {
                debug!("replay: {} has no thermal counterpart, skipping", stem);
            }
        }
        anyhow::ensure!(!pairs.is_empty(), "no frame pairs found in {}", dir);

        info!("replay: {} frame pairs from {}", pairs.len(), dir);
        Ok(Self { pairs, next: 0 })
    }

    /// Next pair in stem order, or `None` when the session is exhausted.
    pub fn next_pair(&mut self) -> Result<Option<FramePair>> {
        let Some((vis_path, th_path)) = self.pairs.get(self.next) else {
            return Ok(None);
        };
        self.next += 1;

        let visible = image::open(vis_path)
            .with_context(|| format!("decode {}", vis_path.display()))?
            .to_rgb8();
        let thermal = image::open(th_path)
            .with_context(|| format!("decode {}", th_path.display()))?
            .to_rgb8();

        let ts_unix_ms = OffsetDateTime::now_utc().unix_timestamp_nanos() as i64 / 1_000_000;
        Ok(Some(FramePair { visible, thermal, ts_unix_ms }))
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
