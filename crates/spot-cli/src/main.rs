use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use spot_overlay::{AssetPaths, OverlayAssets, OverlayConfig};
use spot_pipeline::relay::{frame_relay, RelayReceiver};
use spot_pipeline::{AnnotatedFramePair, FramePipeline};
use spot_vision::align::Calibration;
use spot_vision::{doctor as vision_doctor, DeviceNets, ModelVariant, VisionConfig};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[cfg(feature = "vision-tflite")]
use spot_vision::tflite::TfliteNets;

mod camera;
use camera::{CameraConfig, FrameSource};

#[derive(Debug, Parser)]
#[command(name = "irspot", version, about = "IRspot - dual-sensor electronic device spotter")]
struct Cli {
    #[arg(long)]
    config: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Doctor,
    Run,
    Vision { #[command(subcommand)] cmd: VisionCmd },
}

#[derive(Debug, Subcommand)]
enum VisionCmd { Inspect }

#[derive(Debug, serde::Deserialize)]
struct Config {
    calibration: Calibration,
    vision: VisionConfig,
    overlay: OverlayCfg,
    camera: CameraConfig,
    output: OutputCfg,

    /// Detector weight set selected at startup; defaults to regular.
    variant: Option<ModelVariant>,
}

#[derive(Debug, serde::Deserialize)]
struct OverlayCfg {
    bounding_box: bool,
    labels: bool,
    halo: bool,
    badge: bool,
    segmentation: bool,
    /// Percent, 0..=100. Matches the slider the operator UI exposes.
    conf_threshold_pct: u8,
    assets: AssetPaths,
}

impl OverlayCfg {
    fn snapshot(&self) -> OverlayConfig {
        OverlayConfig {
            bounding_box: self.bounding_box,
            labels: self.labels,
            halo: self.halo,
            badge: self.badge,
            segmentation: self.segmentation,
            conf_threshold: f32::from(self.conf_threshold_pct.min(100)) / 100.0,
        }
    }
}

#[derive(Debug, serde::Deserialize)]
struct OutputCfg {
    dir: String,
}

fn load_config(path: &str) -> Result<Config> {
    let s = std::fs::read_to_string(path).context("read config")?;
    Ok(toml::from_str(&s).context("parse config toml")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.cmd {
        Command::Doctor => doctor(&cfg)?,
        Command::Run => run(cfg).await?,
        Command::Vision { cmd } => vision_cmd(&cfg, cmd)?,
    }
    Ok(())
}

fn doctor(cfg: &Config) -> Result<()> {
    info!("doctor: starting");

    vision_doctor::check_calibration(&cfg.calibration)?;
    vision_doctor::check_vision(&cfg.vision)?;

    anyhow::ensure!(
        cfg.overlay.conf_threshold_pct <= 100,
        "overlay.conf_threshold_pct out of range: {}",
        cfg.overlay.conf_threshold_pct
    );
    anyhow::ensure!(
        std::path::Path::new(&cfg.camera.replay_dir).is_dir(),
        "camera.replay_dir does not exist: {}",
        cfg.camera.replay_dir
    );

    // Missing weights or icons degrade at runtime rather than abort.
    for (name, path) in [
        ("regular detector", &cfg.vision.model_path_regular),
        ("low-light detector", &cfg.vision.model_path_lowlight),
        ("state classifier", &cfg.vision.state_model_path),
        ("halo icon", &cfg.overlay.assets.halo),
        ("mic badge", &cfg.overlay.assets.badge_mic),
        ("mic+cam badge", &cfg.overlay.assets.badge_mic_cam),
        ("label font", &cfg.overlay.assets.font),
    ] {
        if !std::path::Path::new(path).is_file() {
            warn!("doctor: {} missing: {}", name, path);
        }
    }

    if !std::path::Path::new(&cfg.output.dir).is_dir() {
        std::fs::create_dir_all(&cfg.output.dir)
            .with_context(|| format!("create output dir {}", cfg.output.dir))?;
        info!("doctor: created output dir {}", cfg.output.dir);
    }

    info!("doctor: OK");
    Ok(())
}

fn vision_cmd(cfg: &Config, cmd: VisionCmd) -> Result<()> {
    match cmd {
        VisionCmd::Inspect => vision_inspect(cfg),
    }
}

#[cfg(feature = "vision-tflite")]
fn vision_inspect(cfg: &Config) -> Result<()> {
    let nets = TfliteNets::new(cfg.vision.clone())?;
    print!("{}", nets.inspect());
    Ok(())
}

#[cfg(not(feature = "vision-tflite"))]
fn vision_inspect(_cfg: &Config) -> Result<()> {
    anyhow::bail!("vision backend not available; build with --features vision-tflite")
}

async fn run(cfg: Config) -> Result<()> {
    info!("run: starting");

    std::fs::create_dir_all(&cfg.output.dir)
        .with_context(|| format!("create output dir {}", cfg.output.dir))?;

    let assets = OverlayAssets::load(&cfg.overlay.assets);
    let nets = init_nets(&cfg);
    let mut pipeline = FramePipeline::new(cfg.calibration, cfg.vision.clone(), nets, assets);
    if let Some(variant) = cfg.variant {
        pipeline.set_variant(variant);
    }

    let view = cfg.overlay.snapshot();
    let mut source = FrameSource::open(&cfg.camera)?;
    let (tx, mut rx) = frame_relay();

    let done = Arc::new(AtomicBool::new(false));
    let done_producer = done.clone();

    // Frame-arrival context: capture, process, hand over. Blocks when the
    // consumer falls behind, which is the intended backpressure.
    let producer = tokio::task::spawn_blocking(move || -> Result<()> {
        while let Some(pair) = source.next_pair()? {
            let annotated = pipeline.process(pair, &view);
            tx.push(annotated)?;
        }
        done_producer.store(true, Ordering::SeqCst);
        info!("run: source exhausted");
        Ok(())
    });

    // Display stand-in: drain the relay and persist each annotated pair.
    let out_dir = cfg.output.dir.clone();
    let consumer = tokio::task::spawn_blocking(move || -> Result<()> {
        let written = consume_frames(rx, &done, |frame| {
            let vis = format!("{}/{}.annotated.png", out_dir, frame.ts_unix_ms);
            let th = format!("{}/{}.thermal.png", out_dir, frame.ts_unix_ms);
            frame.visible_out.save(&vis).with_context(|| format!("write {}", vis))?;
            frame.thermal_out.save(&th).with_context(|| format!("write {}", th))?;
            info!(
                "frame {}: {} detections",
                frame.ts_unix_ms,
                frame.detections.len()
            );
            Ok(())
        })?;
        info!("run: wrote {} annotated pairs", written);
        Ok(())
    });

    producer.await.context("producer task")??;
    consumer.await.context("consumer task")??;
    Ok(())
}

/// Drain the relay into `sink` until the producer signals completion.
///
/// The producer can push its last frames and raise `done` between a `pop`
/// that returned `None` and the flag check, so observing `done` drains the
/// relay once more before stopping.
fn consume_frames(
    mut rx: RelayReceiver,
    done: &AtomicBool,
    mut sink: impl FnMut(AnnotatedFramePair) -> Result<()>,
) -> Result<usize> {
    let mut written = 0usize;
    loop {
        match rx.pop() {
            Some(frame) => {
                sink(frame)?;
                written += 1;
            }
            None if done.load(Ordering::SeqCst) => {
                while let Some(frame) = rx.pop() {
                    sink(frame)?;
                    written += 1;
                }
                return Ok(written);
            }
            None => std::thread::sleep(std::time::Duration::from_millis(5)),
        }
    }
}

fn init_nets(cfg: &Config) -> Option<Box<dyn DeviceNets>> {
    #[cfg(feature = "vision-tflite")]
    {
        match TfliteNets::new(cfg.vision.clone()) {
            Ok(nets) => return Some(Box::new(nets)),
            Err(e) => {
                warn!("vision networks unavailable, inference disabled: {:#}", e);
                return None;
            }
        }
    }
    #[cfg(not(feature = "vision-tflite"))]
    {
        let _ = cfg;
        warn!("built without vision-tflite, inference disabled");
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    fn frame(ts: i64) -> AnnotatedFramePair {
        AnnotatedFramePair {
            visible_out: RgbImage::new(1, 1),
            thermal_out: RgbImage::new(1, 1),
            detections: Vec::new(),
            ts_unix_ms: ts,
        }
    }

    #[test]
    fn consumer_keeps_frames_pushed_right_before_done() {
        let (tx, rx) = frame_relay();
        let done = Arc::new(AtomicBool::new(false));
        let done_producer = done.clone();
        let producer = std::thread::spawn(move || {
            for ts in 0..5 {
                tx.push(frame(ts)).unwrap();
                std::thread::sleep(std::time::Duration::from_millis(2));
            }
            done_producer.store(true, Ordering::SeqCst);
        });

        let mut seen = Vec::new();
        let written = consume_frames(rx, &done, |f| {
            seen.push(f.ts_unix_ms);
            Ok(())
        })
        .unwrap();
        producer.join().unwrap();

        // Frames queued when the done flag goes up must still be written.
        assert_eq!(written, 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn consumer_drains_backlog_after_done_is_set() {
        let (tx, rx) = frame_relay();
        for ts in 0..3 {
            tx.push(frame(ts)).unwrap();
        }
        let done = AtomicBool::new(true);
        drop(tx);

        let written = consume_frames(rx, &done, |_| Ok(())).unwrap();
        assert_eq!(written, 3);
    }

    #[test]
    fn consumer_surfaces_sink_errors() {
        let (tx, rx) = frame_relay();
        tx.push(frame(0)).unwrap();
        let done = AtomicBool::new(true);
        assert!(consume_frames(rx, &done, |_| anyhow::bail!("disk full")).is_err());
    }

    #[test]
    fn config_parses_reference_toml() {
        let s = r#"
            variant = "low-light"

            [calibration]
            scale = 0.81
            dx = 120
            dy = 185

            [vision]
            model_path_regular = "models/detector.tflite"
            model_path_lowlight = "models/detector-lowlight.tflite"
            state_model_path = "models/state.tflite"
            input_w = 416
            input_h = 416
            num_base_classes = 5
            class_names = ["Mobile", "Laptop", "Speaker", "Alexa", "Screen"]
            nms_iou_threshold = 0.2
            state_patch_w = 152
            state_patch_h = 145

            [overlay]
            bounding_box = true
            labels = true
            halo = false
            badge = true
            segmentation = false
            conf_threshold_pct = 40

            [overlay.assets]
            halo = "assets/halo.png"
            badge_mic = "assets/mic.png"
            badge_mic_cam = "assets/mic_cam.png"
            font = "assets/label.ttf"

            [camera]
            mode = "replay"
            replay_dir = "captures"

            [output]
            dir = "out"
        "#;
        let cfg: Config = toml::from_str(s).unwrap();
        assert_eq!(cfg.variant, Some(ModelVariant::LowLight));
        assert_eq!(cfg.vision.num_base_classes, 5);
        assert!((cfg.overlay.snapshot().conf_threshold - 0.4).abs() < 1e-6);
        assert!(cfg.overlay.snapshot().bounding_box);
        assert!(!cfg.overlay.snapshot().segmentation);
    }

    #[test]
    fn threshold_pct_is_capped() {
        let o = OverlayCfg {
            bounding_box: false,
            labels: false,
            halo: false,
            badge: false,
            segmentation: false,
            conf_threshold_pct: 250,
            assets: AssetPaths {
                halo: String::new(),
                badge_mic: String::new(),
                badge_mic_cam: String::new(),
                font: String::new(),
            },
        };
        assert!((o.snapshot().conf_threshold - 1.0).abs() < 1e-6);
    }
}
