use anyhow::Result;

use crate::align::Calibration;
use crate::VisionConfig;

pub fn check_calibration(cal: &Calibration) -> Result<()> {
    anyhow::ensure!(
        cal.scale > 0.0 && cal.scale <= 2.0,
        "calibration.scale out of range: {}",
        cal.scale
    );
    anyhow::ensure!(
        cal.dx.abs() < 10_000 && cal.dy.abs() < 10_000,
        "calibration offset implausible: ({}, {})",
        cal.dx,
        cal.dy
    );
    Ok(())
}

pub fn check_vision(cfg: &VisionConfig) -> Result<()> {
    anyhow::ensure!(cfg.num_base_classes >= 1, "vision.num_base_classes must be >= 1");
    anyhow::ensure!(
        cfg.class_names.len() == cfg.num_base_classes,
        "vision.class_names has {} entries, expected {}",
        cfg.class_names.len(),
        cfg.num_base_classes
    );
    anyhow::ensure!(cfg.input_w > 0 && cfg.input_h > 0, "vision input resolution invalid");
    anyhow::ensure!(
        cfg.state_patch_w > 0 && cfg.state_patch_h > 0,
        "vision state patch resolution invalid"
    );
    anyhow::ensure!(
        cfg.nms_iou_threshold > 0.0 && cfg.nms_iou_threshold < 1.0,
        "vision.nms_iou_threshold out of range: {}",
        cfg.nms_iou_threshold
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> VisionConfig {
        VisionConfig {
            model_path_regular: "a".into(),
            model_path_lowlight: "b".into(),
            state_model_path: "c".into(),
            input_w: 416,
            input_h: 416,
            num_base_classes: 5,
            class_names: vec!["a".into(), "b".into(), "c".into(), "d".into(), "e".into()],
            nms_iou_threshold: 0.2,
            state_patch_w: 152,
            state_patch_h: 145,
        }
    }

    #[test]
    fn reference_config_passes() {
        assert!(check_calibration(&Calibration::default()).is_ok());
        assert!(check_vision(&cfg()).is_ok());
    }

    #[test]
    fn class_table_mismatch_is_rejected() {
        let mut c = cfg();
        c.class_names.pop();
        assert!(check_vision(&c).is_err());
    }

    #[test]
    fn zero_scale_is_rejected() {
        let cal = Calibration { scale: 0.0, dx: 0, dy: 0 };
        assert!(check_calibration(&cal).is_err());
    }
}
