use crate::{CandidateDetection, PixelBox};

/// Intersection-over-union of two pixel rectangles.
pub fn iou(a: &PixelBox, b: &PixelBox) -> f32 {
    let ix = (a.right().min(b.right()) - a.left.max(b.left)).max(0);
    let iy = (a.bottom().min(b.bottom()) - a.top.max(b.top)).max(0);
    let inter = (ix as f32) * (iy as f32);
    let area_a = (a.width.max(0) as f32) * (a.height.max(0) as f32);
    let area_b = (b.width.max(0) as f32) * (b.height.max(0) as f32);
    let union = area_a + area_b - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Greedy non-maximum suppression. Returns indices into `cands` of the
/// retained detections, in acceptance (descending confidence) order.
///
/// Suppression is global across classes: two overlapping detections of
/// different classes still suppress each other. Deliberate simplification,
/// kept from the trained pipeline.
pub fn retain_indices(cands: &[CandidateDetection], conf_threshold: f32, iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..cands.len())
        .filter(|&i| cands[i].conf > conf_threshold)
        .collect();
    order.sort_by(|&a, &b| {
        cands[b]
            .conf
            .partial_cmp(&cands[a].conf)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<usize> = Vec::new();
    'outer: for i in order {
        for &k in &kept {
            if iou(&cands[i].box_px, &cands[k].box_px) > iou_threshold {
                continue 'outer;
            }
        }
        kept.push(i);
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(class_id: usize, conf: f32, left: i32, top: i32, w: i32, h: i32) -> CandidateDetection {
        CandidateDetection {
            class_id,
            conf,
            box_px: PixelBox { left, top, width: w, height: h },
        }
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let b = PixelBox { left: 10, top: 10, width: 50, height: 50 };
        assert!((iou(&b, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn iou_of_disjoint_boxes_is_zero() {
        let a = PixelBox { left: 0, top: 0, width: 10, height: 10 };
        let b = PixelBox { left: 100, top: 100, width: 10, height: 10 };
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn highest_confidence_wins() {
        let cands = vec![
            cand(0, 0.6, 100, 100, 100, 100),
            cand(0, 0.9, 105, 105, 100, 100),
        ];
        let kept = retain_indices(&cands, 0.0, 0.2);
        assert_eq!(kept, vec![1]);
    }

    #[test]
    fn suppression_is_global_across_classes() {
        // Same spot, different classes: still suppressed.
        let cands = vec![
            cand(0, 0.9, 100, 100, 100, 100),
            cand(3, 0.8, 102, 102, 100, 100),
        ];
        let kept = retain_indices(&cands, 0.0, 0.2);
        assert_eq!(kept, vec![0]);
    }

    #[test]
    fn retained_pairs_stay_under_iou_threshold() {
        let cands = vec![
            cand(0, 0.9, 0, 0, 100, 100),
            cand(1, 0.8, 50, 50, 100, 100),
            cand(2, 0.7, 300, 300, 80, 80),
            cand(3, 0.6, 305, 300, 80, 80),
            cand(4, 0.5, 700, 700, 60, 60),
        ];
        let kept = retain_indices(&cands, 0.0, 0.2);
        for (ai, &a) in kept.iter().enumerate() {
            for &b in &kept[ai + 1..] {
                assert!(iou(&cands[a].box_px, &cands[b].box_px) <= 0.2 + 1e-6);
            }
        }
    }

    #[test]
    fn confidence_filter_applies_before_suppression() {
        let cands = vec![
            cand(0, 0.3, 0, 0, 100, 100),
            cand(1, 0.9, 400, 400, 100, 100),
        ];
        let kept = retain_indices(&cands, 0.5, 0.2);
        assert_eq!(kept, vec![1]);
        for &i in &kept {
            assert!(cands[i].conf >= 0.5);
        }
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(retain_indices(&[], 0.5, 0.2).is_empty());
    }
}
