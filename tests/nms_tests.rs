// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/nms_tests.rs - 非极大值抑制测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use shanan_trt::{
  letterbox::{PadAnchor, PreprocessParams},
  model::{Candidate, Keypoint, iou, select, suppress},
};

fn candidate(class_id: usize, confidence: f32, bbox: [f32; 4]) -> Candidate {
  Candidate {
    class_id,
    confidence,
    bbox,
    keypoints: Vec::new(),
  }
}

#[test]
fn test_iou_properties() {
  let a = [0.0, 0.0, 10.0, 10.0];
  let b = [5.0, 5.0, 10.0, 10.0];
  assert_eq!(iou(&a, &a), 1.0);
  assert_eq!(iou(&a, &b), iou(&b, &a));
  assert!((iou(&a, &b) - 25.0 / 175.0).abs() < 1e-6);
  assert_eq!(iou(&a, &[20.0, 20.0, 5.0, 5.0]), 0.0);
  // 只有边相接
  assert_eq!(iou(&a, &[10.0, 0.0, 10.0, 10.0]), 0.0);
  assert_eq!(iou(&a, &[0.0, 0.0, 0.0, 10.0]), 0.0);
  assert_eq!(iou(&[0.0, 0.0, 0.0, 0.0], &[0.0, 0.0, 0.0, 0.0]), 0.0);
}

#[test]
fn test_overlap_same_class_suppressed() {
  let candidates = [
    candidate(0, 0.8, [0.0, 0.0, 10.0, 10.0]),
    candidate(0, 0.9, [1.0, 0.0, 10.0, 10.0]),
  ];
  assert_eq!(suppress(&candidates, 0.5, 10), vec![1]);
}

#[test]
fn test_high_overlap_keeps_best_only() {
  // IoU 0.8
  let candidates = [
    candidate(0, 0.85, [0.0, 0.0, 10.0, 8.0]),
    candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
  ];
  assert_eq!(suppress(&candidates, 0.65, 100), vec![1]);
}

#[test]
fn test_cross_class_never_suppressed() {
  // IoU 0.9
  let candidates = [
    candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
    candidate(1, 0.85, [0.0, 0.0, 10.0, 9.0]),
  ];
  assert_eq!(suppress(&candidates, 0.65, 100), vec![0, 1]);
}

#[test]
fn test_overlap_other_class_kept() {
  let candidates = [
    candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
    candidate(1, 0.8, [0.0, 0.0, 10.0, 10.0]),
  ];
  assert_eq!(suppress(&candidates, 0.5, 10), vec![0, 1]);
}

#[test]
fn test_iou_equal_to_threshold_kept() {
  // 交集 50，并集 100
  let candidates = [
    candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
    candidate(0, 0.8, [0.0, 0.0, 10.0, 5.0]),
  ];
  assert_eq!(suppress(&candidates, 0.5, 10), vec![0, 1]);
  assert_eq!(suppress(&candidates, 0.49, 10), vec![0]);
}

#[test]
fn test_sorted_and_ties_keep_decode_order() {
  let candidates = [
    candidate(0, 0.5, [0.0, 0.0, 1.0, 1.0]),
    candidate(0, 0.7, [10.0, 0.0, 1.0, 1.0]),
    candidate(0, 0.5, [20.0, 0.0, 1.0, 1.0]),
    candidate(0, 0.9, [30.0, 0.0, 1.0, 1.0]),
  ];
  assert_eq!(suppress(&candidates, 0.5, 10), vec![3, 1, 0, 2]);
}

#[test]
fn test_topk_limits_output() {
  let candidates: Vec<Candidate> = (0..20)
    .map(|i| candidate(0, i as f32 / 20.0, [i as f32 * 10.0, 0.0, 5.0, 5.0]))
    .collect();
  let keep = suppress(&candidates, 0.5, 3);
  assert_eq!(keep, vec![19, 18, 17]);
  assert!(suppress(&candidates, 0.5, 0).is_empty());
}

#[test]
fn test_suppression_is_idempotent() {
  let candidates = vec![
    candidate(0, 0.9, [0.0, 0.0, 10.0, 10.0]),
    candidate(0, 0.85, [1.0, 1.0, 10.0, 10.0]),
    candidate(0, 0.6, [30.0, 30.0, 10.0, 10.0]),
    candidate(1, 0.7, [0.0, 0.0, 10.0, 10.0]),
    candidate(1, 0.65, [2.0, 0.0, 10.0, 10.0]),
  ];
  let keep = suppress(&candidates, 0.45, 100);
  let survivors: Vec<Candidate> = keep.iter().map(|&i| candidates[i].clone()).collect();

  let again = suppress(&survivors, 0.45, 100);
  assert_eq!(again, (0..survivors.len()).collect::<Vec<_>>());
  for (i, a) in survivors.iter().enumerate() {
    for b in &survivors[i + 1..] {
      assert!(a.class_id != b.class_id || iou(&a.bbox, &b.bbox) <= 0.45);
    }
  }
}

#[test]
fn test_select_maps_back_and_skips_padding() {
  let params = PreprocessParams::compute(1920, 1080, 640, PadAnchor::TopLeft);
  let candidates = vec![
    // 完全在填充区，置信度最高
    candidate(0, 0.99, [100.0, 400.0, 50.0, 50.0]),
    candidate(2, 0.8, [100.0, 100.0, 50.0, 50.0]),
  ];
  let results = select(candidates, &params, 0.5, 1);
  assert_eq!(results.len(), 1);
  let det = &results[0].detection;
  assert_eq!(det.class_id, 2);
  assert_eq!(det.confidence, 0.8);
  assert!((det.x - 300.0).abs() < 1e-3);
  assert!((det.y - 300.0).abs() < 1e-3);
  assert!((det.width - 150.0).abs() < 1e-3);
  assert!((det.height - 150.0).abs() < 1e-3);
}

#[test]
fn test_select_clamps_keypoints_and_confidence() {
  let params = PreprocessParams::compute(1920, 1080, 640, PadAnchor::TopLeft);
  let mut pose = candidate(0, 1.5, [100.0, 100.0, 50.0, 50.0]);
  pose.keypoints = vec![
    Keypoint {
      x: 110.0,
      y: 120.0,
      confidence: 0.9,
    },
    Keypoint {
      x: -5.0,
      y: 500.0,
      confidence: 0.1,
    },
  ];
  let results = select(vec![pose], &params, 0.5, 10);
  assert_eq!(results.len(), 1);
  assert_eq!(results[0].detection.confidence, 1.0);

  let kps = &results[0].keypoints;
  assert!((kps[0].x - 330.0).abs() < 1e-3);
  assert!((kps[0].y - 360.0).abs() < 1e-3);
  assert_eq!(kps[0].confidence, 0.9);
  assert_eq!(kps[1].x, 0.0);
  assert!(kps[1].y < 1080.0);
  assert!((kps[1].y - 1080.0).abs() < 1e-3);
}

#[test]
fn test_select_of_nothing_is_empty() {
  let params = PreprocessParams::compute(640, 640, 640, PadAnchor::TopLeft);
  assert!(select(Vec::new(), &params, 0.5, 100).is_empty());
}
