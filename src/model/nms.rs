// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::{
  letterbox::PreprocessParams,
  model::{Candidate, DetectionResult, Keypoint, PoseResult},
};

/// 计算两个 `[x, y, w, h]` 框的 IoU，面积为零的框与任何框的 IoU 都为 0
pub fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let area_a = a[2] * a[3];
  let area_b = b[2] * b[3];
  if area_a <= 0.0 || area_b <= 0.0 {
    return 0.0;
  }

  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = (a[0] + a[2]).min(b[0] + b[2]);
  let y2 = (a[1] + a[3]).min(b[1] + b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}

/// 按类别的贪心 NMS，返回保留下来的候选框下标（按置信度降序）。
///
/// 置信度相同时保持解码顺序；只有同类别且 IoU 大于 `iou_thres` 的框会被抑制。
pub fn suppress(candidates: &[Candidate], iou_thres: f32, topk: usize) -> Vec<usize> {
  let mut order: Vec<usize> = (0..candidates.len()).collect();
  // sort_by 是稳定排序
  order.sort_by(|&a, &b| {
    candidates[b]
      .confidence
      .total_cmp(&candidates[a].confidence)
  });

  let mut suppressed = vec![false; candidates.len()];
  let mut keep = Vec::new();

  for (rank, &current) in order.iter().enumerate() {
    if keep.len() >= topk {
      break;
    }
    if suppressed[current] {
      continue;
    }
    keep.push(current);

    let best = &candidates[current];
    for &other in &order[rank + 1..] {
      if suppressed[other] || candidates[other].class_id != best.class_id {
        continue;
      }
      if iou(&best.bbox, &candidates[other].bbox) > iou_thres {
        suppressed[other] = true;
      }
    }
  }

  keep
}

/// NMS 并把保留的候选框还原到原图空间。
///
/// 还原后完全落在原图之外的候选框在抑制之前就被移除，不占用 `topk` 名额。
pub fn select(
  candidates: Vec<Candidate>,
  params: &PreprocessParams,
  iou_thres: f32,
  topk: usize,
) -> Vec<PoseResult> {
  let total = candidates.len();
  let (inside, mapped): (Vec<Candidate>, Vec<[f32; 4]>) = candidates
    .into_iter()
    .filter_map(|c| params.inverse_box(c.bbox).map(|bbox| (c, bbox)))
    .unzip();

  let keep = suppress(&inside, iou_thres, topk);
  debug!(
    "NMS: {} 个候选框, {} 个在原图内, 保留 {} 个",
    total,
    inside.len(),
    keep.len()
  );

  keep
    .into_iter()
    .map(|index| {
      let candidate = &inside[index];
      let [x, y, width, height] = mapped[index];
      let keypoints = candidate
        .keypoints
        .iter()
        .map(|k| {
          let (kx, ky) = params.inverse(k.x, k.y);
          Keypoint {
            x: kx,
            y: ky,
            confidence: k.confidence,
          }
        })
        .collect();

      PoseResult {
        detection: DetectionResult {
          class_id: candidate.class_id,
          confidence: candidate.confidence.clamp(0.0, 1.0),
          x,
          y,
          width,
          height,
        },
        keypoints,
      }
    })
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn iou_of_half_overlap() {
    let a = [0.0, 0.0, 10.0, 10.0];
    let b = [5.0, 0.0, 10.0, 10.0];
    assert!((iou(&a, &b) - 50.0 / 150.0).abs() < 1e-6);
  }

  #[test]
  fn topk_zero_keeps_nothing() {
    let c = Candidate {
      class_id: 0,
      confidence: 0.9,
      bbox: [0.0, 0.0, 1.0, 1.0],
      keypoints: Vec::new(),
    };
    assert!(suppress(&[c], 0.5, 0).is_empty());
  }
}
