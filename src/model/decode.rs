// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/decode.rs - 输出张量解码
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

use crate::model::{AnchorAxis, BoxEncoding, Candidate, Keypoint, OutputLayout};

/// 把原始输出张量解码为输入张量空间的候选框。
///
/// 置信度低于 `score_thres` 的锚点、宽或高不为正的框，以及含非有限值的锚点都会被丢弃。
/// 多个类别得分并列最高时取类别索引最小的一个。
pub fn decode(layout: &OutputLayout, data: &[f32], score_thres: f32) -> Vec<Candidate> {
  assert_eq!(
    data.len(),
    layout.element_count(),
    "输出张量元素数量与布局不符"
  );

  let anchors = layout.num_anchors;
  let attrs = layout.attrs();
  let attr = |anchor: usize, j: usize| match layout.anchor_axis {
    AnchorAxis::AnchorMajor => data[anchor * attrs + j],
    AnchorAxis::AttributeMajor => data[j * anchors + anchor],
  };

  let mut candidates = Vec::new();
  let mut degenerate = 0usize;

  for anchor in 0..anchors {
    let (class_id, confidence) = {
      let mut best = f32::NEG_INFINITY;
      let mut best_idx = 0usize;
      for c in 0..layout.num_classes {
        let score = layout.activation.apply(attr(anchor, 4 + c));
        if score > best {
          best = score;
          best_idx = c;
        }
      }
      (best_idx, best)
    };

    // NaN 同样在这里被过滤
    if !(confidence >= score_thres) {
      continue;
    }

    let (a, b, c, d) = (
      attr(anchor, 0),
      attr(anchor, 1),
      attr(anchor, 2),
      attr(anchor, 3),
    );
    let bbox = match layout.box_encoding {
      BoxEncoding::CenterSize => [a - c / 2.0, b - d / 2.0, c, d],
      BoxEncoding::Corners => [a, b, c - a, d - b],
    };
    if bbox.iter().any(|v| !v.is_finite()) || bbox[2] <= 0.0 || bbox[3] <= 0.0 {
      degenerate += 1;
      continue;
    }

    let base = 4 + layout.num_classes;
    let keypoints: Vec<Keypoint> = (0..layout.num_keypoints())
      .map(|k| Keypoint {
        x: attr(anchor, base + 3 * k),
        y: attr(anchor, base + 3 * k + 1),
        confidence: layout.activation.apply(attr(anchor, base + 3 * k + 2)),
      })
      .collect();
    if keypoints.iter().any(|k| !k.x.is_finite() || !k.y.is_finite()) {
      degenerate += 1;
      continue;
    }

    candidates.push(Candidate {
      class_id,
      confidence,
      bbox,
      keypoints,
    });
  }

  debug!(
    "解码 {} 个锚点, 得到 {} 个候选框, 丢弃 {} 个退化框",
    anchors,
    candidates.len(),
    degenerate
  );
  candidates
}
