// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;
use tracing::{debug, error};

use crate::{engine::TensorBinding, error::InferError};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// COCO 姿态模型的关键点数量
pub const COCO_KEYPOINTS: usize = 17;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Keypoint {
  pub x: f32,
  pub y: f32,
  #[serde(rename = "s")]
  pub confidence: f32,
}

/// NMS 之前的候选框，坐标位于输入张量空间
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
  pub class_id: usize,
  pub confidence: f32,
  pub bbox: [f32; 4], // [x, y, width, height]
  pub keypoints: Vec<Keypoint>,
}

/// 原图空间的检测结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectionResult {
  #[serde(rename = "label")]
  pub class_id: usize,
  #[serde(rename = "prob")]
  pub confidence: f32,
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
}

impl DetectionResult {
  pub fn bbox(&self) -> [f32; 4] {
    [self.x, self.y, self.width, self.height]
  }
}

/// 原图空间的姿态结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoseResult {
  #[serde(flatten)]
  pub detection: DetectionResult,
  #[serde(rename = "kps")]
  pub keypoints: Vec<Keypoint>,
}

impl From<PoseResult> for DetectionResult {
  fn from(pose: PoseResult) -> Self {
    pose.detection
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
  Detect,
  Pose { keypoints: usize },
}

impl Task {
  pub fn keypoints(&self) -> usize {
    match self {
      Task::Detect => 0,
      Task::Pose { keypoints } => *keypoints,
    }
  }
}

/// 输出张量中锚点所在的维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorAxis {
  /// `[batch, anchors, attrs]`
  AnchorMajor,
  /// `[batch, attrs, anchors]`，YOLOv8/11 导出的默认排列
  AttributeMajor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoxEncoding {
  /// 中心点与宽高
  #[default]
  CenterSize,
  /// 左上角与右下角
  Corners,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreActivation {
  /// 导出时已经输出概率
  #[default]
  Identity,
  /// 输出为 logit
  Sigmoid,
}

impl ScoreActivation {
  pub fn apply(&self, x: f32) -> f32 {
    match self {
      ScoreActivation::Identity => x,
      ScoreActivation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
    }
  }
}

/// 用户指定的输出解析方式，锚点维度为空时按张量形状推断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutConfig {
  pub task: Task,
  pub anchor_axis: Option<AnchorAxis>,
  pub box_encoding: BoxEncoding,
  pub activation: ScoreActivation,
}

impl LayoutConfig {
  pub fn new(task: Task) -> Self {
    Self {
      task,
      anchor_axis: None,
      box_encoding: BoxEncoding::default(),
      activation: ScoreActivation::default(),
    }
  }
}

/// 与输出绑定形状核对过的布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
  pub task: Task,
  pub anchor_axis: AnchorAxis,
  pub box_encoding: BoxEncoding,
  pub activation: ScoreActivation,
  pub num_anchors: usize,
  pub num_classes: usize,
}

impl OutputLayout {
  pub fn resolve(config: &LayoutConfig, binding: &TensorBinding) -> Result<Self, InferError> {
    let shape = binding.shape();
    let [batch, d1, d2] = shape else {
      error!("输出 {} 的形状 {:?} 不是三维", binding.name(), shape);
      return Err(InferError::shape(
        binding.name(),
        &format!("期望 [batch, anchors, attrs] 或 [batch, attrs, anchors], 实际 {:?}", shape),
      ));
    };
    if *batch != 1 {
      return Err(InferError::shape(
        binding.name(),
        &format!("只支持 batch = 1, 实际 {}", batch),
      ));
    }

    let anchor_axis = config.anchor_axis.unwrap_or(if d1 <= d2 {
      AnchorAxis::AttributeMajor
    } else {
      AnchorAxis::AnchorMajor
    });
    let (num_anchors, attrs) = match anchor_axis {
      AnchorAxis::AnchorMajor => (*d1, *d2),
      AnchorAxis::AttributeMajor => (*d2, *d1),
    };

    let fixed = 4 + 3 * config.task.keypoints();
    if attrs <= fixed {
      error!(
        "输出 {} 每个锚点有 {} 个属性, 不足以容纳 {} 个框/关键点属性和至少一个类别",
        binding.name(),
        attrs,
        fixed
      );
      return Err(InferError::shape(
        binding.name(),
        &format!("每个锚点 {} 个属性, 至少需要 {}", attrs, fixed + 1),
      ));
    }

    let layout = OutputLayout {
      task: config.task,
      anchor_axis,
      box_encoding: config.box_encoding,
      activation: config.activation,
      num_anchors,
      num_classes: attrs - fixed,
    };
    debug!("输出布局: {:?}", layout);
    Ok(layout)
  }

  pub fn attrs(&self) -> usize {
    4 + self.num_classes + 3 * self.num_keypoints()
  }

  pub fn num_keypoints(&self) -> usize {
    self.task.keypoints()
  }

  pub fn element_count(&self) -> usize {
    self.num_anchors * self.attrs()
  }
}

mod decode;
mod nms;

pub use self::decode::decode;
pub use self::nms::{iou, select, suppress};
