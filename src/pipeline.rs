// 该文件是 Shanan （山南西风） 项目的一部分。
// src/pipeline.rs - 推理流程编排
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

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl,
  device::Device,
  engine::{DataType, Engine, Runtime, Session, SessionState},
  error::InferError,
  letterbox::{Letterbox, PadAnchor},
  model::{
    AnchorAxis, BoxEncoding, COCO_KEYPOINTS, DetectionResult, LayoutConfig, Model, OutputLayout,
    PoseResult, ScoreActivation, Task, decode, select,
  },
};

pub const YOLO_DETECT_SCHEME: &str = "yolo-detect";
pub const YOLO_POSE_SCHEME: &str = "yolo-pose";

const DEFAULT_WARMUP_ITERATIONS: usize = 10;

/// 单次推理的阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
  pub score: f32,
  pub iou: f32,
  pub topk: usize,
}

impl Default for Thresholds {
  fn default() -> Self {
    Self {
      score: 0.25,
      iou: 0.65,
      topk: 100,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineBuilder {
  model_path: PathBuf,
  layout: LayoutConfig,
  anchor: PadAnchor,
  warmup: usize,
}

fn query_error(key: &str, value: &str) -> InferError {
  InferError::Load(format!("无法识别的参数 {}={}", key, value))
}

impl FromUrl for PipelineBuilder {
  type Error = InferError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    let mut keypoints = COCO_KEYPOINTS;
    let mut builder = match url.scheme() {
      YOLO_DETECT_SCHEME => PipelineBuilder::new(url.path(), Task::Detect),
      YOLO_POSE_SCHEME => PipelineBuilder::new(url.path(), Task::Pose { keypoints }),
      other => {
        error!("模型路径方案 {} 不受支持", other);
        return Err(InferError::Load(format!(
          "模型路径必须使用 {} 或 {} 方案, 实际为 {}",
          YOLO_DETECT_SCHEME, YOLO_POSE_SCHEME, other
        )));
      }
    };

    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "keypoints" => {
          keypoints = value.parse().map_err(|_| query_error(&key, &value))?;
        }
        "warmup" => {
          builder.warmup = value.parse().map_err(|_| query_error(&key, &value))?;
        }
        "layout" => {
          builder.layout.anchor_axis = Some(match value.as_ref() {
            "anchor-major" => AnchorAxis::AnchorMajor,
            "attribute-major" => AnchorAxis::AttributeMajor,
            _ => return Err(query_error(&key, &value)),
          });
        }
        "box" => {
          builder.layout.box_encoding = match value.as_ref() {
            "xywh" => BoxEncoding::CenterSize,
            "xyxy" => BoxEncoding::Corners,
            _ => return Err(query_error(&key, &value)),
          };
        }
        "activation" => {
          builder.layout.activation = match value.as_ref() {
            "none" => ScoreActivation::Identity,
            "sigmoid" => ScoreActivation::Sigmoid,
            _ => return Err(query_error(&key, &value)),
          };
        }
        "pad" => {
          builder.anchor = match value.as_ref() {
            "top-left" => PadAnchor::TopLeft,
            "center" => PadAnchor::Center,
            _ => return Err(query_error(&key, &value)),
          };
        }
        _ => return Err(query_error(&key, &value)),
      }
    }

    if let Task::Pose { .. } = builder.layout.task {
      builder.layout.task = Task::Pose { keypoints };
    }
    Ok(builder)
  }
}

impl PipelineBuilder {
  pub fn new(model_path: impl AsRef<Path>, task: Task) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      layout: LayoutConfig::new(task),
      anchor: PadAnchor::default(),
      warmup: DEFAULT_WARMUP_ITERATIONS,
    }
  }

  pub fn anchor_axis(mut self, axis: AnchorAxis) -> Self {
    self.layout.anchor_axis = Some(axis);
    self
  }

  pub fn box_encoding(mut self, encoding: BoxEncoding) -> Self {
    self.layout.box_encoding = encoding;
    self
  }

  pub fn activation(mut self, activation: ScoreActivation) -> Self {
    self.layout.activation = activation;
    self
  }

  pub fn pad_anchor(mut self, anchor: PadAnchor) -> Self {
    self.anchor = anchor;
    self
  }

  pub fn warmup(mut self, iterations: usize) -> Self {
    self.warmup = iterations;
    self
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  pub fn task(&self) -> Task {
    self.layout.task
  }

  /// 加载模型、绑定缓冲区并预热
  pub fn build<D, R>(self, runtime: R, device: D) -> Result<Pipeline<D, R>, InferError>
  where
    D: Device,
    R: Runtime<D>,
  {
    let loaded = Loaded::load(&runtime, &device, &self)?;
    Ok(Pipeline {
      runtime,
      device,
      config: self,
      loaded: Some(loaded),
    })
  }
}

/// 已加载模型的会话以及与之匹配的预处理和解码参数
struct Loaded<D: Device, E: Engine<D>> {
  session: Session<D, E>,
  letterbox: Letterbox,
  input_dtype: DataType,
  output_dtype: DataType,
  layout: OutputLayout,
}

impl<D: Device, E: Engine<D>> Loaded<D, E> {
  fn load<R>(runtime: &R, device: &D, config: &PipelineBuilder) -> Result<Self, InferError>
  where
    R: Runtime<D, Engine = E>,
  {
    let mut session = Session::load(runtime, device, &config.model_path)?;

    let inputs: Vec<_> = session.inputs().map(|(_, b)| b.clone()).collect();
    let [input] = inputs.as_slice() else {
      error!("模型输入数量为 {}, 期望 1", inputs.len());
      return Err(InferError::Shape(format!(
        "模型输入数量为 {}, 期望 1",
        inputs.len()
      )));
    };
    let size = match input.shape() {
      [1, 3, h, w] if h == w => *h,
      shape => {
        error!("输入 {} 的形状为 {:?}, 期望 [1, 3, S, S]", input.name(), shape);
        return Err(InferError::shape(
          input.name(),
          &format!("期望 [1, 3, S, S], 实际 {:?}", shape),
        ));
      }
    };
    if !matches!(input.dtype(), DataType::F32 | DataType::F16 | DataType::U8) {
      return Err(InferError::shape(
        input.name(),
        &format!("不支持的输入类型 {:?}", input.dtype()),
      ));
    }

    let Some((_, output)) = session.outputs().next() else {
      return Err(InferError::Shape("模型没有输出".to_string()));
    };
    if !matches!(output.dtype(), DataType::F32 | DataType::F16) {
      return Err(InferError::shape(
        output.name(),
        &format!("不支持的输出类型 {:?}", output.dtype()),
      ));
    }
    let layout = OutputLayout::resolve(&config.layout, output)?;
    let output_dtype = output.dtype();
    let input_dtype = input.dtype();

    info!(
      "模型输入 {}x{}, {} 个锚点, {} 个类别, {} 个关键点",
      size,
      size,
      layout.num_anchors,
      layout.num_classes,
      layout.num_keypoints()
    );

    session.bind_buffers()?;
    session.warm_up(config.warmup)?;

    Ok(Self {
      session,
      letterbox: Letterbox::new(size as u32).anchor(config.anchor),
      input_dtype,
      output_dtype,
      layout,
    })
  }

  fn run(
    &mut self,
    image_bytes: &[u8],
    thresholds: &Thresholds,
  ) -> Result<Vec<PoseResult>, InferError> {
    let image = image::load_from_memory(image_bytes)
      .inspect_err(|e| warn!("图像解码失败: {}", e))?
      .to_rgb8();
    debug!("输入图像 {}x{}", image.width(), image.height());

    let (frame, params) = self.letterbox.apply(&image);
    let input = frame.to_tensor_bytes(self.input_dtype).ok_or_else(|| {
      InferError::Shape(format!("不支持的输入类型 {:?}", self.input_dtype))
    })?;

    let outputs = self.session.execute(&[&input])?;
    let data = outputs
      .first()
      .and_then(|t| t.to_f32_vec())
      .ok_or_else(|| InferError::Shape(format!("不支持的输出类型 {:?}", self.output_dtype)))?;

    let candidates = decode(&self.layout, &data, thresholds.score);
    Ok(select(candidates, &params, thresholds.iou, thresholds.topk))
  }
}

/// 调用方持有的推理句柄。
///
/// 不提供内部互斥：同一个句柄上的调用必须串行，多路并发请使用多个句柄。
pub struct Pipeline<D: Device, R: Runtime<D>> {
  runtime: R,
  device: D,
  config: PipelineBuilder,
  loaded: Option<Loaded<D, R::Engine>>,
}

impl<D: Device, R: Runtime<D>> Pipeline<D, R> {
  pub fn load_and_warm_up(
    runtime: R,
    device: D,
    config: PipelineBuilder,
  ) -> Result<Self, InferError> {
    config.build(runtime, device)
  }

  pub fn task(&self) -> Task {
    self.config.task()
  }

  pub fn session_state(&self) -> Option<SessionState> {
    self.loaded.as_ref().map(|l| l.session.state())
  }

  pub fn input_size(&self) -> Option<u32> {
    self.loaded.as_ref().map(|l| l.letterbox.target())
  }

  pub fn layout(&self) -> Option<&OutputLayout> {
    self.loaded.as_ref().map(|l| &l.layout)
  }

  pub fn run_detection(
    &mut self,
    image_bytes: &[u8],
    score_thres: f32,
    iou_thres: f32,
    topk: usize,
  ) -> Result<Vec<DetectionResult>, InferError> {
    let thresholds = Thresholds {
      score: score_thres,
      iou: iou_thres,
      topk,
    };
    let loaded = self.loaded.as_mut().ok_or(InferError::NoModel)?;
    let results = loaded.run(image_bytes, &thresholds)?;
    debug!("检测到 {} 个物体", results.len());
    Ok(results.into_iter().map(DetectionResult::from).collect())
  }

  pub fn run_pose(
    &mut self,
    image_bytes: &[u8],
    score_thres: f32,
    iou_thres: f32,
    topk: usize,
  ) -> Result<Vec<PoseResult>, InferError> {
    let thresholds = Thresholds {
      score: score_thres,
      iou: iou_thres,
      topk,
    };
    let loaded = self.loaded.as_mut().ok_or(InferError::NoModel)?;
    if loaded.layout.num_keypoints() == 0 {
      return Err(InferError::TaskMismatch(
        "模型输出不包含关键点".to_string(),
      ));
    }
    let results = loaded.run(image_bytes, &thresholds)?;
    debug!("检测到 {} 个姿态", results.len());
    Ok(results)
  }

  /// 先完整释放当前会话，再加载新模型；失败时句柄处于无模型状态
  pub fn reload(&mut self, model_path: impl AsRef<Path>) -> Result<(), InferError> {
    self.unload();
    self.config.model_path = model_path.as_ref().to_path_buf();
    info!("重新加载模型: {}", self.config.model_path.display());
    self.loaded = Some(Loaded::load(&self.runtime, &self.device, &self.config)?);
    Ok(())
  }

  pub fn unload(&mut self) {
    if let Some(loaded) = self.loaded.take() {
      loaded.session.destroy();
    }
  }
}

/// 一次推理请求，`source` 只用于日志和输出
#[derive(Debug, Clone)]
pub struct InferRequest {
  pub source: String,
  pub image: Vec<u8>,
  pub thresholds: Thresholds,
}

impl InferRequest {
  pub fn new(source: impl Into<String>, image: Vec<u8>) -> Self {
    Self {
      source: source.into(),
      image,
      thresholds: Thresholds::default(),
    }
  }

  pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
    self.thresholds = thresholds;
    self
  }
}

/// 按任务类型区分的推理结果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum InferOutput {
  Detections(Vec<DetectionResult>),
  Poses(Vec<PoseResult>),
}

impl InferOutput {
  pub fn len(&self) -> usize {
    match self {
      InferOutput::Detections(items) => items.len(),
      InferOutput::Poses(items) => items.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl<D: Device, R: Runtime<D>> Model for Pipeline<D, R> {
  type Input = InferRequest;
  type Output = InferOutput;
  type Error = InferError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let Thresholds { score, iou, topk } = input.thresholds;
    match self.task() {
      Task::Detect => self
        .run_detection(&input.image, score, iou, topk)
        .map(InferOutput::Detections),
      Task::Pose { .. } => self
        .run_pose(&input.image, score, iou, topk)
        .map(InferOutput::Poses),
    }
  }
}
