// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/simple_oneshot.rs - 单次图像推理
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

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use shanan_trt::{
  FromUrl, PipelineBuilder, Thresholds,
  catalog::ModelCatalog,
  device::Device,
  engine::ReplayRuntime,
  input::ImageFileInput,
  output::JsonLinesOutput,
  task::{OneShotTask, Task},
};
use tracing::info;

/// Shanan 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 回放清单形式的模型路径，例如 yolo-pose:///opt/engines/yolo11n-pose.json
  #[arg(long, value_name = "MODEL", required_unless_present = "catalog")]
  pub model: Option<Url>,
  /// 模型清单文件
  #[arg(long, value_name = "CATALOG", requires = "name", conflicts_with = "model")]
  pub catalog: Option<PathBuf>,
  /// 模型清单中的模型名称
  #[arg(long, value_name = "NAME")]
  pub name: Option<String>,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,
  /// 置信度阈值
  #[arg(long, default_value_t = 0.25)]
  pub score: f32,
  /// NMS IoU 阈值
  #[arg(long, default_value_t = 0.65)]
  pub iou: f32,
  /// 最多保留的结果数量
  #[arg(long, default_value_t = 100)]
  pub topk: usize,
  /// CUDA 设备序号
  #[cfg(feature = "cuda")]
  #[arg(long, value_name = "ORDINAL")]
  pub cuda: Option<usize>,
}

impl Args {
  fn builder(&self) -> Result<PipelineBuilder> {
    match (&self.model, &self.catalog, &self.name) {
      (Some(model), _, _) => Ok(PipelineBuilder::from_url(model)?),
      (None, Some(catalog), Some(name)) => Ok(ModelCatalog::from_path(catalog)?.builder(name)?),
      _ => Err(anyhow::anyhow!("必须指定 --model 或 --catalog 与 --name")),
    }
  }

  fn thresholds(&self) -> Thresholds {
    Thresholds {
      score: self.score,
      iou: self.iou,
      topk: self.topk,
    }
  }
}

fn run<D: Device>(args: &Args, device: D) -> Result<()> {
  let input = ImageFileInput::from_url(&args.input)?.thresholds(args.thresholds());
  let model = args.builder()?.build(ReplayRuntime, device)?;
  let output = JsonLinesOutput::from_url(&args.output)?;

  let count = OneShotTask.run_task(input.into_requests(), model, output)?;
  info!("共处理 {} 张图像", count);
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型文件路径: {:?}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  #[cfg(feature = "cuda")]
  if let Some(ordinal) = args.cuda {
    let device = shanan_trt::device::CudaDevice::new(ordinal)?;
    return run(&args, device);
  }

  run(&args, shanan_trt::device::HostDevice::new())
}
