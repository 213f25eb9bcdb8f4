// 该文件是 Shanan （山南西风） 项目的一部分。
// src/catalog.rs - 模型清单
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

//! 部署目录中的 `models.json`：
//!
//! ```json
//! [
//!   { "name": "person", "path": "engines/yolo11n-pose.engine", "type": "yolo-pose-engine" },
//!   { "name": "coco", "path": "engines/yolo11n.engine", "type": "yolo-detect-engine" }
//! ]
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
  error::InferError,
  model::{COCO_KEYPOINTS, Task},
  pipeline::PipelineBuilder,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
  #[serde(rename = "yolo-detect-engine")]
  Detect,
  #[serde(rename = "yolo-pose-engine")]
  Pose,
}

impl ModelKind {
  pub fn task(&self) -> Task {
    match self {
      ModelKind::Detect => Task::Detect,
      ModelKind::Pose => Task::Pose {
        keypoints: COCO_KEYPOINTS,
      },
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
  pub name: String,
  pub path: PathBuf,
  #[serde(rename = "type")]
  pub kind: ModelKind,
}

impl ModelEntry {
  /// 模型路径已经相对清单文件解析过
  pub fn builder(&self) -> PipelineBuilder {
    PipelineBuilder::new(&self.path, self.kind.task())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelCatalog {
  entries: Vec<ModelEntry>,
}

impl ModelCatalog {
  pub fn from_path(path: impl AsRef<Path>) -> Result<Self, InferError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|e| {
      error!("无法读取模型清单 {}: {}", path.display(), e);
      InferError::Load(format!("无法读取模型清单 {}: {}", path.display(), e))
    })?;
    let base = path.parent().unwrap_or_else(|| Path::new(""));
    Self::from_json(&text, base)
  }

  /// 解析清单内容，相对路径以 `base` 为起点
  pub fn from_json(text: &str, base: &Path) -> Result<Self, InferError> {
    let mut entries: Vec<ModelEntry> = serde_json::from_str(text).map_err(|e| {
      error!("模型清单格式错误: {}", e);
      InferError::Load(format!("模型清单格式错误: {}", e))
    })?;

    for entry in &mut entries {
      if entry.path.is_relative() {
        entry.path = base.join(&entry.path);
      }
    }
    info!("模型清单包含 {} 个模型", entries.len());
    Ok(Self { entries })
  }

  pub fn entries(&self) -> &[ModelEntry] {
    &self.entries
  }

  pub fn find(&self, name: &str) -> Option<&ModelEntry> {
    self.entries.iter().find(|e| e.name == name)
  }

  pub fn builder(&self, name: &str) -> Result<PipelineBuilder, InferError> {
    self
      .find(name)
      .map(ModelEntry::builder)
      .ok_or_else(|| InferError::Load(format!("模型清单中没有名为 {} 的模型", name)))
  }
}
