// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/replay.rs - 回放运行时
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

//! 回放运行时：模型文件是一个 JSON 清单，声明张量绑定并引用录制好的输出张量。
//!
//! 执行时把录制的字节原样写入输出缓冲区，没有录制数据的输出写入全零。
//! 用于离线对比已部署模型的输出，以及在没有 GPU 的环境中跑通整条流程。
//!
//! ```json
//! {
//!   "format_version": 1,
//!   "bindings": [
//!     { "name": "images", "shape": [1, 3, 640, 640], "dtype": "f32", "io": "input" },
//!     { "name": "output0", "shape": [1, 84, 8400], "dtype": "f32", "io": "output", "data": "output0.bin" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{
  device::{Device, DeviceMemory},
  engine::{DataType, Engine, Runtime, TensorDesc, TensorIo},
  error::BackendError,
};

pub const REPLAY_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayBinding {
  pub name: String,
  pub shape: Vec<i64>,
  pub dtype: DataType,
  pub io: TensorIo,
  /// 录制的输出张量文件，相对路径以清单所在目录为基准
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayManifest {
  pub format_version: u32,
  pub bindings: Vec<ReplayBinding>,
}

impl Default for ReplayManifest {
  fn default() -> Self {
    Self {
      format_version: REPLAY_FORMAT_VERSION,
      bindings: Vec::new(),
    }
  }
}

impl ReplayManifest {
  pub fn input(mut self, name: &str, shape: &[i64], dtype: DataType) -> Self {
    self.bindings.push(ReplayBinding {
      name: name.to_string(),
      shape: shape.to_vec(),
      dtype,
      io: TensorIo::Input,
      data: None,
    });
    self
  }

  pub fn output(mut self, name: &str, shape: &[i64], dtype: DataType, data: Option<&Path>) -> Self {
    self.bindings.push(ReplayBinding {
      name: name.to_string(),
      shape: shape.to_vec(),
      dtype,
      io: TensorIo::Output,
      data: data.map(Path::to_path_buf),
    });
    self
  }

  pub fn save(&self, path: &Path) -> std::io::Result<()> {
    let json = serde_json::to_vec_pretty(self).map_err(std::io::Error::other)?;
    std::fs::write(path, json)
  }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReplayRuntime;

pub struct ReplayEngine {
  tensors: Vec<TensorDesc>,
  recorded: Vec<Option<Vec<u8>>>,
}

fn expected_bytes(binding: &ReplayBinding) -> Option<usize> {
  binding
    .shape
    .iter()
    .map(|&d| usize::try_from(d).ok().filter(|&d| d > 0))
    .product::<Option<usize>>()
    .map(|n| n * binding.dtype.size())
}

impl<D: Device> Runtime<D> for ReplayRuntime {
  type Engine = ReplayEngine;

  fn load(&self, _device: &D, path: &Path) -> Result<Self::Engine, BackendError> {
    let raw = std::fs::read(path).map_err(|e| BackendError::Artifact(e.to_string()))?;
    let manifest: ReplayManifest =
      serde_json::from_slice(&raw).map_err(|e| BackendError::Artifact(e.to_string()))?;

    if manifest.format_version != REPLAY_FORMAT_VERSION {
      error!(
        "回放清单版本为 {}, 当前支持 {}",
        manifest.format_version, REPLAY_FORMAT_VERSION
      );
      return Err(BackendError::Incompatible(format!(
        "清单版本 {} 不受支持, 期望 {}",
        manifest.format_version, REPLAY_FORMAT_VERSION
      )));
    }

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut recorded = Vec::with_capacity(manifest.bindings.len());
    for binding in &manifest.bindings {
      let data = match (&binding.data, binding.io) {
        (Some(file), TensorIo::Output) => {
          let file = base.join(file);
          debug!("读取录制的输出 {}: {}", binding.name, file.display());
          let bytes = std::fs::read(&file)
            .map_err(|e| BackendError::Artifact(format!("{}: {}", file.display(), e)))?;
          if let Some(expected) = expected_bytes(binding)
            && expected != bytes.len()
          {
            return Err(BackendError::Artifact(format!(
              "输出 {} 的录制数据为 {} 字节, 期望 {} 字节",
              binding.name,
              bytes.len(),
              expected
            )));
          }
          Some(bytes)
        }
        _ => None,
      };
      recorded.push(data);
    }

    let tensors = manifest
      .bindings
      .iter()
      .map(|b| TensorDesc {
        name: b.name.clone(),
        dims: b.shape.clone(),
        dtype: b.dtype,
        io: b.io,
      })
      .collect();

    info!("回放清单加载完成: {} 个张量", manifest.bindings.len());
    Ok(ReplayEngine { tensors, recorded })
  }
}

impl<D: Device> Engine<D> for ReplayEngine {
  fn tensors(&self) -> Vec<TensorDesc> {
    self.tensors.clone()
  }

  fn execute(
    &mut self,
    device: &D,
    buffers: &mut [D::Buffer],
    order: &[usize],
    _batch: usize,
  ) -> Result<(), BackendError> {
    for (buffer, &index) in buffers.iter_mut().zip(order) {
      if self.tensors[index].io != TensorIo::Output {
        continue;
      }
      match &self.recorded[index] {
        Some(bytes) => device.upload(bytes, buffer)?,
        None => device.upload(&vec![0u8; buffer.byte_len()], buffer)?,
      }
    }
    Ok(())
  }
}
