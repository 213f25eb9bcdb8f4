// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/core.rs - 执行后端定义
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

use std::path::Path;

use crate::{device::Device, engine::TensorDesc, error::BackendError};

/// 模型文件加载器：根据路径得到可以直接执行的网络
pub trait Runtime<D: Device> {
  type Engine: Engine<D>;

  fn load(&self, device: &D, path: &Path) -> Result<Self::Engine, BackendError>;
}

/// 已加载的网络
pub trait Engine<D: Device> {
  /// 按模型文件中的顺序列出所有输入输出张量
  fn tensors(&self) -> Vec<TensorDesc>;

  /// `buffers[i]` 对应 `tensors()[order[i]]`。
  /// 返回时输出必须已经写入设备缓冲区，或可以通过 `Device::synchronize` 等待完成。
  fn execute(
    &mut self,
    device: &D,
    buffers: &mut [D::Buffer],
    order: &[usize],
    batch: usize,
  ) -> Result<(), BackendError>;
}
