// 该文件是 Shanan （山南西风） 项目的一部分。
// src/buffer.rs - 主机/设备缓冲区管理
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

use tracing::{debug, error, info};

use crate::{
  device::{Device, DeviceMemory},
  engine::TensorBinding,
  error::{BackendError, InferError},
};

/// 每个张量绑定对应一对主机缓冲区和设备缓冲区，按绑定顺序索引。
///
/// 缓冲区在创建时一次性分配，大小与绑定的字节数完全一致，之后不再改变。
/// 分配中途失败时，已经分配的部分随 `Vec` 一起释放，不会留下半初始化的状态。
pub struct BufferArena<D: Device> {
  device: D,
  bindings: Box<[TensorBinding]>,
  hosts: Vec<Box<[u8]>>,
  devices: Vec<D::Buffer>,
}

fn host_zeroed(bytes: usize) -> Result<Box<[u8]>, InferError> {
  let mut host = Vec::new();
  host.try_reserve_exact(bytes).map_err(|e| {
    error!("主机内存分配失败 ({} 字节): {}", bytes, e);
    InferError::Allocation(BackendError::OutOfMemory { requested: bytes })
  })?;
  host.resize(bytes, 0u8);
  Ok(host.into_boxed_slice())
}

impl<D: Device> BufferArena<D> {
  pub fn allocate(device: &D, bindings: &[TensorBinding]) -> Result<Self, InferError> {
    let mut hosts = Vec::with_capacity(bindings.len());
    let mut devices = Vec::with_capacity(bindings.len());

    for binding in bindings {
      let bytes = binding.byte_size();
      debug!(
        "为绑定 {} 分配缓冲区: 形状 {:?}, {} 字节",
        binding.name(),
        binding.shape(),
        bytes
      );
      hosts.push(host_zeroed(bytes)?);
      let buffer = device.allocate(bytes).map_err(|e| {
        error!("绑定 {} 的设备内存分配失败: {}", binding.name(), e);
        InferError::Allocation(e)
      })?;
      debug_assert_eq!(buffer.byte_len(), bytes);
      devices.push(buffer);
    }

    let arena = Self {
      device: device.clone(),
      bindings: bindings.into(),
      hosts,
      devices,
    };
    info!(
      "在设备 {} 上分配 {} 对缓冲区, 共 {} 字节",
      device.name(),
      arena.len(),
      arena.total_bytes()
    );
    Ok(arena)
  }

  pub fn len(&self) -> usize {
    self.bindings.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bindings.is_empty()
  }

  pub fn bindings(&self) -> &[TensorBinding] {
    &self.bindings
  }

  /// 主机端与设备端合计的字节数
  pub fn total_bytes(&self) -> usize {
    self.bindings.iter().map(|b| b.byte_size() * 2).sum()
  }

  pub fn write_input(&mut self, index: usize, data: &[u8]) {
    let binding = &self.bindings[index];
    assert!(binding.is_input(), "绑定 {} 不是输入张量", binding.name());
    assert_eq!(
      data.len(),
      binding.byte_size(),
      "绑定 {} 的输入数据长度不匹配",
      binding.name()
    );
    self.hosts[index].copy_from_slice(data);
  }

  pub fn zero_inputs(&mut self) {
    for (binding, host) in self.bindings.iter().zip(self.hosts.iter_mut()) {
      if binding.is_input() {
        host.fill(0);
      }
    }
  }

  pub fn read_output(&self, index: usize) -> &[u8] {
    let binding = &self.bindings[index];
    assert!(!binding.is_input(), "绑定 {} 不是输出张量", binding.name());
    &self.hosts[index]
  }

  pub fn upload_inputs(&mut self) -> Result<(), BackendError> {
    for ((binding, host), buffer) in self
      .bindings
      .iter()
      .zip(self.hosts.iter())
      .zip(self.devices.iter_mut())
    {
      if binding.is_input() {
        self.device.upload(host, buffer)?;
      }
    }
    Ok(())
  }

  pub fn download_outputs(&mut self) -> Result<(), BackendError> {
    for ((binding, host), buffer) in self
      .bindings
      .iter()
      .zip(self.hosts.iter_mut())
      .zip(self.devices.iter())
    {
      if !binding.is_input() {
        self.device.download(buffer, host)?;
      }
    }
    Ok(())
  }

  pub fn device_buffers_mut(&mut self) -> &mut [D::Buffer] {
    &mut self.devices
  }
}
