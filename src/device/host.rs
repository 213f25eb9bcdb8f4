// 该文件是 Shanan （山南西风） 项目的一部分。
// src/device/host.rs - 主机内存模拟设备
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

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

use tracing::{debug, error};

use crate::{
  device::{Device, DeviceMemory, DevicePtr},
  error::BackendError,
};

#[derive(Debug, Default)]
struct HostState {
  budget: Option<usize>,
  reserved: AtomicUsize,
}

/// 用主机内存模拟的设备，可以设置内存上限
#[derive(Debug, Clone, Default)]
pub struct HostDevice {
  state: Arc<HostState>,
}

impl HostDevice {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_budget(budget: usize) -> Self {
    Self {
      state: Arc::new(HostState {
        budget: Some(budget),
        reserved: AtomicUsize::new(0),
      }),
    }
  }

  /// 当前仍被占用的字节数
  pub fn reserved_bytes(&self) -> usize {
    self.state.reserved.load(Ordering::SeqCst)
  }
}

#[derive(Debug)]
pub struct HostBuffer {
  data: Box<[u8]>,
  state: Arc<HostState>,
}

impl DeviceMemory for HostBuffer {
  fn byte_len(&self) -> usize {
    self.data.len()
  }

  fn device_ptr(&self) -> DevicePtr {
    self.data.as_ptr() as DevicePtr
  }
}

impl Drop for HostBuffer {
  fn drop(&mut self) {
    self.state.reserved.fetch_sub(self.data.len(), Ordering::SeqCst);
  }
}

impl Device for HostDevice {
  type Buffer = HostBuffer;

  fn name(&self) -> String {
    "host".to_string()
  }

  fn allocate(&self, bytes: usize) -> Result<Self::Buffer, BackendError> {
    let budget = self.state.budget;
    self
      .state
      .reserved
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |reserved| {
        let next = reserved.checked_add(bytes)?;
        match budget {
          Some(limit) if next > limit => None,
          _ => Some(next),
        }
      })
      .map_err(|reserved| {
        error!(
          "主机内存不足: 请求 {} 字节, 已占用 {} 字节, 上限 {:?}",
          bytes, reserved, budget
        );
        BackendError::OutOfMemory { requested: bytes }
      })?;

    debug!("分配 {} 字节主机内存", bytes);
    Ok(HostBuffer {
      data: vec![0u8; bytes].into_boxed_slice(),
      state: self.state.clone(),
    })
  }

  fn upload(&self, src: &[u8], dst: &mut Self::Buffer) -> Result<(), BackendError> {
    if src.len() != dst.data.len() {
      return Err(BackendError::Device(format!(
        "拷贝大小不匹配: 源 {} 字节, 目标 {} 字节",
        src.len(),
        dst.data.len()
      )));
    }
    dst.data.copy_from_slice(src);
    Ok(())
  }

  fn download(&self, src: &Self::Buffer, dst: &mut [u8]) -> Result<(), BackendError> {
    if src.data.len() != dst.len() {
      return Err(BackendError::Device(format!(
        "拷贝大小不匹配: 源 {} 字节, 目标 {} 字节",
        src.data.len(),
        dst.len()
      )));
    }
    dst.copy_from_slice(&src.data);
    Ok(())
  }

  fn synchronize(&self) -> Result<(), BackendError> {
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn budget_is_enforced_and_released_on_drop() {
    let device = HostDevice::with_budget(100);
    let a = device.allocate(60).unwrap();
    assert_eq!(device.reserved_bytes(), 60);
    assert_eq!(
      device.allocate(41).unwrap_err(),
      BackendError::OutOfMemory { requested: 41 }
    );
    drop(a);
    assert_eq!(device.reserved_bytes(), 0);
    assert!(device.allocate(100).is_ok());
  }
}
