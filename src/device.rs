// 该文件是 Shanan （山南西风） 项目的一部分。
// src/device.rs - 设备内存
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

use crate::error::BackendError;

/// 设备内存地址，交给执行后端绑定
pub type DevicePtr = u64;

/// 一块设备内存，释放时归还给设备
pub trait DeviceMemory {
  fn byte_len(&self) -> usize;
  fn device_ptr(&self) -> DevicePtr;
}

/// 设备能力：分配内存、主机与设备之间的拷贝、流同步
pub trait Device: Clone {
  type Buffer: DeviceMemory;

  fn name(&self) -> String;
  fn allocate(&self, bytes: usize) -> Result<Self::Buffer, BackendError>;
  fn upload(&self, src: &[u8], dst: &mut Self::Buffer) -> Result<(), BackendError>;
  fn download(&self, src: &Self::Buffer, dst: &mut [u8]) -> Result<(), BackendError>;
  fn synchronize(&self) -> Result<(), BackendError>;
}

mod host;
pub use self::host::{HostBuffer, HostDevice};

#[cfg(feature = "cuda")]
mod cuda;
#[cfg(feature = "cuda")]
pub use self::cuda::{CudaBuffer, CudaDevice};
