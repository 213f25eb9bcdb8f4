// 该文件是 Shanan （山南西风） 项目的一部分。
// src/device/cuda.rs - CUDA 设备内存
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

use std::sync::Arc;

use cudarc::driver::{self, CudaSlice, DevicePtr as _, DriverError, sys::CUresult};
use tracing::{debug, error, info};

use crate::{
  device::{Device, DeviceMemory, DevicePtr},
  error::BackendError,
};

/// CUDA 设备，拷贝均为同步拷贝
#[derive(Clone)]
pub struct CudaDevice {
  ordinal: usize,
  inner: Arc<driver::CudaDevice>,
}

pub struct CudaBuffer {
  slice: CudaSlice<u8>,
}

fn device_error(err: DriverError) -> BackendError {
  BackendError::Device(err.to_string())
}

impl CudaDevice {
  pub fn new(ordinal: usize) -> Result<Self, BackendError> {
    info!("打开 CUDA 设备 {}", ordinal);
    let inner = driver::CudaDevice::new(ordinal).map_err(|e| {
      error!("无法打开 CUDA 设备 {}: {}", ordinal, e);
      BackendError::Incompatible(e.to_string())
    })?;
    Ok(Self { ordinal, inner })
  }

  pub fn ordinal(&self) -> usize {
    self.ordinal
  }
}

impl DeviceMemory for CudaBuffer {
  fn byte_len(&self) -> usize {
    self.slice.len()
  }

  fn device_ptr(&self) -> DevicePtr {
    *self.slice.device_ptr()
  }
}

impl Device for CudaDevice {
  type Buffer = CudaBuffer;

  fn name(&self) -> String {
    format!("cuda:{}", self.ordinal)
  }

  fn allocate(&self, bytes: usize) -> Result<Self::Buffer, BackendError> {
    let slice = self.inner.alloc_zeros::<u8>(bytes).map_err(|e| {
      error!("CUDA 内存分配失败 ({} 字节): {}", bytes, e);
      match e.0 {
        CUresult::CUDA_ERROR_OUT_OF_MEMORY => BackendError::OutOfMemory { requested: bytes },
        _ => device_error(e),
      }
    })?;
    debug!("分配 {} 字节 CUDA 内存", bytes);
    Ok(CudaBuffer { slice })
  }

  fn upload(&self, src: &[u8], dst: &mut Self::Buffer) -> Result<(), BackendError> {
    self
      .inner
      .htod_sync_copy_into(src, &mut dst.slice)
      .map_err(device_error)
  }

  fn download(&self, src: &Self::Buffer, dst: &mut [u8]) -> Result<(), BackendError> {
    self
      .inner
      .dtoh_sync_copy_into(&src.slice, dst)
      .map_err(device_error)
  }

  fn synchronize(&self) -> Result<(), BackendError> {
    self.inner.synchronize().map_err(device_error)
  }
}
