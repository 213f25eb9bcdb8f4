// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/buffer_tests.rs - 缓冲区管理测试
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

use shanan_trt::{
  BackendError, InferError,
  buffer::BufferArena,
  device::{Device, DeviceMemory, HostDevice},
  engine::{DataType, TensorBinding, TensorIo},
};

fn bindings() -> Vec<TensorBinding> {
  vec![
    TensorBinding::new("images", &[1, 3, 4, 4], DataType::F32, TensorIo::Input),
    TensorBinding::new("output0", &[1, 6, 3], DataType::F16, TensorIo::Output),
  ]
}

#[test]
fn test_allocate_matches_binding_sizes() {
  let device = HostDevice::new();
  let arena = BufferArena::allocate(&device, &bindings()).unwrap();
  assert_eq!(arena.len(), 2);
  assert_eq!(bindings()[0].byte_size(), 192);
  assert_eq!(bindings()[1].byte_size(), 36);
  assert_eq!(arena.total_bytes(), 2 * (192 + 36));
  assert_eq!(device.reserved_bytes(), 192 + 36);

  drop(arena);
  assert_eq!(device.reserved_bytes(), 0);
}

#[test]
fn test_out_of_budget_releases_partial_allocation() {
  // 够放输入，不够放输出
  let device = HostDevice::with_budget(200);
  let result = BufferArena::allocate(&device, &bindings());
  assert!(matches!(
    result,
    Err(InferError::Allocation(BackendError::OutOfMemory { requested: 36 }))
  ));
  assert_eq!(device.reserved_bytes(), 0);
}

#[test]
fn test_input_round_trip_through_device() {
  let device = HostDevice::new();
  let mut arena = BufferArena::allocate(&device, &bindings()).unwrap();
  let data: Vec<u8> = (0..192).map(|i| i as u8).collect();
  arena.write_input(0, &data);
  arena.upload_inputs().unwrap();

  let mut back = vec![0u8; 192];
  device.download(&arena.device_buffers_mut()[0], &mut back).unwrap();
  assert_eq!(back, data);
  assert_eq!(arena.device_buffers_mut()[0].byte_len(), 192);

  arena.zero_inputs();
  arena.upload_inputs().unwrap();
  device.download(&arena.device_buffers_mut()[0], &mut back).unwrap();
  assert!(back.iter().all(|&b| b == 0));
}

#[test]
fn test_output_download() {
  let device = HostDevice::new();
  let mut arena = BufferArena::allocate(&device, &bindings()).unwrap();
  let recorded = vec![7u8; 36];
  device
    .upload(&recorded, &mut arena.device_buffers_mut()[1])
    .unwrap();
  assert!(arena.read_output(1).iter().all(|&b| b == 0));
  arena.download_outputs().unwrap();
  assert_eq!(arena.read_output(1), recorded.as_slice());
}

#[test]
#[should_panic]
fn test_wrong_input_length_panics() {
  let device = HostDevice::new();
  let mut arena = BufferArena::allocate(&device, &bindings()).unwrap();
  arena.write_input(0, &[0u8; 10]);
}

#[test]
#[should_panic]
fn test_write_to_output_panics() {
  let device = HostDevice::new();
  let mut arena = BufferArena::allocate(&device, &bindings()).unwrap();
  arena.write_input(1, &[0u8; 36]);
}

#[test]
fn test_device_upload_size_mismatch_is_error() {
  let device = HostDevice::new();
  let mut buffer = device.allocate(8).unwrap();
  assert!(matches!(
    device.upload(&[0u8; 4], &mut buffer),
    Err(BackendError::Device(_))
  ));
}
