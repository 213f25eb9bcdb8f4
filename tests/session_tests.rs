// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/session_tests.rs - 推理会话测试
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

use shanan_trt::{
  BackendError, InferError,
  device::{Device, HostDevice},
  engine::{
    DataType, Engine, ReplayManifest, ReplayRuntime, Runtime, Session, SessionState, TensorDesc,
    TensorIo,
  },
};

fn fixture_dir(name: &str) -> PathBuf {
  let dir = std::env::temp_dir().join(format!("shanan-trt-session-{}-{}", name, std::process::id()));
  std::fs::create_dir_all(&dir).unwrap();
  dir
}

fn f32_bytes(values: &[f32]) -> Vec<u8> {
  values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// 输出在清单中排在输入之前
fn write_model(dir: &Path) -> PathBuf {
  let output: Vec<f32> = (0..18).map(|i| i as f32).collect();
  std::fs::write(dir.join("output0.bin"), f32_bytes(&output)).unwrap();

  let path = dir.join("model.json");
  ReplayManifest::default()
    .output(
      "output0",
      &[1, 6, 3],
      DataType::F32,
      Some(Path::new("output0.bin")),
    )
    .input("images", &[1, 3, 4, 4], DataType::F32)
    .save(&path)
    .unwrap();
  path
}

#[test]
fn test_load_orders_inputs_first() {
  let dir = fixture_dir("order");
  let path = write_model(&dir);
  let device = HostDevice::new();
  let session = Session::load(&ReplayRuntime, &device, &path).unwrap();

  assert_eq!(session.state(), SessionState::Loaded);
  assert_eq!(session.batch(), 1);
  let names: Vec<&str> = session.bindings().iter().map(|b| b.name()).collect();
  assert_eq!(names, vec!["images", "output0"]);
  assert_eq!(session.inputs().count(), 1);
  assert_eq!(session.outputs().next().unwrap().0, 1);
  // 绑定缓冲区之前不占用设备内存
  assert_eq!(device.reserved_bytes(), 0);
}

#[test]
fn test_execute_returns_recorded_output() {
  let dir = fixture_dir("execute");
  let path = write_model(&dir);
  let device = HostDevice::new();
  let mut session = Session::load(&ReplayRuntime, &device, &path).unwrap();

  session.bind_buffers().unwrap();
  assert_eq!(session.state(), SessionState::BuffersBound);
  assert_eq!(device.reserved_bytes(), 192 + 72);

  session.warm_up(3).unwrap();
  assert_eq!(session.state(), SessionState::WarmedUp);

  let input = vec![0u8; 192];
  let outputs = session.execute(&[&input]).unwrap();
  assert_eq!(session.state(), SessionState::Ready);
  assert_eq!(outputs.len(), 1);
  assert_eq!(outputs[0].binding().name(), "output0");
  let values = outputs[0].to_f32_vec().unwrap();
  assert_eq!(values[0], 0.0);
  assert_eq!(values[17], 17.0);

  drop(session);
  assert_eq!(device.reserved_bytes(), 0);
}

#[test]
fn test_missing_artifact_is_load_error() {
  let dir = fixture_dir("missing");
  let result = Session::load(&ReplayRuntime, &HostDevice::new(), &dir.join("nope.json"));
  assert!(matches!(result, Err(InferError::Load(_))));
}

#[test]
fn test_corrupt_artifact_is_load_error() {
  let dir = fixture_dir("corrupt");
  let path = dir.join("model.json");
  std::fs::write(&path, b"\x00\x01 definitely not a manifest").unwrap();
  let result = Session::load(&ReplayRuntime, &HostDevice::new(), &path);
  assert!(matches!(result, Err(InferError::Load(_))));
}

#[test]
fn test_incompatible_version_is_load_error() {
  let dir = fixture_dir("version");
  let path = dir.join("model.json");
  std::fs::write(&path, br#"{ "format_version": 2, "bindings": [] }"#).unwrap();
  let result = Session::load(&ReplayRuntime, &HostDevice::new(), &path);
  assert!(matches!(result, Err(InferError::Load(_))));
}

#[test]
fn test_recorded_size_mismatch_is_load_error() {
  let dir = fixture_dir("size");
  std::fs::write(dir.join("short.bin"), [0u8; 10]).unwrap();
  let path = dir.join("model.json");
  ReplayManifest::default()
    .input("images", &[1, 3, 4, 4], DataType::F32)
    .output("output0", &[1, 6, 3], DataType::F32, Some(Path::new("short.bin")))
    .save(&path)
    .unwrap();
  let result = Session::load(&ReplayRuntime, &HostDevice::new(), &path);
  assert!(matches!(result, Err(InferError::Load(_))));
}

#[test]
fn test_dynamic_dimension_is_shape_error() {
  let dir = fixture_dir("dynamic");
  let path = dir.join("model.json");
  ReplayManifest::default()
    .input("images", &[-1, 3, 640, 640], DataType::F32)
    .output("output0", &[1, 84, 8400], DataType::F32, None)
    .save(&path)
    .unwrap();
  let result = Session::load(&ReplayRuntime, &HostDevice::new(), &path);
  assert!(matches!(result, Err(InferError::Shape(_))));
}

#[test]
fn test_model_without_output_is_shape_error() {
  let dir = fixture_dir("no-output");
  let path = dir.join("model.json");
  ReplayManifest::default()
    .input("images", &[1, 3, 4, 4], DataType::F32)
    .save(&path)
    .unwrap();
  let result = Session::load(&ReplayRuntime, &HostDevice::new(), &path);
  assert!(matches!(result, Err(InferError::Shape(_))));
}

#[test]
fn test_bind_over_budget_is_allocation_error() {
  let dir = fixture_dir("budget");
  let path = write_model(&dir);
  let device = HostDevice::with_budget(100);
  let mut session = Session::load(&ReplayRuntime, &device, &path).unwrap();
  assert!(matches!(
    session.bind_buffers(),
    Err(InferError::Allocation(BackendError::OutOfMemory { .. }))
  ));
  assert_eq!(device.reserved_bytes(), 0);
}

#[test]
#[should_panic]
fn test_execute_before_bind_panics() {
  let dir = fixture_dir("unbound");
  let path = write_model(&dir);
  let mut session = Session::load(&ReplayRuntime, &HostDevice::new(), &path).unwrap();
  let input = vec![0u8; 192];
  let _ = session.execute(&[&input]);
}

/// 第 `fail_at` 次执行时报告设备丢失
struct FlakyRuntime {
  fail_at: usize,
}

struct FlakyEngine {
  fail_at: usize,
  executions: usize,
}

impl Runtime<HostDevice> for FlakyRuntime {
  type Engine = FlakyEngine;

  fn load(&self, _device: &HostDevice, _path: &Path) -> Result<FlakyEngine, BackendError> {
    Ok(FlakyEngine {
      fail_at: self.fail_at,
      executions: 0,
    })
  }
}

impl Engine<HostDevice> for FlakyEngine {
  fn tensors(&self) -> Vec<TensorDesc> {
    vec![
      TensorDesc {
        name: "images".to_string(),
        dims: vec![1, 3, 4, 4],
        dtype: DataType::F32,
        io: TensorIo::Input,
      },
      TensorDesc {
        name: "output0".to_string(),
        dims: vec![1, 6, 3],
        dtype: DataType::F32,
        io: TensorIo::Output,
      },
    ]
  }

  fn execute(
    &mut self,
    device: &HostDevice,
    buffers: &mut [<HostDevice as Device>::Buffer],
    _order: &[usize],
    _batch: usize,
  ) -> Result<(), BackendError> {
    self.executions += 1;
    if self.executions == self.fail_at {
      return Err(BackendError::Device("device lost".to_string()));
    }
    device.upload(&[1u8; 72], &mut buffers[1])
  }
}

#[test]
fn test_exec_failure_latches_fault() {
  let dir = fixture_dir("flaky");
  let path = write_model(&dir);
  let device = HostDevice::new();
  let mut session = Session::load(&FlakyRuntime { fail_at: 3 }, &device, &path).unwrap();
  session.bind_buffers().unwrap();
  session.warm_up(1).unwrap();

  let input = vec![0u8; 192];
  assert!(session.execute(&[&input]).is_ok());

  let err = session.execute(&[&input]).unwrap_err();
  assert!(err.requires_reload());
  assert_eq!(session.state(), SessionState::Faulted);

  // 引擎本身已经恢复，但会话不再接受调用
  assert!(matches!(session.execute(&[&input]), Err(InferError::Exec(_))));

  session.destroy();
  assert_eq!(device.reserved_bytes(), 0);
}

#[test]
fn test_warm_up_failure_faults_session() {
  let dir = fixture_dir("flaky-warmup");
  let path = write_model(&dir);
  let mut session = Session::load(&FlakyRuntime { fail_at: 2 }, &HostDevice::new(), &path).unwrap();
  session.bind_buffers().unwrap();
  assert!(matches!(session.warm_up(5), Err(InferError::Exec(_))));
  assert_eq!(session.state(), SessionState::Faulted);
}
