// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/session.rs - 推理会话
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

use tracing::{debug, error, info, warn};

use crate::{
  buffer::BufferArena,
  device::Device,
  engine::{Engine, HostTensor, Runtime, TensorBinding, TensorIo},
  error::InferError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
  Loaded,
  BuffersBound,
  WarmedUp,
  Ready,
  /// 执行失败后会话可能已损坏，需要重新加载
  Faulted,
}

/// 持有已加载网络、执行上下文和全部缓冲区的会话。
///
/// 会话不可重入：同一时刻只能有一次 `execute`。释放会话即释放全部主机与设备内存。
pub struct Session<D: Device, E: Engine<D>> {
  // 缓冲区先于网络释放
  buffers: Option<BufferArena<D>>,
  engine: E,
  device: D,
  path: PathBuf,
  bindings: Box<[TensorBinding]>,
  order: Box<[usize]>,
  batch: usize,
  state: SessionState,
}

impl<D: Device, E: Engine<D>> Session<D, E> {
  pub fn load<R>(runtime: &R, device: &D, path: &Path) -> Result<Self, InferError>
  where
    R: Runtime<D, Engine = E>,
  {
    info!("加载模型文件: {}", path.display());
    let meta = std::fs::metadata(path).map_err(|e| {
      error!("无法读取模型文件 {}: {}", path.display(), e);
      InferError::Load(format!("无法读取模型文件 {}: {}", path.display(), e))
    })?;
    if !meta.is_file() {
      error!("模型路径不是文件: {}", path.display());
      return Err(InferError::Load(format!(
        "模型路径不是文件: {}",
        path.display()
      )));
    }
    debug!(
      "模型文件大小: {:.2} MB",
      meta.len() as f64 / (1024.0 * 1024.0)
    );

    info!("在设备 {} 上创建推理上下文", device.name());
    let engine = runtime.load(device, path).map_err(|e| {
      error!("模型加载失败: {}", e);
      InferError::load("模型加载失败", e)
    })?;

    let tensors = engine.tensors();
    // 输入在前、输出在后，同类保持模型文件中的顺序
    let mut order: Vec<usize> = (0..tensors.len()).collect();
    order.sort_by_key(|&i| tensors[i].io != TensorIo::Input);

    let mut bindings = Vec::with_capacity(order.len());
    for &i in &order {
      let binding = TensorBinding::try_from(&tensors[i]).inspect_err(|e| {
        error!("{}", e);
      })?;
      debug!(
        "绑定 {}: {:?} {:?} {:?}, {} 字节",
        binding.name(),
        binding.io(),
        binding.shape(),
        binding.dtype(),
        binding.byte_size()
      );
      bindings.push(binding);
    }

    let num_inputs = bindings.iter().filter(|b| b.is_input()).count();
    let num_outputs = bindings.len() - num_inputs;
    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);
    if num_inputs == 0 || num_outputs == 0 {
      error!(
        "模型至少需要一个输入和一个输出, 实际输入 {}, 输出 {}",
        num_inputs, num_outputs
      );
      return Err(InferError::Shape(format!(
        "模型至少需要一个输入和一个输出, 实际输入 {}, 输出 {}",
        num_inputs, num_outputs
      )));
    }

    let batch = bindings[0].shape()[0];
    info!("模型加载完成");

    Ok(Session {
      buffers: None,
      engine,
      device: device.clone(),
      path: path.to_path_buf(),
      bindings: bindings.into_boxed_slice(),
      order: order.into_boxed_slice(),
      batch,
      state: SessionState::Loaded,
    })
  }

  /// 输入在前、输出在后的张量绑定
  pub fn bindings(&self) -> &[TensorBinding] {
    &self.bindings
  }

  pub fn inputs(&self) -> impl Iterator<Item = (usize, &TensorBinding)> {
    self.bindings.iter().enumerate().filter(|(_, b)| b.is_input())
  }

  pub fn outputs(&self) -> impl Iterator<Item = (usize, &TensorBinding)> {
    self.bindings.iter().enumerate().filter(|(_, b)| !b.is_input())
  }

  pub fn state(&self) -> SessionState {
    self.state
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn batch(&self) -> usize {
    self.batch
  }

  pub fn bind_buffers(&mut self) -> Result<(), InferError> {
    assert_eq!(self.state, SessionState::Loaded, "缓冲区只能绑定一次");
    self.buffers = Some(BufferArena::allocate(&self.device, &self.bindings)?);
    self.state = SessionState::BuffersBound;
    Ok(())
  }

  /// 用全零输入执行若干次，丢弃输出
  pub fn warm_up(&mut self, iterations: usize) -> Result<(), InferError> {
    self.ensure_runnable()?;
    info!("预热模型 {} 次", iterations);
    let now = std::time::Instant::now();
    if let Some(buffers) = self.buffers.as_mut() {
      buffers.zero_inputs();
    }
    for i in 0..iterations {
      self.run_once()?;
      debug!("({}) 预热完成", i);
    }
    info!("预热完成，耗时: {:.2?}", now.elapsed());
    self.state = SessionState::WarmedUp;
    Ok(())
  }

  /// 同步执行：拷入输入、执行网络、拷出输出，返回时设备上没有未完成的工作
  pub fn execute(&mut self, inputs: &[&[u8]]) -> Result<Vec<HostTensor>, InferError> {
    self.ensure_runnable()?;

    let input_indices: Vec<usize> = self.inputs().map(|(i, _)| i).collect();
    assert_eq!(
      inputs.len(),
      input_indices.len(),
      "输入数量不匹配: 期望 {}",
      input_indices.len()
    );
    if let Some(buffers) = self.buffers.as_mut() {
      for (&index, data) in input_indices.iter().zip(inputs) {
        buffers.write_input(index, data);
      }
    }

    debug!("执行模型推理");
    self.run_once()?;
    self.state = SessionState::Ready;

    debug!("获取模型输出");
    let outputs = match self.buffers.as_ref() {
      Some(buffers) => self
        .outputs()
        .map(|(index, binding)| HostTensor::new(binding.clone(), buffers.read_output(index).to_vec()))
        .collect(),
      None => Vec::new(),
    };
    Ok(outputs)
  }

  /// 显式释放会话
  pub fn destroy(self) {
    drop(self)
  }

  fn ensure_runnable(&self) -> Result<(), InferError> {
    match self.state {
      SessionState::Loaded => panic!("在绑定缓冲区之前执行推理"),
      SessionState::Faulted => {
        warn!("会话已损坏，拒绝执行: {}", self.path.display());
        Err(InferError::Exec("会话已损坏，需要重新加载模型".to_string()))
      }
      _ => Ok(()),
    }
  }

  fn run_once(&mut self) -> Result<(), InferError> {
    let Some(buffers) = self.buffers.as_mut() else {
      panic!("在绑定缓冲区之前执行推理");
    };

    let result = buffers
      .upload_inputs()
      .and_then(|_| {
        self
          .engine
          .execute(&self.device, buffers.device_buffers_mut(), &self.order, self.batch)
      })
      .and_then(|_| self.device.synchronize())
      .and_then(|_| buffers.download_outputs());

    result.map_err(|e| {
      error!("推理执行失败: {}", e);
      self.state = SessionState::Faulted;
      InferError::Exec(e.to_string())
    })
  }
}

impl<D: Device, E: Engine<D>> Drop for Session<D, E> {
  fn drop(&mut self) {
    info!("释放会话: {}", self.path.display());
  }
}
