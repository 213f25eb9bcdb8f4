// 该文件是 Shanan （山南西风） 项目的一部分。
// src/error.rs - 错误定义
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

use thiserror::Error;

/// 外部运行时或设备报告的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
  #[error("模型文件损坏或无法解析: {0}")]
  Artifact(String),
  #[error("模型与当前运行时不兼容: {0}")]
  Incompatible(String),
  #[error("设备内存不足: 请求 {requested} 字节")]
  OutOfMemory { requested: usize },
  #[error("设备错误: {0}")]
  Device(String),
}

/// 推理流程的错误分类
#[derive(Error, Debug)]
pub enum InferError {
  #[error("模型加载错误: {0}")]
  Load(String),
  #[error("张量形状错误: {0}")]
  Shape(String),
  #[error("内存分配错误: {0}")]
  Allocation(BackendError),
  #[error("图像解码错误: {0}")]
  Decode(image::ImageError),
  #[error("推理执行错误: {0}")]
  Exec(String),
  #[error("没有已加载的模型")]
  NoModel,
  #[error("任务类型不匹配: {0}")]
  TaskMismatch(String),
}

impl From<image::ImageError> for InferError {
  fn from(err: image::ImageError) -> Self {
    InferError::Decode(err)
  }
}

/// 区分只影响单次调用的错误
pub trait Recoverable {
  fn is_recoverable(&self) -> bool;
}

impl Recoverable for InferError {
  fn is_recoverable(&self) -> bool {
    InferError::is_recoverable(self)
  }
}

impl InferError {
  pub fn load(msg: &str, e: BackendError) -> Self {
    InferError::Load(format!("{}: {}", msg, e))
  }

  pub fn shape(binding: &str, msg: &str) -> Self {
    InferError::Shape(format!("{}: {}", binding, msg))
  }

  /// 单次调用失败，会话仍可继续使用
  pub fn is_recoverable(&self) -> bool {
    matches!(self, InferError::Decode(_))
  }

  /// 会话可能已损坏，调用方需要重新加载模型
  pub fn requires_reload(&self) -> bool {
    matches!(self, InferError::Exec(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_decode_is_recoverable() {
    let decode = InferError::Decode(image::ImageError::IoError(std::io::Error::other("x")));
    assert!(decode.is_recoverable());
    assert!(!decode.requires_reload());

    let exec = InferError::Exec("device lost".to_string());
    assert!(!exec.is_recoverable());
    assert!(exec.requires_reload());

    assert!(!InferError::NoModel.is_recoverable());
  }

  #[test]
  fn load_error_keeps_backend_message() {
    let err = InferError::load("无法加载", BackendError::Incompatible("v2".into()));
    assert!(err.to_string().contains("v2"));
  }
}
