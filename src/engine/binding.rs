// 该文件是 Shanan （山南西风） 项目的一部分。
// src/engine/binding.rs - 张量绑定定义
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

use serde::{Deserialize, Serialize};

use crate::error::InferError;

/// 张量元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
  F32,
  F16,
  I32,
  I8,
  U8,
  Bool,
}

impl DataType {
  pub fn size(&self) -> usize {
    match self {
      DataType::F32 | DataType::I32 => 4,
      DataType::F16 => 2,
      DataType::I8 | DataType::U8 | DataType::Bool => 1,
    }
  }
}

/// 张量方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorIo {
  Input,
  Output,
}

/// 运行时声明的张量，维度为 -1 表示未确定的动态维度
#[derive(Debug, Clone, PartialEq)]
pub struct TensorDesc {
  pub name: String,
  pub dims: Vec<i64>,
  pub dtype: DataType,
  pub io: TensorIo,
}

/// 已确定形状的张量绑定，模型加载后不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorBinding {
  name: String,
  shape: Box<[usize]>,
  dtype: DataType,
  io: TensorIo,
}

impl TensorBinding {
  pub fn new(name: &str, shape: &[usize], dtype: DataType, io: TensorIo) -> Self {
    Self {
      name: name.to_string(),
      shape: shape.into(),
      dtype,
      io,
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn dtype(&self) -> DataType {
    self.dtype
  }

  pub fn io(&self) -> TensorIo {
    self.io
  }

  pub fn is_input(&self) -> bool {
    self.io == TensorIo::Input
  }

  pub fn element_count(&self) -> usize {
    self.shape.iter().product()
  }

  pub fn byte_size(&self) -> usize {
    self.element_count() * self.dtype.size()
  }
}

impl TryFrom<&TensorDesc> for TensorBinding {
  type Error = InferError;

  fn try_from(desc: &TensorDesc) -> Result<Self, Self::Error> {
    let mut shape = Vec::with_capacity(desc.dims.len());
    for (axis, &dim) in desc.dims.iter().enumerate() {
      if dim <= 0 {
        return Err(InferError::shape(
          &desc.name,
          &format!("第 {} 维未确定 ({}), 形状 {:?}", axis, dim, desc.dims),
        ));
      }
      shape.push(dim as usize);
    }
    if shape.is_empty() {
      return Err(InferError::shape(&desc.name, "标量张量无法绑定"));
    }

    Ok(TensorBinding::new(&desc.name, &shape, desc.dtype, desc.io))
  }
}

/// 从设备拷回主机的输出张量，调用方独占这份拷贝
#[derive(Debug, Clone)]
pub struct HostTensor {
  binding: TensorBinding,
  data: Vec<u8>,
}

impl HostTensor {
  pub fn new(binding: TensorBinding, data: Vec<u8>) -> Self {
    assert_eq!(
      data.len(),
      binding.byte_size(),
      "张量 {} 的数据长度不匹配",
      binding.name()
    );
    Self { binding, data }
  }

  pub fn binding(&self) -> &TensorBinding {
    &self.binding
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.data
  }

  /// 浮点类型的张量转换为 f32，其他类型返回 None
  pub fn to_f32_vec(&self) -> Option<Vec<f32>> {
    match self.binding.dtype() {
      DataType::F32 => Some(
        self
          .data
          .chunks_exact(4)
          .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
          .collect(),
      ),
      DataType::F16 => Some(
        self
          .data
          .chunks_exact(2)
          .map(|c| half::f16::from_le_bytes([c[0], c[1]]).to_f32())
          .collect(),
      ),
      _ => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn desc(dims: &[i64]) -> TensorDesc {
    TensorDesc {
      name: "output0".to_string(),
      dims: dims.to_vec(),
      dtype: DataType::F16,
      io: TensorIo::Output,
    }
  }

  #[test]
  fn byte_size_follows_shape_and_dtype() {
    let binding = TensorBinding::try_from(&desc(&[1, 56, 8400])).unwrap();
    assert_eq!(binding.element_count(), 56 * 8400);
    assert_eq!(binding.byte_size(), 56 * 8400 * 2);
    assert!(!binding.is_input());
  }

  #[test]
  fn half_precision_output_widens_to_f32() {
    let binding = TensorBinding::new("output0", &[1, 2], DataType::F16, TensorIo::Output);
    let mut data = half::f16::from_f32(0.5).to_le_bytes().to_vec();
    data.extend_from_slice(&half::f16::from_f32(-2.0).to_le_bytes());
    let tensor = HostTensor::new(binding, data);
    assert_eq!(tensor.to_f32_vec(), Some(vec![0.5, -2.0]));
  }

  #[test]
  fn dynamic_dims_are_rejected() {
    let err = TensorBinding::try_from(&desc(&[-1, 84, 8400])).unwrap_err();
    assert!(matches!(err, InferError::Shape(_)));
  }
}
