// 该文件是 Shanan （山南西风） 项目的一部分。
// src/frame.rs - NCHW 帧定义
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

use image::RgbImage;

use crate::engine::DataType;

const RGB_CHANNELS: usize = 3;

/// 模型输入帧，RGB 顺序，NCHW 排列，数值归一化到 [0, 1]
#[derive(Debug, Clone)]
pub struct RgbNchwFrame {
  size: usize,
  data: Box<[f32]>,
}

impl RgbNchwFrame {
  pub fn height(&self) -> usize {
    self.size
  }

  pub fn width(&self) -> usize {
    self.size
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_nchw(&self) -> &[f32] {
    &self.data
  }

  /// 按输入绑定的元素类型序列化，u8 输入保留 0..255 的原始像素值
  pub fn to_tensor_bytes(&self, dtype: DataType) -> Option<Vec<u8>> {
    match dtype {
      DataType::F32 => Some(self.data.iter().flat_map(|v| v.to_le_bytes()).collect()),
      DataType::F16 => Some(
        self
          .data
          .iter()
          .flat_map(|&v| half::f16::from_f32(v).to_le_bytes())
          .collect(),
      ),
      DataType::U8 => Some(
        self
          .data
          .iter()
          .map(|&v| (v * 255.0).round().clamp(0.0, 255.0) as u8)
          .collect(),
      ),
      _ => None,
    }
  }
}

impl From<&RgbImage> for RgbNchwFrame {
  fn from(image: &RgbImage) -> Self {
    let (width, height) = image.dimensions();
    assert_eq!(width, height, "输入帧必须是正方形");
    let size = width as usize;
    let plane = size * size;
    let mut data = vec![0.0f32; RGB_CHANNELS * plane].into_boxed_slice();

    for (x, y, pixel) in image.enumerate_pixels() {
      let offset = (y as usize) * size + (x as usize);
      for c in 0..RGB_CHANNELS {
        data[c * plane + offset] = pixel[c] as f32 / 255.0;
      }
    }

    Self { size, data }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn channels_are_planar() {
    let mut image = RgbImage::from_pixel(2, 2, Rgb([0, 0, 0]));
    image.put_pixel(1, 0, Rgb([255, 51, 0]));
    let frame = RgbNchwFrame::from(&image);
    let data = frame.as_nchw();
    assert_eq!(data.len(), 12);
    assert_eq!(data[1], 1.0);
    assert!((data[4 + 1] - 0.2).abs() < 1e-6);
    assert_eq!(data[8 + 1], 0.0);
  }

  #[test]
  fn u8_bytes_restore_pixels() {
    let image = RgbImage::from_pixel(2, 2, Rgb([114, 114, 114]));
    let frame = RgbNchwFrame::from(&image);
    let bytes = frame.to_tensor_bytes(DataType::U8).unwrap();
    assert!(bytes.iter().all(|&b| b == 114));
    assert_eq!(frame.to_tensor_bytes(DataType::F32).unwrap().len(), 12 * 4);
    assert!(frame.to_tensor_bytes(DataType::I32).is_none());
  }
}
