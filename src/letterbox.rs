// 该文件是 Shanan （山南西风） 项目的一部分。
// src/letterbox.rs - 保持长宽比的缩放与坐标逆变换
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

use image::{Rgb, RgbImage, imageops::FilterType};
use tracing::debug;

use crate::frame::RgbNchwFrame;

/// 填充像素值（中灰）
pub const LETTERBOX_PAD_VALUE: u8 = 114;

/// 缩放后图像在画布上的放置位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PadAnchor {
  /// 放在左上角，填充只出现在右侧和下方
  #[default]
  TopLeft,
  /// 居中放置
  Center,
}

/// 小于 `limit` 的最大 f32
fn below(limit: f32) -> f32 {
  if limit > 0.0 {
    f32::from_bits(limit.to_bits() - 1)
  } else {
    0.0
  }
}

/// 单次推理的预处理参数，后处理的坐标还原依赖它
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessParams {
  /// 输入尺寸 / 原图尺寸，两个方向相同
  pub scale: f32,
  pub pad_x: f32,
  pub pad_y: f32,
  pub orig_width: u32,
  pub orig_height: u32,
  pub resized_width: u32,
  pub resized_height: u32,
  pub target: u32,
}

impl PreprocessParams {
  pub fn compute(orig_width: u32, orig_height: u32, target: u32, anchor: PadAnchor) -> Self {
    assert!(
      orig_width > 0 && orig_height > 0 && target > 0,
      "图像尺寸和目标尺寸必须大于 0"
    );

    let scale = (target as f64 / orig_width as f64).min(target as f64 / orig_height as f64);
    let resized_width = ((orig_width as f64 * scale).round() as u32).clamp(1, target);
    let resized_height = ((orig_height as f64 * scale).round() as u32).clamp(1, target);

    let (pad_x, pad_y) = match anchor {
      PadAnchor::TopLeft => (0, 0),
      PadAnchor::Center => ((target - resized_width) / 2, (target - resized_height) / 2),
    };

    Self {
      scale: scale as f32,
      pad_x: pad_x as f32,
      pad_y: pad_y as f32,
      orig_width,
      orig_height,
      resized_width,
      resized_height,
      target,
    }
  }

  /// 原图坐标 -> 输入张量坐标
  pub fn forward(&self, x: f32, y: f32) -> (f32, f32) {
    (x * self.scale + self.pad_x, y * self.scale + self.pad_y)
  }

  /// 输入张量坐标 -> 原图坐标，不做裁剪
  pub fn inverse_unclamped(&self, x: f32, y: f32) -> (f32, f32) {
    ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
  }

  /// 输入张量坐标 -> 原图坐标，裁剪到 `[0, W) x [0, H)`
  pub fn inverse(&self, x: f32, y: f32) -> (f32, f32) {
    let (ox, oy) = self.inverse_unclamped(x, y);
    (
      ox.clamp(0.0, below(self.orig_width as f32)),
      oy.clamp(0.0, below(self.orig_height as f32)),
    )
  }

  /// 将输入张量空间的 `[x, y, w, h]` 还原到原图空间。
  /// 框完全落在原图之外，或裁剪后面积为零时返回 `None`。
  pub fn inverse_box(&self, bbox: [f32; 4]) -> Option<[f32; 4]> {
    let [x, y, w, h] = bbox;
    let (x0, y0) = self.inverse_unclamped(x, y);
    let (x1, y1) = self.inverse_unclamped(x + w, y + h);

    let (fw, fh) = (self.orig_width as f32, self.orig_height as f32);
    if x1 <= 0.0 || y1 <= 0.0 || x0 >= fw || y0 >= fh {
      return None;
    }

    let (x0, x1) = (x0.clamp(0.0, fw), x1.clamp(0.0, fw));
    let (y0, y1) = (y0.clamp(0.0, fh), y1.clamp(0.0, fh));
    if x1 - x0 <= 0.0 || y1 - y0 <= 0.0 {
      return None;
    }
    Some([x0, y0, x1 - x0, y1 - y0])
  }
}

#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
  target: u32,
  anchor: PadAnchor,
  pad_value: u8,
}

impl Letterbox {
  pub fn new(target: u32) -> Self {
    Self {
      target,
      anchor: PadAnchor::default(),
      pad_value: LETTERBOX_PAD_VALUE,
    }
  }

  pub fn anchor(mut self, anchor: PadAnchor) -> Self {
    self.anchor = anchor;
    self
  }

  pub fn pad_value(mut self, pad_value: u8) -> Self {
    self.pad_value = pad_value;
    self
  }

  pub fn target(&self) -> u32 {
    self.target
  }

  pub fn params(&self, width: u32, height: u32) -> PreprocessParams {
    PreprocessParams::compute(width, height, self.target, self.anchor)
  }

  /// 缩放并贴到 S×S 画布上，返回画布图像
  pub fn apply_image(&self, image: &RgbImage) -> (RgbImage, PreprocessParams) {
    let params = self.params(image.width(), image.height());

    let resized = if (params.resized_width, params.resized_height) == image.dimensions() {
      None
    } else {
      // 放大用双三次插值，缩小用线性插值避免混叠
      let filter = if params.scale > 1.0 {
        FilterType::CatmullRom
      } else {
        FilterType::Triangle
      };
      Some(image::imageops::resize(
        image,
        params.resized_width,
        params.resized_height,
        filter,
      ))
    };

    let mut canvas = RgbImage::from_pixel(self.target, self.target, Rgb([self.pad_value; 3]));
    image::imageops::replace(
      &mut canvas,
      resized.as_ref().unwrap_or(image),
      params.pad_x as i64,
      params.pad_y as i64,
    );

    debug!(
      "letterbox: {}x{} -> {}x{}, 缩放 {:.4}, 填充 ({}, {})",
      params.orig_width,
      params.orig_height,
      params.resized_width,
      params.resized_height,
      params.scale,
      params.pad_x,
      params.pad_y
    );
    (canvas, params)
  }

  pub fn apply(&self, image: &RgbImage) -> (RgbNchwFrame, PreprocessParams) {
    let (canvas, params) = self.apply_image(image);
    (RgbNchwFrame::from(&canvas), params)
  }
}
