// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/image_file.rs - 图像文件输入
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

use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  pipeline::{InferRequest, Thresholds},
};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("目录中没有图像文件: {0}")]
  Empty(String),
}

impl From<std::io::Error> for ImageFileInputError {
  fn from(err: std::io::Error) -> Self {
    ImageFileInputError::IoError(err)
  }
}

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// `image:///path/to/file.jpg` 或 `image:///path/to/dir`。
///
/// 文件内容原样交给推理流程解码，目录按文件名排序逐个读取。
pub struct ImageFileInput {
  paths: Vec<PathBuf>,
  thresholds: Thresholds,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

fn is_image(path: &Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

impl ImageFileInput {
  pub fn open(path: impl AsRef<Path>) -> Result<Self, ImageFileInputError> {
    let path = path.as_ref();
    let paths = if path.is_dir() {
      let mut paths = Vec::new();
      for entry in std::fs::read_dir(path)? {
        let entry = entry?.path();
        if entry.is_file() && is_image(&entry) {
          paths.push(entry);
        }
      }
      paths.sort();
      if paths.is_empty() {
        return Err(ImageFileInputError::Empty(path.display().to_string()));
      }
      paths
    } else {
      std::fs::metadata(path)?;
      vec![path.to_path_buf()]
    };

    info!("输入 {} 个图像文件", paths.len());
    Ok(Self {
      paths,
      thresholds: Thresholds::default(),
    })
  }

  pub fn thresholds(mut self, thresholds: Thresholds) -> Self {
    self.thresholds = thresholds;
    self
  }

  pub fn len(&self) -> usize {
    self.paths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.paths.is_empty()
  }

  pub fn into_requests(self) -> ImageFileIter {
    ImageFileIter {
      paths: self.paths.into_iter(),
      thresholds: self.thresholds,
    }
  }
}

pub struct ImageFileIter {
  paths: std::vec::IntoIter<PathBuf>,
  thresholds: Thresholds,
}

impl Iterator for ImageFileIter {
  type Item = InferRequest;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.paths.by_ref() {
      match std::fs::read(&path) {
        Ok(bytes) => {
          return Some(
            InferRequest::new(path.display().to_string(), bytes).thresholds(self.thresholds),
          );
        }
        // 读不到的文件跳过，不中断整个目录
        Err(e) => warn!("无法读取图像文件 {}: {}", path.display(), e),
      }
    }
    None
  }
}
