// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 结果输出
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

use std::{
  fs::File,
  io::{BufWriter, Write},
  path::Path,
};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  output::Render,
  pipeline::{InferOutput, InferRequest},
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("I/O 错误: {0}")]
  IoError(std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl From<std::io::Error> for JsonLinesOutputError {
  fn from(err: std::io::Error) -> Self {
    JsonLinesOutputError::IoError(err)
  }
}

impl From<serde_json::Error> for JsonLinesOutputError {
  fn from(err: serde_json::Error) -> Self {
    JsonLinesOutputError::SerializeError(err)
  }
}

const STDOUT_SCHEME: &str = "stdout";

#[derive(Serialize)]
struct Record<'a> {
  source: &'a str,
  count: usize,
  results: &'a InferOutput,
}

/// 每张图像一行 JSON。
///
/// `json:///path/to/results.jsonl` 写入文件，`stdout:` 写到标准输出。
pub struct JsonLinesOutput {
  writer: Box<dyn Write>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      Self::SCHEME => Self::create(url.path()),
      STDOUT_SCHEME => Ok(Self::stdout()),
      other => Err(JsonLinesOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}' 或 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        STDOUT_SCHEME,
        other
      ))),
    }
  }
}

impl JsonLinesOutput {
  pub fn create(path: impl AsRef<Path>) -> Result<Self, JsonLinesOutputError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    info!("推理结果写入文件: {}", path.display());
    Ok(Self::from_writer(BufWriter::new(file)))
  }

  pub fn stdout() -> Self {
    Self::from_writer(std::io::stdout())
  }

  pub fn from_writer(writer: impl Write + 'static) -> Self {
    Self {
      writer: Box::new(writer),
    }
  }
}

impl Render<InferRequest, InferOutput> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(
    &mut self,
    frame: &InferRequest,
    result: &InferOutput,
  ) -> Result<(), Self::Error> {
    let record = Record {
      source: &frame.source,
      count: result.len(),
      results: result,
    };
    serde_json::to_writer(&mut self.writer, &record)?;
    self.writer.write_all(b"\n")?;
    self.writer.flush()?;
    debug!("写出 {} 的 {} 个结果", frame.source, result.len());
    Ok(())
  }
}
