// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 推理任务
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

use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::{error::Recoverable, model::Model, output::Render};

pub trait Task<I, M, O>: Sized {
  type Error;
  type Output;
  fn run_task(self, input: I, model: M, output: O) -> Result<Self::Output, Self::Error>;
}

/// 每个输入推理一次，可恢复的错误只跳过当前输入
pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Recoverable + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;
  /// 成功推理的输入数量
  type Output = usize;

  fn run_task(self, input: I, mut model: M, mut output: O) -> Result<usize, Self::Error> {
    info!("开始任务...");
    let mut seen = 0;
    let mut count = 0;
    for frame in input {
      seen += 1;
      let now = Instant::now();
      let result = match model.infer(&frame) {
        Ok(result) => result,
        Err(e) if e.is_recoverable() => {
          warn!("({})推理失败，跳过该输入: {}", seen - 1, e);
          continue;
        }
        Err(e) => return Err(e.into()),
      };
      info!("({})推理完成，耗时: {:.2?}", seen - 1, now.elapsed());
      output.render_result(&frame, &result)?;
      count += 1;
    }
    if seen == 0 {
      return Err(anyhow::anyhow!("没有输入帧"));
    }
    info!("任务完成，共处理 {} 个输入，跳过 {} 个", count, seen - count);
    Ok(count)
  }
}

/// 同一个输入重复推理，统计平均耗时
pub struct RepeatShotTask {
  times: usize,
}

/// 统计平均耗时时跳过的前几次推理
pub const REPEAT_SKIP: usize = 2;

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { times: 1000 }
  }
}

impl RepeatShotTask {
  pub fn new(times: usize) -> Self {
    Self { times }
  }

  /// 去掉前 [`REPEAT_SKIP`] 次后的平均耗时，次数不足时返回 `None`
  pub fn mean_latency(times: &[Duration]) -> Option<Duration> {
    let measured = times.get(REPEAT_SKIP..).filter(|t| !t.is_empty())?;
    Some(measured.iter().sum::<Duration>() / measured.len() as u32)
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;
  /// 平均推理耗时
  type Output = Duration;

  fn run_task(self, mut input: I, mut model: M, mut output: O) -> Result<Duration, Self::Error> {
    if self.times <= REPEAT_SKIP {
      return Err(anyhow::anyhow!(
        "重复次数必须大于 {}, 实际为 {}",
        REPEAT_SKIP,
        self.times
      ));
    }

    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.times);
    let mut last = None;
    for i in 0..self.times {
      let now = Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      times.push(elapsed);
      last = Some(result);
    }
    if let Some(result) = last {
      output.render_result(&frame, &result)?;
    }

    let mean = Self::mean_latency(&times).ok_or_else(|| anyhow::anyhow!("推理次数不足"))?;
    warn!("平均推理时间: {:.2?}", mean);
    Ok(mean)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mean_skips_first_two_runs() {
    let times = [
      Duration::from_millis(100),
      Duration::from_millis(50),
      Duration::from_millis(4),
      Duration::from_millis(6),
    ];
    assert_eq!(
      RepeatShotTask::mean_latency(&times),
      Some(Duration::from_millis(5))
    );
    assert_eq!(RepeatShotTask::mean_latency(&times[..2]), None);
  }
}
