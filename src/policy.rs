// 该文件是 Shenying（身影）项目的一部分。
// src/policy.rs - 可见度分级与帧率平滑策略
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Shenying 项目贡献者

use serde::Deserialize;

use crate::landmark::Landmark;

/// 可见度分级，仅用于渲染配色，不用于剔除
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisibilityClass {
  /// 可见度 > 0.7
  High,
  /// 可见度 > 0.4
  Medium,
  /// 可见度 ≤ 0.4
  Low,
}

/// 按固定阈值对可见度分级
pub fn classify(visibility: f32) -> VisibilityClass {
  if visibility > 0.7 {
    VisibilityClass::High
  } else if visibility > 0.4 {
    VisibilityClass::Medium
  } else {
    VisibilityClass::Low
  }
}

fn default_min_visibility() -> f32 {
  0.3
}

/// 可绘制性判定
///
/// 低于阈值的点/边整个不画，而不是画淡：位置不准比没有更糟。
/// 阈值是严格下界，恰好等于阈值的点不画。
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DrawPolicy {
  /// 最低可见度（不含），默认 0.3
  #[serde(default = "default_min_visibility")]
  pub min_visibility: f32,
}

impl Default for DrawPolicy {
  fn default() -> Self {
    Self {
      min_visibility: default_min_visibility(),
    }
  }
}

impl DrawPolicy {
  pub fn new(min_visibility: f32) -> Self {
    Self { min_visibility }
  }

  /// 该关键点本帧是否可绘制
  pub fn drawable(&self, landmark: &Landmark) -> bool {
    landmark.visibility > self.min_visibility
  }
}

/// 指数平滑的帧率计
///
/// S' = 0.9·S + 0.1·r，r 为帧间隔倒数。权重 0.9 偏向稳定而非
/// 灵敏：跳动的读数比迟滞半秒的读数更让人分心。
#[derive(Debug, Clone)]
pub struct FpsSmoother {
  smoothed: f64,
  last_timestamp_ms: Option<u64>,
}

const SMOOTHING_KEEP: f64 = 0.9;
const SMOOTHING_BLEND: f64 = 0.1;

impl Default for FpsSmoother {
  fn default() -> Self {
    Self::new()
  }
}

impl FpsSmoother {
  pub fn new() -> Self {
    Self {
      smoothed: 0.0,
      last_timestamp_ms: None,
    }
  }

  /// 用新的瞬时帧率更新平滑值
  pub fn blend(&mut self, instantaneous: f64) {
    self.smoothed = SMOOTHING_KEEP * self.smoothed + SMOOTHING_BLEND * instantaneous;
  }

  /// 按本帧时间戳推进帧率计
  ///
  /// 帧间隔为零或为负（首帧、时钟异常）时整体跳过本次更新：
  /// 平滑值与已记录的时间戳都保持不变，异常值不得成为下一帧
  /// 的间隔基准。
  pub fn update(&mut self, timestamp_ms: u64) {
    let last = match self.last_timestamp_ms {
      Some(last) => last,
      None => {
        self.last_timestamp_ms = Some(timestamp_ms);
        return;
      }
    };
    if timestamp_ms <= last {
      return;
    }
    self.last_timestamp_ms = Some(timestamp_ms);
    let delta_ms = (timestamp_ms - last) as f64;
    self.blend(1000.0 / delta_ms);
  }

  /// 当前平滑帧率
  pub fn value(&self) -> f64 {
    self.smoothed
  }

  pub fn reset(&mut self) {
    self.smoothed = 0.0;
    self.last_timestamp_ms = None;
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn approx_eq(a: f64, b: f64, eps: f64) -> bool {
    (a - b).abs() < eps
  }

  #[test]
  fn test_classify_thresholds() {
    assert_eq!(classify(0.71), VisibilityClass::High);
    assert_eq!(classify(0.7), VisibilityClass::Medium);
    assert_eq!(classify(0.41), VisibilityClass::Medium);
    assert_eq!(classify(0.4), VisibilityClass::Low);
    assert_eq!(classify(0.0), VisibilityClass::Low);
  }

  #[test]
  fn test_drawable_threshold_exclusive() {
    let policy = DrawPolicy::default();
    let at = Landmark::new(0.0, 0.0, 0.0, 0.3);
    let above = Landmark::new(0.0, 0.0, 0.0, 0.31);
    assert!(!policy.drawable(&at));
    assert!(policy.drawable(&above));
  }

  #[test]
  fn test_smoothing_law() {
    // S=30, r=60 → 0.9×30 + 0.1×60 = 33
    let mut fps = FpsSmoother::new();
    fps.smoothed = 30.0;
    fps.blend(60.0);
    assert!(approx_eq(fps.value(), 33.0, 1e-9));
  }

  #[test]
  fn test_first_frame_skips_update() {
    let mut fps = FpsSmoother::new();
    fps.update(100);
    assert_eq!(fps.value(), 0.0);
    // 第二帧开始才有帧间隔
    fps.update(200); // 10 fps
    assert!(approx_eq(fps.value(), 1.0, 1e-9));
  }

  #[test]
  fn test_clock_anomaly_keeps_prior_value() {
    let mut fps = FpsSmoother::new();
    fps.update(100);
    fps.update(200);
    let before = fps.value();
    fps.update(200); // 间隔为零
    assert_eq!(fps.value(), before);
    fps.update(150); // 时钟回退
    assert_eq!(fps.value(), before);
  }

  #[test]
  fn test_anomalous_timestamp_is_not_recorded() {
    let mut normal = FpsSmoother::new();
    normal.update(100);
    normal.update(200);
    let mut with_rollback = normal.clone();

    // 回退帧被整体跳过后，下一帧的间隔仍以回退前的时间戳为基准
    with_rollback.update(150);
    with_rollback.update(300);
    normal.update(300);
    assert!(approx_eq(with_rollback.value(), normal.value(), 1e-9));
  }
}
