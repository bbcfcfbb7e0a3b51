// 该文件是 Shenying（身影）项目的一部分。
// src/estimator/mod.rs - 关键点估计器接口与生命周期状态机
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

mod blazepose;
pub mod decode;

pub use blazepose::BlazePoseEstimator;

use serde::Deserialize;
use thiserror::Error;

use crate::frame::Frame;
use crate::landmark::Detection;

/// 估计器生命周期状态
///
/// 状态转移是单向的，唯一例外是加载失败时 Loading 回退到
/// Uninitialized（可重试）。Disposed 是终态，任何状态都无法离开它。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Uninitialized,
  Loading,
  Ready,
  Disposed,
}

/// 生命周期事件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
  InitRequested,
  LoadSucceeded,
  LoadFailed,
  DisposeRequested,
}

/// 一次状态转移的裁决
#[derive(Debug)]
pub enum Transition {
  /// 进入新状态
  Accepted(LifecycleState),
  /// 合法但无事可做（如对 Ready 再次 init）
  Ignored,
  /// 非法转移，调用方存在生命周期 bug
  Rejected(EstimatorError),
}

/// 生命周期转移函数
///
/// 所有实现共用这一张表，使非法状态在唯一一处被拒绝，
/// 而不是散落在各方法的隐式检查里。
pub fn apply(state: LifecycleState, event: LifecycleEvent) -> Transition {
  use LifecycleEvent::*;
  use LifecycleState::*;

  match (state, event) {
    (Uninitialized, InitRequested) => Transition::Accepted(Loading),
    // init 幂等：加载中或已就绪时再次 init 是无操作
    (Loading | Ready, InitRequested) => Transition::Ignored,
    (Disposed, InitRequested) => Transition::Rejected(EstimatorError::AlreadyDisposed),
    (Loading, LoadSucceeded) => Transition::Accepted(Ready),
    // 加载失败回退到未初始化，允许重试
    (Loading, LoadFailed) => Transition::Accepted(Uninitialized),
    // dispose 从任何状态都安全，且幂等
    (Disposed, DisposeRequested) => Transition::Ignored,
    (_, DisposeRequested) => Transition::Accepted(Disposed),
    // 其余组合不会由实现发出
    (_, LoadSucceeded | LoadFailed) => Transition::Ignored,
  }
}

/// 推理委托
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delegate {
  Gpu,
  Cpu,
}

fn default_delegate() -> Delegate {
  Delegate::Gpu
}

fn default_num_poses() -> u32 {
  1
}

fn default_confidence() -> f32 {
  0.5
}

/// 估计器配置
///
/// 构造时固定，此后不可变。同一估计器实例不允许被两个
/// 持不同配置的调用方并发初始化。
#[derive(Debug, Clone, Deserialize)]
pub struct EstimatorConfig {
  /// 模型文件路径（ONNX）
  #[serde(default)]
  pub model_path: String,
  /// 推理委托，默认 GPU
  #[serde(default = "default_delegate")]
  pub delegate: Delegate,
  /// 检测人数，默认 1
  #[serde(default = "default_num_poses")]
  pub num_poses: u32,
  /// 检测置信度下限，默认 0.5
  #[serde(default = "default_confidence")]
  pub min_detection_confidence: f32,
  /// 跟踪置信度下限，默认 0.5
  #[serde(default = "default_confidence")]
  pub min_tracking_confidence: f32,
  /// 存在置信度下限，默认 0.5
  #[serde(default = "default_confidence")]
  pub min_presence_confidence: f32,
}

impl Default for EstimatorConfig {
  fn default() -> Self {
    Self {
      model_path: String::new(),
      delegate: default_delegate(),
      num_poses: default_num_poses(),
      min_detection_confidence: default_confidence(),
      min_tracking_confidence: default_confidence(),
      min_presence_confidence: default_confidence(),
    }
  }
}

/// 估计器错误
#[derive(Error, Debug)]
pub enum EstimatorError {
  /// 模型或加速上下文加载失败，可重试
  #[error("模型初始化失败: {0}")]
  InitializationFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
  /// 对终态估计器调用 init，属于调用方的生命周期 bug
  #[error("估计器已销毁，不能再初始化")]
  AlreadyDisposed,
  /// 就绪后推理引擎仍然出错，对当前会话是致命的
  #[error("推理引擎错误: {0}")]
  EngineFailure(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 关键点估计器接口
///
/// 对姿态推理引擎的带生命周期封装。未来的移动端在设备推理
/// 后端只需实现该接口即可接入帧循环。
pub trait LandmarkEstimator {
  /// 加载模型并获取加速计算上下文。幂等。
  fn init(&mut self) -> Result<(), EstimatorError>;

  /// 对一帧推理
  ///
  /// 状态不是 Ready 或帧尺寸为零时返回 NoDetection，绝不报错：
  /// 启动/销毁竞态期间这是正常情形。timestamp_ms 在同一实例上
  /// 必须非递减。Err 仅在引擎自身故障时出现。
  fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Detection, EstimatorError>;

  /// 当前生命周期状态
  fn state(&self) -> LifecycleState;

  fn is_ready(&self) -> bool {
    self.state() == LifecycleState::Ready
  }

  /// 释放全部推理资源，无条件转入 Disposed。任何状态下都安全。
  fn dispose(&mut self);
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_init_path() {
    assert!(matches!(
      apply(LifecycleState::Uninitialized, LifecycleEvent::InitRequested),
      Transition::Accepted(LifecycleState::Loading)
    ));
    assert!(matches!(
      apply(LifecycleState::Loading, LifecycleEvent::LoadSucceeded),
      Transition::Accepted(LifecycleState::Ready)
    ));
  }

  #[test]
  fn test_init_idempotent() {
    assert!(matches!(
      apply(LifecycleState::Loading, LifecycleEvent::InitRequested),
      Transition::Ignored
    ));
    assert!(matches!(
      apply(LifecycleState::Ready, LifecycleEvent::InitRequested),
      Transition::Ignored
    ));
  }

  #[test]
  fn test_load_failure_is_retryable() {
    assert!(matches!(
      apply(LifecycleState::Loading, LifecycleEvent::LoadFailed),
      Transition::Accepted(LifecycleState::Uninitialized)
    ));
    // 回退后可以再次 init
    assert!(matches!(
      apply(LifecycleState::Uninitialized, LifecycleEvent::InitRequested),
      Transition::Accepted(LifecycleState::Loading)
    ));
  }

  #[test]
  fn test_disposed_is_terminal() {
    assert!(matches!(
      apply(LifecycleState::Disposed, LifecycleEvent::InitRequested),
      Transition::Rejected(EstimatorError::AlreadyDisposed)
    ));
    assert!(matches!(
      apply(LifecycleState::Disposed, LifecycleEvent::DisposeRequested),
      Transition::Ignored
    ));
  }

  #[test]
  fn test_dispose_from_any_state() {
    for state in [
      LifecycleState::Uninitialized,
      LifecycleState::Loading,
      LifecycleState::Ready,
    ] {
      assert!(matches!(
        apply(state, LifecycleEvent::DisposeRequested),
        Transition::Accepted(LifecycleState::Disposed)
      ));
    }
  }
}
