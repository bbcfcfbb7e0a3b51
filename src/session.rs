// 该文件是 Shenying（身影）项目的一部分。
// src/session.rs - 帧循环控制器
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

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::estimator::{BlazePoseEstimator, EstimatorConfig, EstimatorError, LandmarkEstimator};
use crate::input::{CaptureConfig, CaptureError, FrameSource, create_frame_source, is_supported};
use crate::landmark::Detection;
use crate::output::{OverlayConfig, OverlayRenderer};
use crate::policy::FpsSmoother;

fn default_source() -> String {
  "v4l2:///dev/video0".to_string()
}

/// 跟踪会话配置
#[derive(Debug, Clone, serde::Deserialize)]
pub struct SessionConfig {
  /// 帧源来源字符串（v4l2:///dev/video0、图片路径等）
  #[serde(default = "default_source")]
  pub source: String,
  #[serde(default)]
  pub capture: CaptureConfig,
  #[serde(default)]
  pub estimator: EstimatorConfig,
  #[serde(default)]
  pub overlay: OverlayConfig,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      source: default_source(),
      capture: CaptureConfig::default(),
      estimator: EstimatorConfig::default(),
      overlay: OverlayConfig::default(),
    }
  }
}

/// 会话错误
#[derive(Error, Debug)]
pub enum SessionError {
  #[error("当前环境不支持摄像头采集")]
  Unsupported,
  #[error(transparent)]
  Capture(#[from] CaptureError),
  #[error(transparent)]
  Estimator(#[from] EstimatorError),
}

impl SessionError {
  /// 面向用户的一句话描述，附带明确的重试指引。
  /// 内部的底层错误细节只进日志，不进界面。
  pub fn user_message(&self) -> String {
    match self {
      SessionError::Unsupported => "当前环境不支持摄像头采集，请确认设备已连接摄像头".to_string(),
      SessionError::Capture(CaptureError::PermissionDenied(_)) => {
        "摄像头访问被拒绝，请授予摄像头权限后重试".to_string()
      }
      SessionError::Capture(CaptureError::DeviceNotFound(_)) => {
        "未找到摄像头设备，请检查连接后重试".to_string()
      }
      SessionError::Capture(CaptureError::DeviceBusy(_)) => {
        "摄像头正被其他程序占用，请关闭占用程序后重试".to_string()
      }
      SessionError::Capture(_) => "摄像头采集失败，请重试".to_string(),
      SessionError::Estimator(EstimatorError::InitializationFailed(_)) => {
        "姿态模型加载失败，请检查模型文件后重试".to_string()
      }
      SessionError::Estimator(_) => "姿态引擎发生内部错误，请重试".to_string(),
    }
  }
}

/// 会话状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
  Idle,
  Loading,
  Running,
  /// 携带面向用户的一句话描述与一个明确的重试入口（retry）
  Error(String),
}

/// 帧循环取消令牌
///
/// 不持有任何令牌即表示循环已停止。克隆出的令牌共享同一取消
/// 位，可交给中断处理线程。
#[derive(Debug, Clone, Default)]
pub struct FrameLoopHandle {
  cancelled: Arc<AtomicBool>,
}

impl FrameLoopHandle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }
}

/// 帧源工厂，按配置申请帧源
pub type SourceFactory = Box<dyn Fn(&SessionConfig) -> Result<Box<dyn FrameSource>, CaptureError>>;
/// 估计器工厂，按配置构造（未初始化的）估计器
pub type EstimatorFactory = Box<dyn Fn(&SessionConfig) -> Box<dyn LandmarkEstimator>>;
/// 能力探测
pub type SupportProbe = Box<dyn Fn() -> bool>;

/// 帧循环控制器
///
/// 会话期间摄像头句柄与估计器实例由它独占持有，也只有它能
/// 创建或销毁二者。单线程协作式调度：下一帧在当前帧的全部
/// 工作（含阻塞推理）完成前不会被请求，实际帧率因此受推理
/// 时延而非显示刷新率约束。
pub struct TrackingSession {
  config: SessionConfig,
  state: SessionState,
  probe: SupportProbe,
  source_factory: SourceFactory,
  estimator_factory: EstimatorFactory,
  source: Option<Box<dyn FrameSource>>,
  estimator: Option<Box<dyn LandmarkEstimator>>,
  surface: Option<RgbImage>,
  loop_handle: Option<FrameLoopHandle>,
  renderer: OverlayRenderer,
  fps: FpsSmoother,
  clock: Instant,
  last_detection: Option<Detection>,
  frame_count: u64,
}

impl TrackingSession {
  /// 以默认后端（V4L2/图片帧源 + BlazePose 估计器）创建会话
  pub fn new(config: SessionConfig) -> Self {
    Self::with_backends(
      config,
      Box::new(is_supported),
      Box::new(|config: &SessionConfig| create_frame_source(&config.source, &config.capture)),
      Box::new(|config: &SessionConfig| {
        Box::new(BlazePoseEstimator::new(config.estimator.clone())) as Box<dyn LandmarkEstimator>
      }),
    )
  }

  /// 注入自定义后端创建会话
  ///
  /// 捕获与推理后端按接口在启动时装配，移动端在设备推理等
  /// 未来后端以及测试桩都从这里接入。
  pub fn with_backends(
    config: SessionConfig,
    probe: SupportProbe,
    source_factory: SourceFactory,
    estimator_factory: EstimatorFactory,
  ) -> Self {
    let renderer = OverlayRenderer::new(config.overlay.clone());
    Self {
      config,
      state: SessionState::Idle,
      probe,
      source_factory,
      estimator_factory,
      source: None,
      estimator: None,
      surface: None,
      loop_handle: None,
      renderer,
      fps: FpsSmoother::new(),
      clock: Instant::now(),
      last_detection: None,
      frame_count: 0,
    }
  }

  pub fn state(&self) -> &SessionState {
    &self.state
  }

  pub fn is_running(&self) -> bool {
    self.state == SessionState::Running
      && self
        .loop_handle
        .as_ref()
        .is_some_and(|h| !h.is_cancelled())
  }

  /// 当前循环令牌的克隆（交给中断处理线程用）
  pub fn loop_handle(&self) -> Option<FrameLoopHandle> {
    self.loop_handle.clone()
  }

  /// 当前叠加层表面
  pub fn surface(&self) -> Option<&RgbImage> {
    self.surface.as_ref()
  }

  /// 最近一帧的检测结果（下游数据契约用）
  pub fn last_detection(&self) -> Option<&Detection> {
    self.last_detection.as_ref()
  }

  pub fn frame_count(&self) -> u64 {
    self.frame_count
  }

  /// 启动序列
  ///
  /// 仅在空闲状态下生效；错误状态的唯一重入口是 retry。任一步
  /// 失败即中止后续步骤，对已获取的资源执行完整清理，然后进入
  /// Error 状态。Error 中携带的是面向用户的描述，底层错误只
  /// 出现在日志与返回值里。
  pub fn start(&mut self) -> Result<(), SessionError> {
    match self.state {
      SessionState::Idle => {}
      SessionState::Error(_) => {
        warn!("会话处于错误状态，请经由 retry 重新启动");
        return Ok(());
      }
      SessionState::Running | SessionState::Loading => {
        warn!("会话已在 {:?} 状态，忽略重复启动", self.state);
        return Ok(());
      }
    }

    self.state = SessionState::Loading;
    info!("启动跟踪会话: {}", self.config.source);

    match self.start_sequence() {
      Ok(()) => {
        self.state = SessionState::Running;
        info!("跟踪会话进入运行状态");
        Ok(())
      }
      Err(e) => {
        error!("启动失败: {}", e);
        // 先把已部分获取的资源全部清理掉，再进入错误状态
        self.cleanup();
        self.state = SessionState::Error(e.user_message());
        Err(e)
      }
    }
  }

  fn start_sequence(&mut self) -> Result<(), SessionError> {
    // 1. 能力探测，尽早以非技术语言失败
    if !(self.probe)() {
      return Err(SessionError::Unsupported);
    }

    // 2. 申请帧源（内部已确认首帧可用）
    let source = (self.source_factory)(&self.config)?;

    // 3. 构造并初始化估计器
    let mut estimator = (self.estimator_factory)(&self.config);
    // 帧源已持有，之后任何失败都要先释放它
    self.source = Some(source);
    if let Err(e) = estimator.init() {
      self.estimator = Some(estimator); // 交给 cleanup 统一销毁
      return Err(e.into());
    }
    self.estimator = Some(estimator);

    // 4. 表面尺寸取实际授予的帧尺寸，而非请求的配置尺寸
    let (width, height) = self
      .source
      .as_ref()
      .map(|s| s.dimensions())
      .unwrap_or((0, 0));
    if width == 0 || height == 0 {
      return Err(SessionError::Capture(CaptureError::CaptureFailure(
        "帧源给出了零尺寸".to_string(),
      )));
    }
    debug!("呈现表面尺寸: {}x{}", width, height);
    self.surface = Some(RgbImage::new(width, height));

    // 5. 发放循环令牌，进入逐帧循环
    self.fps.reset();
    self.frame_count = 0;
    self.loop_handle = Some(FrameLoopHandle::new());
    Ok(())
  }

  /// 单次逐帧步进
  ///
  /// 任一持有的资源已被释放时静默退出（不报错、不改状态）：
  /// 这是清理抢先于回调生效的正常竞态。Err 仅在引擎于运行中
  /// 致命故障时返回，此时会话已自行清理并进入 Error。
  pub fn tick(&mut self) -> Result<(), SessionError> {
    if self.state != SessionState::Running {
      return Ok(());
    }
    let cancelled = self
      .loop_handle
      .as_ref()
      .map(|h| h.is_cancelled())
      .unwrap_or(true);
    if cancelled {
      return Ok(());
    }
    // 资源存活检查：清理可能赶在取消生效之前
    if self.source.is_none() || self.estimator.is_none() || self.surface.is_none() {
      return Ok(());
    }

    // 时间戳取自调度器自身的单调时钟，保证非递减
    let timestamp_ms = self.clock.elapsed().as_millis() as u64;

    let frame = match self.source.as_mut().map(|s| s.current_frame()) {
      Some(Ok(frame)) => frame,
      Some(Err(e)) => return self.fail_running(SessionError::Capture(e)),
      None => return Ok(()),
    };

    let detection = match self
      .estimator
      .as_mut()
      .map(|e| e.detect(&frame, timestamp_ms))
    {
      Some(Ok(detection)) => detection,
      // 就绪后引擎仍出错：对本会话是致命的，清理后进入错误态
      Some(Err(e)) => return self.fail_running(SessionError::Estimator(e)),
      None => return Ok(()),
    };

    if let Some(surface) = self.surface.as_mut() {
      self
        .renderer
        .render_with_backdrop(surface, &frame, detection.normalized(), self.fps.value());
    }

    self.fps.update(timestamp_ms);
    self.last_detection = Some(detection);
    self.frame_count += 1;
    Ok(())
  }

  fn fail_running(&mut self, e: SessionError) -> Result<(), SessionError> {
    error!("运行中故障: {}", e);
    self.cleanup();
    self.state = SessionState::Error(e.user_message());
    Err(e)
  }

  /// 停止会话并回到空闲状态。任何状态下调用都安全。
  pub fn stop(&mut self) {
    self.cleanup();
    self.state = SessionState::Idle;
    info!("跟踪会话已停止");
  }

  /// 从错误状态重新进入启动序列
  pub fn retry(&mut self) -> Result<(), SessionError> {
    if let SessionState::Error(message) = &self.state {
      info!("从错误状态重试: {}", message);
      self.state = SessionState::Idle;
    }
    self.start()
  }

  /// 主清理序列
  ///
  /// 顺序即正确性：先停止产生新工作（取消循环），再释放推理
  /// 资源，最后释放硬件——此时已无人能再调用它。幂等，任何
  /// 状态（包括部分初始化）下调用都安全。
  fn cleanup(&mut self) {
    // 1. 取消帧回调
    if let Some(handle) = self.loop_handle.take() {
      handle.cancel();
    }
    // 2. 销毁估计器（释放模型权重与加速缓冲）
    if let Some(mut estimator) = self.estimator.take() {
      estimator.dispose();
    }
    // 3. 释放帧源硬件
    if let Some(mut source) = self.source.take() {
      source.release();
    }
    // 4. 清空呈现表面
    if let Some(surface) = self.surface.as_mut() {
      OverlayRenderer::clear(surface);
    }
    // 5. 置空全部引用，杜绝陈旧访问
    self.surface = None;
    self.last_detection = None;
  }
}

impl Drop for TrackingSession {
  fn drop(&mut self) {
    self.cleanup();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_handle_cancel() {
    let handle = FrameLoopHandle::new();
    let clone = handle.clone();
    assert!(!handle.is_cancelled());
    clone.cancel();
    assert!(handle.is_cancelled());
  }

  #[test]
  fn test_user_messages_are_not_raw_errors() {
    let err = SessionError::Capture(CaptureError::PermissionDenied(std::io::Error::new(
      std::io::ErrorKind::PermissionDenied,
      "EACCES low level",
    )));
    let message = err.user_message();
    assert!(message.contains("重试"));
    assert!(!message.contains("EACCES"));
  }
}
