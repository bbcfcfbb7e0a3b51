// 该文件是 Shenying（身影）项目的一部分。
// src/estimator/blazepose.rs - BlazePose ONNX 估计器实现
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

use image::imageops::FilterType;
use ndarray::Array4;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::Tensor;
use tracing::{debug, info, warn};

use crate::estimator::{
  Delegate, EstimatorConfig, EstimatorError, LandmarkEstimator, LifecycleEvent, LifecycleState,
  Transition, apply, decode,
};
use crate::frame::Frame;
use crate::landmark::Detection;

/// 模型输入边长（像素）
const INPUT_EXTENT: u32 = 256;

/// 归一化关键点输出（1×195）
const NORMALIZED_OUTPUT: &str = "Identity";
/// 姿态存在分输出（1×1）
const SCORE_OUTPUT: &str = "Identity_1";
/// 世界坐标输出（1×117）
const WORLD_OUTPUT: &str = "Identity_4";

/// BlazePose 全身 33 点估计器
///
/// 持有一个 ort 会话，生命周期见模块级状态机。配置在构造时
/// 固定，此后不可变。
pub struct BlazePoseEstimator {
  config: EstimatorConfig,
  state: LifecycleState,
  session: Option<Session>,
  input_name: Option<String>,
  last_timestamp_ms: Option<u64>,
  /// 上一帧是否检测到（跟踪/检测门限滞回用）
  tracking: bool,
}

impl BlazePoseEstimator {
  pub fn new(config: EstimatorConfig) -> Self {
    Self {
      config,
      state: LifecycleState::Uninitialized,
      session: None,
      input_name: None,
      last_timestamp_ms: None,
      tracking: false,
    }
  }

  pub fn config(&self) -> &EstimatorConfig {
    &self.config
  }

  fn load_session(&mut self) -> Result<(), EstimatorError> {
    if self.config.delegate == Delegate::Gpu {
      // GPU 执行提供方未编入当前构建时回退到 CPU
      warn!("当前构建未启用 GPU 执行提供方，回退到 CPU 推理");
    }
    if self.config.num_poses > 1 {
      warn!(
        "模型为单人姿态模型，num_poses = {} 将按 1 处理",
        self.config.num_poses
      );
    }

    info!("加载姿态模型: {}", self.config.model_path);
    let session = Session::builder()
      .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
      .and_then(|b| b.commit_from_file(&self.config.model_path))
      .map_err(|e| EstimatorError::InitializationFailed(Box::new(e)))?;

    // 校验输出契约，缺失即视为模型不兼容，初始化失败
    for name in [NORMALIZED_OUTPUT, SCORE_OUTPUT, WORLD_OUTPUT] {
      if !session.outputs.iter().any(|o| o.name == name) {
        let available: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
        return Err(EstimatorError::InitializationFailed(
          format!("模型缺少输出 {}（实际输出: {:?}）", name, available).into(),
        ));
      }
    }

    let input_name = session
      .inputs
      .first()
      .map(|i| i.name.clone())
      .ok_or_else(|| EstimatorError::InitializationFailed("模型没有任何输入".into()))?;
    debug!("模型输入: {}, 输入边长: {}", input_name, INPUT_EXTENT);

    self.input_name = Some(input_name);
    self.session = Some(session);
    info!("姿态模型加载完成");
    Ok(())
  }

  /// 缩放到模型输入尺寸并归一化为 [1, H, W, 3] 的 f32 张量
  fn preprocess(frame: &Frame) -> Array4<f32> {
    let resized = image::imageops::resize(
      &frame.image,
      INPUT_EXTENT,
      INPUT_EXTENT,
      FilterType::Triangle,
    );

    let mut input = Array4::<f32>::zeros((1, INPUT_EXTENT as usize, INPUT_EXTENT as usize, 3));
    for (x, y, pixel) in resized.enumerate_pixels() {
      let (x, y) = (x as usize, y as usize);
      input[[0, y, x, 0]] = pixel[0] as f32 / 255.0;
      input[[0, y, x, 1]] = pixel[1] as f32 / 255.0;
      input[[0, y, x, 2]] = pixel[2] as f32 / 255.0;
    }
    input
  }

  /// 时间戳必须非递减；出现回退时告警并钳制到上一帧的值
  fn clamp_timestamp(&mut self, timestamp_ms: u64) -> u64 {
    let clamped = match self.last_timestamp_ms {
      Some(last) if timestamp_ms < last => {
        warn!("时间戳回退: {} < {}，已钳制", timestamp_ms, last);
        last
      }
      _ => timestamp_ms,
    };
    self.last_timestamp_ms = Some(clamped);
    clamped
  }

  fn run_inference(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Detection, EstimatorError> {
    let input = Self::preprocess(frame);

    // 状态为 Ready 时这两项必然存在，tick 前的守卫已保证
    let (session, input_name) = match (self.session.as_mut(), self.input_name.as_deref()) {
      (Some(session), Some(name)) => (session, name),
      _ => return Ok(Detection::NoDetection),
    };

    let input_tensor =
      Tensor::from_array(input).map_err(|e| EstimatorError::EngineFailure(Box::new(e)))?;
    let outputs = session
      .run(ort::inputs![input_name => input_tensor])
      .map_err(|e| EstimatorError::EngineFailure(Box::new(e)))?;

    let normalized: ndarray::ArrayViewD<f32> = outputs[NORMALIZED_OUTPUT]
      .try_extract_array()
      .map_err(|e| EstimatorError::EngineFailure(Box::new(e)))?;
    let world: ndarray::ArrayViewD<f32> = outputs[WORLD_OUTPUT]
      .try_extract_array()
      .map_err(|e| EstimatorError::EngineFailure(Box::new(e)))?;
    let score: ndarray::ArrayViewD<f32> = outputs[SCORE_OUTPUT]
      .try_extract_array()
      .map_err(|e| EstimatorError::EngineFailure(Box::new(e)))?;

    let normalized_raw: Vec<f32> = normalized.iter().copied().collect();
    let world_raw: Vec<f32> = world.iter().copied().collect();
    let pose_score = score.iter().copied().next().unwrap_or(0.0);
    drop(outputs);

    Ok(self.gate_and_decode(&normalized_raw, &world_raw, pose_score, timestamp_ms))
  }

  /// 对提取出的原始输出做门限判定并解码
  ///
  /// 形状契约必须最先校验：不对称/截断的输出要经由 shapes_valid
  /// 告警后再判未检测，不能先被存在度门限悄悄拦下。
  fn gate_and_decode(
    &mut self,
    normalized_raw: &[f32],
    world_raw: &[f32],
    pose_score: f32,
    timestamp_ms: u64,
  ) -> Detection {
    if !decode::shapes_valid(normalized_raw, world_raw) {
      self.tracking = false;
      return Detection::NoDetection;
    }

    // 存在度门限
    if decode::mean_presence(normalized_raw) < self.config.min_presence_confidence {
      self.tracking = false;
      return Detection::NoDetection;
    }

    // 滞回：上一帧已检测到时用跟踪门限，否则用检测门限
    let score_floor = if self.tracking {
      self.config.min_tracking_confidence
    } else {
      self.config.min_detection_confidence
    };

    let detection = decode::decode_detection(
      normalized_raw,
      world_raw,
      pose_score,
      score_floor,
      INPUT_EXTENT as f32,
      timestamp_ms,
    );
    self.tracking = detection.is_detected();
    detection
  }
}

impl LandmarkEstimator for BlazePoseEstimator {
  fn init(&mut self) -> Result<(), EstimatorError> {
    match apply(self.state, LifecycleEvent::InitRequested) {
      Transition::Ignored => return Ok(()),
      Transition::Rejected(e) => return Err(e),
      Transition::Accepted(next) => self.state = next,
    }

    match self.load_session() {
      Ok(()) => {
        if let Transition::Accepted(next) = apply(self.state, LifecycleEvent::LoadSucceeded) {
          self.state = next;
        }
        Ok(())
      }
      Err(e) => {
        // 失败回退到未初始化，允许调用方重试
        if let Transition::Accepted(next) = apply(self.state, LifecycleEvent::LoadFailed) {
          self.state = next;
        }
        self.session = None;
        self.input_name = None;
        Err(e)
      }
    }
  }

  fn detect(&mut self, frame: &Frame, timestamp_ms: u64) -> Result<Detection, EstimatorError> {
    // 未就绪不是错误：启动/销毁竞态期间的正常情形
    if self.state != LifecycleState::Ready {
      debug!("detect 在 {:?} 状态下被调用，返回未检测", self.state);
      return Ok(Detection::NoDetection);
    }
    if !frame.has_pixels() {
      return Ok(Detection::NoDetection);
    }

    let timestamp_ms = self.clamp_timestamp(timestamp_ms);
    self.run_inference(frame, timestamp_ms)
  }

  fn state(&self) -> LifecycleState {
    self.state
  }

  fn dispose(&mut self) {
    // 再次 dispose 是无操作（转移函数给出 Ignored）
    if let Transition::Accepted(next) = apply(self.state, LifecycleEvent::DisposeRequested) {
      self.state = next;
      // 释放模型权重与执行提供方的缓冲
      self.session = None;
      self.input_name = None;
      self.tracking = false;
      info!("姿态估计器已销毁");
    }
  }
}

impl Drop for BlazePoseEstimator {
  fn drop(&mut self) {
    self.dispose();
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn frame(w: u32, h: u32) -> Frame {
    Frame {
      image: RgbImage::new(w, h),
      index: 0,
      timestamp_ms: 0,
    }
  }

  #[test]
  fn test_detect_before_init_is_no_detection() {
    let mut est = BlazePoseEstimator::new(EstimatorConfig::default());
    assert_eq!(est.state(), LifecycleState::Uninitialized);
    let det = est.detect(&frame(64, 64), 0).unwrap();
    assert_eq!(det, Detection::NoDetection);
  }

  #[test]
  fn test_dispose_is_idempotent() {
    let mut est = BlazePoseEstimator::new(EstimatorConfig::default());
    est.dispose();
    assert_eq!(est.state(), LifecycleState::Disposed);
    est.dispose();
    assert_eq!(est.state(), LifecycleState::Disposed);
  }

  #[test]
  fn test_init_after_dispose_fails() {
    let mut est = BlazePoseEstimator::new(EstimatorConfig::default());
    est.dispose();
    let err = est.init().unwrap_err();
    assert!(matches!(err, EstimatorError::AlreadyDisposed));
    // 状态不变
    assert_eq!(est.state(), LifecycleState::Disposed);
  }

  #[test]
  fn test_detect_after_dispose_is_no_detection() {
    let mut est = BlazePoseEstimator::new(EstimatorConfig::default());
    est.dispose();
    let det = est.detect(&frame(64, 64), 0).unwrap();
    assert_eq!(det, Detection::NoDetection);
  }

  #[test]
  fn test_init_with_missing_model_is_retryable() {
    let mut est = BlazePoseEstimator::new(EstimatorConfig {
      model_path: "/nonexistent/pose.onnx".to_string(),
      ..EstimatorConfig::default()
    });
    let err = est.init().unwrap_err();
    assert!(matches!(err, EstimatorError::InitializationFailed(_)));
    // 失败后回退到未初始化，而不是卡在 Loading
    assert_eq!(est.state(), LifecycleState::Uninitialized);
  }

  fn synthetic_raw() -> (Vec<f32>, Vec<f32>) {
    use crate::estimator::decode::{NORMALIZED_LEN, WORLD_LEN};
    let mut normalized = Vec::with_capacity(NORMALIZED_LEN);
    for _ in 0..crate::landmark::LANDMARK_COUNT {
      // x, y, z, visibility logit, presence logit
      normalized.extend_from_slice(&[128.0, 128.0, 0.0, 3.0, 4.0]);
    }
    (normalized, vec![0.5f32; WORLD_LEN])
  }

  #[test]
  fn test_asymmetric_output_judged_before_presence_gate() {
    let mut est = BlazePoseEstimator::new(EstimatorConfig::default());
    let (normalized, world) = synthetic_raw();

    // 两个不对称方向都走形状契约分支，而不是被存在度门限拦下
    let det = est.gate_and_decode(&[], &world, 0.9, 0);
    assert_eq!(det, Detection::NoDetection);
    let det = est.gate_and_decode(&normalized, &[], 0.9, 0);
    assert_eq!(det, Detection::NoDetection);

    // 形状正常时仍能正常检出，门限逻辑未被破坏
    let det = est.gate_and_decode(&normalized, &world, 0.9, 5);
    assert!(det.is_detected());
  }

  #[test]
  fn test_malformed_output_resets_tracking() {
    // 跟踪门限低于检测门限，才能区分滞回是否被重置
    let mut est = BlazePoseEstimator::new(EstimatorConfig {
      min_tracking_confidence: 0.4,
      ..EstimatorConfig::default()
    });
    let (normalized, world) = synthetic_raw();

    let det = est.gate_and_decode(&normalized, &world, 0.9, 0);
    assert!(det.is_detected());

    // 异常帧之后滞回回到检测门限
    let det = est.gate_and_decode(&normalized[..10], &world, 0.9, 1);
    assert_eq!(det, Detection::NoDetection);
    let det = est.gate_and_decode(&normalized, &world, 0.45, 2);
    assert_eq!(det, Detection::NoDetection);
  }

  #[test]
  fn test_timestamp_clamped_monotonic() {
    let mut est = BlazePoseEstimator::new(EstimatorConfig::default());
    assert_eq!(est.clamp_timestamp(100), 100);
    assert_eq!(est.clamp_timestamp(50), 100);
    assert_eq!(est.clamp_timestamp(150), 150);
  }
}
