// 该文件是 Shenying（身影）项目的一部分。
// src/estimator/decode.rs - 原始张量到关键点集合的解码
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

use tracing::warn;

use crate::landmark::{Detection, LANDMARK_COUNT, Landmark, LandmarkSet};

/// 归一化输出每点的分量数：x, y, z, visibility, presence
pub const NORMALIZED_STRIDE: usize = 5;
/// 世界坐标输出每点的分量数：x, y, z
pub const WORLD_STRIDE: usize = 3;

/// 归一化输出的期望长度
pub const NORMALIZED_LEN: usize = LANDMARK_COUNT * NORMALIZED_STRIDE;
/// 世界坐标输出的期望长度
pub const WORLD_LEN: usize = LANDMARK_COUNT * WORLD_STRIDE;

pub fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 解码一帧的原始模型输出
///
/// `normalized_raw` 为 33×5（x/y/z 以模型输入边长为单位，
/// visibility/presence 为 logit），`world_raw` 为 33×3（米）。
/// 姿态存在分低于 `score_floor`、或任一数组形状不符时返回
/// NoDetection。两个数组必须同时非空：只有一侧有数据视为
/// 引擎输出异常，同样按 NoDetection 处理并告警。
pub fn decode_detection(
  normalized_raw: &[f32],
  world_raw: &[f32],
  pose_score: f32,
  score_floor: f32,
  input_extent: f32,
  timestamp_ms: u64,
) -> Detection {
  if !shapes_valid(normalized_raw, world_raw) {
    return Detection::NoDetection;
  }

  if pose_score < score_floor {
    return Detection::NoDetection;
  }

  let mut normalized = [Landmark::default(); LANDMARK_COUNT];
  let mut world = [Landmark::default(); LANDMARK_COUNT];

  for i in 0..LANDMARK_COUNT {
    let n = &normalized_raw[i * NORMALIZED_STRIDE..(i + 1) * NORMALIZED_STRIDE];
    let visibility = sigmoid(n[3]);
    normalized[i] = Landmark::new(
      n[0] / input_extent,
      n[1] / input_extent,
      n[2] / input_extent,
      visibility,
    );

    let w = &world_raw[i * WORLD_STRIDE..(i + 1) * WORLD_STRIDE];
    // 世界坐标集合复用同一可见度：引擎只对归一化集合输出 logit
    world[i] = Landmark::new(w[0], w[1], w[2], visibility);
  }

  Detection::Detected {
    world: LandmarkSet::new(world, timestamp_ms),
    normalized: LandmarkSet::new(normalized, timestamp_ms),
  }
}

/// 校验两路输出的形状契约
///
/// 必须先于任何置信度门限调用：不对称或被截断的输出说明引擎
/// 异常，要留下日志痕迹，不能被门限悄悄吞掉。两路同时为空是
/// 正常的"无输出"，不告警。
pub fn shapes_valid(normalized_raw: &[f32], world_raw: &[f32]) -> bool {
  if normalized_raw.is_empty() != world_raw.is_empty() {
    warn!(
      "模型输出不对称: 归一化 {} 个值, 世界坐标 {} 个值，按未检测处理",
      normalized_raw.len(),
      world_raw.len()
    );
    return false;
  }

  if normalized_raw.len() != NORMALIZED_LEN || world_raw.len() != WORLD_LEN {
    if !normalized_raw.is_empty() {
      warn!(
        "模型输出长度异常: 归一化 {} (期望 {}), 世界坐标 {} (期望 {})",
        normalized_raw.len(),
        NORMALIZED_LEN,
        world_raw.len(),
        WORLD_LEN
      );
    }
    return false;
  }

  true
}

/// 平均存在度（sigmoid 后），用于 min_presence_confidence 门限
pub fn mean_presence(normalized_raw: &[f32]) -> f32 {
  if normalized_raw.len() != NORMALIZED_LEN {
    return 0.0;
  }
  let sum: f32 = (0..LANDMARK_COUNT)
    .map(|i| sigmoid(normalized_raw[i * NORMALIZED_STRIDE + 4]))
    .sum();
  sum / LANDMARK_COUNT as f32
}
