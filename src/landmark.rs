// 该文件是 Shenying（身影）项目的一部分。
// src/landmark.rs - 人体关键点与检测结果定义
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

use serde::{Deserialize, Serialize};

/// BlazePose 拓扑的 33 个关键点索引
///
/// 索引身份是进程级常量：11 永远是左肩。下游（渲染、未来的
/// 动作评分）都依赖这一映射，绝不在运行时重新计算。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(usize)]
pub enum PoseIndex {
  Nose = 0,
  LeftEyeInner = 1,
  LeftEye = 2,
  LeftEyeOuter = 3,
  RightEyeInner = 4,
  RightEye = 5,
  RightEyeOuter = 6,
  LeftEar = 7,
  RightEar = 8,
  MouthLeft = 9,
  MouthRight = 10,
  LeftShoulder = 11,
  RightShoulder = 12,
  LeftElbow = 13,
  RightElbow = 14,
  LeftWrist = 15,
  RightWrist = 16,
  LeftPinky = 17,
  RightPinky = 18,
  LeftIndex = 19,
  RightIndex = 20,
  LeftThumb = 21,
  RightThumb = 22,
  LeftHip = 23,
  RightHip = 24,
  LeftKnee = 25,
  RightKnee = 26,
  LeftAnkle = 27,
  RightAnkle = 28,
  LeftHeel = 29,
  RightHeel = 30,
  LeftFootIndex = 31,
  RightFootIndex = 32,
}

/// 关键点总数
pub const LANDMARK_COUNT: usize = 33;

impl PoseIndex {
  pub const COUNT: usize = LANDMARK_COUNT;

  pub fn from_index(index: usize) -> Option<Self> {
    use PoseIndex::*;
    const ALL: [PoseIndex; LANDMARK_COUNT] = [
      Nose,
      LeftEyeInner,
      LeftEye,
      LeftEyeOuter,
      RightEyeInner,
      RightEye,
      RightEyeOuter,
      LeftEar,
      RightEar,
      MouthLeft,
      MouthRight,
      LeftShoulder,
      RightShoulder,
      LeftElbow,
      RightElbow,
      LeftWrist,
      RightWrist,
      LeftPinky,
      RightPinky,
      LeftIndex,
      RightIndex,
      LeftThumb,
      RightThumb,
      LeftHip,
      RightHip,
      LeftKnee,
      RightKnee,
      LeftAnkle,
      RightAnkle,
      LeftHeel,
      RightHeel,
      LeftFootIndex,
      RightFootIndex,
    ];
    ALL.get(index).copied()
  }
}

/// 骨架连接表（起点, 终点）
///
/// 躯干四边形、双臂肩→肘→腕、双腿髋→膝→踝、双脚踝→跟→趾，
/// 以及最小面部轮廓 耳→眼→鼻→眼→耳。进程级常量。
pub const POSE_CONNECTIONS: [(PoseIndex, PoseIndex); 20] = [
  // 面部轮廓
  (PoseIndex::LeftEar, PoseIndex::LeftEye),
  (PoseIndex::LeftEye, PoseIndex::Nose),
  (PoseIndex::Nose, PoseIndex::RightEye),
  (PoseIndex::RightEye, PoseIndex::RightEar),
  // 躯干四边形
  (PoseIndex::LeftShoulder, PoseIndex::RightShoulder),
  (PoseIndex::RightShoulder, PoseIndex::RightHip),
  (PoseIndex::RightHip, PoseIndex::LeftHip),
  (PoseIndex::LeftHip, PoseIndex::LeftShoulder),
  // 双臂
  (PoseIndex::LeftShoulder, PoseIndex::LeftElbow),
  (PoseIndex::LeftElbow, PoseIndex::LeftWrist),
  (PoseIndex::RightShoulder, PoseIndex::RightElbow),
  (PoseIndex::RightElbow, PoseIndex::RightWrist),
  // 双腿
  (PoseIndex::LeftHip, PoseIndex::LeftKnee),
  (PoseIndex::LeftKnee, PoseIndex::LeftAnkle),
  (PoseIndex::RightHip, PoseIndex::RightKnee),
  (PoseIndex::RightKnee, PoseIndex::RightAnkle),
  // 双脚
  (PoseIndex::LeftAnkle, PoseIndex::LeftHeel),
  (PoseIndex::LeftHeel, PoseIndex::LeftFootIndex),
  (PoseIndex::RightAnkle, PoseIndex::RightHeel),
  (PoseIndex::RightHeel, PoseIndex::RightFootIndex),
];

/// 单个关键点
///
/// 坐标所在空间由上下文决定：归一化集合中 x/y 为图像归一化
/// 坐标（0.0〜1.0），世界集合中为以髋部为原点的米制坐标。
/// 由估计器产出后不可变。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
  pub x: f32,
  pub y: f32,
  pub z: f32,
  /// 可见度/置信度（0.0〜1.0）
  pub visibility: f32,
}

impl Landmark {
  pub fn new(x: f32, y: f32, z: f32, visibility: f32) -> Self {
    Self {
      x,
      y,
      z,
      visibility: visibility.clamp(0.0, 1.0),
    }
  }
}

impl Default for Landmark {
  fn default() -> Self {
    Self {
      x: 0.0,
      y: 0.0,
      z: 0.0,
      visibility: 0.0,
    }
  }
}

/// 固定 33 点的关键点集合，附采集时间戳
#[derive(Debug, Clone, PartialEq)]
pub struct LandmarkSet {
  landmarks: [Landmark; LANDMARK_COUNT],
  timestamp_ms: u64,
}

impl LandmarkSet {
  pub fn new(landmarks: [Landmark; LANDMARK_COUNT], timestamp_ms: u64) -> Self {
    Self {
      landmarks,
      timestamp_ms,
    }
  }

  /// 按命名索引取关键点
  pub fn get(&self, index: PoseIndex) -> &Landmark {
    &self.landmarks[index as usize]
  }

  pub fn landmarks(&self) -> &[Landmark; LANDMARK_COUNT] {
    &self.landmarks
  }

  pub fn timestamp_ms(&self) -> u64 {
    self.timestamp_ms
  }

  /// 全部关键点的平均可见度
  pub fn average_visibility(&self) -> f32 {
    let sum: f32 = self.landmarks.iter().map(|l| l.visibility).sum();
    sum / LANDMARK_COUNT as f32
  }
}

/// 单帧检测结果
///
/// 检测是全有或全无的：要么同时给出世界坐标集与归一化集，
/// 要么什么都没有。绝不存在部分填充的集合。
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
  /// 检测到一个人
  Detected {
    /// 世界坐标集（3D，米，供未来角度计算）
    world: LandmarkSet,
    /// 归一化集（2D 图像空间，供渲染）
    normalized: LandmarkSet,
  },
  /// 画面中没有人，或置信度不足。这是正常逐帧结果，不是错误。
  NoDetection,
}

impl Detection {
  pub fn is_detected(&self) -> bool {
    matches!(self, Detection::Detected { .. })
  }

  /// 渲染用的归一化集合
  pub fn normalized(&self) -> Option<&LandmarkSet> {
    match self {
      Detection::Detected { normalized, .. } => Some(normalized),
      Detection::NoDetection => None,
    }
  }

  /// 未来动作评分用的世界坐标集合
  pub fn world(&self) -> Option<&LandmarkSet> {
    match self {
      Detection::Detected { world, .. } => Some(world),
      Detection::NoDetection => None,
    }
  }

  /// 序列化为记录行（JSON），供下游数据契约消费
  pub fn to_record(&self) -> serde_json::Value {
    match self {
      Detection::NoDetection => serde_json::json!({ "detected": false }),
      Detection::Detected { world, normalized } => serde_json::json!({
        "detected": true,
        "timestamp_ms": normalized.timestamp_ms(),
        "world": world.landmarks().as_slice(),
        "normalized": normalized.landmarks().as_slice(),
      }),
    }
  }
}
