// 该文件是 Shenying（身影）项目的一部分。
// src/output/mod.rs - 叠加层渲染模块
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

mod overlay;

pub use overlay::{OverlayPlan, OverlayRenderer, mirror_x, plan};

use image::Rgb;
use serde::Deserialize;

use crate::policy::DrawPolicy;

/// 高可见度关键点填充色
pub const COLOR_HIGH: Rgb<u8> = Rgb([0, 200, 83]);
/// 中可见度关键点填充色
pub const COLOR_MEDIUM: Rgb<u8> = Rgb([255, 196, 0]);
/// 低可见度关键点填充色
pub const COLOR_LOW: Rgb<u8> = Rgb([244, 67, 54]);
/// 骨架连线颜色
pub const COLOR_EDGE: Rgb<u8> = Rgb([220, 220, 220]);
/// 关键点外圈颜色（中性，保证任何背景下可见）
pub const COLOR_POINT_BORDER: Rgb<u8> = Rgb([255, 255, 255]);
/// 帧率读数颜色
pub const COLOR_TEXT: Rgb<u8> = Rgb([255, 255, 0]);

fn default_mirror() -> bool {
  true
}

fn default_show_fps() -> bool {
  true
}

/// 叠加层配置
#[derive(Debug, Clone, Deserialize)]
pub struct OverlayConfig {
  /// 水平镜像（自拍呈现）。叠加层与画面呈现必须共用同一镜像
  /// 状态，否则骨架会从身体上"脱落"。
  #[serde(default = "default_mirror")]
  pub mirror: bool,
  /// 是否绘制帧率读数
  #[serde(default = "default_show_fps")]
  pub show_fps: bool,
  /// 可绘制性判定
  #[serde(default)]
  pub policy: DrawPolicy,
}

impl Default for OverlayConfig {
  fn default() -> Self {
    Self {
      mirror: default_mirror(),
      show_fps: default_show_fps(),
      policy: DrawPolicy::default(),
    }
  }
}
