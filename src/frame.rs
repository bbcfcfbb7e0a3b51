// 该文件是 Shenying（身影）项目的一部分。
// src/frame.rs - RGB 帧定义
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

use image::RgbImage;

/// 单帧图像数据
///
/// 帧源每次采样产生一帧，时间戳来自帧源自身的单调时钟，
/// 在同一帧源实例上保证非递减。
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 采集时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  /// 帧宽度（像素）
  pub fn width(&self) -> u32 {
    self.image.width()
  }

  /// 帧高度（像素）
  pub fn height(&self) -> u32 {
    self.image.height()
  }

  /// 宽高均非零才视为可推理的有效帧
  pub fn has_pixels(&self) -> bool {
    self.width() > 0 && self.height() > 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_frame_has_pixels() {
    let frame = Frame {
      image: RgbImage::new(4, 4),
      index: 0,
      timestamp_ms: 0,
    };
    assert!(frame.has_pixels());
  }

  #[test]
  fn test_zero_sized_frame_rejected() {
    let frame = Frame {
      image: RgbImage::new(0, 4),
      index: 0,
      timestamp_ms: 0,
    };
    assert!(!frame.has_pixels());
  }
}
