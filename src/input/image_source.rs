// 该文件是 Shenying（身影）项目的一部分。
// src/input/image_source.rs - 静态图片帧源
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

use std::time::Instant;

use image::{ImageReader, RgbImage};
use tracing::info;

use super::{CaptureError, FrameSource, SourceKind, classify_io_error};
use crate::frame::Frame;

/// 静态图片帧源
///
/// 把一张图片当作持续更新的摄像头画面循环送出，用于没有
/// 摄像头硬件时的演示与测试。时间戳同样单调递增。
pub struct ImageSource {
  image: Option<RgbImage>,
  width: u32,
  height: u32,
  frame_index: u64,
  start_time: Instant,
}

impl ImageSource {
  pub fn acquire(path: &str) -> Result<Self, CaptureError> {
    let reader = ImageReader::open(path).map_err(|e| classify_io_error(path, e))?;
    let image = reader
      .decode()
      .map_err(|e| CaptureError::CaptureFailure(format!("无法解码图片 {}: {}", path, e)))?
      .to_rgb8();

    let width = image.width();
    let height = image.height();
    if width == 0 || height == 0 {
      return Err(CaptureError::CaptureFailure(format!(
        "{}: 图片尺寸为零",
        path
      )));
    }

    info!("图片帧源已就绪: {} {}x{}", path, width, height);
    Ok(Self {
      image: Some(image),
      width,
      height,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }
}

impl FrameSource for ImageSource {
  fn kind(&self) -> SourceKind {
    SourceKind::Image
  }

  fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  fn current_frame(&mut self) -> Result<Frame, CaptureError> {
    let image = self
      .image
      .as_ref()
      .ok_or_else(|| CaptureError::CaptureFailure("帧源已释放".to_string()))?
      .clone();

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
    };
    self.frame_index += 1;
    Ok(frame)
  }

  fn release(&mut self) {
    // 无硬件可释放，丢弃图像数据即可。幂等。
    self.image.take();
  }

  fn is_released(&self) -> bool {
    self.image.is_none()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_source() -> ImageSource {
    ImageSource {
      image: Some(RgbImage::new(8, 6)),
      width: 8,
      height: 6,
      frame_index: 0,
      start_time: Instant::now(),
    }
  }

  #[test]
  fn test_frames_repeat_with_increasing_index() {
    let mut source = sample_source();
    let a = source.current_frame().unwrap();
    let b = source.current_frame().unwrap();
    assert_eq!(a.index, 0);
    assert_eq!(b.index, 1);
    assert!(b.timestamp_ms >= a.timestamp_ms);
  }

  #[test]
  fn test_release_twice_is_safe() {
    let mut source = sample_source();
    source.release();
    assert!(source.is_released());
    source.release();
    assert!(source.is_released());
    assert!(source.current_frame().is_err());
  }
}
