// 该文件是 Shenying（身影）项目的一部分。
// src/input/v4l2_source.rs - V4L2 摄像头帧源
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

use std::pin::Pin;
use std::time::Instant;

use image::RgbImage;
use tracing::{debug, info, warn};
use v4l::FourCC;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;

use super::{CaptureConfig, CaptureError, FacingMode, FrameSource, SourceKind, classify_io_error};
use crate::frame::Frame;

/// V4L2 摄像头帧源
///
/// 由于 v4l 库的 Stream 需要引用 Device，我们使用 Pin<Box> 固定
/// Device 的内存地址，从而可以安全地创建引用它的 Stream。
/// release 时先丢弃 stream 再丢弃 device，设备随即对其他进程可用。
pub struct V4l2Source {
  /// 设备路径（日志与错误信息用）
  device_path: String,
  /// V4L2 设备（使用 Pin<Box> 固定内存位置）
  device: Option<Pin<Box<Device>>>,
  /// 捕获流（生命周期与 device 关联）
  stream: Option<Stream<'static>>,
  /// 帧索引
  frame_index: u64,
  /// 实际授予的宽度
  width: u32,
  /// 实际授予的高度
  height: u32,
  /// 开始时间（时间戳基准）
  start_time: Instant,
}

impl V4l2Source {
  /// 申请摄像头
  ///
  /// 按配置请求分辨率，实际分辨率以硬件授予为准。只有在首帧
  /// 确认可用且尺寸非零后才返回，绝不交出零尺寸的帧源。
  pub fn acquire(device_path: &str, config: &CaptureConfig) -> Result<Self, CaptureError> {
    if config.facing == FacingMode::Environment {
      // V4L2 不区分朝向，选定设备节点即选定朝向
      debug!("V4L2 设备无朝向概念，facing=environment 仅作记录");
    }

    let device = Box::pin(
      Device::with_path(device_path).map_err(|e| classify_io_error(device_path, e))?,
    );

    // 请求分辨率与 YUYV 像素格式
    let mut format = device
      .format()
      .map_err(|e| classify_io_error(device_path, e))?;
    format.width = config.width;
    format.height = config.height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device
      .set_format(&format)
      .map_err(|e| classify_io_error(device_path, e))?;

    let width = format.width;
    let height = format.height;
    if width == 0 || height == 0 {
      return Err(CaptureError::CaptureFailure(format!(
        "{}: 硬件授予了零尺寸分辨率",
        device_path
      )));
    }
    if width != config.width || height != config.height {
      info!(
        "请求 {}x{}，硬件授予 {}x{}",
        config.width, config.height, width, height
      );
    }

    let mut source = Self {
      device_path: device_path.to_string(),
      device: Some(device),
      stream: None,
      frame_index: 0,
      width,
      height,
      start_time: Instant::now(),
    };

    // SAFETY: device 被 Pin<Box> 固定在堆上，不会移动；stream 存储
    // 在同一结构体中，release/Drop 都保证 stream 先于 device 丢弃，
    // 所以把设备引用的生命周期延长到 'static 是安全的。
    let stream = {
      let device_ref: &Device = source.device.as_ref().map(|d| &**d).unwrap_or_else(|| {
        unreachable!("device 刚刚被放入")
      });
      let device_static: &'static Device = unsafe { std::mem::transmute(device_ref) };
      Stream::with_buffers(device_static, Type::VideoCapture, 4)
        .map_err(|e| classify_io_error(device_path, e))?
    };
    source.stream = Some(stream);

    // 首帧确认：能取出一帧且尺寸非零才算申请成功
    let first = source.current_frame()?;
    if !first.has_pixels() {
      source.release();
      return Err(CaptureError::CaptureFailure(format!(
        "{}: 首帧尺寸为零",
        device_path
      )));
    }

    info!("摄像头已就绪: {} {}x{}", device_path, width, height);
    Ok(source)
  }

  /// 将 YUYV 像素格式转换为 RGB
  fn yuyv_to_rgb(yuyv: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(yuyv.len() / 2 * 3);

    for chunk in yuyv.chunks_exact(4) {
      let y0 = chunk[0] as f32;
      let u = chunk[1] as f32 - 128.0;
      let y1 = chunk[2] as f32;
      let v = chunk[3] as f32 - 128.0;

      for y in [y0, y1] {
        let r = (y + 1.402 * v).clamp(0.0, 255.0) as u8;
        let g = (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8;
        let b = (y + 1.772 * u).clamp(0.0, 255.0) as u8;
        rgb.extend_from_slice(&[r, g, b]);
      }
    }

    rgb
  }
}

impl FrameSource for V4l2Source {
  fn kind(&self) -> SourceKind {
    SourceKind::V4l2
  }

  fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  fn current_frame(&mut self) -> Result<Frame, CaptureError> {
    let stream = self
      .stream
      .as_mut()
      .ok_or_else(|| CaptureError::CaptureFailure("帧源已释放".to_string()))?;

    let (buffer, _meta) = stream
      .next()
      .map_err(|e| classify_io_error(&self.device_path, e))?;

    let rgb_data = Self::yuyv_to_rgb(buffer);
    let image = RgbImage::from_raw(self.width, self.height, rgb_data).ok_or_else(|| {
      CaptureError::CaptureFailure(format!("{}: 帧缓冲尺寸与格式不符", self.device_path))
    })?;

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
    };
    self.frame_index += 1;
    Ok(frame)
  }

  fn release(&mut self) {
    // 丢弃顺序固定：stream 先于 device
    if self.stream.take().is_some() {
      info!("停止捕获流: {}", self.device_path);
    }
    if self.device.take().is_some() {
      info!("释放摄像头设备: {}", self.device_path);
    }
  }

  fn is_released(&self) -> bool {
    self.device.is_none()
  }
}

impl Drop for V4l2Source {
  fn drop(&mut self) {
    if !self.is_released() {
      warn!("V4l2Source 未显式释放，在 Drop 中兜底释放");
    }
    self.release();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_yuyv_gray_pixel() {
    // Y=128, U=V=128（无色度）→ 中灰
    let rgb = V4l2Source::yuyv_to_rgb(&[128, 128, 128, 128]);
    assert_eq!(rgb, vec![128, 128, 128, 128, 128, 128]);
  }

  #[test]
  fn test_yuyv_output_length() {
    // 每 4 字节 YUYV 产出 2 个 RGB 像素
    let rgb = V4l2Source::yuyv_to_rgb(&[0u8; 16]);
    assert_eq!(rgb.len(), 8 * 3);
  }
}
