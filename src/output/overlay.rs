// 该文件是 Shenying（身影）项目的一部分。
// src/output/overlay.rs - 骨架叠加层渲染
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

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut, draw_text_mut};
use tracing::debug;

use super::{
  COLOR_EDGE, COLOR_HIGH, COLOR_LOW, COLOR_MEDIUM, COLOR_POINT_BORDER, COLOR_TEXT, OverlayConfig,
};
use crate::frame::Frame;
use crate::landmark::{LandmarkSet, PoseIndex};
use crate::policy::{DrawPolicy, VisibilityClass, classify};

const POINT_BORDER_RADIUS: i32 = 6;
const POINT_FILL_RADIUS: i32 = 4;
const READOUT_X: i32 = 8;
const READOUT_Y: i32 = 8;
const READOUT_FONT_SIZE: f32 = 20.0;

/// 归一化 x 坐标的水平镜像映射
///
/// x' = width − x·width。与画面呈现共用同一镜像状态是叠加层
/// 不脱离身体的前提。
pub fn mirror_x(x_norm: f32, width: u32) -> f32 {
  width as f32 - x_norm * width as f32
}

fn project(x_norm: f32, y_norm: f32, width: u32, height: u32, mirror: bool) -> (f32, f32) {
  let x = if mirror {
    mirror_x(x_norm, width)
  } else {
    x_norm * width as f32
  };
  (x, y_norm * height as f32)
}

/// 一条计划中的骨架连线
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedEdge {
  pub start: (f32, f32),
  pub end: (f32, f32),
}

/// 一个计划中的关键点
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPoint {
  pub x: f32,
  pub y: f32,
  pub class: VisibilityClass,
}

/// 一帧叠加层的全部绘制命令
///
/// 先规划后执行：规划是纯函数，便于独立测试；执行只是按序
/// 画到表面上。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayPlan {
  pub edges: Vec<PlannedEdge>,
  pub points: Vec<PlannedPoint>,
}

/// 把过滤后的归一化关键点转换为屏幕空间绘制命令
///
/// 低于阈值的点整个省略；连线的两个端点独立判定，任一端点
/// 不可绘制则整条线省略。输入为 None 时产生空计划。
pub fn plan(
  landmarks: Option<&LandmarkSet>,
  connections: &[(PoseIndex, PoseIndex)],
  policy: &DrawPolicy,
  width: u32,
  height: u32,
  mirror: bool,
) -> OverlayPlan {
  let set = match landmarks {
    Some(set) => set,
    None => return OverlayPlan::default(),
  };

  let mut edges = Vec::new();
  for (a, b) in connections {
    let la = set.get(*a);
    let lb = set.get(*b);
    if !policy.drawable(la) || !policy.drawable(lb) {
      continue;
    }
    edges.push(PlannedEdge {
      start: project(la.x, la.y, width, height, mirror),
      end: project(lb.x, lb.y, width, height, mirror),
    });
  }

  let mut points = Vec::new();
  for landmark in set.landmarks() {
    if !policy.drawable(landmark) {
      continue;
    }
    let (x, y) = project(landmark.x, landmark.y, width, height, mirror);
    points.push(PlannedPoint {
      x,
      y,
      class: classify(landmark.visibility),
    });
  }

  OverlayPlan { edges, points }
}

fn fill_color(class: VisibilityClass) -> Rgb<u8> {
  match class {
    VisibilityClass::High => COLOR_HIGH,
    VisibilityClass::Medium => COLOR_MEDIUM,
    VisibilityClass::Low => COLOR_LOW,
  }
}

/// 骨架叠加层渲染器
pub struct OverlayRenderer {
  font: FontRef<'static>,
  config: OverlayConfig,
}

impl OverlayRenderer {
  pub fn new(config: OverlayConfig) -> Self {
    let font_data = include_bytes!("../../assets/DejaVuSans.ttf");
    let font = FontRef::try_from_slice(font_data).expect("无法加载嵌入的字体文件");
    Self { font, config }
  }

  pub fn config(&self) -> &OverlayConfig {
    &self.config
  }

  /// 清空绘制表面
  pub fn clear(surface: &mut RgbImage) {
    for pixel in surface.pixels_mut() {
      *pixel = Rgb([0, 0, 0]);
    }
  }

  /// 渲染一帧叠加层
  ///
  /// 无论输入如何都先清空表面：None 输入得到一块干净表面，
  /// 视觉上即"未检测到人"。连线先画、关键点后画，保证肩髋等
  /// 交汇处的节点清晰可辨。
  pub fn render(&self, surface: &mut RgbImage, landmarks: Option<&LandmarkSet>, fps: f64) {
    Self::clear(surface);
    self.draw_overlay(surface, landmarks, fps);
  }

  /// 渲染镜像画面背景再叠加骨架
  ///
  /// 背景与骨架共用同一镜像状态（见 OverlayConfig::mirror）。
  pub fn render_with_backdrop(
    &self,
    surface: &mut RgbImage,
    frame: &Frame,
    landmarks: Option<&LandmarkSet>,
    fps: f64,
  ) {
    Self::clear(surface);
    self.blit_backdrop(surface, frame);
    self.draw_overlay(surface, landmarks, fps);
  }

  fn draw_overlay(&self, surface: &mut RgbImage, landmarks: Option<&LandmarkSet>, fps: f64) {
    let plan = plan(
      landmarks,
      &crate::landmark::POSE_CONNECTIONS,
      &self.config.policy,
      surface.width(),
      surface.height(),
      self.config.mirror,
    );
    debug!(
      "叠加层: {} 条连线, {} 个关键点",
      plan.edges.len(),
      plan.points.len()
    );

    for edge in &plan.edges {
      draw_line_segment_mut(surface, edge.start, edge.end, COLOR_EDGE);
    }

    // 两个同心圆：中性外圈 + 按可见度配色的内圈
    for point in &plan.points {
      let center = (point.x.round() as i32, point.y.round() as i32);
      draw_filled_circle_mut(surface, center, POINT_BORDER_RADIUS, COLOR_POINT_BORDER);
      draw_filled_circle_mut(surface, center, POINT_FILL_RADIUS, fill_color(point.class));
    }

    if self.config.show_fps {
      self.draw_readout(surface, fps);
    }
  }

  /// 帧率读数
  ///
  /// 位置固定在屏幕角落，字形绝不随表面镜像翻转：表面镜像与
  /// 文字反镜像的复合对字形是恒等变换。
  fn draw_readout(&self, surface: &mut RgbImage, fps: f64) {
    let text = format!("FPS: {:.0}", fps);
    draw_text_mut(
      surface,
      COLOR_TEXT,
      READOUT_X,
      READOUT_Y,
      PxScale::from(READOUT_FONT_SIZE),
      &self.font,
      &text,
    );
  }

  /// 把采集帧按镜像状态贴为背景
  fn blit_backdrop(&self, surface: &mut RgbImage, frame: &Frame) {
    if !frame.has_pixels() {
      return;
    }
    // 表面在启动时已按实际帧尺寸创建；尺寸不符时按表面为准缩放
    let source;
    let image = if frame.width() == surface.width() && frame.height() == surface.height() {
      &frame.image
    } else {
      source = image::imageops::resize(
        &frame.image,
        surface.width(),
        surface.height(),
        image::imageops::FilterType::Triangle,
      );
      &source
    };

    let width = surface.width();
    for (x, y, pixel) in surface.enumerate_pixels_mut() {
      let src_x = if self.config.mirror { width - 1 - x } else { x };
      *pixel = *image.get_pixel(src_x, y);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::landmark::{LANDMARK_COUNT, Landmark, LandmarkSet, POSE_CONNECTIONS};

  fn set_with_visibility(visibilities: &[(usize, f32)]) -> LandmarkSet {
    let mut landmarks = [Landmark::new(0.5, 0.5, 0.0, 0.1); LANDMARK_COUNT];
    for (index, visibility) in visibilities {
      landmarks[*index] = Landmark::new(0.5, 0.5, 0.0, *visibility);
    }
    LandmarkSet::new(landmarks, 0)
  }

  #[test]
  fn test_mirror_law() {
    // x=0.2, width=640 → 640 − 0.2×640 = 512
    assert_eq!(mirror_x(0.2, 640), 512.0);
  }

  #[test]
  fn test_plan_none_is_empty() {
    let plan = plan(
      None,
      &POSE_CONNECTIONS,
      &DrawPolicy::default(),
      640,
      480,
      true,
    );
    assert!(plan.edges.is_empty());
    assert!(plan.points.is_empty());
  }

  #[test]
  fn test_two_unconnected_visible_points() {
    // 33 个点中仅鼻(0)与左肩(11)可见，二者无直接连线
    let set = set_with_visibility(&[(0, 0.9), (11, 0.9)]);
    let plan = plan(
      Some(&set),
      &POSE_CONNECTIONS,
      &DrawPolicy::default(),
      640,
      480,
      false,
    );
    assert_eq!(plan.points.len(), 2);
    // 低可见度端点的连线即使另一端高可见也被跳过
    assert_eq!(plan.edges.len(), 0);
  }

  #[test]
  fn test_connected_visible_points_produce_edge() {
    // 左肩(11)—左肘(13) 相连且都可见
    let set = set_with_visibility(&[(11, 0.9), (13, 0.9)]);
    let plan = plan(
      Some(&set),
      &POSE_CONNECTIONS,
      &DrawPolicy::default(),
      640,
      480,
      false,
    );
    assert_eq!(plan.points.len(), 2);
    assert_eq!(plan.edges.len(), 1);
  }

  #[test]
  fn test_plan_applies_mirror() {
    let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
    landmarks[0] = Landmark::new(0.2, 0.5, 0.0, 0.9);
    let set = LandmarkSet::new(landmarks, 0);
    let plan = plan(
      Some(&set),
      &POSE_CONNECTIONS,
      &DrawPolicy::default(),
      640,
      480,
      true,
    );
    assert_eq!(plan.points.len(), 1);
    assert_eq!(plan.points[0].x, 512.0);
  }

  #[test]
  fn test_render_none_clears_surface() {
    let renderer = OverlayRenderer::new(OverlayConfig {
      mirror: false,
      show_fps: false,
      policy: DrawPolicy::default(),
    });
    let mut surface = RgbImage::from_pixel(64, 48, Rgb([77, 77, 77]));
    renderer.render(&mut surface, None, 30.0);
    assert!(surface.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }

  #[test]
  fn test_readout_unaffected_by_mirror() {
    // 表面镜像 × 文字反镜像 = 字形恒等
    let mut mirrored = RgbImage::new(128, 64);
    let mut plain = RgbImage::new(128, 64);

    let with_mirror = OverlayRenderer::new(OverlayConfig {
      mirror: true,
      show_fps: true,
      policy: DrawPolicy::default(),
    });
    let without_mirror = OverlayRenderer::new(OverlayConfig {
      mirror: false,
      show_fps: true,
      policy: DrawPolicy::default(),
    });

    with_mirror.render(&mut mirrored, None, 42.0);
    without_mirror.render(&mut plain, None, 42.0);
    assert_eq!(mirrored, plain);
  }
}
