// 该文件是 Shenying（身影）项目的一部分。
// src/args.rs - 项目参数配置
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

use anyhow::{Result, bail};
use clap::Parser;

use shenying::estimator::Delegate;
use shenying::session::SessionConfig;

/// Shenying 实时姿态跟踪参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 配置文件路径（JSON），命令行参数覆盖文件值
  #[arg(long, value_name = "FILE")]
  pub config: Option<String>,

  /// 帧源来源
  /// 支持格式:
  /// - V4L2: v4l2:///dev/video0 或 /dev/video0
  /// - 图片: *.jpg, *.png 等（循环播放，无硬件演示用）
  #[arg(long, value_name = "SOURCE")]
  pub source: Option<String>,

  /// 姿态模型文件路径（ONNX）
  #[arg(long, value_name = "FILE")]
  pub model: Option<String>,

  /// 推理委托 (gpu | cpu)
  #[arg(long, value_name = "DELEGATE")]
  pub delegate: Option<String>,

  /// 期望采集宽度（实际以硬件授予为准）
  #[arg(long, value_name = "PIXELS")]
  pub width: Option<u32>,

  /// 期望采集高度（实际以硬件授予为准）
  #[arg(long, value_name = "PIXELS")]
  pub height: Option<u32>,

  /// 关闭自拍镜像呈现
  #[arg(long)]
  pub no_mirror: bool,

  /// 最大处理帧数（0 表示无限制）
  #[arg(long, default_value = "0", value_name = "COUNT")]
  pub max_frames: u64,

  /// 检测结果记录目录（JSON Lines，供下游动作评分消费）
  #[arg(long, value_name = "DIR")]
  pub record: Option<String>,

  /// 每 N 帧保存一次叠加层快照（0 表示关闭）
  #[arg(long, default_value = "0", value_name = "N")]
  pub snapshot_every: u64,

  /// 快照输出目录
  #[arg(long, default_value = "snapshots", value_name = "DIR")]
  pub snapshot_dir: String,
}

impl Args {
  /// 把命令行覆盖项套用到配置上
  pub fn apply(&self, config: &mut SessionConfig) -> Result<()> {
    if let Some(source) = &self.source {
      config.source = source.clone();
    }
    if let Some(model) = &self.model {
      config.estimator.model_path = model.clone();
    }
    if let Some(delegate) = &self.delegate {
      config.estimator.delegate = match delegate.as_str() {
        "gpu" => Delegate::Gpu,
        "cpu" => Delegate::Cpu,
        other => bail!("未知的推理委托: {}（支持 gpu / cpu）", other),
      };
    }
    if let Some(width) = self.width {
      config.capture.width = width;
    }
    if let Some(height) = self.height {
      config.capture.height = height;
    }
    if self.no_mirror {
      config.overlay.mirror = false;
    }
    Ok(())
  }
}
