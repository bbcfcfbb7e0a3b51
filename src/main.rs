// 该文件是 Shenying（身影）项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use shenying::session::{SessionConfig, SessionState, TrackingSession};

/// 检测结果记录器（JSON Lines，每帧一行）
struct DetectionRecorder {
  writer: std::io::BufWriter<std::fs::File>,
  path: PathBuf,
}

impl DetectionRecorder {
  fn create(base_dir: &str) -> Result<Self> {
    let stamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
    let dir = PathBuf::from(base_dir).join(format!("session-{}", stamp));
    std::fs::create_dir_all(&dir).with_context(|| format!("无法创建记录目录: {:?}", dir))?;
    let path = dir.join("detections.jsonl");
    let file = std::fs::File::create(&path).with_context(|| format!("无法创建记录文件: {:?}", path))?;
    Ok(Self {
      writer: std::io::BufWriter::new(file),
      path,
    })
  }

  fn write(&mut self, record: &serde_json::Value) -> Result<()> {
    serde_json::to_writer(&mut self.writer, record)?;
    self.writer.write_all(b"\n")?;
    Ok(())
  }
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
    )
    .init();

  let args = args::Args::parse();

  println!("Shenying 实时姿态跟踪");
  println!("====================");

  // 配置文件 + 命令行覆盖
  let mut config = match &args.config {
    Some(path) => SessionConfig::load(path)?,
    None => SessionConfig::default(),
  };
  args.apply(&mut config)?;

  println!("帧源: {}", config.source);
  println!("模型: {}", config.estimator.model_path);
  println!("期望分辨率: {}x{}", config.capture.width, config.capture.height);
  println!("镜像呈现: {}", if config.overlay.mirror { "开" } else { "关" });
  println!();

  let mut recorder = match &args.record {
    Some(dir) => {
      let recorder = DetectionRecorder::create(dir)?;
      println!("检测结果记录到: {:?}", recorder.path);
      Some(recorder)
    }
    None => None,
  };

  if args.snapshot_every > 0 {
    std::fs::create_dir_all(&args.snapshot_dir)
      .with_context(|| format!("无法创建快照目录: {}", args.snapshot_dir))?;
  }

  // 启动跟踪会话
  let mut session = TrackingSession::new(config);
  if let Err(e) = session.start() {
    if let SessionState::Error(message) = session.state() {
      eprintln!("启动失败: {}", message);
    }
    return Err(e.into());
  }

  // 中断信号取消帧循环；30 秒后仍未退出则强制结束
  if let Some(handle) = session.loop_handle() {
    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      handle.cancel();
      std::thread::spawn(|| {
        std::thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })
    .expect("无法安装中断处理器");
  }

  // 逐帧循环：协作式调度，下一帧在本帧工作完成后才请求
  let mut detected_frames = 0u64;
  while session.is_running() {
    if session.tick().is_err() {
      // 会话已自行清理并进入错误状态
      if let SessionState::Error(message) = session.state() {
        eprintln!("运行中止: {}", message);
      }
      break;
    }

    if let Some(detection) = session.last_detection() {
      if detection.is_detected() {
        detected_frames += 1;
      }
      if let Some(recorder) = recorder.as_mut() {
        recorder.write(&detection.to_record())?;
      }
    }

    if args.snapshot_every > 0 && session.frame_count() % args.snapshot_every == 0 {
      if let Some(surface) = session.surface() {
        let path = format!(
          "{}/frame_{:06}.png",
          args.snapshot_dir,
          session.frame_count()
        );
        if let Err(e) = surface.save(&path) {
          warn!("快照保存失败 {}: {}", path, e);
        }
      }
    }

    if args.max_frames > 0 && session.frame_count() >= args.max_frames {
      info!("已达到最大帧数限制: {}", args.max_frames);
      break;
    }
  }

  let total = session.frame_count();
  session.stop();

  println!();
  println!("处理完成!");
  println!("总帧数: {}", total);
  println!("检测到人的帧数: {}", detected_frames);

  Ok(())
}
