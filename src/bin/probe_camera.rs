// 该文件是 Shenying（身影）项目的一部分。
// src/bin/probe_camera.rs - 摄像头能力探测工具
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

use anyhow::Result;
use v4l::video::Capture;

use shenying::input;

fn main() -> Result<()> {
  println!("Shenying 摄像头探测");
  println!("==================");
  println!(
    "能力探测: {}",
    if input::is_supported() {
      "支持"
    } else {
      "不支持（非 Linux 平台或没有视频设备节点）"
    }
  );
  println!();

  let mut found = 0;
  for index in 0..10 {
    let path = format!("/dev/video{}", index);
    if !std::path::Path::new(&path).exists() {
      continue;
    }
    found += 1;

    match v4l::Device::with_path(&path) {
      Ok(device) => {
        match device.query_caps() {
          Ok(caps) => println!("{}: {} ({})", path, caps.card, caps.driver),
          Err(e) => println!("{}: 无法查询能力: {}", path, e),
        }
        match device.format() {
          Ok(format) => println!(
            "  当前格式: {}x{} {}",
            format.width, format.height, format.fourcc
          ),
          Err(e) => println!("  无法查询格式: {}", e),
        }
      }
      Err(e) => {
        println!("{}: 无法打开: {}", path, e);
      }
    }
  }

  if found == 0 {
    println!("没有找到任何 /dev/video* 设备节点");
  }

  Ok(())
}
