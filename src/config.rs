// 该文件是 Shenying（身影）项目的一部分。
// src/config.rs - 配置文件加载
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

use std::path::Path;

use anyhow::{Context, Result};

use crate::session::SessionConfig;

impl SessionConfig {
  /// 从 JSON 配置文件加载，缺省字段使用文档化默认值
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path)
      .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
    let config: SessionConfig = serde_json::from_str(&content)
      .with_context(|| format!("配置文件格式错误: {}", path.display()))?;
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use crate::estimator::Delegate;
  use crate::input::FacingMode;
  use crate::session::SessionConfig;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config: SessionConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config.source, "v4l2:///dev/video0");
    assert_eq!(config.capture.width, 640);
    assert_eq!(config.capture.height, 480);
    assert_eq!(config.capture.facing, FacingMode::User);
    assert_eq!(config.estimator.delegate, Delegate::Gpu);
    assert_eq!(config.estimator.num_poses, 1);
    assert_eq!(config.estimator.min_detection_confidence, 0.5);
    assert_eq!(config.estimator.min_tracking_confidence, 0.5);
    assert_eq!(config.estimator.min_presence_confidence, 0.5);
    assert!(config.overlay.mirror);
    assert_eq!(config.overlay.policy.min_visibility, 0.3);
  }

  #[test]
  fn test_partial_config_overrides() {
    let json = r#"{
      "source": "/dev/video2",
      "capture": { "width": 1280, "facing": "environment" },
      "estimator": { "delegate": "cpu", "min_detection_confidence": 0.7 },
      "overlay": { "mirror": false, "policy": { "min_visibility": 0.5 } }
    }"#;
    let config: SessionConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.source, "/dev/video2");
    assert_eq!(config.capture.width, 1280);
    // 未写的字段保持默认
    assert_eq!(config.capture.height, 480);
    assert_eq!(config.capture.facing, FacingMode::Environment);
    assert_eq!(config.estimator.delegate, Delegate::Cpu);
    assert_eq!(config.estimator.min_detection_confidence, 0.7);
    assert!(!config.overlay.mirror);
    assert_eq!(config.overlay.policy.min_visibility, 0.5);
  }

  #[test]
  fn test_unknown_delegate_rejected() {
    let json = r#"{ "estimator": { "delegate": "npu" } }"#;
    let result: Result<SessionConfig, _> = serde_json::from_str(json);
    assert!(result.is_err());
  }
}
