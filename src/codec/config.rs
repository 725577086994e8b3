//! # 编解码配置
//!
//! ## 设计思路
//!
//! 把编码质量与解码资源上限集中到 `CodecConfig`，在运行时初始化时一次性校验，
//! 之后在整个进程内只读。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用配置。
//! - `validate` 对每个字段做区间检查，错误信息指明字段名与允许范围。
//! - 支持从 JSON 文件读取（缺省字段回落到默认值）。

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};

/// 编解码配置。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// JPEG 编码质量（1~100）。
    pub jpeg_quality: u8,
    /// 解码允许的最大宽度（像素）。
    pub max_image_width: u32,
    /// 解码允许的最大高度（像素）。
    pub max_image_height: u32,
    /// 解码阶段允许分配的内存上限（字节）。
    pub max_alloc_bytes: u64,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 92,
            max_image_width: 65_535,
            max_image_height: 65_535,
            max_alloc_bytes: 1024 * 1024 * 1024,
        }
    }
}

impl CodecConfig {
    /// 校验配置区间。
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ToolError::InvalidConfig(format!(
                "jpeg_quality 必须在 1~100 之间，实际为 {}",
                self.jpeg_quality
            )));
        }
        if self.max_image_width == 0 || self.max_image_height == 0 {
            return Err(ToolError::InvalidConfig(
                "max_image_width / max_image_height 必须大于 0".to_string(),
            ));
        }
        if self.max_alloc_bytes < 1024 * 1024 {
            return Err(ToolError::InvalidConfig("max_alloc_bytes 不能小于 1MB".to_string()));
        }
        Ok(())
    }

    /// 从 JSON 文件读取配置并校验。
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| ToolError::InvalidConfig(format!("解析配置文件失败: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 转换为 `image` crate 的解码限制。
    pub(crate) fn image_limits(&self) -> image::Limits {
        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_image_width);
        limits.max_image_height = Some(self.max_image_height);
        limits.max_alloc = Some(self.max_alloc_bytes);
        limits
    }
}
