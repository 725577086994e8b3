//! # 进程级编解码运行时
//!
//! ## 设计思路
//!
//! 编解码库的初始化状态是整个进程唯一的共享可变资源。这里把它建模为显式的
//! 进程级状态：宿主在首次使用前调用 `CodecRuntime::initialize`，之后只读，从不销毁。
//! 编解码入口都要求传入 `&CodecRuntime`，因此初始化顺序在调用点上是可见的，
//! 不会在第一次读写文件时被隐式触发。
//!
//! ## 实现思路
//!
//! - `once_cell::sync::OnceCell` 保证只初始化一次，重复调用幂等（忽略后来的配置）。
//! - 未初始化时 `CodecRuntime::get` 返回 `NotInitialized`。

use once_cell::sync::OnceCell;

use super::fits::FitsLibrary;
use super::raster::ImageCrateCodec;
use super::CodecConfig;
use crate::error::{Result, ToolError};

static RUNTIME: OnceCell<CodecRuntime> = OnceCell::new();

/// 进程级编解码运行时（初始化一次，永不销毁）。
#[derive(Debug)]
pub struct CodecRuntime {
    config: CodecConfig,
    raster: ImageCrateCodec,
    fits: FitsLibrary,
}

impl CodecRuntime {
    pub(crate) fn new(config: CodecConfig) -> Self {
        let raster = ImageCrateCodec::new(&config);
        let fits = FitsLibrary::new(&config);
        Self { config, raster, fits }
    }

    /// 初始化进程级运行时；已初始化时直接返回已有实例。
    ///
    /// # 示例
    /// ```rust
    /// use image_tools::codec::{CodecConfig, CodecRuntime};
    ///
    /// let runtime = CodecRuntime::initialize(CodecConfig::default())?;
    /// assert!(std::ptr::eq(runtime, CodecRuntime::get()?));
    /// # Ok::<(), image_tools::ToolError>(())
    /// ```
    pub fn initialize(config: CodecConfig) -> Result<&'static CodecRuntime> {
        config.validate()?;

        let mut fresh = false;
        let runtime = RUNTIME.get_or_init(|| {
            fresh = true;
            CodecRuntime::new(config)
        });

        if fresh {
            log::info!(
                "🔧 编解码运行时已初始化（jpeg_quality={}, max={}x{}, max_alloc={}）",
                runtime.config.jpeg_quality,
                runtime.config.max_image_width,
                runtime.config.max_image_height,
                runtime.config.max_alloc_bytes
            );
        } else {
            log::debug!("编解码运行时已存在，忽略重复初始化");
        }

        Ok(runtime)
    }

    /// 获取已初始化的运行时。
    pub fn get() -> Result<&'static CodecRuntime> {
        RUNTIME.get().ok_or(ToolError::NotInitialized)
    }

    pub fn config(&self) -> &CodecConfig {
        &self.config
    }

    pub fn raster(&self) -> &ImageCrateCodec {
        &self.raster
    }

    pub fn fits(&self) -> &FitsLibrary {
        &self.fits
    }
}
