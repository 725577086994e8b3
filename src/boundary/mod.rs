//! # 边界入口（boundary）
//!
//! ## 设计思路
//!
//! 宿主只通过容器与本库交互。`ImageTools` 是宿主持有的服务对象：
//! 持有已初始化的编解码运行时，以及由 `open_image_file` 打开、尚未释放的位图。
//! 返回给宿主的 `buffer` 地址指向这些位图的存储，在 `release_image` 之前一直有效。
//!
//! ## 实现思路
//!
//! 每个入口都遵循同一条链路：
//!
//! ```text
//! 容器 → 解码必需键 → 校验（尺寸 / 溢出 / 空地址 / 对齐 / 重叠 / 容量）
//!      → 引擎或桥接 → 结果容器
//! ```
//!
//! - 任何错误（包括 panic）都在 `guarded` 中被转换为只含 `error` 键的容器。
//! - 原地像素运算失败时不回滚已写入的像素。
//! - 地址不属于本服务时无法得知其容量，此时由宿主保证区间有效。

mod params;

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use crate::bitmap::Bitmap;
use crate::codec::{self, CodecRuntime};
use crate::container::{keys, BufferAddress, Container};
use crate::engine::{self, OperationRequest, PixelOperation, SubtractMode};
use crate::error::Result;

/// 面向宿主的图像工具服务。
pub struct ImageTools<'rt> {
    runtime: &'rt CodecRuntime,
    opened: HashMap<BufferAddress, Bitmap>,
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "未知 panic".to_string()
    }
}

impl<'rt> ImageTools<'rt> {
    /// 以已初始化的运行时创建服务。
    ///
    /// # 示例
    /// ```rust
    /// use image_tools::{CodecConfig, CodecRuntime, ImageTools};
    ///
    /// let runtime = CodecRuntime::initialize(CodecConfig::default())?;
    /// let tools = ImageTools::new(runtime);
    /// assert_eq!(tools.open_images(), 0);
    /// # Ok::<(), image_tools::ToolError>(())
    /// ```
    pub fn new(runtime: &'rt CodecRuntime) -> Self {
        Self {
            runtime,
            opened: HashMap::new(),
        }
    }

    /// 尚未释放的已打开图像数。
    pub fn open_images(&self) -> usize {
        self.opened.len()
    }

    /// 释放 `open_image_file` 打开的图像；地址未知时返回 `false`。
    pub fn release_image(&mut self, address: BufferAddress) -> bool {
        let released = self.opened.remove(&address).is_some();
        if released {
            log::debug!("🧹 已释放图像 {:#x}", address.get());
        } else {
            log::warn!("⚠️ 释放未知图像地址 {:#x}", address.get());
        }
        released
    }

    fn guarded<F>(&mut self, name: &'static str, body: F) -> Container
    where
        F: FnOnce(&mut Self) -> Result<Container>,
    {
        match panic::catch_unwind(AssertUnwindSafe(|| body(self))) {
            Ok(Ok(container)) => container,
            Ok(Err(err)) => {
                log::error!("❌ {} 失败: {}", name, err);
                Container::failure(err.to_string())
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                log::error!("❌ {} 内部错误: {}", name, message);
                Container::failure(format!("{} 内部错误: {}", name, message))
            }
        }
    }

    /// 读取图像文件，返回位图键 + `path`（有解码警告时附带 `message`）。
    pub fn open_image_file(&mut self, path: &str) -> Container {
        self.guarded("OpenImageFile", |tools| {
            let (mut bitmap, warning) = codec::read(tools.runtime, Path::new(path))?;
            let mut result = bitmap.to_container().with(keys::PATH, path);
            if let Some(warning) = warning {
                result.insert(keys::MESSAGE, warning);
            }

            let address = result.address(keys::BUFFER)?;
            tools.opened.insert(address, bitmap);
            Ok(result)
        })
    }

    /// 将容器描述的缓冲区写入 `path`；有编码警告时返回 `message` + `path`。
    pub fn save_image_file(&mut self, params: &Container) -> Container {
        self.guarded("SaveImageFile", |tools| {
            let path = params.string(keys::PATH)?;
            let buffers = params::decode_buffers(params, false, "SaveImageFile")?;
            let min = params.optional_double(keys::MIN_BRIGHTNESS)?;
            let max = params.optional_double(keys::MAX_BRIGHTNESS)?;
            let (view, _) = params::checked_operands(&buffers, &tools.opened)?;

            let shape = buffers.shape;
            // SAFETY: 地址已校验非空、对齐；已知图像的容量已校验，其余由宿主保证。
            let mut bitmap = unsafe { Bitmap::from_view(&view, shape.width, shape.height, shape.channels)? };
            if let (Some(min), Some(max)) = (min, max) {
                bitmap.set_brightness_range(min, max);
            }

            let warning = codec::write(tools.runtime, &bitmap, Path::new(path))?;
            Ok(match warning {
                Some(warning) => Container::new()
                    .with(keys::MESSAGE, warning)
                    .with(keys::PATH, path),
                None => Container::new(),
            })
        })
    }

    fn pixel_operation<F>(&mut self, name: &'static str, params: &Container, build: F) -> Container
    where
        F: FnOnce(&Container) -> Result<PixelOperation>,
    {
        self.guarded(name, |tools| {
            let operation = build(params)?;
            let buffers = params::decode_buffers(params, operation.needs_reference(), name)?;
            let (working, reference) = params::checked_operands(&buffers, &tools.opened)?;

            let request = OperationRequest {
                working: working.address(),
                reference: reference.map(|view| view.address()),
                width: buffers.shape.width,
                height: buffers.shape.height,
                channels: buffers.shape.channels,
                depth: buffers.shape.depth.tag(),
            };

            // SAFETY: 区间已校验非空、对齐、互不重叠；已知图像的容量已校验。
            unsafe { engine::apply(operation, &request)? };
            Ok(Container::new())
        })
    }

    /// 交换工作图与参考图。
    pub fn swap(&mut self, params: &Container) -> Container {
        self.pixel_operation("Swap", params, |_| Ok(PixelOperation::Swap))
    }

    /// 参考图（左）复制到工作图（右）。
    pub fn copy_left_to_right(&mut self, params: &Container) -> Container {
        self.pixel_operation("CopyLeftToRight", params, |_| Ok(PixelOperation::CopyLeftToRight))
    }

    /// 工作图（右）复制到参考图（左）。
    pub fn copy_right_to_left(&mut self, params: &Container) -> Container {
        self.pixel_operation("CopyRightToLeft", params, |_| Ok(PixelOperation::CopyRightToLeft))
    }

    /// 按 `minBrightness` / `maxBrightness` 反相工作图。
    pub fn invert_image(&mut self, params: &Container) -> Container {
        self.pixel_operation("InvertImage", params, |params| {
            Ok(PixelOperation::Invert {
                min: params.double(keys::MIN_BRIGHTNESS)?,
                max: params.double(keys::MAX_BRIGHTNESS)?,
            })
        })
    }

    /// `working := reference − working`（按 `mode` 处理负值）。
    pub fn subtract_working_image_from_reference(&mut self, params: &Container, mode: i64) -> Container {
        self.pixel_operation("SubtractWorkingImageFromReference", params, |_| {
            Ok(PixelOperation::SubtractWorkingImageFromReference(SubtractMode::from_raw(mode)?))
        })
    }

    /// `working := working − reference`（按 `mode` 处理负值）。
    pub fn subtract_reference_from_working_image(&mut self, params: &Container, mode: i64) -> Container {
        self.pixel_operation("SubtractReferenceFromWorkingImage", params, |_| {
            Ok(PixelOperation::SubtractReferenceFromWorkingImage(SubtractMode::from_raw(mode)?))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CodecConfig;
    use crate::sample::Depth;

    fn runtime() -> &'static CodecRuntime {
        CodecRuntime::initialize(CodecConfig::default()).expect("init runtime")
    }

    fn dual(working: &mut [u8], reference: &mut [u8], width: i64) -> Container {
        Container::new()
            .with(keys::BUFFER, BufferAddress::from_mut_ptr(working.as_mut_ptr()))
            .with(keys::REFERENCE_IMAGE_BUFFER, BufferAddress::from_mut_ptr(reference.as_mut_ptr()))
            .with(keys::WIDTH, width)
            .with(keys::HEIGHT, 1i64)
            .with(keys::CHANNELS, 1i64)
            .with(keys::DEPTH, 1i64)
    }

    #[test]
    fn errors_become_error_only_containers() {
        let mut tools = ImageTools::new(runtime());
        let result = tools.swap(&Container::new());
        assert_eq!(result.len(), 1);
        assert!(result.error().is_some_and(|e| e.contains(keys::BUFFER)));
    }

    #[test]
    fn invalid_mode_is_reported_and_buffers_untouched() {
        let mut working = vec![1u8, 2];
        let mut reference = vec![3u8, 4];
        let params = dual(&mut working, &mut reference, 2);

        let mut tools = ImageTools::new(runtime());
        let result = tools.subtract_reference_from_working_image(&params, 7);
        assert!(!result.is_success());
        assert_eq!(working, vec![1, 2]);
    }

    #[test]
    fn subtract_with_absolute_mode() {
        let mut working = vec![1u8, 9];
        let mut reference = vec![4u8, 2];
        let params = dual(&mut working, &mut reference, 2);

        let mut tools = ImageTools::new(runtime());
        let result = tools.subtract_working_image_from_reference(&params, 2);
        assert!(result.is_empty());
        assert_eq!(working, vec![3, 7]);
        assert_eq!(reference, vec![4, 2]);
    }

    #[test]
    fn invert_requires_brightness_bounds() {
        let mut working = vec![10u8];
        let params = Container::new()
            .with(keys::BUFFER, BufferAddress::from_mut_ptr(working.as_mut_ptr()))
            .with(keys::WIDTH, 1i64)
            .with(keys::HEIGHT, 1i64)
            .with(keys::CHANNELS, 1i64)
            .with(keys::DEPTH, 1i64)
            .with(keys::MIN_BRIGHTNESS, 0.0);

        let mut tools = ImageTools::new(runtime());
        let result = tools.invert_image(&params);
        assert!(result.error().is_some_and(|e| e.contains(keys::MAX_BRIGHTNESS)));

        let result = tools.invert_image(&params.with(keys::MAX_BRIGHTNESS, 255.0));
        assert!(result.is_success());
        assert_eq!(working, vec![245]);
    }

    #[test]
    fn opened_images_stay_registered_until_released() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gray.png");
        let bitmap = Bitmap::from_samples(2, 1, 1, &[10u8, 200]).expect("bitmap");
        codec::write(runtime(), &bitmap, &path).expect("write");

        let mut tools = ImageTools::new(runtime());
        let opened = tools.open_image_file(&path.to_string_lossy());
        assert!(opened.is_success(), "{:?}", opened.error());
        assert_eq!(opened.integer(keys::DEPTH).expect("depth"), Depth::U8.tag());
        assert_eq!(opened.string(keys::PATH).expect("path"), path.to_string_lossy());
        assert_eq!(tools.open_images(), 1);

        let address = opened.address(keys::BUFFER).expect("address");
        let inverted = tools.invert_image(
            &opened
                .clone()
                .with(keys::MIN_BRIGHTNESS, 0.0)
                .with(keys::MAX_BRIGHTNESS, 255.0),
        );
        assert!(inverted.is_success());

        let out = dir.path().join("inverted.png");
        let saved = tools.save_image_file(&opened.clone().with(keys::PATH, out.to_string_lossy().as_ref()));
        assert!(saved.is_empty(), "{:?}", saved.error());

        let (reread, _) = codec::read(runtime(), &out).expect("reread");
        assert_eq!(reread.samples::<u8>(), Some(&[245u8, 55][..]));

        assert!(tools.release_image(address));
        assert!(!tools.release_image(address));
        assert_eq!(tools.open_images(), 0);
    }

    #[test]
    fn oversized_shape_for_opened_image_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("tiny.png");
        let bitmap = Bitmap::from_samples(1, 1, 1, &[1u8]).expect("bitmap");
        codec::write(runtime(), &bitmap, &path).expect("write");

        let mut tools = ImageTools::new(runtime());
        let opened = tools.open_image_file(&path.to_string_lossy());
        let result = tools.invert_image(
            &opened
                .with(keys::WIDTH, 64i64)
                .with(keys::MIN_BRIGHTNESS, 0.0)
                .with(keys::MAX_BRIGHTNESS, 255.0),
        );
        assert!(result.error().is_some());
    }

    #[test]
    fn missing_file_is_reported() {
        let mut tools = ImageTools::new(runtime());
        let result = tools.open_image_file("/no/such/image.png");
        assert_eq!(result.len(), 1);
        assert!(result.error().is_some());
        assert_eq!(tools.open_images(), 0);
    }

    #[test]
    fn panics_are_converted_to_errors() {
        let mut tools = ImageTools::new(runtime());
        let result = tools.guarded("Test", |_| panic!("boom"));
        assert!(result.error().is_some_and(|e| e.contains("boom")));
    }
}
