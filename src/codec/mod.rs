//! # 编解码桥接模块（codec）
//!
//! ## 设计思路
//!
//! 在 `Bitmap` 与两类外部文件格式之间做转换：通用光栅（JPEG / PNG / TIFF / BMP / TGA）
//! 与 FITS。两类外部库都只通过窄接口（`RasterCodec` / `FitsCodec`）被调用，
//! 桥接层只负责格式选择、深度与通道校验、警告透传。
//!
//! - `config`：编解码配置
//! - `runtime`：进程级运行时（显式初始化一次）
//! - `raster`：基于 `image` crate 的光栅协作者
//! - `fits`：FITS 协作者与逐行读取算法
//!
//! ## 实现思路
//!
//! ```text
//! read(path)
//!    ├─ 文件不存在 → FileNotFound
//!    ├─ .fits / .fit → fits::read_fits_with（尺寸上限 → 逐行读取 + 亮度范围）
//!    └─ 其他 → RasterCodec::decode → 深度校验（8/16/32/64 位）→ Bitmap
//!
//! write(bitmap, path)
//!    ├─ 浮点深度 → UnsupportedFormat；深度 > 4 字节 → UnsupportedDepth
//!    ├─ 彩色图写 FITS → UnsupportedFormat；通道数非 1/3 → UnsupportedFormat
//!    └─ 按扩展名选择编码器；未知扩展名 → UnsupportedFormat
//! ```
//!
//! 可恢复的问题（例如扩展名与内容不符、编码时降低位宽）以警告字符串返回，不视为失败。

mod config;
pub mod fits;
pub mod raster;
mod runtime;

pub use config::CodecConfig;
pub use fits::{FitsCodec, FitsImageParams, FitsLibrary, FitsLimits, FitsSource, FitsStatus};
pub use raster::ImageCrateCodec;
pub use runtime::CodecRuntime;

use std::path::Path;

use crate::bitmap::Bitmap;
use crate::error::{Result, ToolError};
use crate::sample::Depth;

/// 光栅输出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RasterFormat {
    Jpeg,
    Tiff,
    Png,
    Tga,
    Bmp,
}

impl RasterFormat {
    /// 该格式能保存的最大采样位宽。
    pub const fn max_bits(self) -> u32 {
        match self {
            Self::Png | Self::Tiff => 16,
            Self::Jpeg | Self::Tga | Self::Bmp => 8,
        }
    }
}

/// 按扩展名识别的文件格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileFormat {
    Raster(RasterFormat),
    Fits,
}

/// 小写扩展名（含点），无扩展名时为空串。
pub fn lowercase_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

pub fn is_fits_path(path: &Path) -> bool {
    matches!(lowercase_extension(path).as_str(), ".fits" | ".fit")
}

impl FileFormat {
    /// 按扩展名选择格式（大小写不敏感）。
    ///
    /// # 示例
    /// ```rust
    /// use std::path::Path;
    /// use image_tools::codec::{FileFormat, RasterFormat};
    ///
    /// assert_eq!(FileFormat::from_path(Path::new("a.JPG")), Some(FileFormat::Raster(RasterFormat::Jpeg)));
    /// assert_eq!(FileFormat::from_path(Path::new("m31.fit")), Some(FileFormat::Fits));
    /// assert_eq!(FileFormat::from_path(Path::new("notes.txt")), None);
    /// ```
    pub fn from_path(path: &Path) -> Option<Self> {
        match lowercase_extension(path).as_str() {
            ".jpeg" | ".jpg" => Some(Self::Raster(RasterFormat::Jpeg)),
            ".tiff" | ".tif" => Some(Self::Raster(RasterFormat::Tiff)),
            ".png" => Some(Self::Raster(RasterFormat::Png)),
            ".tga" => Some(Self::Raster(RasterFormat::Tga)),
            ".bmp" => Some(Self::Raster(RasterFormat::Bmp)),
            ".fit" | ".fits" => Some(Self::Fits),
            _ => None,
        }
    }
}

/// 光栅协作者解码结果：本机字节序的连续采样。
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRaster {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    /// 每个采样的位宽（8 / 16 / 32 / 64 之外的值会被桥接层拒绝）。
    pub bits_per_sample: u32,
    pub bytes: Vec<u8>,
    /// 可恢复的解码问题。
    pub warning: Option<String>,
}

/// 交给光栅协作者编码的像素帧（借用位图存储）。
#[derive(Debug, Clone, Copy)]
pub struct RasterFrame<'a> {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub depth: Depth,
    pub bytes: &'a [u8],
}

impl<'a> From<&'a Bitmap> for RasterFrame<'a> {
    fn from(bitmap: &'a Bitmap) -> Self {
        Self {
            width: bitmap.width(),
            height: bitmap.height(),
            channels: bitmap.channels(),
            depth: bitmap.depth(),
            bytes: bitmap.bytes(),
        }
    }
}

/// 通用光栅编解码协作者。
pub trait RasterCodec {
    fn decode(&self, path: &Path) -> Result<DecodedRaster>;

    /// 编码并写入文件，返回非致命警告。
    fn encode(&self, frame: RasterFrame<'_>, path: &Path, format: RasterFormat) -> Result<Option<String>>;
}

/// 使用进程级运行时的默认协作者读取图像。
pub fn read(runtime: &CodecRuntime, path: &Path) -> Result<(Bitmap, Option<String>)> {
    read_with(runtime.raster(), runtime.fits(), path)
}

/// 使用进程级运行时的默认协作者写入图像。
pub fn write(runtime: &CodecRuntime, bitmap: &Bitmap, path: &Path) -> Result<Option<String>> {
    write_with(runtime.raster(), runtime.fits(), bitmap, path)
}

/// 读取图像文件，返回位图与可选警告。
pub fn read_with<R, F>(raster: &R, fits: &F, path: &Path) -> Result<(Bitmap, Option<String>)>
where
    R: RasterCodec + ?Sized,
    F: FitsCodec + ?Sized,
{
    if !path.exists() {
        return Err(ToolError::FileNotFound(path.display().to_string()));
    }

    log::info!("📁 读取图像 - 路径: {}", path.display());

    if is_fits_path(path) {
        let bitmap = fits::read_fits_with(fits, path)?;
        return Ok((bitmap, None));
    }

    let decoded = raster.decode(path)?;
    let depth = match decoded.bits_per_sample {
        8 => Depth::U8,
        16 => Depth::U16,
        32 => Depth::U32,
        64 => Depth::U64,
        other => {
            return Err(ToolError::UnsupportedDepth {
                depth: other as i64,
                operation: "read",
            });
        }
    };

    let bitmap = Bitmap::from_bytes(
        decoded.width,
        decoded.height,
        decoded.channels,
        depth,
        &decoded.bytes,
    )?;

    log::info!(
        "✅ 读取成功 - 尺寸: {}x{} 通道: {} 深度: {} 位",
        bitmap.width(),
        bitmap.height(),
        bitmap.channels(),
        decoded.bits_per_sample
    );

    if let Some(warning) = &decoded.warning {
        log::warn!("⚠️ 读取成功，但解码器报告警告: '{}'", warning);
    }

    Ok((bitmap, decoded.warning))
}

/// 将位图写入文件，返回可选警告。
pub fn write_with<R, F>(raster: &R, fits: &F, bitmap: &Bitmap, path: &Path) -> Result<Option<String>>
where
    R: RasterCodec + ?Sized,
    F: FitsCodec + ?Sized,
{
    if bitmap.depth().is_float() {
        return Err(ToolError::UnsupportedFormat(
            "浮点类型图像请使用 FITS 格式".to_string(),
        ));
    }

    if bitmap.depth().byte_size() > 4 {
        return Err(ToolError::UnsupportedDepth {
            depth: bitmap.depth().tag(),
            operation: "write",
        });
    }

    let to_fits = is_fits_path(path);
    log::info!("💾 写入图像 - 路径: {}", path.display());

    if to_fits && bitmap.contains_colors() {
        return Err(ToolError::UnsupportedFormat(
            "不支持写入彩色 FITS 文件，请改用 TIFF 格式".to_string(),
        ));
    }

    if bitmap.channels() != 1 && bitmap.channels() != 3 {
        return Err(ToolError::UnsupportedFormat(format!(
            "不支持写入 {} 通道图像",
            bitmap.channels()
        )));
    }

    let format = FileFormat::from_path(path).ok_or_else(|| {
        ToolError::UnsupportedFormat(format!(
            "不支持写入扩展名为 '{}' 的图像文件",
            lowercase_extension(path)
        ))
    })?;

    let warning = match format {
        FileFormat::Fits if bitmap.channels() > 1 => {
            let gray = bitmap.first_channel()?;
            fits.write_image(RasterFrame::from(&gray), path)
                .map_err(fits::codec_error)?;
            None
        }
        FileFormat::Fits => {
            fits.write_image(RasterFrame::from(bitmap), path)
                .map_err(fits::codec_error)?;
            None
        }
        FileFormat::Raster(format) => raster.encode(RasterFrame::from(bitmap), path, format)?,
    };

    match &warning {
        Some(warning) => log::warn!("⚠️ 写入成功，但编码器报告警告: '{}'", warning),
        None => log::info!("✅ 写入成功 - 路径: {}", path.display()),
    }

    Ok(warning)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// 记录调用、返回预设结果的光栅协作者。
    #[derive(Default)]
    struct FakeRaster {
        decoded: Option<DecodedRaster>,
        encoded: RefCell<Vec<(PathBuf, RasterFormat, usize)>>,
    }

    impl RasterCodec for FakeRaster {
        fn decode(&self, _path: &Path) -> Result<DecodedRaster> {
            self.decoded.clone().ok_or_else(|| ToolError::Codec {
                library: "fake",
                status: 1,
                message: "nothing to decode".to_string(),
            })
        }

        fn encode(&self, frame: RasterFrame<'_>, path: &Path, format: RasterFormat) -> Result<Option<String>> {
            self.encoded
                .borrow_mut()
                .push((path.to_path_buf(), format, frame.channels));
            Ok(Some("reduced".to_string()))
        }
    }

    fn existing_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, b"stub").expect("write stub");
        path
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let raster = FakeRaster::default();
        let result = read_with(&raster, &FitsLibrary::default(), Path::new("/definitely/not/here.png"));
        assert!(matches!(result, Err(ToolError::FileNotFound(_))));
    }

    #[test]
    fn unsupported_raster_depth_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = existing_file(&dir, "odd.png");
        let raster = FakeRaster {
            decoded: Some(DecodedRaster {
                width: 1,
                height: 1,
                channels: 1,
                bits_per_sample: 12,
                bytes: vec![0, 0],
                warning: None,
            }),
            ..FakeRaster::default()
        };

        let result = read_with(&raster, &FitsLibrary::default(), &path);
        assert!(matches!(
            result,
            Err(ToolError::UnsupportedDepth { depth: 12, .. })
        ));
    }

    #[test]
    fn decoder_warning_is_returned_with_bitmap() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = existing_file(&dir, "warn.png");
        let raster = FakeRaster {
            decoded: Some(DecodedRaster {
                width: 2,
                height: 1,
                channels: 1,
                bits_per_sample: 16,
                bytes: bytemuck::cast_slice(&[7u16, 9]).to_vec(),
                warning: Some("lossy".to_string()),
            }),
            ..FakeRaster::default()
        };

        let (bitmap, warning) = read_with(&raster, &FitsLibrary::default(), &path).expect("read");
        assert_eq!(warning.as_deref(), Some("lossy"));
        assert_eq!(bitmap.samples::<u16>(), Some(&[7u16, 9][..]));
    }

    #[test]
    fn write_rejects_float_and_wide_depths() {
        let raster = FakeRaster::default();
        let float = Bitmap::new(1, 1, 1, Depth::F64).expect("bitmap");
        assert!(matches!(
            write_with(&raster, &FitsLibrary::default(), &float, Path::new("x.fits")),
            Err(ToolError::UnsupportedFormat(_))
        ));

        let wide = Bitmap::new(1, 1, 1, Depth::U64).expect("bitmap");
        assert!(matches!(
            write_with(&raster, &FitsLibrary::default(), &wide, Path::new("x.png")),
            Err(ToolError::UnsupportedDepth { depth: 8, .. })
        ));
    }

    #[test]
    fn color_bitmap_to_fits_is_unsupported_format() {
        let raster = FakeRaster::default();
        let color = Bitmap::from_samples(1, 1, 3, &[1u8, 2, 3]).expect("bitmap");
        assert!(matches!(
            write_with(&raster, &FitsLibrary::default(), &color, Path::new("color.fits")),
            Err(ToolError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn unknown_extension_and_channel_count_are_rejected() {
        let raster = FakeRaster::default();
        let gray = Bitmap::new(1, 1, 1, Depth::U8).expect("bitmap");
        assert!(matches!(
            write_with(&raster, &FitsLibrary::default(), &gray, Path::new("x.webp")),
            Err(ToolError::UnsupportedFormat(_))
        ));

        let rgba = Bitmap::new(1, 1, 4, Depth::U8).expect("bitmap");
        assert!(matches!(
            write_with(&raster, &FitsLibrary::default(), &rgba, Path::new("x.png")),
            Err(ToolError::UnsupportedFormat(_))
        ));
        assert!(raster.encoded.borrow().is_empty());
    }

    #[test]
    fn encoder_is_selected_by_extension_and_warning_passes_through() {
        let raster = FakeRaster::default();
        let rgb = Bitmap::new(2, 2, 3, Depth::U16).expect("bitmap");

        let warning = write_with(&raster, &FitsLibrary::default(), &rgb, Path::new("out.TIF")).expect("write");
        assert_eq!(warning.as_deref(), Some("reduced"));

        let calls = raster.encoded.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1, RasterFormat::Tiff);
        assert_eq!(calls[0].2, 3);
    }
}
