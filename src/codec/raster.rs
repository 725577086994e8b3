//! # 基于 `image` crate 的光栅协作者
//!
//! ## 设计思路
//!
//! 解码时按内容（而非扩展名）识别格式，扩展名与内容不符只产生警告；
//! 解码前套用 `CodecConfig` 中的尺寸 / 内存上限。
//! 编码时按目标格式能力降低位宽，并把每次降低报告为警告。
//!
//! ## 实现思路
//!
//! - 8 / 16 位变体直接取本机字节序数据；32 位浮点变体量化为 32 位无符号整型。
//! - `image::ImageError` 的分类映射为稳定的状态码，见 [`status_of`]。

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageBuffer, ImageFormat, ImageReader, Luma, Rgb};

use super::{CodecConfig, DecodedRaster, RasterCodec, RasterFormat, RasterFrame};
use crate::error::{Result, ToolError};
use crate::sample::Depth;

/// `image` crate 错误分类对应的状态码。
pub fn status_of(error: &image::ImageError) -> i32 {
    match error {
        image::ImageError::Decoding(_) => 1,
        image::ImageError::Encoding(_) => 2,
        image::ImageError::Parameter(_) => 3,
        image::ImageError::Limits(_) => 4,
        image::ImageError::Unsupported(_) => 5,
        image::ImageError::IoError(_) => 6,
    }
}

fn codec_error(error: image::ImageError) -> ToolError {
    ToolError::Codec {
        library: "image",
        status: status_of(&error),
        message: error.to_string(),
    }
}

fn io_codec_error(error: std::io::Error) -> ToolError {
    codec_error(image::ImageError::IoError(error))
}

/// 默认光栅协作者。
#[derive(Debug, Clone)]
pub struct ImageCrateCodec {
    limits: image::Limits,
    jpeg_quality: u8,
}

impl ImageCrateCodec {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            limits: config.image_limits(),
            jpeg_quality: config.jpeg_quality,
        }
    }
}

/// [0, 1] 浮点采样量化为 32 位无符号整型。
fn quantize_to_u32(samples: &[f32]) -> Vec<u8> {
    let quantized: Vec<u32> = samples
        .iter()
        .map(|&v| (v.clamp(0.0, 1.0) as f64 * u32::MAX as f64).round() as u32)
        .collect();
    bytemuck::cast_slice(&quantized).to_vec()
}

fn format_name(format: ImageFormat) -> String {
    format!("{:?}", format).to_uppercase()
}

impl RasterCodec for ImageCrateCodec {
    fn decode(&self, path: &Path) -> Result<DecodedRaster> {
        let mut reader = ImageReader::open(path)
            .map_err(io_codec_error)?
            .with_guessed_format()
            .map_err(io_codec_error)?;

        let mut warnings = Vec::new();
        if let (Some(actual), Ok(expected)) = (reader.format(), ImageFormat::from_path(path)) {
            if actual != expected {
                warnings.push(format!(
                    "文件内容为 {} 格式，与扩展名 {} 不符",
                    format_name(actual),
                    format_name(expected)
                ));
            }
        }

        reader.limits(self.limits.clone());
        let image = reader.decode().map_err(codec_error)?;
        let width = image.width() as usize;
        let height = image.height() as usize;

        let (channels, bits_per_sample, bytes) = match image {
            DynamicImage::ImageRgb32F(buffer) => {
                warnings.push("32 位浮点采样已量化为 32 位无符号整型".to_string());
                (3, 32, quantize_to_u32(buffer.as_raw()))
            }
            DynamicImage::ImageRgba32F(buffer) => {
                warnings.push("32 位浮点采样已量化为 32 位无符号整型".to_string());
                (4, 32, quantize_to_u32(buffer.as_raw()))
            }
            other => {
                let color = other.color();
                let channels = color.channel_count() as usize;
                let bits = (color.bytes_per_pixel() / color.channel_count()) as u32 * 8;
                (channels, bits, other.into_bytes())
            }
        };

        log::debug!(
            "解码完成 - {}x{} 通道: {} 位宽: {}",
            width,
            height,
            channels,
            bits_per_sample
        );

        Ok(DecodedRaster {
            width,
            height,
            channels,
            bits_per_sample,
            bytes,
            warning: (!warnings.is_empty()).then(|| warnings.join("; ")),
        })
    }

    fn encode(&self, frame: RasterFrame<'_>, path: &Path, format: RasterFormat) -> Result<Option<String>> {
        let mut warnings = Vec::new();
        let mut image = to_dynamic(frame, &mut warnings)?;

        if format.max_bits() == 8 && frame.depth != Depth::U8 {
            warnings.push(format!("{:?} 仅支持 8 位采样，已降为 8 位", format));
            image = match frame.channels {
                1 => DynamicImage::ImageLuma8(image.to_luma8()),
                _ => DynamicImage::ImageRgb8(image.to_rgb8()),
            };
        }

        match format {
            RasterFormat::Jpeg => {
                let file = File::create(path).map_err(io_codec_error)?;
                let encoder = JpegEncoder::new_with_quality(BufWriter::new(file), self.jpeg_quality);
                image.write_with_encoder(encoder).map_err(codec_error)?;
            }
            RasterFormat::Png => image.save_with_format(path, ImageFormat::Png).map_err(codec_error)?,
            RasterFormat::Tiff => image.save_with_format(path, ImageFormat::Tiff).map_err(codec_error)?,
            RasterFormat::Tga => image.save_with_format(path, ImageFormat::Tga).map_err(codec_error)?,
            RasterFormat::Bmp => image.save_with_format(path, ImageFormat::Bmp).map_err(codec_error)?,
        }

        Ok((!warnings.is_empty()).then(|| warnings.join("; ")))
    }
}

/// 位图帧 → `DynamicImage`；32 位采样降为 16 位。
fn to_dynamic(frame: RasterFrame<'_>, warnings: &mut Vec<String>) -> Result<DynamicImage> {
    let width = u32::try_from(frame.width)
        .map_err(|_| ToolError::InvalidBuffer(format!("宽度 {} 超出编码器范围", frame.width)))?;
    let height = u32::try_from(frame.height)
        .map_err(|_| ToolError::InvalidBuffer(format!("高度 {} 超出编码器范围", frame.height)))?;
    let mismatch = || ToolError::InvalidBuffer("像素数据长度与尺寸不符".to_string());

    let image = match (frame.depth, frame.channels) {
        (Depth::U8, 1) => DynamicImage::ImageLuma8(
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, frame.bytes.to_vec()).ok_or_else(mismatch)?,
        ),
        (Depth::U8, 3) => DynamicImage::ImageRgb8(
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, frame.bytes.to_vec()).ok_or_else(mismatch)?,
        ),
        (Depth::U16 | Depth::U32, channels) => {
            let samples: Vec<u16> = if frame.depth == Depth::U32 {
                warnings.push("32 位采样已降为 16 位".to_string());
                bytemuck::pod_collect_to_vec::<u8, u32>(frame.bytes)
                    .into_iter()
                    .map(|v| (v >> 16) as u16)
                    .collect()
            } else {
                bytemuck::pod_collect_to_vec::<u8, u16>(frame.bytes)
            };
            match channels {
                1 => DynamicImage::ImageLuma16(
                    ImageBuffer::<Luma<u16>, _>::from_raw(width, height, samples).ok_or_else(mismatch)?,
                ),
                3 => DynamicImage::ImageRgb16(
                    ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, samples).ok_or_else(mismatch)?,
                ),
                other => {
                    return Err(ToolError::UnsupportedFormat(format!("不支持写入 {} 通道图像", other)));
                }
            }
        }
        (depth, channels) => {
            return Err(ToolError::UnsupportedFormat(format!(
                "不支持写入 {} 通道、深度 {} 的图像",
                channels, depth
            )));
        }
    };

    Ok(image)
}
