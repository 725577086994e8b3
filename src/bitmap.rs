//! # 位图模块
//!
//! ## 设计思路
//!
//! `Bitmap` 是本模块唯一的拥有型像素缓冲：形状（宽 / 高 / 通道）、采样深度、
//! 可选显示亮度范围，以及一块连续的 `width * height * channels * |depth|` 字节。
//!
//! ## 实现思路
//!
//! - 底层存储为 `Vec<u64>`，保证 8 字节对齐，五种采样类型都能零拷贝地借用为类型化切片。
//! - 构造时一次性校验尺寸与溢出，之后字节长度恒等于形状乘积。
//! - 与容器互转：编码只写入地址与形状（不转移所有权）；解码从借用视图复制出一份新位图。

use crate::container::{keys, BufferAddress, Container, SampleView};
use crate::error::{Result, ToolError};
use crate::sample::{dispatch_depth, Depth, Sample};

/// 计算 `width * height * channels`，并拒绝零尺寸与溢出。
pub fn sample_count(width: usize, height: usize, channels: usize) -> Result<usize> {
    if width == 0 || height == 0 || channels == 0 {
        return Err(ToolError::InvalidBuffer(format!(
            "图像尺寸必须为正：{}x{}x{}",
            width, height, channels
        )));
    }

    width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(channels))
        .ok_or_else(|| {
            ToolError::InvalidBuffer(format!("图像尺寸溢出：{}x{}x{}", width, height, channels))
        })
}

/// 拥有型位图。
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap {
    width: usize,
    height: usize,
    channels: usize,
    depth: Depth,
    storage: Vec<u64>,
    byte_len: usize,
    min_brightness: Option<f64>,
    max_brightness: Option<f64>,
}

impl Bitmap {
    /// 创建全零位图。
    ///
    /// # 示例
    /// ```rust
    /// use image_tools::{Bitmap, Depth};
    ///
    /// let bitmap = Bitmap::new(4, 2, 3, Depth::U16)?;
    /// assert_eq!(bitmap.bytes().len(), 4 * 2 * 3 * 2);
    /// # Ok::<(), image_tools::ToolError>(())
    /// ```
    pub fn new(width: usize, height: usize, channels: usize, depth: Depth) -> Result<Self> {
        let byte_len = sample_count(width, height, channels)?
            .checked_mul(depth.byte_size())
            .ok_or_else(|| ToolError::InvalidBuffer("图像字节数溢出".to_string()))?;

        Ok(Self {
            width,
            height,
            channels,
            depth,
            storage: vec![0u64; byte_len.div_ceil(8)],
            byte_len,
            min_brightness: None,
            max_brightness: None,
        })
    }

    /// 以给定字节（本机字节序的采样）创建位图。
    pub fn from_bytes(
        width: usize,
        height: usize,
        channels: usize,
        depth: Depth,
        bytes: &[u8],
    ) -> Result<Self> {
        let mut bitmap = Self::new(width, height, channels, depth)?;
        if bytes.len() != bitmap.byte_len {
            return Err(ToolError::InvalidBuffer(format!(
                "像素数据长度异常：期望 {} 字节，实际 {} 字节",
                bitmap.byte_len,
                bytes.len()
            )));
        }
        bitmap.bytes_mut().copy_from_slice(bytes);
        Ok(bitmap)
    }

    /// 以类型化采样创建位图。
    pub fn from_samples<T: Sample>(
        width: usize,
        height: usize,
        channels: usize,
        samples: &[T],
    ) -> Result<Self> {
        Self::from_bytes(width, height, channels, T::DEPTH, bytemuck::cast_slice(samples))
    }

    /// 从借用视图复制出一份位图。
    ///
    /// # Safety
    ///
    /// `view` 必须满足 [`SampleView::as_bytes`] 的约定，且采样数等于
    /// `width * height * channels`。
    pub unsafe fn from_view(
        view: &SampleView,
        width: usize,
        height: usize,
        channels: usize,
    ) -> Result<Self> {
        // SAFETY: 由调用方保证视图有效。
        let bytes = unsafe { view.as_bytes() };
        Self::from_bytes(width, height, channels, view.depth(), bytes)
    }

    /// 从容器重建位图（复制像素）。
    ///
    /// 读取 `buffer` / `width` / `height` / `channels` / `depth`，以及可选的亮度键。
    ///
    /// # Safety
    ///
    /// 容器中的 `buffer` 地址必须在本次调用期间指向至少
    /// `width * height * channels * |depth|` 字节的有效内存。
    pub unsafe fn from_container(container: &Container) -> Result<Self> {
        let address = container.address(keys::BUFFER)?;
        let width = positive(container, keys::WIDTH)?;
        let height = positive(container, keys::HEIGHT)?;
        let channels = positive(container, keys::CHANNELS)?;
        let tag = container.integer(keys::DEPTH)?;
        let depth = Depth::from_tag(tag).ok_or(ToolError::UnsupportedDepth {
            depth: tag,
            operation: "Bitmap::from_container",
        })?;
        let min = container.optional_double(keys::MIN_BRIGHTNESS)?;
        let max = container.optional_double(keys::MAX_BRIGHTNESS)?;

        if address.is_null() {
            return Err(ToolError::InvalidBuffer("缓冲区地址为空".to_string()));
        }

        let view = SampleView::new(address, sample_count(width, height, channels)?, depth);
        // SAFETY: 由调用方保证地址有效。
        let mut bitmap = unsafe { Self::from_view(&view, width, height, channels)? };
        bitmap.min_brightness = min;
        bitmap.max_brightness = max;
        Ok(bitmap)
    }

    /// 编码为容器：地址 + 形状 + 亮度范围。
    ///
    /// 返回的地址借出本位图的可写存储，仅在位图存活且未被移走存储期间有效。
    pub fn to_container(&mut self) -> Container {
        let (min, max) = self.brightness_range();
        let address = BufferAddress::from_mut_ptr(self.bytes_mut().as_mut_ptr());

        Container::new()
            .with(keys::BUFFER, address)
            .with(keys::WIDTH, self.width as i64)
            .with(keys::HEIGHT, self.height as i64)
            .with(keys::CHANNELS, self.channels as i64)
            .with(keys::DEPTH, self.depth.tag())
            .with(keys::MIN_BRIGHTNESS, min)
            .with(keys::MAX_BRIGHTNESS, max)
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn depth(&self) -> Depth {
        self.depth
    }

    /// 每行字节数。
    pub fn row_bytes(&self) -> usize {
        self.width * self.channels * self.depth.byte_size()
    }

    pub fn bytes(&self) -> &[u8] {
        &bytemuck::cast_slice::<u64, u8>(&self.storage)[..self.byte_len]
    }

    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut bytemuck::cast_slice_mut::<u64, u8>(&mut self.storage)[..self.byte_len]
    }

    /// 以类型化切片借用；`T` 与位图深度不符时返回 `None`。
    pub fn samples<T: Sample>(&self) -> Option<&[T]> {
        if T::DEPTH != self.depth {
            return None;
        }
        bytemuck::try_cast_slice(self.bytes()).ok()
    }

    pub fn samples_mut<T: Sample>(&mut self) -> Option<&mut [T]> {
        if T::DEPTH != self.depth {
            return None;
        }
        bytemuck::try_cast_slice_mut(self.bytes_mut()).ok()
    }

    pub fn set_brightness_range(&mut self, min: f64, max: f64) {
        self.min_brightness = Some(min);
        self.max_brightness = Some(max);
    }

    /// 显示亮度范围；未设置时回退到采样类型的自然范围。
    pub fn brightness_range(&self) -> (f64, f64) {
        match (self.min_brightness, self.max_brightness) {
            (Some(min), Some(max)) => (min, max),
            _ => dispatch_depth!(self.depth, T => <T as Sample>::natural_range()),
        }
    }

    /// 是否为彩色图：多通道且至少有一个像素的各通道值不相同。
    pub fn contains_colors(&self) -> bool {
        if self.channels < 2 {
            return false;
        }

        let sample = self.depth.byte_size();
        self.bytes()
            .chunks_exact(self.channels * sample)
            .any(|pixel| {
                let (first, rest) = pixel.split_at(sample);
                rest.chunks_exact(sample).any(|channel| channel != first)
            })
    }

    /// 取第 0 通道构成单通道位图，亮度范围随之保留。
    pub fn first_channel(&self) -> Result<Bitmap> {
        let mut single = Bitmap::new(self.width, self.height, 1, self.depth)?;
        let sample = self.depth.byte_size();
        let stride = self.channels * sample;

        for (dst, pixel) in single
            .bytes_mut()
            .chunks_exact_mut(sample)
            .zip(self.bytes().chunks_exact(stride))
        {
            dst.copy_from_slice(&pixel[..sample]);
        }

        single.min_brightness = self.min_brightness;
        single.max_brightness = self.max_brightness;
        Ok(single)
    }
}

fn positive(container: &Container, key: &str) -> Result<usize> {
    let value = container.integer(key)?;
    if value <= 0 {
        return Err(ToolError::InvalidBuffer(format!("'{}' 必须为正整数，实际为 {}", key, value)));
    }
    usize::try_from(value)
        .map_err(|_| ToolError::InvalidBuffer(format!("'{}' 超出平台范围：{}", key, value)))
}
