//! # 像素运算引擎（engine）
//!
//! ## 设计思路
//!
//! 引擎直接在宿主缓冲区上原地运算，不复制像素。每个操作接收工作图地址、
//! 可选的参考图地址、形状与深度标签；深度标签在这里被映射到五种采样类型之一，
//! 再调用 `kernels` 中唯一的一份泛型算法。
//!
//! ## 实现思路
//!
//! - `PixelOperation` 描述“做什么”（含亮度边界、相减模式等标量参数）。
//! - `OperationRequest` 描述“在哪做”（地址 + 形状 + 深度标签）。
//! - `apply` 是 `unsafe` 的：引擎不做任何越界检查，区间有效性由边界入口保证。
//! - 未知深度标签返回 `UnsupportedDepth`，并附带操作名。

pub mod kernels;

use crate::container::{keys, BufferAddress, SampleView};
use crate::error::{Result, ToolError};
use crate::sample::{dispatch_depth, Depth, Sample};

/// 相减策略。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubtractMode {
    /// 0：结果为负时置 0（仅对无符号深度生效）。
    Clamped,
    /// 1：无条件相减。
    Unconditional,
    /// 2：绝对差。
    Absolute,
}

impl SubtractMode {
    pub fn from_raw(mode: i64) -> Result<Self> {
        match mode {
            0 => Ok(Self::Clamped),
            1 => Ok(Self::Unconditional),
            2 => Ok(Self::Absolute),
            other => Err(ToolError::UnsupportedMode(other)),
        }
    }

    pub const fn as_raw(self) -> i64 {
        match self {
            Self::Clamped => 0,
            Self::Unconditional => 1,
            Self::Absolute => 2,
        }
    }
}

/// 像素操作。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelOperation {
    Swap,
    CopyLeftToRight,
    CopyRightToLeft,
    Invert { min: f64, max: f64 },
    SubtractWorkingImageFromReference(SubtractMode),
    SubtractReferenceFromWorkingImage(SubtractMode),
}

impl PixelOperation {
    /// 稳定的操作名，用于日志与错误消息。
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Swap => "Swap",
            Self::CopyLeftToRight => "CopyLeftToRight",
            Self::CopyRightToLeft => "CopyRightToLeft",
            Self::Invert { .. } => "InvertImage",
            Self::SubtractWorkingImageFromReference(_) => "SubtractWorkingImageFromReference",
            Self::SubtractReferenceFromWorkingImage(_) => "SubtractReferenceFromWorkingImage",
        }
    }

    pub const fn needs_reference(&self) -> bool {
        !matches!(self, Self::Invert { .. })
    }
}

/// 一次运算的操作数描述。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationRequest {
    pub working: BufferAddress,
    pub reference: Option<BufferAddress>,
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    /// 边界深度标签（1 / 2 / 4 / 8 / -8）。
    pub depth: i64,
}

impl OperationRequest {
    /// `width * height * channels`，由边界入口保证不溢出。
    pub fn sample_count(&self) -> usize {
        self.width * self.height * self.channels
    }
}

/// 在原始缓冲区上执行像素操作。
///
/// # Safety
///
/// - `working`（以及操作需要时的 `reference`）必须指向至少
///   `sample_count() * |depth|` 字节、按深度对齐、在本次调用期间可写的内存；
/// - 两个区间不得重叠；
/// - 调用期间不得有其他代码访问这些区间。
///
/// # 示例
/// ```rust
/// use image_tools::container::BufferAddress;
/// use image_tools::engine::{apply, OperationRequest, PixelOperation, SubtractMode};
///
/// let mut working = vec![10u8, 20, 30, 40];
/// let mut reference = vec![5u8; 4];
/// let request = OperationRequest {
///     working: BufferAddress::from_mut_ptr(working.as_mut_ptr()),
///     reference: Some(BufferAddress::from_mut_ptr(reference.as_mut_ptr())),
///     width: 2,
///     height: 2,
///     channels: 1,
///     depth: 1,
/// };
/// let op = PixelOperation::SubtractWorkingImageFromReference(SubtractMode::Clamped);
/// unsafe { apply(op, &request)? };
/// assert_eq!(working, vec![0, 0, 0, 0]);
/// # Ok::<(), image_tools::ToolError>(())
/// ```
pub unsafe fn apply(operation: PixelOperation, request: &OperationRequest) -> Result<()> {
    let depth = Depth::from_tag(request.depth).ok_or(ToolError::UnsupportedDepth {
        depth: request.depth,
        operation: operation.name(),
    })?;

    let samples = request.sample_count();
    let working = SampleView::new(request.working, samples, depth);
    let reference = request
        .reference
        .map(|address| SampleView::new(address, samples, depth));

    log::debug!(
        "⚙️ {} - {}x{}x{} depth={} samples={}",
        operation.name(),
        request.width,
        request.height,
        request.channels,
        depth,
        samples
    );

    // SAFETY: 调用方保证区间有效、对齐、互不重叠。
    dispatch_depth!(depth, T => unsafe { run::<T>(operation, &working, reference.as_ref()) })
}

fn required<'a>(reference: Option<&'a SampleView>, operation: &PixelOperation) -> Result<&'a SampleView> {
    reference.ok_or_else(|| {
        log::debug!("{} 缺少参考图缓冲区", operation.name());
        ToolError::MissingKey(keys::REFERENCE_IMAGE_BUFFER.to_string())
    })
}

/// # Safety
///
/// 与 [`apply`] 相同。
unsafe fn run<T: Sample>(
    operation: PixelOperation,
    working: &SampleView,
    reference: Option<&SampleView>,
) -> Result<()> {
    // SAFETY: 调用方保证工作图区间有效且独占。
    let working = unsafe { working.as_slice_mut::<T>() };

    if let PixelOperation::Invert { min, max } = operation {
        kernels::invert(working, T::from_brightness(min), T::from_brightness(max));
        return Ok(());
    }

    let reference = required(reference, &operation)?;
    // SAFETY: 调用方保证参考图区间有效、独占且与工作图不重叠。
    let reference = unsafe { reference.as_slice_mut::<T>() };

    match operation {
        PixelOperation::Swap => kernels::swap(working, reference),
        PixelOperation::CopyLeftToRight => kernels::copy_left_to_right(working, reference),
        PixelOperation::CopyRightToLeft => kernels::copy_right_to_left(working, reference),
        PixelOperation::SubtractWorkingImageFromReference(mode) => {
            kernels::subtract_working_from_reference(working, reference, mode)
        }
        PixelOperation::SubtractReferenceFromWorkingImage(mode) => {
            kernels::subtract_reference_from_working(working, reference, mode)
        }
        PixelOperation::Invert { .. } => {}
    }

    Ok(())
}
