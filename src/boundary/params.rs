//! # 入参解码与前置校验
//!
//! 所有键先全部解码，再做任何与内存相关的检查；只有全部检查通过后才会构造视图。

use std::collections::HashMap;

use crate::bitmap::{sample_count, Bitmap};
use crate::container::{keys, BufferAddress, Container, SampleView};
use crate::error::{Result, ToolError};
use crate::sample::Depth;

/// 已校验的图像形状。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Shape {
    pub width: usize,
    pub height: usize,
    pub channels: usize,
    pub depth: Depth,
    pub samples: usize,
}

/// 解码的缓冲区参数：地址 + 形状。
#[derive(Debug, Clone, Copy)]
pub(crate) struct BufferParams {
    pub working: BufferAddress,
    pub reference: Option<BufferAddress>,
    pub shape: Shape,
}

fn dimension(params: &Container, key: &str) -> Result<usize> {
    let value = params.integer(key)?;
    usize::try_from(value)
        .ok()
        .filter(|&v| v > 0)
        .ok_or_else(|| ToolError::InvalidBuffer(format!("'{}' 必须为正整数，实际为 {}", key, value)))
}

/// 读取 `buffer`（以及需要时的 `referenceImageBuffer`）与形状键。
pub(crate) fn decode_buffers(
    params: &Container,
    needs_reference: bool,
    operation: &'static str,
) -> Result<BufferParams> {
    let working = params.address(keys::BUFFER)?;
    let reference = if needs_reference {
        Some(params.address(keys::REFERENCE_IMAGE_BUFFER)?)
    } else {
        None
    };
    let width = params.integer(keys::WIDTH)?;
    let height = params.integer(keys::HEIGHT)?;
    let channels = params.integer(keys::CHANNELS)?;
    let tag = params.integer(keys::DEPTH)?;
    log::debug!("{} 入参: {}x{}x{} depth={}", operation, width, height, channels, tag);

    let width = dimension(params, keys::WIDTH)?;
    let height = dimension(params, keys::HEIGHT)?;
    let channels = dimension(params, keys::CHANNELS)?;
    let depth = Depth::from_tag(tag).ok_or(ToolError::UnsupportedDepth {
        depth: tag,
        operation,
    })?;

    let samples = sample_count(width, height, channels)?;
    samples
        .checked_mul(depth.byte_size())
        .ok_or_else(|| ToolError::InvalidBuffer("图像字节数溢出".to_string()))?;

    Ok(BufferParams {
        working,
        reference,
        shape: Shape {
            width,
            height,
            channels,
            depth,
            samples,
        },
    })
}

/// 校验单个地址：非空、按深度对齐；若属于已打开的图像，容量必须足够。
pub(crate) fn checked_view(
    address: BufferAddress,
    key: &str,
    shape: &Shape,
    opened: &HashMap<BufferAddress, Bitmap>,
) -> Result<SampleView> {
    if address.is_null() {
        return Err(ToolError::InvalidBuffer(format!("'{}' 地址为空", key)));
    }
    if !address.is_aligned_to(shape.depth.byte_size()) {
        return Err(ToolError::InvalidBuffer(format!(
            "'{}' 地址 {:#x} 未按 {} 字节对齐",
            key,
            address.get(),
            shape.depth.byte_size()
        )));
    }

    let view = SampleView::new(address, shape.samples, shape.depth);
    let byte_len = view
        .byte_range()
        .map(|range| range.len())
        .ok_or_else(|| ToolError::InvalidBuffer(format!("'{}' 地址区间越过地址空间上限", key)))?;

    if let Some(bitmap) = opened.get(&address) {
        if bitmap.bytes().len() < byte_len {
            return Err(ToolError::InvalidBuffer(format!(
                "'{}' 仅有 {} 字节，声明的形状需要 {} 字节",
                key,
                bitmap.bytes().len(),
                byte_len
            )));
        }
    }

    Ok(view)
}

/// 校验工作图与参考图视图，双操作数时要求区间互不重叠。
pub(crate) fn checked_operands(
    buffers: &BufferParams,
    opened: &HashMap<BufferAddress, Bitmap>,
) -> Result<(SampleView, Option<SampleView>)> {
    let working = checked_view(buffers.working, keys::BUFFER, &buffers.shape, opened)?;
    let reference = match buffers.reference {
        Some(address) => {
            let reference = checked_view(address, keys::REFERENCE_IMAGE_BUFFER, &buffers.shape, opened)?;
            if working.overlaps(&reference) {
                return Err(ToolError::InvalidBuffer("工作图与参考图缓冲区重叠".to_string()));
            }
            Some(reference)
        }
        None => None,
    };
    Ok((working, reference))
}
