//! # 原始地址与借用视图
//!
//! ## 设计思路
//!
//! 宿主通过容器传来的缓冲区地址只在本次调用期间有效，且不附带所有权。
//! 这里把它建模为两层：
//! - `BufferAddress`：不透明的地址值，可安全地存取、比较、序列化；
//! - `SampleView`：(地址, 采样数, 深度) 三元组，非拥有型借用视图。
//!
//! 只有把视图转换成切片的那一步是 `unsafe`，调用方必须保证地址在本次调用内
//! 指向至少 `byte_len()` 字节、按深度对齐、可写的内存。

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::sample::{Depth, Sample};

/// 宿主缓冲区地址（不拥有内存）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BufferAddress(usize);

impl BufferAddress {
    pub const NULL: BufferAddress = BufferAddress(0);

    /// 由整数地址构造（例如从线协议中读出）。
    pub const fn from_raw(address: usize) -> Self {
        Self(address)
    }

    /// 由可变指针构造，同时暴露其来源以便之后还原为指针。
    pub fn from_mut_ptr<T>(ptr: *mut T) -> Self {
        Self(ptr.expose_provenance())
    }

    pub const fn get(self) -> usize {
        self.0
    }

    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    pub const fn is_aligned_to(self, align: usize) -> bool {
        align != 0 && self.0 % align == 0
    }

    pub(crate) fn as_mut_ptr<T>(self) -> *mut T {
        std::ptr::with_exposed_provenance_mut(self.0)
    }
}

/// 非拥有型采样视图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleView {
    address: BufferAddress,
    samples: usize,
    depth: Depth,
}

impl SampleView {
    pub const fn new(address: BufferAddress, samples: usize, depth: Depth) -> Self {
        Self {
            address,
            samples,
            depth,
        }
    }

    pub const fn address(&self) -> BufferAddress {
        self.address
    }

    pub const fn samples(&self) -> usize {
        self.samples
    }

    pub const fn depth(&self) -> Depth {
        self.depth
    }

    /// 视图覆盖的字节数；溢出时返回 `None`。
    pub fn byte_len(&self) -> Option<usize> {
        self.samples.checked_mul(self.depth.byte_size())
    }

    /// 视图覆盖的地址区间。
    pub fn byte_range(&self) -> Option<Range<usize>> {
        let len = self.byte_len()?;
        let start = self.address.get();
        Some(start..start.checked_add(len)?)
    }

    /// 两个视图的地址区间是否相交。
    pub fn overlaps(&self, other: &SampleView) -> bool {
        match (self.byte_range(), other.byte_range()) {
            (Some(a), Some(b)) => a.start < b.end && b.start < a.end,
            _ => true,
        }
    }

    /// 以字节切片只读借用。
    ///
    /// # Safety
    ///
    /// 地址非空，且在返回切片存活期间指向至少 `byte_len()` 字节的有效内存，
    /// 期间不得被其他代码写入。
    pub unsafe fn as_bytes<'a>(&self) -> &'a [u8] {
        if self.samples == 0 {
            return &[];
        }
        // SAFETY: 由调用方保证地址有效且区间不越界。
        unsafe {
            std::slice::from_raw_parts(
                self.address.as_mut_ptr::<u8>() as *const u8,
                self.samples * self.depth.byte_size(),
            )
        }
    }

    /// 以类型化切片可变借用。
    ///
    /// # Safety
    ///
    /// - `T::DEPTH` 必须等于视图深度；
    /// - 地址非空、按 `T` 对齐，并在返回切片存活期间指向至少 `byte_len()` 字节的可写内存；
    /// - 切片存活期间不存在指向同一区间的其他引用。
    pub unsafe fn as_slice_mut<'a, T: Sample>(&self) -> &'a mut [T] {
        debug_assert_eq!(T::DEPTH, self.depth);
        if self.samples == 0 {
            return &mut [];
        }
        // SAFETY: 由调用方保证对齐、长度与独占性。
        unsafe { std::slice::from_raw_parts_mut(self.address.as_mut_ptr::<T>(), self.samples) }
    }
}
