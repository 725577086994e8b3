//! # 逐采样算法
//!
//! 每个操作只有一份泛型实现，五种深度共用。
//! 约定：“left” 指参考图（reference），“right” 指工作图（working）。

use crate::sample::Sample;

use super::SubtractMode;

/// 交换两幅图的对应采样。
pub fn swap<T: Sample>(working: &mut [T], reference: &mut [T]) {
    for (w, r) in working.iter_mut().zip(reference.iter_mut()) {
        std::mem::swap(w, r);
    }
}

/// `working[i] := reference[i]`
pub fn copy_left_to_right<T: Sample>(working: &mut [T], reference: &[T]) {
    for (w, r) in working.iter_mut().zip(reference) {
        *w = *r;
    }
}

/// `reference[i] := working[i]`
pub fn copy_right_to_left<T: Sample>(working: &[T], reference: &mut [T]) {
    for (w, r) in working.iter().zip(reference.iter_mut()) {
        *r = *w;
    }
}

/// `working[i] := max - (working[i] - min)`
pub fn invert<T: Sample>(working: &mut [T], min: T, max: T) {
    for w in working.iter_mut() {
        *w = max.minus(w.minus(min));
    }
}

#[inline]
fn absolute_difference<T: Sample>(a: T, b: T) -> T {
    if a > b { a.minus(b) } else { b.minus(a) }
}

/// 工作图 := 参考图 − 工作图。
pub fn subtract_working_from_reference<T: Sample>(
    working: &mut [T],
    reference: &[T],
    mode: SubtractMode,
) {
    for (w, &r) in working.iter_mut().zip(reference) {
        *w = match mode {
            SubtractMode::Absolute => absolute_difference(r, *w),
            SubtractMode::Unconditional => r.minus(*w),
            SubtractMode::Clamped if !T::CLAMPS_NEGATIVE || r >= *w => r.minus(*w),
            SubtractMode::Clamped => T::default(),
        };
    }
}

/// 工作图 := 工作图 − 参考图。
pub fn subtract_reference_from_working<T: Sample>(
    working: &mut [T],
    reference: &[T],
    mode: SubtractMode,
) {
    for (w, &r) in working.iter_mut().zip(reference) {
        *w = match mode {
            SubtractMode::Absolute => absolute_difference(r, *w),
            SubtractMode::Unconditional => w.minus(r),
            SubtractMode::Clamped if !T::CLAMPS_NEGATIVE || *w >= r => w.minus(r),
            SubtractMode::Clamped => T::default(),
        };
    }
}
