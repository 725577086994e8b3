//! # 采样类型模块
//!
//! ## 设计思路
//!
//! 深度标签（1 / 2 / 4 / 8 / -8）在边界处是一个有符号整数，进入 Rust 后立即收敛为
//! 封闭枚举 `Depth`，再由 `Sample` trait 把五种数值类型的差异（无符号回绕、浮点有符号）
//! 集中在一处。算法主体只写一份泛型实现。
//!
//! ## 实现思路
//!
//! - `Depth::from_tag` 是唯一的整数 → 深度入口，未知标签一律返回 `None`。
//! - `Sample::minus` 对无符号类型使用回绕减法，与原生整数运算语义一致。
//! - `Sample::CLAMPS_NEGATIVE` 标记“钳制到 0”策略是否适用；浮点为 `false`。
//! - `dispatch_depth!` 把运行期深度映射为编译期类型参数。

use std::fmt;

/// 采样深度（每通道字节数及数值类型）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Depth {
    U8,
    U16,
    U32,
    U64,
    F64,
}

impl Depth {
    pub const ALL: [Depth; 5] = [Depth::U8, Depth::U16, Depth::U32, Depth::U64, Depth::F64];

    /// 从边界深度标签解析。
    ///
    /// # 示例
    /// ```rust
    /// use image_tools::Depth;
    ///
    /// assert_eq!(Depth::from_tag(-8), Some(Depth::F64));
    /// assert_eq!(Depth::from_tag(3), None);
    /// ```
    pub const fn from_tag(tag: i64) -> Option<Self> {
        match tag {
            1 => Some(Self::U8),
            2 => Some(Self::U16),
            4 => Some(Self::U32),
            8 => Some(Self::U64),
            -8 => Some(Self::F64),
            _ => None,
        }
    }

    /// 输出边界深度标签；浮点为负数。
    pub const fn tag(self) -> i64 {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
            Self::F64 => -8,
        }
    }

    /// 单个采样占用的字节数（`|depth|`）。
    pub const fn byte_size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 | Self::F64 => 8,
        }
    }

    pub const fn is_float(self) -> bool {
        matches!(self, Self::F64)
    }
}

impl fmt::Display for Depth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::U16 => write!(f, "u16"),
            Self::U32 => write!(f, "u32"),
            Self::U64 => write!(f, "u64"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

/// 像素运算引擎可处理的采样类型。
pub trait Sample: bytemuck::Pod + PartialOrd + Default + fmt::Debug + Send + Sync + 'static {
    /// 对应的深度标签。
    const DEPTH: Depth;

    /// 相减模式 0 是否把负结果钳制为 0。
    ///
    /// 无符号类型为 `true`；浮点为 `false`，模式 0 与模式 1 结果相同。
    const CLAMPS_NEGATIVE: bool;

    /// `self - rhs`，无符号类型按回绕语义。
    fn minus(self, rhs: Self) -> Self;

    /// 将浮点亮度边界转换为该采样类型。
    fn from_brightness(value: f64) -> Self;

    /// 该类型默认的显示亮度范围。
    fn natural_range() -> (f64, f64);
}

macro_rules! unsigned_sample {
    ($($ty:ty => $depth:ident),* $(,)?) => {
        $(
            impl Sample for $ty {
                const DEPTH: Depth = Depth::$depth;
                const CLAMPS_NEGATIVE: bool = true;

                #[inline]
                fn minus(self, rhs: Self) -> Self {
                    self.wrapping_sub(rhs)
                }

                #[inline]
                fn from_brightness(value: f64) -> Self {
                    value as $ty
                }

                fn natural_range() -> (f64, f64) {
                    (0.0, <$ty>::MAX as f64)
                }
            }
        )*
    };
}

unsigned_sample!(u8 => U8, u16 => U16, u32 => U32, u64 => U64);

impl Sample for f64 {
    const DEPTH: Depth = Depth::F64;
    const CLAMPS_NEGATIVE: bool = false;

    #[inline]
    fn minus(self, rhs: Self) -> Self {
        self - rhs
    }

    #[inline]
    fn from_brightness(value: f64) -> Self {
        value
    }

    fn natural_range() -> (f64, f64) {
        (0.0, 1.0)
    }
}

/// 按运行期深度选择采样类型并展开同一段泛型代码。
///
/// ```rust,ignore
/// dispatch_depth!(depth, T => kernels::invert::<T>(samples, min, max));
/// ```
macro_rules! dispatch_depth {
    ($depth:expr, $ty:ident => $body:expr) => {
        match $depth {
            $crate::sample::Depth::U8 => {
                type $ty = u8;
                $body
            }
            $crate::sample::Depth::U16 => {
                type $ty = u16;
                $body
            }
            $crate::sample::Depth::U32 => {
                type $ty = u32;
                $body
            }
            $crate::sample::Depth::U64 => {
                type $ty = u64;
                $body
            }
            $crate::sample::Depth::F64 => {
                type $ty = f64;
                $body
            }
        }
    };
}

pub(crate) use dispatch_depth;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip_for_every_depth() {
        for depth in Depth::ALL {
            assert_eq!(Depth::from_tag(depth.tag()), Some(depth));
        }
    }

    #[test]
    fn unknown_tags_are_rejected() {
        for tag in [0, 3, -1, -4, 16, i64::MIN] {
            assert_eq!(Depth::from_tag(tag), None, "tag {tag}");
        }
    }

    #[test]
    fn unsigned_minus_wraps_like_native_arithmetic() {
        assert_eq!(5u8.minus(10), 251);
        assert_eq!(0u64.minus(1), u64::MAX);
        assert_eq!(5.0f64.minus(10.0), -5.0);
    }

    #[test]
    fn byte_size_matches_type_width() {
        fn size_of<T: Sample>() -> usize {
            std::mem::size_of::<T>()
        }
        assert_eq!(size_of::<u8>(), Depth::U8.byte_size());
        assert_eq!(size_of::<u16>(), Depth::U16.byte_size());
        assert_eq!(size_of::<u32>(), Depth::U32.byte_size());
        assert_eq!(size_of::<u64>(), Depth::U64.byte_size());
        assert_eq!(size_of::<f64>(), Depth::F64.byte_size());
    }

    #[test]
    fn dispatch_selects_matching_type() {
        for depth in Depth::ALL {
            let selected = dispatch_depth!(depth, T => <T as Sample>::DEPTH);
            assert_eq!(selected, depth);
        }
    }
}
