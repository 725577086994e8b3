//! # 图像工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                宿主 (CLI / 嵌入式调用方)                  │
//! │                                                          │
//! │   Container { buffer, width, height, channels, depth, …} │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ 容器协议 (成功：结果键；失败：仅 error 键)
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕              库 (Rust)                            │
//! │                                                          │
//! │  ┌─ boundary ──── ImageTools：解码 → 校验 → 分发 → 编码   │
//! │  │   ├─ engine    深度分发 + 泛型像素内核（原地运算）     │
//! │  │   └─ codec     光栅 (image crate) / FITS 读写          │
//! │  │        └─ CodecRuntime   进程级初始化一次              │
//! │  │                                                       │
//! │  ├─ container ─── Value / Container / BufferAddress       │
//! │  ├─ bitmap ────── 拥有型位图 (形状 + 深度 + 亮度范围)      │
//! │  ├─ sample ────── Depth 标签 + Sample trait               │
//! │  └─ error ─────── ToolError (统一错误类型)                 │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `ToolError` |
//! | [`sample`] | 五种采样类型与深度标签的对应关系 |
//! | [`container`] | 键值交换单元、原始地址与借用视图 |
//! | [`bitmap`] | 拥有型位图及其与容器的互转 |
//! | [`codec`] | 按扩展名选择的光栅 / FITS 编解码桥接 |
//! | [`engine`] | 交换、复制、反相、三种相减策略 |
//! | [`boundary`] | 面向宿主的入口，所有失败在此转换为 `error` 容器 |

pub mod error;
pub mod sample;
pub mod container;
pub mod bitmap;
pub mod codec;
pub mod engine;
pub mod boundary;

pub use bitmap::Bitmap;
pub use boundary::ImageTools;
pub use codec::{CodecConfig, CodecRuntime};
pub use container::{BufferAddress, Container, SampleView, Value};
pub use engine::{PixelOperation, SubtractMode};
pub use error::{Result, ToolError};
pub use sample::{Depth, Sample};
