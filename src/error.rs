//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义全局统一的 `ToolError` 枚举，覆盖协议解码、编解码桥接、像素运算三条链路。
//! 所有失败最终在边界入口被转换为只含 `error` 键的容器，不以 panic 形式泄露给宿主。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，便于 CLI 以 JSON 输出。

use serde::Serialize;

/// 图像工具统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// 容器缺少必需键
    #[error("容器缺少必需键 '{0}'")]
    MissingKey(String),

    /// 容器中键的值类型与声明不符
    #[error("容器键 '{key}' 类型不匹配：期望 {expected}，实际 {found}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    /// 输入文件不存在
    #[error("输入文件不存在：'{0}'")]
    FileNotFound(String),

    /// 底层编解码库报告失败（携带库状态码与消息）
    #[error("{library} 编解码失败（状态码 {status}）：{message}")]
    Codec {
        library: &'static str,
        status: i32,
        message: String,
    },

    /// 仅支持一维或二维图像
    #[error("仅支持一维或二维图像，实际维度为 {0}")]
    UnsupportedDimensionality(i64),

    /// 不支持的采样深度（附带发起该请求的操作名）
    #[error("不支持的深度 {depth}（操作：{operation}）")]
    UnsupportedDepth { depth: i64, operation: &'static str },

    /// 语义层面的格式拒绝，例如浮点图写入非 FITS、彩色图写入 FITS
    #[error("不支持的格式：{0}")]
    UnsupportedFormat(String),

    /// 相减模式只允许 0 / 1 / 2
    #[error("不支持的相减模式 {0}（可选：0 / 1 / 2）")]
    UnsupportedMode(i64),

    /// 缓冲区地址、尺寸或重叠关系不满足调用前置条件
    #[error("缓冲区无效：{0}")]
    InvalidBuffer(String),

    /// 配置项越界
    #[error("配置无效：{0}")]
    InvalidConfig(String),

    /// 编解码运行时尚未由宿主初始化
    #[error("编解码运行时尚未初始化，请先调用 CodecRuntime::initialize")]
    NotInitialized,

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 将错误序列化为人类可读的字符串。
impl Serialize for ToolError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T, E = ToolError> = std::result::Result<T, E>;
