//! # 容器协议模块（container）
//!
//! ## 设计思路
//!
//! 宿主与本模块之间只交换一种数据单元：字符串键 → 类型化值的映射。
//! 值只有四种：字符串、64 位整数、双精度浮点、原始地址。
//! 容器只传递缓冲区“身份”（地址），从不转移所有权。
//!
//! ## 实现思路
//!
//! - `Value` 为封闭枚举，serde 序列化时带类型标签，任何 serde 编解码器都能无损往返。
//! - 类型化读取（`string` / `integer` / `double` / `address`）缺键返回 `MissingKey`，
//!   类型不符返回 `TypeMismatch`，均带键名。
//! - 编码永不失败；协议层不做跨键一致性校验，那是调用方的前置条件。
//! - 原始地址与借用视图见 `view` 子模块。

mod view;

pub use view::{BufferAddress, SampleView};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ToolError};

/// 约定键名。
pub mod keys {
    pub const PATH: &str = "path";
    pub const MESSAGE: &str = "message";
    pub const ERROR: &str = "error";
    pub const BUFFER: &str = "buffer";
    pub const REFERENCE_IMAGE_BUFFER: &str = "referenceImageBuffer";
    pub const WIDTH: &str = "width";
    pub const HEIGHT: &str = "height";
    pub const CHANNELS: &str = "channels";
    pub const DEPTH: &str = "depth";
    pub const MIN_BRIGHTNESS: &str = "minBrightness";
    pub const MAX_BRIGHTNESS: &str = "maxBrightness";
}

/// 容器中的单个值。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Integer(i64),
    Double(f64),
    Address(BufferAddress),
}

impl Value {
    /// 值类型名称，用于 `TypeMismatch` 诊断。
    pub fn kind(&self) -> &'static str {
        match self {
            Self::String(_) => "string",
            Self::Integer(_) => "integer",
            Self::Double(_) => "double",
            Self::Address(_) => "address",
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<BufferAddress> for Value {
    fn from(value: BufferAddress) -> Self {
        Self::Address(value)
    }
}

/// 跨边界交换单元。
///
/// 键唯一、顺序无关。内部使用 `BTreeMap` 只为输出稳定，不代表语义上的顺序。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Container {
    entries: BTreeMap<String, Value>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// 构造只含 `error` 键的失败结果。
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new().with(keys::ERROR, message.into())
    }

    /// 写入键值，返回被覆盖的旧值。
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    /// 链式写入。
    ///
    /// # 示例
    /// ```rust
    /// use image_tools::container::{keys, Container};
    ///
    /// let request = Container::new()
    ///     .with(keys::WIDTH, 2i64)
    ///     .with(keys::PATH, "out.png");
    /// assert_eq!(request.integer(keys::WIDTH)?, 2);
    /// # Ok::<(), image_tools::ToolError>(())
    /// ```
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(key, value)| (key.as_str(), value))
    }

    fn required(&self, key: &str) -> Result<&Value> {
        self.entries
            .get(key)
            .ok_or_else(|| ToolError::MissingKey(key.to_string()))
    }

    fn mismatch(key: &str, expected: &'static str, found: &Value) -> ToolError {
        ToolError::TypeMismatch {
            key: key.to_string(),
            expected,
            found: found.kind(),
        }
    }

    pub fn string(&self, key: &str) -> Result<&str> {
        match self.required(key)? {
            Value::String(value) => Ok(value),
            other => Err(Self::mismatch(key, "string", other)),
        }
    }

    pub fn integer(&self, key: &str) -> Result<i64> {
        match self.required(key)? {
            Value::Integer(value) => Ok(*value),
            other => Err(Self::mismatch(key, "integer", other)),
        }
    }

    pub fn double(&self, key: &str) -> Result<f64> {
        match self.required(key)? {
            Value::Double(value) => Ok(*value),
            other => Err(Self::mismatch(key, "double", other)),
        }
    }

    pub fn address(&self, key: &str) -> Result<BufferAddress> {
        match self.required(key)? {
            Value::Address(value) => Ok(*value),
            other => Err(Self::mismatch(key, "address", other)),
        }
    }

    /// 可选浮点键：缺失返回 `None`，存在但类型不符仍是错误。
    pub fn optional_double(&self, key: &str) -> Result<Option<f64>> {
        if self.contains_key(key) {
            self.double(key).map(Some)
        } else {
            Ok(None)
        }
    }

    /// 失败结果中的错误消息。
    pub fn error(&self) -> Option<&str> {
        match self.entries.get(keys::ERROR) {
            Some(Value::String(message)) => Some(message),
            _ => None,
        }
    }

    /// 成功结果附带的非致命提示。
    pub fn message(&self) -> Option<&str> {
        match self.entries.get(keys::MESSAGE) {
            Some(Value::String(message)) => Some(message),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.contains_key(keys::ERROR)
    }
}
