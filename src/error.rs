//! 错误类型 (Error types)

use thiserror::Error;

/// 核心流水线结果类型
pub type SentinelResult<T> = Result<T, SentinelError>;

/// 核心流水线错误
///
/// 核心内部没有致命错误: 检测器/评分器失败向上传给逐帧调用方,
/// 由调用方跳过该帧继续循环。
#[derive(Error, Debug)]
pub enum SentinelError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(String),

    /// 输入数据非法
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 外部检测器失败
    #[error("Detector failed: {0}")]
    Detector(String),

    /// 外部评分器失败
    #[error("Scorer failed: {0}")]
    Scorer(String),

    /// 形状不匹配
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// ONNX Runtime 错误
    #[error("ONNX Runtime error: {0}")]
    Onnx(#[from] ort::Error),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// 图像编码错误
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl SentinelError {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        SentinelError::Config(msg.into())
    }

    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        SentinelError::InvalidInput(msg.into())
    }

    pub fn detector<S: Into<String>>(msg: S) -> Self {
        SentinelError::Detector(msg.into())
    }

    pub fn scorer<S: Into<String>>(msg: S) -> Self {
        SentinelError::Scorer(msg.into())
    }

    pub fn shape_mismatch(expected: Vec<usize>, actual: Vec<usize>) -> Self {
        SentinelError::ShapeMismatch { expected, actual }
    }
}
