/// 姿态分析系统 (Pose Analysis)
///
/// 目标关键点 → 特征向量 → 滑动窗口 → (外部评分器) → 异常事件分类
/// - features:   特征工程
/// - buffer:     滑动窗口缓冲
/// - classifier: 多信号启发式事件分类
pub mod buffer;
pub mod classifier;
pub mod features;

pub use buffer::SequenceBuffer;
pub use classifier::{classify, AnomalyEvent, AnomalyLabel, ConfidenceTier, Signature};
pub use features::{FeatureEngineer, FeatureVector, FEATURE_LEN};

/// 评分窗口: (window_size, FEATURE_LEN), 最新的一帧在最后一行
pub type Window = ndarray::Array2<f32>;
