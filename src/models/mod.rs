/// 异常评分模型接口与实现 (Anomaly Scorer)
///
/// # 架构说明
///
/// 流水线只依赖窄接口 [`AnomalyScorer`]: 输入一个完整窗口, 输出
/// {重建误差, 阈值, 是否异常}。不对模型内部结构做任何假设。
///
/// ## 自编码器适配 (Autoencoder Adapter)
/// - [`AutoencoderScorer`]: 归一化 → 重建 → 整窗 MSE → 阈值比较
/// - 归一化参数与阈值来自 [`ScoreProfile`] (JSON)
/// - 文件: `autoencoder.rs`
///
/// ## 重建后端 (Reconstructor Backends)
/// - [`OnnxReconstructor`]: ONNX Runtime 推理, 文件: `onnx.rs`
/// - 测试中使用任意实现 [`Reconstructor`] 的桩
///
/// ## 使用示例
/// ```rust,ignore
/// use pose_sentinel::models::{AnomalyScorer, AutoencoderScorer, OnnxReconstructor, ScoreProfile};
///
/// let profile = ScoreProfile::load("models/autoencoder.json")?;
/// let backend = OnnxReconstructor::new("models/autoencoder.onnx")?;
/// let mut scorer = AutoencoderScorer::new(backend, profile, None)?;
/// let result = scorer.score(&window)?;
/// ```
pub mod autoencoder;
pub mod onnx;

use serde::{Deserialize, Serialize};

use crate::analysis::Window;
use crate::error::SentinelResult;

pub use autoencoder::{AutoencoderScorer, Reconstructor, ScoreProfile};
pub use onnx::OnnxReconstructor;

/// 评分结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResult {
    /// 重建误差
    pub score: f32,
    /// 判定阈值 (进程内固定)
    pub threshold: f32,
    /// score > threshold
    pub is_anomaly: bool,
}

impl ScoreResult {
    pub fn new(score: f32, threshold: f32) -> Self {
        Self {
            score,
            threshold,
            is_anomaly: score > threshold,
        }
    }
}

/// 异常评分器统一接口
///
/// 阻塞调用; 失败由逐帧调用方处理 (跳过该帧)
pub trait AnomalyScorer: Send {
    /// 对一个完整窗口评分
    fn score(&mut self, window: &Window) -> SentinelResult<ScoreResult>;

    /// 当前阈值
    fn threshold(&self) -> f32;

    /// 期望的窗口长度, 未知时返回 None
    fn window_size(&self) -> Option<usize> {
        None
    }
}

impl<S: AnomalyScorer + ?Sized> AnomalyScorer for Box<S> {
    fn score(&mut self, window: &Window) -> SentinelResult<ScoreResult> {
        (**self).score(window)
    }

    fn threshold(&self) -> f32 {
        (**self).threshold()
    }

    fn window_size(&self) -> Option<usize> {
        (**self).window_size()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anomaly_flag_is_strictly_greater() {
        assert!(!ScoreResult::new(0.5, 0.5).is_anomaly);
        assert!(ScoreResult::new(0.51, 0.5).is_anomaly);
    }
}
