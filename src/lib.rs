#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod analysis; // 姿态分析: 特征 / 窗口 / 事件分类
pub mod config; // 运行配置
pub mod detection; // 检测接口与录制回放
pub mod error; // 错误类型
pub mod models; // 异常评分模型
pub mod pipeline; // 监控流水线
pub mod tracking; // 目标锁定

pub use crate::analysis::{classify, AnomalyEvent, AnomalyLabel, FeatureEngineer, SequenceBuffer};
pub use crate::config::SentinelConfig;
pub use crate::detection::{BBox, Detection, Frame, FrameSource, PoseDetector, PoseKeypoints};
pub use crate::error::{SentinelError, SentinelResult};
pub use crate::models::{AnomalyScorer, AutoencoderScorer, OnnxReconstructor, ScoreProfile, ScoreResult};
pub use crate::pipeline::{ControlFlags, Pipeline, SharedState, TelemetrySnapshot, Worker};
pub use crate::tracking::{BeaconSource, DistanceEstimator, LockController, LockMode};

/// 带分隔符的本地时间字符串 (文件名用)
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}
