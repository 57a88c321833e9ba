//! 自编码器评分适配 (Autoencoder scorer adapter)
//!
//! 1. 归一化: (x - mean) / (std + ε), 逐特征
//! 2. 重建: 交给 [`Reconstructor`] 后端
//! 3. 评分: 整窗 (时间 × 特征) 的均方误差
//! 4. 判定: score > threshold

use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{AnomalyScorer, ScoreResult};
use crate::analysis::Window;
use crate::error::{SentinelError, SentinelResult};

const NORM_EPS: f32 = 1e-8;

/// 训练时导出的归一化参数与阈值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreProfile {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
    pub threshold: f32,
    pub window_size: usize,
    pub num_features: usize,
}

impl ScoreProfile {
    /// 从 JSON 文件加载并校验
    pub fn load<P: AsRef<Path>>(path: P) -> SentinelResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        let profile: ScoreProfile = serde_json::from_str(&content)?;
        profile.validate()?;
        info!(
            "📐 评分参数已加载: {} (window={}, features={}, threshold={:.6})",
            path.display(),
            profile.window_size,
            profile.num_features,
            profile.threshold
        );
        Ok(profile)
    }

    pub fn validate(&self) -> SentinelResult<()> {
        if self.mean.len() != self.num_features || self.std.len() != self.num_features {
            return Err(SentinelError::shape_mismatch(
                vec![self.num_features, self.num_features],
                vec![self.mean.len(), self.std.len()],
            ));
        }
        if self.window_size == 0 {
            return Err(SentinelError::config("score profile window_size must be > 0"));
        }
        if !self.threshold.is_finite() {
            return Err(SentinelError::config("score profile threshold must be finite"));
        }
        Ok(())
    }

    /// 逐特征归一化
    pub fn normalize(&self, window: &Window) -> SentinelResult<Array2<f32>> {
        if window.ncols() != self.num_features {
            return Err(SentinelError::shape_mismatch(
                vec![self.window_size, self.num_features],
                window.shape().to_vec(),
            ));
        }
        let mean = Array1::from_vec(self.mean.clone());
        let std = Array1::from_vec(self.std.clone()) + NORM_EPS;
        Ok((window - &mean.insert_axis(Axis(0))) / &std.insert_axis(Axis(0)))
    }
}

/// 重建后端: 输入归一化窗口 (T, F), 返回同形状重建
pub trait Reconstructor: Send {
    fn reconstruct(&mut self, input: &Array2<f32>) -> SentinelResult<Array2<f32>>;
}

/// 均方误差, 在全部元素上取平均
pub fn mean_squared_error(a: &Array2<f32>, b: &Array2<f32>) -> SentinelResult<f32> {
    if a.shape() != b.shape() {
        return Err(SentinelError::shape_mismatch(
            a.shape().to_vec(),
            b.shape().to_vec(),
        ));
    }
    let diff = a - b;
    Ok(diff.mapv(|d| d * d).mean().unwrap_or(0.0))
}

/// 自编码器评分器
pub struct AutoencoderScorer<R: Reconstructor> {
    backend: R,
    profile: ScoreProfile,
    threshold: f32,
}

impl<R: Reconstructor> AutoencoderScorer<R> {
    /// `threshold_override` 非空时替换 profile 中的阈值, 之后不再变化
    pub fn new(backend: R, profile: ScoreProfile, threshold_override: Option<f32>) -> SentinelResult<Self> {
        profile.validate()?;
        let threshold = match threshold_override {
            Some(t) if !t.is_finite() => {
                return Err(SentinelError::config(format!(
                    "threshold override must be finite, got {}",
                    t
                )));
            }
            Some(t) => {
                info!("🎚️ 异常阈值覆盖: {:.6} (原 {:.6})", t, profile.threshold);
                t
            }
            None => profile.threshold,
        };
        Ok(Self {
            backend,
            profile,
            threshold,
        })
    }

    pub fn profile(&self) -> &ScoreProfile {
        &self.profile
    }
}

impl<R: Reconstructor> AnomalyScorer for AutoencoderScorer<R> {
    fn score(&mut self, window: &Window) -> SentinelResult<ScoreResult> {
        if window.nrows() != self.profile.window_size {
            return Err(SentinelError::shape_mismatch(
                vec![self.profile.window_size, self.profile.num_features],
                window.shape().to_vec(),
            ));
        }
        let input = self.profile.normalize(window)?;
        let reconstructed = self.backend.reconstruct(&input)?;
        let mse = mean_squared_error(&input, &reconstructed)?;
        Ok(ScoreResult::new(mse, self.threshold))
    }

    fn threshold(&self) -> f32 {
        self.threshold
    }

    fn window_size(&self) -> Option<usize> {
        Some(self.profile.window_size)
    }
}
