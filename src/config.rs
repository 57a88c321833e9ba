//! 运行配置 - JSON 文件 + 环境变量覆盖
//!
//! 优先级: 环境变量 > JSON 文件 > 默认值。启动后固定, 工作线程持有副本。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{SentinelError, SentinelResult};
use crate::tracking::DistanceEstimator;

/// 哨兵参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SentinelConfig {
    // === 序列参数 ===
    pub window_size: usize, // 评分窗口长度
    pub stride: usize,      // 满窗后每 N 次追加评分一次
    pub frame_step: usize,  // 每 N 个有目标的帧取一帧进入特征路径

    // === 锁定参数 ===
    pub iou_threshold: f32,   // 跟踪 IoU 阈值
    pub max_lost_frames: u32, // 最大连续丢失帧数

    // === 相机/距离参数 ===
    pub camera_vfov_deg: f32,              // 垂直视场角
    pub person_height_m: f32,              // 人体平均身高
    pub image_height_px: u32,              // 画面高度
    pub calibration_override: Option<f32>, // 固定标定系数

    // === 评分参数 ===
    pub threshold_override: Option<f32>, // 固定异常阈值

    // === 其它 ===
    pub min_detection_confidence: f32, // 检测置信度下限
    pub auto_activate: bool,           // 启动即激活
    pub preview_quality: u8,           // 预览 JPEG 质量
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            window_size: 9,
            stride: 1,
            frame_step: 1,

            iou_threshold: 0.3,
            max_lost_frames: 15,

            camera_vfov_deg: 48.8,
            person_height_m: 1.7,
            image_height_px: 480,
            calibration_override: None,

            threshold_override: None,

            min_detection_confidence: 0.45,
            auto_activate: false,
            preview_quality: 80,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> SentinelResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SentinelError::config(format!("{}: cannot parse '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> SentinelResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SentinelError::config(format!("{}: cannot parse '{}'", key, value))),
    }
}

/// 空字符串视为未设置
fn parse_optional(key: &str, value: &str) -> SentinelResult<Option<f32>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        parse_env(key, value).map(Some)
    }
}

impl SentinelConfig {
    /// 从JSON文件加载配置; 文件不存在时写出默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> SentinelResult<Self> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => {
                let config: Self = serde_json::from_str(&json).map_err(|e| {
                    SentinelError::config(format!("{}: {}", path.display(), e))
                })?;
                info!("✅ 配置已从 {} 加载", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                config.save(path)?;
                Ok(config)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> SentinelResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        info!("💾 配置已保存到 {}", path.as_ref().display());
        Ok(())
    }

    /// 应用进程环境变量
    pub fn apply_env_overrides(&mut self) -> SentinelResult<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    /// 应用环境变量覆盖 (`lookup` 便于测试注入)
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F) -> SentinelResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        macro_rules! override_field {
            ($key:literal, $field:expr, $parse:expr) => {
                if let Some(v) = lookup($key) {
                    $field = $parse($key, &v)?;
                }
            };
        }

        override_field!("SENTINEL_WINDOW_SIZE", self.window_size, parse_env);
        override_field!("SENTINEL_STRIDE", self.stride, parse_env);
        override_field!("SENTINEL_FRAME_STEP", self.frame_step, parse_env);
        override_field!("SENTINEL_IOU_THRESHOLD", self.iou_threshold, parse_env);
        override_field!("SENTINEL_MAX_LOST_FRAMES", self.max_lost_frames, parse_env);
        override_field!("SENTINEL_CAMERA_VFOV_DEG", self.camera_vfov_deg, parse_env);
        override_field!("SENTINEL_PERSON_HEIGHT_M", self.person_height_m, parse_env);
        override_field!("SENTINEL_IMAGE_HEIGHT_PX", self.image_height_px, parse_env);
        override_field!(
            "SENTINEL_CALIBRATION_OVERRIDE",
            self.calibration_override,
            parse_optional
        );
        override_field!(
            "SENTINEL_ANOMALY_THRESHOLD",
            self.threshold_override,
            parse_optional
        );
        override_field!(
            "SENTINEL_MIN_DETECTION_CONFIDENCE",
            self.min_detection_confidence,
            parse_env
        );
        override_field!("SENTINEL_AUTO_ACTIVATE", self.auto_activate, parse_bool);
        override_field!("SENTINEL_PREVIEW_QUALITY", self.preview_quality, parse_env);
        Ok(())
    }

    /// 参数合法性检查
    pub fn validate(&self) -> SentinelResult<()> {
        if self.window_size == 0 || self.stride == 0 || self.frame_step == 0 {
            return Err(SentinelError::config(
                "window_size, stride and frame_step must be >= 1",
            ));
        }
        if !(self.iou_threshold > 0.0 && self.iou_threshold <= 1.0) {
            return Err(SentinelError::config(format!(
                "iou_threshold must be in (0, 1], got {}",
                self.iou_threshold
            )));
        }
        if !(self.camera_vfov_deg > 0.0 && self.camera_vfov_deg < 180.0) {
            return Err(SentinelError::config(format!(
                "camera_vfov_deg must be in (0, 180), got {}",
                self.camera_vfov_deg
            )));
        }
        if self.person_height_m <= 0.0 || self.image_height_px == 0 {
            return Err(SentinelError::config(
                "person_height_m and image_height_px must be positive",
            ));
        }
        if matches!(self.calibration_override, Some(s) if s <= 0.0 || !s.is_finite()) {
            return Err(SentinelError::config("calibration_override must be positive"));
        }
        if matches!(self.threshold_override, Some(t) if t < 0.0 || !t.is_finite()) {
            return Err(SentinelError::config(
                "threshold_override must be finite and non-negative",
            ));
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(SentinelError::config(
                "min_detection_confidence must be in [0, 1]",
            ));
        }
        if self.preview_quality == 0 || self.preview_quality > 100 {
            return Err(SentinelError::config("preview_quality must be in 1..=100"));
        }
        Ok(())
    }

    /// 按配置构造距离估计器
    pub fn distance_estimator(&self) -> DistanceEstimator {
        match self.calibration_override {
            Some(scale) => DistanceEstimator::with_fixed_scale(scale),
            None => DistanceEstimator::from_optics(
                self.camera_vfov_deg,
                self.person_height_m,
                self.image_height_px,
            ),
        }
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前配置:");
        info!("  窗口/步长/取帧: {} / {} / {}", self.window_size, self.stride, self.frame_step);
        info!("  IoU阈值: {:.2}, 最大丢失帧: {}", self.iou_threshold, self.max_lost_frames);
        info!(
            "  视场角 {:.1}°, 身高 {:.2}m, 画面高 {}px",
            self.camera_vfov_deg, self.person_height_m, self.image_height_px
        );
        if let Some(scale) = self.calibration_override {
            info!("  固定标定系数: {:.1}", scale);
        }
        if let Some(t) = self.threshold_override {
            info!("  固定异常阈值: {:.6}", t);
        }
    }
}
