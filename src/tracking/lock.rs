//! 身份锁定控制器 (Identity Lock Controller)
//!
//! ```text
//!            activate                 信标距离匹配
//!  INACTIVE ─────────▶ LOCK_ON ───────────────────▶ TRACKING
//!     ▲                  ▲  ▲                           │
//!     │ deactivate       │  └───── 丢失 > 上限 ─────────┤
//!     └──────────────────┴───────── (任意状态) ─────────┘
//! ```
//!
//! - LOCK_ON: 一次性识别。估计每个检测的距离, 取与信标距离差最小者。
//! - TRACKING: 逐帧用 IoU 保持身份连续, 容忍短暂遮挡。
//!
//! 控制器不持有特征工程器与缓冲; 需要清空时通过
//! [`LockUpdate::reset_required`] 通知调用方。

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::beacon::BeaconSource;
use super::distance::DistanceEstimator;
use crate::detection::types::{compute_iou, BBox, Detection};

/// 锁定模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LockMode {
    #[serde(rename = "INACTIVE")]
    Inactive,
    #[serde(rename = "LOCK_ON")]
    LockOn,
    #[serde(rename = "TRACKING")]
    Tracking,
}

impl LockMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockMode::Inactive => "INACTIVE",
            LockMode::LockOn => "LOCK_ON",
            LockMode::Tracking => "TRACKING",
        }
    }
}

/// 锁定状态只读视图 (遥测用)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    pub mode: LockMode,
    pub target: Option<BBox>,
    pub loss_count: u32,
    pub calibration_scale: f32,
}

/// 单帧状态变化
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LockTransition {
    /// 未激活, 不做任何处理
    Idle,
    /// 锁定中, 本帧无可用检测或信标读数
    Searching,
    /// 锁定成功
    Acquired {
        beacon_distance_m: f32,
        estimated_distance_m: f32,
    },
    /// IoU 匹配成功
    Retained { iou: f32 },
    /// 本帧未匹配, 计入丢失
    Missed { loss_count: u32 },
    /// 连续丢失超过上限, 退回锁定
    Lost,
}

/// 单帧结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockUpdate {
    /// 本帧目标在检测列表中的下标
    pub target: Option<usize>,
    /// 调用方须清空特征工程器与缓冲
    pub reset_required: bool,
    pub transition: LockTransition,
}

impl LockUpdate {
    fn without_target(transition: LockTransition) -> Self {
        Self {
            target: None,
            reset_required: false,
            transition,
        }
    }
}

pub struct LockController {
    mode: LockMode,
    target: Option<BBox>,
    loss_count: u32,
    iou_threshold: f32,
    max_lost_frames: u32,
    estimator: DistanceEstimator,
}

impl LockController {
    pub fn new(estimator: DistanceEstimator, iou_threshold: f32, max_lost_frames: u32) -> Self {
        Self {
            mode: LockMode::Inactive,
            target: None,
            loss_count: 0,
            iou_threshold,
            max_lost_frames,
            estimator,
        }
    }

    /// 任意状态 → LOCK_ON, 清除目标
    ///
    /// 调用方须同时清空特征工程器与缓冲
    pub fn activate(&mut self) {
        let previous = self.mode;
        self.target = None;
        self.loss_count = 0;
        self.mode = LockMode::LockOn;
        info!("🎯 激活: {} → {}, 开始锁定目标", previous.as_str(), self.mode.as_str());
    }

    /// 任意状态 → INACTIVE
    pub fn deactivate(&mut self) {
        let previous = self.mode;
        self.target = None;
        self.loss_count = 0;
        self.mode = LockMode::Inactive;
        info!("⏹️ 停用: {} → {}, 已释放目标", previous.as_str(), self.mode.as_str());
    }

    /// 处理一帧检测结果
    ///
    /// 只在 LOCK_ON 时读取信标
    pub fn update(&mut self, detections: &[Detection], beacon: &mut dyn BeaconSource) -> LockUpdate {
        match self.mode {
            LockMode::Inactive => LockUpdate::without_target(LockTransition::Idle),
            LockMode::LockOn => self.lock_on(detections, beacon),
            LockMode::Tracking => self.track(detections),
        }
    }

    fn lock_on(&mut self, detections: &[Detection], beacon: &mut dyn BeaconSource) -> LockUpdate {
        if detections.is_empty() {
            return LockUpdate::without_target(LockTransition::Searching);
        }
        let Some(beacon_distance) = beacon.read_distance() else {
            return LockUpdate::without_target(LockTransition::Searching);
        };

        // 距离差最小者; 并列取靠前的检测
        let mut best: Option<(usize, f32, f32)> = None;
        for (i, det) in detections.iter().enumerate() {
            let height = det.bbox.height();
            // 高度非正或为 NaN 的框不参与
            if height.is_nan() || height <= 0.0 {
                continue;
            }
            let estimated = self.estimator.estimate(height);
            let diff = (estimated - beacon_distance).abs();
            if !diff.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, d, _)| diff < d) {
                best = Some((i, diff, estimated));
            }
        }

        let Some((idx, _, estimated)) = best else {
            return LockUpdate::without_target(LockTransition::Searching);
        };

        let bbox = detections[idx].bbox.clone();
        self.estimator.refine(beacon_distance, bbox.height());
        info!(
            "🔒 目标已锁定: 信标 {:.2}m / 估计 {:.2}m, 标定系数 {:.1}",
            beacon_distance,
            estimated,
            self.estimator.scale()
        );

        self.target = Some(bbox);
        self.loss_count = 0;
        self.mode = LockMode::Tracking;

        LockUpdate {
            target: Some(idx),
            reset_required: false,
            transition: LockTransition::Acquired {
                beacon_distance_m: beacon_distance,
                estimated_distance_m: estimated,
            },
        }
    }

    fn track(&mut self, detections: &[Detection]) -> LockUpdate {
        let Some(previous) = self.target.as_ref() else {
            // 跟踪中必有目标; 状态不一致时重新锁定
            self.mode = LockMode::LockOn;
            return LockUpdate {
                target: None,
                reset_required: true,
                transition: LockTransition::Lost,
            };
        };

        let mut best: Option<(usize, f32)> = None;
        for (i, det) in detections.iter().enumerate() {
            let iou = compute_iou(previous, &det.bbox);
            if best.map_or(true, |(_, b)| iou > b) {
                best = Some((i, iou));
            }
        }

        if let Some((idx, iou)) = best.filter(|&(_, iou)| iou >= self.iou_threshold) {
            self.target = Some(detections[idx].bbox.clone());
            self.loss_count = 0;
            return LockUpdate {
                target: Some(idx),
                reset_required: false,
                transition: LockTransition::Retained { iou },
            };
        }

        self.loss_count += 1;
        if self.loss_count > self.max_lost_frames {
            warn!(
                "⚠️ 目标丢失 {} 帧, 重新锁定",
                self.loss_count
            );
            self.target = None;
            self.loss_count = 0;
            self.mode = LockMode::LockOn;
            return LockUpdate {
                target: None,
                reset_required: true,
                transition: LockTransition::Lost,
            };
        }

        LockUpdate::without_target(LockTransition::Missed {
            loss_count: self.loss_count,
        })
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn target(&self) -> Option<&BBox> {
        self.target.as_ref()
    }

    pub fn loss_count(&self) -> u32 {
        self.loss_count
    }

    pub fn estimator(&self) -> &DistanceEstimator {
        &self.estimator
    }

    pub fn state(&self) -> LockState {
        LockState {
            mode: self.mode,
            target: self.target.clone(),
            loss_count: self.loss_count,
            calibration_scale: self.estimator.scale(),
        }
    }
}
