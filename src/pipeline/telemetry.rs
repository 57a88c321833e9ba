//! 遥测快照与共享状态 (Telemetry)
//!
//! 工作线程每处理一帧发布一次完整快照; 读者 (图像导出 / 遥测导出 / 告警轮询)
//! 按各自节奏读取最新快照。互斥锁只在替换/复制 `Arc` 时持有。

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnomalyLabel, ConfidenceTier};
use crate::tracking::{LockMode, LockState};

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineStatus {
    #[serde(rename = "Waiting for activation")]
    WaitingForActivation,
    #[serde(rename = "Locking on...")]
    LockingOn,
    #[serde(rename = "No person detected")]
    NoPerson,
    #[serde(rename = "Waiting for buffer...")]
    WaitingForBuffer,
    #[serde(rename = "Normal")]
    Normal,
    #[serde(rename = "ANOMALY DETECTED")]
    Anomaly,
}

impl PipelineStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::WaitingForActivation => "Waiting for activation",
            PipelineStatus::LockingOn => "Locking on...",
            PipelineStatus::NoPerson => "No person detected",
            PipelineStatus::WaitingForBuffer => "Waiting for buffer...",
            PipelineStatus::Normal => "Normal",
            PipelineStatus::Anomaly => "ANOMALY DETECTED",
        }
    }
}

/// 告警轮询结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertStatus {
    pub is_anomaly: bool,
    pub anomaly_type: Option<AnomalyLabel>,
    pub confidence: f32,
    pub tier: Option<ConfidenceTier>,
    /// Unix 毫秒; 尚未评分时为 0
    pub timestamp_ms: i64,
}

impl Default for AlertStatus {
    fn default() -> Self {
        Self {
            is_anomaly: false,
            anomaly_type: None,
            confidence: 0.0,
            tier: None,
            timestamp_ms: 0,
        }
    }
}

impl AlertStatus {
    /// 相对 `previous` 出现新异常: 从正常进入异常, 或异常标签改变
    pub fn is_new_anomaly(&self, previous: &AlertStatus) -> bool {
        self.is_anomaly && (!previous.is_anomaly || self.anomaly_type != previous.anomaly_type)
    }

    /// 相对 `previous` 恢复正常
    pub fn is_recovery(&self, previous: &AlertStatus) -> bool {
        previous.is_anomaly && !self.is_anomaly
    }

    /// 需要输出一条告警记录
    pub fn should_report(&self, previous: &AlertStatus) -> bool {
        self.is_new_anomaly(previous) || self.is_recovery(previous)
    }
}

/// 单帧遥测快照 (只读)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub frame_index: u64,
    pub timestamp_ms: i64,
    pub fps: f32,
    pub status: PipelineStatus,
    pub score: f32,
    pub threshold: f32,
    pub is_anomaly: bool,
    pub anomaly_type: Option<AnomalyLabel>,
    pub anomaly_confidence: f32,
    pub anomaly_tier: Option<ConfidenceTier>,
    pub buffer_fill: usize,
    pub buffer_size: usize,
    /// 工程特征, 角度为度
    pub engineered: BTreeMap<String, f32>,
    /// 关键关节 [x, y, conf] (像素)
    pub joints: BTreeMap<String, [f32; 3]>,
    pub lock: LockState,
}

impl Default for TelemetrySnapshot {
    fn default() -> Self {
        Self {
            frame_index: 0,
            timestamp_ms: 0,
            fps: 0.0,
            status: PipelineStatus::WaitingForActivation,
            score: 0.0,
            threshold: 0.0,
            is_anomaly: false,
            anomaly_type: None,
            anomaly_confidence: 0.0,
            anomaly_tier: None,
            buffer_fill: 0,
            buffer_size: 0,
            engineered: BTreeMap::new(),
            joints: BTreeMap::new(),
            lock: LockState {
                mode: LockMode::Inactive,
                target: None,
                loss_count: 0,
                calibration_scale: 0.0,
            },
        }
    }
}

#[derive(Default)]
struct Published {
    snapshot: Arc<TelemetrySnapshot>,
    preview: Option<Arc<Vec<u8>>>,
    alert: AlertStatus,
}

/// 跨线程共享的最新发布结果
#[derive(Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<Published>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子替换快照/预览/告警; `preview` 为 None 时保留上一张预览
    pub fn publish(&self, snapshot: TelemetrySnapshot, preview: Option<Vec<u8>>, alert: AlertStatus) {
        let snapshot = Arc::new(snapshot);
        let preview = preview.map(Arc::new);
        let mut guard = self.inner.lock();
        guard.snapshot = snapshot;
        if preview.is_some() {
            guard.preview = preview;
        }
        guard.alert = alert;
    }

    pub fn snapshot(&self) -> Arc<TelemetrySnapshot> {
        Arc::clone(&self.inner.lock().snapshot)
    }

    pub fn preview(&self) -> Option<Arc<Vec<u8>>> {
        self.inner.lock().preview.clone()
    }

    pub fn alert(&self) -> AlertStatus {
        self.inner.lock().alert
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_text_matches_serialization() {
        for status in [
            PipelineStatus::WaitingForActivation,
            PipelineStatus::LockingOn,
            PipelineStatus::NoPerson,
            PipelineStatus::WaitingForBuffer,
            PipelineStatus::Normal,
            PipelineStatus::Anomaly,
        ] {
            let json = serde_json::to_string(&status).unwrap();
            assert_eq!(json, format!("\"{}\"", status.as_str()));
        }
    }

    fn alert(label: Option<AnomalyLabel>) -> AlertStatus {
        AlertStatus {
            is_anomaly: label.is_some(),
            anomaly_type: label,
            confidence: if label.is_some() { 0.5 } else { 0.0 },
            tier: label.map(|_| ConfidenceTier::Medium),
            timestamp_ms: 1,
        }
    }

    #[test]
    fn test_alert_reports_label_change_between_anomalies() {
        let swaying = alert(Some(AnomalyLabel::Swaying));
        let fainting = alert(Some(AnomalyLabel::Fainting));

        assert!(fainting.is_new_anomaly(&swaying));
        assert!(fainting.should_report(&swaying));
        assert!(!fainting.is_recovery(&swaying));
    }

    #[test]
    fn test_alert_reports_enter_and_recover_only() {
        let swaying = alert(Some(AnomalyLabel::Swaying));
        let normal = alert(None);

        assert!(swaying.should_report(&normal));
        assert!(normal.should_report(&swaying));
        assert!(normal.is_recovery(&swaying));

        // 状态未变不重复输出
        assert!(!swaying.should_report(&swaying));
        assert!(!normal.should_report(&normal));
        assert!(!normal.should_report(&AlertStatus::default()));
    }

    #[test]
    fn test_publish_replaces_snapshot_and_keeps_preview() {
        let shared = SharedState::new();
        assert_eq!(shared.snapshot().frame_index, 0);
        assert!(shared.preview().is_none());

        let snap = TelemetrySnapshot {
            frame_index: 3,
            ..Default::default()
        };
        shared.publish(snap, Some(vec![1, 2, 3]), AlertStatus::default());
        assert_eq!(shared.snapshot().frame_index, 3);

        let snap = TelemetrySnapshot {
            frame_index: 4,
            ..Default::default()
        };
        shared.publish(snap, None, AlertStatus::default());
        assert_eq!(shared.snapshot().frame_index, 4);
        assert_eq!(shared.preview().unwrap().as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_readers_see_complete_snapshots() {
        let shared = SharedState::new();
        let writer = shared.clone();

        let handle = std::thread::spawn(move || {
            for i in 1..=500u64 {
                let snap = TelemetrySnapshot {
                    frame_index: i,
                    buffer_fill: i as usize,
                    ..Default::default()
                };
                writer.publish(snap, None, AlertStatus::default());
            }
        });

        let mut last = 0;
        while last < 500 {
            let snap = shared.snapshot();
            assert_eq!(snap.frame_index as usize, snap.buffer_fill);
            assert!(snap.frame_index >= last);
            last = snap.frame_index;
        }
        handle.join().unwrap();
    }
}
