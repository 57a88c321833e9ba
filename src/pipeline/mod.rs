/// 监控流水线 (Monitoring Pipeline)
///
/// 单一工作线程逐帧驱动:
/// 检测 → 身份锁定 → 特征工程 → 滑动窗口 → 异常评分 → 事件分类 → 遥测
///
/// - control:   无锁命令/停止标志
/// - telemetry: 快照与共享状态
/// - worker:    后台工作循环
/// - preview:   预览帧绘制与 JPEG 编码
pub mod control;
pub mod preview;
pub mod telemetry;
pub mod worker;

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::analysis::features::{engineered, ENGINEERED_NAMES};
use crate::analysis::{classify, AnomalyEvent, FeatureEngineer, SequenceBuffer};
use crate::config::SentinelConfig;
use crate::detection::types::{
    Detection, L_ANKLE, L_HIP, L_SHOULDER, L_WRIST, NOSE, R_ANKLE, R_HIP, R_SHOULDER, R_WRIST,
};
use crate::detection::{Frame, PoseDetector};
use crate::error::{SentinelError, SentinelResult};
use crate::models::{AnomalyScorer, ScoreResult};
use crate::tracking::{BeaconSource, LockController, LockMode, LockTransition};

pub use control::{Command, ControlFlags};
pub use telemetry::{AlertStatus, PipelineStatus, SharedState, TelemetrySnapshot};
pub use worker::{FpsMeter, Worker, WorkerSummary};

/// 遥测导出的关节
pub const TELEMETRY_JOINTS: [(usize, &str); 9] = [
    (NOSE, "Nose"),
    (L_SHOULDER, "L Shoulder"),
    (R_SHOULDER, "R Shoulder"),
    (L_WRIST, "L Wrist"),
    (R_WRIST, "R Wrist"),
    (L_HIP, "L Hip"),
    (R_HIP, "R Hip"),
    (L_ANKLE, "L Ankle"),
    (R_ANKLE, "R Ankle"),
];

/// 单帧处理结果
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    /// 通过置信度门限的检测
    pub detections: Vec<Detection>,
    /// 目标在 `detections` 中的下标
    pub target: Option<usize>,
    pub transition: LockTransition,
    /// 本帧产生的评分 (窗口就绪时)
    pub score: Option<ScoreResult>,
    /// 本帧产生的异常事件
    pub event: Option<AnomalyEvent>,
}

/// 流水线: 独占全部可变状态, 只在工作线程中使用
pub struct Pipeline {
    config: SentinelConfig,
    detector: Box<dyn PoseDetector>,
    scorer: Box<dyn AnomalyScorer>,
    beacon: Box<dyn BeaconSource>,

    lock: LockController,
    features: FeatureEngineer,
    buffer: SequenceBuffer,
    /// 有目标的帧计数, 用于 frame_step 取样
    target_frames: u64,

    // 最近一次结果
    frame_index: u64,
    status: PipelineStatus,
    last_score: Option<ScoreResult>,
    last_event: Option<AnomalyEvent>,
    engineered: BTreeMap<String, f32>,
    joints: BTreeMap<String, [f32; 3]>,
    alert: AlertStatus,
}

impl Pipeline {
    pub fn new(
        config: SentinelConfig,
        detector: Box<dyn PoseDetector>,
        scorer: Box<dyn AnomalyScorer>,
        beacon: Box<dyn BeaconSource>,
    ) -> SentinelResult<Self> {
        config.validate()?;
        if let Some(expected) = scorer.window_size() {
            if expected != config.window_size {
                return Err(SentinelError::config(format!(
                    "scorer expects window_size {}, config has {}",
                    expected, config.window_size
                )));
            }
        }

        let lock = LockController::new(
            config.distance_estimator(),
            config.iou_threshold,
            config.max_lost_frames,
        );
        let buffer = SequenceBuffer::new(config.window_size, config.stride);

        let mut pipeline = Self {
            config,
            detector,
            scorer,
            beacon,
            lock,
            features: FeatureEngineer::new(),
            buffer,
            target_frames: 0,
            frame_index: 0,
            status: PipelineStatus::WaitingForActivation,
            last_score: None,
            last_event: None,
            engineered: BTreeMap::new(),
            joints: BTreeMap::new(),
            alert: AlertStatus::default(),
        };
        if pipeline.config.auto_activate {
            pipeline.activate();
        }
        Ok(pipeline)
    }

    /// 进入 LOCK_ON, 清空序列状态
    pub fn activate(&mut self) {
        self.lock.activate();
        self.reset_sequence();
        self.status = PipelineStatus::LockingOn;
    }

    /// 进入 INACTIVE
    pub fn deactivate(&mut self) {
        self.lock.deactivate();
        self.reset_sequence();
        self.status = PipelineStatus::WaitingForActivation;
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Activate => self.activate(),
            Command::Deactivate => self.deactivate(),
        }
    }

    /// 清空特征缓存/窗口/取样计数与当前告警
    fn reset_sequence(&mut self) {
        self.features.reset();
        self.buffer.reset();
        self.target_frames = 0;
        self.last_score = None;
        self.last_event = None;
        self.engineered.clear();
        self.joints.clear();
        if self.alert.is_anomaly {
            info!("🔕 序列已重置, 清除告警");
            self.alert = AlertStatus {
                timestamp_ms: chrono::Utc::now().timestamp_millis(),
                ..AlertStatus::default()
            };
        }
    }

    /// 处理一帧
    ///
    /// 检测器/评分器失败直接返回错误, 由调用方跳过该帧
    pub fn step(&mut self, frame: &Frame) -> SentinelResult<FrameReport> {
        self.frame_index = frame.index;

        let min_conf = self.config.min_detection_confidence;
        let detections: Vec<Detection> = self
            .detector
            .detect(frame)?
            .into_iter()
            .filter(|d| d.confidence >= min_conf)
            .collect();

        let update = self.lock.update(&detections, self.beacon.as_mut());
        if update.reset_required {
            self.reset_sequence();
        }

        let mut report = FrameReport {
            frame_index: frame.index,
            detections,
            target: update.target,
            transition: update.transition,
            score: None,
            event: None,
        };

        let Some(idx) = update.target else {
            self.status = match self.lock.mode() {
                LockMode::Inactive => PipelineStatus::WaitingForActivation,
                LockMode::LockOn => PipelineStatus::LockingOn,
                LockMode::Tracking => PipelineStatus::NoPerson,
            };
            self.joints.clear();
            self.engineered.clear();
            return Ok(report);
        };

        let target = &report.detections[idx];
        self.joints = TELEMETRY_JOINTS
            .iter()
            .map(|&(j, name)| {
                let (x, y, c) = target.keypoints.point(j);
                (name.to_string(), [x, y, c])
            })
            .collect();

        self.target_frames += 1;
        if self.target_frames % self.config.frame_step as u64 == 0 {
            let vector = self
                .features
                .compute(&target.keypoints, frame.width, frame.height);
            self.engineered = ENGINEERED_NAMES
                .iter()
                .zip(engineered(&vector))
                .map(|(name, v)| {
                    let v = if name.ends_with("angle") { v.to_degrees() } else { v };
                    (name.to_string(), v)
                })
                .collect();

            if self.buffer.add(vector) {
                let window = self.buffer.window();
                let result = self.scorer.score(&window)?;
                let event = result.is_anomaly.then(|| classify(&window));
                self.record_score(result, event);
                report.score = Some(result);
                report.event = event;
            }
        }

        self.status = match (&self.last_score, &self.last_event) {
            (None, _) => PipelineStatus::WaitingForBuffer,
            (Some(_), Some(_)) => PipelineStatus::Anomaly,
            (Some(_), None) => PipelineStatus::Normal,
        };

        Ok(report)
    }

    fn record_score(&mut self, result: ScoreResult, event: Option<AnomalyEvent>) {
        let alert = AlertStatus {
            is_anomaly: result.is_anomaly,
            anomaly_type: event.map(|e| e.label),
            confidence: event.map_or(0.0, |e| e.confidence),
            tier: event.map(|e| e.tier()),
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        };

        match &event {
            Some(ev) if alert.is_new_anomaly(&self.alert) => {
                warn!(
                    "🚨 异常事件: {} (置信度 {:.2} {:?}, 得分 {:.6} > 阈值 {:.6})",
                    ev.label,
                    ev.confidence,
                    ev.tier(),
                    result.score,
                    result.threshold
                );
            }
            None if alert.is_recovery(&self.alert) => {
                info!("✅ 恢复正常 (得分 {:.6})", result.score);
            }
            _ => debug!("得分 {:.6} / 阈值 {:.6}", result.score, result.threshold),
        }

        self.alert = alert;
        self.last_score = Some(result);
        self.last_event = event;
    }

    /// 当前状态快照
    pub fn snapshot(&self, fps: f32) -> TelemetrySnapshot {
        let score = self.last_score;
        TelemetrySnapshot {
            frame_index: self.frame_index,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            fps,
            status: self.status,
            score: score.map_or(0.0, |s| s.score),
            threshold: self.scorer.threshold(),
            is_anomaly: score.map_or(false, |s| s.is_anomaly),
            anomaly_type: self.last_event.map(|e| e.label),
            anomaly_confidence: self.last_event.map_or(0.0, |e| e.confidence),
            anomaly_tier: self.last_event.map(|e| e.tier()),
            buffer_fill: self.buffer.len(),
            buffer_size: self.buffer.window_size(),
            engineered: self.engineered.clone(),
            joints: self.joints.clone(),
            lock: self.lock.state(),
        }
    }

    pub fn alert(&self) -> AlertStatus {
        self.alert
    }

    pub fn status(&self) -> PipelineStatus {
        self.status
    }

    pub fn last_event(&self) -> Option<AnomalyEvent> {
        self.last_event
    }

    pub fn lock(&self) -> &LockController {
        &self.lock
    }

    pub fn buffer(&self) -> &SequenceBuffer {
        &self.buffer
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::features::{DELTA_OFFSET, ENGINEERED_OFFSET};
    use crate::analysis::{AnomalyLabel, ConfidenceTier, Window};
    use crate::detection::types::{BBox, PoseKeypoints, NUM_KEYPOINTS};
    use crate::tracking::FixedBeacon;

    /// 每帧返回同一组检测
    struct StaticDetector(Vec<Detection>);

    impl PoseDetector for StaticDetector {
        fn detect(&mut self, _frame: &Frame) -> SentinelResult<Vec<Detection>> {
            Ok(self.0.clone())
        }
    }

    /// 按帧序号返回预先录好的检测; 超出部分为空
    struct ScriptedDetector(Vec<Vec<Detection>>);

    impl PoseDetector for ScriptedDetector {
        fn detect(&mut self, frame: &Frame) -> SentinelResult<Vec<Detection>> {
            Ok(self.0.get(frame.index as usize).cloned().unwrap_or_default())
        }
    }

    struct FailingDetector;

    impl PoseDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> SentinelResult<Vec<Detection>> {
            Err(SentinelError::detector("camera unplugged"))
        }
    }

    /// 固定得分
    struct ConstScorer(f32);

    impl AnomalyScorer for ConstScorer {
        fn score(&mut self, _window: &Window) -> SentinelResult<ScoreResult> {
            Ok(ScoreResult::new(self.0, 0.5))
        }

        fn threshold(&self) -> f32 {
            0.5
        }
    }

    fn standing_person(conf: f32) -> Detection {
        use crate::detection::types::{L_ELBOW, L_KNEE, R_ELBOW, R_KNEE};

        let mut points = [(320.0, 90.0, 0.9); NUM_KEYPOINTS];
        points[NOSE] = (320.0, 90.0, 0.9);
        points[L_SHOULDER] = (300.0, 140.0, 0.9);
        points[R_SHOULDER] = (340.0, 140.0, 0.9);
        points[L_ELBOW] = (290.0, 200.0, 0.9);
        points[R_ELBOW] = (350.0, 200.0, 0.9);
        points[L_WRIST] = (285.0, 255.0, 0.9);
        points[R_WRIST] = (355.0, 255.0, 0.9);
        points[L_HIP] = (305.0, 260.0, 0.9);
        points[R_HIP] = (335.0, 260.0, 0.9);
        points[L_KNEE] = (305.0, 330.0, 0.9);
        points[R_KNEE] = (335.0, 330.0, 0.9);
        points[L_ANKLE] = (305.0, 400.0, 0.9);
        points[R_ANKLE] = (335.0, 400.0, 0.9);
        Detection::new(BBox::new(280.0, 80.0, 360.0, 400.0), PoseKeypoints::new(points), conf)
    }

    fn pipeline(dets: Vec<Detection>, score: f32, config: SentinelConfig) -> Pipeline {
        let beacon_m = config.distance_estimator().estimate(320.0);
        Pipeline::new(
            config,
            Box::new(StaticDetector(dets)),
            Box::new(ConstScorer(score)),
            Box::new(FixedBeacon(Some(beacon_m))),
        )
        .unwrap()
    }

    /// 整体水平平移
    fn shifted(det: &Detection, dx: f32) -> Detection {
        let mut det = det.clone();
        det.bbox.x1 += dx;
        det.bbox.x2 += dx;
        for p in det.keypoints.points.iter_mut() {
            p.0 += dx;
        }
        det
    }

    fn delta_row(window: &Window, row: usize) -> Vec<f32> {
        window
            .row(row)
            .iter()
            .skip(DELTA_OFFSET)
            .take(ENGINEERED_OFFSET - DELTA_OFFSET)
            .copied()
            .collect()
    }

    fn small_window() -> SentinelConfig {
        SentinelConfig {
            window_size: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_inactive_pipeline_does_nothing() {
        let mut p = pipeline(vec![standing_person(0.9)], 0.0, small_window());
        for i in 0..5 {
            let report = p.step(&Frame::new(i, 640, 480)).unwrap();
            assert_eq!(report.target, None);
        }
        assert_eq!(p.status(), PipelineStatus::WaitingForActivation);
        assert!(p.buffer().is_empty());
    }

    #[test]
    fn test_normal_flow_fills_buffer_then_scores() {
        let mut p = pipeline(vec![standing_person(0.9)], 0.1, small_window());
        p.activate();

        let r0 = p.step(&Frame::new(0, 640, 480)).unwrap();
        assert!(matches!(r0.transition, LockTransition::Acquired { .. }));
        assert_eq!(p.status(), PipelineStatus::WaitingForBuffer);

        p.step(&Frame::new(1, 640, 480)).unwrap();
        let r2 = p.step(&Frame::new(2, 640, 480)).unwrap();
        assert_eq!(r2.score.map(|s| s.is_anomaly), Some(false));
        assert_eq!(p.status(), PipelineStatus::Normal);

        let snap = p.snapshot(30.0);
        assert_eq!(snap.buffer_fill, 3);
        assert_eq!(snap.lock.mode, LockMode::Tracking);
        assert_eq!(snap.joints.len(), TELEMETRY_JOINTS.len());
        assert_eq!(snap.engineered.len(), ENGINEERED_NAMES.len());
    }

    #[test]
    fn test_anomalous_score_is_classified() {
        let mut p = pipeline(vec![standing_person(0.9)], 0.9, small_window());
        p.activate();
        let mut last = None;
        for i in 0..3 {
            last = p.step(&Frame::new(i, 640, 480)).unwrap().event;
        }
        // 静止站立不符合任何标签
        assert_eq!(last.map(|e| e.label), Some(AnomalyLabel::Unknown));
        assert_eq!(p.status(), PipelineStatus::Anomaly);
        let alert = p.alert();
        assert!(alert.is_anomaly);
        assert!(alert.timestamp_ms > 0);
        assert_eq!(alert.tier, Some(ConfidenceTier::Low));
        assert_eq!(p.snapshot(0.0).anomaly_tier, Some(ConfidenceTier::Low));
    }

    #[test]
    fn test_low_confidence_detections_are_dropped() {
        let mut p = pipeline(vec![standing_person(0.2)], 0.0, small_window());
        p.activate();
        let report = p.step(&Frame::new(0, 640, 480)).unwrap();
        assert!(report.detections.is_empty());
        assert_eq!(p.status(), PipelineStatus::LockingOn);
    }

    #[test]
    fn test_frame_step_samples_target_frames() {
        let config = SentinelConfig {
            window_size: 2,
            frame_step: 3,
            ..Default::default()
        };
        let mut p = pipeline(vec![standing_person(0.9)], 0.0, config);
        p.activate();
        let scored: Vec<bool> = (0..6)
            .map(|i| p.step(&Frame::new(i, 640, 480)).unwrap().score.is_some())
            .collect();
        // 第 3、6 个目标帧进入缓冲, 第 6 帧填满
        assert_eq!(scored, vec![false, false, false, false, false, true]);
    }

    #[test]
    fn test_deactivate_clears_sequence() {
        let mut p = pipeline(vec![standing_person(0.9)], 0.0, small_window());
        p.activate();
        p.step(&Frame::new(0, 640, 480)).unwrap();
        p.step(&Frame::new(1, 640, 480)).unwrap();
        assert_eq!(p.buffer().len(), 2);

        p.apply(Command::Deactivate);
        assert!(p.buffer().is_empty());
        assert_eq!(p.lock().mode(), LockMode::Inactive);
    }

    #[test]
    fn test_sustained_loss_resets_sequence_and_relock_starts_fresh() {
        let config = SentinelConfig {
            window_size: 3,
            max_lost_frames: 1,
            ..Default::default()
        };
        let person = standing_person(0.9);
        let beacon_m = config.distance_estimator().estimate(person.bbox.height());
        let script = vec![
            vec![shifted(&person, 0.0)],
            vec![shifted(&person, 10.0)],
            vec![shifted(&person, 20.0)],
            vec![],
            vec![],
            vec![shifted(&person, 60.0)],
        ];
        let mut p = Pipeline::new(
            config,
            Box::new(ScriptedDetector(script)),
            Box::new(ConstScorer(0.0)),
            Box::new(FixedBeacon(Some(beacon_m))),
        )
        .unwrap();
        p.activate();

        for i in 0..3 {
            p.step(&Frame::new(i, 640, 480)).unwrap();
        }
        assert_eq!(p.buffer().len(), 3);
        assert!(delta_row(&p.buffer().window(), 2).iter().any(|&d| d != 0.0));

        let r3 = p.step(&Frame::new(3, 640, 480)).unwrap();
        assert_eq!(r3.transition, LockTransition::Missed { loss_count: 1 });
        assert_eq!(p.buffer().len(), 3);

        let r4 = p.step(&Frame::new(4, 640, 480)).unwrap();
        assert_eq!(r4.transition, LockTransition::Lost);
        assert_eq!(p.buffer().len(), 0);
        assert_eq!(p.status(), PipelineStatus::LockingOn);

        // 重新锁定后第一帧没有上一帧可比, 位移量全为 0
        let r5 = p.step(&Frame::new(5, 640, 480)).unwrap();
        assert!(matches!(r5.transition, LockTransition::Acquired { .. }));
        assert_eq!(p.buffer().len(), 1);
        assert!(delta_row(&p.buffer().window(), 0).iter().all(|&d| d == 0.0));
    }

    #[test]
    fn test_activate_while_tracking_clears_buffer() {
        let mut p = pipeline(vec![standing_person(0.9)], 0.0, small_window());
        p.activate();
        p.step(&Frame::new(0, 640, 480)).unwrap();
        p.step(&Frame::new(1, 640, 480)).unwrap();
        assert_eq!(p.lock().mode(), LockMode::Tracking);
        assert_eq!(p.buffer().len(), 2);

        p.apply(Command::Activate);
        assert!(p.buffer().is_empty());
        assert_eq!(p.lock().mode(), LockMode::LockOn);
        assert_eq!(p.status(), PipelineStatus::LockingOn);
    }

    #[test]
    fn test_deactivate_clears_alert() {
        let mut p = pipeline(vec![standing_person(0.9)], 0.9, small_window());
        p.activate();
        for i in 0..3 {
            p.step(&Frame::new(i, 640, 480)).unwrap();
        }
        assert!(p.alert().is_anomaly);

        p.deactivate();
        let alert = p.alert();
        let snap = p.snapshot(0.0);
        assert!(!alert.is_anomaly);
        assert_eq!(alert.anomaly_type, None);
        assert_eq!(alert.is_anomaly, snap.is_anomaly);
        assert!(alert.timestamp_ms > 0);
    }

    #[test]
    fn test_detector_failure_propagates() {
        let mut p = Pipeline::new(
            small_window(),
            Box::new(FailingDetector),
            Box::new(ConstScorer(0.0)),
            Box::new(FixedBeacon(None)),
        )
        .unwrap();
        p.activate();
        assert!(p.step(&Frame::new(0, 640, 480)).is_err());
    }

    #[test]
    fn test_scorer_window_mismatch_is_rejected() {
        struct Sized9;
        impl AnomalyScorer for Sized9 {
            fn score(&mut self, _w: &Window) -> SentinelResult<ScoreResult> {
                Ok(ScoreResult::new(0.0, 1.0))
            }
            fn threshold(&self) -> f32 {
                1.0
            }
            fn window_size(&self) -> Option<usize> {
                Some(9)
            }
        }

        let result = Pipeline::new(
            small_window(),
            Box::new(StaticDetector(vec![])),
            Box::new(Sized9),
            Box::new(FixedBeacon(None)),
        );
        assert!(matches!(result, Err(SentinelError::Config(_))));
    }
}
