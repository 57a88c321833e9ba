//! 后台工作线程 (Worker)
//! 职责: 取帧 → Pipeline::step → 发布遥测快照与预览

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::control::ControlFlags;
use super::preview::{encode_jpeg, render_preview, TRACKING_COLOR};
use super::telemetry::SharedState;
use super::{FrameReport, Pipeline};
use crate::detection::{Frame, FrameSource};
use crate::error::SentinelResult;
use crate::tracking::LockMode;

/// 取帧失败后的等待时间
const SOURCE_RETRY_DELAY: Duration = Duration::from_millis(100);

/// 指数滑动平均 FPS: fps = 0.9·fps + 0.1/dt
#[derive(Debug)]
pub struct FpsMeter {
    last: Instant,
    fps: f32,
}

impl FpsMeter {
    pub fn new() -> Self {
        Self {
            last: Instant::now(),
            fps: 0.0,
        }
    }

    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        let dt = now.duration_since(self.last);
        self.last = now;
        self.update(dt)
    }

    /// 按给定帧间隔更新
    pub fn update(&mut self, dt: Duration) -> f32 {
        let dt = dt.as_secs_f32().max(1e-6);
        self.fps = 0.9 * self.fps + 0.1 / dt;
        self.fps
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for FpsMeter {
    fn default() -> Self {
        Self::new()
    }
}

/// 工作线程退出统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub frames_processed: u64,
    pub frames_skipped: u64,
}

pub struct Worker<S: FrameSource> {
    pipeline: Pipeline,
    source: S,
    control: Arc<ControlFlags>,
    shared: SharedState,
    /// 是否生成预览帧
    preview: bool,

    // 统计
    fps: FpsMeter,
    summary: WorkerSummary,
}

impl<S: FrameSource + 'static> Worker<S> {
    pub fn new(pipeline: Pipeline, source: S, control: Arc<ControlFlags>, shared: SharedState) -> Self {
        Self {
            pipeline,
            source,
            control,
            shared,
            preview: true,
            fps: FpsMeter::new(),
            summary: WorkerSummary::default(),
        }
    }

    pub fn with_preview(mut self, enabled: bool) -> Self {
        self.preview = enabled;
        self
    }

    /// 在独立线程中运行
    pub fn spawn(self) -> SentinelResult<JoinHandle<WorkerSummary>> {
        let handle = std::thread::Builder::new()
            .name("sentinel-worker".to_string())
            .spawn(move || self.run())?;
        Ok(handle)
    }

    /// 运行到停止标志置位或帧源结束
    pub fn run(mut self) -> WorkerSummary {
        info!("🔍 工作线程启动");

        while !self.control.should_stop() {
            if let Some(command) = self.control.take() {
                self.pipeline.apply(command);
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("📭 帧源结束");
                    break;
                }
                Err(e) => {
                    warn!("⚠️ 取帧失败: {}, 稍后重试", e);
                    std::thread::sleep(SOURCE_RETRY_DELAY);
                    continue;
                }
            };

            let report = match self.pipeline.step(&frame) {
                Ok(report) => report,
                Err(e) => {
                    warn!("⚠️ 跳过第 {} 帧: {}", frame.index, e);
                    self.summary.frames_skipped += 1;
                    continue;
                }
            };

            self.summary.frames_processed += 1;
            let fps = self.fps.tick();
            self.publish(&frame, &report, fps);
        }

        info!(
            "⏹️ 工作线程退出: 处理 {} 帧, 跳过 {} 帧",
            self.summary.frames_processed, self.summary.frames_skipped
        );
        self.summary
    }

    fn publish(&self, frame: &Frame, report: &FrameReport, fps: f32) {
        let preview = if self.preview {
            let color = match self.pipeline.last_event() {
                Some(event) => event.label.color(),
                None if self.pipeline.lock().mode() == LockMode::Tracking => TRACKING_COLOR,
                None => crate::analysis::AnomalyLabel::Unknown.color(),
            };
            let img = render_preview(frame, &report.detections, report.target, color);
            match encode_jpeg(&img, self.pipeline.config().preview_quality) {
                Ok(bytes) => Some(bytes),
                Err(e) => {
                    warn!("⚠️ 预览编码失败: {}", e);
                    None
                }
            }
        } else {
            None
        };

        self.shared
            .publish(self.pipeline.snapshot(fps), preview, self.pipeline.alert());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_moving_average() {
        let mut meter = FpsMeter::new();
        assert!((meter.update(Duration::from_millis(100)) - 1.0).abs() < 1e-4);
        assert!((meter.update(Duration::from_millis(100)) - 1.9).abs() < 1e-4);
        for _ in 0..200 {
            meter.update(Duration::from_millis(100));
        }
        assert!((meter.fps() - 10.0).abs() < 1e-2);
    }

    #[test]
    fn test_zero_interval_is_finite() {
        let mut meter = FpsMeter::new();
        assert!(meter.update(Duration::ZERO).is_finite());
    }
}
