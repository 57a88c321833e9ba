//! 录制回放 (Recorded detection replay)
//!
//! JSON Lines 格式,每行一帧:
//! `{"width":640,"height":480,"detections":[{"bbox":{...},"keypoints":{"points":[[x,y,c],...]},"confidence":0.9}]}`
//!
//! 用于离线复现与测试: 同一份录制同时提供帧源和检测结果。

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::types::Detection;
use super::{Frame, FrameSource, PoseDetector};
use crate::error::{SentinelError, SentinelResult};

/// 单帧录制记录
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayRecord {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub detections: Vec<Detection>,
}

/// 完整录制
#[derive(Clone, Debug)]
pub struct ReplayFeed {
    records: Arc<Vec<ReplayRecord>>,
}

impl ReplayFeed {
    pub fn from_records(records: Vec<ReplayRecord>) -> Self {
        Self {
            records: Arc::new(records),
        }
    }

    /// 从 JSONL 文件加载 (空行跳过)
    pub fn load<P: AsRef<Path>>(path: P) -> SentinelResult<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let mut records = Vec::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: ReplayRecord = serde_json::from_str(&line).map_err(|e| {
                SentinelError::invalid_input(format!(
                    "{}:{}: {}",
                    path.display(),
                    line_no + 1,
                    e
                ))
            })?;
            records.push(record);
        }

        info!("📼 回放录制已加载: {} ({} 帧)", path.display(), records.len());
        Ok(Self::from_records(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 拆分为帧源 + 检测器, 两者共享同一份录制
    ///
    /// `frame_interval` 非空时按该间隔节流, 模拟实时摄像头
    pub fn split(&self, frame_interval: Option<Duration>) -> (ReplayFrames, ReplayDetector) {
        (
            ReplayFrames {
                records: Arc::clone(&self.records),
                cursor: 0,
                frame_interval,
            },
            ReplayDetector {
                records: Arc::clone(&self.records),
            },
        )
    }
}

/// 回放帧源
pub struct ReplayFrames {
    records: Arc<Vec<ReplayRecord>>,
    cursor: usize,
    frame_interval: Option<Duration>,
}

impl FrameSource for ReplayFrames {
    fn next_frame(&mut self) -> SentinelResult<Option<Frame>> {
        let Some(record) = self.records.get(self.cursor) else {
            return Ok(None);
        };
        if let Some(interval) = self.frame_interval {
            std::thread::sleep(interval);
        }
        let frame = Frame::new(self.cursor as u64, record.width, record.height);
        self.cursor += 1;
        Ok(Some(frame))
    }
}

/// 回放检测器: 按帧序号返回录制的检测结果
pub struct ReplayDetector {
    records: Arc<Vec<ReplayRecord>>,
}

impl PoseDetector for ReplayDetector {
    fn detect(&mut self, frame: &Frame) -> SentinelResult<Vec<Detection>> {
        self.records
            .get(frame.index as usize)
            .map(|r| r.detections.clone())
            .ok_or_else(|| {
                SentinelError::detector(format!("no recorded detections for frame {}", frame.index))
            })
    }
}
