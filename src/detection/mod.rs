/// 检测系统接口 (Detection System)
///
/// 姿态检测器与视频源都是外部组件,核心只依赖两个窄接口:
/// - FrameSource:  取帧 (阻塞)
/// - PoseDetector: 单帧 → 全部人员的检测框 + 关键点
///
/// 任何具体后端 (YOLOv8-pose / 录制回放 / 测试桩) 都可以替换而不影响核心。
pub mod replay;
pub mod types;

pub use replay::{ReplayDetector, ReplayFeed, ReplayFrames};
pub use types::{compute_iou, BBox, Detection, PoseKeypoints, NUM_KEYPOINTS, SKELETON};

use image::RgbImage;

use crate::error::SentinelResult;

/// 视频帧
#[derive(Clone, Debug)]
pub struct Frame {
    /// 帧序号 (从0开始)
    pub index: u64,
    pub width: u32,
    pub height: u32,
    /// 原始图像 (回放源可以没有图像)
    pub image: Option<RgbImage>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            image: None,
        }
    }

    pub fn with_image(index: u64, image: RgbImage) -> Self {
        Self {
            index,
            width: image.width(),
            height: image.height(),
            image: Some(image),
        }
    }
}

/// 视频源接口
pub trait FrameSource: Send {
    /// 阻塞读取下一帧
    ///
    /// # 返回
    /// - `Ok(Some(frame))`: 新帧
    /// - `Ok(None)`: 视频流结束
    /// - `Err(_)`: 暂时性失败,调用方稍后重试
    fn next_frame(&mut self) -> SentinelResult<Option<Frame>>;
}

/// 姿态检测器接口
pub trait PoseDetector: Send {
    /// 检测当前帧中的全部人员
    fn detect(&mut self, frame: &Frame) -> SentinelResult<Vec<Detection>>;
}
