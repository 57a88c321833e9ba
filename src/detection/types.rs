/// 检测数据结构定义
/// Data structures produced by the external pose detector
use serde::{Deserialize, Serialize};

// ========== 公共常量 ==========

/// COCO 关键点数量
pub const NUM_KEYPOINTS: usize = 17;

// COCO-17 关键点索引
pub const NOSE: usize = 0;
pub const L_SHOULDER: usize = 5;
pub const R_SHOULDER: usize = 6;
pub const L_ELBOW: usize = 7;
pub const R_ELBOW: usize = 8;
pub const L_WRIST: usize = 9;
pub const R_WRIST: usize = 10;
pub const L_HIP: usize = 11;
pub const R_HIP: usize = 12;
pub const L_KNEE: usize = 13;
pub const R_KNEE: usize = 14;
pub const L_ANKLE: usize = 15;
pub const R_ANKLE: usize = 16;

/// 骨架连线 (绘制用)
pub const SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box), 像素坐标 x1,y1 左上 / x2,y2 右下
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }
}

/// 姿态关键点 (Pose keypoints), 每个点 (x, y, confidence), 像素坐标
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PoseKeypoints {
    pub points: [(f32, f32, f32); NUM_KEYPOINTS],
}

impl PoseKeypoints {
    pub fn new(points: [(f32, f32, f32); NUM_KEYPOINTS]) -> Self {
        Self { points }
    }

    pub fn point(&self, idx: usize) -> (f32, f32, f32) {
        self.points[idx]
    }
}

/// 单人检测结果: 检测框 + 17 个关键点 + 检测置信度
///
/// 每次检测器调用生成一次,只在当前帧内有效
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BBox,
    pub keypoints: PoseKeypoints,
    pub confidence: f32,
}

impl Detection {
    pub fn new(bbox: BBox, keypoints: PoseKeypoints, confidence: f32) -> Self {
        Self {
            bbox,
            keypoints,
            confidence,
        }
    }
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let area1 = (bbox1.x2 - bbox1.x1) * (bbox1.y2 - bbox1.y1);
    let area2 = (bbox2.x2 - bbox2.x1) * (bbox2.y2 - bbox2.y1);
    let union = area1 + area2 - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iou_identical_boxes() {
        let a = BBox::new(10.0, 10.0, 110.0, 210.0);
        assert!((compute_iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_disjoint_boxes() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(compute_iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_half_overlap() {
        // 重叠 50x100, 并集 150x100
        let a = BBox::new(0.0, 0.0, 100.0, 100.0);
        let b = BBox::new(50.0, 0.0, 150.0, 100.0);
        assert!((compute_iou(&a, &b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_degenerate_box() {
        let a = BBox::new(5.0, 5.0, 5.0, 5.0);
        assert_eq!(compute_iou(&a, &a), 0.0);
    }

    #[test]
    fn test_detection_json_shape() {
        let json = r#"{
            "bbox": {"x1": 1.0, "y1": 2.0, "x2": 3.0, "y2": 4.0},
            "keypoints": {"points": [
                [0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],
                [0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],[0,0,1],[9,8,0.5]
            ]},
            "confidence": 0.9
        }"#;
        let det: Detection = serde_json::from_str(json).unwrap();
        assert_eq!(det.bbox.height(), 2.0);
        assert_eq!(det.keypoints.point(R_ANKLE), (9.0, 8.0, 0.5));
    }

    #[test]
    fn test_bbox_json_has_only_corners() {
        let json = serde_json::to_value(BBox::new(1.0, 2.0, 3.0, 4.0)).unwrap();
        let keys: Vec<&str> = json.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        assert_eq!(keys.len(), 4);
        for key in ["x1", "y1", "x2", "y2"] {
            assert!(keys.contains(&key));
        }
    }
}
