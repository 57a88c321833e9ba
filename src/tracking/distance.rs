//! 距离估计 (Distance Estimator)
//!
//! 针孔模型: distance = scale / bbox_height,
//! 初始 scale = 人体平均身高 × 焦距(像素), 焦距由垂直视场角推出。
//! 每次信标确认匹配后自校准: scale := beacon_distance × bbox_height。

use tracing::debug;

/// 检测框高度下限 (像素), 避免除零
const MIN_BBOX_HEIGHT: f32 = 1e-6;

/// 由垂直视场角求焦距 (像素)
pub fn focal_length_px(vfov_deg: f32, image_height_px: u32) -> f32 {
    let half_fov = (vfov_deg.to_radians() / 2.0).tan();
    (image_height_px as f32 / 2.0) / half_fov
}

#[derive(Debug, Clone, PartialEq)]
pub struct DistanceEstimator {
    scale: f32,
    /// 固定标定: 不参与自校准
    fixed: bool,
    refinements: u32,
}

impl DistanceEstimator {
    /// 由相机光学参数初始化
    pub fn from_optics(vfov_deg: f32, person_height_m: f32, image_height_px: u32) -> Self {
        Self {
            scale: person_height_m * focal_length_px(vfov_deg, image_height_px),
            fixed: false,
            refinements: 0,
        }
    }

    /// 固定标定值, 之后不再被信标修正
    pub fn with_fixed_scale(scale: f32) -> Self {
        Self {
            scale,
            fixed: true,
            refinements: 0,
        }
    }

    pub fn estimate(&self, bbox_height: f32) -> f32 {
        self.scale / bbox_height.max(MIN_BBOX_HEIGHT)
    }

    /// 用信标距离修正标定, 返回是否生效
    pub fn refine(&mut self, beacon_distance_m: f32, bbox_height: f32) -> bool {
        if self.fixed
            || !beacon_distance_m.is_finite()
            || beacon_distance_m <= 0.0
            || bbox_height <= 0.0
        {
            return false;
        }
        let previous = self.scale;
        self.scale = beacon_distance_m * bbox_height;
        self.refinements += 1;
        debug!("📏 标定修正: {:.1} → {:.1}", previous, self.scale);
        true
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn is_fixed(&self) -> bool {
        self.fixed
    }

    pub fn refinements(&self) -> u32 {
        self.refinements
    }
}
