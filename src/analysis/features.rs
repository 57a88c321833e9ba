//! 特征工程 (Feature Engineer)
//!
//! 17 个关键点 (像素坐标) → 75 维特征向量:
//!
//! ```text
//!  34  归一化坐标 (x, y) × 17
//!  34  相对上一帧的位移 (dx, dy) × 17
//!   7  工程特征: nose_y, hip_y, torso_len, body_len,
//!                shoulder_angle, knee_angle, vertical_ratio
//!  --
//!  75
//! ```
//!
//! 有状态: 保存上一帧归一化坐标用于计算速度。切换目标 (新身份 / 重新锁定)
//! 时必须调用 [`FeatureEngineer::reset`], 否则会出现跨目标的速度伪影。

use crate::detection::types::{
    PoseKeypoints, L_ANKLE, L_ELBOW, L_HIP, L_KNEE, L_SHOULDER, NOSE, NUM_KEYPOINTS, R_ANKLE,
    R_ELBOW, R_HIP, R_KNEE, R_SHOULDER,
};

/// 数值稳定项
pub const EPS: f32 = 1e-8;

/// 特征向量长度 (进程生命周期内恒定)
pub const FEATURE_LEN: usize = 75;

pub const RAW_OFFSET: usize = 0;
pub const DELTA_OFFSET: usize = NUM_KEYPOINTS * 2;
pub const ENGINEERED_OFFSET: usize = NUM_KEYPOINTS * 4;
pub const ENGINEERED_LEN: usize = 7;

// 工程特征在向量中的位置
pub const IDX_NOSE_Y: usize = ENGINEERED_OFFSET;
pub const IDX_HIP_Y: usize = ENGINEERED_OFFSET + 1;
pub const IDX_TORSO_LEN: usize = ENGINEERED_OFFSET + 2;
pub const IDX_BODY_LEN: usize = ENGINEERED_OFFSET + 3;
pub const IDX_SHOULDER_ANGLE: usize = ENGINEERED_OFFSET + 4;
pub const IDX_KNEE_ANGLE: usize = ENGINEERED_OFFSET + 5;
pub const IDX_VERTICAL_RATIO: usize = ENGINEERED_OFFSET + 6;

/// 工程特征名称 (与向量顺序一致)
pub const ENGINEERED_NAMES: [&str; ENGINEERED_LEN] = [
    "nose_y",
    "hip_y",
    "torso_len",
    "body_len",
    "shoulder_angle",
    "knee_angle",
    "vertical_ratio",
];

/// 固定长度特征向量
pub type FeatureVector = [f32; FEATURE_LEN];

/// 关键点 i 的归一化 x 在特征向量中的位置
pub const fn raw_x(joint: usize) -> usize {
    RAW_OFFSET + 2 * joint
}

/// 关键点 i 的归一化 y 在特征向量中的位置
pub const fn raw_y(joint: usize) -> usize {
    RAW_OFFSET + 2 * joint + 1
}

/// 关键点 i 的 dy 在特征向量中的位置
pub const fn delta_y(joint: usize) -> usize {
    DELTA_OFFSET + 2 * joint + 1
}

/// 取出 7 个工程特征
pub fn engineered(features: &FeatureVector) -> [f32; ENGINEERED_LEN] {
    let mut out = [0.0; ENGINEERED_LEN];
    out.copy_from_slice(&features[ENGINEERED_OFFSET..ENGINEERED_OFFSET + ENGINEERED_LEN]);
    out
}

type Xy = [f32; 2];

fn sub(a: Xy, b: Xy) -> Xy {
    [a[0] - b[0], a[1] - b[1]]
}

fn midpoint(a: Xy, b: Xy) -> Xy {
    [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]
}

fn norm(v: Xy) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

/// 顶点处两条肢体段的夹角 (弧度)
///
/// arccos( v1·v2 / (|v1|·|v2| + ε) ), 余弦截断到 [-1, 1]
pub fn joint_angle(a: Xy, vertex: Xy, c: Xy) -> f32 {
    let v1 = sub(a, vertex);
    let v2 = sub(c, vertex);
    let dot = v1[0] * v2[0] + v1[1] * v2[1];
    let cos = dot / (norm(v1) * norm(v2) + EPS);
    cos.clamp(-1.0, 1.0).acos()
}

/// 特征工程器
#[derive(Debug, Default)]
pub struct FeatureEngineer {
    prev_xy: Option<[Xy; NUM_KEYPOINTS]>,
}

impl FeatureEngineer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 计算一帧的特征向量
    ///
    /// 构造后或 `reset()` 后的第一帧, 位移全部为 0
    pub fn compute(
        &mut self,
        keypoints: &PoseKeypoints,
        frame_width: u32,
        frame_height: u32,
    ) -> FeatureVector {
        let w = frame_width.max(1) as f32;
        let h = frame_height.max(1) as f32;

        let mut xy = [[0.0f32; 2]; NUM_KEYPOINTS];
        for (dst, &(x, y, _)) in xy.iter_mut().zip(keypoints.points.iter()) {
            *dst = [x / w, y / h];
        }

        let mut features = [0.0f32; FEATURE_LEN];

        // 1. 归一化坐标 (34维)
        for (i, p) in xy.iter().enumerate() {
            features[raw_x(i)] = p[0];
            features[raw_y(i)] = p[1];
        }

        // 2. 速度 (34维), 首帧为0
        if let Some(prev) = &self.prev_xy {
            for i in 0..NUM_KEYPOINTS {
                features[DELTA_OFFSET + 2 * i] = xy[i][0] - prev[i][0];
                features[DELTA_OFFSET + 2 * i + 1] = xy[i][1] - prev[i][1];
            }
        }
        self.prev_xy = Some(xy);

        // 3. 工程特征 (7维)
        let shoulder_mid = midpoint(xy[L_SHOULDER], xy[R_SHOULDER]);
        let hip_mid = midpoint(xy[L_HIP], xy[R_HIP]);
        let ankle_mid = midpoint(xy[L_ANKLE], xy[R_ANKLE]);

        let nose_y = xy[NOSE][1];
        let hip_y = hip_mid[1];
        let torso_len = norm(sub(shoulder_mid, hip_mid));
        let body_len = norm(sub(xy[NOSE], ankle_mid));

        // 肩角: 肘-肩-髋, 左右平均
        let shoulder_angle = (joint_angle(xy[L_ELBOW], xy[L_SHOULDER], xy[L_HIP])
            + joint_angle(xy[R_ELBOW], xy[R_SHOULDER], xy[R_HIP]))
            / 2.0;

        // 膝角: 髋-膝-踝, 左右平均
        let knee_angle = (joint_angle(xy[L_HIP], xy[L_KNEE], xy[L_ANKLE])
            + joint_angle(xy[R_HIP], xy[R_KNEE], xy[R_ANKLE]))
            / 2.0;

        let vertical_ratio = torso_len / (body_len + EPS);

        features[IDX_NOSE_Y] = nose_y;
        features[IDX_HIP_Y] = hip_y;
        features[IDX_TORSO_LEN] = torso_len;
        features[IDX_BODY_LEN] = body_len;
        features[IDX_SHOULDER_ANGLE] = shoulder_angle;
        features[IDX_KNEE_ANGLE] = knee_angle;
        features[IDX_VERTICAL_RATIO] = vertical_ratio;

        features
    }

    /// 清除上一帧缓存
    pub fn reset(&mut self) {
        self.prev_xy = None;
    }
}
