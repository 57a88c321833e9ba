//! 事件分类端到端场景: 关键点序列 → 特征 → 窗口 → 分类

use pose_sentinel::analysis::classifier::evaluate;
use pose_sentinel::analysis::features::{IDX_HIP_Y, IDX_NOSE_Y, IDX_VERTICAL_RATIO};
use pose_sentinel::analysis::{classify, AnomalyLabel, FeatureEngineer, SequenceBuffer};
use pose_sentinel::detection::types::*;

const W: u32 = 640;
const H: u32 = 480;

/// 站姿逐渐塌落: `k` 从 0 (直立) 到 1 (髋部下沉 130 像素)
///
/// 躯干长度不变, 脚踝固定, 膝盖向前弯曲
fn pose(k: f32) -> PoseKeypoints {
    let hip_y = 260.0 + 130.0 * k;
    let shoulder_y = hip_y - 120.0;
    let nose_y = shoulder_y - 60.0;
    let knee_y = (hip_y + 420.0) / 2.0;
    let knee_dx = 60.0 * k;

    let mut points = [(320.0, nose_y, 0.9); NUM_KEYPOINTS];
    points[NOSE] = (320.0, nose_y, 0.9);
    points[L_SHOULDER] = (300.0, shoulder_y, 0.9);
    points[R_SHOULDER] = (340.0, shoulder_y, 0.9);
    points[L_ELBOW] = (290.0, shoulder_y + 60.0, 0.9);
    points[R_ELBOW] = (350.0, shoulder_y + 60.0, 0.9);
    points[L_WRIST] = (285.0, shoulder_y + 115.0, 0.9);
    points[R_WRIST] = (355.0, shoulder_y + 115.0, 0.9);
    points[L_HIP] = (305.0, hip_y, 0.9);
    points[R_HIP] = (335.0, hip_y, 0.9);
    points[L_KNEE] = (305.0 + knee_dx, knee_y, 0.9);
    points[R_KNEE] = (335.0 + knee_dx, knee_y, 0.9);
    points[L_ANKLE] = (305.0, 420.0, 0.9);
    points[R_ANKLE] = (335.0, 420.0, 0.9);
    PoseKeypoints::new(points)
}

fn window_from(poses: &[PoseKeypoints]) -> pose_sentinel::analysis::Window {
    let mut fe = FeatureEngineer::new();
    let mut buffer = SequenceBuffer::new(poses.len(), 1);
    let mut ready = false;
    for p in poses {
        ready = buffer.add(fe.compute(p, W, H));
    }
    assert!(ready);
    buffer.window()
}

#[test]
fn collapsing_person_is_fainting() {
    // 9 帧: 鼻子与髋部持续下降
    let poses: Vec<PoseKeypoints> = (0..9).map(|t| pose(t as f32 / 8.0)).collect();
    let window = window_from(&poses);

    let nose = window.column(IDX_NOSE_Y);
    let hip = window.column(IDX_HIP_Y);
    assert!(nose.windows(2).into_iter().all(|w| w[1] > w[0]));
    assert!(hip.windows(2).into_iter().all(|w| w[1] > w[0]));
    let vr = window.column(IDX_VERTICAL_RATIO);
    assert!(vr[8] >= vr[0] * 1.5);

    let event = classify(&window);
    assert_eq!(event.label, AnomalyLabel::Fainting);
    assert!(event.confidence >= 0.35);
}

#[test]
fn still_person_is_unknown() {
    let poses = vec![pose(0.0); 9];
    let window = window_from(&poses);
    assert_eq!(classify(&window).label, AnomalyLabel::Unknown);
    assert!(evaluate(&window).iter().all(|s| !s.qualified));
}
