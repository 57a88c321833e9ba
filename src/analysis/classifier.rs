//! 异常事件分类 (Event Classifier)
//!
//! 评分器判定窗口异常后, 用多信号启发式规则把窗口归类为具体事件。
//!
//! 每个标签是一条固定记录: 有序的命名检查项 + 最低得分 + 优先级。
//! 标签得分 = 通过的检查数 / 检查总数, 达到该标签的最低得分才算匹配。
//! 最低得分不对称: 安全攸关的 FAINTING 门槛最低 (弱证据也要报),
//! 易受噪声干扰的 HAND ON HEAD 门槛最高。
//!
//! 决策顺序 (不可调整):
//! 1. FAINTING 匹配 → 直接返回 FAINTING, 不看其它标签得分
//! 2. 否则在匹配的标签中取 (优先级, 得分) 字典序最大者
//! 3. 无匹配 → UNKNOWN

use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::features::{
    delta_y, raw_x, raw_y, FEATURE_LEN, IDX_BODY_LEN, IDX_HIP_Y, IDX_KNEE_ANGLE, IDX_NOSE_Y,
    IDX_SHOULDER_ANGLE, IDX_TORSO_LEN, IDX_VERTICAL_RATIO,
};
use super::Window;
use crate::detection::types::{L_WRIST, NOSE, R_WRIST};

/// 事件标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyLabel {
    #[serde(rename = "FAINTING")]
    Fainting,
    #[serde(rename = "SWAYING")]
    Swaying,
    #[serde(rename = "CROUCHING")]
    Crouching,
    #[serde(rename = "HAND ON HEAD")]
    HandOnHead,
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl AnomalyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyLabel::Fainting => "FAINTING",
            AnomalyLabel::Swaying => "SWAYING",
            AnomalyLabel::Crouching => "CROUCHING",
            AnomalyLabel::HandOnHead => "HAND ON HEAD",
            AnomalyLabel::Unknown => "UNKNOWN",
        }
    }

    /// 显示颜色 (RGB)
    pub fn color(&self) -> [u8; 3] {
        match self {
            AnomalyLabel::Fainting => [255, 0, 0],
            AnomalyLabel::Swaying => [255, 165, 0],
            AnomalyLabel::Crouching => [0, 100, 255],
            AnomalyLabel::HandOnHead => [0, 255, 0],
            AnomalyLabel::Unknown => [128, 128, 128],
        }
    }

    /// 安全攸关标签: 匹配即胜出
    pub fn is_safety_critical(&self) -> bool {
        matches!(self, AnomalyLabel::Fainting)
    }
}

impl std::fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 置信度档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

/// 分类结果, 创建后不再修改
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub label: AnomalyLabel,
    /// 匹配得分 ∈ [0, 1]; UNKNOWN 为 0
    pub confidence: f32,
}

impl AnomalyEvent {
    pub fn unknown() -> Self {
        Self {
            label: AnomalyLabel::Unknown,
            confidence: 0.0,
        }
    }

    pub fn tier(&self) -> ConfidenceTier {
        if self.confidence >= 0.75 {
            ConfidenceTier::High
        } else if self.confidence >= 0.5 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }
}

// ========== 窗口统计 ==========

/// 分类所需的逐帧序列
pub struct WindowSeries {
    pub nose_y: Array1<f32>,
    pub hip_y: Array1<f32>,
    pub torso_len: Array1<f32>,
    pub body_len: Array1<f32>,
    pub shoulder_angle: Array1<f32>,
    pub knee_angle: Array1<f32>,
    pub vertical_ratio: Array1<f32>,
    pub delta_nose_y: Array1<f32>,
    pub nose_x: Array1<f32>,
    pub l_wrist_x: Array1<f32>,
    pub l_wrist_y: Array1<f32>,
    pub r_wrist_x: Array1<f32>,
    pub r_wrist_y: Array1<f32>,
}

impl WindowSeries {
    /// 窗口为空或列数不足时返回 None
    pub fn from_window(window: &Window) -> Option<Self> {
        if window.nrows() == 0 || window.ncols() < FEATURE_LEN {
            return None;
        }
        let col = |i: usize| window.column(i).to_owned();
        Some(Self {
            nose_y: col(IDX_NOSE_Y),
            hip_y: col(IDX_HIP_Y),
            torso_len: col(IDX_TORSO_LEN),
            body_len: col(IDX_BODY_LEN),
            shoulder_angle: col(IDX_SHOULDER_ANGLE),
            knee_angle: col(IDX_KNEE_ANGLE),
            vertical_ratio: col(IDX_VERTICAL_RATIO),
            delta_nose_y: col(delta_y(NOSE)),
            nose_x: col(raw_x(NOSE)),
            l_wrist_x: col(raw_x(L_WRIST)),
            l_wrist_y: col(raw_y(L_WRIST)),
            r_wrist_x: col(raw_x(R_WRIST)),
            r_wrist_y: col(raw_y(R_WRIST)),
        })
    }
}

fn first(a: &Array1<f32>) -> f32 {
    a[0]
}

fn last(a: &Array1<f32>) -> f32 {
    a[a.len() - 1]
}

/// 末帧 - 首帧
fn change(a: &Array1<f32>) -> f32 {
    last(a) - first(a)
}

/// 总体标准差 (ddof = 0)
fn std_dev(a: &Array1<f32>) -> f32 {
    a.std(0.0)
}

fn mean(a: &Array1<f32>) -> f32 {
    a.mean().unwrap_or(0.0)
}

fn max_abs(a: &Array1<f32>) -> f32 {
    a.iter().fold(0.0f32, |m, v| m.max(v.abs()))
}

fn fraction_true(mask: impl Iterator<Item = bool>) -> f32 {
    let (hits, total) = mask.fold((0usize, 0usize), |(h, t), b| (h + b as usize, t + 1));
    if total == 0 {
        0.0
    } else {
        hits as f32 / total as f32
    }
}

// 手在头上: 手腕至少高出鼻子 3% 画面高度, 且水平方向靠近头部
const WRIST_ABOVE_MARGIN: f32 = 0.03;
const WRIST_NEAR_HEAD_X: f32 = 0.12;
const HAND_SUSTAINED_FRACTION: f32 = 0.4;

fn hand_on_head_fraction(s: &WindowSeries, wrist_x: ArrayView1<f32>, wrist_y: ArrayView1<f32>) -> f32 {
    fraction_true(
        wrist_x
            .iter()
            .zip(wrist_y.iter())
            .zip(s.nose_x.iter().zip(s.nose_y.iter()))
            .map(|((&wx, &wy), (&nx, &ny))| {
                wy < ny - WRIST_ABOVE_MARGIN && (wx - nx).abs() < WRIST_NEAR_HEAD_X
            }),
    )
}

// ========== 检查项 ==========

/// 命名检查项
pub struct Check {
    pub name: &'static str,
    pub predicate: fn(&WindowSeries) -> bool,
}

/// 标签签名: 有序检查项 + 最低得分 + 优先级
pub struct Signature {
    pub label: AnomalyLabel,
    pub checks: &'static [Check],
    pub min_score: f32,
    pub priority: u8,
}

impl Signature {
    /// 通过的检查项名称, 按表中顺序
    pub fn passed_checks(&self, series: &WindowSeries) -> Vec<&'static str> {
        self.checks
            .iter()
            .filter(|c| (c.predicate)(series))
            .map(|c| c.name)
            .collect()
    }
}

const FAINTING_CHECKS: &[Check] = &[
    Check {
        name: "nose_drop",
        predicate: |s| change(&s.nose_y) > 0.06,
    },
    Check {
        name: "fast_drop",
        predicate: |s| max_abs(&s.delta_nose_y) > 0.02,
    },
    Check {
        name: "went_horizontal",
        predicate: |s| last(&s.vertical_ratio) > first(&s.vertical_ratio) * 1.3,
    },
    Check {
        name: "knee_buckle",
        predicate: |s| last(&s.knee_angle) < first(&s.knee_angle) - 0.2,
    },
    Check {
        name: "hip_drop",
        predicate: |s| change(&s.hip_y) > 0.05,
    },
];

const SWAYING_CHECKS: &[Check] = &[
    Check {
        name: "nose_oscillation",
        predicate: |s| std_dev(&s.nose_y) > 0.015,
    },
    Check {
        name: "hip_oscillation",
        predicate: |s| std_dev(&s.hip_y) > 0.01,
    },
    Check {
        name: "still_upright",
        predicate: |s| change(&s.nose_y).abs() < 0.08,
    },
    Check {
        name: "shoulder_wobble",
        predicate: |s| std_dev(&s.shoulder_angle) > 0.05,
    },
];

const CROUCHING_CHECKS: &[Check] = &[
    Check {
        name: "knees_bent",
        predicate: |s| last(&s.knee_angle) < first(&s.knee_angle) - 0.2,
    },
    Check {
        name: "hip_lowered",
        predicate: |s| change(&s.hip_y) > 0.05,
    },
    Check {
        name: "torso_compressed",
        predicate: |s| last(&s.torso_len) < first(&s.torso_len) * 0.8,
    },
    Check {
        name: "still_vertical",
        predicate: |s| last(&s.vertical_ratio) < 1.0,
    },
];

const HAND_ON_HEAD_CHECKS: &[Check] = &[
    Check {
        name: "wrist_on_head",
        predicate: |s| {
            hand_on_head_fraction(s, s.l_wrist_x.view(), s.l_wrist_y.view())
                > HAND_SUSTAINED_FRACTION
                || hand_on_head_fraction(s, s.r_wrist_x.view(), s.r_wrist_y.view())
                    > HAND_SUSTAINED_FRACTION
        },
    },
    Check {
        name: "shoulder_raised",
        predicate: |s| mean(&s.shoulder_angle) > 0.3,
    },
    Check {
        name: "no_drop",
        predicate: |s| change(&s.nose_y).abs() < 0.04,
    },
    Check {
        name: "still_upright",
        predicate: |s| mean(&s.vertical_ratio) < 0.6,
    },
];

/// 固定顺序的标签表
pub static SIGNATURES: [Signature; 4] = [
    Signature {
        label: AnomalyLabel::Fainting,
        checks: FAINTING_CHECKS,
        min_score: 0.35,
        priority: 10,
    },
    Signature {
        label: AnomalyLabel::Swaying,
        checks: SWAYING_CHECKS,
        min_score: 0.50,
        priority: 3,
    },
    Signature {
        label: AnomalyLabel::Crouching,
        checks: CROUCHING_CHECKS,
        min_score: 0.50,
        priority: 2,
    },
    Signature {
        label: AnomalyLabel::HandOnHead,
        checks: HAND_ON_HEAD_CHECKS,
        min_score: 0.75,
        priority: 1,
    },
];

/// 单个标签的评估结果
#[derive(Debug, Clone, PartialEq)]
pub struct LabelScore {
    pub label: AnomalyLabel,
    pub score: f32,
    pub priority: u8,
    pub qualified: bool,
    pub passed: Vec<&'static str>,
}

/// 按固定顺序评估全部标签
pub fn evaluate(window: &Window) -> Vec<LabelScore> {
    let Some(series) = WindowSeries::from_window(window) else {
        return Vec::new();
    };
    SIGNATURES
        .iter()
        .map(|sig| {
            // 匹配得分 = 通过数 / 总数
            let passed = sig.passed_checks(&series);
            let score = passed.len() as f32 / sig.checks.len() as f32;
            LabelScore {
                label: sig.label,
                score,
                priority: sig.priority,
                qualified: score >= sig.min_score,
                passed,
            }
        })
        .collect()
}

/// 分类一个异常窗口
pub fn classify(window: &Window) -> AnomalyEvent {
    let scores = evaluate(window);
    debug!(
        "🧮 标签得分: {}",
        scores
            .iter()
            .map(|s| format!("{}={:.2}[{}]", s.label, s.score, s.passed.join(",")))
            .collect::<Vec<_>>()
            .join(" ")
    );

    let mut qualified = scores.iter().filter(|s| s.qualified);

    // 1. 安全攸关标签无条件胜出
    if let Some(critical) = scores
        .iter()
        .find(|s| s.qualified && s.label.is_safety_critical())
    {
        return AnomalyEvent {
            label: critical.label,
            confidence: critical.score,
        };
    }

    // 2. (优先级, 得分) 字典序最大; 并列时保留表中靠前者
    let Some(mut best) = qualified.next() else {
        // 3. 无匹配
        return AnomalyEvent::unknown();
    };
    for candidate in qualified {
        let better = candidate.priority > best.priority
            || (candidate.priority == best.priority && candidate.score > best.score);
        if better {
            best = candidate;
        }
    }

    AnomalyEvent {
        label: best.label,
        confidence: best.score,
    }
}
