//! 近距信标测距 (Proximity beacon ranging)
//!
//! 锁定阶段每次尝试读取一次信标距离 (0 或 1 个读数)。
//! RSSI 采用对数路径损耗模型换算距离, 多次采样先去掉最大/最小值再平均。

use std::sync::Arc;

use parking_lot::Mutex;

/// 1 米处 RSSI (dBm)
pub const TX_POWER_DBM: f32 = -59.0;
/// 路径损耗指数 (室内约 2~3)
pub const PATH_LOSS_EXPONENT: f32 = 2.5;
pub const MIN_DISTANCE_M: f32 = 0.1;
pub const MAX_DISTANCE_M: f32 = 30.0;

/// 信标距离来源
pub trait BeaconSource: Send {
    /// 当前目标信标距离 (米); 无读数返回 None
    fn read_distance(&mut self) -> Option<f32>;
}

/// RSSI → 距离 (米), 截断到 [0.1, 30]
pub fn rssi_to_distance(rssi_dbm: f32) -> f32 {
    let d = 10f32.powf((TX_POWER_DBM - rssi_dbm) / (10.0 * PATH_LOSS_EXPONENT));
    d.clamp(MIN_DISTANCE_M, MAX_DISTANCE_M)
}

/// 截尾平均: 超过 3 个样本时去掉最小与最大值
pub fn trimmed_mean_rssi(samples: &[f32]) -> Option<f32> {
    let mut sorted: Vec<f32> = samples.iter().copied().filter(|s| s.is_finite()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let kept = if sorted.len() > 3 {
        &sorted[1..sorted.len() - 1]
    } else {
        &sorted[..]
    };
    Some(kept.iter().sum::<f32>() / kept.len() as f32)
}

/// 一轮扫描的 RSSI 样本 → 距离
pub fn scan_distance(samples: &[f32]) -> Option<f32> {
    trimmed_mean_rssi(samples).map(rssi_to_distance)
}

/// 固定读数 (命令行 / 测试)
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedBeacon(pub Option<f32>);

impl BeaconSource for FixedBeacon {
    fn read_distance(&mut self) -> Option<f32> {
        self.0
    }
}

/// 跨线程共享的最新信标读数
///
/// 写入方 (测距子系统 / 控制台) 随时更新, 工作线程锁定时读取
#[derive(Debug, Clone, Default)]
pub struct SharedBeacon {
    latest: Arc<Mutex<Option<f32>>>,
}

impl SharedBeacon {
    pub fn new(initial: Option<f32>) -> Self {
        Self {
            latest: Arc::new(Mutex::new(initial)),
        }
    }

    pub fn set_distance(&self, metres: f32) {
        *self.latest.lock() = Some(metres);
    }

    /// 用一轮 RSSI 样本更新, 返回换算出的距离
    pub fn set_rssi_samples(&self, samples: &[f32]) -> Option<f32> {
        let distance = scan_distance(samples);
        *self.latest.lock() = distance;
        distance
    }

    pub fn clear(&self) {
        *self.latest.lock() = None;
    }

    pub fn latest(&self) -> Option<f32> {
        *self.latest.lock()
    }
}

impl BeaconSource for SharedBeacon {
    fn read_distance(&mut self) -> Option<f32> {
        self.latest()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rssi_at_tx_power_is_one_metre() {
        assert!((rssi_to_distance(TX_POWER_DBM) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_rssi_distance_is_clamped() {
        assert_eq!(rssi_to_distance(0.0), MIN_DISTANCE_M);
        assert_eq!(rssi_to_distance(-150.0), MAX_DISTANCE_M);
    }

    #[test]
    fn test_rssi_25db_weaker_is_ten_metres() {
        assert!((rssi_to_distance(-84.0) - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_trimmed_mean_drops_extremes() {
        assert_eq!(trimmed_mean_rssi(&[-60.0, -90.0, -62.0, -40.0, -61.0]), Some(-61.0));
        // 不超过 3 个样本时全部保留
        assert_eq!(trimmed_mean_rssi(&[-60.0, -70.0]), Some(-65.0));
        assert_eq!(trimmed_mean_rssi(&[]), None);
    }

    #[test]
    fn test_shared_beacon_is_visible_across_clones() {
        let writer = SharedBeacon::default();
        let mut reader = writer.clone();
        assert_eq!(reader.read_distance(), None);

        writer.set_distance(2.5);
        assert_eq!(reader.read_distance(), Some(2.5));

        let d = writer.set_rssi_samples(&[-59.0, -59.0]).unwrap();
        assert!((reader.read_distance().unwrap() - d).abs() < 1e-6);

        writer.clear();
        assert_eq!(reader.read_distance(), None);
    }
}
