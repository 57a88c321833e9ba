/// 目标锁定系统 (Target Lock)
///
/// 在多人场景中隔离并持续跟随单一目标:
/// - distance: 检测框高度 → 距离, 信标自校准
/// - beacon:   信标距离来源 (RSSI 换算 / 固定 / 共享)
/// - lock:     INACTIVE / LOCK_ON / TRACKING 状态机
pub mod beacon;
pub mod distance;
pub mod lock;

pub use beacon::{rssi_to_distance, scan_distance, BeaconSource, FixedBeacon, SharedBeacon};
pub use distance::{focal_length_px, DistanceEstimator};
pub use lock::{LockController, LockMode, LockState, LockTransition, LockUpdate};
