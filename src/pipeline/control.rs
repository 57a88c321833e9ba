//! 控制信号 (Control flags)
//!
//! activate / deactivate 为电平状态, 以无锁标志位传递, 后写者覆盖先写者。
//! 工作线程每次循环取走一次。停止为协作式, 每次循环检查一次。

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

const NONE: u8 = 0;
const ACTIVATE: u8 = 1;
const DEACTIVATE: u8 = 2;

/// 外部命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Activate,
    Deactivate,
}

#[derive(Debug, Default)]
pub struct ControlFlags {
    pending: AtomicU8,
    stop: AtomicBool,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self, command: Command) {
        let value = match command {
            Command::Activate => ACTIVATE,
            Command::Deactivate => DEACTIVATE,
        };
        self.pending.store(value, Ordering::Release);
    }

    /// 取走待处理命令
    pub fn take(&self) -> Option<Command> {
        match self.pending.swap(NONE, Ordering::AcqRel) {
            ACTIVATE => Some(Command::Activate),
            DEACTIVATE => Some(Command::Deactivate),
            _ => None,
        }
    }

    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn should_stop(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}
