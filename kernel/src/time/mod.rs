//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 时间管理
//!
//! - `timer`: 定时器池，时钟中断驱动
//! - `clock`: 睡眠、CPU 时间统计、墙上时间

pub mod clock;
pub mod timer;

pub use clock::{Rusage, TimeSpec, TimeVal, Tms};
pub use timer::{TimerCallback, TimerWheel};

use crate::arch::Arch;
use crate::errno::SchedError;
use crate::mm::MemoryManager;
use crate::sched::Kernel;

impl<A: Arch, M: MemoryManager> Kernel<A, M> {
    /// 启动以来的滴答数
    pub fn get_ticks(&self) -> u64 {
        self.arch.get_ticks()
    }

    /// 每秒滴答数
    pub fn get_time_base(&self) -> u64 {
        self.arch.time_base()
    }

    /// 启动以来的秒数
    pub fn get_timer(&self) -> u64 {
        self.get_ticks() / self.get_time_base()
    }

    /// 设置一个 `ticks` 个滴答后触发的定时器
    pub fn timer_create(
        &mut self,
        callback: TimerCallback<Self>,
        param: usize,
        ticks: u64,
    ) -> Result<usize, SchedError> {
        self.disable_preempt();
        let deadline = self.get_ticks().saturating_add(ticks);
        let ret = self.timers.create(callback, param, deadline);
        self.enable_preempt();
        ret
    }

    /// 取消 `slot` 上还没触发的睡眠定时器
    ///
    /// 和队列操作一样由调用者负责关抢占，这里不开关中断
    pub(crate) fn cancel_sleep_timer(&mut self, slot: usize) {
        let Some(idx) = self.pool[slot].sleep_timer.take() else {
            return;
        };
        if self.timers.cancel(idx) {
            log::trace!("timer: pid {} sleep timer {} cancelled", self.pool[slot].pid, idx);
        }
    }

    /// 时钟中断中调用：触发所有到期的定时器，返回触发个数
    ///
    /// 回调在关抢占的状态下同步执行
    pub fn timer_check(&mut self) -> usize {
        self.disable_preempt();
        let now = self.get_ticks();
        let expired = self.timers.expire(now);
        for (timeout, callback, param) in expired.iter() {
            log::trace!("timer: fired deadline {} at {}", timeout, now);
            callback(self, param);
        }
        self.enable_preempt();
        expired.len()
    }

    pub fn active_timers(&self) -> usize {
        self.timers.active_count()
    }
}
