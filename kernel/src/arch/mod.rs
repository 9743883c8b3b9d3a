//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构相关代码
//!
//! 调度核心只通过 `Arch` trait 接触硬件：
//! - 中断开关 (sstatus.SIE)
//! - 时钟滴答 (rdtime)
//! - 上下文切换 (switch_to 汇编)
//! - 空闲等待 (wfi)
//!
//! 当前支持的架构：
//! - **RISC-V (riscv64)** - 唯一的硬件后端
//!
//! 宿主机测试使用 `tests` 模块中的模拟实现。

pub mod context;

#[cfg(target_arch = "riscv64")]
pub mod riscv64;

pub use context::{SwitchContext, TrapContext};

use crate::config::DEFAULT_TIME_BASE;
use crate::time::TimeSpec;

/// 调度核心依赖的架构接口
pub trait Arch {
    /// 关闭本地中断
    fn irq_disable(&mut self);

    /// 打开本地中断
    fn irq_enable(&mut self);

    /// 启动以来的滴答数
    fn get_ticks(&self) -> u64;

    /// 每秒滴答数
    fn time_base(&self) -> u64 {
        DEFAULT_TIME_BASE
    }

    /// 实时时钟；没有 RTC 的平台返回 None，内核退回到启动纪元 + 运行时间
    fn realtime(&self) -> Option<TimeSpec> {
        None
    }

    /// 新任务第一次被切换到时的返回地址 (ret_from_exception)
    fn trap_return_entry(&self) -> usize;

    /// 内核线程使用的全局指针 (gp)
    fn global_pointer(&self) -> usize {
        0
    }

    /// 保存 `prev` 的被调用者保存寄存器并恢复 `next`
    ///
    /// 对应 Linux 内核的 __switch_to()。在硬件上，这个调用在 `prev` 下一次
    /// 被调度时才返回。
    ///
    /// # Safety
    /// 两个指针必须指向有效的 `SwitchContext`，且调用期间中断已关闭。
    unsafe fn switch_to(&mut self, prev: *mut SwitchContext, next: *const SwitchContext);

    /// 就绪队列为空时等待中断
    fn wait_for_interrupt(&mut self);
}
