//! 抢占计数
//!
//! 对应 Linux 的 preempt_count。每个 PCB 自带一个计数器：
//! disable_preempt 关中断并加一，enable_preempt 减一，只有减到 0 时才重新开中断，
//! 所以嵌套的临界区可以安全组合。

/// 抢占关闭嵌套计数
///
/// `repr(transparent)` 保证它在 PCB 中的布局与一个机器字相同
#[repr(transparent)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreemptCount(usize);

impl PreemptCount {
    pub const fn new() -> Self {
        Self(0)
    }

    /// 当前嵌套深度
    pub fn depth(&self) -> usize {
        self.0
    }

    /// 是否允许抢占
    pub fn is_preemptible(&self) -> bool {
        self.0 == 0
    }

    /// 进入临界区
    pub fn disable(&mut self) {
        self.0 += 1;
    }

    /// 离开临界区，返回是否已完全退出 (应当重新开中断)
    ///
    /// # Panics
    /// 计数已经为 0 时 panic：enable/disable 不配对是编程错误
    pub fn enable(&mut self) -> bool {
        assert!(self.0 > 0, "sched: fatal: unbalanced enable_preempt");
        self.0 -= 1;
        self.0 == 0
    }
}
