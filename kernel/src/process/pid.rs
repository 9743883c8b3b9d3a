//! PID 管理
//!
//! 遵循 Linux 内核的 PID 管理机制 (kernel/pid.c)
//!
//! PID 空间：
//! - PID 0: idle 任务 (启动上下文)
//! - PID 1+: 普通 PID，单调递增分配
//!
//! 到达上限后从 `PID_FIRST` 回绕，跳过仍在使用的 PID。
//! 单调分配保证一个 PID 只有在其槽位完全释放之后才可能被重新使用。

/// 进程标识符
///
/// 遵循 Linux 内核的 pid_t 类型；wait4 用 -1 表示任意子进程
pub type Pid = i32;

/// 最大 PID 数值 (与 Linux 一致: /proc/sys/kernel/pid_max)
pub const PID_MAX_LIMIT: Pid = 32768;

/// idle 任务
pub const PID_IDLE: Pid = 0;

/// 第一个可分配的 PID
pub const PID_FIRST: Pid = 1;

/// PID 分配器
#[derive(Debug, Clone)]
pub struct PidAllocator {
    next: Pid,
}

impl PidAllocator {
    pub const fn new() -> Self {
        Self { next: PID_FIRST }
    }

    /// 分配一个新的 PID
    ///
    /// `in_use` 判断某个 PID 当前是否仍属于某个未释放的槽位。
    /// PID 空间耗尽时返回 None。
    pub fn alloc(&mut self, in_use: impl Fn(Pid) -> bool) -> Option<Pid> {
        for _ in PID_FIRST..PID_MAX_LIMIT {
            let pid = self.next;
            self.next = if pid + 1 >= PID_MAX_LIMIT { PID_FIRST } else { pid + 1 };
            if !in_use(pid) {
                return Some(pid);
            }
        }
        None
    }
}

impl Default for PidAllocator {
    fn default() -> Self {
        Self::new()
    }
}
