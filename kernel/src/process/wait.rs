//! 等待子进程 (wait4)
//!
//! 参考 Linux kernel/exit.c do_wait()
//!
//! - `pid == -1`: 等待任意子进程，阻塞在 WaitChild 队列
//! - `pid > 0`: 等待指定子进程，阻塞在该子进程的 wait-list 上
//!
//! 找到僵尸子进程时立即回收；否则阻塞并调用调度器。被唤醒后由系统调用层
//! 重新执行 wait4，多个等待者竞争同一个子进程时只有第一个能回收它，
//! 其余的重新等待或者得到 `NotFound`。

use crate::arch::Arch;
use crate::errno::SchedError;
use crate::mm::MemoryManager;
use crate::process::pid::Pid;
use crate::process::task::{encode_wait_status, TaskStatus};
use crate::sched::{Kernel, QueueId};

/// 不阻塞
pub const WNOHANG: u32 = 1;
/// 报告已停止的子进程 (没有作业控制，接受但无效果)
pub const WUNTRACED: u32 = 2;
/// 报告被 SIGCONT 恢复的子进程 (同上)
pub const WCONTINUED: u32 = 8;

const WAIT_OPTIONS: u32 = WNOHANG | WUNTRACED | WCONTINUED;

/// wait4 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// 回收了一个子进程，`status` 是编码后的状态字
    Reaped { pid: Pid, status: u16 },
    /// WNOHANG 且没有可回收的子进程
    NotReady,
    /// 调用者已阻塞，被唤醒后需要重新执行
    Blocked,
}

impl<A: Arch, M: MemoryManager> Kernel<A, M> {
    pub fn do_wait4(&mut self, pid: Pid, options: u32) -> Result<WaitStatus, SchedError> {
        if options & !WAIT_OPTIONS != 0 {
            return Err(SchedError::InvalidArgument);
        }
        // 进程组 (0 和 < -1) 不支持
        if pid == 0 || pid < -1 {
            return Err(SchedError::InvalidArgument);
        }

        let cur = self.current_slot();
        let (target, queue) = if pid == -1 {
            let zombie = self
                .queues
                .iter(QueueId::Zombie)
                .find(|&slot| self.is_child(slot, cur));
            if let Some(child) = zombie {
                return Ok(self.reap(cur, child));
            }
            let has_children = self.pool.allocated_slots().any(|slot| self.is_child(slot, cur));
            if !has_children {
                return Err(SchedError::NotFound);
            }
            (None, QueueId::WaitChild)
        } else {
            let child = self
                .find_pid(pid)
                .filter(|&slot| self.is_child(slot, cur))
                .ok_or(SchedError::NotFound)?;
            if self.pool[child].status == TaskStatus::Zombie {
                return Ok(self.reap(cur, child));
            }
            (Some(child), QueueId::WaitList(child))
        };

        if options & WNOHANG != 0 {
            return Ok(WaitStatus::NotReady);
        }

        log::debug!(
            "sched: pid {} waits for {}",
            self.pool[cur].pid,
            target.map_or(-1, |slot| self.pool[slot].pid)
        );
        self.disable_preempt();
        self.do_block(cur, queue);
        self.enable_preempt();
        self.do_scheduler();
        Ok(WaitStatus::Blocked)
    }

    /// wait(pid) = wait4(pid, 0)
    pub fn do_wait(&mut self, pid: Pid) -> Result<WaitStatus, SchedError> {
        self.do_wait4(pid, 0)
    }

    /// 回收僵尸子进程，把它的 CPU 时间累加到父进程
    fn reap(&mut self, parent: usize, child: usize) -> WaitStatus {
        let c = &self.pool[child];
        let pid = c.pid;
        let status = encode_wait_status(c.exit_status);
        let utime = c.utime + c.cutime;
        let stime = c.stime + c.cstime;

        let p = &mut self.pool[parent];
        p.cutime += utime;
        p.cstime += stime;

        self.pool[child].status = TaskStatus::Exited;
        self.reclaim(child);
        log::debug!("sched: pid {} reaped, status {:#x}", pid, status);
        WaitStatus::Reaped { pid, status }
    }
}
