//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程退出与终止
//!
//! 参考 Linux kernel/exit.c
//!
//! 退出流程 (`terminate`):
//! 1. 从所在队列摘下，取消睡眠定时器，记录退出码
//! 2. CLONE_CHILD_CLEARTID: 把用户空间的 tid 清零
//! 3. 唤醒等待本进程的任务 (wait-list) 和在 wait4(-1) 中阻塞的父进程
//! 4. 子进程过继给本进程的父进程；父进程是 idle 时子进程成为孤儿
//! 5. 没有人能等待它时直接进入 EXITED 并回收，否则成为 ZOMBIE
//!
//! 当前任务的槽位不能立即回收 (还在它的内核栈上运行)，由调度器在
//! 切换到下一个任务之后处理 (`finish_task_switch`)。

use crate::arch::Arch;
use crate::errno::SchedError;
use crate::mm::MemoryManager;
use crate::process::pid::Pid;
use crate::process::task::{ParentLink, SpawnMode, TaskStatus};
use crate::sched::{Kernel, QueueId, IDLE_SLOT, NR_TASK_SLOTS};

impl<A: Arch, M: MemoryManager> Kernel<A, M> {
    /// 当前进程退出
    ///
    /// 在硬件上不会返回；模拟环境中调度器切换后返回
    pub fn do_exit(&mut self, status: i32) {
        let cur = self.current_slot();
        assert!(cur != IDLE_SLOT, "sched: fatal: idle task cannot exit");
        self.terminate(cur, status);
        self.do_scheduler();
    }

    /// 终止任意一个非 idle 的任务
    ///
    /// 不调用调度器：终止当前任务时调用者随后必须调用 `do_scheduler`
    pub(crate) fn terminate(&mut self, slot: usize, status: i32) {
        assert!(slot != IDLE_SLOT, "sched: fatal: idle task cannot exit");
        let is_current = slot == self.current_slot();

        self.queues.remove(slot);
        self.cancel_sleep_timer(slot);
        let pcb = &mut self.pool[slot];
        pcb.exit_status = status;
        pcb.killed = false;
        let pid = pcb.pid;
        let mode = pcb.mode;
        let pgdir = pcb.pgdir;
        let clear_tid = pcb.clear_child_tid;
        log::debug!("sched: pid {} exit with status {}", pid, status);

        if clear_tid != 0 && !self.mm.copy_to_user(pgdir, clear_tid, &0u32.to_ne_bytes()) {
            log::warn!("sched: pid {} bad clear_child_tid {:#x}", pid, clear_tid);
        }

        let waiters = self.wake_all(QueueId::WaitList(slot));
        let parent = self.parent_of(slot);
        let parent_waiting = parent.is_some_and(|p| self.queues.contains(QueueId::WaitChild, p));
        if let Some(p) = parent.filter(|_| parent_waiting) {
            self.do_unblock(p);
        }

        self.reparent_children(slot, parent);
        self.pool[slot].fd.clear();

        let orphan = parent.map_or(true, |p| p == IDLE_SLOT);
        let unwatched = mode == SpawnMode::AutoCleanupOnExit && waiters == 0 && !parent_waiting;
        if orphan || unwatched {
            self.pool[slot].status = TaskStatus::Exited;
            if !is_current {
                self.reclaim(slot);
            }
        } else {
            self.pool[slot].status = TaskStatus::Zombie;
            if !is_current {
                self.queues.enqueue(QueueId::Zombie, slot);
            }
        }
    }

    /// 把 `slot` 的子进程过继给 `new_parent`
    ///
    /// 新父进程是 idle 或不存在时子进程成为孤儿，孤儿僵尸立即回收
    fn reparent_children(&mut self, slot: usize, new_parent: Option<usize>) {
        let pid = self.pool[slot].pid;
        let link = new_parent.filter(|&p| p != IDLE_SLOT).map(|p| ParentLink {
            slot: p,
            pid: self.pool[p].pid,
            reparented: true,
        });

        for child in 0..NR_TASK_SLOTS {
            if child == slot || !self.pool.is_allocated(child) {
                continue;
            }
            let is_ours = self.pool[child]
                .parent
                .is_some_and(|p| p.slot == slot && p.pid == pid);
            if !is_ours {
                continue;
            }

            self.pool[child].parent = link;
            let zombie = self.pool[child].status == TaskStatus::Zombie;
            match link {
                None if zombie => {
                    self.pool[child].status = TaskStatus::Exited;
                    self.reclaim(child);
                }
                Some(p) if zombie && self.queues.contains(QueueId::WaitChild, p.slot) => {
                    self.do_unblock(p.slot);
                }
                _ => {}
            }
            log::debug!(
                "sched: pid {} reparented to {}",
                self.pool[child].pid,
                link.map_or(0, |p| p.pid)
            );
        }
    }

    /// 释放 EXITED 任务占用的内存并把槽位还给 PCB 池
    pub(crate) fn reclaim(&mut self, slot: usize) {
        let pid = self.pool[slot].pid;
        self.release_page_dir(slot);
        let pcb = &self.pool[slot];
        if pcb.kernel_stack_base != 0 {
            let top = pcb.kernel_stack_top();
            self.mm.free_kernel_stack(top);
        }
        self.pool.release(&mut self.queues, slot);
        log::debug!("sched: pid {} reclaimed", pid);
    }

    /// 释放任务自己的页目录
    ///
    /// 共享页目录 (CLONE_VM) 的任务不释放；拥有者退出时如果还有共享者，
    /// 所有权转给其中一个共享者。
    pub(crate) fn release_page_dir(&mut self, slot: usize) {
        let pcb = &self.pool[slot];
        let pgdir = pcb.pgdir;
        if !pcb.task_type.is_user() || pcb.shares_pgdir || pgdir == 0 {
            return;
        }
        if pgdir == self.mm.kernel_page_dir() {
            return;
        }

        let heir = (0..NR_TASK_SLOTS).find(|&s| {
            s != slot
                && self.pool.is_allocated(s)
                && self.pool[s].shares_pgdir
                && self.pool[s].pgdir == pgdir
        });
        match heir {
            Some(s) => self.pool[s].shares_pgdir = false,
            None => self.mm.free_page_dir(pgdir),
        }
    }

    /// 终止一个进程
    ///
    /// 目标在下一个调度点终止 (退出码 -1)；阻塞中的目标先被唤醒。
    /// 杀死自己则立即退出。
    pub fn kill(&mut self, pid: Pid) -> Result<(), SchedError> {
        if pid <= 0 {
            return Err(SchedError::InvalidArgument);
        }
        let slot = self.find_pid(pid).ok_or(SchedError::NotFound)?;

        let status = self.pool[slot].status;
        match status {
            TaskStatus::Zombie => Ok(()),
            _ if slot == self.current_slot() => {
                log::debug!("sched: pid {} killed itself", pid);
                self.do_exit(-1);
                Ok(())
            }
            _ => {
                self.pool[slot].killed = true;
                if status == TaskStatus::Blocked {
                    self.do_unblock(slot);
                }
                log::debug!("sched: pid {} marked killed", pid);
                Ok(())
            }
        }
    }
}
