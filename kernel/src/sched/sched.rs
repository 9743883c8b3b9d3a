//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度器核心
//!
//! 单核模型：任何时刻只有一个 RUNNING 的 PCB，即 `current`。
//! `current` 只在 `switch_to` 中被修改。
//!
//! 调度策略：
//! - 在就绪队列中选 `temp_priority` 最高者，相同时按 FIFO 顺序
//! - 被选中者的 `temp_priority` 恢复为 `priority`，其余等待者加一 (老化)
//! - 优先级都相同时就是轮转调度
//!
//! 共享数据 (队列、PCB 池、定时器池) 只靠关抢占保护，没有细粒度锁。

use core::fmt;

use crate::arch::{Arch, SwitchContext};
use crate::errno::SchedError;
use crate::mm::MemoryManager;
use crate::process::pid::Pid;
use crate::process::task::{Pcb, TaskStatus, TaskType};
use crate::time::{TimeSpec, TimerWheel};

use super::pool::{PcbPool, IDLE_SLOT};
use super::queue::{QueueId, Queues};

/// 调度核心的全部状态
///
/// 启动时创建一次；启动上下文成为 idle 任务 (pid 0)。
pub struct Kernel<A: Arch, M: MemoryManager> {
    pub arch: A,
    pub mm: M,
    pub(crate) pool: PcbPool,
    pub(crate) queues: Queues,
    pub(crate) timers: TimerWheel<Self>,
    /// 当前运行的槽位，只由 switch_to 写入
    current: usize,
    /// 没有 RTC 时的墙上时间基准 (启动时刻)
    pub(crate) boot_epoch: TimeSpec,
    /// 上一次 CPU 时间记账的滴答
    pub(crate) last_time: u64,
    /// 已经 EXITED、等待切换完成后回收的槽位
    ///
    /// 换下时还运行在它的内核栈上，不能在 switch_to 之前释放
    pending_reclaim: Option<usize>,
}

/// `ps` 列表中的一行
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: Pid,
    pub status: TaskStatus,
    pub priority: i32,
    pub ppid: Pid,
    pub mask: u64,
    pub task_type: TaskType,
}

impl<A: Arch, M: MemoryManager> Kernel<A, M> {
    pub fn new(arch: A, mm: M) -> Self {
        let mut queues = Queues::new();
        let mut pool = PcbPool::new(&mut queues);

        let idle = &mut pool[IDLE_SLOT];
        idle.pgdir = mm.kernel_page_dir();
        let now = arch.get_ticks();
        idle.time_start = now;

        log::info!(
            "sched: init, {} task slots, {} timers",
            pool.capacity(),
            crate::config::NUM_TIMER
        );

        Self {
            arch,
            mm,
            pool,
            queues,
            timers: TimerWheel::new(),
            current: IDLE_SLOT,
            boot_epoch: TimeSpec::ZERO,
            last_time: now,
            pending_reclaim: None,
        }
    }

    // ---- 查询 ----

    /// 当前运行的槽位
    pub fn current_slot(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &Pcb {
        &self.pool[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Pcb {
        let cur = self.current;
        &mut self.pool[cur]
    }

    pub fn pcb(&self, slot: usize) -> &Pcb {
        &self.pool[slot]
    }

    pub fn pcb_mut(&mut self, slot: usize) -> &mut Pcb {
        &mut self.pool[slot]
    }

    /// 按 pid 查找尚未终止 (非 EXITED) 的 PCB
    pub fn find_pid(&self, pid: Pid) -> Option<usize> {
        self.pool
            .find(pid)
            .filter(|&slot| self.pool[slot].status != TaskStatus::Exited)
    }

    /// 槽位所在的队列
    pub fn queue_of(&self, slot: usize) -> Option<QueueId> {
        self.queues.owner(slot)
    }

    pub fn queue_len(&self, id: QueueId) -> usize {
        self.queues.len(id)
    }

    /// 按 FIFO 顺序列出某个队列中的 pid
    pub fn queue_pids(&self, id: QueueId) -> impl Iterator<Item = Pid> + '_ {
        self.queues.iter(id).map(move |slot| self.pool[slot].pid)
    }

    pub fn live_count(&self) -> usize {
        self.pool.live_count()
    }

    pub fn free_count(&self) -> usize {
        self.queues.len(QueueId::Free)
    }

    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn is_allocated(&self, slot: usize) -> bool {
        self.pool.is_allocated(slot)
    }

    /// 父进程的槽位，父进程已不存在时返回 None
    pub fn parent_of(&self, slot: usize) -> Option<usize> {
        let link = self.pool[slot].parent?;
        let alive = self.pool.is_allocated(link.slot)
            && self.pool[link.slot].pid == link.pid
            && self.pool[link.slot].status != TaskStatus::Exited;
        alive.then_some(link.slot)
    }

    /// `slot` 是否是 `parent` 的子进程
    pub fn is_child(&self, slot: usize, parent: usize) -> bool {
        self.pool.is_allocated(slot) && slot != parent && self.parent_of(slot) == Some(parent)
    }

    // ---- 抢占 ----

    /// 关中断并增加当前 PCB 的抢占计数
    pub fn disable_preempt(&mut self) {
        self.arch.irq_disable();
        let cur = self.current;
        self.pool[cur].preempt_count.disable();
    }

    /// 减少抢占计数，减到 0 时开中断
    pub fn enable_preempt(&mut self) {
        let cur = self.current;
        if self.pool[cur].preempt_count.enable() {
            self.arch.irq_enable();
        }
    }

    // ---- 调度 ----

    /// 调度入口
    ///
    /// 调用者必须已经把当前 PCB 放到正确的队列 (或设置好状态)：
    /// - RUNNING: 放回就绪队列尾部 (idle 除外)
    /// - ZOMBIE: 挂到僵尸队列
    /// - EXITED: 切换到下一个任务之后释放槽位
    /// - BLOCKED / 已在就绪队列: 保持不动
    pub fn do_scheduler(&mut self) {
        self.finish_task_switch();
        let prev = self.current;

        let next = loop {
            match self.pick_next() {
                Some(slot) if self.pool[slot].killed => {
                    log::debug!("sched: pid {} killed, terminating", self.pool[slot].pid);
                    self.terminate(slot, -1);
                }
                other => break other,
            }
        };

        let next = match next {
            Some(slot) => slot,
            None if self.pool[prev].status == TaskStatus::Running => {
                // 没有其他任务可运行，继续运行当前任务
                if prev == IDLE_SLOT {
                    self.arch.wait_for_interrupt();
                } else {
                    self.pool[prev].reset_time_slice();
                }
                return;
            }
            None => IDLE_SLOT,
        };

        if next == prev {
            self.pool[prev].status = TaskStatus::Running;
            self.pool[prev].reset_time_slice();
            return;
        }

        self.put_prev(prev);
        self.check_switchable(next);

        let pcb = &mut self.pool[next];
        pcb.status = TaskStatus::Running;
        pcb.reset_time_slice();
        log::trace!(
            "sched: switch pid {} -> pid {}",
            self.pool[prev].pid,
            self.pool[next].pid
        );

        self.switch_to(prev, next);
    }

    /// 从就绪队列选出下一个任务并执行老化
    fn pick_next(&mut self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for slot in self.queues.iter(QueueId::Ready) {
            let better = match best {
                Some(b) => self.pool[slot].temp_priority > self.pool[b].temp_priority,
                None => true,
            };
            if better {
                best = Some(slot);
            }
        }
        let next = best?;
        self.queues.remove(next);

        let Self { pool, queues, .. } = self;
        for slot in queues.iter(QueueId::Ready) {
            pool[slot].temp_priority += 1;
        }
        pool[next].temp_priority = pool[next].priority;
        Some(next)
    }

    /// 按状态处理被换下的 PCB
    fn put_prev(&mut self, prev: usize) {
        let status = self.pool[prev].status;
        match status {
            TaskStatus::Running => {
                self.pool[prev].status = TaskStatus::Ready;
                if prev != IDLE_SLOT {
                    self.queues.enqueue(QueueId::Ready, prev);
                }
            }
            TaskStatus::Zombie => {
                if self.queues.owner(prev).is_none() {
                    self.queues.enqueue(QueueId::Zombie, prev);
                }
            }
            TaskStatus::Exited => self.pending_reclaim = Some(prev),
            TaskStatus::Blocked | TaskStatus::Ready => {}
        }
    }

    /// 切换前检查目标 PCB
    ///
    /// 切换到状态或上下文不正确的 PCB 会破坏运行队列，只能停机
    fn check_switchable(&self, next: usize) {
        let pcb = &self.pool[next];
        if pcb.status != TaskStatus::Ready {
            panic!(
                "sched: fatal: {}: pid {} is {:?}",
                SchedError::Fatal,
                pcb.pid,
                pcb.status
            );
        }
        if !pcb.switch_context.is_initialized() {
            panic!(
                "sched: fatal: {}: pid {} has no saved stack",
                SchedError::Fatal,
                pcb.pid
            );
        }
    }

    /// 上下文切换，唯一修改 `current` 的地方
    fn switch_to(&mut self, prev: usize, next: usize) {
        self.arch.irq_disable();
        self.current = next;

        let prev_ctx = &mut self.pool[prev].switch_context as *mut SwitchContext;
        let next_ctx = &self.pool[next].switch_context as *const SwitchContext;
        // SAFETY: 两个上下文都在 PCB 池中，生命周期与内核相同；中断已关闭
        unsafe { self.arch.switch_to(prev_ctx, next_ctx) };

        // 回到这里时 current 是重新被调度的任务
        self.finish_task_switch();
        let cur = self.current;
        if self.pool[cur].preempt_count.is_preemptible() {
            self.arch.irq_enable();
        }
    }

    /// 切换完成后在新任务一侧回收上一个退出的任务
    ///
    /// 新创建的任务从 trap 返回入口开始运行，不经过 `switch_to` 的后半段，
    /// 所以 trap 入口和下一次调度也会调用。
    pub fn finish_task_switch(&mut self) {
        let Some(slot) = self.pending_reclaim.take() else {
            return;
        };
        debug_assert!(slot != self.current, "sched: fatal: reclaiming the running task");
        self.reclaim(slot);
    }

    // ---- 阻塞与唤醒 ----

    /// 把 RUNNING 或 READY 的 PCB 挂到阻塞队列
    ///
    /// 不会调用调度器；阻塞当前任务时调用者随后必须调用 `do_scheduler`。
    ///
    /// # Panics
    /// `queue` 不是阻塞队列，或者 PCB 不处于可阻塞状态
    pub fn do_block(&mut self, slot: usize, queue: QueueId) {
        assert!(
            queue.is_blocking(),
            "sched: fatal: {:?} is not a blocking queue",
            queue
        );
        let status = self.pool[slot].status;
        assert!(
            matches!(status, TaskStatus::Running | TaskStatus::Ready),
            "sched: fatal: cannot block pid {} in state {:?}",
            self.pool[slot].pid,
            status
        );
        assert!(slot != IDLE_SLOT, "sched: fatal: blocking the idle task");

        self.queues.remove(slot);
        self.pool[slot].status = TaskStatus::Blocked;
        self.queues.enqueue(queue, slot);
        if slot == self.current {
            self.pool[slot].nvcsw += 1;
        }
        log::debug!("sched: pid {} blocked on {:?}", self.pool[slot].pid, queue);
    }

    /// 唤醒一个 BLOCKED 的 PCB，返回是否真的唤醒了
    ///
    /// 对 READY / RUNNING 的 PCB 是空操作，可以重复调用。
    /// 睡眠中被提前唤醒时取消它的定时器。
    pub fn do_unblock(&mut self, slot: usize) -> bool {
        if self.pool[slot].status != TaskStatus::Blocked {
            return false;
        }
        self.cancel_sleep_timer(slot);
        self.queues.remove(slot);
        self.pool[slot].status = TaskStatus::Ready;
        self.queues.enqueue(QueueId::Ready, slot);
        log::debug!("sched: pid {} unblocked", self.pool[slot].pid);
        true
    }

    /// 按 pid 唤醒；pid 已不存在时什么也不做
    pub fn unblock_pid(&mut self, pid: Pid) -> bool {
        match self.find_pid(pid) {
            Some(slot) => self.do_unblock(slot),
            None => false,
        }
    }

    /// 唤醒阻塞队列上的全部 PCB，返回唤醒个数
    pub fn wake_all(&mut self, queue: QueueId) -> usize {
        let mut woken = 0;
        while let Some(slot) = self.queues.first(queue) {
            if !self.do_unblock(slot) {
                self.queues.remove(slot);
            }
            woken += 1;
        }
        woken
    }

    /// 主动让出 CPU
    pub fn do_yield(&mut self) {
        let cur = self.current;
        self.pool[cur].nvcsw += 1;
        self.do_scheduler();
    }

    /// 时钟中断入口
    ///
    /// 先处理到期的定时器，再扣减当前任务的时间片；时间片用完且允许抢占时
    /// 发生一次被动切换。
    pub fn scheduler_tick(&mut self) {
        self.timer_check();

        let cur = self.current;
        if cur == IDLE_SLOT {
            if !self.queues.is_empty(QueueId::Ready) {
                self.do_scheduler();
            }
            return;
        }

        if self.pool[cur].status != TaskStatus::Running || self.pool[cur].tick_time_slice() {
            return;
        }
        if !self.pool[cur].preempt_count.is_preemptible() {
            return;
        }
        if self.queues.is_empty(QueueId::Ready) {
            self.pool[cur].reset_time_slice();
            return;
        }

        self.pool[cur].nivcsw += 1;
        self.do_scheduler();
    }

    // ---- 属性 ----

    /// 设置 CPU 亲和性掩码
    pub fn taskset(&mut self, pid: Pid, mask: u64) -> Result<(), SchedError> {
        if mask == 0 {
            return Err(SchedError::InvalidArgument);
        }
        let slot = self.find_pid(pid).ok_or(SchedError::NotFound)?;
        self.pool[slot].mask = mask;
        log::debug!("sched: pid {} mask {:#x}", pid, mask);
        Ok(())
    }

    pub fn get_affinity(&self, pid: Pid) -> Result<u64, SchedError> {
        let slot = self.find_pid(pid).ok_or(SchedError::NotFound)?;
        Ok(self.pool[slot].mask)
    }

    /// 设置基础优先级，同时重置老化值
    pub fn set_priority(&mut self, pid: Pid, priority: i32) -> Result<(), SchedError> {
        let slot = self.find_pid(pid).ok_or(SchedError::NotFound)?;
        let pcb = &mut self.pool[slot];
        pcb.priority = priority;
        pcb.temp_priority = priority;
        Ok(())
    }

    pub fn getpid(&self) -> Pid {
        self.current().pid
    }

    /// 父进程 pid；父进程是 idle 或已不存在时为 0
    pub fn getppid(&self) -> Pid {
        self.parent_of(self.current)
            .map(|slot| self.pool[slot].pid)
            .unwrap_or(0)
    }

    // ---- 诊断 ----

    /// 所有已分配槽位的快照 (含 idle)
    pub fn process_table(&self) -> impl Iterator<Item = ProcessInfo> + '_ {
        self.pool.allocated_slots().map(move |slot| {
            let pcb = &self.pool[slot];
            ProcessInfo {
                pid: pcb.pid,
                status: pcb.status,
                priority: pcb.priority,
                ppid: self.parent_of(slot).map(|p| self.pool[p].pid).unwrap_or(0),
                mask: pcb.mask,
                task_type: pcb.task_type,
            }
        })
    }

    /// 打印 `ps` 列表
    pub fn do_process_show(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "[PROCESS TABLE]")?;
        for (i, info) in self.process_table().enumerate() {
            writeln!(
                out,
                "[{}] PID : {} PPID : {} STATUS : {} PRIORITY : {} MASK : {:#x}",
                i,
                info.pid,
                info.ppid,
                status_name(info.status),
                info.priority,
                info.mask
            )?;
        }
        Ok(())
    }
}

fn status_name(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Blocked => "BLOCKED",
        TaskStatus::Running => "RUNNING",
        TaskStatus::Ready => "READY",
        TaskStatus::Zombie => "ZOMBIE",
        TaskStatus::Exited => "EXITED",
    }
}
