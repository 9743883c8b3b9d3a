//! PCB 池
//!
//! 固定大小的 PCB 数组，槽位 0 永远是 idle 任务 (pid 0)，不计入容量。
//! 其余槽位在空闲队列和"使用中"之间循环，PCB 从不动态分配。

use core::ops::{Index, IndexMut};

use crate::config::NUM_MAX_TASK;
use crate::errno::SchedError;
use crate::process::pid::{Pid, PidAllocator, PID_IDLE};
use crate::process::task::{Pcb, TaskStatus, TaskType};

use super::queue::{QueueId, Queues};

/// idle 任务所在槽位
pub const IDLE_SLOT: usize = 0;

/// 槽位总数 (包含 idle)
pub const NR_TASK_SLOTS: usize = NUM_MAX_TASK + 1;

pub struct PcbPool {
    pcbs: [Pcb; NR_TASK_SLOTS],
    in_use: [bool; NR_TASK_SLOTS],
    pids: PidAllocator,
}

impl PcbPool {
    /// 创建 PCB 池，并把槽位 1.. 挂到空闲队列上
    ///
    /// idle 任务以 RUNNING 状态占据槽位 0：启动上下文就是 idle。
    pub fn new(queues: &mut Queues) -> Self {
        let mut pool = Self {
            pcbs: core::array::from_fn(|_| Pcb::empty()),
            in_use: [false; NR_TASK_SLOTS],
            pids: PidAllocator::new(),
        };

        let idle = &mut pool.pcbs[IDLE_SLOT];
        idle.init_pcb_default(PID_IDLE, TaskType::KernelProcess, TaskStatus::Ready);
        idle.status = TaskStatus::Running;
        pool.in_use[IDLE_SLOT] = true;

        for slot in 1..NR_TASK_SLOTS {
            queues.enqueue(QueueId::Free, slot);
        }
        pool
    }

    /// 分配一个空闲槽位和新的 pid
    ///
    /// 返回的 PCB 仍是空白状态，由调用者执行 `init_pcb_default`。
    pub fn allocate(&mut self, queues: &mut Queues) -> Result<(usize, Pid), SchedError> {
        let Some(slot) = queues.dequeue(QueueId::Free) else {
            log::warn!("sched: pcb pool exhausted ({} tasks)", NUM_MAX_TASK);
            return Err(SchedError::ResourceExhausted);
        };

        let pcbs = &self.pcbs;
        let in_use = &self.in_use;
        let pid = self
            .pids
            .alloc(|pid| (0..NR_TASK_SLOTS).any(|i| in_use[i] && pcbs[i].pid == pid));
        let Some(pid) = pid else {
            log::warn!("sched: pid space exhausted");
            queues.enqueue(QueueId::Free, slot);
            return Err(SchedError::ResourceExhausted);
        };

        self.in_use[slot] = true;
        self.pcbs[slot].pid = pid;
        Ok((slot, pid))
    }

    /// 把已经 EXITED 的槽位还给空闲队列
    ///
    /// # Panics
    /// 槽位是 idle、未使用、状态不是 EXITED 或者仍有等待者
    pub fn release(&mut self, queues: &mut Queues, slot: usize) {
        assert!(slot != IDLE_SLOT, "sched: fatal: releasing the idle task");
        assert!(self.in_use[slot], "sched: fatal: releasing free slot {}", slot);
        assert!(
            self.pcbs[slot].status == TaskStatus::Exited,
            "sched: fatal: releasing slot {} in state {:?}",
            slot,
            self.pcbs[slot].status
        );
        assert!(
            queues.is_empty(QueueId::WaitList(slot)),
            "sched: fatal: releasing slot {} with waiters",
            slot
        );

        queues.remove(slot);
        self.pcbs[slot] = Pcb::empty();
        self.in_use[slot] = false;
        queues.enqueue(QueueId::Free, slot);
    }

    /// 槽位是否已被分配
    pub fn is_allocated(&self, slot: usize) -> bool {
        self.in_use[slot]
    }

    /// 按 pid 查找已分配的槽位 (包括尚未释放的 EXITED 槽位)
    pub fn find(&self, pid: Pid) -> Option<usize> {
        (0..NR_TASK_SLOTS).find(|&slot| self.in_use[slot] && self.pcbs[slot].pid == pid)
    }

    /// 已分配的槽位，不含 idle
    pub fn live_count(&self) -> usize {
        self.in_use[1..].iter().filter(|&&used| used).count()
    }

    /// 池容量 (最大并发任务数)
    pub const fn capacity(&self) -> usize {
        NUM_MAX_TASK
    }

    /// 已分配的槽位下标
    pub fn allocated_slots(&self) -> impl Iterator<Item = usize> + '_ {
        (0..NR_TASK_SLOTS).filter(move |&slot| self.in_use[slot])
    }
}

impl Index<usize> for PcbPool {
    type Output = Pcb;

    fn index(&self, slot: usize) -> &Pcb {
        &self.pcbs[slot]
    }
}

impl IndexMut<usize> for PcbPool {
    fn index_mut(&mut self, slot: usize) -> &mut Pcb {
        &mut self.pcbs[slot]
    }
}
