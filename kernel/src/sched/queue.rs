//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 调度队列
//!
//! 所有队列共享同一个节点数组 (`nodes[slot]` 是槽位 `slot` 的链接)，
//! 另有一张 `owner` 表记录每个槽位当前挂在哪个队列上：
//! - 入队前必须不在任何队列中
//! - 移动 = 从原队列摘下 + 挂到目标队列尾部，均为 O(1)
//!
//! 队列本身不关心策略，阻塞的原因由调用者通过 `QueueId` 指定。

use crate::list::{Iter, ListHead, ListNode};

use super::pool::NR_TASK_SLOTS;

/// 队列标识
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueId {
    /// 空闲槽位
    Free,
    /// 就绪队列
    Ready,
    /// 睡眠 (sleep / nanosleep)
    Sleep,
    /// 等待文件 I/O
    FileOp,
    /// wait4(-1) 等待任意子进程
    WaitChild,
    /// 已退出、等待回收的僵尸进程
    Zombie,
    /// 等待槽位 `n` 上的进程退出
    WaitList(usize),
}

impl QueueId {
    /// 是否是阻塞队列 (只有 BLOCKED 状态的 PCB 可以挂在上面)
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            QueueId::Sleep | QueueId::FileOp | QueueId::WaitChild | QueueId::WaitList(_)
        )
    }
}

/// 全部调度队列
pub struct Queues {
    nodes: [ListNode; NR_TASK_SLOTS],
    owner: [Option<QueueId>; NR_TASK_SLOTS],
    free: ListHead,
    ready: ListHead,
    sleep: ListHead,
    file_op: ListHead,
    wait_child: ListHead,
    zombie: ListHead,
    wait_lists: [ListHead; NR_TASK_SLOTS],
}

impl Queues {
    pub const fn new() -> Self {
        Self {
            nodes: [ListNode::new(); NR_TASK_SLOTS],
            owner: [None; NR_TASK_SLOTS],
            free: ListHead::new(),
            ready: ListHead::new(),
            sleep: ListHead::new(),
            file_op: ListHead::new(),
            wait_child: ListHead::new(),
            zombie: ListHead::new(),
            wait_lists: [ListHead::new(); NR_TASK_SLOTS],
        }
    }

    fn head(&self, id: QueueId) -> &ListHead {
        match id {
            QueueId::Free => &self.free,
            QueueId::Ready => &self.ready,
            QueueId::Sleep => &self.sleep,
            QueueId::FileOp => &self.file_op,
            QueueId::WaitChild => &self.wait_child,
            QueueId::Zombie => &self.zombie,
            QueueId::WaitList(n) => &self.wait_lists[n],
        }
    }

    /// 同时借出链表头和节点数组
    fn split(&mut self, id: QueueId) -> (&mut ListHead, &mut [ListNode]) {
        let Self {
            nodes,
            free,
            ready,
            sleep,
            file_op,
            wait_child,
            zombie,
            wait_lists,
            ..
        } = self;
        let head = match id {
            QueueId::Free => free,
            QueueId::Ready => ready,
            QueueId::Sleep => sleep,
            QueueId::FileOp => file_op,
            QueueId::WaitChild => wait_child,
            QueueId::Zombie => zombie,
            QueueId::WaitList(n) => &mut wait_lists[n],
        };
        (head, &mut nodes[..])
    }

    /// 挂到队列尾部
    ///
    /// # Panics
    /// 槽位已经在某个队列上
    pub fn enqueue(&mut self, id: QueueId, slot: usize) {
        if let Some(cur) = self.owner[slot] {
            panic!("sched: fatal: slot {} already queued on {:?}", slot, cur);
        }
        let (head, nodes) = self.split(id);
        head.add_tail(nodes, slot);
        self.owner[slot] = Some(id);
    }

    /// 从所在队列摘下，返回原来的队列
    pub fn remove(&mut self, slot: usize) -> Option<QueueId> {
        let id = self.owner[slot]?;
        let (head, nodes) = self.split(id);
        head.del(nodes, slot);
        self.owner[slot] = None;
        Some(id)
    }

    /// 移动到另一个队列的尾部
    pub fn move_to(&mut self, slot: usize, id: QueueId) {
        self.remove(slot);
        self.enqueue(id, slot);
    }

    /// 取出队首
    pub fn dequeue(&mut self, id: QueueId) -> Option<usize> {
        let (head, nodes) = self.split(id);
        let slot = head.pop_front(nodes)?;
        self.owner[slot] = None;
        Some(slot)
    }

    pub fn first(&self, id: QueueId) -> Option<usize> {
        self.head(id).first()
    }

    /// 槽位所在的队列
    pub fn owner(&self, slot: usize) -> Option<QueueId> {
        self.owner[slot]
    }

    pub fn len(&self, id: QueueId) -> usize {
        self.head(id).len()
    }

    pub fn is_empty(&self, id: QueueId) -> bool {
        self.head(id).is_empty()
    }

    /// 按 FIFO 顺序遍历
    pub fn iter(&self, id: QueueId) -> Iter<'_> {
        self.head(id).iter(&self.nodes)
    }

    pub fn contains(&self, id: QueueId, slot: usize) -> bool {
        self.owner[slot] == Some(id)
    }
}

impl Default for Queues {
    fn default() -> Self {
        Self::new()
    }
}
