//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 定时器池
//!
//! 固定数量的定时器槽位，分成两条链表：
//! - active: 已设置截止时间、等待触发
//! - available: 空闲
//!
//! 每个时钟中断线性扫描 active 链表。池很小，O(n) 扫描足够。
//!
//! 回调在时钟中断上下文中同步执行 (抢占已关闭)，不得阻塞。

use crate::config::NUM_TIMER;
use crate::errno::SchedError;
use crate::list::{ListHead, ListNode};

/// 定时器回调：`fn(context, param)`
pub type TimerCallback<C> = fn(&mut C, usize);

struct Timer<C> {
    /// 绝对截止滴答
    timeout: u64,
    callback: Option<TimerCallback<C>>,
    param: usize,
}

// derive 会给 C 加上 Copy 约束，这里只复制函数指针
impl<C> Clone for Timer<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Timer<C> {}

impl<C> Timer<C> {
    const EMPTY: Self = Self {
        timeout: 0,
        callback: None,
        param: 0,
    };
}

/// 一次扫描中到期的定时器 (按截止时间排序)
pub struct Expired<C> {
    entries: [(u64, Option<TimerCallback<C>>, usize); NUM_TIMER],
    len: usize,
}

impl<C> Expired<C> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// `(截止时间, 回调, 参数)`
    pub fn iter(&self) -> impl Iterator<Item = (u64, TimerCallback<C>, usize)> + '_ {
        self.entries[..self.len]
            .iter()
            .filter_map(|&(timeout, cb, param)| cb.map(|cb| (timeout, cb, param)))
    }
}

pub struct TimerWheel<C> {
    timers: [Timer<C>; NUM_TIMER],
    nodes: [ListNode; NUM_TIMER],
    active: ListHead,
    available: ListHead,
}

impl<C> TimerWheel<C> {
    pub fn new() -> Self {
        let mut wheel = Self {
            timers: [Timer::EMPTY; NUM_TIMER],
            nodes: [ListNode::new(); NUM_TIMER],
            active: ListHead::new(),
            available: ListHead::new(),
        };
        for idx in 0..NUM_TIMER {
            wheel.available.add_tail(&mut wheel.nodes, idx);
        }
        wheel
    }

    /// 在绝对时间 `deadline` 设置一个定时器
    ///
    /// 池已满时返回 `ResourceExhausted`
    pub fn create(
        &mut self,
        callback: TimerCallback<C>,
        param: usize,
        deadline: u64,
    ) -> Result<usize, SchedError> {
        let Some(idx) = self.available.pop_front(&mut self.nodes) else {
            log::warn!("timer: pool exhausted ({} timers)", NUM_TIMER);
            return Err(SchedError::ResourceExhausted);
        };
        self.timers[idx] = Timer {
            timeout: deadline,
            callback: Some(callback),
            param,
        };
        self.active.add_tail(&mut self.nodes, idx);
        Ok(idx)
    }

    /// 取消一个还没触发的定时器，槽位回到空闲池
    ///
    /// 定时器已经触发或已经取消时返回 false
    pub fn cancel(&mut self, idx: usize) -> bool {
        if idx >= NUM_TIMER || self.timers[idx].callback.is_none() {
            return false;
        }
        self.active.del(&mut self.nodes, idx);
        self.available.add_tail(&mut self.nodes, idx);
        self.timers[idx] = Timer::EMPTY;
        true
    }

    /// 取出所有 `timeout < now` 的定时器并放回空闲池
    ///
    /// 返回值按截止时间升序排列，截止时间相同的保持设置顺序。
    pub fn expire(&mut self, now: u64) -> Expired<C> {
        let mut out = Expired {
            entries: [(0, None, 0); NUM_TIMER],
            len: 0,
        };

        let mut active = [0usize; NUM_TIMER];
        let mut count = 0;
        for idx in self.active.iter(&self.nodes) {
            active[count] = idx;
            count += 1;
        }

        for &idx in &active[..count] {
            let timer = self.timers[idx];
            if timer.timeout < now {
                self.active.del(&mut self.nodes, idx);
                self.available.add_tail(&mut self.nodes, idx);
                self.timers[idx] = Timer::EMPTY;
                out.entries[out.len] = (timer.timeout, timer.callback, timer.param);
                out.len += 1;
            }
        }

        // 稳定的插入排序
        for i in 1..out.len {
            let mut j = i;
            while j > 0 && out.entries[j - 1].0 > out.entries[j].0 {
                out.entries.swap(j - 1, j);
                j -= 1;
            }
        }
        out
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn available_count(&self) -> usize {
        self.available.len()
    }

    /// 最早的截止时间
    pub fn next_deadline(&self) -> Option<u64> {
        self.active
            .iter(&self.nodes)
            .map(|idx| self.timers[idx].timeout)
            .min()
    }
}

impl<C> Default for TimerWheel<C> {
    fn default() -> Self {
        Self::new()
    }
}
