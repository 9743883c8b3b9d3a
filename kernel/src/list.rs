//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 双向链表实现
//!
//! 参考 Linux: include/linux/list.h
//!
//! 用途：
//! - 调度队列: 就绪队列、阻塞队列、空闲 PCB 队列
//! - 定时器池: 活动定时器、可用定时器
//!
//! 设计特点：
//! - 侵入式链表：节点 (`ListNode`) 与数据放在同一个固定数组里，按下标对应
//! - 链接用下标而不是指针，节点数组的所有权始终在调用者手里
//! - 入队、出队、从中间删除都是 O(1)

/// 链表节点
///
/// 与数据数组一一对应，`nodes[i]` 是第 `i` 个元素的链接。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListNode {
    /// 下一个节点
    next: Option<usize>,
    /// 前一个节点
    prev: Option<usize>,
    /// 是否挂在某个链表上
    linked: bool,
}

impl ListNode {
    /// 创建一个未链接的节点
    pub const fn new() -> Self {
        Self {
            next: None,
            prev: None,
            linked: false,
        }
    }

    /// 节点是否挂在某个链表上
    pub fn is_linked(&self) -> bool {
        self.linked
    }
}

impl Default for ListNode {
    fn default() -> Self {
        Self::new()
    }
}

/// 链表头
///
/// 只记录首尾下标和长度，节点本身存放在调用者的数组中。
/// 同一个节点数组可以被多个链表头共享，只要每个节点同一时刻只挂在一个链表上。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHead {
    first: Option<usize>,
    last: Option<usize>,
    len: usize,
}

impl ListHead {
    /// 创建空链表
    pub const fn new() -> Self {
        Self {
            first: None,
            last: None,
            len: 0,
        }
    }

    /// 检查链表是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// 链表长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 第一个节点
    pub fn first(&self) -> Option<usize> {
        self.first
    }

    /// 在链表尾部添加节点
    ///
    /// 对应 Linux 的 list_add_tail()
    ///
    /// # Panics
    /// 节点已经挂在某个链表上时 panic（一个节点只能属于一个链表）
    pub fn add_tail(&mut self, nodes: &mut [ListNode], idx: usize) {
        assert!(!nodes[idx].linked, "list: node {} already linked", idx);

        nodes[idx] = ListNode {
            next: None,
            prev: self.last,
            linked: true,
        };
        match self.last {
            Some(last) => nodes[last].next = Some(idx),
            None => self.first = Some(idx),
        }
        self.last = Some(idx);
        self.len += 1;
    }

    /// 从链表中删除节点
    ///
    /// 对应 Linux 的 list_del()
    ///
    /// 调用者必须保证 `idx` 在本链表中；链接状态由节点自身记录。
    pub fn del(&mut self, nodes: &mut [ListNode], idx: usize) {
        assert!(nodes[idx].linked, "list: node {} not linked", idx);

        let ListNode { next, prev, .. } = nodes[idx];
        match prev {
            Some(p) => nodes[p].next = next,
            None => self.first = next,
        }
        match next {
            Some(n) => nodes[n].prev = prev,
            None => self.last = prev,
        }
        nodes[idx] = ListNode::new();
        self.len -= 1;
    }

    /// 取出第一个节点
    pub fn pop_front(&mut self, nodes: &mut [ListNode]) -> Option<usize> {
        let idx = self.first?;
        self.del(nodes, idx);
        Some(idx)
    }

    /// 按链表顺序遍历下标
    pub fn iter<'a>(&self, nodes: &'a [ListNode]) -> Iter<'a> {
        Iter {
            nodes,
            cursor: self.first,
            remaining: self.len,
        }
    }
}

impl Default for ListHead {
    fn default() -> Self {
        Self::new()
    }
}

/// 链表迭代器
pub struct Iter<'a> {
    nodes: &'a [ListNode],
    cursor: Option<usize>,
    remaining: usize,
}

impl<'a> Iterator for Iter<'a> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        // remaining 限制遍历次数，链接损坏时不会死循环
        if self.remaining == 0 {
            return None;
        }
        let idx = self.cursor?;
        self.cursor = self.nodes[idx].next;
        self.remaining -= 1;
        Some(idx)
    }
}
