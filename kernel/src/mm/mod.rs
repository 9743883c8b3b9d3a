//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内存管理接口
//!
//! 页表、页分配和跨地址空间拷贝由内存管理子系统实现，调度核心只通过
//! `MemoryManager` trait 使用它们：
//! - 分配/释放页目录 (spawn、clone、exec、回收)
//! - 分配内核栈和用户栈
//! - 向用户地址空间拷贝数据 (clone 的 tid、wait4 的 status、exec 的 argv)
//! - 加载可执行映像 (exec)

use crate::config::PAGE_SIZE;

/// Sv39 分页模式 (satp.MODE = 8)
pub const SATP_MODE_SV39: u64 = 8 << 60;

/// 已加载的可执行映像
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedImage {
    /// 入口地址
    pub entry: usize,
    /// 数据段末尾 (brk 起点)
    pub edata: usize,
}

/// 调度核心使用的内存管理接口
pub trait MemoryManager {
    /// 内核页目录，内核任务共享
    fn kernel_page_dir(&self) -> usize;

    /// 为用户进程分配新的页目录 (已映射内核部分)
    fn alloc_page_dir(&mut self) -> Option<usize>;

    /// 复制父进程的地址空间 (fork 语义)
    fn fork_page_dir(&mut self, parent: usize) -> Option<usize>;

    /// 释放页目录及其映射的全部用户页
    fn free_page_dir(&mut self, pgdir: usize);

    /// 分配内核栈，返回栈顶
    fn alloc_kernel_stack(&mut self) -> Option<usize>;

    /// 释放内核栈
    fn free_kernel_stack(&mut self, stack_top: usize);

    /// 在 `pgdir` 中映射用户栈，返回用户栈顶的虚拟地址；随页目录一起释放
    fn alloc_user_stack(&mut self, pgdir: usize) -> Option<usize>;

    /// 把 `src` 拷贝到 `pgdir` 地址空间的 `dst`
    fn copy_to_user(&mut self, pgdir: usize, dst: usize, src: &[u8]) -> bool;

    /// 从 `pgdir` 地址空间的 `src` 读取 `dst.len()` 字节
    fn copy_from_user(&mut self, pgdir: usize, src: usize, dst: &mut [u8]) -> bool;

    /// 把名为 `name` 的程序加载进 `pgdir`
    fn load_program(&mut self, pgdir: usize, name: &str) -> Option<LoadedImage>;

    /// 页目录对应的 satp 值
    fn satp(&self, pgdir: usize) -> u64 {
        SATP_MODE_SV39 | (pgdir / PAGE_SIZE) as u64
    }
}
