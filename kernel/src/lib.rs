//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! rvsched: RISC-V 教学内核的进程调度核心
//!
//! - PCB 池与 PID 分配 (`sched::pool`, `process::pid`)
//! - 就绪队列与阻塞队列 (`sched::queue`)
//! - 调度器与抢占计数 (`sched`)
//! - 进程生命周期：spawn / exit / kill / wait4 / clone / exec (`process`)
//! - 定时器与睡眠 (`time`)
//! - 系统调用分发 (`syscall`)
//!
//! 页表、文件系统和 trap 入口汇编通过 `mm::MemoryManager` 和 `arch::Arch`
//! 接入。宿主机上以 `std` 编译，`tests` 模块在模拟平台上运行全部场景。

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod config;
pub mod errno;
pub mod list;
pub mod logging;
pub mod mm;
pub mod print;
pub mod process;
pub mod sched;
pub mod syscall;
pub mod time;

#[cfg(test)]
mod tests;

pub use errno::{Errno, SchedError};
pub use process::{Pid, SpawnMode, TaskInfo, TaskStatus, TaskType, WaitStatus};
pub use sched::{Kernel, ProcessInfo, QueueId};
