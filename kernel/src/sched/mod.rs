//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! 参考 Linux 内核的调度器结构 (kernel/sched/)，简化为单核、单运行队列：
//! - `pool`: PCB 池，槽位 0 是 idle 任务
//! - `queue`: 就绪队列、各种阻塞队列、空闲槽位队列
//! - `preempt`: 抢占计数
//! - `sched`: 调度入口 do_scheduler() -> switch_to()

pub mod pool;
pub mod preempt;
pub mod queue;
#[allow(clippy::module_inception)]
pub mod sched;

pub use pool::{IDLE_SLOT, NR_TASK_SLOTS};
pub use preempt::PreemptCount;
pub use queue::QueueId;
pub use sched::{Kernel, ProcessInfo};
