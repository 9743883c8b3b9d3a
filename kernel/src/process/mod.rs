//! 进程管理模块
//!
//! 遵循 Linux 内核的进程模型：
//! - `task`: 进程控制块 (task_struct)
//! - `pid`: PID 分配 (kernel/pid.c)
//! - `fork`: spawn / clone / exec (kernel/fork.c, fs/exec.c)
//! - `exit`: exit / kill (kernel/exit.c)
//! - `wait`: wait4 (kernel/exit.c do_wait)

pub mod exit;
pub mod fork;
pub mod pid;
pub mod task;
pub mod wait;

pub use fork::CloneFlags;
pub use pid::Pid;
pub use task::{Pcb, SpawnMode, TaskInfo, TaskStatus, TaskType, DEFAULT_MODE};
pub use wait::{WaitStatus, WCONTINUED, WNOHANG, WUNTRACED};
