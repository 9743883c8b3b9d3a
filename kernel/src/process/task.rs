//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程控制块 (Process Control Block)
//!
//! 关键设计要点：
//! 1. PCB 只存在于固定大小的 PCB 池中，"销毁"就是槽位回收
//! 2. 前三个字段 (kernel_sp, user_sp, preempt_count) 的偏移量由 trap 汇编使用
//! 3. 父进程引用是弱引用：槽位下标 + pid，每次解引用前检查存活

use core::mem::offset_of;

use crate::arch::context::{reg, Reg, SwitchContext, TrapContext};
use crate::config::{DEFAULT_PRIORITY, KERNEL_STACK_SIZE, NUM_FD, TIME_SLICE_TICKS, USER_STACK_SIZE};
use crate::sched::preempt::PreemptCount;

use super::pid::Pid;

/// 进程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum TaskStatus {
    /// 在某个阻塞队列中等待
    Blocked = 0,
    /// 正在 CPU 上运行 (全局唯一)
    Running = 1,
    /// 在就绪队列中
    Ready = 2,
    /// 已退出，退出码等待父进程回收
    Zombie = 3,
    /// 终止状态，槽位可回收
    Exited = 4,
}

/// 退出时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnMode {
    /// 退出后保持僵尸状态，直到父进程 wait
    EnterZombieOnExit,
    /// 没有等待者时退出即回收
    AutoCleanupOnExit,
}

/// 默认 spawn 模式
pub const DEFAULT_MODE: SpawnMode = SpawnMode::AutoCleanupOnExit;

/// 任务类型：内核/用户 × 进程/线程
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskType {
    KernelProcess,
    KernelThread,
    UserProcess,
    UserThread,
}

impl TaskType {
    pub fn is_user(self) -> bool {
        matches!(self, TaskType::UserProcess | TaskType::UserThread)
    }

    pub fn is_thread(self) -> bool {
        matches!(self, TaskType::KernelThread | TaskType::UserThread)
    }

    /// 同特权级的线程类型
    pub fn as_thread(self) -> Self {
        if self.is_user() {
            TaskType::UserThread
        } else {
            TaskType::KernelThread
        }
    }

    /// 同特权级的进程类型
    pub fn as_process(self) -> Self {
        if self.is_user() {
            TaskType::UserProcess
        } else {
            TaskType::KernelProcess
        }
    }
}

/// 创建任务所需的信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskInfo {
    pub entry_point: usize,
    pub task_type: TaskType,
}

/// 父进程弱引用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink {
    /// 父进程所在的槽位
    pub slot: usize,
    /// 父进程 pid，用于检查槽位是否已被复用
    pub pid: Pid,
    /// 是否经过重新指定父进程
    pub reparented: bool,
}

/// 文件描述符表项的不透明存储
///
/// 文件系统层负责解释内容，调度核心只在 spawn/clone/exit 时拷贝或清空
pub const FD_ENTRY_WORDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdEntry {
    pub used: bool,
    pub raw: [u64; FD_ENTRY_WORDS],
}

impl FdEntry {
    pub const EMPTY: FdEntry = FdEntry {
        used: false,
        raw: [0; FD_ENTRY_WORDS],
    };
}

/// 嵌入 PCB 的文件描述符表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdTable {
    pub entries: [FdEntry; NUM_FD],
}

impl FdTable {
    pub const fn new() -> Self {
        Self {
            entries: [FdEntry::EMPTY; NUM_FD],
        }
    }

    pub fn clear(&mut self) {
        self.entries = [FdEntry::EMPTY; NUM_FD];
    }

    pub fn used_count(&self) -> usize {
        self.entries.iter().filter(|e| e.used).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

/// 进程控制块
#[repr(C)]
#[derive(Debug, Clone)]
pub struct Pcb {
    // ---- trap 汇编依赖以下三个字段的顺序 ----
    /// 内核栈指针
    pub kernel_sp: usize,
    /// 用户栈指针
    pub user_sp: usize,
    /// 抢占关闭嵌套计数，为 0 时才重新开中断
    pub preempt_count: PreemptCount,

    /// 栈底地址
    pub kernel_stack_base: usize,
    pub user_stack_base: usize,

    /// trap 入口保存的寄存器
    pub trap_context: TrapContext,
    /// switch_to 保存的寄存器
    pub switch_context: SwitchContext,

    pub pid: Pid,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub mode: SpawnMode,
    /// 该进程创建过的子任务数
    pub spawn_num: u32,

    pub priority: i32,
    /// 老化后的临时优先级
    pub temp_priority: i32,
    /// CPU 亲和性掩码 (仅作提示)
    pub mask: u64,

    /// 页目录 (内核虚拟地址)
    pub pgdir: usize,
    /// 页目录与其他任务共享 (CLONE_VM)，回收时不释放
    pub shares_pgdir: bool,

    pub time_start: u64,
    pub parent: Option<ParentLink>,
    pub exit_status: i32,
    /// kill 标记，在下一个调度点生效
    pub killed: bool,
    /// 睡眠定时器在定时器池中的下标，提前唤醒或终止时取消
    pub sleep_timer: Option<usize>,

    /// 系统态 / 用户态时间 (滴答)
    pub stime: u64,
    pub utime: u64,
    /// 已回收子进程累计的时间
    pub cstime: u64,
    pub cutime: u64,
    /// 主动 / 被动切换次数
    pub nvcsw: u64,
    pub nivcsw: u64,
    /// 剩余时间片
    pub slice_left: u32,

    /// CLONE_CHILD_CLEARTID 地址，退出时清零
    pub clear_child_tid: usize,

    pub fd: FdTable,

    /// 数据段末尾
    pub edata: usize,
}

/// trap 汇编使用的偏移量
pub const PCB_KERNEL_SP: usize = offset_of!(Pcb, kernel_sp);
pub const PCB_USER_SP: usize = offset_of!(Pcb, user_sp);
pub const PCB_PREEMPT_COUNT: usize = offset_of!(Pcb, preempt_count);
pub const PCB_TRAP_CONTEXT: usize = offset_of!(Pcb, trap_context);

const _: () = {
    assert!(PCB_KERNEL_SP == 0);
    assert!(PCB_USER_SP == 8);
    assert!(PCB_PREEMPT_COUNT == 16);
};

impl Pcb {
    /// 空槽位
    pub const fn empty() -> Self {
        Self {
            kernel_sp: 0,
            user_sp: 0,
            preempt_count: PreemptCount::new(),
            kernel_stack_base: 0,
            user_stack_base: 0,
            trap_context: TrapContext::zeroed(),
            switch_context: SwitchContext::zeroed(),
            pid: 0,
            task_type: TaskType::KernelProcess,
            status: TaskStatus::Exited,
            mode: DEFAULT_MODE,
            spawn_num: 0,
            priority: DEFAULT_PRIORITY,
            temp_priority: DEFAULT_PRIORITY,
            mask: 0,
            pgdir: 0,
            shares_pgdir: false,
            time_start: 0,
            parent: None,
            exit_status: 0,
            killed: false,
            sleep_timer: None,
            stime: 0,
            utime: 0,
            cstime: 0,
            cutime: 0,
            nvcsw: 0,
            nivcsw: 0,
            slice_left: TIME_SLICE_TICKS,
            clear_child_tid: 0,
            fd: FdTable::new(),
            edata: 0,
        }
    }

    /// 把调度和计时相关字段恢复为默认值
    ///
    /// `status` 只能是 Ready 或 Blocked，槽位不会处于含糊的中间状态
    pub fn init_pcb_default(&mut self, pid: Pid, task_type: TaskType, status: TaskStatus) {
        assert!(
            matches!(status, TaskStatus::Ready | TaskStatus::Blocked),
            "sched: fatal: init_pcb_default with status {:?}",
            status
        );
        *self = Self::empty();
        self.pid = pid;
        self.task_type = task_type;
        self.status = status;
        self.mask = u64::MAX;
    }

    /// 设置栈底 (栈向下增长，base = top - size)
    pub fn set_stack_base(&mut self, kernel_stack_top: usize, user_stack_top: usize) {
        self.kernel_stack_base = kernel_stack_top - KERNEL_STACK_SIZE;
        self.user_stack_base = if user_stack_top != 0 {
            user_stack_top - USER_STACK_SIZE
        } else {
            0
        };
    }

    pub fn kernel_stack_top(&self) -> usize {
        self.kernel_stack_base + KERNEL_STACK_SIZE
    }

    /// 初始化新任务的栈和寄存器上下文
    ///
    /// - trap 上下文：sepc = 入口，sp = 用户栈顶 (内核任务用内核栈顶)，a0 = arg
    /// - switch 上下文：ra = trap 返回入口，sp = 内核栈顶
    #[allow(clippy::too_many_arguments)]
    pub fn init_pcb_stack(
        &mut self,
        pgdir: usize,
        satp: u64,
        kernel_stack_top: usize,
        user_stack_top: usize,
        entry_point: usize,
        arg: usize,
        trap_return: usize,
        global_pointer: usize,
    ) {
        let user = self.task_type.is_user();
        self.pgdir = pgdir;
        self.set_stack_base(kernel_stack_top, user_stack_top);
        self.kernel_sp = kernel_stack_top;
        self.user_sp = if user { user_stack_top } else { kernel_stack_top };

        self.trap_context =
            TrapContext::new_task(entry_point as Reg, self.user_sp as Reg, user, satp);
        self.trap_context.regs[reg::A0] = arg as Reg;
        if !user {
            self.trap_context.regs[reg::GP] = global_pointer as Reg;
        }

        self.switch_context = SwitchContext::zeroed();
        self.switch_context.ra = trap_return as Reg;
        self.switch_context.sp = kernel_stack_top as Reg;
    }

    /// 父进程的 pid，没有父进程时为 0
    pub fn ppid(&self) -> Pid {
        self.parent.map(|p| p.pid).unwrap_or(0)
    }

    /// 时间片递减，返回是否还有剩余
    pub fn tick_time_slice(&mut self) -> bool {
        self.slice_left = self.slice_left.saturating_sub(1);
        self.slice_left > 0
    }

    pub fn reset_time_slice(&mut self) {
        self.slice_left = TIME_SLICE_TICKS;
    }
}

impl Default for Pcb {
    fn default() -> Self {
        Self::empty()
    }
}

/// wait4 返回给用户的状态字
///
/// 对应 WEXITSTATUS：退出码放在第 8-15 位
pub fn encode_wait_status(exit_status: i32) -> u16 {
    ((exit_status << 8) & 0xff00) as u16
}
