//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 进程创建：spawn / clone / exec
//!
//! 参考 Linux kernel/fork.c 与 fs/exec.c
//!
//! clone 流程:
//! 1. 检查标志组合
//! 2. 从 PCB 池分配槽位 (copy_process)
//! 3. 准备地址空间：共享 (CLONE_VM) 或复制 (copy_mm)
//! 4. 复制 trap 上下文，子进程 a0 = 0 (copy_thread)
//! 5. 复制文件描述符表 (copy_files)
//! 6. 写回 tid，加入就绪队列 (wake_up_new_task)

use bitflags::bitflags;

use crate::arch::context::{reg, Reg};
use crate::arch::{Arch, TrapContext};
use crate::config::USER_STACK_SIZE;
use crate::errno::SchedError;
use crate::mm::MemoryManager;
use crate::process::pid::Pid;
use crate::process::task::{ParentLink, SpawnMode, TaskInfo, TaskStatus, TaskType};
use crate::sched::{Kernel, QueueId, IDLE_SLOT};

bitflags! {
    /// CLONE_* 标志 (include/uapi/linux/sched.h)
    ///
    /// 低 8 位是子进程退出时发给父进程的信号，单独处理
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CloneFlags: usize {
        const VM             = 0x0000_0100;
        const FS             = 0x0000_0200;
        const FILES          = 0x0000_0400;
        const SIGHAND        = 0x0000_0800;
        const THREAD         = 0x0001_0000;
        const SETTLS         = 0x0008_0000;
        const PARENT_SETTID  = 0x0010_0000;
        const CHILD_CLEARTID = 0x0020_0000;
        const CHILD_SETTID   = 0x0100_0000;
    }
}

/// 退出信号掩码
pub const CSIGNAL: usize = 0xff;

/// 最大信号编号
const NSIG: usize = 64;

/// exec 参数个数上限
pub const EXEC_MAX_ARGS: usize = 16;

/// 单个 exec 参数的最大长度 (含结尾的 0)
pub const EXEC_MAX_ARG_LEN: usize = 128;

/// 新任务地址空间的来源
#[derive(Debug, Clone, Copy)]
enum AddressSpace {
    /// 内核页目录，没有用户栈
    Kernel,
    /// 新的用户页目录和用户栈
    Fresh,
    /// 复制父进程的页目录 (用户栈随之复制)
    Fork(usize),
    /// 与父进程共享页目录
    Shared(usize),
}

/// 新任务的内存：(页目录, 内核栈顶, 用户栈顶)
struct TaskMemory {
    pgdir: usize,
    kernel_stack_top: usize,
    user_stack_top: usize,
}

impl<A: Arch, M: MemoryManager> Kernel<A, M> {
    /// 创建新任务，父进程是调用者
    ///
    /// idle 创建的任务没有父进程
    pub fn spawn(
        &mut self,
        info: &TaskInfo,
        arg: usize,
        mode: SpawnMode,
    ) -> Result<Pid, SchedError> {
        let space = if info.task_type.is_user() {
            AddressSpace::Fresh
        } else {
            AddressSpace::Kernel
        };

        self.disable_preempt();
        let ret = self.alloc_task(info.task_type, space);
        let (slot, mem) = match ret {
            Ok(v) => v,
            Err(e) => {
                self.enable_preempt();
                return Err(e);
            }
        };

        let parent = self.current_slot();
        let parent_link = self.link_to(parent);
        let now = self.get_ticks();
        let satp = self.mm.satp(mem.pgdir);
        let trap_return = self.arch.trap_return_entry();
        let gp = self.arch.global_pointer();

        let pcb = self.pcb_mut(slot);
        pcb.mode = mode;
        pcb.parent = parent_link;
        pcb.time_start = now;
        pcb.init_pcb_stack(
            mem.pgdir,
            satp,
            mem.kernel_stack_top,
            mem.user_stack_top,
            info.entry_point,
            arg,
            trap_return,
            gp,
        );
        let pid = pcb.pid;

        self.pcb_mut(parent).spawn_num += 1;
        self.queues.enqueue(QueueId::Ready, slot);
        self.enable_preempt();

        log::debug!(
            "sched: spawn pid {} ({:?}) entry {:#x}",
            pid,
            info.task_type,
            info.entry_point
        );
        Ok(pid)
    }

    /// clone 系统调用
    ///
    /// 子进程从父进程的 trap 上下文继续执行，返回值为 0
    pub fn do_clone(
        &mut self,
        flags: usize,
        stack: usize,
        ptid: usize,
        tls: usize,
        ctid: usize,
    ) -> Result<Pid, SchedError> {
        let exit_signal = flags & CSIGNAL;
        let flags = CloneFlags::from_bits(flags & !CSIGNAL).ok_or(SchedError::InvalidArgument)?;
        if exit_signal > NSIG {
            return Err(SchedError::InvalidArgument);
        }
        if flags.contains(CloneFlags::THREAD) && !flags.contains(CloneFlags::SIGHAND) {
            return Err(SchedError::InvalidArgument);
        }
        if flags.contains(CloneFlags::SIGHAND) && !flags.contains(CloneFlags::VM) {
            return Err(SchedError::InvalidArgument);
        }

        let parent = self.current_slot();
        let parent_pcb = self.pcb(parent);
        let parent_type = parent_pcb.task_type;
        let parent_pgdir = parent_pcb.pgdir;
        let child_type = if flags.contains(CloneFlags::THREAD) {
            parent_type.as_thread()
        } else {
            parent_type.as_process()
        };
        let space = if flags.contains(CloneFlags::VM) {
            AddressSpace::Shared(parent_pgdir)
        } else if parent_type.is_user() {
            AddressSpace::Fork(parent_pgdir)
        } else {
            AddressSpace::Kernel
        };

        self.disable_preempt();
        let (slot, mem) = match self.alloc_task(child_type, space) {
            Ok(v) => v,
            Err(e) => {
                self.enable_preempt();
                return Err(e);
            }
        };

        let parent_link = self.link_to(parent);
        let now = self.get_ticks();
        let satp = self.mm.satp(mem.pgdir);
        let trap_return = self.arch.trap_return_entry();
        let src = self.pcb(parent).clone();

        let child = self.pcb_mut(slot);
        let pid = child.pid;
        child.mode = if flags.contains(CloneFlags::THREAD) {
            SpawnMode::AutoCleanupOnExit
        } else {
            SpawnMode::EnterZombieOnExit
        };
        child.parent = parent_link;
        child.time_start = now;
        child.priority = src.priority;
        child.temp_priority = src.priority;
        child.mask = src.mask;
        child.fd = src.fd;
        child.edata = src.edata;
        child.pgdir = mem.pgdir;
        child.shares_pgdir = flags.contains(CloneFlags::VM);

        // copy_stack: 内核栈是新的，用户栈沿用父进程 (或调用者指定的栈)
        child.kernel_sp = mem.kernel_stack_top;
        child.user_stack_base = src.user_stack_base;
        child.user_sp = if stack != 0 { stack } else { src.user_sp };

        // sepc 已经由系统调用入口越过 ecall
        child.trap_context = src.trap_context;
        child.trap_context.regs[reg::A0] = 0;
        if stack != 0 {
            child.trap_context.regs[reg::SP] = stack as Reg;
        }
        if flags.contains(CloneFlags::SETTLS) {
            child.trap_context.regs[reg::TP] = tls as Reg;
        }
        child.trap_context.satp = satp;

        child.switch_context.ra = trap_return as Reg;
        child.switch_context.sp = mem.kernel_stack_top as Reg;

        if flags.contains(CloneFlags::CHILD_CLEARTID) {
            child.clear_child_tid = ctid;
        }

        let pid_bytes = pid.to_ne_bytes();
        let mut tid_ok = true;
        if flags.contains(CloneFlags::PARENT_SETTID) {
            tid_ok &= self.mm.copy_to_user(parent_pgdir, ptid, &pid_bytes);
        }
        if flags.contains(CloneFlags::CHILD_SETTID) {
            tid_ok &= self.mm.copy_to_user(mem.pgdir, ctid, &pid_bytes);
        }
        if !tid_ok {
            self.pcb_mut(slot).status = TaskStatus::Exited;
            self.reclaim(slot);
            self.enable_preempt();
            return Err(SchedError::BadAddress);
        }

        self.pcb_mut(parent).spawn_num += 1;
        self.queues.enqueue(QueueId::Ready, slot);
        self.enable_preempt();

        log::debug!(
            "sched: clone pid {} -> pid {} flags {:?} signal {}",
            src.pid,
            pid,
            flags,
            exit_signal
        );
        Ok(pid)
    }

    /// 用新程序替换当前任务的地址空间，返回 argc
    ///
    /// 用户栈布局 (从高到低): 参数字符串, 对齐, argv[0..argc], NULL
    pub fn do_exec(&mut self, name: &str, argv: &[&str]) -> Result<usize, SchedError> {
        if argv.len() > EXEC_MAX_ARGS || argv.iter().any(|a| a.len() >= EXEC_MAX_ARG_LEN) {
            return Err(SchedError::InvalidArgument);
        }

        let pgdir = self.mm.alloc_page_dir().ok_or(SchedError::ResourceExhausted)?;
        let Some(image) = self.mm.load_program(pgdir, name) else {
            self.mm.free_page_dir(pgdir);
            log::debug!("sched: exec {}: no such program", name);
            return Err(SchedError::NotFound);
        };
        let Some(user_stack_top) = self.mm.alloc_user_stack(pgdir) else {
            self.mm.free_page_dir(pgdir);
            return Err(SchedError::ResourceExhausted);
        };

        let (sp, argv_ptr) = match self.push_args(pgdir, user_stack_top, argv) {
            Some(v) => v,
            None => {
                self.mm.free_page_dir(pgdir);
                return Err(SchedError::BadAddress);
            }
        };

        // 已经不会失败，替换地址空间
        let cur = self.current_slot();
        self.disable_preempt();
        self.release_page_dir(cur);
        let satp = self.mm.satp(pgdir);
        let pcb = self.pcb_mut(cur);
        pcb.pgdir = pgdir;
        pcb.shares_pgdir = false;
        pcb.task_type = TaskType::UserProcess;
        pcb.edata = image.edata;
        pcb.user_stack_base = user_stack_top - USER_STACK_SIZE;
        pcb.user_sp = sp;
        pcb.clear_child_tid = 0;
        pcb.trap_context = TrapContext::new_task(image.entry as Reg, sp as Reg, true, satp);
        pcb.trap_context.regs[reg::A0] = argv.len() as Reg;
        pcb.trap_context.regs[reg::A1] = argv_ptr as Reg;
        self.enable_preempt();

        log::debug!(
            "sched: pid {} exec {} entry {:#x} argc {}",
            self.pcb(cur).pid,
            name,
            image.entry,
            argv.len()
        );
        Ok(argv.len())
    }

    /// 把参数压到新用户栈上，返回 (sp, argv 指针)
    fn push_args(&mut self, pgdir: usize, top: usize, argv: &[&str]) -> Option<(usize, usize)> {
        let mut sp = top;
        let mut ptrs = [0usize; EXEC_MAX_ARGS + 1];

        for (i, arg) in argv.iter().enumerate() {
            sp -= arg.len() + 1;
            if !self.mm.copy_to_user(pgdir, sp, arg.as_bytes())
                || !self.mm.copy_to_user(pgdir, sp + arg.len(), &[0])
            {
                return None;
            }
            ptrs[i] = sp;
        }

        let argc = argv.len();
        let mut table = [0u8; (EXEC_MAX_ARGS + 1) * 8];
        for (i, ptr) in ptrs[..=argc].iter().enumerate() {
            table[i * 8..i * 8 + 8].copy_from_slice(&(*ptr as u64).to_ne_bytes());
        }
        sp &= !7;
        sp -= (argc + 1) * 8;
        if !self.mm.copy_to_user(pgdir, sp, &table[..(argc + 1) * 8]) {
            return None;
        }
        let argv_ptr = sp;
        sp &= !0xf;
        Some((sp, argv_ptr))
    }

    /// 调用者作为父进程的弱引用；idle 不作为父进程
    fn link_to(&self, parent: usize) -> Option<ParentLink> {
        (parent != IDLE_SLOT).then(|| ParentLink {
            slot: parent,
            pid: self.pcb(parent).pid,
            reparented: false,
        })
    }

    /// 分配槽位、页目录和栈；任何一步失败都回滚已分配的资源
    fn alloc_task(
        &mut self,
        task_type: TaskType,
        space: AddressSpace,
    ) -> Result<(usize, TaskMemory), SchedError> {
        let (slot, pid) = self.pool.allocate(&mut self.queues)?;

        let mem = self.alloc_task_memory(space);
        let Some(mem) = mem else {
            log::warn!("sched: out of memory creating pid {}", pid);
            // 空白槽位的状态就是 EXITED，可以直接释放
            self.pool.release(&mut self.queues, slot);
            return Err(SchedError::ResourceExhausted);
        };

        let pcb = self.pcb_mut(slot);
        pcb.init_pcb_default(pid, task_type, TaskStatus::Ready);
        pcb.set_stack_base(mem.kernel_stack_top, mem.user_stack_top);
        pcb.pgdir = mem.pgdir;
        Ok((slot, mem))
    }

    fn alloc_task_memory(&mut self, space: AddressSpace) -> Option<TaskMemory> {
        let (pgdir, owned) = match space {
            AddressSpace::Kernel => (self.mm.kernel_page_dir(), false),
            AddressSpace::Shared(pgdir) => (pgdir, false),
            AddressSpace::Fresh => (self.mm.alloc_page_dir()?, true),
            AddressSpace::Fork(parent) => (self.mm.fork_page_dir(parent)?, true),
        };

        let Some(kernel_stack_top) = self.mm.alloc_kernel_stack() else {
            if owned {
                self.mm.free_page_dir(pgdir);
            }
            return None;
        };

        let user_stack_top = match space {
            AddressSpace::Fresh => match self.mm.alloc_user_stack(pgdir) {
                Some(top) => top,
                None => {
                    self.mm.free_kernel_stack(kernel_stack_top);
                    self.mm.free_page_dir(pgdir);
                    return None;
                }
            },
            _ => 0,
        };

        Some(TaskMemory {
            pgdir,
            kernel_stack_top,
            user_stack_top,
        })
    }
}
