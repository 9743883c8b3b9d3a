//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 系统调用分发
//!
//! 遵循 Linux RISC-V ABI：a7 = 系统调用号，a0-a5 = 参数，a0 = 返回值。
//! 错误以负的 errno 返回。
//!
//! 阻塞的 wait4 可重启：把 sepc 退回到 ecall，进程被唤醒后重新执行。

use core::mem::size_of;

use crate::arch::context::Reg;
use crate::arch::Arch;
use crate::errno::{Errno, SchedError};
use crate::mm::MemoryManager;
use crate::process::fork::{EXEC_MAX_ARGS, EXEC_MAX_ARG_LEN};
use crate::process::pid::Pid;
use crate::process::task::{SpawnMode, TaskInfo, TaskStatus, TaskType, DEFAULT_MODE};
use crate::process::wait::WaitStatus;
use crate::sched::Kernel;
use crate::time::{TimeSpec, TimeVal, Tms};

// Linux RISC-V 系统调用号 (include/uapi/asm-generic/unistd.h)
pub const SYS_EXIT: usize = 93;
pub const SYS_EXIT_GROUP: usize = 94;
pub const SYS_NANOSLEEP: usize = 101;
pub const SYS_CLOCK_GETTIME: usize = 113;
pub const SYS_SCHED_SETAFFINITY: usize = 122;
pub const SYS_SCHED_YIELD: usize = 124;
pub const SYS_KILL: usize = 129;
pub const SYS_TIMES: usize = 153;
pub const SYS_GETRUSAGE: usize = 165;
pub const SYS_GETTIMEOFDAY: usize = 169;
pub const SYS_GETPID: usize = 172;
pub const SYS_GETPPID: usize = 173;
pub const SYS_CLONE: usize = 220;
pub const SYS_EXECVE: usize = 221;
pub const SYS_WAIT4: usize = 260;

// 教学内核私有的系统调用
pub const SYS_SLEEP: usize = 1001;
pub const SYS_PS: usize = 1002;
pub const SYS_SPAWN: usize = 1003;
pub const SYS_GET_TIMEBASE: usize = 1004;
pub const SYS_GET_TICK: usize = 1005;

/// 单个系统调用的结果
enum SyscallResult {
    /// 写入 a0
    Value(isize),
    /// 不写 a0，sepc 退回到 ecall 重新执行
    Restart,
}

impl From<Result<isize, SchedError>> for SyscallResult {
    fn from(ret: Result<isize, SchedError>) -> Self {
        SyscallResult::Value(match ret {
            Ok(v) => v,
            Err(e) => e.errno().as_neg_isize(),
        })
    }
}

fn errno(e: Errno) -> SyscallResult {
    SyscallResult::Value(e.as_neg_isize())
}

fn fail(e: SchedError) -> SyscallResult {
    errno(e.errno())
}

impl<A: Arch, M: MemoryManager> Kernel<A, M> {
    /// 处理当前任务的一次 ecall
    ///
    /// 返回值写回发起调用的任务；调用期间任务可能被切换、退出，
    /// 已经 ZOMBIE / EXITED 的任务不再写回。
    pub fn handle_syscall(&mut self) {
        let caller = self.current_slot();
        let ctx = &mut self.current_mut().trap_context;
        let id = ctx.syscall_id();
        let args = ctx.syscall_args();
        ctx.sepc += 4;

        log::trace!("syscall: pid {} id {} args {:x?}", self.getpid(), id, args);
        let ret = self.dispatch(id, args);

        let pcb = self.pcb_mut(caller);
        if matches!(pcb.status, TaskStatus::Zombie | TaskStatus::Exited) {
            return;
        }
        match ret {
            SyscallResult::Value(v) => pcb.trap_context.set_return(v),
            SyscallResult::Restart => pcb.trap_context.sepc -= 4,
        }
    }

    fn dispatch(&mut self, id: usize, args: [usize; 6]) -> SyscallResult {
        match id {
            SYS_EXIT | SYS_EXIT_GROUP => {
                self.do_exit(args[0] as i32);
                SyscallResult::Value(0)
            }
            SYS_NANOSLEEP => self.sys_nanosleep(args[0]),
            SYS_CLOCK_GETTIME => self.sys_clock_gettime(args[0], args[1]),
            SYS_SCHED_SETAFFINITY => self.sys_sched_setaffinity(args[0] as Pid, args[1], args[2]),
            SYS_SCHED_YIELD => {
                self.do_yield();
                SyscallResult::Value(0)
            }
            SYS_KILL => self.kill(args[0] as Pid).map(|_| 0isize).into(),
            SYS_TIMES => self.sys_times(args[0]),
            SYS_GETRUSAGE => self.sys_getrusage(args[0] as i32, args[1]),
            SYS_GETTIMEOFDAY => self.sys_gettimeofday(args[0]),
            SYS_GETPID => SyscallResult::Value(self.getpid() as isize),
            SYS_GETPPID => SyscallResult::Value(self.getppid() as isize),
            SYS_CLONE => self
                .do_clone(args[0], args[1], args[2], args[3], args[4])
                .map(|pid| pid as isize)
                .into(),
            SYS_EXECVE => self.sys_execve(args[0], args[1]),
            SYS_WAIT4 => self.sys_wait4(args[0] as Pid, args[1], args[2] as u32),

            SYS_SLEEP => self.do_sleep(args[0] as u64).map(|_| 0isize).into(),
            SYS_PS => {
                let _ = self.do_process_show(&mut crate::print::Console);
                SyscallResult::Value(0)
            }
            SYS_SPAWN => self.sys_spawn(args[0], args[1], args[2]),
            SYS_GET_TIMEBASE => SyscallResult::Value(self.get_time_base() as isize),
            SYS_GET_TICK => SyscallResult::Value(self.get_ticks() as isize),

            _ => {
                log::warn!("syscall: unsupported id {}", id);
                errno(Errno::FunctionNotImplemented)
            }
        }
    }

    // ---- 用户内存 ----

    fn caller_pgdir(&self) -> usize {
        self.current().pgdir
    }

    fn put_user<T: Copy>(&mut self, dst: usize, value: &T) -> bool {
        // SAFETY: T 是 repr(C) 的纯数据，按字节读取
        let bytes = unsafe {
            core::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>())
        };
        let pgdir = self.caller_pgdir();
        self.mm.copy_to_user(pgdir, dst, bytes)
    }

    fn get_user<T: Copy + Default>(&mut self, src: usize) -> Option<T> {
        let mut value = T::default();
        // SAFETY: 只用于所有位模式都合法的 repr(C) 整数结构
        let bytes = unsafe {
            core::slice::from_raw_parts_mut(&mut value as *mut T as *mut u8, size_of::<T>())
        };
        let pgdir = self.caller_pgdir();
        self.mm.copy_from_user(pgdir, src, bytes).then_some(value)
    }

    /// 读取以 0 结尾的用户字符串，返回长度
    fn get_user_str(&mut self, src: usize, buf: &mut [u8]) -> Option<usize> {
        let pgdir = self.caller_pgdir();
        for i in 0..buf.len() {
            let mut c = [0u8; 1];
            if !self.mm.copy_from_user(pgdir, src + i, &mut c) {
                return None;
            }
            if c[0] == 0 {
                return Some(i);
            }
            buf[i] = c[0];
        }
        None
    }

    // ---- 各系统调用 ----

    fn sys_nanosleep(&mut self, req: usize) -> SyscallResult {
        let Some(ts) = self.get_user::<TimeSpec>(req) else {
            return errno(Errno::BadAddress);
        };
        self.do_nanosleep(&ts).map(|_| 0isize).into()
    }

    fn sys_clock_gettime(&mut self, clock_id: usize, tp: usize) -> SyscallResult {
        let ts = match self.do_clock_gettime(clock_id) {
            Ok(ts) => ts,
            Err(e) => return fail(e),
        };
        if !self.put_user(tp, &ts) {
            return errno(Errno::BadAddress);
        }
        SyscallResult::Value(0)
    }

    fn sys_sched_setaffinity(&mut self, pid: Pid, len: usize, mask_ptr: usize) -> SyscallResult {
        if len < size_of::<u64>() {
            return errno(Errno::InvalidArgument);
        }
        let pid = if pid == 0 { self.getpid() } else { pid };
        let Some(mask) = self.get_user::<u64>(mask_ptr) else {
            return errno(Errno::BadAddress);
        };
        self.taskset(pid, mask).map(|_| 0isize).into()
    }

    fn sys_times(&mut self, buf: usize) -> SyscallResult {
        let mut tms = Tms::default();
        let now = self.do_times(&mut tms);
        if buf != 0 && !self.put_user(buf, &tms) {
            return errno(Errno::BadAddress);
        }
        SyscallResult::Value(now as isize)
    }

    fn sys_getrusage(&mut self, who: i32, addr: usize) -> SyscallResult {
        let usage = match self.do_getrusage(who) {
            Ok(r) => r,
            Err(e) => return fail(e),
        };
        if !self.put_user(addr, &usage) {
            return errno(Errno::BadAddress);
        }
        SyscallResult::Value(0)
    }

    fn sys_gettimeofday(&mut self, tv: usize) -> SyscallResult {
        let now: TimeVal = self.do_gettimeofday();
        if !self.put_user(tv, &now) {
            return errno(Errno::BadAddress);
        }
        SyscallResult::Value(0)
    }

    fn sys_wait4(&mut self, pid: Pid, status: usize, options: u32) -> SyscallResult {
        match self.do_wait4(pid, options) {
            Ok(WaitStatus::Reaped { pid, status: code }) => {
                if status != 0 && !self.put_user(status, &(code as i32)) {
                    return errno(Errno::BadAddress);
                }
                SyscallResult::Value(pid as isize)
            }
            Ok(WaitStatus::NotReady) => SyscallResult::Value(0),
            Ok(WaitStatus::Blocked) => SyscallResult::Restart,
            Err(e) => errno(e.wait_errno()),
        }
    }

    /// execve(path, argv, envp)；环境变量忽略
    fn sys_execve(&mut self, path: usize, argv: usize) -> SyscallResult {
        let mut name_buf = [0u8; EXEC_MAX_ARG_LEN];
        let Some(name_len) = self.get_user_str(path, &mut name_buf) else {
            return errno(Errno::BadAddress);
        };

        let mut bufs = [[0u8; EXEC_MAX_ARG_LEN]; EXEC_MAX_ARGS];
        let mut lens = [0usize; EXEC_MAX_ARGS];
        let mut argc = 0;
        if argv != 0 {
            loop {
                let Some(ptr) = self.get_user::<u64>(argv + argc * size_of::<u64>()) else {
                    return errno(Errno::BadAddress);
                };
                if ptr == 0 {
                    break;
                }
                if argc == EXEC_MAX_ARGS {
                    return errno(Errno::ArgumentListTooLong);
                }
                let Some(len) = self.get_user_str(ptr as usize, &mut bufs[argc]) else {
                    return errno(Errno::BadAddress);
                };
                lens[argc] = len;
                argc += 1;
            }
        }

        let Ok(name) = core::str::from_utf8(&name_buf[..name_len]) else {
            return errno(Errno::InvalidArgument);
        };
        let mut args: [&str; EXEC_MAX_ARGS] = [""; EXEC_MAX_ARGS];
        for i in 0..argc {
            match core::str::from_utf8(&bufs[i][..lens[i]]) {
                Ok(s) => args[i] = s,
                Err(_) => return errno(Errno::InvalidArgument),
            }
        }

        match self.do_exec(name, &args[..argc]) {
            Ok(argc) => SyscallResult::Value(argc as isize),
            Err(SchedError::NotFound) => errno(Errno::NoSuchFileOrDirectory),
            Err(e) => fail(e),
        }
    }

    /// spawn(entry, arg, mode)：创建与调用者同特权级的新进程
    fn sys_spawn(&mut self, entry: usize, arg: usize, mode: usize) -> SyscallResult {
        let mode = match mode {
            0 => SpawnMode::EnterZombieOnExit,
            1 => SpawnMode::AutoCleanupOnExit,
            _ => DEFAULT_MODE,
        };
        let task_type = if self.current().task_type.is_user() {
            TaskType::UserProcess
        } else {
            TaskType::KernelProcess
        };
        let info = TaskInfo {
            entry_point: entry,
            task_type,
        };
        self.spawn(&info, arg, mode).map(|pid| pid as isize).into()
    }
}

/// 对 `Reg` 的约定：系统调用返回值是有符号的
const _: () = assert!(size_of::<Reg>() == size_of::<isize>());
