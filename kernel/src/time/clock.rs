//! 时间相关的系统调用
//!
//! - 睡眠: sleep (滴答), nanosleep (timespec)
//! - CPU 时间统计: times, getrusage
//! - 墙上时间: gettimeofday, clock_gettime, settimeofday
//!
//! 所有时间以滴答为单位记账，`time_base` 是每秒滴答数。

use core::ops::{Add, Sub};

use crate::arch::Arch;
use crate::errno::SchedError;
use crate::mm::MemoryManager;
use crate::process::pid::Pid;
use crate::sched::{Kernel, QueueId};

pub const NSEC_PER_SEC: i64 = 1_000_000_000;
pub const USEC_PER_SEC: i64 = 1_000_000;

/// getrusage 的 who 参数
pub const RUSAGE_SELF: i32 = 0;
pub const RUSAGE_CHILDREN: i32 = -1;
pub const RUSAGE_THREAD: i32 = 1;

/// clock_gettime 的时钟
pub const CLOCK_REALTIME: usize = 0;
pub const CLOCK_MONOTONIC: usize = 1;

/// struct timespec
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSpec {
    pub sec: i64,
    pub nsec: i64,
}

impl TimeSpec {
    pub const ZERO: TimeSpec = TimeSpec { sec: 0, nsec: 0 };

    pub const fn new(sec: i64, nsec: i64) -> Self {
        Self { sec, nsec }
    }

    /// nsec 在 [0, 1e9) 且 sec 非负
    pub fn is_valid(&self) -> bool {
        self.sec >= 0 && (0..NSEC_PER_SEC).contains(&self.nsec)
    }

    pub fn from_ticks(ticks: u64, time_base: u64) -> Self {
        let nanos = ticks as u128 * NSEC_PER_SEC as u128 / time_base as u128;
        Self::from_nanos(nanos as i128)
    }

    /// 换算为滴答数，`sec * base + nsec * base / 1e9`
    pub fn to_ticks(&self, time_base: u64) -> u64 {
        let sub = self.nsec.max(0) as u128 * time_base as u128 / NSEC_PER_SEC as u128;
        (self.sec.max(0) as u64)
            .saturating_mul(time_base)
            .saturating_add(sub as u64)
    }

    pub fn as_nanos(&self) -> i128 {
        self.sec as i128 * NSEC_PER_SEC as i128 + self.nsec as i128
    }

    pub fn from_nanos(nanos: i128) -> Self {
        Self {
            sec: nanos.div_euclid(NSEC_PER_SEC as i128) as i64,
            nsec: nanos.rem_euclid(NSEC_PER_SEC as i128) as i64,
        }
    }
}

impl Add for TimeSpec {
    type Output = TimeSpec;

    fn add(self, rhs: TimeSpec) -> TimeSpec {
        TimeSpec::from_nanos(self.as_nanos() + rhs.as_nanos())
    }
}

impl Sub for TimeSpec {
    type Output = TimeSpec;

    fn sub(self, rhs: TimeSpec) -> TimeSpec {
        TimeSpec::from_nanos(self.as_nanos() - rhs.as_nanos())
    }
}

/// struct timeval
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeVal {
    pub sec: i64,
    pub usec: i64,
}

impl TimeVal {
    pub fn from_ticks(ticks: u64, time_base: u64) -> Self {
        Self {
            sec: (ticks / time_base) as i64,
            usec: ((ticks % time_base) as u128 * USEC_PER_SEC as u128 / time_base as u128) as i64,
        }
    }
}

impl From<TimeSpec> for TimeVal {
    fn from(ts: TimeSpec) -> Self {
        Self {
            sec: ts.sec,
            usec: ts.nsec / 1000,
        }
    }
}

/// struct tms (单位：滴答)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tms {
    pub utime: i64,
    pub stime: i64,
    pub cutime: i64,
    pub cstime: i64,
}

/// struct rusage (Linux 布局)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rusage {
    pub utime: TimeVal,
    pub stime: TimeVal,
    pub maxrss: i64,
    pub ixrss: i64,
    pub idrss: i64,
    pub isrss: i64,
    pub minflt: i64,
    pub majflt: i64,
    pub nswap: i64,
    pub inblock: i64,
    pub oublock: i64,
    pub msgsnd: i64,
    pub msgrcv: i64,
    pub nsignals: i64,
    pub nvcsw: i64,
    pub nivcsw: i64,
}

const _: () = assert!(core::mem::size_of::<Rusage>() == 18 * 8);

/// 睡眠定时器的回调，参数是 pid
///
/// 触发时定时器槽位已经回到池中，先清掉 PCB 里的下标再唤醒
fn wake_sleeper<A: Arch, M: MemoryManager>(kernel: &mut Kernel<A, M>, param: usize) {
    if let Some(slot) = kernel.find_pid(param as Pid) {
        kernel.pcb_mut(slot).sleep_timer = None;
        kernel.do_unblock(slot);
    }
}

impl<A: Arch, M: MemoryManager> Kernel<A, M> {
    /// 当前任务睡眠 `ticks` 个滴答
    ///
    /// 定时器池已满时不阻塞，直接返回 `ResourceExhausted`
    pub fn do_sleep(&mut self, ticks: u64) -> Result<(), SchedError> {
        let cur = self.current_slot();
        let pid = self.current().pid;

        self.disable_preempt();
        let idx = match self.timer_create(wake_sleeper::<A, M>, pid as usize, ticks) {
            Ok(idx) => idx,
            Err(e) => {
                self.enable_preempt();
                return Err(e);
            }
        };
        self.pool[cur].sleep_timer = Some(idx);
        self.do_block(cur, QueueId::Sleep);
        self.enable_preempt();

        self.do_scheduler();
        Ok(())
    }

    pub fn do_nanosleep(&mut self, ts: &TimeSpec) -> Result<(), SchedError> {
        if !ts.is_valid() {
            return Err(SchedError::InvalidArgument);
        }
        let ticks = ts.to_ticks(self.get_time_base());
        self.do_sleep(ticks)
    }

    /// 当前任务和子进程的 CPU 时间，返回当前滴答
    ///
    /// 子进程时间 = 仍存活子进程的时间 + 已回收子进程的累计时间
    pub fn do_times(&self, tms: &mut Tms) -> u64 {
        let cur = self.current_slot();
        let pcb = self.current();
        tms.utime = pcb.utime as i64;
        tms.stime = pcb.stime as i64;
        tms.cutime = pcb.cutime as i64;
        tms.cstime = pcb.cstime as i64;

        for slot in self.pool.allocated_slots() {
            if self.is_child(slot, cur) {
                tms.cutime += self.pool[slot].utime as i64;
                tms.cstime += self.pool[slot].stime as i64;
            }
        }
        self.get_ticks()
    }

    pub fn do_getrusage(&self, who: i32) -> Result<Rusage, SchedError> {
        let base = self.get_time_base();
        let pcb = self.current();
        let mut r = Rusage::default();
        match who {
            RUSAGE_SELF | RUSAGE_THREAD => {
                r.utime = TimeVal::from_ticks(pcb.utime, base);
                r.stime = TimeVal::from_ticks(pcb.stime, base);
                r.nvcsw = pcb.nvcsw as i64;
                r.nivcsw = pcb.nivcsw as i64;
            }
            RUSAGE_CHILDREN => {
                r.utime = TimeVal::from_ticks(pcb.cutime, base);
                r.stime = TimeVal::from_ticks(pcb.cstime, base);
            }
            _ => return Err(SchedError::InvalidArgument),
        }
        Ok(r)
    }

    /// 启动以来的时间
    pub fn uptime(&self) -> TimeSpec {
        TimeSpec::from_ticks(self.get_ticks(), self.get_time_base())
    }

    /// 墙上时间：优先使用平台的实时时钟，否则为启动纪元 + 运行时间
    pub fn realtime(&self) -> TimeSpec {
        self.arch
            .realtime()
            .unwrap_or_else(|| self.boot_epoch + self.uptime())
    }

    pub fn do_gettimeofday(&self) -> TimeVal {
        self.realtime().into()
    }

    /// 设置墙上时间 (调整启动纪元)
    pub fn do_settimeofday(&mut self, now: &TimeSpec) -> Result<(), SchedError> {
        if !now.is_valid() {
            return Err(SchedError::InvalidArgument);
        }
        self.boot_epoch = *now - self.uptime();
        log::info!("time: wall clock set to {}.{:09}", now.sec, now.nsec);
        Ok(())
    }

    pub fn do_clock_gettime(&self, clock_id: usize) -> Result<TimeSpec, SchedError> {
        match clock_id {
            CLOCK_REALTIME => Ok(self.realtime()),
            CLOCK_MONOTONIC => Ok(self.uptime()),
            _ => Err(SchedError::InvalidArgument),
        }
    }

    /// 从用户态进入内核时调用：把上次记账以来的时间记为用户态时间
    pub fn user_time_count(&mut self) {
        let now = self.get_ticks();
        let delta = now.saturating_sub(self.last_time);
        self.current_mut().utime += delta;
        self.last_time = now;
    }

    /// 返回用户态前调用：把上次记账以来的时间记为内核态时间
    pub fn kernel_time_count(&mut self) {
        let now = self.get_ticks();
        let delta = now.saturating_sub(self.last_time);
        self.current_mut().stime += delta;
        self.last_time = now;
    }
}
