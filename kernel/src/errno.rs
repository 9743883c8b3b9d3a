//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 错误代码与调度错误分类
//!
//! - `Errno`: 系统调用返回的标准错误码 (include/uapi/asm-generic/errno.h)
//! - `SchedError`: 调度核心内部的错误分类，由系统调用层转换为负错误码

use core::fmt;

/// 标准错误代码
///
/// 使用方法：
/// ```rust
/// use rvsched::errno::Errno;
///
/// // 系统调用风格，返回负数
/// assert_eq!(Errno::NoSuchProcess.as_neg_i32(), -3);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such file or directory (ENOENT, 2)
    NoSuchFileOrDirectory = 2,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// Argument list too long (E2BIG, 7)
    ArgumentListTooLong = 7,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// Function not implemented (ENOSYS, 38)
    FunctionNotImplemented = 38,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 系统调用返回寄存器中的值
    #[inline]
    pub const fn as_neg_isize(self) -> isize {
        -(self as i32) as isize
    }
}

/// 调度核心错误分类
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// PCB 池或定时器池已满
    ResourceExhausted,
    /// 未知 pid，或者不是调用者的子进程
    NotFound,
    /// wait 选项、clone 标志、时间参数等非法
    InvalidArgument,
    /// 用户地址无法访问
    BadAddress,
    /// 切换边界检测到寄存器上下文损坏，不可恢复
    Fatal,
}

impl SchedError {
    /// 通用映射：pid 查找失败对应 ESRCH
    pub const fn errno(self) -> Errno {
        match self {
            SchedError::ResourceExhausted => Errno::TryAgain,
            SchedError::NotFound => Errno::NoSuchProcess,
            SchedError::InvalidArgument => Errno::InvalidArgument,
            SchedError::BadAddress => Errno::BadAddress,
            SchedError::Fatal => Errno::OperationNotPermitted,
        }
    }

    /// wait 系列的映射：没有匹配的子进程对应 ECHILD
    pub const fn wait_errno(self) -> Errno {
        match self {
            SchedError::NotFound => Errno::NoChild,
            other => other.errno(),
        }
    }
}

impl From<SchedError> for Errno {
    fn from(e: SchedError) -> Self {
        e.errno()
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::ResourceExhausted => "resource exhausted",
            SchedError::NotFound => "no such process",
            SchedError::InvalidArgument => "invalid argument",
            SchedError::BadAddress => "bad address",
            SchedError::Fatal => "register context corrupted",
        };
        f.write_str(msg)
    }
}

/// 常用的错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const E2BIG: i32 = 7;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EINVAL: i32 = 22;
    pub const ENOSYS: i32 = 38;
}
