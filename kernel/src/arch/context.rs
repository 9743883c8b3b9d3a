//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 寄存器上下文布局
//!
//! 这里的两个结构体必须与 trap 入口汇编、switch_to 汇编逐位一致：
//! - `TrapContext`: 32 个通用寄存器 + sstatus/sepc/sbadaddr/scause/satp
//! - `SwitchContext`: switch_to 保存的被调用者保存寄存器 (ra, sp, s0-s11)
//!
//! 编译期断言保证偏移量不会被无意修改。

use core::mem::{offset_of, size_of};

/// 寄存器宽度 (RV64)
pub type Reg = u64;

/// sstatus.SIE: 监管者模式全局中断使能
pub const SSTATUS_SIE: Reg = 1 << 1;
/// sstatus.SPIE: sret 之后的 SIE
pub const SSTATUS_SPIE: Reg = 1 << 5;
/// sstatus.SPP: sret 返回到 S 模式 (1) 还是 U 模式 (0)
pub const SSTATUS_SPP: Reg = 1 << 8;
/// sstatus.SUM: 允许 S 模式访问用户页
pub const SSTATUS_SUM: Reg = 1 << 18;

/// 通用寄存器编号 (x0-x31 的 ABI 名称)
pub mod reg {
    pub const ZERO: usize = 0;
    pub const RA: usize = 1;
    pub const SP: usize = 2;
    pub const GP: usize = 3;
    pub const TP: usize = 4;
    pub const A0: usize = 10;
    pub const A1: usize = 11;
    pub const A2: usize = 12;
    pub const A3: usize = 13;
    pub const A4: usize = 14;
    pub const A5: usize = 15;
    pub const A7: usize = 17;
}

/// 异常上下文
///
/// trap 入口把全部通用寄存器和 5 个特权寄存器按此顺序保存到当前 PCB 中
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrapContext {
    /// x0-x31
    pub regs: [Reg; 32],
    pub sstatus: Reg,
    pub sepc: Reg,
    pub sbadaddr: Reg,
    pub scause: Reg,
    pub satp: Reg,
}

const _: () = {
    assert!(size_of::<TrapContext>() == 37 * 8);
    assert!(offset_of!(TrapContext, sstatus) == 32 * 8);
    assert!(offset_of!(TrapContext, sepc) == 33 * 8);
    assert!(offset_of!(TrapContext, sbadaddr) == 34 * 8);
    assert!(offset_of!(TrapContext, scause) == 35 * 8);
    assert!(offset_of!(TrapContext, satp) == 36 * 8);
};

impl TrapContext {
    /// 全零上下文
    pub const fn zeroed() -> Self {
        Self {
            regs: [0; 32],
            sstatus: 0,
            sepc: 0,
            sbadaddr: 0,
            scause: 0,
            satp: 0,
        }
    }

    /// 新任务第一次 sret 使用的上下文
    ///
    /// 用户任务 SPP=0，内核任务 SPP=1；两者都置 SPIE，返回后打开中断
    pub fn new_task(entry: Reg, sp: Reg, user: bool, satp: Reg) -> Self {
        let mut ctx = Self::zeroed();
        ctx.regs[reg::SP] = sp;
        ctx.sepc = entry;
        ctx.satp = satp;
        ctx.sstatus = if user {
            SSTATUS_SPIE | SSTATUS_SUM
        } else {
            SSTATUS_SPIE | SSTATUS_SPP
        };
        ctx
    }

    /// 系统调用号 (a7)
    pub fn syscall_id(&self) -> usize {
        self.regs[reg::A7] as usize
    }

    /// 系统调用参数 (a0-a5)
    pub fn syscall_args(&self) -> [usize; 6] {
        [
            self.regs[reg::A0] as usize,
            self.regs[reg::A1] as usize,
            self.regs[reg::A2] as usize,
            self.regs[reg::A3] as usize,
            self.regs[reg::A4] as usize,
            self.regs[reg::A5] as usize,
        ]
    }

    /// 写入返回值 (a0)
    pub fn set_return(&mut self, value: isize) {
        self.regs[reg::A0] = value as Reg;
    }
}

/// switch_to 保存的上下文
///
/// 对应 switchto_context_t：ra, sp, s0-s11 共 14 个寄存器
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchContext {
    /// 返回地址，新任务为 trap 返回入口
    pub ra: Reg,
    /// 内核栈指针
    pub sp: Reg,
    /// s0-s11
    pub s: [Reg; 12],
}

const _: () = {
    assert!(size_of::<SwitchContext>() == 14 * 8);
    assert!(offset_of!(SwitchContext, ra) == 0);
    assert!(offset_of!(SwitchContext, sp) == 8);
    assert!(offset_of!(SwitchContext, s) == 16);
};

impl SwitchContext {
    pub const fn zeroed() -> Self {
        Self {
            ra: 0,
            sp: 0,
            s: [0; 12],
        }
    }

    /// 上下文是否已经初始化过 (init_pcb_stack 或者一次 switch-out)
    pub fn is_initialized(&self) -> bool {
        self.sp != 0
    }
}
