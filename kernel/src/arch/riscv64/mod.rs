//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! RISC-V 64位架构支持
//!
//! - `Riscv64`: 调度核心的 `Arch` 实现 (sstatus.SIE, rdtime, wfi)
//! - `switch`: 上下文切换汇编
//! - SBI 控制台
//!
//! trap 入口汇编由平台提供：它把寄存器保存到当前 PCB 的 trap 上下文
//! (偏移量见 `process::task::PCB_*`)，并导出 `ret_from_exception`。

pub mod switch;

use riscv::register::{sstatus, time};

use crate::arch::context::SwitchContext;
use crate::arch::Arch;
use crate::config::DEFAULT_TIME_BASE;
use crate::mm::MemoryManager;
use crate::sched::Kernel;

extern "C" {
    /// 从 PCB 的 trap 上下文恢复寄存器并 sret
    fn ret_from_exception();
    /// 链接脚本中的全局指针
    static __global_pointer: u8;
}

/// RISC-V 硬件后端
pub struct Riscv64 {
    time_base: u64,
}

impl Riscv64 {
    /// `time_base` 来自设备树的 timebase-frequency，未知时传 0 使用默认值
    pub fn new(time_base: u64) -> Self {
        Self {
            time_base: if time_base == 0 {
                DEFAULT_TIME_BASE
            } else {
                time_base
            },
        }
    }
}

impl Arch for Riscv64 {
    fn irq_disable(&mut self) {
        // SAFETY: 只修改本 hart 的 sstatus.SIE
        unsafe { sstatus::clear_sie() };
    }

    fn irq_enable(&mut self) {
        // SAFETY: 同上
        unsafe { sstatus::set_sie() };
    }

    fn get_ticks(&self) -> u64 {
        time::read() as u64
    }

    fn time_base(&self) -> u64 {
        self.time_base
    }

    fn trap_return_entry(&self) -> usize {
        ret_from_exception as usize
    }

    fn global_pointer(&self) -> usize {
        // SAFETY: 只取地址
        unsafe { core::ptr::addr_of!(__global_pointer) as usize }
    }

    unsafe fn switch_to(&mut self, prev: *mut SwitchContext, next: *const SwitchContext) {
        unsafe { switch::__switch_to(prev, next) };
    }

    fn wait_for_interrupt(&mut self) {
        // 等待期间必须允许中断，否则 wfi 之后时钟中断不会被处理
        unsafe {
            sstatus::set_sie();
            riscv::asm::wfi();
        }
    }
}

/// SBI 控制台输出
pub fn console_putchar(c: u8) {
    #[allow(deprecated)]
    sbi_rt::legacy::console_putchar(c as usize);
}

/// 注册 SBI 控制台并安装日志后端
pub fn init_console() {
    crate::print::set_console(console_putchar);
    crate::logging::init(crate::logging::configured_level());
}

/// 时钟中断处理函数调用
pub fn handle_timer_interrupt<M: MemoryManager>(kernel: &mut Kernel<Riscv64, M>) {
    kernel.finish_task_switch();
    kernel.kernel_time_count();
    kernel.scheduler_tick();
}

/// 系统调用入口：从用户态进入时调用
pub fn handle_syscall_trap<M: MemoryManager>(kernel: &mut Kernel<Riscv64, M>) {
    kernel.finish_task_switch();
    kernel.user_time_count();
    kernel.handle_syscall();
    kernel.kernel_time_count();
}

/// 当前进程退出，不返回
pub fn exit_current<M: MemoryManager>(kernel: &mut Kernel<Riscv64, M>, status: i32) -> ! {
    kernel.do_exit(status);
    // 已切换到其他任务后，这个上下文不会再被调度
    loop {
        unsafe { riscv::asm::wfi() };
    }
}
