//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 上下文切换
//!
//! 对应 Linux 内核的 __switch_to() (arch/riscv/kernel/entry.S)
//!
//! 只保存被调用者保存寄存器 (ra, sp, s0-s11)，布局与 `SwitchContext` 一致。
//! 调用者保存寄存器在调用 switch_to 之前已经由编译器保存到栈上。

use crate::arch::context::SwitchContext;

/// 保存当前寄存器到 `prev`，从 `next` 恢复并返回到 `next.ra`
///
/// # Safety
/// - `prev` / `next` 指向有效的 `SwitchContext`
/// - 调用期间中断已关闭
/// - `next` 已经由 init_pcb_stack 或一次切出初始化
#[unsafe(naked)]
#[no_mangle]
pub unsafe extern "C" fn __switch_to(prev: *mut SwitchContext, next: *const SwitchContext) {
    // a0 = prev, a1 = next
    core::arch::naked_asm!(
        "sd ra, 0(a0)",
        "sd sp, 8(a0)",
        "sd s0, 16(a0)",
        "sd s1, 24(a0)",
        "sd s2, 32(a0)",
        "sd s3, 40(a0)",
        "sd s4, 48(a0)",
        "sd s5, 56(a0)",
        "sd s6, 64(a0)",
        "sd s7, 72(a0)",
        "sd s8, 80(a0)",
        "sd s9, 88(a0)",
        "sd s10, 96(a0)",
        "sd s11, 104(a0)",
        "ld ra, 0(a1)",
        "ld sp, 8(a1)",
        "ld s0, 16(a1)",
        "ld s1, 24(a1)",
        "ld s2, 32(a1)",
        "ld s3, 40(a1)",
        "ld s4, 48(a1)",
        "ld s5, 56(a1)",
        "ld s6, 64(a1)",
        "ld s7, 72(a1)",
        "ld s8, 80(a1)",
        "ld s9, 88(a1)",
        "ld s10, 96(a1)",
        "ld s11, 104(a1)",
        "ret",
    );
}
