//! 系统调用分发测试
//!
//! 通过当前任务的 trap 上下文发起 ecall

use super::*;
use crate::arch::context::reg;
use crate::errno::constants::*;
use crate::process::DEFAULT_MODE;
use crate::syscall::*;

const ECALL_PC: u64 = 0x1_0000;

/// 当前任务执行一次系统调用，返回 a0
fn ecall(k: &mut TestKernel, id: usize, args: &[usize]) -> isize {
    let slot = k.current_slot();
    let ctx = &mut k.current_mut().trap_context;
    ctx.regs[reg::A7] = id as u64;
    for (i, &arg) in args.iter().enumerate() {
        ctx.regs[reg::A0 + i] = arg as u64;
    }
    ctx.sepc = ECALL_PC;
    k.handle_syscall();
    k.pcb(slot).trap_context.regs[reg::A0] as isize
}

fn start_user(k: &mut TestKernel, mode: SpawnMode) -> (Pid, usize) {
    let pid = spawn_user(k, mode);
    run_until(k, pid);
    (pid, k.current().pgdir)
}

#[test]
fn test_syscall_getpid() {
    let mut k = new_kernel();
    let (pid, _) = start_user(&mut k, DEFAULT_MODE);

    // 测试 1: 返回值写入 a0，sepc 越过 ecall
    assert_eq!(ecall(&mut k, SYS_GETPID, &[]), pid as isize);
    assert_eq!(k.current().trap_context.sepc, ECALL_PC + 4);

    // 测试 2: idle 创建的进程 ppid 为 0
    assert_eq!(ecall(&mut k, SYS_GETPPID, &[]), 0);

    // 测试 3: 未实现的系统调用
    assert_eq!(ecall(&mut k, 9999, &[]), -(ENOSYS as isize));
}

#[test]
fn test_syscall_wait4_restart() {
    let mut k = new_kernel();
    let (parent, pgdir) = start_user(&mut k, DEFAULT_MODE);
    let parent_slot = k.current_slot();
    let child = spawn_user(&mut k, DEFAULT_MODE);

    // 测试 1: 阻塞的 wait4 把 sepc 退回 ecall，a0 保持不变
    let ret = ecall(&mut k, SYS_WAIT4, &[child as usize, 0x3000, 0]);
    assert_eq!(ret, child as isize);
    assert_eq!(k.pcb(parent_slot).trap_context.sepc, ECALL_PC);
    assert_eq!(k.getpid(), child);

    // 测试 2: 子进程退出，父进程重新执行 ecall 后回收
    k.do_exit(5);
    run_until(&mut k, parent);
    k.handle_syscall();
    let ctx = k.current().trap_context;
    assert_eq!(ctx.regs[reg::A0] as isize, child as isize);
    assert_eq!(ctx.sepc, ECALL_PC + 4);
    assert_eq!(k.mm.read_i32(pgdir, 0x3000), Some(0x0500));
    assert_queue_invariant(&k);
}

#[test]
fn test_syscall_errno_mapping() {
    let mut k = new_kernel();
    start_user(&mut k, DEFAULT_MODE);

    // 测试 1: wait 系列没有子进程是 ECHILD
    assert_eq!(ecall(&mut k, SYS_WAIT4, &[usize::MAX, 0, 0]), -(ECHILD as isize));

    // 测试 2: 其他 pid 查找失败是 ESRCH
    assert_eq!(ecall(&mut k, SYS_KILL, &[4096]), -(ESRCH as isize));

    // 测试 3: 非法选项是 EINVAL
    assert_eq!(ecall(&mut k, SYS_WAIT4, &[usize::MAX, 0, 0x40]), -(EINVAL as isize));

    // 测试 4: 写回地址不可访问是 EFAULT
    assert_eq!(ecall(&mut k, SYS_GETTIMEOFDAY, &[BAD_ADDR]), -(EFAULT as isize));
}

#[test]
fn test_syscall_setaffinity() {
    let mut k = new_kernel();
    let (_, pgdir) = start_user(&mut k, DEFAULT_MODE);
    k.mm.write(pgdir, 0x5000, &0x3u64.to_ne_bytes());

    // 测试 1: 掩码长度不足
    assert_eq!(
        ecall(&mut k, SYS_SCHED_SETAFFINITY, &[0, 4, 0x5000]),
        -(EINVAL as isize)
    );

    // 测试 2: pid 0 表示调用者自己
    assert_eq!(ecall(&mut k, SYS_SCHED_SETAFFINITY, &[0, 8, 0x5000]), 0);
    assert_eq!(k.current().mask, 0x3);

    // 测试 3: 读不到掩码
    assert_eq!(
        ecall(&mut k, SYS_SCHED_SETAFFINITY, &[0, 8, BAD_ADDR]),
        -(EFAULT as isize)
    );
}

#[test]
fn test_syscall_exit_no_writeback() {
    let mut k = new_kernel();
    let parent = spawn(&mut k, DEFAULT_MODE);
    run_until(&mut k, parent);
    let (child, _) = start_user(&mut k, SpawnMode::EnterZombieOnExit);
    let slot = k.current_slot();

    // 退出后调用者不再运行，也不会被写回返回值
    ecall(&mut k, SYS_EXIT, &[4]);
    assert_ne!(k.getpid(), child);
    assert_eq!(k.pcb(slot).status, TaskStatus::Zombie);
    assert_eq!(k.pcb(slot).exit_status, 4);
    assert_eq!(k.pcb(slot).trap_context.sepc, ECALL_PC + 4);
}

#[test]
fn test_syscall_execve() {
    let mut k = new_kernel();
    k.mm.add_program("sh", 0x2_0000, 0x3_0000);
    let (_, pgdir) = start_user(&mut k, DEFAULT_MODE);

    // 测试 1: 程序不存在
    k.mm.write(pgdir, 0x6000, b"zz\0");
    assert_eq!(ecall(&mut k, SYS_EXECVE, &[0x6000, 0, 0]), -(ENOENT as isize));

    // 测试 2: 参数过多
    k.mm.write(pgdir, 0x6010, b"sh\0");
    for i in 0..=EXEC_ARGV_OVERFLOW {
        k.mm.write(pgdir, 0x6100 + i * 8, &0x6010u64.to_ne_bytes());
    }
    k.mm.write(pgdir, 0x6100 + (EXEC_ARGV_OVERFLOW + 1) * 8, &0u64.to_ne_bytes());
    assert_eq!(ecall(&mut k, SYS_EXECVE, &[0x6010, 0x6100, 0]), -(E2BIG as isize));

    // 测试 3: 成功后从新入口开始，a0 = argc
    k.mm.write(pgdir, 0x6200, &0x6010u64.to_ne_bytes());
    k.mm.write(pgdir, 0x6208, &0u64.to_ne_bytes());
    assert_eq!(ecall(&mut k, SYS_EXECVE, &[0x6010, 0x6200, 0]), 1);
    assert_eq!(k.current().trap_context.sepc, 0x2_0000);
    assert_ne!(k.current().pgdir, pgdir);
}

/// 第 EXEC_MAX_ARGS + 1 个参数触发 E2BIG
const EXEC_ARGV_OVERFLOW: usize = crate::process::fork::EXEC_MAX_ARGS;

#[test]
fn test_syscall_clock_and_times() {
    let mut k = new_kernel();
    let (_, pgdir) = start_user(&mut k, DEFAULT_MODE);
    k.arch.ticks = 15_000_000;

    // 测试 1: CLOCK_MONOTONIC 是启动以来的时间
    assert_eq!(ecall(&mut k, SYS_CLOCK_GETTIME, &[1, 0x7000]), 0);
    assert_eq!(k.mm.read_u64(pgdir, 0x7000), Some(1));
    assert_eq!(k.mm.read_u64(pgdir, 0x7008), Some(500_000_000));

    // 测试 2: 未知时钟
    assert_eq!(ecall(&mut k, SYS_CLOCK_GETTIME, &[7, 0x7000]), -(EINVAL as isize));

    // 测试 3: times 返回当前滴答，tms 可以为 NULL
    assert_eq!(ecall(&mut k, SYS_TIMES, &[0]), 15_000_000);
    assert_eq!(ecall(&mut k, SYS_GET_TICK, &[]), 15_000_000);
    assert_eq!(
        ecall(&mut k, SYS_GET_TIMEBASE, &[]),
        crate::config::DEFAULT_TIME_BASE as isize
    );
}

#[test]
fn test_syscall_nanosleep() {
    let mut k = new_kernel();
    let (pid, pgdir) = start_user(&mut k, DEFAULT_MODE);
    let slot = k.current_slot();

    // 测试 1: 请求地址不可读
    assert_eq!(ecall(&mut k, SYS_NANOSLEEP, &[BAD_ADDR]), -(EFAULT as isize));

    // 测试 2: 睡眠后返回 0
    let mut req = [0u8; 16];
    req[8..].copy_from_slice(&1000i64.to_ne_bytes());
    k.mm.write(pgdir, 0x7100, &req);
    assert_eq!(ecall(&mut k, SYS_NANOSLEEP, &[0x7100]), 0);
    assert_eq!(k.pcb(slot).status, TaskStatus::Blocked);
    assert_eq!(k.getpid(), 0);

    k.arch.ticks = 100;
    k.scheduler_tick();
    assert_eq!(k.getpid(), pid);
}

#[test]
fn test_syscall_spawn_and_yield() {
    let mut k = new_kernel();
    let (pid, _) = start_user(&mut k, DEFAULT_MODE);

    // 测试 1: spawn 创建同特权级的进程，arg 放在 a0
    let child = ecall(&mut k, SYS_SPAWN, &[0x1_0000, 7, 0]) as Pid;
    assert!(child > pid);
    let pcb = k.pcb(slot_of(&k, child));
    assert_eq!(pcb.task_type, TaskType::UserProcess);
    assert_eq!(pcb.mode, SpawnMode::EnterZombieOnExit);
    assert_eq!(pcb.trap_context.regs[reg::A0], 7);

    // 测试 2: yield 切换到子进程，返回值写回调用者
    let slot = k.current_slot();
    assert_eq!(ecall(&mut k, SYS_SCHED_YIELD, &[]), 0);
    assert_eq!(k.getpid(), child);
    assert_eq!(k.pcb(slot).nvcsw, 1);
}
