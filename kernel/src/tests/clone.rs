//! clone() 测试

use super::*;
use crate::arch::context::reg;
use crate::config::NUM_MAX_TASK;
use crate::errno::SchedError;
use crate::process::{CloneFlags, WaitStatus, DEFAULT_MODE};

const SIGCHLD: usize = 17;

/// 启动一个用户进程并让它成为当前任务，返回 (pid, 页目录)
fn start_user(k: &mut TestKernel) -> (Pid, usize) {
    let pid = spawn_user(k, DEFAULT_MODE);
    run_until(k, pid);
    // 模拟 ecall 之后的 trap 上下文
    let pcb = k.current_mut();
    pcb.trap_context.sepc = 0x1_0008;
    pcb.trap_context.regs[reg::A0] = 220;
    (pid, k.current().pgdir)
}

fn thread_flags() -> usize {
    (CloneFlags::VM | CloneFlags::FS | CloneFlags::FILES | CloneFlags::SIGHAND | CloneFlags::THREAD)
        .bits()
}

#[test]
fn test_clone_fork() {
    let mut k = new_kernel();
    let (parent, pgdir) = start_user(&mut k);
    k.mm.write(pgdir, 0x2000, b"abc");
    k.current_mut().fd.entries[2].used = true;

    // 测试 1: 不带 CLONE_VM 时复制地址空间
    let child = k.do_clone(SIGCHLD, 0, 0, 0, 0).unwrap();
    let slot = slot_of(&k, child);
    let pcb = k.pcb(slot);
    assert_ne!(pcb.pgdir, pgdir);
    assert!(!pcb.shares_pgdir);
    assert_eq!(pcb.task_type, TaskType::UserProcess);
    assert_eq!(k.mm.read(pcb.pgdir, 0x2000, 3), Some(b"abc".to_vec()));

    // 测试 2: 子进程从同一位置返回 0
    assert_eq!(pcb.trap_context.sepc, 0x1_0008);
    assert_eq!(pcb.trap_context.regs[reg::A0], 0);
    assert_eq!(pcb.switch_context.ra, TRAP_RETURN as u64);
    assert_eq!(pcb.trap_context.satp, k.mm.satp(pcb.pgdir));

    // 测试 3: 父子关系、文件表和模式
    assert_eq!(pcb.mode, SpawnMode::EnterZombieOnExit);
    assert_eq!(pcb.fd.used_count(), 1);
    assert_eq!(k.parent_of(slot), Some(slot_of(&k, parent)));
    assert_eq!(k.queue_of(slot), Some(QueueId::Ready));
    assert_eq!(k.current().spawn_num, 1);

    // 测试 4: 子进程退出后页目录随回收释放
    let child_pgdir = k.pcb(slot).pgdir;
    run_until(&mut k, child);
    k.do_exit(0);
    run_until(&mut k, parent);
    assert!(matches!(k.do_wait4(child, 0), Ok(WaitStatus::Reaped { .. })));
    assert_eq!(k.mm.freed_pgdirs, vec![child_pgdir]);
    assert_queue_invariant(&k);
}

#[test]
fn test_clone_thread() {
    let mut k = new_kernel();
    let (_, pgdir) = start_user(&mut k);

    let flags = thread_flags()
        | (CloneFlags::SETTLS | CloneFlags::PARENT_SETTID | CloneFlags::CHILD_CLEARTID).bits();
    let tid = k.do_clone(flags, 0x3ff0_0000, 0x3000, 0x7000, 0x3100).unwrap();
    let slot = slot_of(&k, tid);

    // 测试 1: 共享页目录，使用调用者指定的栈和 TLS
    let pcb = k.pcb(slot);
    assert_eq!(pcb.pgdir, pgdir);
    assert!(pcb.shares_pgdir);
    assert_eq!(pcb.task_type, TaskType::UserThread);
    assert_eq!(pcb.mode, SpawnMode::AutoCleanupOnExit);
    assert_eq!(pcb.user_sp, 0x3ff0_0000);
    assert_eq!(pcb.trap_context.regs[reg::SP], 0x3ff0_0000);
    assert_eq!(pcb.trap_context.regs[reg::TP], 0x7000);
    assert_eq!(pcb.clear_child_tid, 0x3100);

    // 测试 2: PARENT_SETTID 写回 tid
    assert_eq!(k.mm.read_i32(pgdir, 0x3000), Some(tid));

    // 测试 3: 线程退出时清零 clear_child_tid，页目录保留
    k.mm.write(pgdir, 0x3100, &tid.to_ne_bytes());
    run_until(&mut k, tid);
    k.do_exit(0);
    assert_eq!(k.mm.read_i32(pgdir, 0x3100), Some(0));
    assert!(!k.is_allocated(slot));
    assert_eq!(k.mm.live_pgdirs, vec![pgdir]);
    assert_queue_invariant(&k);
}

#[test]
fn test_clone_child_settid() {
    let mut k = new_kernel();
    let (_, pgdir) = start_user(&mut k);

    // fork 语义下 CHILD_SETTID 写到子进程的地址空间
    let flags = SIGCHLD | CloneFlags::CHILD_SETTID.bits();
    let child = k.do_clone(flags, 0, 0, 0, 0x3200).unwrap();
    let child_pgdir = k.pcb(slot_of(&k, child)).pgdir;
    assert_eq!(k.mm.read_i32(child_pgdir, 0x3200), Some(child));
    assert_eq!(k.mm.read_i32(pgdir, 0x3200), None);
}

#[test]
fn test_shared_page_dir_handoff() {
    let mut k = new_kernel();
    let (owner, pgdir) = start_user(&mut k);
    let thread = k.do_clone(thread_flags(), 0, 0, 0, 0).unwrap();
    let t_slot = slot_of(&k, thread);

    // 测试 1: 拥有者先退出，页目录交给线程
    assert_eq!(k.getpid(), owner);
    k.do_exit(0);
    assert_eq!(k.getpid(), thread);
    assert!(!k.pcb(t_slot).shares_pgdir);
    assert_eq!(k.mm.live_pgdirs, vec![pgdir]);

    // 测试 2: 最后一个使用者退出时释放
    k.do_exit(0);
    assert!(k.mm.live_pgdirs.is_empty());
    assert_eq!(k.mm.freed_pgdirs, vec![pgdir]);
    assert_queue_invariant(&k);
}

#[test]
fn test_clone_invalid_flags() {
    let mut k = new_kernel();
    start_user(&mut k);
    let live = k.live_count();

    // 测试 1: THREAD 需要 SIGHAND
    let flags = (CloneFlags::VM | CloneFlags::THREAD).bits();
    assert_eq!(k.do_clone(flags, 0, 0, 0, 0), Err(SchedError::InvalidArgument));

    // 测试 2: SIGHAND 需要 VM
    let flags = CloneFlags::SIGHAND.bits();
    assert_eq!(k.do_clone(flags, 0, 0, 0, 0), Err(SchedError::InvalidArgument));

    // 测试 3: 未知标志位
    assert_eq!(k.do_clone(0x4000_0000, 0, 0, 0, 0), Err(SchedError::InvalidArgument));

    // 测试 4: 退出信号越界
    assert_eq!(k.do_clone(0xff, 0, 0, 0, 0), Err(SchedError::InvalidArgument));

    assert_eq!(k.live_count(), live);
    assert_queue_invariant(&k);
}

#[test]
fn test_clone_bad_tid_address() {
    let mut k = new_kernel();
    let (_, pgdir) = start_user(&mut k);
    let free = k.free_count();

    // tid 写回失败：子进程被回收，复制的页目录被释放
    let flags = SIGCHLD | CloneFlags::PARENT_SETTID.bits();
    assert_eq!(
        k.do_clone(flags, 0, BAD_ADDR, 0, 0),
        Err(SchedError::BadAddress)
    );
    assert_eq!(k.free_count(), free);
    assert_eq!(k.mm.live_pgdirs, vec![pgdir]);
    assert_eq!(k.mm.live_kernel_stacks.len(), 1);
    assert!(k.current().preempt_count.is_preemptible());
    assert_queue_invariant(&k);
}

#[test]
fn test_clone_pool_exhausted() {
    let mut k = new_kernel();
    let (parent, pgdir) = start_user(&mut k);
    while k.free_count() > 0 {
        spawn_user(&mut k, DEFAULT_MODE);
    }
    assert_eq!(k.live_count(), NUM_MAX_TASK);
    let pgdirs = k.mm.live_pgdirs.clone();
    let stacks = k.mm.live_kernel_stacks.len();

    // 测试 1: fork 语义，没有空闲槽位
    assert_eq!(
        k.do_clone(SIGCHLD, 0, 0, 0, 0),
        Err(SchedError::ResourceExhausted)
    );

    // 测试 2: 线程语义同样失败
    assert_eq!(
        k.do_clone(thread_flags(), 0, 0, 0, 0),
        Err(SchedError::ResourceExhausted)
    );

    // 没有泄漏页目录和内核栈，调用者继续运行
    assert_eq!(k.free_count() + k.live_count(), k.capacity());
    assert_eq!(k.mm.live_pgdirs, pgdirs);
    assert!(k.mm.live_pgdirs.contains(&pgdir));
    assert_eq!(k.mm.live_kernel_stacks.len(), stacks);
    assert_eq!(k.getpid(), parent);
    assert_eq!(k.current().spawn_num, (NUM_MAX_TASK - 1) as u32);
    assert!(k.current().preempt_count.is_preemptible());
    assert_queue_invariant(&k);
}

#[test]
fn test_clone_kernel_process() {
    let mut k = new_kernel();
    let a = spawn(&mut k, DEFAULT_MODE);
    run_until(&mut k, a);

    let child = k.do_clone(SIGCHLD, 0, 0, 0, 0).unwrap();
    let pcb = k.pcb(slot_of(&k, child));
    assert_eq!(pcb.task_type, TaskType::KernelProcess);
    assert_eq!(pcb.pgdir, KERNEL_PGDIR);
    assert!(k.mm.live_pgdirs.is_empty());
}
