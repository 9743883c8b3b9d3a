//! 宿主机场景测试
//!
//! 在模拟平台上驱动完整的调度核心：
//! - `MockArch`: 中断开关计数、可手动推进的时钟、记录上下文切换
//! - `MockMemory`: 按 (页目录, 地址) 存储字节的用户内存，可注入分配失败
//!
//! 模拟的 switch_to 会立即返回，所以"当前任务做了某事"就是在 `current`
//! 指向该任务时调用相应的内核函数。
//!
//! 运行测试：
//! ```bash
//! cargo test --package rvsched
//! ```

mod clone;
mod syscall;

use std::collections::BTreeMap;
use std::vec::Vec;

use crate::arch::{Arch, SwitchContext};
use crate::config::{KERNEL_STACK_SIZE, PAGE_SIZE};
use crate::mm::{LoadedImage, MemoryManager};
use crate::process::{Pid, SpawnMode, TaskInfo, TaskStatus, TaskType};
use crate::sched::{Kernel, QueueId, IDLE_SLOT, NR_TASK_SLOTS};
use crate::time::TimeSpec;

/// 新任务第一次被调度时的返回地址
pub const TRAP_RETURN: usize = 0xffff_ffc0_8000_1000;
/// 模拟 switch-out 保存的栈指针
const SAVED_SP: u64 = 0xffff_ffc0_8fff_f000;

pub const KERNEL_PGDIR: usize = 0x8020_0000;
const PGDIR_BASE: usize = 0x8100_0000;
const KSTACK_BASE: usize = 0x8400_0000;
pub const USER_STACK_TOP: usize = 0x4000_0000;
/// 这一段用户地址总是缺页
pub const BAD_ADDR: usize = 0xdead_0000;

pub type TestKernel = Kernel<MockArch, MockMemory>;

pub struct MockArch {
    pub ticks: u64,
    pub irq_enabled: bool,
    pub irq_disables: usize,
    pub switches: usize,
    pub wfi: usize,
    pub rtc: Option<TimeSpec>,
    /// 测试定时器回调记录的参数
    pub fired: Vec<usize>,
    /// 每次切换时被换下任务保存的 sp
    pub prev_sps: Vec<u64>,
}

impl MockArch {
    pub fn new() -> Self {
        Self {
            ticks: 0,
            irq_enabled: true,
            irq_disables: 0,
            switches: 0,
            wfi: 0,
            rtc: None,
            fired: Vec::new(),
            prev_sps: Vec::new(),
        }
    }
}

impl Arch for MockArch {
    fn irq_disable(&mut self) {
        self.irq_enabled = false;
        self.irq_disables += 1;
    }

    fn irq_enable(&mut self) {
        self.irq_enabled = true;
    }

    fn get_ticks(&self) -> u64 {
        self.ticks
    }

    fn realtime(&self) -> Option<TimeSpec> {
        self.rtc
    }

    fn trap_return_entry(&self) -> usize {
        TRAP_RETURN
    }

    unsafe fn switch_to(&mut self, prev: *mut SwitchContext, _next: *const SwitchContext) {
        assert!(!self.irq_enabled, "switch_to with interrupts enabled");
        self.switches += 1;
        // __switch_to 把 ra/sp 保存到 prev
        unsafe {
            self.prev_sps.push((*prev).sp);
            if (*prev).sp == 0 {
                (*prev).sp = SAVED_SP;
                (*prev).ra = SAVED_SP;
            }
        }
    }

    fn wait_for_interrupt(&mut self) {
        self.wfi += 1;
        self.irq_enabled = true;
    }
}

pub struct MockMemory {
    next_pgdir: usize,
    next_kstack: usize,
    pub live_pgdirs: Vec<usize>,
    pub freed_pgdirs: Vec<usize>,
    pub live_kernel_stacks: Vec<usize>,
    memory: BTreeMap<(usize, usize), u8>,
    programs: Vec<(&'static str, LoadedImage)>,
    pub fail_page_dir: bool,
    pub fail_kernel_stack: bool,
    pub fail_user_stack: bool,
}

impl MockMemory {
    pub fn new() -> Self {
        Self {
            next_pgdir: PGDIR_BASE,
            next_kstack: KSTACK_BASE,
            live_pgdirs: Vec::new(),
            freed_pgdirs: Vec::new(),
            live_kernel_stacks: Vec::new(),
            memory: BTreeMap::new(),
            programs: Vec::new(),
            fail_page_dir: false,
            fail_kernel_stack: false,
            fail_user_stack: false,
        }
    }

    pub fn add_program(&mut self, name: &'static str, entry: usize, edata: usize) {
        self.programs.push((name, LoadedImage { entry, edata }));
    }

    fn mapped(&self, pgdir: usize, addr: usize, len: usize) -> bool {
        let bad = BAD_ADDR..BAD_ADDR + 0x1_0000;
        addr != 0
            && !bad.contains(&addr)
            && !bad.contains(&(addr + len.saturating_sub(1)))
            && (pgdir == KERNEL_PGDIR || self.live_pgdirs.contains(&pgdir))
    }

    /// 直接写用户内存 (模拟用户程序自己写入)
    pub fn write(&mut self, pgdir: usize, addr: usize, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            self.memory.insert((pgdir, addr + i), b);
        }
    }

    pub fn read(&self, pgdir: usize, addr: usize, len: usize) -> Option<Vec<u8>> {
        (0..len)
            .map(|i| self.memory.get(&(pgdir, addr + i)).copied())
            .collect()
    }

    pub fn read_i32(&self, pgdir: usize, addr: usize) -> Option<i32> {
        let b = self.read(pgdir, addr, 4)?;
        Some(i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&self, pgdir: usize, addr: usize) -> Option<u64> {
        let b = self.read(pgdir, addr, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&b);
        Some(u64::from_ne_bytes(raw))
    }

    /// 读取以 0 结尾的字符串
    pub fn read_str(&self, pgdir: usize, addr: usize) -> Option<std::string::String> {
        let mut out = Vec::new();
        for i in 0..256 {
            match self.memory.get(&(pgdir, addr + i)) {
                Some(0) => return std::string::String::from_utf8(out).ok(),
                Some(&b) => out.push(b),
                None => return None,
            }
        }
        None
    }

    fn new_pgdir(&mut self) -> usize {
        let pgdir = self.next_pgdir;
        self.next_pgdir += PAGE_SIZE;
        self.live_pgdirs.push(pgdir);
        pgdir
    }
}

impl MemoryManager for MockMemory {
    fn kernel_page_dir(&self) -> usize {
        KERNEL_PGDIR
    }

    fn alloc_page_dir(&mut self) -> Option<usize> {
        if self.fail_page_dir {
            return None;
        }
        Some(self.new_pgdir())
    }

    fn fork_page_dir(&mut self, parent: usize) -> Option<usize> {
        if self.fail_page_dir {
            return None;
        }
        let child = self.new_pgdir();
        let copied: Vec<(usize, u8)> = self
            .memory
            .iter()
            .filter(|((p, _), _)| *p == parent)
            .map(|((_, addr), b)| (*addr, *b))
            .collect();
        for (addr, b) in copied {
            self.memory.insert((child, addr), b);
        }
        Some(child)
    }

    fn free_page_dir(&mut self, pgdir: usize) {
        let pos = self
            .live_pgdirs
            .iter()
            .position(|&p| p == pgdir)
            .unwrap_or_else(|| panic!("page dir {:#x} freed twice", pgdir));
        self.live_pgdirs.remove(pos);
        self.freed_pgdirs.push(pgdir);
        self.memory.retain(|(p, _), _| *p != pgdir);
    }

    fn alloc_kernel_stack(&mut self) -> Option<usize> {
        if self.fail_kernel_stack {
            return None;
        }
        self.next_kstack += KERNEL_STACK_SIZE;
        let top = self.next_kstack;
        self.live_kernel_stacks.push(top);
        Some(top)
    }

    fn free_kernel_stack(&mut self, stack_top: usize) {
        let pos = self
            .live_kernel_stacks
            .iter()
            .position(|&t| t == stack_top)
            .unwrap_or_else(|| panic!("kernel stack {:#x} freed twice", stack_top));
        self.live_kernel_stacks.remove(pos);
    }

    fn alloc_user_stack(&mut self, _pgdir: usize) -> Option<usize> {
        if self.fail_user_stack {
            return None;
        }
        Some(USER_STACK_TOP)
    }

    fn copy_to_user(&mut self, pgdir: usize, dst: usize, src: &[u8]) -> bool {
        if !self.mapped(pgdir, dst, src.len()) {
            return false;
        }
        self.write(pgdir, dst, src);
        true
    }

    fn copy_from_user(&mut self, pgdir: usize, src: usize, dst: &mut [u8]) -> bool {
        if !self.mapped(pgdir, src, dst.len()) {
            return false;
        }
        match self.read(pgdir, src, dst.len()) {
            Some(bytes) => {
                dst.copy_from_slice(&bytes);
                true
            }
            None => false,
        }
    }

    fn load_program(&mut self, _pgdir: usize, name: &str) -> Option<LoadedImage> {
        self.programs
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, image)| *image)
    }
}

// ---- 辅助函数 ----

pub fn new_kernel() -> TestKernel {
    Kernel::new(MockArch::new(), MockMemory::new())
}

pub fn kernel_task(entry: usize) -> TaskInfo {
    TaskInfo {
        entry_point: entry,
        task_type: TaskType::KernelProcess,
    }
}

pub fn user_task(entry: usize) -> TaskInfo {
    TaskInfo {
        entry_point: entry,
        task_type: TaskType::UserProcess,
    }
}

/// 当前任务创建一个内核进程
pub fn spawn(k: &mut TestKernel, mode: SpawnMode) -> Pid {
    k.spawn(&kernel_task(0x8020_2000), 0, mode)
        .expect("spawn failed")
}

/// 当前任务创建一个用户进程
pub fn spawn_user(k: &mut TestKernel, mode: SpawnMode) -> Pid {
    k.spawn(&user_task(0x1_0000), 0, mode).expect("spawn failed")
}

pub fn slot_of(k: &TestKernel, pid: Pid) -> usize {
    k.find_pid(pid)
        .unwrap_or_else(|| panic!("pid {} not found", pid))
}

/// 反复调度直到 `pid` 成为当前任务
pub fn run_until(k: &mut TestKernel, pid: Pid) {
    for _ in 0..NR_TASK_SLOTS * 4 {
        if k.getpid() == pid {
            return;
        }
        k.do_scheduler();
    }
    panic!("pid {} never scheduled", pid);
}

/// 每个槽位恰好处于一个队列 (或者正在运行)，且状态与队列一致
pub fn assert_queue_invariant(k: &TestKernel) {
    let cur = k.current_slot();
    for slot in 0..NR_TASK_SLOTS {
        let queue = k.queue_of(slot);
        if !k.is_allocated(slot) {
            assert_eq!(queue, Some(QueueId::Free), "free slot {} off the free queue", slot);
            continue;
        }
        let pcb = k.pcb(slot);
        match pcb.status {
            TaskStatus::Running => {
                assert_eq!(slot, cur, "pid {} running but not current", pcb.pid);
                assert_eq!(queue, None, "running pid {} still queued", pcb.pid);
            }
            TaskStatus::Ready if slot == IDLE_SLOT => assert_eq!(queue, None),
            TaskStatus::Ready => assert_eq!(queue, Some(QueueId::Ready), "pid {}", pcb.pid),
            TaskStatus::Blocked => assert!(
                queue.is_some_and(|q| q.is_blocking()),
                "blocked pid {} on {:?}",
                pcb.pid,
                queue
            ),
            TaskStatus::Zombie => assert!(
                queue == Some(QueueId::Zombie) || slot == cur,
                "zombie pid {} on {:?}",
                pcb.pid,
                queue
            ),
            TaskStatus::Exited => {
                assert_eq!(slot, cur, "exited pid {} not reclaimed", pcb.pid);
                assert_eq!(queue, None);
            }
        }
    }
    assert_eq!(k.free_count() + k.live_count(), k.capacity());
}
