//! rvsched 构建脚本
//!
//! 这个脚本在编译前运行，负责：
//! 1. 解析 Kernel.toml 配置文件
//! 2. 生成配置代码 (OUT_DIR/config.rs，由 src/config.rs include)
//!
//! 配置文件缺失或某个键缺失时使用默认值。

use std::env;
use std::fs;
use std::path::PathBuf;

fn get_int(config: &toml::Value, section: &str, key: &str, default: i64) -> i64 {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_integer())
        .unwrap_or(default)
}

fn get_str<'a>(config: &'a toml::Value, section: &str, key: &str, default: &'a str) -> &'a str {
    config
        .get(section)
        .and_then(|s| s.get(key))
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

fn main() {
    println!("cargo:rerun-if-changed=../Kernel.toml");
    println!("cargo:rerun-if-changed=build.rs");

    let config = match fs::read_to_string("../Kernel.toml") {
        Ok(content) => match toml::from_str::<toml::Value>(&content) {
            Ok(value) => value,
            Err(e) => {
                println!("cargo:warning=Kernel.toml parse error ({}), using defaults", e);
                toml::Value::Table(toml::map::Map::new())
            }
        },
        Err(_) => {
            println!("cargo:warning=Kernel.toml not found, using defaults");
            toml::Value::Table(toml::map::Map::new())
        }
    };

    let max_tasks = get_int(&config, "scheduler", "max_tasks", 16).max(1);
    let default_priority = get_int(&config, "scheduler", "default_priority", 1);
    let time_slice_ticks = get_int(&config, "scheduler", "time_slice_ticks", 10).max(1);
    let num_timers = get_int(&config, "timer", "num_timers", 32).max(1);
    let time_base = get_int(&config, "timer", "time_base", 10_000_000).max(1);
    let page_size = get_int(&config, "memory", "page_size", 4096);
    let kernel_stack_kb = get_int(&config, "memory", "kernel_stack_size", 4);
    let user_stack_kb = get_int(&config, "memory", "user_stack_size", 4);
    let num_fd = get_int(&config, "process", "num_fd", 16).max(3);
    let log_level = get_str(&config, "debug", "log_level", "info");
    let name = get_str(&config, "general", "name", "rvsched");
    let version = get_str(&config, "general", "version", "0.1.0");

    let config_code = format!(
        r#"// rvsched 配置（自动生成，请勿手动修改）

/// 内核名称
pub const KERNEL_NAME: &str = "{name}";

/// 内核版本
pub const KERNEL_VERSION: &str = "{version}";

/// 最大并发任务数 (不含 idle 任务)
pub const NUM_MAX_TASK: usize = {max_tasks};

/// 默认优先级
pub const DEFAULT_PRIORITY: i32 = {default_priority};

/// 时间片滴答数
pub const TIME_SLICE_TICKS: u32 = {time_slice_ticks};

/// 定时器池大小
pub const NUM_TIMER: usize = {num_timers};

/// 每秒滴答数
pub const DEFAULT_TIME_BASE: u64 = {time_base};

/// 页大小
pub const PAGE_SIZE: usize = {page_size};

/// 内核栈大小 (字节)
pub const KERNEL_STACK_SIZE: usize = {kernel_stack};

/// 用户栈大小 (字节)
pub const USER_STACK_SIZE: usize = {user_stack};

/// 文件描述符表大小
pub const NUM_FD: usize = {num_fd};

/// 默认日志级别
pub const LOG_LEVEL: &str = "{log_level}";
"#,
        kernel_stack = kernel_stack_kb * 1024,
        user_stack = user_stack_kb * 1024,
    );

    let out_dir = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR not set"));
    let config_file = out_dir.join("config.rs");

    // 只有内容变化时才写入，避免每次编译都更新文件时间戳
    let existing = fs::read_to_string(&config_file).unwrap_or_default();
    if existing != config_code {
        fs::write(&config_file, &config_code).expect("写入配置文件失败");
    }
}
