//! 内核日志
//!
//! `log` crate 的后端，输出到控制台。级别来自 Kernel.toml 的
//! `[debug] log_level`，开启 `debug_log` feature 时强制为 trace。

use log::{LevelFilter, Log, Metadata, Record};

use crate::config::LOG_LEVEL;

pub struct KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            crate::println!("[{:5}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: KernelLogger = KernelLogger;

/// 解析配置中的日志级别，无法识别时为 info
pub fn level_from_str(level: &str) -> LevelFilter {
    match level {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// 配置的日志级别
pub fn configured_level() -> LevelFilter {
    if cfg!(feature = "debug_log") {
        LevelFilter::Trace
    } else {
        level_from_str(LOG_LEVEL)
    }
}

/// 安装日志后端；重复调用只调整级别
///
/// 返回这次调用是否真正安装了后端
pub fn init(level: LevelFilter) -> bool {
    let installed = match log::set_logger(&LOGGER) {
        Ok(()) => true,
        Err(_) => false,
    };
    log::set_max_level(level);
    if !installed {
        log::trace!("logging: logger already installed, level set to {}", level);
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_str() {
        assert_eq!(level_from_str("debug"), LevelFilter::Debug);
        assert_eq!(level_from_str("off"), LevelFilter::Off);
        assert_eq!(level_from_str("bogus"), LevelFilter::Info);
    }

    #[test]
    fn test_init_twice_only_adjusts_level() {
        init(LevelFilter::Info);
        assert!(!init(LevelFilter::Warn));
        assert_eq!(log::max_level(), LevelFilter::Warn);
    }
}
