//! 控制台输出
//!
//! 字节输出由平台注册 (`set_console`)，riscv64 上是 SBI 控制台。
//! 没有注册时输出被丢弃。

use core::fmt;
use spin::Mutex;

/// 控制台字节输出函数
pub type ConsoleSink = fn(u8);

static SINK: Mutex<Option<ConsoleSink>> = Mutex::new(None);

/// 注册控制台输出
pub fn set_console(sink: ConsoleSink) {
    *SINK.lock() = Some(sink);
}

pub struct Console;

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        let sink = *SINK.lock();
        if let Some(putchar) = sink {
            for b in s.bytes() {
                if b == b'\n' {
                    putchar(b'\r');
                }
                putchar(b);
            }
        }
        Ok(())
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    let _ = fmt::Write::write_fmt(&mut Console, args);
}

#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ({
        $crate::print::_print(::core::format_args!($($arg)*));
    });
}

#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ({
        $crate::print::_print(::core::format_args!("{}\n", ::core::format_args!($($arg)*)));
    });
}
