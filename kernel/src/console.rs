//! 控制台输出
//!
//! 本子系统没有自己的串口，输出经由内核注册的 sink 函数，未注册时丢弃。

use core::fmt::{self, Write};

use spin::Once;

static SINK: Once<fn(&str)> = Once::new();

/// 注册控制台输出函数，只有第一次注册生效
pub fn set_sink(sink: fn(&str)) {
    SINK.call_once(|| sink);
}

struct Stdout;

impl Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(sink) = SINK.get() {
            sink(s);
        }
        Ok(())
    }
}

pub fn print(args: fmt::Arguments<'_>) {
    // Stdout 本身不会失败
    let _ = Stdout.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?));
    }
}

#[macro_export]
macro_rules! println {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!(concat!($fmt, "\n") $(, $($arg)+)?));
    }
}
