//! UART驱动 (调试输出)
//!
//! 16550 兼容串口, 寄存器按 `UART_REG_STRIDE` 间距排布
//! 仅用于打印进度和校验和, 不参与协处理器协议

use core::fmt;
use core::ptr::{read_volatile, write_volatile};

use crate::config::{UART0_BASE, UART_BAUD, UART_CLOCK_HZ, UART_REG_STRIDE};

/// UART寄存器索引 (乘以寄存器间距得到偏移)
const UART_THR: usize = 0; // 发送保存寄存器
const UART_DLL: usize = 0; // 除数锁存器低字节
const UART_DLM: usize = 1; // 除数锁存器高字节
const UART_FCR: usize = 2; // FIFO控制寄存器
const UART_LCR: usize = 3; // 线控制寄存器
const UART_MCR: usize = 4; // 调制解调器控制寄存器
const UART_LSR: usize = 5; // 线状态寄存器

/// LSR: 发送保持寄存器空
const LSR_THR_EMPTY: u8 = 0x20;

pub struct Uart {
    base: usize,
    stride: usize,
}

impl Uart {
    /// 创建新的UART实例
    pub const fn new(base: usize, stride: usize) -> Self {
        Uart { base, stride }
    }

    #[inline]
    fn reg(&self, index: usize) -> *mut u8 {
        (self.base + index * self.stride) as *mut u8
    }

    /// 波特率除数 (UART_CLK / (16 * baud), 四舍五入)
    pub const fn divisor(clock_hz: u32, baud: u32) -> u16 {
        ((clock_hz + 8 * baud) / (16 * baud)) as u16
    }

    /// 初始化UART
    ///
    /// 配置: 8 数据位, 1 停止位, 无校验, FIFO 使能
    pub fn init(&self, clock_hz: u32, baud: u32) {
        let div = Self::divisor(clock_hz, baud);
        unsafe {
            // 置 DLAB 以访问 DLL/DLM
            write_volatile(self.reg(UART_LCR), 0x83);
            write_volatile(self.reg(UART_DLL), (div & 0xFF) as u8);
            write_volatile(self.reg(UART_DLM), (div >> 8) as u8);
            // 8N1, DLAB=0
            write_volatile(self.reg(UART_LCR), 0x03);
            // 使能并清空 FIFO
            write_volatile(self.reg(UART_FCR), 0x07);
            // DTR
            write_volatile(self.reg(UART_MCR), 0x01);
        }
    }

    /// 写入一个字节
    pub fn put_char(&self, c: u8) {
        unsafe {
            while read_volatile(self.reg(UART_LSR)) & LSR_THR_EMPTY == 0 {
                core::hint::spin_loop();
            }
            write_volatile(self.reg(UART_THR), c);
        }
    }

    /// 写入一个字符串
    pub fn puts(&self, s: &str) {
        for c in s.bytes() {
            if c == b'\n' {
                self.put_char(b'\r');
            }
            self.put_char(c);
        }
    }
}

impl fmt::Write for Uart {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.puts(s);
        Ok(())
    }
}

/// 全局UART实例
use lazy_static::lazy_static;

lazy_static! {
    pub static ref UART: spin::Mutex<Uart> =
        spin::Mutex::new(Uart::new(UART0_BASE, UART_REG_STRIDE));
}

/// 初始化UART
pub fn uart_init() {
    UART.lock().init(UART_CLOCK_HZ, UART_BAUD);
}

#[doc(hidden)]
#[cfg(target_os = "none")]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write;
    let _ = UART.lock().write_fmt(args);
}

/// 宿主机构建直接走标准输出, 不触碰串口寄存器
#[doc(hidden)]
#[cfg(not(target_os = "none"))]
pub fn _print(args: fmt::Arguments) {
    std::print!("{}", args);
}

/// 打印宏 (类似println!)
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => {
        $crate::drivers::uart::_print(format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! println {
    () => { $crate::print!("\n") };
    ($($arg:tt)*) => {
        {
            $crate::print!($($arg)*);
            $crate::print!("\n");
        }
    };
}
