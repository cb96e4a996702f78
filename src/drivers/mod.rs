pub mod uart;

pub use uart::{uart_init, Uart, UART};
