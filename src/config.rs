//! 平台与张量形状常量
//!
//! 协处理器只有一个硬件版本, 所有地址和形状都在编译期确定

/// DMA 描述符区域物理基地址
pub const DMA_BASE: usize = 0x8800_0000;

/// 描述符区域跨度 (最后一个字段 stride 位于 0x60, 4 字节)
pub const DESCRIPTOR_SPAN: usize = 0x68;

/// UART0 (16550 兼容) 基地址
pub const UART0_BASE: usize = 0x1000_0000;

/// UART 寄存器间距 (字节寄存器按 4 字节对齐排布)
pub const UART_REG_STRIDE: usize = 4;

/// UART 输入时钟
pub const UART_CLOCK_HZ: u32 = 24_000_000;

/// 调试串口波特率
pub const UART_BAUD: u32 = 115_200;

/// mxstatus CSR 编号 (厂商自定义机器态寄存器)
pub const MXSTATUS_CSR: u16 = 0x7C0;

/// 协处理器使能位图, 写入 mxstatus
pub const MXSTATUS_ENABLE: usize = 0xC103_8100;

/// 张量缓冲区对齐要求
pub const TENSOR_ALIGN: usize = 64;

/// 描述符中每个输出元素的字节数
pub const DESCRIPTOR_ELEMENT_BYTES: usize = 16;

/// 描述符模式字 (硬件定义, 本层不解析)
pub const DEFAULT_MODE: u32 = 15;

// ============ 演示网络形状 ============

pub const INPUT_WIDTH: usize = 32;
pub const INPUT_HEIGHT: usize = 32;
pub const INPUT_CHANNELS: usize = 3;
pub const KERNEL_SIZE: usize = 3;
pub const STRIDE: usize = 1;
pub const OUT_CHANNELS: usize = 16;

pub const OUTPUT_WIDTH: usize = (INPUT_WIDTH - KERNEL_SIZE) / STRIDE + 1;
pub const OUTPUT_HEIGHT: usize = (INPUT_HEIGHT - KERNEL_SIZE) / STRIDE + 1;

pub const INPUT_BYTES: usize = INPUT_WIDTH * INPUT_HEIGHT * INPUT_CHANNELS;
pub const WEIGHT_BYTES: usize = KERNEL_SIZE * KERNEL_SIZE * OUT_CHANNELS;
pub const OUTPUT_BYTES: usize = OUTPUT_WIDTH * OUTPUT_HEIGHT * OUT_CHANNELS;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_shape() {
        assert_eq!(INPUT_BYTES, 32 * 32 * 3);
        assert_eq!(WEIGHT_BYTES, 3 * 3 * 16);
        assert_eq!(OUTPUT_BYTES, 30 * 30 * 16);
        assert_eq!(OUTPUT_BYTES / DESCRIPTOR_ELEMENT_BYTES, 900);
    }
}
