//! DMA 描述符寄存器定义和操作
//!
//! 描述符是 MMIO 空间中一段固定偏移的记录, 描述一次流水线阶段的
//! 张量地址与形状。字段宽度和字节序与目标机原生表示一致。
//! 地址与尺寸是否和实际缓冲区一致由调用者保证, 不一致属于硬件未定义行为。

use core::ptr::{read_volatile, write_volatile};

use super::tensor::is_tensor_aligned;
use crate::config::{DEFAULT_MODE, DESCRIPTOR_ELEMENT_BYTES};

// ============ 描述符字段偏移 ============

/// 输入缓冲区地址 (8 字节)
pub const DESC_INPUT_ADDR: usize = 0x00;
/// 输出缓冲区地址 (8 字节)
pub const DESC_OUTPUT_ADDR: usize = 0x08;
/// 输出元素个数 (8 字节)
pub const DESC_OUTPUT_COUNT: usize = 0x10;
/// 模式字 (4 字节)
pub const DESC_MODE: usize = 0x18;
/// 保留字 (4 字节)
pub const DESC_RESERVED: usize = 0x20;
/// 输入宽度
pub const DESC_IN_WIDTH: usize = 0x40;
/// 输入高度
pub const DESC_IN_HEIGHT: usize = 0x48;
/// 输出通道数
pub const DESC_OUT_CHANNELS: usize = 0x50;
/// 卷积核尺寸
pub const DESC_KERNEL_SIZE: usize = 0x58;
/// 步长
pub const DESC_STRIDE: usize = 0x60;

/// 一个阶段的完整描述符内容
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorConfig {
    pub input_addr: u64,
    pub output_addr: u64,
    pub output_count: u64,
    pub mode: u32,
    pub in_width: u32,
    pub in_height: u32,
    pub out_channels: u32,
    pub kernel_size: u32,
    pub stride: u32,
}

/// 卷积层形状 (HWC 排布, valid 填充)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvShape {
    pub in_width: u32,
    pub in_height: u32,
    pub in_channels: u32,
    pub out_channels: u32,
    pub kernel_size: u32,
    pub stride: u32,
}

/// valid 填充下一维的输出长度; 核比输入大或步长为 0 时没有合法输出
fn out_extent(input: u32, kernel: u32, stride: u32) -> Option<u32> {
    input.checked_sub(kernel)?.checked_div(stride)?.checked_add(1)
}

impl ConvShape {
    pub fn out_width(&self) -> Option<u32> {
        out_extent(self.in_width, self.kernel_size, self.stride)
    }

    pub fn out_height(&self) -> Option<u32> {
        out_extent(self.in_height, self.kernel_size, self.stride)
    }

    pub const fn input_bytes(&self) -> usize {
        (self.in_width * self.in_height * self.in_channels) as usize
    }

    pub const fn weight_bytes(&self) -> usize {
        (self.kernel_size * self.kernel_size * self.out_channels) as usize
    }

    /// 输出张量字节数, 形状不合法或溢出时为 None
    pub fn output_bytes(&self) -> Option<usize> {
        let plane = (self.out_width()? as usize).checked_mul(self.out_height()? as usize)?;
        plane.checked_mul(self.out_channels as usize)
    }
}

impl DescriptorConfig {
    /// 按输入/输出缓冲区和层形状构造
    ///
    /// 输出元素个数 = 输出字节数 / 每元素字节数。
    /// 两个地址都必须满足张量对齐要求。
    pub fn new(input_addr: usize, output_addr: usize, output_bytes: usize, shape: &ConvShape) -> Self {
        debug_assert!(is_tensor_aligned(input_addr), "input tensor misaligned: {:#x}", input_addr);
        debug_assert!(is_tensor_aligned(output_addr), "output tensor misaligned: {:#x}", output_addr);
        DescriptorConfig {
            input_addr: input_addr as u64,
            output_addr: output_addr as u64,
            output_count: (output_bytes / DESCRIPTOR_ELEMENT_BYTES) as u64,
            mode: DEFAULT_MODE,
            in_width: shape.in_width,
            in_height: shape.in_height,
            out_channels: shape.out_channels,
            kernel_size: shape.kernel_size,
            stride: shape.stride,
        }
    }
}

/// 描述符区域访问器
///
/// 持有裸指针, 因此既不是 Send 也不是 Sync, 访问器只能留在创建它的执行流里
pub struct DmaDescriptor {
    base: *mut u8,
}

impl DmaDescriptor {
    /// 创建描述符访问器
    ///
    /// # Safety
    /// 调用者必须确保 base 指向有效且 8 字节对齐的描述符区域,
    /// 长度不小于 `config::DESCRIPTOR_SPAN`, 且同一区域同时只存在一个访问器
    pub const unsafe fn new(base: *mut u8) -> Self {
        Self { base }
    }

    #[inline]
    fn read32(&self, offset: usize) -> u32 {
        unsafe { read_volatile((self.base as usize + offset) as *const u32) }
    }

    #[inline]
    fn write32(&self, offset: usize, value: u32) {
        unsafe { write_volatile((self.base as usize + offset) as *mut u32, value) }
    }

    #[inline]
    fn read64(&self, offset: usize) -> u64 {
        unsafe { read_volatile((self.base as usize + offset) as *const u64) }
    }

    #[inline]
    fn write64(&self, offset: usize, value: u64) {
        unsafe { write_volatile((self.base as usize + offset) as *mut u64, value) }
    }

    pub fn set_input_addr(&self, addr: u64) {
        self.write64(DESC_INPUT_ADDR, addr);
    }

    pub fn input_addr(&self) -> u64 {
        self.read64(DESC_INPUT_ADDR)
    }

    pub fn set_output_addr(&self, addr: u64) {
        self.write64(DESC_OUTPUT_ADDR, addr);
    }

    pub fn output_addr(&self) -> u64 {
        self.read64(DESC_OUTPUT_ADDR)
    }

    pub fn set_output_count(&self, count: u64) {
        self.write64(DESC_OUTPUT_COUNT, count);
    }

    pub fn output_count(&self) -> u64 {
        self.read64(DESC_OUTPUT_COUNT)
    }

    pub fn set_mode(&self, mode: u32) {
        self.write32(DESC_MODE, mode);
    }

    pub fn mode(&self) -> u32 {
        self.read32(DESC_MODE)
    }

    pub fn clear_reserved(&self) {
        self.write32(DESC_RESERVED, 0);
    }

    pub fn reserved(&self) -> u32 {
        self.read32(DESC_RESERVED)
    }

    pub fn set_in_width(&self, width: u32) {
        self.write32(DESC_IN_WIDTH, width);
    }

    pub fn in_width(&self) -> u32 {
        self.read32(DESC_IN_WIDTH)
    }

    pub fn set_in_height(&self, height: u32) {
        self.write32(DESC_IN_HEIGHT, height);
    }

    pub fn in_height(&self) -> u32 {
        self.read32(DESC_IN_HEIGHT)
    }

    pub fn set_out_channels(&self, channels: u32) {
        self.write32(DESC_OUT_CHANNELS, channels);
    }

    pub fn out_channels(&self) -> u32 {
        self.read32(DESC_OUT_CHANNELS)
    }

    pub fn set_kernel_size(&self, size: u32) {
        self.write32(DESC_KERNEL_SIZE, size);
    }

    pub fn kernel_size(&self) -> u32 {
        self.read32(DESC_KERNEL_SIZE)
    }

    pub fn set_stride(&self, stride: u32) {
        self.write32(DESC_STRIDE, stride);
    }

    pub fn stride(&self) -> u32 {
        self.read32(DESC_STRIDE)
    }

    /// 写入整个描述符
    ///
    /// 顺序与硬件手册一致: 地址区, 模式/保留字, 形状区
    pub fn program(&self, cfg: &DescriptorConfig) {
        self.set_input_addr(cfg.input_addr);
        self.set_output_addr(cfg.output_addr);
        self.set_output_count(cfg.output_count);
        self.set_mode(cfg.mode);
        self.clear_reserved();

        self.set_in_width(cfg.in_width);
        self.set_in_height(cfg.in_height);
        self.set_out_channels(cfg.out_channels);
        self.set_kernel_size(cfg.kernel_size);
        self.set_stride(cfg.stride);
    }

    /// 读回当前描述符内容
    pub fn snapshot(&self) -> DescriptorConfig {
        DescriptorConfig {
            input_addr: self.input_addr(),
            output_addr: self.output_addr(),
            output_count: self.output_count(),
            mode: self.mode(),
            in_width: self.in_width(),
            in_height: self.in_height(),
            out_channels: self.out_channels(),
            kernel_size: self.kernel_size(),
            stride: self.stride(),
        }
    }
}
