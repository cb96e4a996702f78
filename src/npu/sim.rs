//! 软件协处理器模型
//!
//! 在宿主机上实现 [`Coprocessor`], 按与硬件相同的约定读取 DMA 描述符:
//! 指针来自寄存器操作数, 形状和输出位置来自描述符。
//!
//! 运算约定 (HWC 排布, valid 填充):
//! - conv2d: 每个输出通道一个 k*k 核, 对所有输入通道求和, 结果 `min(acc >> 8, 255)`
//! - maxpool2d: 窗口 = kernel_size, 步长 = stride, 通道数取 out_channels
//! - activate: 最高位为 1 (按 int8 视为负数) 的字节清零
//!
//! 输入通道数不在描述符中, 由构造参数给出。
//! 可以为某类操作强制指定返回状态, 用于故障注入; 被强制的调用不会写输出。

use core::ptr::{read_volatile, write_volatile};

use super::descriptor::{DescriptorConfig, DmaDescriptor};
use super::insn::{CopFunct, Coprocessor, OpParams, Status};
use crate::config::DESCRIPTOR_ELEMENT_BYTES;

/// 未执行使能序列就发出指令
pub const SIM_STATUS_NOT_ENABLED: usize = 0xE0;
/// 描述符形状无法计算 (核为 0, 步长为 0 或核大于输入)
pub const SIM_STATUS_BAD_SHAPE: usize = 0xE1;

pub struct SimCop<'d> {
    descriptor: &'d DmaDescriptor,
    in_channels: u32,
    enable_count: u32,
    forced: [Option<Status>; 3],
    calls: Vec<CopFunct>,
}

/// 由描述符推出的输出平面尺寸
struct Plane {
    width: usize,
    height: usize,
    channels: usize,
}

impl<'d> SimCop<'d> {
    pub fn new(descriptor: &'d DmaDescriptor, in_channels: u32) -> Self {
        SimCop {
            descriptor,
            in_channels,
            enable_count: 0,
            forced: [None; 3],
            calls: Vec::new(),
        }
    }

    /// 让某类操作返回固定状态
    pub fn force_status(&mut self, funct: CopFunct, status: Status) {
        self.forced[Self::slot(funct)] = Some(status);
    }

    pub fn clear_forced(&mut self) {
        self.forced = [None; 3];
    }

    /// 已发出的指令序列
    pub fn calls(&self) -> &[CopFunct] {
        &self.calls
    }

    pub fn enable_count(&self) -> u32 {
        self.enable_count
    }

    pub fn is_enabled(&self) -> bool {
        self.enable_count > 0
    }

    fn slot(funct: CopFunct) -> usize {
        funct as usize - 1
    }

    /// 公共入口检查: 记录调用, 处理未使能与强制状态
    fn precheck(&mut self, funct: CopFunct) -> Option<Status> {
        self.calls.push(funct);
        if !self.is_enabled() {
            return Some(Status(SIM_STATUS_NOT_ENABLED));
        }
        self.forced[Self::slot(funct)]
    }

    fn plane(desc: &DescriptorConfig) -> Option<Plane> {
        let k = desc.kernel_size as usize;
        let s = desc.stride as usize;
        let w = desc.in_width as usize;
        let h = desc.in_height as usize;
        if k == 0 || s == 0 || k > w || k > h {
            return None;
        }
        Some(Plane {
            width: (w - k) / s + 1,
            height: (h - k) / s + 1,
            channels: desc.out_channels as usize,
        })
    }

    /// 描述符允许写入的字节上限
    fn output_limit(desc: &DescriptorConfig) -> usize {
        desc.output_count as usize * DESCRIPTOR_ELEMENT_BYTES
    }
}

#[inline]
fn load(addr: usize, index: usize) -> u8 {
    unsafe { read_volatile((addr + index) as *const u8) }
}

#[inline]
fn store(addr: usize, index: usize, value: u8) {
    unsafe { write_volatile((addr + index) as *mut u8, value) }
}

impl Coprocessor for SimCop<'_> {
    fn enable(&mut self) {
        self.enable_count += 1;
    }

    fn conv2d(&mut self, input: usize, weights: usize, _params: OpParams) -> Status {
        if let Some(status) = self.precheck(CopFunct::Conv2d) {
            return status;
        }
        let desc = self.descriptor.snapshot();
        let Some(out) = Self::plane(&desc) else {
            return Status(SIM_STATUS_BAD_SHAPE);
        };

        let k = desc.kernel_size as usize;
        let s = desc.stride as usize;
        let in_w = desc.in_width as usize;
        let in_c = self.in_channels as usize;
        let output = desc.output_addr as usize;
        let limit = Self::output_limit(&desc);

        for oy in 0..out.height {
            for ox in 0..out.width {
                for oc in 0..out.channels {
                    let index = (oy * out.width + ox) * out.channels + oc;
                    if index >= limit {
                        return Status::SUCCESS;
                    }
                    let mut acc: u32 = 0;
                    for ky in 0..k {
                        for kx in 0..k {
                            let w = load(weights, (ky * k + kx) * out.channels + oc) as u32;
                            let pixel = ((oy * s + ky) * in_w + (ox * s + kx)) * in_c;
                            for ic in 0..in_c {
                                acc = acc.wrapping_add(load(input, pixel + ic) as u32 * w);
                            }
                        }
                    }
                    store(output, index, (acc >> 8).min(255) as u8);
                }
            }
        }
        Status::SUCCESS
    }

    fn maxpool2d(&mut self, input: usize, _params: OpParams) -> Status {
        if let Some(status) = self.precheck(CopFunct::MaxPool2d) {
            return status;
        }
        let desc = self.descriptor.snapshot();
        let Some(out) = Self::plane(&desc) else {
            return Status(SIM_STATUS_BAD_SHAPE);
        };

        let k = desc.kernel_size as usize;
        let s = desc.stride as usize;
        let in_w = desc.in_width as usize;
        let output = desc.output_addr as usize;
        let limit = Self::output_limit(&desc);

        for oy in 0..out.height {
            for ox in 0..out.width {
                for c in 0..out.channels {
                    let index = (oy * out.width + ox) * out.channels + c;
                    if index >= limit {
                        return Status::SUCCESS;
                    }
                    let mut max = 0u8;
                    for ky in 0..k {
                        for kx in 0..k {
                            let at = ((oy * s + ky) * in_w + (ox * s + kx)) * out.channels + c;
                            max = max.max(load(input, at));
                        }
                    }
                    store(output, index, max);
                }
            }
        }
        Status::SUCCESS
    }

    fn activate(&mut self, input: usize, _params: OpParams) -> Status {
        if let Some(status) = self.precheck(CopFunct::Activate) {
            return status;
        }
        let desc = self.descriptor.snapshot();
        let output = desc.output_addr as usize;
        for i in 0..Self::output_limit(&desc) {
            let v = load(input, i);
            store(output, i, if v & 0x80 != 0 { 0 } else { v });
        }
        Status::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DESCRIPTOR_SPAN;
    use crate::npu::descriptor::ConvShape;
    use crate::npu::tensor::TensorBuffer;

    #[repr(C, align(8))]
    struct Region([u8; DESCRIPTOR_SPAN]);

    const TINY: ConvShape = ConvShape {
        in_width: 4,
        in_height: 4,
        in_channels: 1,
        out_channels: 16,
        kernel_size: 3,
        stride: 1,
    };

    #[test]
    fn test_not_enabled() {
        let mut region = Region([0; DESCRIPTOR_SPAN]);
        let desc = unsafe { DmaDescriptor::new(region.0.as_mut_ptr()) };
        let mut sim = SimCop::new(&desc, 1);
        assert_eq!(sim.activate(0, OpParams::default()), Status(SIM_STATUS_NOT_ENABLED));
        assert_eq!(sim.calls(), &[CopFunct::Activate]);
    }

    #[test]
    fn test_bad_shape() {
        let mut region = Region([0; DESCRIPTOR_SPAN]);
        let desc = unsafe { DmaDescriptor::new(region.0.as_mut_ptr()) };
        let mut sim = SimCop::new(&desc, 1);
        sim.enable();
        // 描述符全零, 核尺寸为 0
        assert_eq!(sim.conv2d(0, 0, OpParams::default()), Status(SIM_STATUS_BAD_SHAPE));
    }

    #[test]
    fn test_conv2d_reference() {
        let mut region = Region([0; DESCRIPTOR_SPAN]);
        let desc = unsafe { DmaDescriptor::new(region.0.as_mut_ptr()) };
        let mut input = TensorBuffer::<16>::zeroed();
        let mut weights = TensorBuffer::<144>::zeroed();
        let mut output = TensorBuffer::<64>::zeroed();
        input.fill_with(|_| 16);
        // 通道 0 权重全 2, 通道 1 权重全 255, 其余为 0
        weights.fill_with(|i| match i % 16 {
            0 => 2,
            1 => 255,
            _ => 0,
        });

        desc.program(&DescriptorConfig::new(
            input.addr(),
            output.as_mut_ptr() as usize,
            TINY.output_bytes().unwrap(),
            &TINY,
        ));
        let mut sim = SimCop::new(&desc, 1);
        sim.enable();
        assert_eq!(sim.conv2d(input.addr(), weights.addr(), OpParams::default()), Status::SUCCESS);

        // 9 * 16 * 2 = 288, >> 8 = 1
        assert_eq!(output.read(0), 1);
        // 9 * 16 * 255 = 36720, >> 8 = 143
        assert_eq!(output.read(1), 143);
        assert_eq!(output.read(2), 0);
        // 第二个输出像素
        assert_eq!(output.read(16), 1);
    }

    #[test]
    fn test_activate_clears_negative() {
        let mut region = Region([0; DESCRIPTOR_SPAN]);
        let desc = unsafe { DmaDescriptor::new(region.0.as_mut_ptr()) };
        let mut buf = TensorBuffer::<32>::zeroed();
        buf.fill_with(|i| (i * 8) as u8);
        desc.set_output_addr(buf.as_mut_ptr() as u64);
        desc.set_output_count(2);

        let mut sim = SimCop::new(&desc, 1);
        sim.enable();
        assert_eq!(sim.activate(buf.addr(), OpParams::default()), Status::SUCCESS);
        assert_eq!(buf.read(15), 120);
        assert_eq!(buf.read(16), 0);
        assert_eq!(buf.read(31), 0);
    }

    #[test]
    fn test_maxpool() {
        let mut region = Region([0; DESCRIPTOR_SPAN]);
        let desc = unsafe { DmaDescriptor::new(region.0.as_mut_ptr()) };
        // 4x4 单像素 16 通道, 2x2 窗口步长 2 -> 2x2
        let shape = ConvShape {
            in_width: 4,
            in_height: 4,
            in_channels: 16,
            out_channels: 16,
            kernel_size: 2,
            stride: 2,
        };
        let mut input = TensorBuffer::<256>::zeroed();
        let mut output = TensorBuffer::<64>::zeroed();
        input.fill_with(|i| (i / 16) as u8);
        desc.program(&DescriptorConfig::new(
            input.addr(),
            output.as_mut_ptr() as usize,
            shape.output_bytes().unwrap(),
            &shape,
        ));

        let mut sim = SimCop::new(&desc, 16);
        sim.enable();
        assert_eq!(sim.maxpool2d(input.addr(), OpParams::default()), Status::SUCCESS);
        // 左上窗口像素下标 0,1,4,5
        assert_eq!(output.read(0), 5);
        // 右下窗口像素下标 10,11,14,15
        assert_eq!(output.read(63), 15);
    }

    #[test]
    fn test_forced_status_skips_output() {
        let mut region = Region([0; DESCRIPTOR_SPAN]);
        let desc = unsafe { DmaDescriptor::new(region.0.as_mut_ptr()) };
        let mut buf = TensorBuffer::<16>::zeroed();
        buf.fill_with(|_| 0xF0);
        desc.set_output_addr(buf.as_mut_ptr() as u64);
        desc.set_output_count(1);

        let mut sim = SimCop::new(&desc, 1);
        sim.enable();
        sim.force_status(CopFunct::Activate, Status(9));
        assert_eq!(sim.activate(buf.addr(), OpParams::default()), Status(9));
        assert_eq!(buf.read(0), 0xF0);

        sim.clear_forced();
        assert_eq!(sim.activate(buf.addr(), OpParams::default()), Status::SUCCESS);
        assert_eq!(buf.read(0), 0);
    }
}
