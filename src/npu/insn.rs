//! 协处理器指令接口
//!
//! 三条自定义 R 型指令 (custom-1 主操作码):
//!
//! ```text
//!  31      25 24   20 19   15 14  12 11    7 6       0
//! | funct7=0 |  rs2  |  rs1  |funct3|  rd   | 0101011 |
//! ```
//!
//! funct3 选择操作: 1 = conv2d, 2 = maxpool2d, 3 = activate。
//! 输入指针固定放在 a0 (rs1) / a1 (rs2), 状态码由 rd (同样为 a0) 返回。
//! 指令同步执行, 协处理器写回状态码后才退休, 所以这里没有等待完成的步骤。
//! 除指针外的参数一律经由 DMA 描述符传递, 指令编码里没有空位。

use core::fmt;
use core::num::NonZeroUsize;

/// custom-1 主操作码
pub const OPCODE_CUSTOM1: u32 = 0x2B;

/// 整数寄存器编号
pub const REG_ZERO: u32 = 0;
pub const REG_A0: u32 = 10;
pub const REG_A1: u32 = 11;

/// 协处理器操作类别 (funct3)
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopFunct {
    Conv2d = 1,
    MaxPool2d = 2,
    Activate = 3,
}

impl fmt::Display for CopFunct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CopFunct::Conv2d => write!(f, "conv"),
            CopFunct::MaxPool2d => write!(f, "maxpool"),
            CopFunct::Activate => write!(f, "act"),
        }
    }
}

/// 组装一条 R 型指令字
pub const fn encode_r(opcode: u32, funct3: u32, funct7: u32, rd: u32, rs1: u32, rs2: u32) -> u32 {
    ((funct7 & 0x7F) << 25)
        | ((rs2 & 0x1F) << 20)
        | ((rs1 & 0x1F) << 15)
        | ((funct3 & 0x7) << 12)
        | ((rd & 0x1F) << 7)
        | (opcode & 0x7F)
}

/// 某个操作对应的完整指令字
pub const fn encode(funct: CopFunct) -> u32 {
    let rs2 = match funct {
        CopFunct::Conv2d => REG_A1,
        CopFunct::MaxPool2d | CopFunct::Activate => REG_ZERO,
    };
    encode_r(OPCODE_CUSTOM1, funct as u32, 0, REG_A0, REG_A0, rs2)
}

pub const CONV2D_WORD: u32 = encode(CopFunct::Conv2d);
pub const MAXPOOL2D_WORD: u32 = encode(CopFunct::MaxPool2d);
pub const ACTIVATE_WORD: u32 = encode(CopFunct::Activate);

/// 预留的调用参数
///
/// 当前硬件版本不读取它, 既不进入指令编码也不写入描述符
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpParams(pub u32);

/// 协处理器硬件错误码 (非零, 本层不做进一步解析)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwError(NonZeroUsize);

impl HwError {
    pub fn code(&self) -> usize {
        self.0.get()
    }
}

impl fmt::Display for HwError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 结果寄存器中的原始状态码, 0 表示成功
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub usize);

impl Status {
    pub const SUCCESS: Status = Status(0);

    pub fn is_success(&self) -> bool {
        self.0 == 0
    }

    pub fn into_result(self) -> Result<(), HwError> {
        match NonZeroUsize::new(self.0) {
            None => Ok(()),
            Some(code) => Err(HwError(code)),
        }
    }
}

/// 协处理器调用约定
///
/// 地址参数必须已经是协处理器可直接访问的物理地址, 本层不做地址转换。
/// 调用在返回前阻塞, 无超时。
pub trait Coprocessor {
    /// 特权使能序列, 必须先于任何调用执行; 重复执行无副作用
    fn enable(&mut self);

    fn conv2d(&mut self, input: usize, weights: usize, params: OpParams) -> Status;

    fn maxpool2d(&mut self, input: usize, params: OpParams) -> Status;

    fn activate(&mut self, input: usize, params: OpParams) -> Status;
}

/// 真实硬件上的协处理器
#[cfg(target_arch = "riscv64")]
pub struct XtCop {
    _private: (),
}

#[cfg(target_arch = "riscv64")]
impl XtCop {
    /// # Safety
    /// 必须在实现了该协处理器的核上以机器态运行
    pub const unsafe fn new() -> Self {
        XtCop { _private: () }
    }
}

#[cfg(target_arch = "riscv64")]
impl Coprocessor for XtCop {
    fn enable(&mut self) {
        unsafe { crate::hal::csr::enable_coprocessor() }
    }

    #[inline]
    fn conv2d(&mut self, input: usize, weights: usize, _params: OpParams) -> Status {
        let status: usize;
        unsafe {
            core::arch::asm!(
                ".word {word}",
                word = const CONV2D_WORD,
                inlateout("a0") input => status,
                in("a1") weights,
                options(nostack),
            );
        }
        Status(status)
    }

    #[inline]
    fn maxpool2d(&mut self, input: usize, _params: OpParams) -> Status {
        let status: usize;
        unsafe {
            core::arch::asm!(
                ".word {word}",
                word = const MAXPOOL2D_WORD,
                inlateout("a0") input => status,
                options(nostack),
            );
        }
        Status(status)
    }

    #[inline]
    fn activate(&mut self, input: usize, _params: OpParams) -> Status {
        let status: usize;
        unsafe {
            core::arch::asm!(
                ".word {word}",
                word = const ACTIVATE_WORD,
                inlateout("a0") input => status,
                options(nostack),
            );
        }
        Status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_words() {
        // .insn r 0x2b, 1, 0, a0, a0, a1
        assert_eq!(CONV2D_WORD, 0x00B5_152B);
        // .insn r 0x2b, 2, 0, a0, a0, x0
        assert_eq!(MAXPOOL2D_WORD, 0x0005_252B);
        // .insn r 0x2b, 3, 0, a0, a0, x0
        assert_eq!(ACTIVATE_WORD, 0x0005_352B);
    }

    #[test]
    fn test_encode_fields() {
        let word = encode_r(OPCODE_CUSTOM1, 2, 0, 5, 6, 7);
        assert_eq!(word & 0x7F, OPCODE_CUSTOM1);
        assert_eq!((word >> 7) & 0x1F, 5);
        assert_eq!((word >> 12) & 0x7, 2);
        assert_eq!((word >> 15) & 0x1F, 6);
        assert_eq!((word >> 20) & 0x1F, 7);
        assert_eq!(word >> 25, 0);
    }

    #[test]
    fn test_encode_masks_fields() {
        // funct3 只有 3 位
        let word = encode_r(OPCODE_CUSTOM1, 0b1001, 0, 0, 0, 0);
        assert_eq!((word >> 12) & 0x7, 1);
        assert_eq!((word >> 15) & 0x1F, 0);
    }

    #[test]
    fn test_status() {
        assert!(Status::SUCCESS.is_success());
        assert_eq!(Status(0).into_result(), Ok(()));
        let err = Status(7).into_result().unwrap_err();
        assert_eq!(err.code(), 7);
    }
}
