//! 机器态控制寄存器操作
//!
//! 协处理器由厂商自定义 CSR `mxstatus` 打开, 只需写一次,
//! 重复写入同一位图不改变硬件状态。没有对应的关闭流程。

#[cfg(target_arch = "riscv64")]
use core::arch::asm;

use crate::config::MXSTATUS_ENABLE;
#[cfg(target_arch = "riscv64")]
use crate::config::MXSTATUS_CSR;

/// 写 mxstatus 打开协处理器
///
/// # Safety
/// 必须运行在机器态, 且目标核实现了 mxstatus
#[cfg(target_arch = "riscv64")]
#[inline]
pub unsafe fn enable_coprocessor() {
    asm!(
        "csrw {csr}, {value}",
        csr = const MXSTATUS_CSR,
        value = in(reg) MXSTATUS_ENABLE,
        options(nostack),
    );
}

/// 读回 mxstatus
///
/// # Safety
/// 同 [`enable_coprocessor`]
#[cfg(target_arch = "riscv64")]
#[inline]
pub unsafe fn read_mxstatus() -> usize {
    let value: usize;
    asm!(
        "csrr {value}, {csr}",
        csr = const MXSTATUS_CSR,
        value = out(reg) value,
        options(nomem, nostack),
    );
    value
}

/// 使能位图是否已全部置位
pub fn is_enable_pattern(mxstatus: usize) -> bool {
    mxstatus & MXSTATUS_ENABLE == MXSTATUS_ENABLE
}

/// 进入低功耗等待, 不再返回
#[cfg(target_arch = "riscv64")]
pub fn wait_forever() -> ! {
    loop {
        unsafe {
            asm!("wfi", options(nomem, nostack));
        }
    }
}
