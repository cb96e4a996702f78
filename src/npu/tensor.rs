//! 张量缓冲区
//!
//! 固定大小, 64 字节对齐, 生命周期与进程相同。
//! 协处理器会在 CPU 不知情的情况下读写这些内存, 因此所有 CPU 侧访问都走 volatile。

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, Ordering};

use volatile::{access::ReadOnly, Volatile};

use crate::config::TENSOR_ALIGN;

/// 64 字节对齐的张量缓冲区
#[repr(C, align(64))]
pub struct TensorBuffer<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> TensorBuffer<N> {
    /// 全零缓冲区, 可用于 static 初始化
    pub const fn zeroed() -> Self {
        TensorBuffer { bytes: [0; N] }
    }

    /// 缓冲区物理地址 (无 MMU, 虚实地址相同)
    pub fn addr(&self) -> usize {
        self.bytes.as_ptr() as usize
    }

    /// 供协处理器写回的地址
    pub fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr()
    }

    /// 只读 volatile 视图
    pub fn view(&self) -> Volatile<&[u8], ReadOnly> {
        Volatile::new_read_only(&self.bytes[..])
    }

    /// 可写 volatile 视图
    pub fn view_mut(&mut self) -> Volatile<&mut [u8]> {
        Volatile::new(&mut self.bytes[..])
    }

    pub fn read(&self, index: usize) -> u8 {
        self.view().index(index).read()
    }

    /// 按下标生成每个字节
    pub fn fill_with(&mut self, mut f: impl FnMut(usize) -> u8) {
        let mut view = self.view_mut();
        for i in 0..N {
            view.index_mut(i).write(f(i));
        }
    }

    /// 对全部字节求和 (32 位回绕)
    pub fn checksum(&self) -> u32 {
        let view = self.view();
        let mut sum = Checksum::new();
        for i in 0..N {
            sum.add(view.index(i).read());
        }
        sum.value()
    }
}

/// 地址是否满足张量对齐要求
pub fn is_tensor_aligned(addr: usize) -> bool {
    addr % TENSOR_ALIGN == 0
}

/// 字节累加校验和
///
/// 固定 32 位宽, 溢出静默回绕, 不是密码学摘要
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Checksum(u32);

impl Checksum {
    pub const fn new() -> Self {
        Checksum(0)
    }

    #[inline]
    pub fn add(&mut self, byte: u8) {
        self.0 = self.0.wrapping_add(byte as u32);
    }

    pub fn value(&self) -> u32 {
        self.0
    }
}

/// 只能取出一次的静态存储
///
/// 张量缓冲区由唯一的执行者独占, 不需要锁: 第一次 `take` 拿到 `&'static mut`,
/// 之后都返回 None
pub struct TakeOnce<T> {
    taken: AtomicBool,
    value: UnsafeCell<T>,
}

// SAFETY: 内部值的可变引用最多交出一次, 之后不再有任何访问路径
unsafe impl<T: Send> Sync for TakeOnce<T> {}

impl<T> TakeOnce<T> {
    pub const fn new(value: T) -> Self {
        TakeOnce {
            taken: AtomicBool::new(false),
            value: UnsafeCell::new(value),
        }
    }

    /// 取出独占引用, 只有第一次调用成功
    pub fn take(&'static self) -> Option<&'static mut T> {
        if self.taken.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(unsafe { &mut *self.value.get() })
    }
}
