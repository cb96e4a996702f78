#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

use xtcop::config::{INPUT_BYTES, OUTPUT_BYTES, WEIGHT_BYTES};
use xtcop::npu::{
    Coprocessor, DmaDescriptor, Pipeline, PipelineError, PipelineReport, TakeOnce, TensorBuffer, DEMO_SHAPE,
};
use xtcop::println;

/// 演示网络的三块张量缓冲区
struct DemoTensors {
    input: TensorBuffer<INPUT_BYTES>,
    weights: TensorBuffer<WEIGHT_BYTES>,
    output: TensorBuffer<OUTPUT_BYTES>,
}

/// 静态分配, 由入口取出一次后独占
static DEMO_TENSORS: TakeOnce<DemoTensors> = TakeOnce::new(DemoTensors {
    input: TensorBuffer::zeroed(),
    weights: TensorBuffer::zeroed(),
    output: TensorBuffer::zeroed(),
});

/// 装载演示数据 (代替外部数据加载器)
fn load_demo_tensors(tensors: &mut DemoTensors) {
    tensors.input.fill_with(|i| (i * 7 % 64) as u8);
    tensors.weights.fill_with(|i| (i % 11) as u8);
}

/// 跑一遍 conv -> act 并打印结果
fn run_demo<C: Coprocessor>(
    cop: C,
    descriptor: &DmaDescriptor,
    tensors: &mut DemoTensors,
) -> Result<PipelineReport, PipelineError> {
    load_demo_tensors(tensors);

    let mut pipeline = Pipeline::new(cop, descriptor);
    pipeline.init();

    match pipeline.run(&tensors.input, &tensors.weights, &mut tensors.output, &DEMO_SHAPE) {
        Ok(report) => {
            println!("cnn done checksum=0x{:08x}", report.checksum);
            Ok(report)
        }
        Err(e) => {
            println!("{}", e);
            Err(e)
        }
    }
}

/// 裸机入口 (由 boot.S 调用)
///
/// 成功时进入低功耗等待不再返回; 失败时返回阶段对应的退出码
#[cfg(all(target_os = "none", target_arch = "riscv64"))]
mod firmware {
    use core::panic::PanicInfo;

    use xtcop::config::DMA_BASE;
    use xtcop::drivers::uart_init;
    use xtcop::hal::csr;
    use xtcop::npu::{DmaDescriptor, XtCop};
    use xtcop::println;

    #[no_mangle]
    pub extern "C" fn main() -> i32 {
        uart_init();
        println!("cnn demo start");

        let Some(tensors) = super::DEMO_TENSORS.take() else {
            println!("[XtCop] tensor buffers already in use");
            csr::wait_forever()
        };
        let descriptor = unsafe { DmaDescriptor::new(DMA_BASE as *mut u8) };
        let cop = unsafe { XtCop::new() };

        match super::run_demo(cop, &descriptor, tensors) {
            Ok(_) => {
                if !csr::is_enable_pattern(unsafe { csr::read_mxstatus() }) {
                    println!("[XtCop] mxstatus readback mismatch");
                }
                csr::wait_forever()
            }
            Err(e) => e.exit_code(),
        }
    }

    #[panic_handler]
    fn panic(info: &PanicInfo) -> ! {
        println!("[Panic] {}", info);
        csr::wait_forever()
    }
}

#[cfg(all(target_os = "none", not(target_arch = "riscv64")))]
compile_error!("firmware build only supports riscv64 targets");

/// 宿主机入口: 用软件协处理器模型跑同一条流水线
#[cfg(not(target_os = "none"))]
fn main() {
    use xtcop::config::{DESCRIPTOR_SPAN, INPUT_CHANNELS};
    use xtcop::npu::SimCop;

    #[repr(C, align(8))]
    struct Region([u8; DESCRIPTOR_SPAN]);

    println!("cnn demo start (simulated coprocessor)");
    let Some(tensors) = DEMO_TENSORS.take() else {
        println!("[XtCop] tensor buffers already in use");
        return;
    };
    let mut region = Region([0; DESCRIPTOR_SPAN]);
    let descriptor = unsafe { DmaDescriptor::new(region.0.as_mut_ptr()) };
    let cop = SimCop::new(&descriptor, INPUT_CHANNELS as u32);

    if let Err(e) = run_demo(cop, &descriptor, tensors) {
        std::process::exit(e.exit_code());
    }
}
