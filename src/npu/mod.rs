pub mod insn;
pub mod descriptor;
pub mod tensor;
pub mod pipeline;
#[cfg(not(target_os = "none"))]
pub mod sim;

pub use insn::{Coprocessor, CopFunct, HwError, OpParams, Status};
#[cfg(target_arch = "riscv64")]
pub use insn::XtCop;
pub use descriptor::{ConvShape, DescriptorConfig, DmaDescriptor};
pub use tensor::{Checksum, TakeOnce, TensorBuffer};
pub use pipeline::{Pipeline, PipelineError, PipelineReport, PipelineState, Stage, StagePlan, DEMO_SHAPE};
#[cfg(not(target_os = "none"))]
pub use sim::SimCop;
