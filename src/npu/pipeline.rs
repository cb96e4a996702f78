//! 推理流水线编排
//!
//! 一次完整推理: 使能协处理器 -> 写描述符 -> 依次发出各阶段指令 -> 校验输出。
//! 任一阶段返回非零状态即终止, 不重试也不回滚, 输出缓冲区保持协处理器留下的内容。
//! 描述符中的形状是否与缓冲区大小一致是调用者的前置条件, 这里不做运行时检查。

use core::fmt;

use super::descriptor::{ConvShape, DescriptorConfig, DmaDescriptor};
use super::insn::{CopFunct, Coprocessor, HwError, OpParams, Status};
use super::tensor::TensorBuffer;
use crate::config;

/// 演示网络: 32x32x3 输入, 3x3x16 权重, 30x30x16 输出, 步长 1
pub const DEMO_SHAPE: ConvShape = ConvShape {
    in_width: config::INPUT_WIDTH as u32,
    in_height: config::INPUT_HEIGHT as u32,
    in_channels: config::INPUT_CHANNELS as u32,
    out_channels: config::OUT_CHANNELS as u32,
    kernel_size: config::KERNEL_SIZE as u32,
    stride: config::STRIDE as u32,
};

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Conv2d,
    MaxPool2d,
    Activate,
}

impl Stage {
    pub fn funct(&self) -> CopFunct {
        match self {
            Stage::Conv2d => CopFunct::Conv2d,
            Stage::MaxPool2d => CopFunct::MaxPool2d,
            Stage::Activate => CopFunct::Activate,
        }
    }

    /// 该阶段失败时的进程退出码, 各阶段互不相同
    pub fn exit_code(&self) -> i32 {
        match self {
            Stage::Conv2d => -1,
            Stage::Activate => -2,
            Stage::MaxPool2d => -3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.funct())
    }
}

/// 流水线状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// 协处理器尚未使能
    Init,
    /// 正在写描述符
    Configure,
    /// 正在执行某阶段
    Invoke(Stage),
    /// 计算校验和
    Verify,
    /// 全部完成
    Done,
    /// 某阶段返回非零状态
    Failed(Stage),
}

/// 阶段失败: 阶段 + 硬件原始错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineError {
    pub stage: Stage,
    pub error: HwError,
}

impl PipelineError {
    pub fn code(&self) -> usize {
        self.error.code()
    }

    pub fn exit_code(&self) -> i32 {
        self.stage.exit_code()
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed {}", self.stage, self.error)
    }
}

/// 一次成功推理的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineReport {
    /// 输出缓冲区字节和 (32 位回绕)
    pub checksum: u32,
    /// 执行过的阶段数
    pub stages_run: usize,
}

/// 阶段计划项
///
/// `reconfigure` 为 None 时沿用上一次写入的描述符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: Stage,
    pub reconfigure: Option<DescriptorConfig>,
    pub params: OpParams,
}

impl StagePlan {
    pub const fn new(stage: Stage) -> Self {
        StagePlan {
            stage,
            reconfigure: None,
            params: OpParams(0),
        }
    }

    pub const fn with_descriptor(stage: Stage, cfg: DescriptorConfig) -> Self {
        StagePlan {
            stage,
            reconfigure: Some(cfg),
            params: OpParams(0),
        }
    }
}

/// 卷积后接激活, 两阶段共用卷积前写入的描述符
pub const DEFAULT_PLAN: [StagePlan; 2] = [StagePlan::new(Stage::Conv2d), StagePlan::new(Stage::Activate)];

/// 流水线编排器
///
/// 缓冲区由调用者以静态生命周期持有, 逐次显式传入
pub struct Pipeline<'d, C: Coprocessor> {
    cop: C,
    descriptor: &'d DmaDescriptor,
    state: PipelineState,
}

impl<'d, C: Coprocessor> Pipeline<'d, C> {
    pub fn new(cop: C, descriptor: &'d DmaDescriptor) -> Self {
        Pipeline {
            cop,
            descriptor,
            state: PipelineState::Init,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn coprocessor(&self) -> &C {
        &self.cop
    }

    /// 使能协处理器, 每个流水线实例只执行一次
    pub fn init(&mut self) {
        if self.state == PipelineState::Init {
            self.cop.enable();
            self.state = PipelineState::Configure;
        }
    }

    /// 按默认计划运行一次推理
    pub fn run<const I: usize, const W: usize, const O: usize>(
        &mut self,
        input: &TensorBuffer<I>,
        weights: &TensorBuffer<W>,
        output: &mut TensorBuffer<O>,
        shape: &ConvShape,
    ) -> Result<PipelineReport, PipelineError> {
        self.run_plan(input, weights, output, shape, &DEFAULT_PLAN)
    }

    /// 按给定阶段计划运行一次推理
    pub fn run_plan<const I: usize, const W: usize, const O: usize>(
        &mut self,
        input: &TensorBuffer<I>,
        weights: &TensorBuffer<W>,
        output: &mut TensorBuffer<O>,
        shape: &ConvShape,
        plan: &[StagePlan],
    ) -> Result<PipelineReport, PipelineError> {
        self.init();

        self.state = PipelineState::Configure;
        let output_addr = output.as_mut_ptr() as usize;
        self.descriptor
            .program(&DescriptorConfig::new(input.addr(), output_addr, O, shape));

        for (i, step) in plan.iter().enumerate() {
            if let Some(cfg) = step.reconfigure {
                self.state = PipelineState::Configure;
                self.descriptor.program(&cfg);
            }

            self.state = PipelineState::Invoke(step.stage);
            let status = self.invoke(step, input.addr(), weights.addr(), output_addr);
            if let Err(error) = status.into_result() {
                self.state = PipelineState::Failed(step.stage);
                let err = PipelineError { stage: step.stage, error };
                crate::println!("[XtCop] {} (stage {} of {})", err, i + 1, plan.len());
                return Err(err);
            }
            crate::println!("[XtCop] {} ok", step.stage);
        }

        self.state = PipelineState::Verify;
        let checksum = output.checksum();

        self.state = PipelineState::Done;
        Ok(PipelineReport {
            checksum,
            stages_run: plan.len(),
        })
    }

    /// 发出单个阶段的指令
    ///
    /// 卷积读输入和权重; 池化与激活都作用在输出缓冲区上
    fn invoke(&mut self, step: &StagePlan, input: usize, weights: usize, output: usize) -> Status {
        match step.stage {
            Stage::Conv2d => self.cop.conv2d(input, weights, step.params),
            Stage::MaxPool2d => self.cop.maxpool2d(output, step.params),
            Stage::Activate => self.cop.activate(output, step.params),
        }
    }
}
