//! # 随机模拟引擎
//!
//! 每个可激发迁移独立地在事件时间线上预约一次发射：在预约时刻以当前标识求速率 `λ`，
//! 抽取 `Exp(λ)` 延迟。之后其他迁移的发射即使改变了 `λ`，已抽取的延迟也不会重抽，
//! 只有迁移失去可激发性时才撤销其事件。速率只依赖于自身不受其他迁移影响的库所时，
//! 该方案与逐步重抽的 Gillespie 直接法等价，否则是近似。
//!
//! 每次运行独占自己的标识、时间线、记录与随机数发生器，多次运行之间不共享可变状态。

pub mod engine;
pub mod experiment;
pub mod rate;
pub mod record;
pub mod sampler;
pub mod timeline;

use thiserror::Error;

use crate::config::SimulationConfig;
use crate::net::{ExprError, FireError, Marking, Net};

pub use engine::{CancelToken, Limits, RunState, SimulationOutcome, Simulator, StopReason};
pub use experiment::{ExperimentResults, run_repeated};
pub use rate::RateEvaluator;
pub use record::{RecordEntry, SimulationLog, SimulationRecord};
pub use sampler::DelaySampler;
pub use timeline::{EventTimeline, ReconcileSummary, ScheduledEvent};

/// 速率不合法的具体原因。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateViolation {
    Negative(f64),
    NonFinite(f64),
    NotEnabled,
}

#[derive(Debug, Error)]
pub enum SimError {
    #[error("invalid rate for transition '{transition}': {violation:?}")]
    InvalidRate {
        transition: String,
        violation: RateViolation,
    },
    #[error("cannot sample a finite positive delay for rate {0}")]
    DegenerateRate(f64),
    #[error("malformed output rule: {0}")]
    MalformedOutputRule(#[source] FireError),
    #[error("evaluating '{transition}' failed: {source}")]
    Expression {
        transition: String,
        #[source]
        source: ExprError,
    },
    #[error("initial marking has {found} places, net has {expected}")]
    MarkingMismatch { expected: usize, found: usize },
}

/// 单次运行：从 `initial` 出发，以 `config` 中的种子与上限模拟到停止。
pub fn run(
    net: &Net,
    initial: Marking,
    config: &SimulationConfig,
) -> Result<SimulationOutcome, SimError> {
    let mut simulator = Simulator::new(net, initial, config)?;
    let reason = simulator.run()?;
    Ok(SimulationOutcome {
        record: simulator.into_record(),
        reason,
    })
}
