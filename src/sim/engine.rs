//! 模拟主循环：`Running` → `Stopped(reason)` 的单向状态机。
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::config::SimulationConfig;
use crate::net::{Marking, Net};
use crate::sim::record::SimulationRecord;
use crate::sim::sampler::DelaySampler;
use crate::sim::timeline::EventTimeline;
use crate::sim::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StopReason {
    NoEnabledTransitions,
    MaxStepsReached,
    MaxTimeReached,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Stopped(StopReason),
}

impl RunState {
    pub fn is_running(&self) -> bool {
        matches!(self, RunState::Running)
    }
}

/// 停止条件。`max_steps` 为 `None` 时不限步数，`max_time` 默认为正无穷。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub max_steps: Option<u64>,
    pub max_time: f64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_time: f64::INFINITY,
        }
    }
}

impl Limits {
    fn check(&self, steps: u64, now: f64) -> Option<StopReason> {
        if self.max_steps.is_some_and(|max| steps >= max) {
            Some(StopReason::MaxStepsReached)
        } else if now >= self.max_time {
            Some(StopReason::MaxTimeReached)
        } else {
            None
        }
    }
}

/// 外部停止信号，可跨线程共享；仅在两步之间检查。
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationOutcome {
    pub record: SimulationRecord,
    pub reason: StopReason,
}

impl SimulationOutcome {
    /// 发射次数（不含初始快照）。
    pub fn steps(&self) -> usize {
        self.record.len().saturating_sub(1)
    }

    pub fn final_marking(&self) -> Option<&Marking> {
        self.record.last().map(|entry| &entry.marking)
    }
}

pub struct Simulator<'net, R = StdRng> {
    net: &'net Net,
    marking: Marking,
    timeline: EventTimeline,
    sampler: DelaySampler<R>,
    record: SimulationRecord,
    now: f64,
    steps: u64,
    limits: Limits,
    state: RunState,
    cancel: Option<CancelToken>,
}

impl<'net> Simulator<'net, StdRng> {
    pub fn new(net: &'net Net, initial: Marking, config: &SimulationConfig) -> Result<Self, SimError> {
        Self::with_sampler(
            net,
            initial,
            config.limits(),
            DelaySampler::seeded(config.seed),
        )
    }
}

impl<'net, R: Rng> Simulator<'net, R> {
    pub fn with_sampler(
        net: &'net Net,
        initial: Marking,
        limits: Limits,
        sampler: DelaySampler<R>,
    ) -> Result<Self, SimError> {
        if initial.len() != net.places_len() {
            return Err(SimError::MarkingMismatch {
                expected: net.places_len(),
                found: initial.len(),
            });
        }

        let mut record = SimulationRecord::new();
        record.record(0.0, &initial);
        let state = match limits.check(0, 0.0) {
            Some(reason) => RunState::Stopped(reason),
            None => RunState::Running,
        };

        Ok(Self {
            net,
            marking: initial,
            timeline: EventTimeline::new(net.transitions_len()),
            sampler,
            record,
            now: 0.0,
            steps: 0,
            limits,
            state,
            cancel: None,
        })
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn net(&self) -> &Net {
        self.net
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn timeline(&self) -> &EventTimeline {
        &self.timeline
    }

    pub fn record(&self) -> &SimulationRecord {
        &self.record
    }

    fn stop(&mut self, reason: StopReason) -> RunState {
        log::debug!(
            "run stopped: {:?} after {} steps at t={:.6}",
            reason,
            self.steps,
            self.now
        );
        self.state = RunState::Stopped(reason);
        self.state
    }

    /// 执行一次发射。已停止时直接返回当前状态；出错时本次运行中止，标识保持发射前的值。
    pub fn step(&mut self) -> Result<RunState, SimError> {
        if !self.state.is_running() {
            return Ok(self.state);
        }

        let net = self.net;
        loop {
            self.timeline
                .reconcile(net, &self.marking, self.now, &mut self.sampler)?;

            let Some(event) = self.timeline.pop_earliest() else {
                return Ok(self.stop(StopReason::NoEnabledTransitions));
            };

            let name = net
                .get_transition(event.transition)
                .map(|t| t.name.as_str())
                .unwrap_or_default();
            let enabled = net
                .is_enabled(event.transition, &self.marking)
                .map_err(|source| SimError::Expression {
                    transition: name.to_string(),
                    source,
                })?;
            if !enabled {
                log::trace!("discard stale event for {}", name);
                continue;
            }

            net.fire_in_place(&mut self.marking, event.transition)
                .map_err(SimError::MalformedOutputRule)?;
            self.now = event.fire_time;
            self.steps += 1;
            self.record.record(self.now, &self.marking);
            log::trace!("t={:.6} fire {} -> {:?}", self.now, name, self.marking);

            return Ok(match self.limits.check(self.steps, self.now) {
                Some(reason) => self.stop(reason),
                None => RunState::Running,
            });
        }
    }

    /// 运行到停止，返回停止原因。
    pub fn run(&mut self) -> Result<StopReason, SimError> {
        loop {
            if let RunState::Stopped(reason) = self.state {
                return Ok(reason);
            }
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                self.stop(StopReason::Cancelled);
                continue;
            }
            self.step()?;
        }
    }

    pub fn into_record(self) -> SimulationRecord {
        self.record
    }

    /// 尚未停止时返回 `None`。
    pub fn into_outcome(self) -> Option<SimulationOutcome> {
        match self.state {
            RunState::Stopped(reason) => Some(SimulationOutcome {
                record: self.record,
                reason,
            }),
            RunState::Running => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Expr, Place, Transition};

    /// source --move--> sink，速率为 `source`。
    fn source_sink(tokens: u64) -> Net {
        let mut net = Net::empty();
        let source = net.add_place(Place::new("source", tokens));
        let sink = net.add_place(Place::new("sink", 0));
        let t = net.add_transition(
            Transition::new("move", Expr::tokens(source)).with_guard(Expr::at_least(source, 1)),
        );
        net.add_input_arc(source, t, 1);
        net.add_output_arc(sink, t, 1);
        net
    }

    fn config(max_steps: Option<u64>, max_time: f64) -> SimulationConfig {
        SimulationConfig {
            max_steps,
            max_time,
            seed: 11,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn steps_until_nothing_is_enabled() {
        let net = source_sink(3);
        let mut sim = Simulator::new(&net, net.initial_marking(), &config(None, f64::INFINITY)).unwrap();
        assert_eq!(sim.step().unwrap(), RunState::Running);
        assert_eq!(sim.step().unwrap(), RunState::Running);
        assert_eq!(sim.step().unwrap(), RunState::Running);
        assert_eq!(
            sim.step().unwrap(),
            RunState::Stopped(StopReason::NoEnabledTransitions)
        );
        assert_eq!(sim.steps(), 3);
        assert_eq!(sim.marking().as_slice(), &[0, 3]);
        // 停止后再调用不产生新的快照。
        assert_eq!(
            sim.step().unwrap(),
            RunState::Stopped(StopReason::NoEnabledTransitions)
        );
        assert_eq!(sim.record().len(), 4);
    }

    #[test]
    fn initial_limits_are_checked_before_the_first_step() {
        let net = source_sink(5);
        let mut sim = Simulator::new(&net, net.initial_marking(), &config(Some(0), 10.0)).unwrap();
        assert_eq!(sim.run().unwrap(), StopReason::MaxStepsReached);
        assert_eq!(sim.record().len(), 1);

        let mut sim = Simulator::new(&net, net.initial_marking(), &config(None, 0.0)).unwrap();
        assert_eq!(sim.run().unwrap(), StopReason::MaxTimeReached);
        assert_eq!(sim.record().len(), 1);
    }

    #[test]
    fn max_steps_bounds_the_record() {
        let net = source_sink(10);
        let mut sim = Simulator::new(&net, net.initial_marking(), &config(Some(4), f64::INFINITY)).unwrap();
        assert_eq!(sim.run().unwrap(), StopReason::MaxStepsReached);
        let outcome = sim.into_outcome().unwrap();
        assert_eq!(outcome.steps(), 4);
        assert_eq!(outcome.final_marking().unwrap().as_slice(), &[6, 4]);
    }

    #[test]
    fn max_time_stops_at_the_first_firing_past_the_bound() {
        let net = source_sink(1000);
        let mut sim = Simulator::new(&net, net.initial_marking(), &config(None, 0.01)).unwrap();
        assert_eq!(sim.run().unwrap(), StopReason::MaxTimeReached);
        let times: Vec<f64> = sim.record().times().collect();
        let last = *times.last().unwrap();
        assert!(last >= 0.01);
        assert!(times[..times.len() - 1].iter().all(|t| *t < 0.01));
    }

    #[test]
    fn cancelled_runs_keep_their_partial_record() {
        let net = source_sink(5);
        let token = CancelToken::new();
        token.cancel();
        let mut sim = Simulator::new(&net, net.initial_marking(), &config(None, f64::INFINITY))
            .unwrap()
            .with_cancel_token(token.clone());
        assert_eq!(sim.run().unwrap(), StopReason::Cancelled);
        assert_eq!(sim.record().len(), 1);
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancelling_mid_run_stops_before_the_next_firing() {
        let net = source_sink(5);
        let token = CancelToken::new();
        let mut sim = Simulator::new(&net, net.initial_marking(), &config(None, f64::INFINITY))
            .unwrap()
            .with_cancel_token(token.clone());
        assert_eq!(sim.step().unwrap(), RunState::Running);
        assert_eq!(sim.step().unwrap(), RunState::Running);
        token.cancel();

        assert_eq!(sim.run().unwrap(), StopReason::Cancelled);
        assert_eq!(sim.steps(), 2);
        assert_eq!(sim.record().len(), 3);
        assert_eq!(sim.marking().as_slice(), &[3, 2]);
        let outcome = sim.into_outcome().unwrap();
        assert_eq!(outcome.reason, StopReason::Cancelled);
        assert_eq!(outcome.final_marking().unwrap().as_slice(), &[3, 2]);
    }

    #[test]
    fn rejects_a_marking_of_the_wrong_size() {
        let net = source_sink(1);
        let err = Simulator::new(&net, Marking::from(vec![1]), &config(None, 1.0))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            SimError::MarkingMismatch {
                expected: 2,
                found: 1
            }
        ));
    }

    #[test]
    fn malformed_output_rule_leaves_marking_untouched() {
        // 守卫放行但输入弧要求 2 个令牌。
        let mut net = Net::empty();
        let p = net.add_place(Place::new("p", 1));
        let t = net.add_transition(
            Transition::new("t", Expr::constant(1.0)).with_guard(Expr::Bool(true)),
        );
        net.add_input_arc(p, t, 2);
        let mut sim = Simulator::new(&net, net.initial_marking(), &config(None, f64::INFINITY)).unwrap();
        let err = sim.run().unwrap_err();
        assert!(matches!(err, SimError::MalformedOutputRule(_)));
        assert_eq!(sim.marking().as_slice(), &[1]);
        assert_eq!(sim.record().len(), 1);
        assert!(sim.into_outcome().is_none());
    }
}
