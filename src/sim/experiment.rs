//! 重复独立运行。第 `i` 次运行使用种子 `seed + i`，结果按运行编号排列，与线程调度无关。
use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::config::SimulationConfig;
use crate::net::{Marking, Net};
use crate::sim::engine::{SimulationOutcome, StopReason};
use crate::sim::record::SimulationLog;
use crate::sim::{self, SimError};

#[derive(Debug, Default)]
pub struct ExperimentResults {
    pub runs: BTreeMap<usize, SimulationOutcome>,
    /// 中止的运行只影响自身，其余运行照常完成。
    pub failures: BTreeMap<usize, SimError>,
}

impl ExperimentResults {
    pub fn completed(&self) -> usize {
        self.runs.len()
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn logs(&self, net: &Net) -> BTreeMap<usize, SimulationLog> {
        self.runs
            .iter()
            .map(|(&index, outcome)| (index, outcome.record.to_log(net)))
            .collect()
    }

    pub fn stop_reasons(&self) -> BTreeMap<StopReason, usize> {
        let mut counts = BTreeMap::new();
        for outcome in self.runs.values() {
            *counts.entry(outcome.reason).or_insert(0) += 1;
        }
        counts
    }
}

pub fn run_repeated(net: &Net, initial: &Marking, config: &SimulationConfig) -> ExperimentResults {
    log::info!(
        "starting {} runs (seed {}, max_steps {:?}, max_time {})",
        config.runs,
        config.seed,
        config.max_steps,
        config.max_time
    );

    let outcomes: Vec<(usize, Result<SimulationOutcome, SimError>)> = (0..config.runs)
        .into_par_iter()
        .map(|index| {
            let run_config = SimulationConfig {
                seed: config.seed.wrapping_add(index as u64),
                ..config.clone()
            };
            (index, sim::run(net, initial.clone(), &run_config))
        })
        .collect();

    let mut results = ExperimentResults::default();
    for (index, outcome) in outcomes {
        match outcome {
            Ok(outcome) => {
                log::debug!(
                    "run {} finished: {:?} after {} steps",
                    index,
                    outcome.reason,
                    outcome.steps()
                );
                results.runs.insert(index, outcome);
            }
            Err(err) => {
                log::warn!("run {} aborted: {}", index, err);
                results.failures.insert(index, err);
            }
        }
    }

    log::info!(
        "{} runs completed, {} aborted",
        results.completed(),
        results.failed()
    );
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{Expr, Place, Transition};

    fn decay() -> Net {
        let mut net = Net::empty();
        let a = net.add_place(Place::new("a", 20));
        let t = net.add_transition(Transition::new("decay", Expr::tokens(a) * Expr::constant(0.5)));
        net.add_input_arc(a, t, 1);
        net
    }

    #[test]
    fn repeated_runs_match_sequential_runs() {
        let net = decay();
        let config = SimulationConfig {
            seed: 100,
            runs: 6,
            ..SimulationConfig::default()
        };
        let results = run_repeated(&net, &net.initial_marking(), &config);
        assert_eq!(results.completed(), 6);
        assert_eq!(results.failed(), 0);

        for (index, outcome) in &results.runs {
            let single = SimulationConfig {
                seed: 100 + *index as u64,
                ..config.clone()
            };
            let expected = sim::run(&net, net.initial_marking(), &single).unwrap();
            assert_eq!(outcome, &expected);
        }
        assert_eq!(
            results.stop_reasons().get(&StopReason::NoEnabledTransitions),
            Some(&6)
        );
    }

    #[test]
    fn failing_runs_do_not_affect_the_others() {
        let net = decay();
        let config = SimulationConfig {
            runs: 3,
            ..SimulationConfig::default()
        };
        let results = run_repeated(&net, &Marking::from(vec![1, 2]), &config);
        assert_eq!(results.completed(), 0);
        assert_eq!(results.failed(), 3);
        assert!(results.logs(&net).is_empty());
    }
}
