//! 端到端模拟测试：从网定义构建，运行，检查记录。
use std::collections::BTreeMap;

use proptest::prelude::*;
use tempfile::TempDir;

use spnsim::config::SimulationConfig;
use spnsim::net::io::{read_json, write_json};
use spnsim::net::{Net, NetDefinition, TransitionDefinition};
use spnsim::sim::{self, SimError, SimulationLog, StopReason, run_repeated};

fn demo(source: &str) -> Net {
    let definition: NetDefinition = toml::from_str(source).unwrap();
    definition.build().unwrap()
}

fn source_sink() -> Net {
    demo(include_str!("../demos/source_sink.toml"))
}

fn seeded(seed: u64) -> SimulationConfig {
    SimulationConfig {
        seed,
        ..SimulationConfig::default()
    }
}

fn sir(population: u64) -> Net {
    NetDefinition::new("sir")
        .place("susceptible", population - 1)
        .place("infected", 1)
        .place("recovered", 0)
        .transition(
            TransitionDefinition::new("infect", "0.05 * susceptible * infected")
                .input("susceptible", 1)
                .input("infected", 1)
                .output("infected", 2),
        )
        .transition(
            TransitionDefinition::new("recover", "0.5 * infected")
                .input("infected", 1)
                .output("recovered", 1),
        )
        .build()
        .unwrap()
}

#[test]
fn source_sink_drains_in_exactly_36_firings() {
    let net = source_sink();
    let outcome = sim::run(&net, net.initial_marking(), &seeded(0)).unwrap();
    assert_eq!(outcome.reason, StopReason::NoEnabledTransitions);
    assert_eq!(outcome.steps(), 36);

    let log = outcome.record.to_log(&net);
    assert_eq!(log.len(), 37);
    assert_eq!(log.final_tokens("source"), Some(0));
    assert_eq!(log.final_tokens("sink"), Some(36));
    assert_eq!(log.time[0], 0.0);
    for step in 0..log.len() {
        assert_eq!(log.places["source"][step] + log.places["sink"][step], 36);
    }
}

#[test]
fn hydrogen_oxygen_consumes_all_hydrogen() {
    let net = demo(include_str!("../demos/hydrogen_oxygen.toml"));
    let outcome = sim::run(&net, net.initial_marking(), &seeded(5)).unwrap();
    assert_eq!(outcome.reason, StopReason::NoEnabledTransitions);
    assert_eq!(outcome.steps(), 50);

    let log = outcome.record.to_log(&net);
    assert_eq!(log.final_tokens("hydrogen"), Some(0));
    assert_eq!(log.final_tokens("oxygen"), Some(50));
    assert_eq!(log.final_tokens("water"), Some(100));
}

#[test]
fn nothing_enabled_stops_at_step_zero() {
    let net = source_sink();
    let empty = spnsim::net::Marking::from(vec![0, 4]);
    let outcome = sim::run(&net, empty.clone(), &seeded(0)).unwrap();
    assert_eq!(outcome.reason, StopReason::NoEnabledTransitions);
    assert_eq!(outcome.record.len(), 1);
    assert_eq!(outcome.record.first().unwrap().time, 0.0);
    assert_eq!(outcome.record.first().unwrap().marking, empty);
}

#[test]
fn zero_max_steps_records_only_the_initial_marking() {
    let net = source_sink();
    let config = SimulationConfig {
        max_steps: Some(0),
        ..SimulationConfig::default()
    };
    let outcome = sim::run(&net, net.initial_marking(), &config).unwrap();
    assert_eq!(outcome.reason, StopReason::MaxStepsReached);
    assert_eq!(outcome.record.len(), 1);
    assert_eq!(outcome.final_marking(), Some(&net.initial_marking()));
}

#[test]
fn same_seed_same_record() {
    let net = sir(40);
    let a = sim::run(&net, net.initial_marking(), &seeded(17)).unwrap();
    let b = sim::run(&net, net.initial_marking(), &seeded(17)).unwrap();
    assert_eq!(a, b);

    let c = sim::run(&net, net.initial_marking(), &seeded(18)).unwrap();
    assert_ne!(
        a.record.times().collect::<Vec<_>>(),
        c.record.times().collect::<Vec<_>>()
    );
}

#[test]
fn always_false_guard_never_fires() {
    let net = NetDefinition::new("blocked")
        .place("source", 10)
        .place("sink", 0)
        .place("blocked", 0)
        .transition(
            TransitionDefinition::new("move", "source")
                .input("source", 1)
                .output("sink", 1),
        )
        .transition(
            TransitionDefinition::new("never", "1")
                .guard("false")
                .output("blocked", 1),
        )
        .build()
        .unwrap();
    let outcome = sim::run(&net, net.initial_marking(), &seeded(3)).unwrap();
    assert_eq!(outcome.reason, StopReason::NoEnabledTransitions);
    let log = outcome.record.to_log(&net);
    assert!(log.places["blocked"].iter().all(|tokens| *tokens == 0));
    assert_eq!(log.final_tokens("sink"), Some(10));
}

#[test]
fn zero_rate_transition_is_never_scheduled() {
    let net = NetDefinition::new("idle")
        .place("p", 3)
        .place("q", 0)
        .transition(
            TransitionDefinition::new("stuck", "0 * p")
                .input("p", 1)
                .output("q", 1),
        )
        .build()
        .unwrap();
    let outcome = sim::run(&net, net.initial_marking(), &seeded(1)).unwrap();
    assert_eq!(outcome.reason, StopReason::NoEnabledTransitions);
    assert_eq!(outcome.steps(), 0);
}

#[test]
fn max_time_caps_simulated_time() {
    let net = sir(200);
    let config = SimulationConfig {
        max_time: 0.5,
        seed: 9,
        ..SimulationConfig::default()
    };
    let outcome = sim::run(&net, net.initial_marking(), &config).unwrap();
    let times: Vec<f64> = outcome.record.times().collect();
    if outcome.reason == StopReason::MaxTimeReached {
        assert!(*times.last().unwrap() >= 0.5);
    }
    assert!(times[..times.len() - 1].iter().all(|t| *t < 0.5));
}

#[test]
fn malformed_output_rule_aborts_the_run() {
    let net = NetDefinition::new("malformed")
        .place("p", 1)
        .transition(
            TransitionDefinition::new("take_two", "1")
                .guard("true")
                .input("p", 2),
        )
        .build()
        .unwrap();
    let err = sim::run(&net, net.initial_marking(), &seeded(0)).unwrap_err();
    assert!(matches!(err, SimError::MalformedOutputRule(_)));
}

#[test]
fn negative_rate_aborts_the_run() {
    let net = NetDefinition::new("negative")
        .place("p", 1)
        .transition(TransitionDefinition::new("t", "p - 5").input("p", 1))
        .build()
        .unwrap();
    let err = sim::run(&net, net.initial_marking(), &seeded(0)).unwrap_err();
    assert!(matches!(err, SimError::InvalidRate { .. }));
}

#[test]
fn repeated_runs_are_reproducible() {
    let net = sir(30);
    let config = SimulationConfig {
        seed: 1000,
        runs: 8,
        ..SimulationConfig::default()
    };
    let first = run_repeated(&net, &net.initial_marking(), &config).logs(&net);
    let second = run_repeated(&net, &net.initial_marking(), &config).logs(&net);
    assert_eq!(first.len(), 8);
    assert_eq!(first, second);
    assert_eq!(first.keys().copied().collect::<Vec<_>>(), (0..8).collect::<Vec<_>>());

    let third = sim::run(&net, net.initial_marking(), &seeded(1003)).unwrap();
    assert_eq!(first[&3], third.record.to_log(&net));
}

#[test]
fn run_logs_persist_as_json() {
    let net = source_sink();
    let config = SimulationConfig {
        runs: 50,
        ..SimulationConfig::default()
    };
    let logs = run_repeated(&net, &net.initial_marking(), &config).logs(&net);

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("runs.json");
    write_json(&path, &logs).unwrap();
    let loaded: BTreeMap<usize, SimulationLog> = read_json(&path).unwrap();

    assert_eq!(loaded.len(), 50);
    assert_eq!(loaded, logs);
}

#[test]
fn vanishing_rate_never_records_an_infinite_time() {
    let net = NetDefinition::new("glacial")
        .place("p", 1)
        .place("q", 0)
        .transition(
            TransitionDefinition::new("creep", "1e-320")
                .input("p", 1)
                .output("q", 1),
        )
        .build()
        .unwrap();
    let outcome = sim::run(&net, net.initial_marking(), &seeded(4)).unwrap();
    assert_eq!(outcome.reason, StopReason::NoEnabledTransitions);
    assert_eq!(outcome.steps(), 0);
    assert!(outcome.record.times().all(f64::is_finite));

    let logs = BTreeMap::from([(0usize, outcome.record.to_log(&net))]);
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("glacial.json");
    write_json(&path, &logs).unwrap();
    let loaded: BTreeMap<usize, SimulationLog> = read_json(&path).unwrap();
    assert_eq!(loaded, logs);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// 人口守恒，时间随每次发射严格递增。
    #[test]
    fn sir_invariants_hold_for_any_seed(seed in any::<u64>(), population in 2u64..60) {
        let net = sir(population);
        let outcome = sim::run(&net, net.initial_marking(), &seeded(seed)).unwrap();
        prop_assert_eq!(outcome.reason, StopReason::NoEnabledTransitions);

        let entries = outcome.record.entries();
        for entry in entries {
            prop_assert_eq!(entry.marking.iter().map(|(_, t)| *t).sum::<u64>(), population);
        }
        for pair in entries.windows(2) {
            prop_assert!(pair[1].time > pair[0].time);
        }
        prop_assert_eq!(entries.last().unwrap().marking.as_slice()[1], 0);
    }
}
