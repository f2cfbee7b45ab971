//! Parsing Options.
//! `spn <NET> [-n RUNS] [--max-steps N] [--max-time T] [--seed S] [--config FILE] [-o OUT.json] [--dot FILE]`

use clap::{Arg, Command, value_parser};
use std::path::PathBuf;

use crate::config::SimulationConfig;

fn make_options_parser() -> clap::Command {
    Command::new("spn")
        .no_binary_name(true)
        .version("v0.1.0")
        .about("Stochastic Petri net simulator")
        .arg(
            Arg::new("net")
                .value_name("NET")
                .help("Network definition (.toml, .json or .ron)")
                .required(true)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("runs")
                .short('n')
                .long("runs")
                .value_name("RUNS")
                .help("Number of independent runs")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("max-steps")
                .long("max-steps")
                .value_name("N")
                .help("Stop each run after N firings")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("max-time")
                .long("max-time")
                .value_name("T")
                .help("Stop each run once simulated time reaches T")
                .value_parser(value_parser!(f64)),
        )
        .arg(
            Arg::new("seed")
                .short('s')
                .long("seed")
                .value_name("S")
                .help("Seed of run 0; run i uses S + i")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Simulation config (TOML); command line flags take precedence")
                .default_value("spn.toml")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Path to file where the run logs will be stored")
                .default_value("simulation.json")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Also write the net structure as a Graphviz DOT file")
                .value_parser(value_parser!(PathBuf)),
        )
}

#[derive(Debug, Clone, PartialEq)]
pub struct Options {
    pub net: PathBuf,
    pub config: PathBuf,
    pub output: PathBuf,
    pub dot: Option<PathBuf>,
    pub runs: Option<usize>,
    pub max_steps: Option<u64>,
    pub max_time: Option<f64>,
    pub seed: Option<u64>,
}

impl Options {
    pub fn parse_from_args<I, T>(flags: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = make_options_parser().try_get_matches_from(flags)?;
        let path = |id: &str| matches.get_one::<PathBuf>(id).cloned().unwrap_or_default();

        Ok(Options {
            net: path("net"),
            config: path("config"),
            output: path("output"),
            dot: matches.get_one::<PathBuf>("dot").cloned(),
            runs: matches.get_one::<usize>("runs").copied(),
            max_steps: matches.get_one::<u64>("max-steps").copied(),
            max_time: matches.get_one::<f64>("max-time").copied(),
            seed: matches.get_one::<u64>("seed").copied(),
        })
    }

    /// 命令行给出的值覆盖配置文件中的值。
    pub fn apply(&self, mut config: SimulationConfig) -> SimulationConfig {
        if let Some(runs) = self.runs {
            config.runs = runs;
        }
        if let Some(max_steps) = self.max_steps {
            config.max_steps = Some(max_steps);
        }
        if let Some(max_time) = self.max_time {
            config.max_time = max_time;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        config
    }
}
