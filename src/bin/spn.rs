use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use log::{debug, info};

use spnsim::config::SimulationConfig;
use spnsim::net::io::{load_net_definition, write_json};
use spnsim::options::Options;
use spnsim::sim::run_repeated;

fn main() -> Result<()> {
    if std::env::var("SPN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("SPN_LOG")
            .write_style("SPN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    let options = match Options::parse_from_args(std::env::args_os().skip(1)) {
        Ok(options) => options,
        Err(err) => err.exit(),
    };
    debug!("spn options: {:?}", options);

    let config = options.apply(SimulationConfig::load_from_file(&options.config)?);
    debug!("simulation config: {:?}", config);

    let definition = load_net_definition(&options.net)
        .with_context(|| format!("Failed to load net definition: {:?}", options.net))?;
    let net = definition
        .build()
        .with_context(|| format!("Failed to build net '{}'", definition.name))?;
    net.log_diagnostics();
    if let Some(dot) = &options.dot {
        net.write_dot(dot)
            .with_context(|| format!("Failed to write DOT graph: {:?}", dot))?;
        info!("wrote net graph to {:?}", dot);
    }

    let results = run_repeated(&net, &net.initial_marking(), &config);
    for (index, err) in &results.failures {
        log::error!("run {} aborted: {}", index, err);
    }
    if results.runs.is_empty() && !results.failures.is_empty() {
        bail!("all {} runs aborted", results.failures.len());
    }

    let logs: BTreeMap<usize, _> = results.logs(&net);
    write_json(&options.output, &logs)
        .with_context(|| format!("Failed to write run logs: {:?}", options.output))?;
    info!(
        "wrote {} run logs to {:?} ({:?})",
        logs.len(),
        options.output,
        results.stop_reasons()
    );
    Ok(())
}
