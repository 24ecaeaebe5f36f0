use std::{
    fs::OpenOptions,
    io::{self, BufWriter},
    path::{Path, PathBuf},
};

use azmon::{
    config::{Config, Output, Telemetry},
    inputs::{self, Input},
    registry::{self, Registry},
};
use azmon_capture::{Accumulator, gauge::Gauges, jsonl, manager::CaptureManager, manager::Handle};
use clap::{Args, Parser, Subcommand};
use metrics::gauge;
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::{
    runtime::Builder,
    signal,
    task::{JoinHandle, JoinSet},
    time::{self, Duration, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Failed to load azmon config: {0}")]
    Config(#[from] azmon::config::Error),
    #[error("Failed to build input: {0}")]
    Registry(#[from] registry::Error),
    #[error("Failed to install prometheus recorder: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
    #[error("No inputs are configured")]
    NoInputs,
    #[error("Could not write samples to {path:?}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{0} poll cycles failed")]
    FailedCycles(usize),
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/azmon/azmon.yaml")
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the configured inputs until interrupted
    Run(RunCommand),
    /// Validate configuration file and exit
    ConfigCheck(ConfigCheckCommand),
    /// Print the sample configuration of one or all inputs
    SampleConfig(SampleConfigCommand),
}

#[derive(Args)]
struct RunCommand {
    /// path on disk to the configuration file
    #[clap(long, default_value_os_t = default_config_path())]
    config_path: PathBuf,
    /// run a single poll cycle per input and exit
    #[clap(long)]
    once: bool,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long, default_value_os_t = default_config_path())]
    config_path: PathBuf,
}

#[derive(Args)]
struct SampleConfigCommand {
    /// the input to print, all inputs when absent
    input: Option<String>,
}

fn registry() -> Result<Registry, Error> {
    let mut registry = Registry::new();
    inputs::register_all(&mut registry)?;
    Ok(registry)
}

fn validate_config(config: &Config, registry: &Registry) -> Result<(), Error> {
    let mut inputs = 0;
    for (name, _) in config.inputs() {
        if registry.get(name).is_none() {
            error!("Configuration names unknown input {name:?}");
            return Err(registry::Error::UnknownInput(name.to_string()).into());
        }
        inputs += 1;
    }
    if inputs == 0 {
        return Err(Error::NoInputs);
    }
    Ok(())
}

fn load_config(config_path: &Path, registry: &Registry) -> Result<Config, Error> {
    let config = Config::load(config_path).map_err(|err| {
        error!("Configuration validation failed: {err}");
        err
    })?;
    validate_config(&config, registry)?;
    info!("Configuration file is valid");
    Ok(config)
}

fn sample_config(registry: &Registry, input: Option<&str>) -> Result<String, Error> {
    if let Some(name) = input {
        return registry
            .sample_config(name)
            .map(str::to_string)
            .ok_or_else(|| registry::Error::UnknownInput(name.to_string()).into());
    }

    let mut out = String::from("inputs:\n");
    for name in registry.names() {
        if let Some(registration) = registry.get(name) {
            out.push_str(&format!("  # {}\n", registration.description));
            for line in registration.sample_config.lines() {
                out.push_str("  ");
                out.push_str(line);
                out.push('\n');
            }
        }
    }
    Ok(out)
}

fn spawn_capture<A>(accumulator: A) -> (Handle, JoinHandle<()>)
where
    A: Accumulator + 'static,
{
    let (manager, handle) = CaptureManager::new(accumulator);
    let task = tokio::spawn(async move {
        manager.run().await;
    });
    (handle, task)
}

fn start_output(output: &Output) -> Result<(Handle, JoinHandle<()>), Error> {
    match output {
        Output::Jsonl { path: Some(path) } => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| Error::Output {
                    path: path.clone(),
                    source,
                })?;
            info!("Writing samples to {}", path.display());
            Ok(spawn_capture(jsonl::Format::new(BufWriter::new(file))))
        }
        Output::Jsonl { path: None } => {
            info!("Writing samples to stdout");
            Ok(spawn_capture(jsonl::Format::new(io::stdout())))
        }
        Output::Gauges {} => Ok(spawn_capture(Gauges)),
    }
}

/// Run one poll cycle of `input`, returning whether it succeeded.
async fn run_cycle(input: &dyn Input, acc: &mut dyn Accumulator) -> bool {
    match input.gather(acc).await {
        Ok(emitted) => {
            debug!("{} emitted {emitted} samples", input.name());
            true
        }
        Err(err) => {
            error!("{} poll cycle failed: {err}", input.name());
            false
        }
    }
}

/// Run one cycle of every input concurrently and return how many failed.
async fn run_once(inputs: Vec<Box<dyn Input>>, acc: &Handle) -> usize {
    let mut cycles = JoinSet::new();
    for input in inputs {
        let mut acc = acc.clone();
        cycles.spawn(async move { run_cycle(input.as_ref(), &mut acc).await });
    }

    let mut failures = 0;
    while let Some(res) = cycles.join_next().await {
        match res {
            Ok(true) => {}
            Ok(false) => failures += 1,
            Err(err) => {
                error!("Could not join the spawned poll task: {err}");
                failures += 1;
            }
        }
    }
    failures
}

async fn poll_loop(input: Box<dyn Input>, mut acc: Handle, period: Duration) {
    info!("polling {} every {}s", input.name(), period.as_secs());
    let mut timer = time::interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        timer.tick().await;
        run_cycle(input.as_ref(), &mut acc).await;
    }
}

/// Poll every input on its own schedule until `shutdown` resolves.
async fn run_until<F>(inputs: Vec<Box<dyn Input>>, acc: &Handle, period: Duration, shutdown: F)
where
    F: Future,
{
    let mut pollers = JoinSet::new();
    for input in inputs {
        pollers.spawn(poll_loop(input, acc.clone(), period));
    }

    tokio::pin!(shutdown);
    let mut interval = time::interval(Duration::from_millis(400));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                gauge!("azmon.running").set(1.0);
            },
            _ = &mut shutdown => {
                info!("received shutdown signal");
                break;
            },
        }
    }
    pollers.shutdown().await;
}

async fn inner_main(config: Config, registry: Registry, once: bool) -> Result<(), Error> {
    if let Some(Telemetry::Prometheus {
        addr,
        global_labels,
    }) = &config.telemetry
    {
        let mut builder = PrometheusBuilder::new().with_http_listener(*addr);
        for (k, v) in global_labels {
            builder = builder.add_global_label(k.clone(), v.clone());
        }
        builder.install()?;
        info!("Serving self-telemetry on {addr}");
    } else if config.output == (Output::Gauges {}) {
        warn!("gauges output configured without a telemetry exporter, samples will be discarded");
    }

    let mut inputs = Vec::new();
    for (name, options) in config.inputs() {
        inputs.push(registry.build(name, options.clone()).await?);
    }

    let (handle, capture) = start_output(&config.output)?;

    let res = if once {
        let failures = run_once(inputs, &handle).await;
        if failures == 0 {
            Ok(())
        } else {
            Err(Error::FailedCycles(failures))
        }
    } else {
        run_until(inputs, &handle, config.interval, signal::ctrl_c()).await;
        Ok(())
    };

    // The capture manager exits, flushing its sink, once every handle is gone.
    drop(handle);
    if let Err(err) = capture.await {
        error!("Could not join the capture manager task: {err}");
    }
    res
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(false)
        .finish()
        .init();

    let cli = Cli::parse();
    let registry = registry()?;

    match cli.command {
        Commands::Run(cmd) => {
            let version = env!("CARGO_PKG_VERSION");
            info!("Starting azmon {version} run.");

            let config = load_config(&cmd.config_path, &registry)?;
            let runtime = Builder::new_multi_thread()
                .enable_io()
                .enable_time()
                .build()?;
            let res = runtime.block_on(inner_main(config, registry, cmd.once));
            info!("Bye. :)");
            res
        }
        Commands::ConfigCheck(cmd) => match load_config(&cmd.config_path, &registry) {
            Ok(_) => std::process::exit(0),
            Err(_) => std::process::exit(1),
        },
        Commands::SampleConfig(cmd) => {
            let sample = sample_config(&registry, cmd.input.as_deref())?;
            print!("{sample}");
            Ok(())
        }
    }
}
