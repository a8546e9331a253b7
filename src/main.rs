// ABOUTME: Entry point for the drover CLI application.
// ABOUTME: Parses arguments, wires the collaborators, and dispatches to command handlers.

mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use drover::balancer::HttpBalancer;
use drover::builder::CommandBuildSystem;
use drover::config::{self, FleetConfig};
use drover::error::{Error, Result};
use drover::events::{FanoutSink, OutputMode, OutputSink, TracingSink};
use drover::remote::SshRemote;
use drover::store::MemoryStore;
use drover::swarm::{Controller, PassReport, ReconcileSettings, SwarmContext};
use drover::types::{SwarmId, TraceId};
use std::env;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let mode = if cli.json {
        OutputMode::Json
    } else if cli.quiet {
        OutputMode::Quiet
    } else {
        OutputMode::Normal
    };
    let output = Arc::new(OutputSink::new(mode).verbose(cli.verbose));

    if let Err(e) = run(cli, Arc::clone(&output)).await {
        output.error(&e.to_string());
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: Arc<OutputSink>) -> Result<()> {
    match cli.command {
        Commands::Init { force } => {
            let cwd = env::current_dir()?;
            config::init_config(&cwd, force)?;
            output.progress(&format!("Created {}", config::CONFIG_FILENAME));
            Ok(())
        }
        Commands::Trigger { swarm, trace } => {
            let config = load_config(cli.config.as_deref())?;
            config.swarm(&swarm)?;
            let controller = controller(&config, cli.verbose, output.clone());

            let accepted = controller.trigger_swarm(SwarmId::new(swarm), trace.map(TraceId::new));
            output.progress(&format!("Accepted, trace {}", accepted.trace_id.as_str()));
            let report = accepted.outcome().await?;
            print_report(&output, &report);
            Ok(())
        }
        Commands::UptestAll => {
            let config = load_config(cli.config.as_deref())?;
            let controller = controller(&config, cli.verbose, output.clone());

            let run = controller.uptest_all().await?;
            let failed = run.failures().count();
            if failed > 0 {
                return Err(Error::UptestsFailed(failed));
            }
            Ok(())
        }
        Commands::Status { swarm } => {
            let config = load_config(cli.config.as_deref())?;
            config.swarm(&swarm)?;
            let controller = controller(&config, cli.verbose, output.clone());

            let status = controller.status(&SwarmId::new(swarm)).await?;
            if output.mode() == OutputMode::Json {
                let instances: Vec<_> = status.instances.iter().map(|i| i.name.as_str()).collect();
                let json = serde_json::json!({
                    "swarm": status.swarm.id.as_str(),
                    "size": status.swarm.size,
                    "release": status.release.as_ref().map(|r| r.id.as_str()),
                    "instances": instances,
                });
                println!("{json}");
                return Ok(());
            }

            println!("Swarm: {}", status.swarm.id);
            println!("App: {} {}", status.swarm.app, status.swarm.version);
            match &status.release {
                Some(release) => println!("Release: {} ({} of {} running it)", release.id, status.current(), status.swarm.size),
                None => println!("Release: none yet"),
            }
            for instance in &status.instances {
                println!("  {} on {}:{}", instance.name, instance.host, instance.port);
            }
            Ok(())
        }
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<FleetConfig> {
    match path {
        Some(path) => FleetConfig::load(path),
        None => FleetConfig::discover(&env::current_dir()?),
    }
}

fn controller(config: &FleetConfig, verbose: bool, output: Arc<OutputSink>) -> Arc<Controller> {
    let mut settings = ReconcileSettings::from_config(config);
    settings.debug_events = verbose;

    let events = FanoutSink::new().with(Arc::new(TracingSink)).with(output);
    let ctx = SwarmContext::new(
        Arc::new(MemoryStore::from_config(config)),
        Arc::new(SshRemote::new(config.remote.clone())),
        Arc::new(HttpBalancer::new(config.balancers.clone())),
        Arc::new(CommandBuildSystem::new(config.build.clone())),
        Arc::new(events),
        settings,
    );
    Controller::new(ctx)
}

fn print_report(output: &OutputSink, report: &PassReport) {
    if output.mode() == OutputMode::Json {
        if let Ok(json) = serde_json::to_string(report) {
            println!("{json}");
        }
        return;
    }

    output.progress(&format!(
        "{}: {} deployed, {} removed, {} running, {} checks, {} stale removed",
        report.swarm,
        report.deployed.len(),
        report.removed.len(),
        report.instances,
        report.checks,
        report.cleanup.deleted.len()
    ));
    for warning in &report.warnings {
        output.progress(&format!("warning: {}", warning.message));
    }
}
