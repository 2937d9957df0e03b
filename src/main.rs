//! Illuminator entry point: load a scenario, compile it, and run it.

use std::process;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use illuminator::cli::Cli;
use illuminator::config;
use illuminator::error::Result;
use illuminator::models::Registry;
use illuminator::plan::Compiler;
use illuminator::reporting::print_run_summary;
use illuminator::runner::execute;
use illuminator::sim::world::World;

fn run(cli: &Cli) -> Result<()> {
    let mut scenario = config::load(&cli.file_path)?;
    if let Some(results) = &cli.results {
        scenario.scenario.results = Some(results.clone());
    }

    let registry = Registry::with_builtin_models();
    let mut compiler = Compiler::new(&registry);
    if let Some(reference) = &cli.collector {
        compiler = compiler.with_collector(reference.clone());
    }
    let mut plan = compiler.compile(&config::apply_defaults(&scenario))?;

    if cli.plan {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    let clock = plan.clock();
    let mut world = World::new(&registry, clock.start(), clock.resolution());
    let summary = execute(&mut plan, &mut world)?;
    print_run_summary(&summary, &plan);
    Ok(())
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(&cli) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
