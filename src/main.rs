//! cmdexec - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use cmdexec::cli::{render, Args, Commands, RunArgs, SpawnArgs};
use cmdexec::config::Config;
use cmdexec::process::LiveStatus;
use cmdexec::{logging, ToolRuntime};
use colored::Colorize;
use std::path::Path;
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load(args.config.clone()).context("Failed to load configuration")?;

    let filter = args
        .verbosity()
        .log_filter()
        .map(str::to_string)
        .unwrap_or_else(|| config.logging.filter.clone());
    logging::init_tracing(&filter, args.log_json || config.logging.json)?;
    tracing::debug!(verbosity = args.verbosity().as_str(), "Starting cmdexec");

    let success = match args.command {
        Commands::Run(run) => run_command(&config, run).await?,
        Commands::Spawn(spawn) => spawn_command(&config, spawn).await?,
        Commands::Config => {
            show_config(&config, args.config.as_deref())?;
            true
        }
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}

/// Build a runtime whose output limits for `tool` include the CLI flags
fn runtime_for(config: &Config, tool: &str, limits: &cmdexec::cli::LimitArgs) -> ToolRuntime {
    let runtime = ToolRuntime::from_config(config);
    if let Some(limits) = limits.apply_to(runtime.output_limits_for(tool)) {
        runtime.set_output_limits(tool, limits);
    }
    runtime
}

/// `cmdexec run`
async fn run_command(config: &Config, run: RunArgs) -> Result<bool> {
    let runtime = runtime_for(config, &run.tool, &run.limits);

    let result = runtime
        .run(&run.tool, &run.command, run.timeout())
        .await
        .with_context(|| format!("Failed to run '{}'", run.command))?;

    if run.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", render::render_result(&result));
    }
    Ok(result.is_success())
}

/// `cmdexec spawn`
async fn spawn_command(config: &Config, spawn: SpawnArgs) -> Result<bool> {
    let runtime = runtime_for(config, &spawn.tool, &spawn.limits);

    let start = runtime
        .spawn(&spawn.tool, &spawn.command, spawn.timeout_hint())
        .await
        .with_context(|| format!("Failed to start '{}'", spawn.command))?;
    if !spawn.json {
        println!("{}", render::render_start(&start));
    }

    let spinner = render::poll_spinner(&spawn.command);
    let polling_started = Instant::now();
    let mut interrupted = false;

    loop {
        let report = runtime.status(&start.token)?;
        spinner.set_message(render::status_message(&report));
        if report.status == LiveStatus::NotRunning {
            break;
        }
        if let Some(limit) = spawn.wait_timeout() {
            if polling_started.elapsed() >= limit {
                break;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(spawn.poll_interval()) => {}
            _ = tokio::signal::ctrl_c() => {
                interrupted = true;
                break;
            }
        }
    }
    spinner.finish_and_clear();

    if interrupted {
        let terminated = runtime.terminate(&start.token).await;
        eprintln!(
            "{} {}",
            "Interrupted:".yellow().bold(),
            if terminated { "process terminated" } else { "process already collected" }
        );
        return Ok(false);
    }

    let remaining = spawn
        .wait_timeout()
        .map(|limit| limit.saturating_sub(polling_started.elapsed()));
    let outcome = runtime.wait(&start.token, remaining).await?;

    if spawn.json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", render::render_outcome(&outcome));
    }
    Ok(outcome.is_success())
}

/// `cmdexec config`
fn show_config(config: &Config, explicit: Option<&Path>) -> Result<()> {
    let source = match explicit {
        Some(path) => path.display().to_string(),
        None => match Config::default_path() {
            Some(path) if path.exists() => path.display().to_string(),
            _ => "built-in defaults".to_string(),
        },
    };

    println!("{} {}", "Configuration:".bold(), source.cyan());
    println!("{}", toml::to_string_pretty(config).context("Failed to render configuration")?);
    Ok(())
}
