use anyhow::{bail, Context, Result};
use chrono::Utc;
use flowdef::cli::commands::{InspectCommand, NextFireCommand, RetryPlanCommand, ValidateCommand};
use flowdef::cli::output::*;
use flowdef::cli::{Cli, Command};
use flowdef::core::trigger::TriggerSchedule;
use flowdef::core::{PipelineConfig, TriggerConfig};
use tracing::{error, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG overrides --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.as_str()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Validate(cmd) => validate(cmd),
        Command::Inspect(cmd) => inspect(cmd),
        Command::RetryPlan(cmd) => retry_plan(cmd),
        Command::NextFire(cmd) => next_fire(cmd),
    }
}

fn load(file: &std::path::Path) -> Result<PipelineConfig> {
    PipelineConfig::from_file(file).with_context(|| format!("Failed to load {}", file.display()))
}

fn validate(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating {}...", INFO, style(cmd.file.display()).dim());

    match load(&cmd.file) {
        Ok(config) => {
            println!("{} Declarations are valid!", CHECK);
            println!("  Mod: {}", style(&config.mod_name).bold());
            println!("  Pipelines: {}", style(config.pipelines.len()).cyan());
            println!("  Triggers: {}", style(config.triggers.len()).cyan());
            println!("  Integrations: {}", style(config.integrations.len()).cyan());
            println!("  Notifiers: {}", style(config.notifiers.len()).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config_json(&config))?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn inspect(cmd: &InspectCommand) -> Result<()> {
    let config = load(&cmd.file)?;
    let Some(pipeline) = config.pipeline(&cmd.pipeline) else {
        bail!("Pipeline not found: {}", cmd.pipeline);
    };

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&pipeline_json(pipeline))?);
        return Ok(());
    }

    println!("{} Pipeline {}", INFO, style(&pipeline.full_name).bold());
    if let Some(title) = &pipeline.title {
        println!("  {}", style(title).dim());
    }
    for param in &pipeline.params {
        let required = if param.is_required() { " (required)" } else { "" };
        println!("  param {}: {}{}", style(&param.name).cyan(), param.param_type, required);
    }

    println!("\n{}", style("Steps:").bold());
    for step in &pipeline.steps {
        println!("{}", format_step(step));
    }

    println!("\n{} {}", style("Execution order:").bold(), pipeline.execution_order().join(" → "));
    Ok(())
}

fn retry_plan(cmd: &RetryPlanCommand) -> Result<()> {
    let config = load(&cmd.file)?;
    let Some(pipeline) = config.pipeline(&cmd.pipeline) else {
        bail!("Pipeline not found: {}", cmd.pipeline);
    };
    let Some(step) = pipeline.step(&cmd.step) else {
        bail!("Step not found: {}", cmd.step);
    };
    let Some(declared) = &step.base.retry else {
        println!("{} {} has no retry block", INFO, style(step.full_name()).cyan());
        return Ok(());
    };

    // Attributes that need run-time values fall back to their static settings
    let retry = match step.retry_config(config.context(), true) {
        Ok(Some(resolved)) => resolved,
        Ok(None) => {
            println!("{} retry of {} is disabled by its 'if' condition", WARN, style(step.full_name()).cyan());
            return Ok(());
        }
        Err(e) => {
            warn!(step = %step.full_name(), error = %e, "retry needs run-time values, using static settings");
            declared.clone()
        }
    };

    let settings = retry.resolve_settings();
    println!(
        "{} {} retries up to {} attempts ({}, {}ms..{}ms)",
        INFO,
        style(step.full_name()).cyan(),
        settings.max_attempts,
        settings.strategy,
        settings.min_interval,
        settings.max_interval
    );
    let attempts = u32::try_from(settings.max_attempts).unwrap_or(u32::MAX);
    for attempt in 2..=attempts {
        println!("{}", format_backoff(attempt, retry.calculate_backoff(attempt)));
    }
    Ok(())
}

fn next_fire(cmd: &NextFireCommand) -> Result<()> {
    let config = load(&cmd.file)?;
    let Some(trigger) = config.trigger(&cmd.trigger) else {
        bail!("Trigger not found: {}", cmd.trigger);
    };

    let schedule = match &trigger.config {
        TriggerConfig::Schedule(schedule) => schedule.clone(),
        TriggerConfig::Query(query) => match &query.schedule {
            Some(schedule) => TriggerSchedule { schedule: schedule.clone() },
            None => bail!("Trigger {} has no schedule", trigger.full_name),
        },
        TriggerConfig::Http(_) => bail!("Trigger {} is an http trigger and has no schedule", trigger.full_name),
    };

    if !trigger.is_enabled() {
        println!("{} {} is disabled", WARN, style(&trigger.full_name).yellow());
    }
    println!(
        "{} {} ({})",
        INFO,
        style(&trigger.full_name).bold(),
        style(schedule.cron_expression()).dim()
    );
    for at in schedule.next_fires(Utc::now(), cmd.count)? {
        println!("{}", format_fire(at));
    }
    Ok(())
}
