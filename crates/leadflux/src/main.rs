use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use leadflux_core::config::PipelineConfig;
use leadflux_core::fallback::CsvFallbackSource;
use leadflux_core::outputs::{publish_outputs, PublishedOutputs};
use leadflux_core::pipelines::{
    run_fallback_only, run_pipeline, LeadConversionState, PipelineInputs, PipelineRun,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "LEADFLUX_CONFIG";

#[derive(Parser, Debug)]
#[command(author, version, about = "Gym lead conversion pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compose conversion events and expand them into lead conversions
    Run(RunArgs),
    /// Expand the pre-built conversion events table only
    Expand(ConfigArgs),
    /// Print the effective configuration as TOML
    Config(ConfigArgs),
}

#[derive(Args, Debug, Default)]
struct ConfigArgs {
    /// Path to a TOML or JSON config file (falls back to LEADFLUX_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,
    /// Skip composition and expand the pre-built conversion events table
    #[arg(long)]
    fallback_only: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(&args.config, args.fallback_only),
        Command::Expand(args) => handle_run(&args, true),
        Command::Config(args) => handle_config(&args),
    }
}

fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let path = args
        .config
        .clone()
        .or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from));
    PipelineConfig::load(path.as_deref()).context("failed to load pipeline configuration")
}

fn handle_run(args: &ConfigArgs, fallback_only: bool) -> Result<()> {
    let config = load_config(args)?;
    let fallback = CsvFallbackSource::new(&config.input_paths.fct_client_conversion_events_part_2);

    let run = if fallback_only {
        info!("running in fallback-only mode");
        run_fallback_only(&fallback)
    } else {
        let inputs =
            PipelineInputs::load(&config.input_paths).context("failed to load input tables")?;
        run_pipeline(inputs, &fallback)
    };

    if run.state == LeadConversionState::Failed {
        warn!("no lead conversions could be produced from composed or fallback events");
    }

    let published = publish_outputs(&config, &run).context("failed to write outputs")?;
    print_summary(&run, &published);
    Ok(())
}

fn handle_config(args: &ConfigArgs) -> Result<()> {
    let config = load_config(args)?;
    let rendered = config
        .to_toml_string()
        .context("failed to render configuration")?;
    print!("{rendered}");
    Ok(())
}

fn print_summary(run: &PipelineRun, published: &PublishedOutputs) {
    let counts = run.counts();
    let source = run
        .source()
        .map_or("none", |source| source.as_str())
        .to_string();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["lead conversion source".to_string(), source]);
    for (metric, value) in [
        ("users", counts.users),
        ("credit pack purchases", counts.credit_purchases),
        ("membership purchases", counts.membership_purchases),
        ("first credit packs", counts.earliest_credits),
        ("first memberships", counts.earliest_memberships),
        ("conversion events", counts.conversion_events),
        ("clients", counts.clients),
        ("leads", counts.leads),
        ("fallback events", counts.fallback_events),
        ("lead conversions", counts.lead_conversions),
        ("  MEMBERSHIP", counts.lead_conversions_membership),
        ("  USER_CREDIT", counts.lead_conversions_user_credit),
        ("  ALL", counts.lead_conversions_all),
    ] {
        table.add_row(vec![metric.to_string(), value.to_string()]);
    }
    println!("{table}");

    for (label, path) in [
        ("conversion events", &published.conversion_events),
        ("lead conversions", &published.lead_conversions),
        ("run summary", &published.run_summary),
    ] {
        if let Some(path) = path {
            println!("{label}: {}", path.display());
        }
    }
}
