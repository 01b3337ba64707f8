//! rustible-transport - inspect resolved connection configuration
//!
//! Loads host variables from a YAML inventory snapshot and prints the
//! connection parameters a proxy hop would be reached with.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use rustible_transport::config::{ConfigManager, Defaults};
use rustible_transport::interpreter::{ActionState, InterpreterResolver, NoDiscovery};
use rustible_transport::logging::{LogFormat, LogLevel, LoggingBuilder};
use rustible_transport::source::{ConnectionSpec, ProxyHostSource, ResolutionContext, ViaSpec};
use rustible_transport::template::JinjaTemplar;
use rustible_transport::vars::TaskVars;

/// Inspect how Rustible would connect to a host
#[derive(Parser, Debug)]
#[command(name = "rustible-transport")]
#[command(author = "Rustible Contributors")]
#[command(version)]
#[command(about = "Inspect resolved connection configuration", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: String,

    /// Path to a defaults file (TOML, YAML or JSON)
    #[arg(short = 'c', long, global = true, env = "RUSTIBLE_TRANSPORT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve and print the connection configuration of one hop
    Inspect(InspectArgs),
}

#[derive(Parser, Debug)]
struct InspectArgs {
    /// YAML file mapping inventory names to their host variables
    #[arg(long = "host-vars")]
    host_vars: PathBuf,

    /// Inventory name of the host to inspect
    #[arg(required_unless_present = "via", conflicts_with = "via")]
    host: Option<String>,

    /// A `[[method:]user@]host` hop, as written in `mitogen_via`
    #[arg(long)]
    via: Option<String>,

    /// Output format
    #[arg(short = 'o', long, default_value = "yaml")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// YAML output
    Yaml,
    /// JSON output
    Json,
}

fn main() {
    let cli = Cli::parse();

    if let Err(err) = init_logging(&cli) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    let code = match run(&cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            err.downcast_ref::<rustible_transport::Error>()
                .map_or(1, rustible_transport::Error::exit_code)
        }
    };

    std::process::exit(code);
}

fn init_logging(cli: &Cli) -> Result<()> {
    let format: LogFormat = cli.log_format.parse()?;
    LoggingBuilder::new()
        .with_level(LogLevel::from_verbosity(cli.verbose))
        .with_format(format)
        .init()?;
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Inspect(args) => inspect(cli, args),
    }
}

fn inspect(cli: &Cli, args: &InspectArgs) -> Result<()> {
    let defaults = Defaults::load(cli.config.as_deref())?;
    debug!(?defaults, "Loaded transport defaults");

    let content = std::fs::read_to_string(&args.host_vars)
        .with_context(|| format!("Failed to read {}", args.host_vars.display()))?;
    let hostvars: Value = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {}", args.host_vars.display()))?;
    if !hostvars.is_object() {
        bail!(
            "{} must map inventory names to host variables",
            args.host_vars.display()
        );
    }

    let via = match (&args.via, &args.host) {
        (Some(via), _) => ViaSpec::parse(via)?,
        (None, Some(host)) => ViaSpec {
            inventory_name: host.clone(),
            ..ViaSpec::default()
        },
        (None, None) => bail!("either a host or --via is required"),
    };

    let task_vars = TaskVars::from_json(json!({ "hostvars": hostvars }));
    let config = ConfigManager::new(defaults.clone());
    let resolver = InterpreterResolver::new(Arc::new(NoDiscovery));
    let templar = JinjaTemplar::new();
    let action = ActionState::new();
    let ctx = ResolutionContext {
        defaults: &defaults,
        config: &config,
        resolver: &resolver,
        templar: &templar,
    };

    let source = ProxyHostSource::from_via(ctx, &via, &task_vars, &action)?;
    let spec = ConnectionSpec::resolve(&source, false)?;

    let rendered = match args.output {
        OutputFormat::Yaml => serde_yaml::to_string(&spec)?,
        OutputFormat::Json => serde_json::to_string_pretty(&spec)? + "\n",
    };
    print!("{}", rendered);
    Ok(())
}
