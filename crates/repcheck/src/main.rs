use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use repcheck_core::analyzer::ScriptLanguage;
use repcheck_core::config::{Config, CONFIG_FILE};
use repcheck_core::pipeline::{Orchestrator, RunOptions};
use repcheck_core::types::Language;
use repcheck_core::OllamaAdvisor;

use repcheck_python::PythonLanguage;
use repcheck_r::RLanguage;
use repcheck_report::{json, text};

#[derive(Parser)]
#[command(name = "repcheck")]
#[command(about = "Check that a directory of R or Python scripts runs cleanly, in dependency order")]
#[command(version)]
struct Cli {
    /// Enable debug logging on stderr (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lint and run every script in dependency order; exit 1 if any fails
    Check(CheckArgs),
    /// Print the dependency order without running anything
    Order(ProjectArgs),
    /// Create a default .repcheck.toml configuration file
    Init {
        /// Overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Args)]
struct ProjectArgs {
    /// Directory containing the scripts
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Script language: python or r
    #[arg(short, long)]
    language: Option<Language>,
    /// Include glob, repeatable (defaults to the language's own patterns)
    #[arg(short = 'p', long = "pattern")]
    patterns: Vec<String>,
    /// Exclude glob, repeatable
    #[arg(short = 'x', long = "exclude")]
    excludes: Vec<String>,
    /// Config file path (defaults to .repcheck.toml in the directory or an ancestor)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Single-line JSON
    #[arg(long)]
    compact: bool,
}

#[derive(Args)]
struct CheckArgs {
    #[command(flatten)]
    project: ProjectArgs,
    /// Per-script timeout in seconds
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,
    /// Skip linting
    #[arg(long)]
    no_lint: bool,
    /// Do not ask the local language model to explain failures
    #[arg(long)]
    no_llm: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Check(args) => cmd_check(args).await,
        Commands::Order(args) => cmd_order(args),
        Commands::Init { force } => cmd_init(force),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(2);
    }
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn cmd_check(args: CheckArgs) -> Result<()> {
    let mut config = load_config(&args.project)?;
    if let Some(secs) = args.timeout {
        config.check.timeout_secs = secs;
    }
    if args.no_lint {
        config.check.lint = false;
    }
    if args.no_llm {
        config.advisor.enabled = false;
    }

    let mut orchestrator = Orchestrator::new(language_support(config.project.language)?);
    if config.advisor.enabled {
        orchestrator = orchestrator.with_advisor(OllamaAdvisor::new(&config.advisor));
    }

    let root = project_root(&args.project.path);
    let report = orchestrator
        .run(&root, &RunOptions::from_config(&config))
        .await?;

    match args.project.format {
        OutputFormat::Text => print!("{}", text::format_report(&report)),
        OutputFormat::Json => println!(
            "{}",
            json::format_report(&report, args.project.compact)
                .context("failed to serialize report")?
        ),
    }

    if !report.all_passed() {
        process::exit(1);
    }
    Ok(())
}

fn cmd_order(args: ProjectArgs) -> Result<()> {
    let config = load_config(&args)?;
    let orchestrator = Orchestrator::new(language_support(config.project.language)?);
    let root = project_root(&args.path);
    let plan = orchestrator.plan(&root, &config.project.include, &config.project.exclude)?;

    match args.format {
        OutputFormat::Text => print!("{}", text::format_plan(&plan)),
        OutputFormat::Json => println!(
            "{}",
            json::format_plan(&plan, args.compact).context("failed to serialize plan")?
        ),
    }
    Ok(())
}

fn cmd_init(force: bool) -> Result<()> {
    let target = PathBuf::from(CONFIG_FILE);
    if target.exists() && !force {
        anyhow::bail!("{CONFIG_FILE} already exists. Use --force to overwrite.");
    }
    std::fs::write(&target, Config::default_toml())
        .with_context(|| format!("failed to write {CONFIG_FILE}"))?;
    println!("Created {CONFIG_FILE} with default configuration.");
    Ok(())
}

/// Load the config file, then apply command-line overrides.
fn load_config(args: &ProjectArgs) -> Result<Config> {
    let mut config = match &args.config {
        Some(p) => Config::load(p)?,
        None => Config::load_or_default(&args.path),
    };

    if let Some(language) = args.language {
        config.project.language = language;
    }
    if !args.patterns.is_empty() {
        config.project.include = args.patterns.clone();
    }
    if !args.excludes.is_empty() {
        config.project.exclude = args.excludes.clone();
    }

    tracing::debug!(
        language = %config.project.language,
        include = ?config.project.include,
        exclude = ?config.project.exclude,
        "resolved configuration"
    );
    Ok(config)
}

/// Language support registry.
fn language_support(language: Language) -> Result<Box<dyn ScriptLanguage>> {
    Ok(match language {
        Language::Python => {
            Box::new(PythonLanguage::new().context("failed to initialize Python support")?)
        }
        Language::R => Box::new(RLanguage::new().context("failed to initialize R support")?),
    })
}

/// Canonical form of the project root, so reports can show relative paths.
/// A root that cannot be resolved is passed through and rejected by discovery.
fn project_root(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}
